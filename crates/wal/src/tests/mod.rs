
use crate::{mask, HEADER_SIZE};
use std::io;

/// Hand-builds one physical record, including unknown types.
pub(super) fn physical(type_byte: u8, payload: &[u8]) -> Vec<u8> {
    let mut covered = vec![type_byte];
    covered.extend_from_slice(payload);
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&mask(crc32c::crc32c(&covered)).to_le_bytes());
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.push(type_byte);
    out.extend_from_slice(payload);
    out
}

/// Reads every record, panicking on errors.
pub(super) fn read_all(log: &[u8]) -> Vec<Vec<u8>> {
    let mut reader = crate::LogReader::from_reader(io::Cursor::new(log));
    let mut out = Vec::new();
    reader.replay(|r| out.push(r)).unwrap();
    out
}
