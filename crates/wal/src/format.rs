//! Physical layout of the log.
//!
//! ```text
//! block      := record* trailer?                (exactly BLOCK_SIZE bytes,
//!                                                except the last block)
//! record     := [crc: u32 LE][length: u16 LE][type: u8][payload: length bytes]
//! trailer    := 0x00{0..6}                      (too small for a header)
//! ```
//!
//! `crc` is the masked CRC32C of the type byte followed by the payload.

use crate::WalError;

/// Size of one log block.
pub const BLOCK_SIZE: usize = 32 * 1024;

/// `crc (4) + length (2) + type (1)`.
pub const HEADER_SIZE: usize = 4 + 2 + 1;

/// Type byte of zero-filled space. Never written as a record header.
pub const ZERO_TYPE: u8 = 0;

const _: () = assert!(BLOCK_SIZE.is_power_of_two());
const _: () = assert!(BLOCK_SIZE - HEADER_SIZE <= u16::MAX as usize);

/// Position of a physical record within its logical record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordType {
    /// The whole logical record.
    Full = 1,
    First = 2,
    Middle = 3,
    Last = 4,
}

pub(crate) const MAX_RECORD_TYPE: u8 = RecordType::Last as u8;

impl RecordType {
    pub(crate) fn for_fragment(first: bool, last: bool) -> Self {
        match (first, last) {
            (true, true) => RecordType::Full,
            (true, false) => RecordType::First,
            (false, true) => RecordType::Last,
            (false, false) => RecordType::Middle,
        }
    }
}

impl TryFrom<u8> for RecordType {
    type Error = WalError;

    fn try_from(byte: u8) -> Result<Self, WalError> {
        match byte {
            1 => Ok(RecordType::Full),
            2 => Ok(RecordType::First),
            3 => Ok(RecordType::Middle),
            4 => Ok(RecordType::Last),
            _ => Err(WalError::Corrupt("unknown record type")),
        }
    }
}

const MASK_DELTA: u32 = 0xa282_ead8;

/// Masks a CRC before it is stored.
///
/// Computing the CRC of a string that contains embedded CRCs is
/// problematic, so stored checksums are rotated and offset.
#[inline]
pub fn mask(crc: u32) -> u32 {
    crc.rotate_right(15).wrapping_add(MASK_DELTA)
}

/// Inverse of [`mask`].
#[inline]
pub fn unmask(masked: u32) -> u32 {
    masked.wrapping_sub(MASK_DELTA).rotate_left(15)
}

/// CRC32C of each single type byte, so a record's checksum only has to be
/// extended over its payload.
pub(crate) fn type_crc_table() -> [u32; MAX_RECORD_TYPE as usize + 1] {
    let mut table = [0u32; MAX_RECORD_TYPE as usize + 1];
    for (t, slot) in table.iter_mut().enumerate() {
        *slot = crc32c::crc32c(&[t as u8]);
    }
    table
}
