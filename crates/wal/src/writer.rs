use byteorder::{ByteOrder, LittleEndian};
use std::fs::OpenOptions;
use std::path::Path;
use tracing::{debug, trace};

use crate::format::{mask, type_crc_table, RecordType, BLOCK_SIZE, HEADER_SIZE, MAX_RECORD_TYPE};
use crate::{WalError, WritableFile};

/// Appends logical records to a log, fragmenting them across blocks.
///
/// Each physical record is flushed to the destination as soon as it is
/// written. When `sync` is enabled the destination is additionally synced
/// once per logical record.
///
/// A failed write is returned as-is. The block offset still advances past
/// the failed record, so later records keep the block layout consistent and
/// the reader will discard the damaged one.
pub struct LogWriter<F: WritableFile> {
    dest: F,
    block_offset: usize,
    sync: bool,
    type_crc: [u32; MAX_RECORD_TYPE as usize + 1],
}

impl<F: WritableFile> LogWriter<F> {
    /// Writes to an empty `dest`.
    pub fn new(dest: F) -> Self {
        Self::with_offset(dest, 0)
    }

    /// Writes to `dest`, which already holds `dest_len` bytes of log.
    pub fn with_offset(dest: F, dest_len: u64) -> Self {
        Self {
            dest,
            block_offset: (dest_len % BLOCK_SIZE as u64) as usize,
            sync: false,
            type_crc: type_crc_table(),
        }
    }

    /// Enables or disables a sync after every logical record.
    pub fn set_sync(&mut self, sync: bool) {
        self.sync = sync;
    }

    /// Appends one logical record.
    ///
    /// An empty `record` still produces one zero-length `Full` record.
    pub fn add_record(&mut self, record: &[u8]) -> Result<(), WalError> {
        let mut left = record;
        let mut begin = true;
        loop {
            let leftover = BLOCK_SIZE - self.block_offset;
            if leftover < HEADER_SIZE {
                // Not enough room for a header: zero the trailer and roll over.
                self.block_offset = 0;
                if leftover > 0 {
                    trace!(leftover, "padding log block trailer");
                    self.dest.append(&[0u8; HEADER_SIZE - 1][..leftover])?;
                }
            }

            let avail = BLOCK_SIZE - self.block_offset - HEADER_SIZE;
            let fragment_len = left.len().min(avail);
            let end = fragment_len == left.len();
            let (fragment, rest) = left.split_at(fragment_len);

            self.emit_physical_record(RecordType::for_fragment(begin, end), fragment)?;
            left = rest;
            begin = false;
            if end {
                break;
            }
        }

        if self.sync {
            self.dest.sync()?;
        }
        Ok(())
    }

    fn emit_physical_record(&mut self, t: RecordType, payload: &[u8]) -> Result<(), WalError> {
        debug_assert!(payload.len() <= u16::MAX as usize);
        debug_assert!(self.block_offset + HEADER_SIZE + payload.len() <= BLOCK_SIZE);

        let crc = crc32c::crc32c_append(self.type_crc[t as usize], payload);
        let mut header = [0u8; HEADER_SIZE];
        coding::encode_fixed32(&mut header[0..4], mask(crc));
        LittleEndian::write_u16(&mut header[4..6], payload.len() as u16);
        header[6] = t as u8;

        self.block_offset += HEADER_SIZE + payload.len();

        self.dest.append(&header)?;
        self.dest.append(payload)?;
        self.dest.flush()?;
        Ok(())
    }

    /// Syncs the destination regardless of the `sync` setting.
    pub fn sync(&mut self) -> Result<(), WalError> {
        self.dest.sync()?;
        Ok(())
    }

    /// Offset of the next write within the current block.
    pub fn block_offset(&self) -> usize {
        self.block_offset
    }

    pub fn get_ref(&self) -> &F {
        &self.dest
    }

    pub fn into_inner(self) -> F {
        self.dest
    }
}

impl LogWriter<std::fs::File> {
    /// Opens (or creates) a log file for appending, resuming mid-block if
    /// the file already holds records.
    ///
    /// # Arguments
    ///
    /// * `path` - file system path of the log (created if it does not exist).
    /// * `sync` - if true, every `add_record` call ends with an fsync.
    pub fn create<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self, WalError> {
        let path = path.as_ref();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();
        debug!(path = %path.display(), len, sync, "log writer opened");
        let mut writer = Self::with_offset(file, len);
        writer.set_sync(sync);
        Ok(writer)
    }
}
