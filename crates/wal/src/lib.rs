//! # WAL - write-ahead log
//!
//! Provides crash-safe durability for the ShoalKV write path.
//!
//! Every serialized write batch is appended to the log **before** it is
//! applied to the memtable. On restart the log is replayed to rebuild the
//! memtable, so no acknowledged write is lost.
//!
//! ## Block framing
//!
//! The log is a sequence of 32 KiB blocks. A logical record is written as
//! one or more physical records, each with a 7-byte header:
//!
//! ```text
//! [crc: u32 LE][length: u16 LE][type: u8][payload ...]
//! ```
//!
//! `type` is `Full` when the record fits in the current block, otherwise the
//! record is split into `First, Middle*, Last` fragments over consecutive
//! blocks. A block never ends with fewer than 7 unused bytes: that tail is
//! zero-filled and the writer moves to the next block. Because records
//! never straddle a block boundary, a reader can always resynchronize at
//! the next block after damage.
//!
//! `crc` is the CRC32C of the type byte and payload, stored masked (see
//! [`mask`]).
//!
//! ## Example
//!
//! ```rust,no_run
//! use wal::{LogReader, LogWriter};
//!
//! let mut w = LogWriter::create("wal.log", true).unwrap();
//! w.add_record(b"hello").unwrap();
//! drop(w);
//!
//! let mut r = LogReader::open("wal.log").unwrap();
//! r.replay(|rec| println!("{:?}", rec)).unwrap();
//! ```

mod file;
mod format;
mod reader;
mod writer;

use std::io;
use thiserror::Error;

pub use file::WritableFile;
pub use format::{mask, unmask, RecordType, BLOCK_SIZE, HEADER_SIZE, ZERO_TYPE};
pub use reader::LogReader;
pub use writer::LogWriter;

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A record failed validation.
    #[error("corrupt record: {0}")]
    Corrupt(&'static str),
}

impl WalError {
    pub fn is_corruption(&self) -> bool {
        matches!(self, WalError::Corrupt(_))
    }
}

impl From<coding::CodingError> for WalError {
    fn from(_: coding::CodingError) -> Self {
        WalError::Corrupt("truncated record header")
    }
}

#[cfg(test)]
mod tests;
