use byteorder::{ByteOrder, LittleEndian};
use std::fs::File;
use std::io::{self, Read};
use std::ops::Range;
use std::path::Path;
use tracing::warn;

use crate::format::{unmask, RecordType, BLOCK_SIZE, HEADER_SIZE, ZERO_TYPE};
use crate::WalError;

/// Sequential log reader that reassembles logical records.
///
/// The reader is generic over any `Read` implementor, so it works on files
/// (`LogReader<File>`) as well as in-memory buffers.
///
/// # Damage handling
///
/// - A physical record cut off by the end of input (crash mid-write) ends
///   the log cleanly.
/// - A checksum mismatch, an unknown record type, or a length that runs
///   past the block is returned as [`WalError::Corrupt`]. The rest of that
///   block is skipped, so calling [`read_record`](Self::read_record) again
///   resumes with the next block.
/// - Fragments that do not form a complete `First, Middle*, Last` chain
///   are dropped and counted in [`dropped_bytes`](Self::dropped_bytes).
pub struct LogReader<R: Read> {
    src: R,
    block: Box<[u8]>,
    pos: usize,
    end: usize,
    eof: bool,
    /// Stream offset of `block[0]`.
    block_start: u64,
    last_record_end: u64,
    dropped_bytes: u64,
}

impl LogReader<File> {
    /// Opens an existing log file for sequential replay.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, WalError> {
        Ok(Self::from_reader(File::open(path)?))
    }
}

impl<R: Read> LogReader<R> {
    pub fn from_reader(src: R) -> Self {
        Self {
            src,
            block: vec![0u8; BLOCK_SIZE].into_boxed_slice(),
            pos: 0,
            end: 0,
            eof: false,
            block_start: 0,
            last_record_end: 0,
            dropped_bytes: 0,
        }
    }

    /// Returns the next logical record, or `None` at the end of the log.
    pub fn read_record(&mut self) -> Result<Option<Vec<u8>>, WalError> {
        let mut scratch = Vec::new();
        let mut in_fragmented = false;

        loop {
            let Some((t, payload)) = self.read_physical()? else {
                if in_fragmented {
                    warn!(
                        bytes = scratch.len(),
                        "log ends inside a fragmented record; dropping it"
                    );
                    self.dropped_bytes += scratch.len() as u64;
                }
                return Ok(None);
            };
            let len = payload.len();

            match t {
                RecordType::Full => {
                    if in_fragmented {
                        self.drop_fragments(scratch.len(), "partial record without end");
                    }
                    self.mark_record_end();
                    return Ok(Some(self.block[payload].to_vec()));
                }
                RecordType::First => {
                    if in_fragmented {
                        self.drop_fragments(scratch.len(), "partial record without end");
                    }
                    scratch.clear();
                    scratch.extend_from_slice(&self.block[payload]);
                    in_fragmented = true;
                }
                RecordType::Middle if in_fragmented => {
                    scratch.extend_from_slice(&self.block[payload]);
                }
                RecordType::Last if in_fragmented => {
                    scratch.extend_from_slice(&self.block[payload]);
                    self.mark_record_end();
                    return Ok(Some(scratch));
                }
                RecordType::Middle | RecordType::Last => {
                    self.drop_fragments(len, "missing start of fragmented record");
                }
            }
        }
    }

    /// Calls `apply` for every remaining record.
    pub fn replay<F>(&mut self, mut apply: F) -> Result<(), WalError>
    where
        F: FnMut(Vec<u8>),
    {
        while let Some(record) = self.read_record()? {
            apply(record);
        }
        Ok(())
    }

    /// Stream offset just past the last record returned by
    /// [`read_record`](Self::read_record), or 0 if none was.
    ///
    /// Everything after this offset is either unread or damaged. Truncating
    /// a log to this length after a full replay leaves only intact records,
    /// so new records can be appended safely.
    pub fn last_record_end(&self) -> u64 {
        self.last_record_end
    }

    /// Bytes of fragment payload discarded so far.
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped_bytes
    }

    fn mark_record_end(&mut self) {
        self.last_record_end = self.block_start + self.pos as u64;
    }

    fn drop_fragments(&mut self, bytes: usize, reason: &'static str) {
        warn!(bytes, reason, "dropping log fragments");
        self.dropped_bytes += bytes as u64;
    }

    /// Reads the next physical record, returning its type and the payload's
    /// range in `self.block`.
    fn read_physical(&mut self) -> Result<Option<(RecordType, Range<usize>)>, WalError> {
        loop {
            if self.end - self.pos < HEADER_SIZE {
                if self.eof {
                    // Truncated header at the end of the log.
                    return Ok(None);
                }
                self.fill_block()?;
                continue;
            }

            let header = &self.block[self.pos..self.pos + HEADER_SIZE];
            let length = LittleEndian::read_u16(&header[4..6]) as usize;
            let type_byte = header[6];

            if type_byte == ZERO_TYPE && length == 0 {
                // Zero-filled space, e.g. a preallocated file.
                self.pos = self.end;
                continue;
            }

            if HEADER_SIZE + length > self.end - self.pos {
                if self.eof {
                    // Writer died before the payload made it out.
                    return Ok(None);
                }
                self.pos = self.end;
                return Err(WalError::Corrupt("bad record length"));
            }

            let stored = unmask(coding::decode_fixed32(header)?);
            // The checksum covers the type byte and the payload, which are
            // contiguous in the block.
            let actual = crc32c::crc32c(&self.block[self.pos + 6..self.pos + HEADER_SIZE + length]);
            if stored != actual {
                self.pos = self.end;
                return Err(WalError::Corrupt("checksum mismatch"));
            }

            let t = match RecordType::try_from(type_byte) {
                Ok(t) => t,
                Err(e) => {
                    self.pos = self.end;
                    return Err(e);
                }
            };

            let start = self.pos + HEADER_SIZE;
            self.pos = start + length;
            return Ok(Some((t, start..start + length)));
        }
    }

    /// Loads the next block. A short read marks the end of the log.
    fn fill_block(&mut self) -> Result<(), WalError> {
        self.block_start += self.end as u64;
        let mut filled = 0;
        while filled < BLOCK_SIZE {
            match self.src.read(&mut self.block[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(WalError::Io(e)),
            }
        }
        self.pos = 0;
        self.end = filled;
        if filled < BLOCK_SIZE {
            self.eof = true;
        }
        Ok(())
    }
}
