//! # Batch - atomic groups of writes
//!
//! A [`WriteBatch`] collects puts and deletes that must be applied all
//! together or not at all. The batch is kept in its serialized form at all
//! times, so the same buffer is what gets appended to the WAL and what is
//! replayed into the memtable.
//!
//! ## Binary format
//!
//! ```text
//! [sequence: u64 LE][count: u32 LE][record ...]
//!
//! record := [0x01][varint32 key_len][key][varint32 val_len][value]   put
//!         | [0x00][varint32 key_len][key]                            delete
//! ```
//!
//! `count` always equals the number of records. A buffer where they
//! disagree is corrupt.
//!
//! ## Example
//!
//! ```rust
//! use batch::{BatchOp, WriteBatch};
//!
//! let mut b = WriteBatch::new();
//! b.put(b"k1", b"v1");
//! b.delete(b"k2");
//! assert_eq!(b.count(), 2);
//!
//! let mut ops = Vec::new();
//! b.iterate(|op| ops.push(op.key().to_vec())).unwrap();
//! assert_eq!(ops, vec![b"k1".to_vec(), b"k2".to_vec()]);
//! ```

use coding::{decode_fixed32, decode_fixed64, encode_fixed32, encode_fixed64, CodingError};
use memtable::{MemTable, SequenceNumber, UserComparator, ValueType, MAX_SEQUENCE_NUMBER};
use thiserror::Error;
use tracing::{debug, warn};

/// Size of the `sequence + count` header.
pub const HEADER_SIZE: usize = 12;

/// Errors from decoding or applying a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// Buffer cannot even hold the header.
    #[error("malformed write batch: {0} bytes is smaller than the header")]
    TooSmall(usize),

    /// A record starts with a byte that is neither put nor delete.
    #[error("unknown write batch tag {0:#04x}")]
    UnknownTag(u8),

    /// A put record's key or value could not be decoded.
    #[error("bad write batch put: {0}")]
    BadPut(CodingError),

    /// A delete record's key could not be decoded.
    #[error("bad write batch delete: {0}")]
    BadDelete(CodingError),

    /// The header count disagrees with the records present.
    #[error("write batch has wrong count: header says {expected}, found {found}")]
    CountMismatch { expected: u32, found: u32 },

    /// Applying the batch would assign sequence numbers past the maximum.
    #[error("write batch sequence {start} + {count} exceeds the maximum sequence number")]
    SequenceOverflow { start: SequenceNumber, count: u32 },
}

impl BatchError {
    /// True for structural damage to the buffer, as opposed to a batch
    /// that is well formed but cannot be applied.
    pub fn is_corruption(&self) -> bool {
        !matches!(self, BatchError::SequenceOverflow { .. })
    }
}

/// One decoded operation, borrowing from the batch buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOp<'a> {
    Put { key: &'a [u8], value: &'a [u8] },
    Delete { key: &'a [u8] },
}

impl<'a> BatchOp<'a> {
    pub fn key(&self) -> &'a [u8] {
        match *self {
            BatchOp::Put { key, .. } | BatchOp::Delete { key } => key,
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            BatchOp::Put { .. } => ValueType::Value,
            BatchOp::Delete { .. } => ValueType::Deletion,
        }
    }
}

/// Serialized batch of puts and deletes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteBatch {
    rep: Vec<u8>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self {
            rep: vec![0; HEADER_SIZE],
        }
    }

    /// Adopts a serialized batch, e.g. one read back from the WAL.
    ///
    /// Only the header length is checked here; records are validated when
    /// the batch is iterated.
    pub fn from_contents(contents: impl Into<Vec<u8>>) -> Result<Self, BatchError> {
        let rep = contents.into();
        if rep.len() < HEADER_SIZE {
            return Err(BatchError::TooSmall(rep.len()));
        }
        Ok(Self { rep })
    }

    /// The serialized batch, header included.
    pub fn contents(&self) -> &[u8] {
        &self.rep
    }

    pub fn into_contents(self) -> Vec<u8> {
        self.rep
    }

    /// Appends a put of `key -> value`.
    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.set_count(self.count() + 1);
        self.rep.push(ValueType::Value.as_u8());
        coding::put_length_prefixed_slice(&mut self.rep, key);
        coding::put_length_prefixed_slice(&mut self.rep, value);
    }

    /// Appends a delete of `key`.
    pub fn delete(&mut self, key: &[u8]) {
        self.set_count(self.count() + 1);
        self.rep.push(ValueType::Deletion.as_u8());
        coding::put_length_prefixed_slice(&mut self.rep, key);
    }

    /// Drops every record and resets the header to sequence 0, count 0.
    pub fn clear(&mut self) {
        self.rep.clear();
        self.rep.resize(HEADER_SIZE, 0);
    }

    /// Appends the records of `other`. This batch keeps its own sequence.
    pub fn append(&mut self, other: &WriteBatch) {
        self.set_count(self.count() + other.count());
        self.rep.extend_from_slice(&other.rep[HEADER_SIZE..]);
    }

    /// Serialized size in bytes.
    pub fn approximate_size(&self) -> usize {
        self.rep.len()
    }

    /// Number of records according to the header.
    pub fn count(&self) -> u32 {
        decode_fixed32(&self.rep[8..HEADER_SIZE]).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Sequence number assigned to the first record.
    pub fn sequence(&self) -> SequenceNumber {
        decode_fixed64(&self.rep[..8]).unwrap_or(0)
    }

    pub fn set_sequence(&mut self, sequence: SequenceNumber) {
        encode_fixed64(&mut self.rep[..8], sequence);
    }

    fn set_count(&mut self, count: u32) {
        encode_fixed32(&mut self.rep[8..HEADER_SIZE], count);
    }

    /// Decodes the records in order without checking the header count.
    ///
    /// Decoding stops after the first error.
    pub fn ops(&self) -> Ops<'_> {
        Ops {
            input: &self.rep[HEADER_SIZE..],
            failed: false,
        }
    }

    /// Calls `apply` for every record, then checks that the number of
    /// records matches the header count.
    ///
    /// Records before a corrupt one have already been passed to `apply`
    /// when the error is returned. Use [`validate`](Self::validate) first
    /// when that matters.
    pub fn iterate<'a, F>(&'a self, mut apply: F) -> Result<(), BatchError>
    where
        F: FnMut(BatchOp<'a>),
    {
        let mut found = 0u32;
        for op in self.ops() {
            apply(op?);
            found = found.wrapping_add(1);
        }
        let expected = self.count();
        if found != expected {
            return Err(BatchError::CountMismatch { expected, found });
        }
        Ok(())
    }

    /// Checks the whole batch for corruption without applying anything.
    pub fn validate(&self) -> Result<(), BatchError> {
        self.iterate(|_| {})
    }

    /// Replays the batch into `mem`. The `i`th record gets sequence number
    /// `self.sequence() + i`.
    ///
    /// The batch is validated first, so a corrupt batch leaves `mem`
    /// untouched.
    pub fn insert_into<C: UserComparator>(&self, mem: &MemTable<C>) -> Result<(), BatchError> {
        if let Err(e) = self.validate() {
            warn!(error = %e, "rejecting corrupt write batch");
            return Err(e);
        }

        let start = self.sequence();
        let count = self.count();
        if count > 0 && start.saturating_add(u64::from(count) - 1) > MAX_SEQUENCE_NUMBER {
            return Err(BatchError::SequenceOverflow { start, count });
        }

        let mut sequence = start;
        self.iterate(|op| {
            match op {
                BatchOp::Put { key, value } => mem.add(sequence, ValueType::Value, key, value),
                BatchOp::Delete { key } => mem.add(sequence, ValueType::Deletion, key, &[]),
            }
            sequence += 1;
        })?;

        debug!(sequence = start, count, "write batch applied to memtable");
        Ok(())
    }
}

impl Default for WriteBatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the records of a [`WriteBatch`]. Created by
/// [`WriteBatch::ops`].
pub struct Ops<'a> {
    input: &'a [u8],
    failed: bool,
}

impl<'a> Iterator for Ops<'a> {
    type Item = Result<BatchOp<'a>, BatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.input.is_empty() {
            return None;
        }
        let result = self.decode_one();
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}

impl<'a> Ops<'a> {
    fn decode_one(&mut self) -> Result<BatchOp<'a>, BatchError> {
        let input: &'a [u8] = self.input;
        let tag = input[0];
        let mut rest = &input[1..];
        let op = match ValueType::try_from(tag) {
            Ok(ValueType::Value) => {
                let key = coding::get_length_prefixed_slice(&mut rest).map_err(BatchError::BadPut)?;
                let value =
                    coding::get_length_prefixed_slice(&mut rest).map_err(BatchError::BadPut)?;
                BatchOp::Put { key, value }
            }
            Ok(ValueType::Deletion) => {
                let key =
                    coding::get_length_prefixed_slice(&mut rest).map_err(BatchError::BadDelete)?;
                BatchOp::Delete { key }
            }
            Err(_) => return Err(BatchError::UnknownTag(tag)),
        };
        self.input = rest;
        Ok(op)
    }
}
