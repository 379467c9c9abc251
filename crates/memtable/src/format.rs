//! Internal key format shared by the memtable, the write batch and the log.
//!
//! An *internal key* is a user key followed by an 8-byte little-endian tag:
//!
//! ```text
//! [user_key ...][tag: u64 LE]      tag = (sequence << 8) | value_type
//! ```
//!
//! Internal keys order by user key ascending (per the [`UserComparator`]),
//! then by tag **descending**, so the newest version of a key comes first.

use coding::{encode_varint32, put_fixed64, put_varint32, varint_length, CodingError};
use std::cmp::Ordering;
use std::marker::PhantomData;
use thiserror::Error;

/// Logical timestamp assigned to every mutation.
pub type SequenceNumber = u64;

/// Sequence numbers occupy the upper 56 bits of the tag.
pub const MAX_SEQUENCE_NUMBER: SequenceNumber = (1 << 56) - 1;

/// Size of the packed `(sequence, type)` tag at the end of an internal key.
pub const TAG_SIZE: usize = 8;

/// Operation recorded by an entry. The discriminants are part of the
/// on-disk format of both memtable entries and write batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueType {
    /// Tombstone.
    Deletion = 0x0,
    /// Key-value insertion.
    Value = 0x1,
}

/// Type used when building a seek target. It is the highest-numbered type,
/// so under the descending tag order the target sorts before every entry
/// with the same user key and sequence number.
pub const VALUE_TYPE_FOR_SEEK: ValueType = ValueType::Value;

impl ValueType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ValueType {
    type Error = FormatError;

    fn try_from(byte: u8) -> Result<Self, FormatError> {
        match byte {
            0x0 => Ok(ValueType::Deletion),
            0x1 => Ok(ValueType::Value),
            other => Err(FormatError::UnknownValueType(other)),
        }
    }
}

/// Errors raised while parsing internal keys or memtable entries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error(transparent)]
    Coding(#[from] CodingError),

    #[error("internal key too short: {0} bytes")]
    KeyTooShort(usize),

    #[error("unknown value type: {0:#04x}")]
    UnknownValueType(u8),
}

/// Packs a sequence number and value type into a tag.
///
/// # Panics
///
/// Panics if `sequence` exceeds [`MAX_SEQUENCE_NUMBER`]; it would spill
/// into the type byte.
#[inline]
pub fn pack_sequence_and_type(sequence: SequenceNumber, value_type: ValueType) -> u64 {
    assert!(
        sequence <= MAX_SEQUENCE_NUMBER,
        "sequence number {sequence} exceeds the tag limit"
    );
    (sequence << 8) | u64::from(value_type.as_u8())
}

/// Splits a tag back into its sequence number and value type.
pub fn unpack_tag(tag: u64) -> Result<(SequenceNumber, ValueType), FormatError> {
    let value_type = ValueType::try_from((tag & 0xff) as u8)?;
    Ok((tag >> 8, value_type))
}

/// Borrowed view of a decoded internal key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedInternalKey<'a> {
    pub user_key: &'a [u8],
    pub sequence: SequenceNumber,
    pub value_type: ValueType,
}

impl<'a> ParsedInternalKey<'a> {
    pub fn new(user_key: &'a [u8], sequence: SequenceNumber, value_type: ValueType) -> Self {
        Self {
            user_key,
            sequence,
            value_type,
        }
    }

    /// Parses `internal_key`, checking length and value type.
    pub fn parse(internal_key: &'a [u8]) -> Result<Self, FormatError> {
        if internal_key.len() < TAG_SIZE {
            return Err(FormatError::KeyTooShort(internal_key.len()));
        }
        let split = internal_key.len() - TAG_SIZE;
        let tag = coding::decode_fixed64(&internal_key[split..])?;
        let (sequence, value_type) = unpack_tag(tag)?;
        Ok(Self {
            user_key: &internal_key[..split],
            sequence,
            value_type,
        })
    }

    pub fn tag(&self) -> u64 {
        pack_sequence_and_type(self.sequence, self.value_type)
    }

    /// Appends the encoded internal key to `dst`.
    pub fn encode_into(&self, dst: &mut Vec<u8>) {
        dst.extend_from_slice(self.user_key);
        put_fixed64(dst, self.tag());
    }
}

/// Total order over user keys.
///
/// Comparators are stateless types chosen when a memtable is created; the
/// ordering is fixed for the memtable's lifetime.
pub trait UserComparator: Send + Sync + 'static {
    /// Name persisted alongside data ordered by this comparator.
    fn name() -> &'static str;

    fn compare(a: &[u8], b: &[u8]) -> Ordering;
}

/// Lexicographic byte order.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytewiseComparator;

impl UserComparator for BytewiseComparator {
    fn name() -> &'static str {
        "shoal.BytewiseComparator"
    }

    fn compare(a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// Orders internal keys: user key ascending, then tag descending.
#[derive(Debug, Clone, Copy, Default)]
pub struct InternalKeyComparator<C>(PhantomData<fn() -> C>);

impl<C: UserComparator> InternalKeyComparator<C> {
    pub fn new() -> Self {
        Self(PhantomData)
    }

    #[inline]
    pub fn compare_parts(a_user: &[u8], a_tag: u64, b_user: &[u8], b_tag: u64) -> Ordering {
        C::compare(a_user, b_user).then_with(|| b_tag.cmp(&a_tag))
    }

    pub fn compare(&self, a: &ParsedInternalKey<'_>, b: &ParsedInternalKey<'_>) -> Ordering {
        Self::compare_parts(a.user_key, a.tag(), b.user_key, b.tag())
    }

    /// Compares two encoded internal keys.
    pub fn compare_encoded(&self, a: &[u8], b: &[u8]) -> Result<Ordering, FormatError> {
        let a = ParsedInternalKey::parse(a)?;
        let b = ParsedInternalKey::parse(b)?;
        Ok(self.compare(&a, &b))
    }
}

/// Seek target for a point lookup of `user_key` as of `sequence`.
///
/// Layout matches the key half of a memtable entry:
///
/// ```text
/// [varint32(user_key.len() + 8)][user_key][tag: u64 LE]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupKey {
    buf: Vec<u8>,
    key_start: usize,
    sequence: SequenceNumber,
}

impl LookupKey {
    /// Builds a lookup key. Sequences above [`MAX_SEQUENCE_NUMBER`] are
    /// clamped, so `u64::MAX` reads the latest version.
    ///
    /// # Panics
    ///
    /// Panics if `user_key` is longer than `u32::MAX - 8` bytes.
    pub fn new(user_key: &[u8], sequence: SequenceNumber) -> Self {
        let sequence = sequence.min(MAX_SEQUENCE_NUMBER);
        let internal_len = u32::try_from(user_key.len() + TAG_SIZE)
            .expect("user key exceeds u32::MAX bytes");
        let key_start = varint_length(u64::from(internal_len));

        let mut buf = Vec::with_capacity(key_start + user_key.len() + TAG_SIZE);
        put_varint32(&mut buf, internal_len);
        debug_assert_eq!(buf.len(), key_start);
        buf.extend_from_slice(user_key);
        put_fixed64(&mut buf, pack_sequence_and_type(sequence, VALUE_TYPE_FOR_SEEK));

        Self {
            buf,
            key_start,
            sequence,
        }
    }

    /// Length-prefixed internal key, as stored at the front of a memtable entry.
    pub fn memtable_key(&self) -> &[u8] {
        &self.buf
    }

    pub fn internal_key(&self) -> &[u8] {
        &self.buf[self.key_start..]
    }

    pub fn user_key(&self) -> &[u8] {
        &self.buf[self.key_start..self.buf.len() - TAG_SIZE]
    }

    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }
}

/// Exact size of a memtable entry for the given key and value lengths.
pub fn encoded_entry_len(key_len: usize, value_len: usize) -> usize {
    let internal_len = key_len + TAG_SIZE;
    varint_length(internal_len as u64) + internal_len + varint_length(value_len as u64) + value_len
}

/// Writes a memtable entry into `dst`, which must be exactly
/// [`encoded_entry_len`] bytes long:
///
/// ```text
/// [varint32(key_len + 8)][user_key][tag: u64 LE][varint32(value_len)][value]
/// ```
///
/// Returns the offsets `(key_start, value_start)` of the user key and the
/// value within `dst`.
pub(crate) fn encode_entry(
    dst: &mut [u8],
    sequence: SequenceNumber,
    value_type: ValueType,
    user_key: &[u8],
    value: &[u8],
) -> (usize, usize) {
    let internal_len = user_key.len() + TAG_SIZE;
    let mut p = encode_varint32(dst, internal_len as u32);
    let key_start = p;
    dst[p..p + user_key.len()].copy_from_slice(user_key);
    p += user_key.len();
    coding::encode_fixed64(&mut dst[p..], pack_sequence_and_type(sequence, value_type));
    p += TAG_SIZE;
    p += encode_varint32(&mut dst[p..], value.len() as u32);
    let value_start = p;
    dst[p..p + value.len()].copy_from_slice(value);
    debug_assert_eq!(p + value.len(), dst.len());
    (key_start, value_start)
}
