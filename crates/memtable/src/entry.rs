//! Skiplist element wrapping one arena-resident memtable entry.

use bytes::Bytes;
use std::cmp::Ordering;
use std::marker::PhantomData;

use crate::format::{
    pack_sequence_and_type, InternalKeyComparator, LookupKey, SequenceNumber, UserComparator,
    ValueType, TAG_SIZE,
};

/// An encoded entry plus the offsets needed to compare it without
/// re-decoding varints on every skiplist comparison.
///
/// `sequence` and `value_type` are copies of the encoded tag, checked
/// against it on construction.
///
/// `ordinal` breaks ties between entries with identical internal keys so
/// the skiplist keeps both; the later insert sorts first.
pub(crate) struct MemKey<C> {
    buf: Bytes,
    key_start: u32,
    key_end: u32,
    value_start: u32,
    sequence: SequenceNumber,
    value_type: ValueType,
    ordinal: u64,
    _cmp: PhantomData<fn() -> C>,
}

impl<C: UserComparator> MemKey<C> {
    /// Wraps an entry produced by `format::encode_entry`.
    pub(crate) fn new(
        buf: Bytes,
        key_start: usize,
        key_len: usize,
        value_start: usize,
        sequence: SequenceNumber,
        value_type: ValueType,
        ordinal: u64,
    ) -> Self {
        let key_end = key_start + key_len;
        debug_assert_eq!(
            coding::decode_fixed64(&buf[key_end..key_end + TAG_SIZE]).ok(),
            Some(pack_sequence_and_type(sequence, value_type)),
            "cached sequence/type disagree with the encoded tag"
        );
        Self {
            buf,
            key_start: key_start as u32,
            key_end: key_end as u32,
            value_start: value_start as u32,
            sequence,
            value_type,
            ordinal,
            _cmp: PhantomData,
        }
    }

    /// Builds a seek target that sorts at or before every entry for the lookup's
    /// user key whose sequence is not newer than the lookup's.
    pub(crate) fn seek_target(lookup: &LookupKey) -> Self {
        let memtable_key = lookup.memtable_key();
        let key_end = memtable_key.len() - TAG_SIZE;
        let key_start = key_end - lookup.user_key().len();
        Self {
            buf: Bytes::copy_from_slice(memtable_key),
            key_start: key_start as u32,
            key_end: key_end as u32,
            value_start: memtable_key.len() as u32,
            sequence: lookup.sequence(),
            value_type: crate::format::VALUE_TYPE_FOR_SEEK,
            ordinal: u64::MAX,
            _cmp: PhantomData,
        }
    }

    pub(crate) fn user_key(&self) -> &[u8] {
        &self.buf[self.key_start as usize..self.key_end as usize]
    }

    pub(crate) fn value(&self) -> &[u8] {
        &self.buf[self.value_start as usize..]
    }

    /// The value as a zero-copy handle into arena memory.
    pub(crate) fn value_bytes(&self) -> Bytes {
        self.buf.slice(self.value_start as usize..)
    }

    pub(crate) fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    pub(crate) fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub(crate) fn internal_key(&self) -> &[u8] {
        &self.buf[self.key_start as usize..self.key_end as usize + TAG_SIZE]
    }

    fn tag(&self) -> u64 {
        pack_sequence_and_type(self.sequence, self.value_type)
    }
}

impl<C: UserComparator> Ord for MemKey<C> {
    fn cmp(&self, other: &Self) -> Ordering {
        InternalKeyComparator::<C>::compare_parts(
            self.user_key(),
            self.tag(),
            other.user_key(),
            other.tag(),
        )
        .then_with(|| other.ordinal.cmp(&self.ordinal))
    }
}

impl<C: UserComparator> PartialOrd for MemKey<C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<C: UserComparator> PartialEq for MemKey<C> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<C: UserComparator> Eq for MemKey<C> {}
