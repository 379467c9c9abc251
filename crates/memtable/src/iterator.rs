use crossbeam_skiplist::set::Entry;
use crossbeam_skiplist::SkipSet;
use std::ops::Bound;

use crate::entry::MemKey;
use crate::format::{LookupKey, SequenceNumber, UserComparator, ValueType, MAX_SEQUENCE_NUMBER};

/// Bidirectional cursor over a memtable.
///
/// The cursor starts unpositioned; call one of the `seek*` methods first.
/// Accessors return `None` while the cursor is not on an entry. Keys are
/// exposed without the sequence/type suffix; use [`sequence`] and
/// [`value_type`] to inspect the version. Nothing is copied: key and value
/// slices point into arena memory.
///
/// [`sequence`]: MemTableIterator::sequence
/// [`value_type`]: MemTableIterator::value_type
pub struct MemTableIterator<'a, C: UserComparator> {
    table: &'a SkipSet<MemKey<C>>,
    current: Option<Entry<'a, MemKey<C>>>,
}

impl<'a, C: UserComparator> MemTableIterator<'a, C> {
    pub(crate) fn new(table: &'a SkipSet<MemKey<C>>) -> Self {
        Self {
            table,
            current: None,
        }
    }

    pub fn valid(&self) -> bool {
        self.current.is_some()
    }

    pub fn seek_to_first(&mut self) {
        self.current = self.table.front();
    }

    pub fn seek_to_last(&mut self) {
        self.current = self.table.back();
    }

    /// Positions at the newest version of the first user key `>= user_key`.
    pub fn seek(&mut self, user_key: &[u8]) {
        self.seek_at(user_key, MAX_SEQUENCE_NUMBER);
    }

    /// Positions at the first entry at or after `(user_key, sequence)` in
    /// internal-key order.
    pub fn seek_at(&mut self, user_key: &[u8], sequence: SequenceNumber) {
        let target = MemKey::<C>::seek_target(&LookupKey::new(user_key, sequence));
        self.current = self.table.lower_bound(Bound::Included(&target));
    }

    /// Moves to the next entry. An unpositioned cursor stays unpositioned.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) {
        self.current = self.current.take().and_then(|e| e.next());
    }

    /// Moves to the previous entry. An unpositioned cursor stays unpositioned.
    pub fn prev(&mut self) {
        self.current = self.current.take().and_then(|e| e.prev());
    }

    pub fn key(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|e| e.value().user_key())
    }

    pub fn value(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|e| e.value().value())
    }

    /// Encoded internal key (user key plus tag) at the cursor.
    pub fn internal_key(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|e| e.value().internal_key())
    }

    pub fn sequence(&self) -> Option<SequenceNumber> {
        self.current.as_ref().map(|e| e.value().sequence())
    }

    pub fn value_type(&self) -> Option<ValueType> {
        self.current.as_ref().map(|e| e.value().value_type())
    }
}
