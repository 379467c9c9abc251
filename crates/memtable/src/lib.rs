//! # Memtable - in-memory sorted table of recent writes
//!
//! Every mutation that reaches the memtable is stored as a self-contained
//! entry in arena memory:
//!
//! ```text
//! [varint32(key_len + 8)][user_key][tag: u64 LE][varint32(value_len)][value]
//!                                   tag = (sequence << 8) | value_type
//! ```
//!
//! Entries are never updated or removed in place. A newer write to the same
//! key is a new entry with a higher sequence number, and a delete is a
//! tombstone entry. Entries sort by user key ascending and sequence
//! descending, so a seek for `(key, snapshot)` lands on the newest version
//! visible at that snapshot.
//!
//! ## Concurrency
//!
//! One writer calls [`MemTable::add`] at a time; any number of threads may
//! concurrently call [`MemTable::get`] or walk a [`MemTableIterator`]. The
//! ordered index is a lock-free `crossbeam_skiplist::SkipSet`.
//!
//! ## Sharing
//!
//! A memtable is typically referenced by both the active write path and a
//! background reader. Wrap it in an `Arc`; the arena and all entries are
//! released exactly once, when the last handle drops.
//!
//! ## Example
//!
//! ```rust
//! use memtable::{Lookup, LookupKey, MemTable, ValueType};
//!
//! let mem = MemTable::new();
//! mem.add(1, ValueType::Value, b"k", b"v1");
//! mem.add(2, ValueType::Deletion, b"k", b"");
//!
//! assert!(matches!(mem.get(&LookupKey::new(b"k", 1)), Lookup::Found(v) if v == "v1"));
//! assert_eq!(mem.get(&LookupKey::new(b"k", 2)), Lookup::Deleted);
//! ```

mod entry;
pub mod format;
mod iterator;

use arena::Arena;
use bytes::Bytes;
use crossbeam_skiplist::SkipSet;
use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use entry::MemKey;
pub use format::{
    BytewiseComparator, FormatError, InternalKeyComparator, LookupKey, ParsedInternalKey,
    SequenceNumber, UserComparator, ValueType, MAX_SEQUENCE_NUMBER,
};
pub use iterator::MemTableIterator;

/// Outcome of a point lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// The newest visible version is a value.
    Found(Bytes),
    /// The newest visible version is a tombstone. Older versions must not
    /// be consulted.
    Deleted,
    /// The memtable holds no visible version of the key.
    NotFound,
}

impl Lookup {
    /// The value, treating tombstones as absent.
    pub fn into_value(self) -> Option<Bytes> {
        match self {
            Lookup::Found(v) => Some(v),
            Lookup::Deleted | Lookup::NotFound => None,
        }
    }

    /// True when the memtable settled the lookup, either way.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Lookup::NotFound)
    }
}

/// Arena-backed, append-only ordered table of internal keys.
pub struct MemTable<C: UserComparator = BytewiseComparator> {
    arena: Arena,
    table: SkipSet<MemKey<C>>,
    next_ordinal: AtomicU64,
}

impl MemTable<BytewiseComparator> {
    /// Creates an empty memtable ordered bytewise.
    pub fn new() -> Self {
        Self::with_arena(Arena::new())
    }
}

impl Default for MemTable<BytewiseComparator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: UserComparator> MemTable<C> {
    /// Creates an empty memtable ordered by `C`, allocating from `arena`.
    pub fn with_arena(arena: Arena) -> Self {
        debug!(
            comparator = C::name(),
            block_size = arena.block_size(),
            "memtable created"
        );
        Self {
            arena,
            table: SkipSet::new(),
            next_ordinal: AtomicU64::new(0),
        }
    }

    /// Inserts one entry. `value` is ignored by readers for deletions and is
    /// normally empty.
    ///
    /// # Panics
    ///
    /// Panics if `sequence` exceeds [`MAX_SEQUENCE_NUMBER`], or if
    /// `key.len() + 8` or `value.len()` does not fit in a `u32`.
    pub fn add(&self, sequence: SequenceNumber, value_type: ValueType, key: &[u8], value: &[u8]) {
        assert!(
            sequence <= MAX_SEQUENCE_NUMBER,
            "sequence number {sequence} exceeds the tag limit"
        );
        assert!(
            u32::try_from(key.len() + format::TAG_SIZE).is_ok()
                && u32::try_from(value.len()).is_ok(),
            "memtable entry too large"
        );

        let len = format::encoded_entry_len(key.len(), value.len());
        let mut buf = self.arena.allocate(len);
        let (key_start, value_start) =
            format::encode_entry(&mut buf, sequence, value_type, key, value);

        let ordinal = self.next_ordinal.fetch_add(1, Ordering::Relaxed);
        self.table.insert(MemKey::new(
            buf.freeze(),
            key_start,
            key.len(),
            value_start,
            sequence,
            value_type,
            ordinal,
        ));
    }

    /// Looks up the newest version of `key.user_key()` whose sequence is at
    /// most `key.sequence()`.
    pub fn get(&self, key: &LookupKey) -> Lookup {
        let target = MemKey::<C>::seek_target(key);
        let Some(entry) = self.table.lower_bound(Bound::Included(&target)) else {
            return Lookup::NotFound;
        };
        let found = entry.value();
        if C::compare(found.user_key(), key.user_key()) != CmpOrdering::Equal {
            return Lookup::NotFound;
        }
        match found.value_type() {
            ValueType::Value => Lookup::Found(found.value_bytes()),
            ValueType::Deletion => Lookup::Deleted,
        }
    }

    /// Returns an unpositioned cursor over every entry, tombstones and
    /// shadowed versions included.
    pub fn iter(&self) -> MemTableIterator<'_, C> {
        MemTableIterator::new(&self.table)
    }

    /// Bytes reserved by the backing arena. Safe to call from any thread.
    pub fn approximate_memory_usage(&self) -> usize {
        self.arena.memory_usage()
    }

    /// Number of entries, counting every version and tombstone.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl<C: UserComparator> fmt::Debug for MemTable<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemTable")
            .field("comparator", &C::name())
            .field("entries", &self.len())
            .field("memory_usage", &self.approximate_memory_usage())
            .finish()
    }
}

impl<C: UserComparator> Drop for MemTable<C> {
    fn drop(&mut self) {
        debug!(
            entries = self.table.len(),
            memory_usage = self.arena.memory_usage(),
            "memtable released"
        );
    }
}
