//! # Arena - bump allocator for memtable storage
//!
//! Memtable entries are small and numerous, and they are never freed
//! individually: a memtable is discarded as a whole once it has been
//! persisted. The arena exploits that by carving allocations out of large
//! blocks with a bump pointer.
//!
//! ## Allocation policy
//!
//! ```text
//! request fits in current block   -> bump the pointer
//! request > block_size / 4        -> dedicated block of exactly that size,
//!                                    current block is kept
//! otherwise                       -> fresh standard block becomes current,
//!                                    slack of the old one is abandoned
//! ```
//!
//! Blocks are `BytesMut` buffers. Each allocation is split off the front of
//! the current block, so it shares the block's storage and never moves.
//! Handing out owned `BytesMut` views instead of raw pointers means an
//! allocation can never outlive its block, and the whole arena is released
//! once the arena and every view into it are gone.
//!
//! ## Accounting
//!
//! [`Arena::memory_usage`] is a relaxed atomic counter of bytes reserved
//! (block sizes plus per-block bookkeeping). It is safe to read from any
//! thread while another thread allocates; it is approximate, never exact.

use bytes::BytesMut;
use parking_lot::Mutex;
use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::trace;

/// Standard block size in bytes.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Alignment guaranteed by [`Arena::allocate_aligned`].
pub const ALIGN: usize = if mem::size_of::<usize>() > 8 {
    mem::size_of::<usize>()
} else {
    8
};

const _: () = assert!(ALIGN.is_power_of_two());

/// Bookkeeping charged per block on top of its payload.
const BLOCK_OVERHEAD: usize = mem::size_of::<BytesMut>();

/// Bump-pointer allocator.
///
/// `allocate` takes `&self` so an arena can sit behind a shared memtable.
/// The allocation state is guarded by a mutex that is only ever contended
/// if two writers race, which the memtable contract rules out.
#[derive(Debug)]
pub struct Arena {
    block_size: usize,
    state: Mutex<AllocState>,
    memory_usage: AtomicUsize,
}

#[derive(Debug, Default)]
struct AllocState {
    /// Unused tail of the current standard block.
    current: BytesMut,
    blocks: usize,
}

impl Arena {
    pub fn new() -> Self {
        Self::with_block_size(DEFAULT_BLOCK_SIZE)
    }

    /// Creates an arena whose standard blocks are `block_size` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `block_size` is smaller than `4 * ALIGN`; below that the
    /// quarter-block threshold cannot absorb alignment padding.
    pub fn with_block_size(block_size: usize) -> Self {
        assert!(
            block_size >= 4 * ALIGN,
            "arena block size must be at least {} bytes",
            4 * ALIGN
        );
        Self {
            block_size,
            state: Mutex::new(AllocState::default()),
            memory_usage: AtomicUsize::new(0),
        }
    }

    /// Returns `n` fresh bytes with no alignment guarantee.
    ///
    /// The buffer is zero-filled. A zero-byte request returns an empty
    /// buffer and reserves nothing.
    pub fn allocate(&self, n: usize) -> BytesMut {
        if n == 0 {
            return BytesMut::new();
        }
        let mut state = self.state.lock();
        if n <= state.current.len() {
            return state.current.split_to(n);
        }
        self.allocate_fallback(&mut state, n, 1)
    }

    /// Returns `n` fresh bytes whose start address is a multiple of [`ALIGN`].
    pub fn allocate_aligned(&self, n: usize) -> BytesMut {
        if n == 0 {
            return BytesMut::new();
        }
        let mut state = self.state.lock();
        let slop = padding_for(state.current.as_ptr() as usize, ALIGN);
        if n + slop <= state.current.len() {
            let _ = state.current.split_to(slop);
            return state.current.split_to(n);
        }
        self.allocate_fallback(&mut state, n, ALIGN)
    }

    /// Approximate number of bytes reserved so far. Never decreases.
    pub fn memory_usage(&self) -> usize {
        self.memory_usage.load(Ordering::Relaxed)
    }

    /// Number of blocks (standard and dedicated) reserved so far.
    pub fn block_count(&self) -> usize {
        self.state.lock().blocks
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    fn allocate_fallback(&self, state: &mut AllocState, n: usize, align: usize) -> BytesMut {
        if n > self.block_size / 4 {
            // Large request: give it its own block and keep using the
            // current one for small allocations.
            let mut block = self.new_block(state, n + align - 1);
            let slop = padding_for(block.as_ptr() as usize, align);
            let _ = block.split_to(slop);
            block.truncate(n);
            return block;
        }

        // The remainder of the current block is abandoned.
        let mut block = self.new_block(state, self.block_size);
        let slop = padding_for(block.as_ptr() as usize, align);
        let _ = block.split_to(slop);
        let result = block.split_to(n);
        state.current = block;
        result
    }

    fn new_block(&self, state: &mut AllocState, size: usize) -> BytesMut {
        state.blocks += 1;
        self.memory_usage
            .fetch_add(size + BLOCK_OVERHEAD, Ordering::Relaxed);
        trace!(size, blocks = state.blocks, "arena block allocated");
        BytesMut::zeroed(size)
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

/// Bytes needed to round `addr` up to the next multiple of `align`.
fn padding_for(addr: usize, align: usize) -> usize {
    let rem = addr & (align - 1);
    if rem == 0 {
        0
    } else {
        align - rem
    }
}
