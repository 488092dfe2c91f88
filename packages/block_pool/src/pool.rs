use std::mem;
use std::num::NonZero;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use tracing::{debug, trace, warn};

use crate::{BlockArena, BlockHandle, BlockPoolBuilder, DropPolicy, Error, Result};

/// Global counter for generating unique pool IDs.
static POOL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generates a unique pool ID.
fn generate_pool_id() -> u64 {
    POOL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A fixed-capacity pool of equally sized memory blocks.
///
/// All blocks live in one contiguous arena allocated when the pool is created. Acquiring and
/// releasing a block are O(1) and never allocate. The number of blocks never changes during
/// the lifetime of the pool.
///
/// # Block size
///
/// Every block holds [`block_size()`](Self::block_size) bytes, which is the requested size
/// raised to at least `size_of::<usize>()` and rounded up to the configured block alignment.
/// Requests for more than that fail with [`Error::Size`].
///
/// # Reuse order
///
/// Released blocks are handed out again most-recently-released first. The block acquired right
/// after a release is always the one just released.
///
/// # Memory contents
///
/// The arena is zeroed when the pool is created but the pool never zeroes a block on acquire
/// or release. A reacquired block may contain whatever its previous occupant left behind;
/// callers that need zeroed memory must clear the block themselves.
///
/// # Examples
///
/// ```
/// use block_pool::BlockPool;
/// use new_zealand::nz;
///
/// let mut pool = BlockPool::new(nz!(4), 8).unwrap();
///
/// let handle = pool.acquire(8).unwrap().expect("pool has free blocks");
/// pool.block_mut(handle).unwrap().copy_from_slice(b"payload!");
/// assert_eq!(pool.block(handle).unwrap(), b"payload!");
///
/// pool.release(handle).unwrap();
/// assert!(!pool.is_valid(handle));
/// ```
///
/// # Thread safety
///
/// The pool is thread-mobile ([`Send`]) but not thread-safe ([`Sync`]). Wrap it in a mutex or
/// give each thread its own pool if several threads need blocks.
#[derive(Debug)]
pub struct BlockPool {
    /// Unique ID stamped into every handle this pool issues.
    pool_id: u64,

    arena: BlockArena,

    /// One entry per arena slot. Holds both the liveness of the slot and, for vacant slots,
    /// the link to the next vacant slot.
    slots: Box<[SlotState]>,

    /// Head of the free list. Equal to the block count when the pool is full.
    next_free_index: usize,

    /// Number of acquired blocks.
    live_count: usize,

    drop_policy: DropPolicy,
}

/// State of one arena slot.
///
/// The free list is kept here instead of inside the slot memory, so released payload bytes are
/// never reinterpreted as a link.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SlotState {
    /// The slot is owned by a caller.
    Occupied,

    /// The slot is on the free list.
    Vacant {
        /// Index of the next vacant slot, or the block count if this is the last one.
        next_free_index: usize,
    },
}

impl BlockPool {
    /// Creates a pool of `block_count` blocks of at least `block_size` bytes each.
    ///
    /// Use [`builder()`](Self::builder) to configure alignment or the drop policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Overflow`] if the arena size does not fit in the address space and
    /// [`Error::OutOfMemory`] if the arena cannot be allocated. Nothing is allocated when the
    /// size calculation overflows.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_pool::BlockPool;
    /// use new_zealand::nz;
    ///
    /// let pool = BlockPool::new(nz!(1024), 64).unwrap();
    ///
    /// assert_eq!(pool.capacity(), 1024);
    /// assert_eq!(pool.block_size(), 64);
    /// ```
    pub fn new(block_count: NonZero<usize>, block_size: usize) -> Result<Self> {
        Self::builder()
            .block_count(block_count)
            .block_size(block_size)
            .build()
    }

    /// Creates a builder for configuring and constructing a [`BlockPool`].
    ///
    /// # Examples
    ///
    /// ```
    /// use block_pool::BlockPool;
    /// use new_zealand::nz;
    ///
    /// let pool = BlockPool::builder()
    ///     .block_count(nz!(32))
    ///     .block_size_of::<[u64; 4]>()
    ///     .build()
    ///     .unwrap();
    ///
    /// assert_eq!(pool.block_size(), 32);
    /// assert_eq!(pool.block_align(), 8);
    /// ```
    #[inline]
    pub fn builder() -> BlockPoolBuilder {
        BlockPoolBuilder::new()
    }

    pub(crate) fn new_inner(
        block_count: NonZero<usize>,
        block_size: usize,
        block_align: usize,
        drop_policy: DropPolicy,
    ) -> Result<Self> {
        let arena = BlockArena::new(block_count, block_size, block_align)?;

        // Each slot links to its successor. The last one links to the block count, which
        // marks the end of the free list.
        let slots = (0..block_count.get())
            .map(|index| SlotState::Vacant {
                // Cannot overflow because the arena would not fit in memory otherwise.
                next_free_index: index.wrapping_add(1),
            })
            .collect();

        let pool = Self {
            pool_id: generate_pool_id(),
            arena,
            slots,
            next_free_index: 0,
            live_count: 0,
            drop_policy,
        };

        debug!(
            pool_id = pool.pool_id,
            block_count = block_count.get(),
            block_size = pool.block_size(),
            block_align = pool.block_align(),
            "created block pool"
        );

        Ok(pool)
    }

    /// Releases the arena and all bookkeeping of the pool.
    ///
    /// Equivalent to dropping the pool. Handles and pointers issued by the pool must not be
    /// dereferenced afterwards.
    ///
    /// # Panics
    ///
    /// Panics if blocks are still acquired and the pool was created with
    /// [`DropPolicy::MustNotDropLiveBlocks`].
    #[cfg_attr(test, mutants::skip)] // Dropping happens regardless of what this body does.
    pub fn destroy(self) {
        drop(self);
    }

    /// Number of blocks in the pool, fixed at creation.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.arena.block_count().get()
    }

    /// Number of blocks currently acquired.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live_count
    }

    /// Whether no blocks are currently acquired.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live_count == 0
    }

    /// Number of blocks that can still be acquired.
    #[must_use]
    pub fn free_count(&self) -> usize {
        // Cannot underflow because live_count never exceeds the block count.
        self.capacity().wrapping_sub(self.live_count)
    }

    /// Usable size of every block in bytes, and the distance between adjacent blocks.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.arena.block_stride()
    }

    /// Alignment in bytes that every block is guaranteed to have.
    ///
    /// This is the alignment configured on the builder (1 by default). The block size is always
    /// a multiple of it.
    #[must_use]
    pub fn block_align(&self) -> usize {
        self.arena.block_align()
    }

    /// The drop policy the pool was created with.
    #[must_use]
    pub fn drop_policy(&self) -> DropPolicy {
        self.drop_policy
    }

    /// Whether every block is acquired, so the next [`acquire()`](Self::acquire) will
    /// return `Ok(None)`.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.next_free_index >= self.capacity()
    }

    /// Acquires a block able to hold `requested_size` bytes.
    ///
    /// Returns `Ok(None)` if every block is already acquired. This is the expected outcome of
    /// an exhausted pool, not an error.
    ///
    /// The block is not zeroed. It holds either zeroes (never used before) or whatever the
    /// previous occupant wrote.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Size`] if `requested_size` exceeds [`block_size()`](Self::block_size).
    /// The pool is left unchanged in that case.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_pool::BlockPool;
    /// use new_zealand::nz;
    ///
    /// let mut pool = BlockPool::new(nz!(1), 16).unwrap();
    ///
    /// let first = pool.acquire(16).unwrap();
    /// assert!(first.is_some());
    ///
    /// // The only block is taken.
    /// assert!(pool.acquire(16).unwrap().is_none());
    ///
    /// // Too large for any block, regardless of fullness.
    /// assert!(pool.acquire(17).is_err());
    /// ```
    pub fn acquire(&mut self, requested_size: usize) -> Result<Option<BlockHandle>> {
        if requested_size > self.block_size() {
            return Err(Error::Size {
                requested: requested_size,
                block_size: self.block_size(),
            });
        }

        if self.is_full() {
            trace!(pool_id = self.pool_id, "block pool is full");
            return Ok(None);
        }

        // Pop the head of the free list.
        let index = self.next_free_index;

        let slot = self
            .slots
            .get_mut(index)
            .expect("free list head is in bounds whenever the pool is not full");

        self.next_free_index = match mem::replace(slot, SlotState::Occupied) {
            SlotState::Vacant { next_free_index } => next_free_index,
            SlotState::Occupied => {
                panic!(
                    "free list head {index} points to an occupied slot in pool of {} blocks",
                    self.arena.block_count()
                );
            }
        };

        // Cannot overflow because it is bounded by the block count.
        self.live_count = self.live_count.wrapping_add(1);

        #[cfg(debug_assertions)]
        self.integrity_check();

        trace!(pool_id = self.pool_id, index, "acquired block");

        Ok(Some(BlockHandle::new(
            self.pool_id,
            index,
            self.arena.block_ptr(index),
        )))
    }

    /// Acquires a block sized for a value of type `T`.
    ///
    /// Shorthand for `acquire(size_of::<T>())`. The block is only suitably aligned for `T` if
    /// the pool was built with at least `align_of::<T>()` alignment, for example via
    /// [`BlockPoolBuilder::block_size_of()`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Size`] if `T` does not fit in a block.
    pub fn acquire_for<T>(&mut self) -> Result<Option<BlockHandle>> {
        self.acquire(size_of::<T>())
    }

    /// Returns a block to the pool.
    ///
    /// The block becomes the next one handed out by [`acquire()`](Self::acquire). Its contents
    /// are left as they are.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPointer`] if the handle was issued by a different pool or the
    /// block was already released. The pool is left unchanged in that case.
    pub fn release(&mut self, handle: BlockHandle) -> Result<()> {
        let address = handle.ptr().as_ptr().addr();

        if handle.pool_id() != self.pool_id {
            warn!(
                pool_id = self.pool_id,
                foreign_pool_id = handle.pool_id(),
                "rejected release of a block from a different pool"
            );
            return Err(Error::InvalidPointer { address });
        }

        self.release_index(handle.index(), address)
    }

    /// Returns a block to the pool, identifying it by its address.
    ///
    /// The address is checked the same way as by [`is_valid_ptr()`](Self::is_valid_ptr)
    /// before the pool is touched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPointer`] if the pointer is outside the arena, does not point at
    /// the start of a block or points at a block that is not acquired. The pool is left
    /// unchanged in that case.
    pub fn release_ptr(&mut self, ptr: NonNull<u8>) -> Result<()> {
        let address = ptr.as_ptr().addr();

        let Some(index) = self.arena.index_of(address) else {
            warn!(
                pool_id = self.pool_id,
                address, "rejected release of an address outside the block grid"
            );
            return Err(Error::InvalidPointer { address });
        };

        self.release_index(index, address)
    }

    fn release_index(&mut self, index: usize, address: usize) -> Result<()> {
        if !self.is_live(index) {
            warn!(
                pool_id = self.pool_id,
                index, "rejected release of a block that is not acquired"
            );
            return Err(Error::InvalidPointer { address });
        }

        let slot = self
            .slots
            .get_mut(index)
            .expect("liveness check above guarantees the index is in bounds");

        // Push the released slot onto the free list.
        *slot = SlotState::Vacant {
            next_free_index: self.next_free_index,
        };
        self.next_free_index = index;

        // Cannot underflow because the slot was occupied.
        self.live_count = self.live_count.wrapping_sub(1);

        #[cfg(debug_assertions)]
        self.integrity_check();

        trace!(pool_id = self.pool_id, index, "released block");

        Ok(())
    }

    /// Whether the handle refers to a block of this pool that is currently acquired.
    #[must_use]
    pub fn is_valid(&self, handle: BlockHandle) -> bool {
        handle.pool_id() == self.pool_id && self.is_live(handle.index())
    }

    /// Whether `ptr` points at the first byte of a block of this pool that is currently
    /// acquired.
    ///
    /// Any pointer may be passed. Pointers outside the arena, pointers into the middle of a
    /// block and pointers to released blocks all yield `false`. The pointer is never
    /// dereferenced.
    #[must_use]
    pub fn is_valid_ptr(&self, ptr: *const u8) -> bool {
        self.arena
            .index_of(ptr.addr())
            .is_some_and(|index| self.is_live(index))
    }

    /// Returns the bytes of an acquired block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPointer`] if the handle does not refer to a live block of this
    /// pool.
    pub fn block(&self, handle: BlockHandle) -> Result<&[u8]> {
        self.check_handle(handle)?;

        // SAFETY: Mutable access to blocks via block_mut() requires &mut self, which cannot
        // coexist with the &self borrow that the returned slice is tied to.
        Ok(unsafe { self.arena.block_bytes(handle.index()) })
    }

    /// Returns the bytes of an acquired block for writing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPointer`] if the handle does not refer to a live block of this
    /// pool.
    pub fn block_mut(&mut self, handle: BlockHandle) -> Result<&mut [u8]> {
        self.check_handle(handle)?;

        Ok(self.arena.block_bytes_mut(handle.index()))
    }

    fn check_handle(&self, handle: BlockHandle) -> Result<()> {
        if self.is_valid(handle) {
            Ok(())
        } else {
            Err(Error::InvalidPointer {
                address: handle.ptr().as_ptr().addr(),
            })
        }
    }

    fn is_live(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(SlotState::Occupied))
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    #[allow(
        clippy::indexing_slicing,
        clippy::arithmetic_side_effects,
        reason = "integrity check needs array access"
    )]
    pub(crate) fn integrity_check(&self) {
        let capacity = self.capacity();
        let mut on_free_list = vec![false; capacity];
        let mut free_list_len = 0_usize;
        let mut index = self.next_free_index;

        while index != capacity {
            assert!(
                index < capacity,
                "free list link {index} is out of bounds in pool of {capacity} blocks"
            );
            assert!(
                !on_free_list[index],
                "free list visits slot {index} twice in pool of {capacity} blocks"
            );

            on_free_list[index] = true;
            free_list_len += 1;

            index = match self.slots[index] {
                SlotState::Vacant { next_free_index } => next_free_index,
                SlotState::Occupied => panic!(
                    "free list passes through occupied slot {index} in pool of {capacity} blocks"
                ),
            };
        }

        let occupied_count = self
            .slots
            .iter()
            .filter(|slot| matches!(slot, SlotState::Occupied))
            .count();

        assert_eq!(
            occupied_count, self.live_count,
            "live count {} does not match the {occupied_count} occupied slots in pool of {capacity} blocks",
            self.live_count
        );

        assert_eq!(
            free_list_len,
            capacity - occupied_count,
            "free list of {free_list_len} slots does not reach every vacant slot in pool of {capacity} blocks"
        );
    }
}

impl Drop for BlockPool {
    fn drop(&mut self) {
        debug!(
            pool_id = self.pool_id,
            live_blocks = self.live_count,
            "destroying block pool"
        );

        // The arena itself is freed after this returns, also when the assertion below fires.
        //
        // If we are already panicking, we do not want to panic again because that will
        // simply obscure whatever the original panic was, leading to debug difficulties.
        if !thread::panicking() && matches!(self.drop_policy, DropPolicy::MustNotDropLiveBlocks)
        {
            assert!(
                self.live_count == 0,
                "dropped a BlockPool with {} live blocks - this is forbidden by DropPolicy::MustNotDropLiveBlocks",
                self.live_count
            );
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::indexing_slicing,
    clippy::undocumented_unsafe_blocks,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use std::sync::{Arc, Mutex};

    use new_zealand::nz;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(BlockPool: Send, std::fmt::Debug);
    assert_not_impl_any!(BlockPool: Sync);

    fn acquire_one(pool: &mut BlockPool) -> BlockHandle {
        let block_size = pool.block_size();

        pool.acquire(block_size)
            .unwrap()
            .expect("pool has free blocks")
    }

    #[test]
    fn smoke_test() {
        let mut pool = BlockPool::new(nz!(3), 4).unwrap();

        let a = acquire_one(&mut pool);
        let b = acquire_one(&mut pool);
        let c = acquire_one(&mut pool);

        assert_eq!(pool.len(), 3);
        assert!(pool.is_full());

        pool.release(b).unwrap();
        assert_eq!(pool.len(), 2);
        assert!(!pool.is_full());

        let d = acquire_one(&mut pool);
        assert_eq!(d.ptr(), b.ptr());

        pool.release(a).unwrap();
        pool.release(c).unwrap();
        pool.release(d).unwrap();
        assert!(pool.is_empty());
    }

    #[test]
    fn new_pool_is_empty() {
        let pool = BlockPool::new(nz!(5), 16).unwrap();

        assert_eq!(pool.capacity(), 5);
        assert_eq!(pool.len(), 0);
        assert_eq!(pool.free_count(), 5);
        assert!(pool.is_empty());
        assert!(!pool.is_full());
        assert_eq!(pool.drop_policy(), DropPolicy::MayDropLiveBlocks);
    }

    #[test]
    fn initial_acquisitions_walk_the_arena_in_order() {
        let mut pool = BlockPool::new(nz!(4), 8).unwrap();

        for expected in 0..4 {
            assert_eq!(acquire_one(&mut pool).index(), expected);
        }
    }

    #[test]
    fn block_size_is_floored_at_index_size() {
        let pool = BlockPool::new(nz!(2), 1).unwrap();
        assert_eq!(pool.block_size(), size_of::<usize>());

        let pool = BlockPool::new(nz!(2), 0).unwrap();
        assert_eq!(pool.block_size(), size_of::<usize>());
    }

    #[test]
    fn every_block_is_aligned_to_reported_alignment() {
        let mut pool = BlockPool::new(nz!(2), 13).unwrap();

        let first = acquire_one(&mut pool);
        let second = acquire_one(&mut pool);

        assert_eq!(pool.block_align(), 1);
        assert_eq!(first.ptr().as_ptr().addr() % pool.block_align(), 0);
        assert_eq!(second.ptr().as_ptr().addr() % pool.block_align(), 0);

        let mut pool = BlockPool::builder()
            .block_count(nz!(3))
            .block_size(13)
            .block_align(8)
            .build()
            .unwrap();

        assert_eq!(pool.block_size(), 16);
        for _ in 0..3 {
            let handle = acquire_one(&mut pool);
            assert_eq!(handle.ptr().as_ptr().addr() % pool.block_align(), 0);
        }
    }

    #[test]
    fn zero_sized_blocks_have_distinct_addresses() {
        let mut pool = BlockPool::new(nz!(3), 0).unwrap();

        let a = pool.acquire(0).unwrap().unwrap();
        let b = pool.acquire(0).unwrap().unwrap();
        let c = pool.acquire(0).unwrap().unwrap();

        assert_ne!(a.ptr(), b.ptr());
        assert_ne!(b.ptr(), c.ptr());
        assert_ne!(a.ptr(), c.ptr());
    }

    #[test]
    fn size_error_leaves_pool_untouched() {
        let mut pool = BlockPool::new(nz!(2), 16).unwrap();
        let held = acquire_one(&mut pool);

        let result = pool.acquire(17);
        assert!(matches!(
            result,
            Err(Error::Size {
                requested: 17,
                block_size: 16
            })
        ));

        assert_eq!(pool.len(), 1);
        assert_eq!(pool.next_free_index, 1);
        assert!(pool.is_valid(held));

        // The free slot is still the one that would have been handed out.
        assert_eq!(acquire_one(&mut pool).index(), 1);
    }

    #[test]
    fn size_error_takes_priority_over_full() {
        let mut pool = BlockPool::new(nz!(1), 8).unwrap();
        _ = acquire_one(&mut pool);

        assert!(matches!(pool.acquire(9), Err(Error::Size { .. })));
        assert!(matches!(pool.acquire(8), Ok(None)));
    }

    #[test]
    fn acquire_for_uses_type_size() {
        let mut pool = BlockPool::new(nz!(2), 8).unwrap();

        assert!(pool.acquire_for::<u64>().unwrap().is_some());
        assert!(matches!(
            pool.acquire_for::<[u8; 9]>(),
            Err(Error::Size { requested: 9, .. })
        ));
    }

    #[test]
    fn release_is_lifo() {
        let mut pool = BlockPool::new(nz!(4), 8).unwrap();

        let handles: Vec<_> = (0..4).map(|_| acquire_one(&mut pool)).collect();

        pool.release(handles[0]).unwrap();
        pool.release(handles[2]).unwrap();
        pool.release(handles[3]).unwrap();

        assert_eq!(acquire_one(&mut pool).index(), 3);
        assert_eq!(acquire_one(&mut pool).index(), 2);
        assert_eq!(acquire_one(&mut pool).index(), 0);
        assert!(pool.is_full());
    }

    #[test]
    fn double_release_is_rejected() {
        let mut pool = BlockPool::new(nz!(2), 8).unwrap();
        let handle = acquire_one(&mut pool);

        pool.release(handle).unwrap();

        assert!(matches!(
            pool.release(handle),
            Err(Error::InvalidPointer { .. })
        ));
        assert_eq!(pool.len(), 0);
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn foreign_handle_is_rejected() {
        let mut pool_a = BlockPool::new(nz!(2), 8).unwrap();
        let mut pool_b = BlockPool::new(nz!(2), 8).unwrap();

        let from_a = acquire_one(&mut pool_a);
        _ = acquire_one(&mut pool_b);

        // Same slot index is live in pool B, but the handle belongs to pool A.
        assert!(!pool_b.is_valid(from_a));
        assert!(matches!(
            pool_b.release(from_a),
            Err(Error::InvalidPointer { .. })
        ));
        assert!(pool_b.block(from_a).is_err());
        assert_eq!(pool_b.len(), 1);
    }

    #[test]
    fn release_ptr_accepts_block_addresses() {
        let mut pool = BlockPool::new(nz!(2), 8).unwrap();
        let handle = acquire_one(&mut pool);

        pool.release_ptr(handle.ptr()).unwrap();

        assert!(pool.is_empty());
        assert!(!pool.is_valid(handle));
    }

    #[test]
    fn release_ptr_rejects_misaligned_address() {
        let mut pool = BlockPool::new(nz!(2), 8).unwrap();
        let handle = acquire_one(&mut pool);

        let inside = unsafe { handle.ptr().byte_add(1) };

        assert!(matches!(
            pool.release_ptr(inside),
            Err(Error::InvalidPointer { .. })
        ));
        assert!(pool.is_valid(handle));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn release_ptr_rejects_foreign_address() {
        let mut pool = BlockPool::new(nz!(2), 8).unwrap();
        _ = acquire_one(&mut pool);

        let mut outside = 0_u64;
        let outside = NonNull::from(&mut outside).cast::<u8>();

        assert!(pool.release_ptr(outside).is_err());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn release_ptr_rejects_vacant_block() {
        let mut pool = BlockPool::new(nz!(2), 8).unwrap();
        let handle = acquire_one(&mut pool);
        pool.release(handle).unwrap();

        assert!(pool.release_ptr(handle.ptr()).is_err());
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn is_valid_ptr_checks() {
        let mut pool = BlockPool::new(nz!(3), 16).unwrap();

        let a = acquire_one(&mut pool);
        let b = acquire_one(&mut pool);

        assert!(pool.is_valid_ptr(a.ptr().as_ptr()));
        assert!(pool.is_valid_ptr(b.ptr().as_ptr()));

        // Never issued, but inside the arena.
        let third = pool.arena.block_ptr(2);
        assert!(!pool.is_valid_ptr(third.as_ptr()));

        // Misaligned within the arena.
        let misaligned = unsafe { a.ptr().byte_add(5) };
        assert!(!pool.is_valid_ptr(misaligned.as_ptr()));

        // Released.
        pool.release(b).unwrap();
        assert!(!pool.is_valid_ptr(b.ptr().as_ptr()));

        // Unrelated memory.
        let local = 0_u8;
        assert!(!pool.is_valid_ptr(&raw const local));
        assert!(!pool.is_valid_ptr(std::ptr::null()));
    }

    #[test]
    fn stale_handle_becomes_valid_when_slot_is_reused() {
        let mut pool = BlockPool::new(nz!(2), 8).unwrap();

        let first = acquire_one(&mut pool);
        pool.release(first).unwrap();
        assert!(!pool.is_valid(first));

        let second = acquire_one(&mut pool);
        assert_eq!(first, second);
        assert!(pool.is_valid(first));
    }

    #[test]
    fn block_access_reads_and_writes() {
        let mut pool = BlockPool::new(nz!(2), 8).unwrap();
        let handle = acquire_one(&mut pool);

        assert_eq!(pool.block(handle).unwrap(), &[0; 8]);

        pool.block_mut(handle).unwrap().copy_from_slice(&42_u64.to_ne_bytes());

        assert_eq!(pool.block(handle).unwrap(), &42_u64.to_ne_bytes());
        assert_eq!(
            unsafe { handle.ptr().cast::<[u8; 8]>().read() },
            42_u64.to_ne_bytes()
        );
    }

    #[test]
    fn block_access_rejects_released_handle() {
        let mut pool = BlockPool::new(nz!(2), 8).unwrap();
        let handle = acquire_one(&mut pool);
        pool.release(handle).unwrap();

        assert!(matches!(
            pool.block(handle),
            Err(Error::InvalidPointer { .. })
        ));
        assert!(matches!(
            pool.block_mut(handle),
            Err(Error::InvalidPointer { .. })
        ));
    }

    #[test]
    fn released_contents_are_not_cleared() {
        let mut pool = BlockPool::new(nz!(1), 8).unwrap();

        let handle = acquire_one(&mut pool);
        pool.block_mut(handle).unwrap().copy_from_slice(b"leftover");
        pool.release(handle).unwrap();

        let handle = acquire_one(&mut pool);

        // Nothing is zeroed and no free list link overwrote the payload.
        assert_eq!(pool.block(handle).unwrap(), b"leftover");
    }

    #[test]
    fn destroy_with_live_blocks_is_allowed_by_default() {
        let mut pool = BlockPool::new(nz!(2), 8).unwrap();
        _ = acquire_one(&mut pool);

        pool.destroy();
    }

    #[test]
    #[should_panic]
    fn drop_with_live_blocks_panics_when_forbidden() {
        let mut pool = BlockPool::builder()
            .block_count(nz!(2))
            .block_size(8)
            .drop_policy(DropPolicy::MustNotDropLiveBlocks)
            .build()
            .unwrap();

        _ = acquire_one(&mut pool);
    }

    #[test]
    fn drop_when_empty_is_fine_when_live_blocks_forbidden() {
        let mut pool = BlockPool::builder()
            .block_count(nz!(2))
            .block_size(8)
            .drop_policy(DropPolicy::MustNotDropLiveBlocks)
            .build()
            .unwrap();

        let handle = acquire_one(&mut pool);
        pool.release(handle).unwrap();

        pool.destroy();
    }

    #[test]
    fn pool_ids_are_unique() {
        let pool_a = BlockPool::new(nz!(1), 8).unwrap();
        let pool_b = BlockPool::new(nz!(1), 8).unwrap();

        assert_ne!(pool_a.pool_id, pool_b.pool_id);
    }

    #[test]
    fn integrity_holds_under_churn() {
        let mut pool = BlockPool::new(nz!(16), 8).unwrap();
        let mut held = Vec::new();

        for round in 0_usize..200 {
            if round % 3 == 2 && !held.is_empty() {
                let handle = held.swap_remove(round % held.len());
                pool.release(handle).unwrap();
            } else if let Some(handle) = pool.acquire(8).unwrap() {
                held.push(handle);
            }

            #[cfg(debug_assertions)]
            pool.integrity_check();

            assert_eq!(pool.len(), held.len());
            assert!(held.iter().all(|h| pool.is_valid(*h)));
        }
    }

    #[test]
    fn multithreaded_via_mutex() {
        let pool = Arc::new(Mutex::new(BlockPool::new(nz!(3), 8).unwrap()));

        let index = {
            let mut pool = pool.lock().unwrap();
            _ = acquire_one(&mut pool);
            acquire_one(&mut pool).index()
        };

        let pool_clone = Arc::clone(&pool);
        let handle = thread::spawn(move || {
            let mut pool = pool_clone.lock().unwrap();

            // Handles are not Send, so the other thread identifies the block by address.
            let ptr = pool.arena.block_ptr(index);
            pool.release_ptr(ptr).unwrap();

            acquire_one(&mut pool).index()
        });

        assert_eq!(handle.join().unwrap(), index);
        assert_eq!(pool.lock().unwrap().len(), 2);
    }
}
