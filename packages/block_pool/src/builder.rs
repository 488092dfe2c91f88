use std::alloc::Layout;
use std::cell::Cell;
use std::marker::PhantomData;
use std::num::NonZero;

use crate::{BlockPool, DropPolicy, Result};

/// Builder for creating an instance of [`BlockPool`].
///
/// The block count is mandatory. The block size defaults to the minimum block size
/// (`size_of::<usize>()`), the block alignment to 1 and the drop policy to
/// [`DropPolicy::MayDropLiveBlocks`].
///
/// # Examples
///
/// Using an explicit block size:
///
/// ```
/// use block_pool::BlockPool;
/// use new_zealand::nz;
///
/// let pool = BlockPool::builder()
///     .block_count(nz!(100))
///     .block_size(48)
///     .build()
///     .unwrap();
/// ```
///
/// Sizing blocks for a type:
///
/// ```
/// use block_pool::BlockPool;
/// use new_zealand::nz;
///
/// let pool = BlockPool::builder()
///     .block_count(nz!(100))
///     .block_size_of::<(u32, u64)>()
///     .build()
///     .unwrap();
///
/// assert_eq!(pool.block_size(), 16);
/// ```
///
/// # Thread safety
///
/// The builder is thread-mobile ([`Send`]) and can be safely transferred between threads,
/// allowing pool configuration to happen on different threads than where the pool is used.
/// However, it is not thread-safe ([`Sync`]) as it contains mutable configuration state.
#[derive(Debug)]
#[must_use]
pub struct BlockPoolBuilder {
    block_count: Option<NonZero<usize>>,
    block_size: usize,
    block_align: usize,
    drop_policy: DropPolicy,

    // Prevents Sync while allowing Send - builders are thread-mobile but not thread-safe
    _not_sync: PhantomData<Cell<()>>,
}

impl BlockPoolBuilder {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            block_count: None,
            block_size: 0,
            block_align: 1,
            drop_policy: DropPolicy::default(),
            _not_sync: PhantomData,
        }
    }

    /// Sets the number of blocks in the pool. The pool never grows beyond this.
    #[inline]
    pub fn block_count(mut self, block_count: NonZero<usize>) -> Self {
        self.block_count = Some(block_count);
        self
    }

    /// Sets the minimum size of each block in bytes.
    ///
    /// Zero is accepted. The pool raises the size to at least `size_of::<usize>()`.
    #[inline]
    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Sets the alignment of each block in bytes. The block size is rounded up to a multiple
    /// of it so that every block is aligned, not only the first.
    ///
    /// # Panics
    ///
    /// Panics if `block_align` is not a power of two.
    #[inline]
    pub fn block_align(mut self, block_align: usize) -> Self {
        assert!(
            block_align.is_power_of_two(),
            "block alignment must be a power of two, got {block_align}"
        );
        self.block_align = block_align;
        self
    }

    /// Sets block size and alignment from the memory layout of `T`.
    ///
    /// This is a convenience method that makes every block suitable for storing one `T`.
    #[inline]
    pub fn block_size_of<T>(mut self) -> Self {
        let layout = Layout::new::<T>();
        self.block_size = layout.size();
        self.block_align = layout.align();
        self
    }

    /// Sets the [drop policy][DropPolicy] for the pool. This governs how to treat blocks that
    /// are still acquired when the pool is dropped.
    #[inline]
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Builds the pool with the specified configuration, allocating its arena.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Overflow`][crate::Error::Overflow] if the arena size does not fit in
    /// the address space and [`Error::OutOfMemory`][crate::Error::OutOfMemory] if the arena
    /// cannot be allocated.
    ///
    /// # Panics
    ///
    /// Panics if no block count has been set using [`block_count`](Self::block_count).
    pub fn build(self) -> Result<BlockPool> {
        let block_count = self
            .block_count
            .expect("block count must be set using .block_count() before calling .build()");

        BlockPool::new_inner(
            block_count,
            self.block_size,
            self.block_align,
            self.drop_policy,
        )
    }
}
