use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::num::NonZero;
use std::ptr::NonNull;
use std::slice;

use crate::{Error, Result};

/// Smallest block the arena will lay out. Keeps every slot at a distinct address even when the
/// caller asks for zero-sized blocks.
pub(crate) const MIN_BLOCK_SIZE: usize = size_of::<usize>();

/// One contiguous, zero-initialized allocation divided into `block_count` slots of equal stride.
///
/// The arena knows nothing about which slots are in use. It only translates between slot
/// indexes and addresses.
///
/// # Out of band access
///
/// The arena does not create or keep references to its slots, so it is valid to access slot
/// memory via pointers from unsafe code even when not holding a reference to the arena.
#[derive(Debug)]
pub(crate) struct BlockArena {
    /// Start of the allocation; slot `i` begins `i * block_stride` bytes after it.
    first_block_ptr: NonNull<u8>,

    block_count: NonZero<usize>,

    layout_info: ArenaLayoutInfo,
}

/// Layout calculations for a [`BlockArena`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct ArenaLayoutInfo {
    /// Distance between the starts of two adjacent slots, which is also the usable size of
    /// each slot.
    block_stride: usize,

    /// Alignment guaranteed for every slot. The stride is a multiple of it.
    block_align: usize,

    /// Layout of the entire allocation. Its alignment may exceed `block_align`, which only
    /// benefits the first slot.
    arena_layout: Layout,
}

impl ArenaLayoutInfo {
    /// Calculates the arena layout, failing instead of overflowing if the arena would not fit
    /// in the address space.
    ///
    /// `block_align` must be a power of two.
    fn calculate(
        block_count: NonZero<usize>,
        block_size: usize,
        block_align: usize,
    ) -> Result<Self> {
        debug_assert!(
            block_align.is_power_of_two(),
            "block alignment {block_align} is not a power of two"
        );

        let overflow = || Error::Overflow {
            block_count: block_count.get(),
            block_size,
        };

        let block_stride = block_size
            .max(MIN_BLOCK_SIZE)
            .checked_next_multiple_of(block_align)
            .ok_or_else(overflow)?;

        let total_size = block_stride
            .checked_mul(block_count.get())
            .ok_or_else(overflow)?;

        // Layout rejects sizes above isize::MAX, which is the real limit of an allocation.
        let arena_layout = Layout::from_size_align(total_size, block_align.max(align_of::<usize>()))
            .ok()
            .ok_or_else(overflow)?;

        Ok(Self {
            block_stride,
            block_align,
            arena_layout,
        })
    }
}

impl BlockArena {
    /// Allocates a zeroed arena for `block_count` slots of at least `block_size` bytes each.
    pub(crate) fn new(
        block_count: NonZero<usize>,
        block_size: usize,
        block_align: usize,
    ) -> Result<Self> {
        let layout_info = ArenaLayoutInfo::calculate(block_count, block_size, block_align)?;

        // SAFETY: The layout is non-zero-sized because the stride is at least MIN_BLOCK_SIZE
        // and there is at least one block.
        let first_block_ptr = NonNull::new(unsafe { alloc_zeroed(layout_info.arena_layout) })
            .ok_or(Error::OutOfMemory {
                size: layout_info.arena_layout.size(),
            })?;

        Ok(Self {
            first_block_ptr,
            block_count,
            layout_info,
        })
    }

    #[must_use]
    pub(crate) fn block_count(&self) -> NonZero<usize> {
        self.block_count
    }

    #[must_use]
    pub(crate) fn block_stride(&self) -> usize {
        self.layout_info.block_stride
    }

    #[must_use]
    pub(crate) fn block_align(&self) -> usize {
        self.layout_info.block_align
    }

    /// Returns the address of the slot at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub(crate) fn block_ptr(&self, index: usize) -> NonNull<u8> {
        assert!(
            index < self.block_count.get(),
            "block {index} index out of bounds in arena of {} blocks",
            self.block_count
        );

        // Cannot overflow because the whole arena fits in a single allocation.
        let offset = index.wrapping_mul(self.layout_info.block_stride);

        // SAFETY: The offset stays within our allocation due to the bounds check above.
        unsafe { self.first_block_ptr.byte_add(offset) }
    }

    /// Translates an address back to a slot index.
    ///
    /// Returns `None` if the address is outside the arena or does not point at the first byte
    /// of a slot.
    #[must_use]
    pub(crate) fn index_of(&self, address: usize) -> Option<usize> {
        let offset = address.checked_sub(self.first_block_ptr.as_ptr().addr())?;

        let stride = self.layout_info.block_stride;

        if offset.checked_rem(stride)? != 0 {
            return None;
        }

        let index = offset.checked_div(stride)?;

        (index < self.block_count.get()).then_some(index)
    }

    /// Returns the bytes of the slot at `index`.
    ///
    /// # Safety
    ///
    /// The caller must ensure that no mutable access to the same slot happens while the
    /// returned slice is alive.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub(crate) unsafe fn block_bytes(&self, index: usize) -> &[u8] {
        let ptr = self.block_ptr(index);

        // SAFETY: The slot lies within our zero-initialized allocation and the caller
        // guarantees there is no concurrent mutable access.
        unsafe { slice::from_raw_parts(ptr.as_ptr(), self.layout_info.block_stride) }
    }

    /// Returns the bytes of the slot at `index` for writing.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub(crate) fn block_bytes_mut(&mut self, index: usize) -> &mut [u8] {
        let ptr = self.block_ptr(index);

        // SAFETY: The slot lies within our zero-initialized allocation and we hold an
        // exclusive reference to the arena.
        unsafe { slice::from_raw_parts_mut(ptr.as_ptr(), self.layout_info.block_stride) }
    }
}

impl Drop for BlockArena {
    fn drop(&mut self) {
        // SAFETY: We allocated this memory in new() with the same layout and it has not been
        // deallocated yet.
        unsafe {
            dealloc(self.first_block_ptr.as_ptr(), self.layout_info.arena_layout);
        }
    }
}

// SAFETY: The arena exclusively owns its allocation and does not rely on thread-local state.
// All access goes through &self/&mut self, so moving it to another thread is sound.
unsafe impl Send for BlockArena {}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::indexing_slicing,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use new_zealand::nz;

    use super::*;

    #[test]
    fn stride_is_floored_at_index_size() {
        let arena = BlockArena::new(nz!(4), 1, 1).unwrap();
        assert_eq!(arena.block_stride(), MIN_BLOCK_SIZE);

        let arena = BlockArena::new(nz!(4), 0, 1).unwrap();
        assert_eq!(arena.block_stride(), MIN_BLOCK_SIZE);
    }

    #[test]
    fn stride_is_exact_without_alignment() {
        let arena = BlockArena::new(nz!(4), 13, 1).unwrap();
        assert_eq!(arena.block_stride(), 13);
    }

    #[test]
    fn stride_is_rounded_to_alignment() {
        let arena = BlockArena::new(nz!(4), 13, 16).unwrap();
        assert_eq!(arena.block_stride(), 16);
        assert_eq!(arena.block_align(), 16);
        assert_eq!(arena.block_ptr(1).as_ptr().addr() % 16, 0);
    }

    #[test]
    fn arena_base_is_index_aligned_but_blocks_report_configured_alignment() {
        let arena = BlockArena::new(nz!(2), 13, 1).unwrap();

        assert_eq!(arena.block_align(), 1);
        assert_eq!(
            arena.block_ptr(0).as_ptr().addr() % align_of::<usize>(),
            0
        );
    }

    #[test]
    fn every_block_honors_reported_alignment() {
        for (block_size, block_align) in [(13, 1), (13, 4), (3, 8), (24, 16)] {
            let arena = BlockArena::new(nz!(5), block_size, block_align).unwrap();

            for index in 0..5 {
                assert_eq!(
                    arena.block_ptr(index).as_ptr().addr() % arena.block_align(),
                    0,
                    "block {index} of size {block_size} with alignment {block_align}"
                );
            }
        }
    }

    #[test]
    fn overflowing_multiplication_is_rejected() {
        let result = BlockArena::new(NonZero::new(usize::MAX).unwrap(), 2, 1);
        assert!(matches!(
            result,
            Err(Error::Overflow {
                block_count: usize::MAX,
                block_size: 2
            })
        ));
    }

    #[test]
    fn size_above_isize_max_is_rejected() {
        let count = NonZero::new(isize::MAX.unsigned_abs() / 8 + 1).unwrap();
        let result = BlockArena::new(count, 8, 1);
        assert!(matches!(result, Err(Error::Overflow { .. })));
    }

    #[test]
    fn overflowing_alignment_round_up_is_rejected() {
        let result = BlockArena::new(nz!(1), usize::MAX - 1, 16);
        assert!(matches!(result, Err(Error::Overflow { .. })));
    }

    #[test]
    fn fresh_arena_is_zeroed() {
        let arena = BlockArena::new(nz!(3), 16, 1).unwrap();

        for index in 0..3 {
            let bytes = unsafe { arena.block_bytes(index) };
            assert_eq!(bytes.len(), 16);
            assert!(bytes.iter().all(|b| *b == 0));
        }
    }

    #[test]
    fn block_pointers_are_spaced_by_stride() {
        let arena = BlockArena::new(nz!(4), 12, 1).unwrap();

        let base = arena.block_ptr(0).as_ptr().addr();
        for index in 0..4 {
            assert_eq!(arena.block_ptr(index).as_ptr().addr(), base + index * 12);
        }
    }

    #[test]
    fn index_of_round_trips_block_addresses() {
        let arena = BlockArena::new(nz!(5), 10, 1).unwrap();

        for index in 0..5 {
            let address = arena.block_ptr(index).as_ptr().addr();
            assert_eq!(arena.index_of(address), Some(index));
        }
    }

    #[test]
    fn index_of_rejects_foreign_and_misaligned_addresses() {
        let arena = BlockArena::new(nz!(5), 10, 1).unwrap();
        let base = arena.block_ptr(0).as_ptr().addr();

        // Inside a block but not at its start.
        assert_eq!(arena.index_of(base + 3), None);
        assert_eq!(arena.index_of(base + 15), None);

        // Before and after the arena.
        assert_eq!(arena.index_of(base - 10), None);
        assert_eq!(arena.index_of(base + 50), None);
        assert_eq!(arena.index_of(0), None);
    }

    #[test]
    fn writes_are_visible_through_both_views() {
        let mut arena = BlockArena::new(nz!(2), 8, 1).unwrap();

        arena.block_bytes_mut(1).copy_from_slice(b"abcdefgh");

        assert_eq!(unsafe { arena.block_bytes(1) }, b"abcdefgh");
        assert_eq!(unsafe { arena.block_ptr(1).as_ptr().read() }, b'a');
        assert!(unsafe { arena.block_bytes(0) }.iter().all(|b| *b == 0));
    }

    #[test]
    #[should_panic]
    fn block_ptr_out_of_bounds_panics() {
        let arena = BlockArena::new(nz!(2), 8, 1).unwrap();
        _ = arena.block_ptr(2);
    }
}
