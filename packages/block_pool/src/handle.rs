use std::ptr::NonNull;

/// Identifies one acquired block of a [`BlockPool`][crate::BlockPool].
///
/// Returned by [`acquire()`][crate::BlockPool::acquire]. The handle records which pool issued
/// it and which slot it refers to, so the pool can check it in O(1) without trusting the caller.
///
/// Handles are `Copy`. Copies stay around after the block is released, so a handle by itself
/// says nothing about liveness. Use [`is_valid()`][crate::BlockPool::is_valid] to ask the pool.
/// If the same slot is acquired again, earlier copies of the handle refer to the new occupant.
///
/// # Thread safety
///
/// The handle carries a raw pointer into the pool's arena and is therefore neither [`Send`]
/// nor [`Sync`], matching the single-owner pool it came from.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct BlockHandle {
    /// Unique ID of the pool that issued this handle.
    pool_id: u64,

    /// Index of the slot in the pool's arena.
    index: usize,

    /// Address of the first byte of the slot.
    ptr: NonNull<u8>,
}

impl BlockHandle {
    #[must_use]
    pub(crate) fn new(pool_id: u64, index: usize, ptr: NonNull<u8>) -> Self {
        Self {
            pool_id,
            index,
            ptr,
        }
    }

    /// Returns the ID of the pool that issued this handle.
    #[must_use]
    pub(crate) fn pool_id(&self) -> u64 {
        self.pool_id
    }

    /// Returns the index of the slot within the pool, in `0..capacity`.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns a pointer to the first byte of the block.
    ///
    /// The block spans [`block_size()`][crate::BlockPool::block_size] bytes from this address
    /// and stays at the same address until the pool is dropped.
    ///
    /// # Dereferencing
    ///
    /// Obtaining the pointer is safe. Dereferencing it is up to the caller, who must ensure that:
    ///
    /// * the block is still acquired and the pool still exists;
    /// * no reference obtained from [`block()`][crate::BlockPool::block] or
    ///   [`block_mut()`][crate::BlockPool::block_mut] is alive at the same time;
    /// * every byte written through the pointer is initialized (writing a type with padding
    ///   leaves uninitialized bytes behind, which makes later byte-slice access unsound).
    #[must_use]
    pub fn ptr(&self) -> NonNull<u8> {
        self.ptr
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(BlockHandle: Copy, std::fmt::Debug, Eq, std::hash::Hash);
    assert_not_impl_any!(BlockHandle: Send, Sync);

    #[test]
    fn accessors_return_parts() {
        let mut storage = [0_u8; 8];
        let ptr = NonNull::from(&mut storage).cast::<u8>();

        let handle = BlockHandle::new(7, 3, ptr);

        assert_eq!(handle.pool_id(), 7);
        assert_eq!(handle.index(), 3);
        assert_eq!(handle.ptr(), ptr);
    }
}
