use thiserror::Error;

/// Errors that can occur when creating or operating a [`BlockPool`][crate::BlockPool].
///
/// A full pool is not an error. [`acquire()`][crate::BlockPool::acquire] reports it as
/// `Ok(None)` so callers can decide whether to wait, fall back or drop the work.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The requested pool dimensions do not fit in the address space.
    #[error("a pool of {block_count} blocks of {block_size} bytes exceeds the addressable size")]
    Overflow {
        /// The requested number of blocks.
        block_count: usize,

        /// The requested size of each block, before any adjustment by the pool.
        block_size: usize,
    },

    /// The memory allocator could not provide the block arena.
    #[error("failed to allocate a block arena of {size} bytes")]
    OutOfMemory {
        /// Size of the arena allocation that failed, in bytes.
        size: usize,
    },

    /// The caller asked for more bytes than a single block can hold.
    #[error("requested {requested} bytes from a pool whose blocks hold {block_size} bytes")]
    Size {
        /// The number of bytes the caller asked for.
        requested: usize,

        /// The effective size of each block in the pool.
        block_size: usize,
    },

    /// A pointer or handle does not refer to a live block of the pool it was given to.
    ///
    /// This covers blocks that were already released, handles issued by a different pool and
    /// addresses that are outside the arena or not aligned to a block boundary.
    #[error("address {address:#x} does not refer to a live block of this pool")]
    InvalidPointer {
        /// The address that was rejected.
        address: usize,
    },
}

/// A specialized `Result` type for block pool operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);

    #[test]
    fn size_error_mentions_both_sizes() {
        let error = Error::Size {
            requested: 24,
            block_size: 16,
        };

        let message = error.to_string();
        assert!(message.contains("24"));
        assert!(message.contains("16"));
    }

    #[test]
    fn invalid_pointer_is_hex_formatted() {
        let error = Error::InvalidPointer { address: 0xdead };

        assert!(error.to_string().contains("0xdead"));
    }
}
