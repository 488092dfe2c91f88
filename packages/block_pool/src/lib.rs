//! A fixed-capacity pool of equally sized memory blocks.
//!
//! This crate provides [`BlockPool`], which pre-allocates one contiguous arena divided into
//! equal slots and hands those slots out and takes them back in O(1). It suits workloads that
//! create and destroy many same-shaped objects (entities, network buffers, tree nodes) and want
//! to avoid general-purpose allocation overhead and fragmentation.
//!
//! # Key Features
//!
//! - **Fixed capacity**: The arena is allocated once and never grows
//! - **O(1) acquire and release**: Backed by a free list, with no allocation after creation
//! - **Checked handles**: [`BlockHandle`] records its pool and slot, so stale and foreign
//!   handles are detected instead of corrupting the pool
//! - **Pointer checks**: [`BlockPool::is_valid_ptr()`] tells whether an arbitrary address is
//!   the start of a live block
//! - **Explicit exhaustion**: A full pool yields `Ok(None)`, distinct from real errors
//! - **Flexible drop policies**: Configure behavior when the pool is dropped with live blocks
//! - **Thread mobility**: The pool can be moved between threads (but not shared without
//!   synchronization)
//!
//! # Reuse and contents
//!
//! Released blocks are reused most-recently-released first. The pool never zeroes a block on
//! acquire or release, so a reacquired block may still hold its previous contents.
//!
//! # Examples
//!
//! ```rust
//! use block_pool::BlockPool;
//! use new_zealand::nz;
//!
//! let mut pool = BlockPool::new(nz!(4), 8).unwrap();
//!
//! let mut handles = Vec::new();
//! while let Some(handle) = pool.acquire(8).unwrap() {
//!     handles.push(handle);
//! }
//! assert_eq!(handles.len(), 4);
//! assert!(pool.is_full());
//!
//! // Blocks are laid out back to back.
//! let base = handles[0].ptr().as_ptr().addr();
//! assert_eq!(handles[1].ptr().as_ptr().addr(), base + pool.block_size());
//!
//! // The most recently released block is the next one handed out.
//! pool.release(handles[1]).unwrap();
//! let reused = pool.acquire(8).unwrap().unwrap();
//! assert_eq!(reused.ptr(), handles[1].ptr());
//! ```

mod arena;
mod builder;
mod drop_policy;
mod error;
mod handle;
mod pool;

pub(crate) use arena::*;
pub use builder::*;
pub use drop_policy::*;
pub use error::*;
pub use handle::*;
pub use pool::BlockPool;
