/// Determines what happens when a pool is dropped while some of its blocks are still acquired.
///
/// By default, the pool releases its memory regardless of outstanding blocks.
///
/// # Examples
///
/// ```
/// use block_pool::{BlockPool, DropPolicy};
/// use new_zealand::nz;
///
/// // The drop policy is set at pool creation time.
/// let pool = BlockPool::builder()
///     .block_count(nz!(16))
///     .block_size(64)
///     .drop_policy(DropPolicy::MustNotDropLiveBlocks)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// The pool frees its arena when dropped, even if blocks are still acquired. This is the
    /// default.
    ///
    /// Any pointers into the pool held by callers become dangling.
    #[default]
    MayDropLiveBlocks,

    /// The pool will panic if it still has acquired blocks when it is dropped.
    ///
    /// Useful when callers hold raw pointers into the arena and every block is expected to be
    /// released before the pool goes away.
    MustNotDropLiveBlocks,
}
