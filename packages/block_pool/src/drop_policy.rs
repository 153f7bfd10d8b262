/// Determines what happens when a pool is dropped while some of its blocks are still in use.
///
/// Dropping the pool always releases its storage, which invalidates every address the pool has
/// handed out. By default, this is allowed.
///
/// # Examples
///
/// ```
/// use block_pool::{BlockPool, DropPolicy};
///
/// // The drop policy is set at pool creation time.
/// let pool = BlockPool::builder()
///     .block_count(8)
///     .block_size(64)
///     .drop_policy(DropPolicy::MustNotDropBlocks)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// The pool may be dropped while blocks are still in use. This is the default.
    #[default]
    MayDropBlocks,

    /// The pool will panic if blocks are still in use when it is dropped.
    ///
    /// This may be valuable if unsafe code holds on to block addresses obtained via
    /// [`Block::ptr()`][crate::Block::ptr] and every block is expected to be released before
    /// the storage goes away.
    MustNotDropBlocks,
}
