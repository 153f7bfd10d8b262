use std::ptr::NonNull;

/// Exclusive handle to one block allocated from a [`BlockPool`].
///
/// A `Block` is returned by [`BlockPool::alloc()`] and is the receipt for one in-use block. It
/// does not implement [`Copy`] or [`Clone`] and [`BlockPool::free()`] consumes it, so a block
/// cannot be released twice through its handle.
///
/// The handle does not borrow the pool. Access the block contents through
/// [`BlockPool::get()`] and [`BlockPool::get_mut()`], or through the raw address from
/// [`ptr()`][Self::ptr] in unsafe code.
///
/// Dropping a `Block` without releasing it leaves the block in use until the pool itself is
/// dropped. It can still be released by address via [`BlockPool::free_ptr()`].
///
/// # Example
///
/// ```rust
/// use block_pool::BlockPool;
///
/// let mut pool = BlockPool::new(2, 8).unwrap();
///
/// let block = pool.alloc().unwrap();
/// assert_eq!(block.index(), 0);
/// assert_eq!(block.ptr(), pool.base_ptr());
///
/// pool.free(block).unwrap();
/// ```
///
/// [`BlockPool`]: crate::BlockPool
/// [`BlockPool::alloc()`]: crate::BlockPool::alloc
/// [`BlockPool::free()`]: crate::BlockPool::free
/// [`BlockPool::free_ptr()`]: crate::BlockPool::free_ptr
/// [`BlockPool::get()`]: crate::BlockPool::get
/// [`BlockPool::get_mut()`]: crate::BlockPool::get_mut
#[derive(Debug, Eq, PartialEq)]
pub struct Block {
    /// Ensures this handle can only be returned to the pool it came from.
    pub(crate) pool_id: u64,

    pub(crate) index: usize,

    /// Distinguishes this allocation of the block from earlier and later allocations of the
    /// same block, so a handle that outlived its allocation is recognized as stale.
    pub(crate) generation: u64,

    pub(crate) ptr: NonNull<u8>,
}

impl Block {
    /// Index of the block within its pool. Block `i` starts `i * block_size` bytes after the
    /// start of the pool storage.
    #[must_use]
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the address of the first byte of the block.
    ///
    /// The block is `block_size` bytes long and remains valid for reads and writes until the
    /// block is released or the pool is dropped. The pool does not hold references to block
    /// contents, so unsafe code may access the block through this pointer as long as it does not
    /// overlap with a slice obtained from [`BlockPool::get()`] or [`BlockPool::get_mut()`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use block_pool::BlockPool;
    ///
    /// let mut pool = BlockPool::new(4, 8).unwrap();
    /// let block = pool.alloc().unwrap();
    ///
    /// // SAFETY: The block is 8 bytes, in use by us and no slices to it exist.
    /// unsafe {
    ///     block.ptr().cast::<u64>().write(0xdead_beef);
    /// }
    ///
    /// assert_eq!(pool.get(&block), &0xdead_beef_u64.to_ne_bytes());
    /// # pool.free(block).unwrap();
    /// ```
    ///
    /// [`BlockPool::get()`]: crate::BlockPool::get
    /// [`BlockPool::get_mut()`]: crate::BlockPool::get_mut
    #[must_use]
    #[inline]
    pub fn ptr(&self) -> NonNull<u8> {
        self.ptr
    }
}

// SAFETY: A block handle is an address plus bookkeeping. It grants no access to the memory on its
// own - that goes through the pool or through unsafe code - so moving it between threads is fine.
unsafe impl Send for Block {}

// SAFETY: See above. Nothing can be done through a shared reference to the handle other than
// reading its fields.
unsafe impl Sync for Block {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(Block: Send, Sync, Debug);
    assert_not_impl_any!(Block: Clone, Copy);

    #[test]
    fn accessors_return_parts() {
        let mut byte = 0_u8;
        let ptr = NonNull::from(&mut byte);

        let block = Block {
            pool_id: 7,
            index: 3,
            generation: 11,
            ptr,
        };

        assert_eq!(block.index(), 3);
        assert_eq!(block.ptr(), ptr);
    }
}
