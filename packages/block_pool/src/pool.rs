use std::mem;
use std::num::NonZero;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use tracing::{debug, trace};

use crate::{Block, BlockPoolBuilder, BlockStorage, DropPolicy, Error, Result};

/// Global counter for generating unique pool IDs.
static POOL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generates a unique pool ID.
fn generate_pool_id() -> u64 {
    POOL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A fixed-capacity pool of equally sized memory blocks.
///
/// The pool allocates all of its storage, `block_count * block_size` zero-filled bytes, when it is
/// created. After that, [`alloc()`][1] and [`free()`][2] hand out and take back blocks of that
/// storage in constant time without touching the global allocator. The storage never moves or
/// grows, so a block's address stays valid until the block is released or the pool is dropped.
///
/// # Reuse order
///
/// Released blocks are reused in last-in-first-out order: the block released most recently is
/// the next one [`alloc()`][1] returns. A freshly created pool hands out blocks in ascending
/// address order, lowest index first, rather than starting from the end of the storage.
///
/// # Releasing blocks
///
/// There are two ways to give a block back:
///
/// * [`free()`][2] consumes the [`Block`] handle returned by [`alloc()`][1]. This is the
///   preferred way, as the handle cannot be used again afterwards.
/// * [`free_ptr()`][3] takes a raw address, for code that only keeps pointers to blocks. The
///   address is validated before anything is changed, so any address (null, foreign, misaligned
///   or already released) is safe to pass and is rejected with a descriptive [`Error`].
///
/// # Out of band access
///
/// The pool does not keep references to block contents or create new ones unless you explicitly
/// ask for one via [`get()`][4] or [`get_mut()`][5]. It is therefore valid to access blocks via
/// the pointer from [`Block::ptr()`] in unsafe code, even when not holding any reference to the
/// pool, as long as you do not also ask the pool for a conflicting slice.
///
/// # Example
///
/// ```rust
/// use block_pool::BlockPool;
///
/// let mut pool = BlockPool::new(3, 64).unwrap();
///
/// let a = pool.alloc().unwrap();
/// let b = pool.alloc().unwrap();
/// let c = pool.alloc().unwrap();
///
/// // All blocks are in use.
/// assert!(pool.alloc().is_none());
///
/// let b_ptr = b.ptr();
/// pool.free(b).unwrap();
///
/// // The most recently released block is reused first.
/// let d = pool.alloc().unwrap();
/// assert_eq!(d.ptr(), b_ptr);
/// # pool.free(a).unwrap();
/// # pool.free(c).unwrap();
/// # pool.free(d).unwrap();
/// ```
///
/// # Thread safety
///
/// The pool is thread-mobile ([`Send`]) and can be moved between threads, but it is not
/// thread-safe ([`Sync`]). Wrap it in a mutex to share it between threads.
///
/// [1]: Self::alloc
/// [2]: Self::free
/// [3]: Self::free_ptr
/// [4]: Self::get
/// [5]: Self::get_mut
#[derive(Debug)]
pub struct BlockPool {
    /// We need to uniquely identify each pool to ensure that blocks are not returned to the
    /// wrong pool.
    pool_id: u64,

    storage: BlockStorage,

    /// One entry per block, tracking whether the block is in use. The vacant entries form an
    /// intrusive singly linked free list starting at `next_free_index`.
    entries: Box<[Entry]>,

    /// Index of the next block to hand out. Think of this as the top of a stack of the most
    /// recently released blocks, with the rest of the stack stored in the vacant entries.
    /// Equal to the block count when every block is in use.
    next_free_index: usize,

    /// Generation assigned to the next allocation, so each handle can be told apart from
    /// handles to earlier allocations of the same block.
    next_generation: u64,

    /// Number of blocks currently in use.
    count: usize,

    drop_policy: DropPolicy,
}

#[derive(Debug)]
enum Entry {
    Occupied { generation: u64 },

    Vacant { next_free_index: usize },
}

impl BlockPool {
    /// Creates a pool of `block_count` blocks of `block_size` bytes each, with default values for
    /// all other settings.
    ///
    /// # Errors
    ///
    /// * [`Error::ZeroBlockCount`] if `block_count` is zero.
    /// * [`Error::ZeroBlockSize`] if `block_size` is zero.
    /// * [`Error::CapacityOverflow`] if the total storage size does not fit in one allocation.
    ///
    /// # Example
    ///
    /// ```rust
    /// use block_pool::BlockPool;
    ///
    /// let pool = BlockPool::new(5, 16).unwrap();
    ///
    /// assert_eq!(pool.block_count(), 5);
    /// assert_eq!(pool.block_size(), 16);
    /// assert_eq!(pool.free_count(), 5);
    /// assert!(pool.is_empty());
    /// ```
    pub fn new(block_count: usize, block_size: usize) -> Result<Self> {
        Self::builder()
            .block_count(block_count)
            .block_size(block_size)
            .build()
    }

    /// Starts building a new [`BlockPool`].
    ///
    /// Use this when you want to customize the pool configuration beyond the defaults.
    ///
    /// # Example
    ///
    /// ```rust
    /// use block_pool::{BlockPool, DropPolicy};
    ///
    /// let pool = BlockPool::builder()
    ///     .block_count(16)
    ///     .block_size(128)
    ///     .alignment(64)
    ///     .drop_policy(DropPolicy::MustNotDropBlocks)
    ///     .build()
    ///     .unwrap();
    ///
    /// assert_eq!(pool.alignment(), 64);
    /// ```
    pub fn builder() -> BlockPoolBuilder {
        BlockPoolBuilder::new()
    }

    pub(crate) fn new_inner(
        block_count: NonZero<usize>,
        block_size: NonZero<usize>,
        alignment: NonZero<usize>,
        drop_policy: DropPolicy,
    ) -> Result<Self> {
        let storage = BlockStorage::new(block_count, block_size, alignment)?;

        // Initially, each block points to the one after it, so blocks are handed out in
        // ascending order. This is deliberate: a pool that pushes every index and then pops from
        // the back would hand out the highest index first instead. For the last block, this
        // points out of bounds, which marks the end of the free list.
        let entries = (0..block_count.get())
            .map(|index| Entry::Vacant {
                // Cannot overflow because the storage would not fit in memory otherwise.
                next_free_index: index.wrapping_add(1),
            })
            .collect();

        let pool_id = generate_pool_id();

        debug!(
            pool_id,
            block_count = block_count.get(),
            block_size = block_size.get(),
            alignment = alignment.get(),
            "created block pool"
        );

        Ok(Self {
            pool_id,
            storage,
            entries,
            next_free_index: 0,
            next_generation: 0,
            count: 0,
            drop_policy,
        })
    }

    /// The total number of blocks in the pool, whether in use or not.
    #[must_use]
    #[inline]
    pub fn block_count(&self) -> usize {
        self.storage.block_count().get()
    }

    /// The size of each block, in bytes.
    #[must_use]
    #[inline]
    pub fn block_size(&self) -> usize {
        self.storage.block_size().get()
    }

    /// The alignment, in bytes, of the start of every block.
    #[must_use]
    #[inline]
    pub fn alignment(&self) -> usize {
        self.storage.alignment().get()
    }

    /// The number of blocks currently in use.
    ///
    /// # Example
    ///
    /// ```rust
    /// use block_pool::BlockPool;
    ///
    /// let mut pool = BlockPool::new(4, 8).unwrap();
    /// assert_eq!(pool.len(), 0);
    ///
    /// let block = pool.alloc().unwrap();
    /// assert_eq!(pool.len(), 1);
    ///
    /// pool.free(block).unwrap();
    /// assert_eq!(pool.len(), 0);
    /// ```
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinite loops in tests that fill the pool.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    /// The number of blocks available for allocation.
    #[must_use]
    #[inline]
    pub fn free_count(&self) -> usize {
        // Cannot underflow because the number of blocks in use never exceeds the block count.
        self.block_count().wrapping_sub(self.count)
    }

    /// Whether no blocks are in use.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Whether every block is in use, meaning [`alloc()`][Self::alloc] will return `None`.
    #[must_use]
    #[inline]
    pub fn is_full(&self) -> bool {
        self.next_free_index >= self.block_count()
    }

    /// The address of the start of the pool storage, which is also the address of block 0.
    #[must_use]
    #[inline]
    pub fn base_ptr(&self) -> NonNull<u8> {
        self.storage.base_ptr()
    }

    /// Whether `ptr` points anywhere inside the pool storage, regardless of block boundaries
    /// or whether the block is in use.
    ///
    /// # Example
    ///
    /// ```rust
    /// use block_pool::BlockPool;
    ///
    /// let pool = BlockPool::new(2, 16).unwrap();
    /// let outside = [0_u8; 16];
    ///
    /// assert!(pool.contains(pool.base_ptr().as_ptr()));
    /// assert!(!pool.contains(outside.as_ptr()));
    /// ```
    #[must_use]
    pub fn contains(&self, ptr: *const u8) -> bool {
        self.storage.contains(ptr.addr())
    }

    /// Takes a block out of the pool, returning `None` if every block is in use.
    ///
    /// The returned block is the one most recently released, or the lowest-addressed block
    /// never handed out yet if nothing has been released. Block contents are zero only on
    /// first use; a reused block still holds whatever was last written to it.
    ///
    /// # Example
    ///
    /// ```rust
    /// use block_pool::BlockPool;
    ///
    /// let mut pool = BlockPool::new(2, 32).unwrap();
    ///
    /// let a = pool.alloc().unwrap();
    /// let b = pool.alloc().unwrap();
    ///
    /// // Exhaustion is an ordinary outcome, not an error.
    /// assert!(pool.alloc().is_none());
    /// # pool.free(a).unwrap();
    /// # pool.free(b).unwrap();
    /// ```
    #[must_use]
    pub fn alloc(&mut self) -> Option<Block> {
        if self.is_full() {
            trace!(pool_id = self.pool_id, "block pool exhausted");
            return None;
        }

        // Pop the next free index from the stack of free entries.
        let index = self.next_free_index;

        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1);

        let entry = self
            .entries
            .get_mut(index)
            .expect("free list head is in bounds whenever the pool is not full");

        let previous_entry = mem::replace(entry, Entry::Occupied { generation });

        self.next_free_index = match previous_entry {
            Entry::Vacant { next_free_index } => next_free_index,
            Entry::Occupied { .. } => panic!(
                "free list of block pool {} pointed to block {index} which is in use",
                self.pool_id
            ),
        };

        self.count = self
            .count
            .checked_add(1)
            .expect("guarded by the pool not being full");

        trace!(pool_id = self.pool_id, index, "allocated block");

        Some(Block {
            pool_id: self.pool_id,
            index,
            generation,
            ptr: self.storage.block_ptr(index),
        })
    }

    /// Releases a block back into the pool, consuming its handle.
    ///
    /// # Errors
    ///
    /// * [`Error::ForeignBlock`] if the block was allocated from a different pool.
    /// * [`Error::DoubleFree`] if the block was already released, for example through
    ///   [`free_ptr()`][Self::free_ptr].
    ///
    /// The pool is unchanged if an error is returned.
    ///
    /// # Example
    ///
    /// ```rust
    /// use block_pool::{BlockPool, Error};
    ///
    /// let mut pool_a = BlockPool::new(2, 8).unwrap();
    /// let mut pool_b = BlockPool::new(2, 8).unwrap();
    ///
    /// let block = pool_a.alloc().unwrap();
    /// assert_eq!(pool_b.free(block), Err(Error::ForeignBlock));
    /// ```
    pub fn free(&mut self, block: Block) -> Result<()> {
        self.validate_block(&block).inspect_err(|error| {
            debug!(pool_id = self.pool_id, %error, "rejected block release");
        })?;

        self.release(block.index);
        Ok(())
    }

    /// Releases the block starting at `ptr` back into the pool.
    ///
    /// Any address is acceptable input. The address is checked, in order, for being non-null,
    /// not before the start of the pool storage, on a block boundary, not past the end of the
    /// pool storage and belonging to a block that is in use. Only integer comparisons on the
    /// address are performed, so this is safe even for addresses unrelated to the pool.
    ///
    /// Releasing by address bypasses the [`Block`] handle. The handle is stale afterwards and is
    /// rejected with [`Error::DoubleFree`] if it is later passed to [`free()`][Self::free].
    ///
    /// # Errors
    ///
    /// * [`Error::NullAddress`] if `ptr` is null.
    /// * [`Error::OutOfBounds`] if `ptr` is before the start or past the end of the storage.
    /// * [`Error::Misaligned`] if `ptr` is not the start of a block.
    /// * [`Error::DoubleFree`] if the block is not in use.
    ///
    /// The pool is unchanged if an error is returned.
    ///
    /// # Example
    ///
    /// ```rust
    /// use block_pool::{BlockPool, Error};
    ///
    /// let mut pool = BlockPool::new(2, 8).unwrap();
    /// let ptr = pool.alloc().unwrap().ptr().as_ptr();
    ///
    /// assert_eq!(pool.free_ptr(std::ptr::null()), Err(Error::NullAddress));
    ///
    /// pool.free_ptr(ptr).unwrap();
    /// assert!(pool.is_empty());
    /// ```
    pub fn free_ptr(&mut self, ptr: *const u8) -> Result<()> {
        let index = self.validate_address(ptr).inspect_err(|error| {
            debug!(pool_id = self.pool_id, %error, "rejected block release");
        })?;

        self.release(index);
        Ok(())
    }

    /// Returns the contents of an in-use block.
    ///
    /// # Panics
    ///
    /// Panics if the block was allocated from a different pool or has already been released.
    #[must_use]
    pub fn get(&self, block: &Block) -> &[u8] {
        self.assert_in_use(block);
        self.storage.block(block.index)
    }

    /// Returns the contents of an in-use block for modification.
    ///
    /// # Example
    ///
    /// ```rust
    /// use block_pool::BlockPool;
    ///
    /// let mut pool = BlockPool::new(1, 4).unwrap();
    /// let block = pool.alloc().unwrap();
    ///
    /// pool.get_mut(&block).copy_from_slice(&[1, 2, 3, 4]);
    /// assert_eq!(pool.get(&block), &[1, 2, 3, 4]);
    /// # pool.free(block).unwrap();
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the block was allocated from a different pool or has already been released.
    #[must_use]
    pub fn get_mut(&mut self, block: &Block) -> &mut [u8] {
        self.assert_in_use(block);
        self.storage.block_mut(block.index)
    }

    fn validate_block(&self, block: &Block) -> Result<()> {
        if block.pool_id != self.pool_id {
            return Err(Error::ForeignBlock);
        }

        match self.entries.get(block.index) {
            Some(Entry::Occupied { generation }) if *generation == block.generation => Ok(()),
            _ => Err(Error::DoubleFree { index: block.index }),
        }
    }

    fn validate_address(&self, ptr: *const u8) -> Result<usize> {
        if ptr.is_null() {
            return Err(Error::NullAddress);
        }

        let index = self.storage.index_of(ptr.addr())?;

        match self.entries.get(index) {
            Some(Entry::Occupied { .. }) => Ok(index),
            _ => Err(Error::DoubleFree { index }),
        }
    }

    fn assert_in_use(&self, block: &Block) {
        assert!(
            self.validate_block(block).is_ok(),
            "block {} is not in use in block pool {}",
            block.index,
            self.pool_id
        );
    }

    /// Pushes a validated in-use block onto the free list.
    fn release(&mut self, index: usize) {
        let next_free_index = self.next_free_index;

        let entry = self
            .entries
            .get_mut(index)
            .expect("index was validated before release");

        debug_assert!(matches!(entry, Entry::Occupied { .. }));

        *entry = Entry::Vacant { next_free_index };

        // Push the released block onto the free stack.
        self.next_free_index = index;

        self.count = self
            .count
            .checked_sub(1)
            .expect("the released block was in use so count must be non-zero");

        trace!(pool_id = self.pool_id, index, "released block");
    }

    /// Walks every entry and the whole free list, so this is O(n) and only ever called from tests.
    #[cfg(test)]
    #[mutants::skip] // This is essentially test logic, mutation is meaningless.
    fn integrity_check(&self) {
        let block_count = self.block_count();

        let occupied_count = self
            .entries
            .iter()
            .filter(|entry| matches!(entry, Entry::Occupied { .. }))
            .count();

        assert!(
            self.count == occupied_count,
            "self.count {} does not match the observed occupied count {occupied_count} in block pool {}",
            self.count,
            self.pool_id
        );

        // Walk the free list. Every entry on it must be vacant and visited only once, and the
        // list must cover exactly the vacant entries.
        let mut visited = vec![false; block_count];
        let mut visited_count: usize = 0;
        let mut index = self.next_free_index;

        while index != block_count {
            let seen = visited.get_mut(index).unwrap_or_else(|| {
                panic!(
                    "free list of block pool {} points out of bounds to {index}",
                    self.pool_id
                )
            });

            assert!(
                !*seen,
                "free list of block pool {} visits block {index} twice",
                self.pool_id
            );
            *seen = true;

            visited_count = visited_count
                .checked_add(1)
                .expect("guarded by the duplicate check above");

            index = match self.entries.get(index) {
                Some(Entry::Vacant { next_free_index }) => *next_free_index,
                _ => panic!(
                    "free list of block pool {} contains in-use block {index}",
                    self.pool_id
                ),
            };
        }

        assert!(
            visited_count == self.free_count(),
            "free list of block pool {} has {visited_count} entries but {} blocks are free",
            self.pool_id,
            self.free_count()
        );
    }
}

impl Drop for BlockPool {
    fn drop(&mut self) {
        debug!(pool_id = self.pool_id, in_use = self.count, "dropping block pool");

        // If we are already panicking, we do not want to panic again because that will
        // simply obscure whatever the original panic was, leading to debug difficulties.
        if self.drop_policy == DropPolicy::MustNotDropBlocks && !thread::panicking() {
            assert!(
                self.is_empty(),
                "dropped block pool {} with {} blocks in use with a policy that says all blocks must be released first",
                self.pool_id,
                self.count
            );
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::undocumented_unsafe_blocks,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::fmt::Debug;
    use std::sync::{Arc, Mutex};

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(BlockPool: Send, Debug);
    assert_not_impl_any!(BlockPool: Sync);

    #[test]
    fn smoke_test() {
        let mut pool = BlockPool::new(3, 8).unwrap();

        let a = pool.alloc().unwrap();
        let b = pool.alloc().unwrap();
        let c = pool.alloc().unwrap();

        assert_eq!(pool.len(), 3);
        assert!(pool.is_full());
        assert!(pool.alloc().is_none());

        pool.free(b).unwrap();

        assert_eq!(pool.len(), 2);
        assert_eq!(pool.free_count(), 1);

        let d = pool.alloc().unwrap();
        assert_eq!(d.index(), 1);

        pool.free(a).unwrap();
        pool.free(c).unwrap();
        pool.free(d).unwrap();

        assert!(pool.is_empty());
        pool.integrity_check();
    }

    #[test]
    fn virgin_pool_hands_out_ascending_indexes() {
        let mut pool = BlockPool::new(4, 8).unwrap();

        for expected in 0..4 {
            let block = pool.alloc().unwrap();
            assert_eq!(block.index(), expected);
            assert_eq!(block.ptr(), pool.storage.block_ptr(expected));
        }
    }

    #[test]
    fn release_order_is_reversed_on_reuse() {
        let mut pool = BlockPool::new(4, 8).unwrap();

        let blocks: Vec<_> = (0..4).map(|_| pool.alloc().unwrap()).collect();

        // Release 0, 2, 3, 1 - expect them back as 1, 3, 2, 0.
        let mut blocks: Vec<_> = blocks.into_iter().map(Some).collect();
        for index in [0, 2, 3, 1] {
            pool.free(blocks[index].take().unwrap()).unwrap();
        }

        let reused: Vec<_> = (0..4).map(|_| pool.alloc().unwrap().index()).collect();
        assert_eq!(reused, vec![1, 3, 2, 0]);
    }

    #[test]
    fn large_pool_fills_and_drains() {
        const BLOCK_COUNT: usize = 50_000;

        let mut pool = BlockPool::new(BLOCK_COUNT, 8).unwrap();

        let blocks: Vec<_> = (0..BLOCK_COUNT).map(|_| pool.alloc().unwrap()).collect();
        assert!(pool.is_full());
        assert!(pool.alloc().is_none());
        pool.integrity_check();

        for block in blocks.into_iter().rev() {
            pool.free(block).unwrap();
        }

        assert!(pool.is_empty());
        pool.integrity_check();

        // Released in reverse, so the stack is back in its initial ascending order.
        assert_eq!(pool.alloc().unwrap().index(), 0);
    }

    #[test]
    fn free_foreign_block_is_rejected_without_change() {
        let mut pool_a = BlockPool::new(2, 8).unwrap();
        let mut pool_b = BlockPool::new(2, 8).unwrap();

        let foreign = pool_a.alloc().unwrap();
        let own = pool_b.alloc().unwrap();

        assert_eq!(pool_b.free(foreign), Err(Error::ForeignBlock));
        assert_eq!(pool_b.len(), 1);

        pool_b.free(own).unwrap();
    }

    #[test]
    fn free_stale_handle_is_double_free() {
        let mut pool = BlockPool::new(2, 8).unwrap();

        let block = pool.alloc().unwrap();
        pool.free_ptr(block.ptr().as_ptr()).unwrap();

        assert_eq!(pool.free(block), Err(Error::DoubleFree { index: 0 }));
        assert!(pool.is_empty());
    }

    #[test]
    fn free_stale_handle_after_reuse_is_double_free() {
        let mut pool = BlockPool::new(2, 8).unwrap();

        let stale = pool.alloc().unwrap();
        pool.free_ptr(stale.ptr().as_ptr()).unwrap();

        // Same block, new owner.
        let current = pool.alloc().unwrap();
        assert_eq!(current.index(), stale.index());

        assert_eq!(pool.free(stale), Err(Error::DoubleFree { index: 0 }));
        assert_eq!(pool.len(), 1);

        pool.free(current).unwrap();
    }

    #[test]
    fn free_ptr_validation_order() {
        let mut pool = BlockPool::new(4, 16).unwrap();
        let _block = pool.alloc().unwrap();

        let base = pool.base_ptr().as_ptr();

        assert_eq!(pool.free_ptr(std::ptr::null()), Err(Error::NullAddress));

        let before = base.wrapping_sub(16);
        assert_eq!(
            pool.free_ptr(before),
            Err(Error::OutOfBounds {
                address: before.addr()
            })
        );

        // Misalignment is detected before the end-of-storage check.
        let past_end_misaligned = base.wrapping_add(4 * 16 + 3);
        assert!(matches!(
            pool.free_ptr(past_end_misaligned),
            Err(Error::Misaligned {
                offset_in_block: 3,
                ..
            })
        ));

        let past_end = base.wrapping_add(4 * 16);
        assert_eq!(
            pool.free_ptr(past_end),
            Err(Error::OutOfBounds {
                address: past_end.addr()
            })
        );

        let vacant = base.wrapping_add(16);
        assert_eq!(pool.free_ptr(vacant), Err(Error::DoubleFree { index: 1 }));

        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn rejected_releases_leave_free_list_intact() {
        let mut pool = BlockPool::new(3, 8).unwrap();

        let a = pool.alloc().unwrap();
        let a_ptr = a.ptr().as_ptr();
        pool.free(a).unwrap();

        for _ in 0..3 {
            assert_eq!(pool.free_ptr(a_ptr), Err(Error::DoubleFree { index: 0 }));
        }

        // Had the double releases been accepted, block 0 would be handed out repeatedly.
        pool.integrity_check();

        let indexes: Vec<_> = (0..3).map(|_| pool.alloc().unwrap().index()).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert!(pool.alloc().is_none());
        pool.integrity_check();
    }

    #[test]
    fn blocks_are_aligned() {
        let mut pool = BlockPool::new(8, 24).unwrap();
        assert_eq!(pool.alignment(), 8);

        while let Some(block) = pool.alloc() {
            assert_eq!(block.ptr().addr().get() % 8, 0);
            assert_eq!(
                (block.ptr().addr().get() - pool.base_ptr().addr().get()) % 24,
                0
            );
        }
    }

    #[test]
    fn blocks_start_zeroed_and_keep_contents_on_reuse() {
        let mut pool = BlockPool::new(2, 4).unwrap();

        let block = pool.alloc().unwrap();
        assert_eq!(pool.get(&block), &[0, 0, 0, 0]);

        pool.get_mut(&block).copy_from_slice(&[9, 8, 7, 6]);
        pool.free(block).unwrap();

        let block = pool.alloc().unwrap();
        assert_eq!(pool.get(&block), &[9, 8, 7, 6]);
    }

    #[test]
    fn out_of_band_writes_are_visible_through_get() {
        let mut pool = BlockPool::new(2, 4).unwrap();
        let block = pool.alloc().unwrap();

        unsafe {
            block.ptr().as_ptr().add(2).write(42);
        }

        assert_eq!(pool.get(&block), &[0, 0, 42, 0]);
    }

    #[test]
    #[should_panic]
    fn get_foreign_block_panics() {
        let mut pool_a = BlockPool::new(2, 8).unwrap();
        let pool_b = BlockPool::new(2, 8).unwrap();

        let block = pool_a.alloc().unwrap();
        _ = pool_b.get(&block);
    }

    #[test]
    #[should_panic]
    fn get_mut_released_block_panics() {
        let mut pool = BlockPool::new(2, 8).unwrap();

        let block = pool.alloc().unwrap();
        pool.free_ptr(block.ptr().as_ptr()).unwrap();

        _ = pool.get_mut(&block);
    }

    #[test]
    fn contains_checks_storage_range() {
        let pool = BlockPool::new(2, 8).unwrap();
        let base = pool.base_ptr().as_ptr();

        assert!(pool.contains(base));
        assert!(pool.contains(base.wrapping_add(15)));
        assert!(!pool.contains(base.wrapping_add(16)));
        assert!(!pool.contains(std::ptr::null()));
    }

    #[test]
    fn pool_ids_are_unique() {
        let pool_a = BlockPool::new(1, 1).unwrap();
        let pool_b = BlockPool::new(1, 1).unwrap();

        assert_ne!(pool_a.pool_id, pool_b.pool_id);
    }

    #[test]
    fn multithreaded_via_mutex() {
        let pool = Arc::new(Mutex::new(BlockPool::new(3, 8).unwrap()));

        let a;
        let b;
        let c;

        {
            let mut pool = pool.lock().unwrap();
            a = pool.alloc().unwrap();
            b = pool.alloc().unwrap();
            c = pool.alloc().unwrap();
        }

        let b_addr = b.ptr().addr();

        let pool_clone = Arc::clone(&pool);
        thread::spawn(move || {
            let mut pool = pool_clone.lock().unwrap();

            pool.free(b).unwrap();

            let d = pool.alloc().unwrap();
            assert_eq!(d.ptr().addr(), b_addr);
            pool.free(d).unwrap();
        })
        .join()
        .unwrap();

        let mut pool = pool.lock().unwrap();
        assert_eq!(pool.len(), 2);

        pool.free(a).unwrap();
        pool.free(c).unwrap();
    }

    #[test]
    fn pool_can_move_between_threads() {
        let mut pool = BlockPool::new(2, 8).unwrap();
        let block = pool.alloc().unwrap();

        let pool = thread::spawn(move || {
            pool.free(block).unwrap();
            pool
        })
        .join()
        .unwrap();

        assert!(pool.is_empty());
    }

    #[test]
    #[should_panic]
    fn drop_with_blocks_in_use_and_forbidden_policy_panics() {
        let mut pool = BlockPool::builder()
            .block_count(2)
            .block_size(8)
            .drop_policy(DropPolicy::MustNotDropBlocks)
            .build()
            .unwrap();

        _ = pool.alloc().unwrap();
    }

    #[test]
    fn drop_empty_with_forbidden_policy_ok() {
        let mut pool = BlockPool::builder()
            .block_count(2)
            .block_size(8)
            .drop_policy(DropPolicy::MustNotDropBlocks)
            .build()
            .unwrap();

        let block = pool.alloc().unwrap();
        pool.free(block).unwrap();

        drop(pool);
    }

    #[test]
    fn drop_with_blocks_in_use_and_default_policy_ok() {
        let mut pool = BlockPool::new(2, 8).unwrap();

        _ = pool.alloc().unwrap();
        _ = pool.alloc().unwrap();

        drop(pool);
    }
}
