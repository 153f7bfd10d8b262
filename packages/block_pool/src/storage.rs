use std::alloc::{Layout, alloc_zeroed, dealloc, handle_alloc_error};
use std::num::NonZero;
use std::ptr::NonNull;

use num_integer::Integer;

use crate::{Error, Result};

/// The backing memory of a [`BlockPool`][crate::BlockPool]: one zero-filled allocation that is
/// carved into `block_count` blocks of `block_size` bytes each.
///
/// The storage knows nothing about which blocks are in use. It only translates between block
/// indexes and addresses and owns the allocation.
///
/// # Out of band access
///
/// The storage never creates references to the memory it owns unless asked to, so callers may
/// read and write blocks through raw pointers as long as they do not also ask for a conflicting
/// slice via [`block()`][1] or [`block_mut()`][2].
///
/// [1]: Self::block
/// [2]: Self::block_mut
#[derive(Debug)]
pub(crate) struct BlockStorage {
    /// Start of the allocation. Never changes for the lifetime of the storage.
    base_ptr: NonNull<u8>,

    block_count: NonZero<usize>,
    block_size: NonZero<usize>,

    /// The layout we allocated with, needed again to deallocate.
    layout: Layout,
}

impl BlockStorage {
    /// Allocates zero-filled storage for `block_count` blocks of `block_size` bytes, with the
    /// storage (and therefore every block) aligned to `alignment`.
    ///
    /// The caller is responsible for `alignment` being a power of two that divides `block_size`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityOverflow`] if the total size does not fit in a single allocation.
    pub(crate) fn new(
        block_count: NonZero<usize>,
        block_size: NonZero<usize>,
        alignment: NonZero<usize>,
    ) -> Result<Self> {
        let overflow = || Error::CapacityOverflow {
            block_count: block_count.get(),
            block_size: block_size.get(),
        };

        let total_size = block_count
            .get()
            .checked_mul(block_size.get())
            .ok_or_else(overflow)?;

        let layout = Layout::from_size_align(total_size, alignment.get())
            .map_err(|_layout_error| overflow())?;

        // SAFETY: The layout is not zero-sized because both factors of its size are non-zero.
        let ptr = unsafe { alloc_zeroed(layout) };

        let base_ptr = NonNull::new(ptr).unwrap_or_else(|| handle_alloc_error(layout));

        Ok(Self {
            base_ptr,
            block_count,
            block_size,
            layout,
        })
    }

    #[must_use]
    pub(crate) fn base_ptr(&self) -> NonNull<u8> {
        self.base_ptr
    }

    #[must_use]
    pub(crate) fn block_count(&self) -> NonZero<usize> {
        self.block_count
    }

    #[must_use]
    pub(crate) fn block_size(&self) -> NonZero<usize> {
        self.block_size
    }

    #[must_use]
    pub(crate) fn alignment(&self) -> NonZero<usize> {
        NonZero::new(self.layout.align()).expect("Layout guarantees a non-zero alignment")
    }

    /// Total size of the storage in bytes.
    #[must_use]
    pub(crate) fn len_bytes(&self) -> usize {
        self.layout.size()
    }

    /// Returns the address of the first byte of the block at `index`.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of bounds.
    #[must_use]
    pub(crate) fn block_ptr(&self, index: usize) -> NonNull<u8> {
        assert!(
            index < self.block_count.get(),
            "block {index} index out of bounds in storage of {} blocks",
            self.block_count
        );

        // Cannot overflow because the bounds check above keeps the offset inside the allocation.
        let offset = index.wrapping_mul(self.block_size.get());

        // SAFETY: The offset is inside the allocation due to the bounds check above.
        unsafe { self.base_ptr.add(offset) }
    }

    /// Whether the address lies anywhere inside the storage, block boundary or not.
    #[must_use]
    pub(crate) fn contains(&self, address: usize) -> bool {
        address
            .checked_sub(self.base_ptr.addr().get())
            .is_some_and(|offset| offset < self.len_bytes())
    }

    /// Maps an address back to the index of the block that starts at it.
    ///
    /// Only integer arithmetic is performed, so any address is acceptable input. Addresses before
    /// the start of the storage are rejected before any offset is calculated.
    ///
    /// # Errors
    ///
    /// * [`Error::OutOfBounds`] if the address is before the storage start.
    /// * [`Error::Misaligned`] if the address is not a multiple of the block size away from the
    ///   storage start.
    /// * [`Error::OutOfBounds`] if the address is at or past the storage end.
    pub(crate) fn index_of(&self, address: usize) -> Result<usize> {
        let offset = address
            .checked_sub(self.base_ptr.addr().get())
            .ok_or(Error::OutOfBounds { address })?;

        let (index, offset_in_block) = offset.div_rem(&self.block_size.get());

        if offset_in_block != 0 {
            return Err(Error::Misaligned {
                address,
                offset_in_block,
            });
        }

        if index >= self.block_count.get() {
            return Err(Error::OutOfBounds { address });
        }

        Ok(index)
    }

    /// Returns the bytes of the block at `index`.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of bounds.
    #[must_use]
    pub(crate) fn block(&self, index: usize) -> &[u8] {
        let ptr = self.block_ptr(index);

        // SAFETY: The block is inside our allocation, the memory was zero-initialized at
        // allocation time and we hold a shared reference to the storage, so no exclusive slice
        // can be handed out for the same block at the same time.
        unsafe { std::slice::from_raw_parts(ptr.as_ptr(), self.block_size.get()) }
    }

    /// Returns the bytes of the block at `index` for modification.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of bounds.
    #[must_use]
    pub(crate) fn block_mut(&mut self, index: usize) -> &mut [u8] {
        let ptr = self.block_ptr(index);

        // SAFETY: The block is inside our allocation, the memory was zero-initialized at
        // allocation time and we hold an exclusive reference to the storage, so no other
        // slice can be handed out for any block at the same time.
        unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), self.block_size.get()) }
    }
}

impl Drop for BlockStorage {
    fn drop(&mut self) {
        // SAFETY: The layout must match between alloc and dealloc. It does.
        unsafe {
            dealloc(self.base_ptr.as_ptr(), self.layout);
        }
    }
}

// SAFETY: The storage is plain bytes behind a raw pointer. Nothing about it is tied to the
// thread that allocated it, so it can move between threads.
unsafe impl Send for BlockStorage {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use new_zealand::nz;

    use super::*;

    fn storage(block_count: usize, block_size: usize) -> BlockStorage {
        BlockStorage::new(
            NonZero::new(block_count).unwrap(),
            NonZero::new(block_size).unwrap(),
            nz!(1),
        )
        .unwrap()
    }

    #[test]
    fn blocks_are_spaced_by_block_size() {
        let storage = storage(4, 24);

        let base = storage.base_ptr().addr().get();

        for index in 0..4 {
            assert_eq!(
                storage.block_ptr(index).addr().get(),
                base + index * 24,
                "block {index}"
            );
        }

        assert_eq!(storage.len_bytes(), 96);
    }

    #[test]
    fn starts_zeroed() {
        let storage = storage(3, 8);

        for index in 0..3 {
            assert!(storage.block(index).iter().all(|b| *b == 0));
        }
    }

    #[test]
    fn block_mut_writes_are_visible_and_isolated() {
        let mut storage = storage(3, 4);

        storage.block_mut(1).copy_from_slice(&[1, 2, 3, 4]);

        assert_eq!(storage.block(0), &[0, 0, 0, 0]);
        assert_eq!(storage.block(1), &[1, 2, 3, 4]);
        assert_eq!(storage.block(2), &[0, 0, 0, 0]);
    }

    #[test]
    fn index_of_block_starts() {
        let storage = storage(5, 16);

        for index in 0..5 {
            let address = storage.block_ptr(index).addr().get();
            assert_eq!(storage.index_of(address), Ok(index));
        }
    }

    #[test]
    fn index_of_before_start_is_out_of_bounds() {
        let storage = storage(5, 16);
        let base = storage.base_ptr().addr().get();

        assert_eq!(
            storage.index_of(base - 16),
            Err(Error::OutOfBounds { address: base - 16 })
        );
        assert_eq!(
            storage.index_of(base - 1),
            Err(Error::OutOfBounds { address: base - 1 })
        );
    }

    #[test]
    fn index_of_past_end_is_out_of_bounds() {
        let storage = storage(5, 16);
        let end = storage.base_ptr().addr().get() + 80;

        assert_eq!(
            storage.index_of(end),
            Err(Error::OutOfBounds { address: end })
        );
        assert_eq!(
            storage.index_of(end + 160),
            Err(Error::OutOfBounds { address: end + 160 })
        );
    }

    #[test]
    fn index_of_mid_block_is_misaligned() {
        let storage = storage(5, 16);
        let address = storage.block_ptr(2).addr().get() + 5;

        assert_eq!(
            storage.index_of(address),
            Err(Error::Misaligned {
                address,
                offset_in_block: 5
            })
        );
    }

    #[test]
    fn contains_covers_exactly_the_storage() {
        let storage = storage(2, 10);
        let base = storage.base_ptr().addr().get();

        assert!(!storage.contains(base - 1));
        assert!(storage.contains(base));
        assert!(storage.contains(base + 15));
        assert!(storage.contains(base + 19));
        assert!(!storage.contains(base + 20));
    }

    #[test]
    fn overflowing_size_is_error() {
        let result = BlockStorage::new(NonZero::new(usize::MAX).unwrap(), nz!(2), nz!(1));

        assert!(matches!(result, Err(Error::CapacityOverflow { .. })));
    }

    #[test]
    fn larger_than_isize_is_error() {
        let result = BlockStorage::new(
            NonZero::new(usize::MAX / 2 + 1).unwrap(),
            nz!(1),
            nz!(1),
        );

        assert!(matches!(result, Err(Error::CapacityOverflow { .. })));
    }

    #[test]
    fn honors_alignment() {
        let storage = BlockStorage::new(nz!(3), nz!(64), nz!(64)).unwrap();

        assert_eq!(storage.alignment().get(), 64);
        assert_eq!(storage.base_ptr().addr().get() % 64, 0);
    }

    #[test]
    #[should_panic]
    fn block_ptr_out_of_bounds_panics() {
        let storage = storage(3, 8);
        _ = storage.block_ptr(3);
    }
}
