use std::cell::Cell;
use std::marker::PhantomData;
use std::num::NonZero;

use new_zealand::nz;

use crate::{BlockPool, DropPolicy, Error, Result};

/// Largest alignment the pool picks on its own. Larger alignments can still be requested.
const MAX_DEFAULT_ALIGNMENT: NonZero<usize> = nz!(4096);

/// Builder for creating an instance of [`BlockPool`].
///
/// The block count and block size are mandatory, whereas other settings are optional.
/// [`BlockPool::new()`] is a shorthand for the common case of setting only the mandatory values.
///
/// # Examples
///
/// ```
/// use block_pool::BlockPool;
///
/// let pool = BlockPool::builder()
///     .block_count(32)
///     .block_size(48)
///     .build()
///     .unwrap();
///
/// assert_eq!(pool.block_count(), 32);
/// assert_eq!(pool.block_size(), 48);
/// // The default alignment is the largest power of two that divides the block size.
/// assert_eq!(pool.alignment(), 16);
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
    block_count: usize,
    block_size: usize,
    alignment: Option<usize>,
    drop_policy: DropPolicy,

    // Prevents Sync while allowing Send - builders are thread-mobile but not thread-safe
    _not_sync: PhantomData<Cell<()>>,
}

impl BlockPoolBuilder {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            block_count: 0,
            block_size: 0,
            alignment: None,
            drop_policy: DropPolicy::default(),
            _not_sync: PhantomData,
        }
    }

    /// Sets the number of blocks in the pool. The pool never holds more or fewer blocks.
    ///
    /// Must be non-zero for [`build()`][Self::build] to succeed.
    #[inline]
    pub fn block_count(mut self, block_count: usize) -> Self {
        self.block_count = block_count;
        self
    }

    /// Sets the size of each block, in bytes.
    ///
    /// Must be non-zero for [`build()`][Self::build] to succeed.
    #[inline]
    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Sets the alignment, in bytes, that the start of every block is guaranteed to have.
    ///
    /// The alignment must be a power of two that evenly divides the block size, so that every
    /// block (not only the first) starts on an aligned address.
    ///
    /// If not set, the pool uses the largest power of two that divides the block size, up to a
    /// maximum of 4096 bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_pool::BlockPool;
    ///
    /// let pool = BlockPool::builder()
    ///     .block_count(4)
    ///     .block_size(256)
    ///     .alignment(8)
    ///     .build()
    ///     .unwrap();
    ///
    /// assert_eq!(pool.alignment(), 8);
    /// ```
    #[inline]
    pub fn alignment(mut self, alignment: usize) -> Self {
        self.alignment = Some(alignment);
        self
    }

    /// Sets the [drop policy][DropPolicy] for the pool. This governs how
    /// to treat blocks still in use when the pool is dropped.
    #[inline]
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Builds the block pool with the specified configuration, allocating its storage.
    ///
    /// # Errors
    ///
    /// * [`Error::ZeroBlockCount`] if the block count was not set or was set to zero.
    /// * [`Error::ZeroBlockSize`] if the block size was not set or was set to zero.
    /// * [`Error::InvalidAlignment`] if the alignment is not a power of two or does not divide
    ///   the block size.
    /// * [`Error::CapacityOverflow`] if the total storage size does not fit in one allocation.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_pool::{BlockPool, Error};
    ///
    /// let result = BlockPool::builder().block_count(0).block_size(16).build();
    /// assert_eq!(result.unwrap_err(), Error::ZeroBlockCount);
    /// ```
    pub fn build(self) -> Result<BlockPool> {
        let block_count = NonZero::new(self.block_count).ok_or(Error::ZeroBlockCount)?;
        let block_size = NonZero::new(self.block_size).ok_or(Error::ZeroBlockSize)?;

        let alignment = match self.alignment {
            Some(alignment) => validate_alignment(alignment, block_size)?,
            None => default_alignment(block_size),
        };

        BlockPool::new_inner(block_count, block_size, alignment, self.drop_policy)
    }
}

/// The largest power of two that divides the block size, capped at [`MAX_DEFAULT_ALIGNMENT`].
#[must_use]
fn default_alignment(block_size: NonZero<usize>) -> NonZero<usize> {
    // The lowest set bit of a non-zero value is its largest power-of-two divisor.
    let largest_divisor = NonZero::new(1_usize << block_size.trailing_zeros())
        .expect("a shifted one bit within the width of the type is never zero");

    largest_divisor.min(MAX_DEFAULT_ALIGNMENT)
}

fn validate_alignment(alignment: usize, block_size: NonZero<usize>) -> Result<NonZero<usize>> {
    let invalid = |problem: &'static str| Error::InvalidAlignment {
        alignment,
        block_size: block_size.get(),
        problem,
    };

    let alignment = NonZero::new(alignment).ok_or_else(|| invalid("alignment must be non-zero"))?;

    if !alignment.is_power_of_two() {
        return Err(invalid("alignment must be a power of two"));
    }

    // A power of two divides the block size exactly when it does not exceed the block size's
    // largest power-of-two divisor.
    if alignment.trailing_zeros() > block_size.trailing_zeros() {
        return Err(invalid("alignment must evenly divide the block size"));
    }

    Ok(alignment)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(BlockPoolBuilder: Send, std::fmt::Debug);
    assert_not_impl_any!(BlockPoolBuilder: Sync);

    #[test]
    fn builder_new_creates_default_state() {
        let builder = BlockPoolBuilder::new();
        assert_eq!(builder.block_count, 0);
        assert_eq!(builder.block_size, 0);
        assert!(builder.alignment.is_none());
        assert_eq!(builder.drop_policy, DropPolicy::default());
    }

    #[test]
    fn setters_can_be_overridden() {
        let builder = BlockPoolBuilder::new()
            .block_count(3)
            .block_count(5)
            .block_size(8)
            .block_size(16)
            .drop_policy(DropPolicy::MustNotDropBlocks)
            .drop_policy(DropPolicy::MayDropBlocks);

        assert_eq!(builder.block_count, 5);
        assert_eq!(builder.block_size, 16);
        assert_eq!(builder.drop_policy, DropPolicy::MayDropBlocks);
    }

    #[test]
    fn build_without_anything_is_zero_block_count() {
        let result = BlockPoolBuilder::new().build();
        assert_eq!(result.unwrap_err(), Error::ZeroBlockCount);
    }

    #[test]
    fn build_without_block_size_is_zero_block_size() {
        let result = BlockPoolBuilder::new().block_count(4).build();
        assert_eq!(result.unwrap_err(), Error::ZeroBlockSize);
    }

    #[test]
    fn build_with_zero_block_size_fails() {
        let result = BlockPoolBuilder::new().block_count(4).block_size(0).build();
        assert_eq!(result.unwrap_err(), Error::ZeroBlockSize);
    }

    #[test]
    fn build_with_overflowing_capacity_fails() {
        let result = BlockPoolBuilder::new()
            .block_count(usize::MAX)
            .block_size(16)
            .build();

        assert_eq!(
            result.unwrap_err(),
            Error::CapacityOverflow {
                block_count: usize::MAX,
                block_size: 16
            }
        );
    }

    #[test]
    fn default_alignment_is_largest_power_of_two_divisor() {
        assert_eq!(default_alignment(nz!(1)).get(), 1);
        assert_eq!(default_alignment(nz!(3)).get(), 1);
        assert_eq!(default_alignment(nz!(16)).get(), 16);
        assert_eq!(default_alignment(nz!(24)).get(), 8);
        assert_eq!(default_alignment(nz!(48)).get(), 16);
        assert_eq!(default_alignment(nz!(4096)).get(), 4096);
    }

    #[test]
    fn default_alignment_is_capped() {
        assert_eq!(default_alignment(nz!(8192)).get(), 4096);
        assert_eq!(default_alignment(NonZero::new(1 << 20).unwrap()).get(), 4096);
    }

    #[test]
    fn explicit_alignment_is_used() {
        let pool = BlockPoolBuilder::new()
            .block_count(4)
            .block_size(8192)
            .alignment(8192)
            .build()
            .unwrap();

        assert_eq!(pool.alignment(), 8192);
        assert_eq!(pool.base_ptr().addr().get() % 8192, 0);
    }

    #[test]
    fn zero_alignment_is_rejected() {
        let result = BlockPoolBuilder::new()
            .block_count(4)
            .block_size(16)
            .alignment(0)
            .build();

        assert!(matches!(
            result,
            Err(Error::InvalidAlignment { alignment: 0, .. })
        ));
    }

    #[test]
    fn non_power_of_two_alignment_is_rejected() {
        let result = BlockPoolBuilder::new()
            .block_count(4)
            .block_size(24)
            .alignment(12)
            .build();

        assert!(matches!(
            result,
            Err(Error::InvalidAlignment { alignment: 12, .. })
        ));
    }

    #[test]
    fn alignment_not_dividing_block_size_is_rejected() {
        let result = BlockPoolBuilder::new()
            .block_count(4)
            .block_size(24)
            .alignment(16)
            .build();

        assert!(matches!(
            result,
            Err(Error::InvalidAlignment {
                alignment: 16,
                block_size: 24,
                ..
            })
        ));
    }

    #[test]
    fn builder_send_trait() {
        // Verify builder can be moved between threads.
        let builder = BlockPoolBuilder::new().block_count(2).block_size(2);
        let handle = std::thread::spawn(move || builder.build());
        let pool = handle
            .join()
            .expect("thread completed successfully")
            .unwrap();

        assert_eq!(pool.block_count(), 2);
    }
}
