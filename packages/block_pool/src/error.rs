use thiserror::Error;

/// Errors that can occur when building a [`BlockPool`][crate::BlockPool] or when releasing
/// blocks back into one.
///
/// Every error is recoverable: an operation that fails leaves the pool exactly as it was.
/// Running out of free blocks is not an error - [`alloc()`][crate::BlockPool::alloc] signals
/// exhaustion by returning `None`.
#[derive(Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The pool was configured with zero blocks.
    #[error("block pool must have a non-zero block count")]
    ZeroBlockCount,

    /// The pool was configured with zero-sized blocks.
    #[error("block pool must have a non-zero block size")]
    ZeroBlockSize,

    /// The total storage size of the pool does not fit in the address space.
    #[error(
        "block pool of {block_count} blocks of {block_size} bytes exceeds the maximum allocation size"
    )]
    CapacityOverflow {
        /// The requested number of blocks.
        block_count: usize,

        /// The requested size of each block, in bytes.
        block_size: usize,
    },

    /// The requested block alignment is not a power of two or does not evenly divide the block
    /// size, so consecutive blocks could not all be aligned.
    #[error("block alignment {alignment} is invalid for blocks of {block_size} bytes: {problem}")]
    InvalidAlignment {
        /// The requested alignment, in bytes.
        alignment: usize,

        /// The configured block size, in bytes.
        block_size: usize,

        /// A human-readable description of the problem.
        problem: &'static str,
    },

    /// The caller tried to release a null address.
    #[error("cannot release a null address")]
    NullAddress,

    /// The caller tried to release an address that is not inside the pool's storage.
    #[error("address {address:#x} is outside the pool storage")]
    OutOfBounds {
        /// The rejected address.
        address: usize,
    },

    /// The caller tried to release an address inside the pool's storage that is not the start
    /// of a block.
    #[error("address {address:#x} is {offset_in_block} bytes past the start of a block")]
    Misaligned {
        /// The rejected address.
        address: usize,

        /// How far past the nearest preceding block start the address is, in bytes.
        offset_in_block: usize,
    },

    /// The caller tried to release a block that is not currently in use.
    #[error("block {index} is not in use and cannot be released again")]
    DoubleFree {
        /// Index of the block within the pool.
        index: usize,
    },

    /// The caller tried to release a block handle that was allocated from a different pool.
    #[error("block was allocated from a different pool")]
    ForeignBlock,
}

/// A specialized `Result` type for block pool operations, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;
    use crate::BlockPool;

    assert_impl_all!(Error: Send, Sync, Debug);

    #[test]
    fn messages_include_details() {
        let error = Error::Misaligned {
            address: 0x1001,
            offset_in_block: 1,
        };
        assert_eq!(
            error.to_string(),
            "address 0x1001 is 1 bytes past the start of a block"
        );

        let error = Error::DoubleFree { index: 3 };
        assert!(error.to_string().contains("block 3"));

        let error = Error::CapacityOverflow {
            block_count: usize::MAX,
            block_size: 2,
        };
        assert!(error.to_string().contains(&usize::MAX.to_string()));
    }

    #[test]
    fn propagates_from_pool_operations() {
        fn release_at_offset(block_count: usize, offset: usize) -> Result<usize> {
            let mut pool = BlockPool::new(block_count, 8)?;
            let block = pool.alloc().expect("a fresh pool has free blocks");

            pool.free_ptr(block.ptr().as_ptr().wrapping_add(offset))?;
            Ok(pool.len())
        }

        assert_eq!(release_at_offset(0, 0), Err(Error::ZeroBlockCount));
        assert!(matches!(
            release_at_offset(2, 3),
            Err(Error::Misaligned {
                offset_in_block: 3,
                ..
            })
        ));
        assert_eq!(release_at_offset(2, 0), Ok(0));
    }
}
