#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A fixed-capacity pool of equally sized memory blocks.
//!
//! This crate provides [`BlockPool`], which reserves one contiguous, zero-filled memory region of
//! `block_count * block_size` bytes when it is created and then hands out fixed-size blocks of
//! that region in constant time, without calling into the global allocator again.
//!
//! # Key Features
//!
//! - **Single up-front allocation**: The backing storage is allocated once and never moves.
//! - **Constant-time operations**: Allocation and release are O(1) stack operations.
//! - **LIFO reuse**: The most recently released block is the next one handed out, which keeps
//!   recently touched memory warm in the cache.
//! - **Validated release**: Addresses given back to the pool are checked for being non-null,
//!   inside the storage, on a block boundary and currently in use. Invalid addresses are rejected
//!   with a descriptive [`Error`] and never corrupt the pool.
//! - **Aligned blocks**: Every block starts at an address aligned to the pool's
//!   [alignment][BlockPool::alignment].
//! - **Flexible drop policies**: Choose whether dropping a pool with blocks still in use is fine or
//!   a bug.
//! - **Thread mobility**: The pool can be moved between threads, but not shared without
//!   synchronization.
//!
//! # Exhaustion is not an error
//!
//! The pool never grows. When every block is in use, [`alloc()`][BlockPool::alloc] returns
//! `None` and callers are expected to handle that as an ordinary outcome.
//!
//! # Examples
//!
//! ```rust
//! use block_pool::BlockPool;
//!
//! let mut pool = BlockPool::new(5, 16).unwrap();
//!
//! let block = pool.alloc().expect("a fresh pool has free blocks");
//! pool.get_mut(&block).copy_from_slice(b"sixteen bytes!!!");
//! assert_eq!(pool.get(&block), b"sixteen bytes!!!");
//!
//! // Releasing consumes the handle, so the block cannot be released twice through it.
//! pool.free(block).unwrap();
//! assert!(pool.is_empty());
//! ```
//!
//! Releasing by raw address, as is common when blocks are passed through code that only keeps
//! pointers:
//!
//! ```rust
//! use block_pool::{BlockPool, Error};
//!
//! let mut pool = BlockPool::new(4, 32).unwrap();
//!
//! let ptr = pool.alloc().unwrap().ptr();
//!
//! // An address in the middle of a block is rejected and leaves the pool untouched.
//! // SAFETY: Offsetting by one byte stays inside the same block.
//! let misaligned = unsafe { ptr.as_ptr().add(1) };
//! assert!(matches!(
//!     pool.free_ptr(misaligned),
//!     Err(Error::Misaligned { .. })
//! ));
//!
//! pool.free_ptr(ptr.as_ptr()).unwrap();
//!
//! // A second release of the same address is detected.
//! assert!(matches!(
//!     pool.free_ptr(ptr.as_ptr()),
//!     Err(Error::DoubleFree { .. })
//! ));
//! ```

mod block;
mod builder;
mod drop_policy;
mod error;
mod pool;
mod storage;

pub use block::Block;
pub use builder::*;
pub use drop_policy::*;
pub use error::Error;
pub(crate) use error::Result;
pub use pool::BlockPool;
pub(crate) use storage::*;
