//! Basic usage of the `block_pool` crate:
//!
//! * Creating a pool.
//! * Allocating blocks until the pool is exhausted.
//! * Writing to and reading from blocks.
//! * Releasing blocks by handle and by address.

use block_pool::BlockPool;

fn main() {
    let mut pool = BlockPool::new(5, 16).expect("5 blocks of 16 bytes is a valid configuration");

    println!(
        "Block pool of {} blocks of {} bytes, aligned to {} bytes",
        pool.block_count(),
        pool.block_size(),
        pool.alignment()
    );

    let mut blocks = Vec::new();

    // Allocation never grows the pool - once every block is in use, we get `None`.
    while let Some(block) = pool.alloc() {
        println!("Allocated block {} at {:p}", block.index(), block.ptr());
        blocks.push(block);
    }

    println!("Pool exhausted with {} blocks in use", pool.len());

    // Blocks are plain bytes.
    let first = blocks.remove(0);
    pool.get_mut(&first).copy_from_slice(b"Hello, blocks!!!");
    println!(
        "Block {} contains: {}",
        first.index(),
        String::from_utf8_lossy(pool.get(&first))
    );

    // Releasing by handle consumes the handle.
    let third_ptr = blocks.get(1).expect("we allocated five blocks").ptr();
    pool.free(first).expect("block came from this pool and is in use");

    // Releasing by address validates the address first. A pointer into the middle of a block is
    // rejected and the pool is left as it was.
    let inside = third_ptr.as_ptr().wrapping_add(3);
    match pool.free_ptr(inside) {
        Ok(()) => println!("Unexpectedly released {inside:p}"),
        Err(error) => println!("Rejected release: {error}"),
    }

    pool.free_ptr(third_ptr.as_ptr())
        .expect("address is the start of an in-use block");

    // The most recently released block is handed out next.
    let reused = pool.alloc().expect("we just released a block");
    println!(
        "Reused block {} at {:p} (last released was {third_ptr:p})",
        reused.index(),
        reused.ptr()
    );
}
