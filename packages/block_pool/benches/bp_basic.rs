//! Basic benchmarks for the `block_pool` crate.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::iter;
use std::time::Instant;

use block_pool::BlockPool;
use criterion::{Criterion, criterion_group, criterion_main};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

const BLOCK_COUNT: usize = 1024;
const BLOCK_SIZE: usize = 64;

fn new_pool() -> BlockPool {
    BlockPool::new(BLOCK_COUNT, BLOCK_SIZE).unwrap()
}

fn entrypoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_basic");

    group.bench_function("build", |b| {
        b.iter(|| drop(black_box(new_pool())));
    });

    group.bench_function("alloc_first", |b| {
        b.iter_custom(|iters| {
            let mut pools = iter::repeat_with(new_pool)
                .take(usize::try_from(iters).unwrap())
                .collect::<Vec<_>>();

            let start = Instant::now();

            for pool in &mut pools {
                _ = black_box(pool.alloc());
            }

            start.elapsed()
        });
    });

    group.bench_function("alloc_free_cycle", |b| {
        let mut pool = new_pool();

        b.iter(|| {
            let block = pool.alloc().unwrap();
            pool.free(black_box(block)).unwrap();
        });
    });

    group.bench_function("alloc_free_ptr_cycle", |b| {
        let mut pool = new_pool();

        b.iter(|| {
            let ptr = pool.alloc().unwrap().ptr();
            pool.free_ptr(black_box(ptr.as_ptr())).unwrap();
        });
    });

    group.bench_function("free_ptr_rejected", |b| {
        let mut pool = new_pool();
        let misaligned = pool.base_ptr().as_ptr().wrapping_add(1);

        b.iter(|| {
            _ = black_box(pool.free_ptr(black_box(misaligned)));
        });
    });

    group.finish();

    let mut group = c.benchmark_group("block_slow");

    group.bench_function("fill_and_drain", |b| {
        let mut pool = new_pool();
        let mut blocks = Vec::with_capacity(BLOCK_COUNT);

        b.iter(|| {
            while let Some(block) = pool.alloc() {
                blocks.push(block);
            }

            #[expect(clippy::iter_with_drain, reason = "to reuse the vector allocation")]
            for block in blocks.drain(..) {
                pool.free(block).unwrap();
            }
        });
    });

    group.finish();
}
