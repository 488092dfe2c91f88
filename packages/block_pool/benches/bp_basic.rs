//! Basic benchmarks for the `block_pool` crate.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::iter;
use std::time::Instant;

use alloc_tracker::Allocator;
use block_pool::BlockPool;
use criterion::{Criterion, criterion_group, criterion_main};
use new_zealand::nz;

criterion_group!(benches, entrypoint);
criterion_main!(benches);

#[global_allocator]
static ALLOCATOR: Allocator<std::alloc::System> = Allocator::system();

const BLOCK_SIZE: usize = 64;

fn entrypoint(c: &mut Criterion) {
    let allocs = alloc_tracker::Session::new();

    let mut group = c.benchmark_group("bp_basic");

    let mut allocs_op = allocs.operation("create_1k");
    group.bench_function("create_1k", |b| {
        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                drop(black_box(BlockPool::new(nz!(1024), BLOCK_SIZE).unwrap()));
            }

            start.elapsed()
        });
    });

    let mut allocs_op = allocs.operation("acquire_one");
    group.bench_function("acquire_one", |b| {
        b.iter_custom(|iters| {
            let mut pools = iter::repeat_with(|| BlockPool::new(nz!(1), BLOCK_SIZE).unwrap())
                .take(usize::try_from(iters).unwrap())
                .collect::<Vec<_>>();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for pool in &mut pools {
                _ = black_box(pool.acquire(black_box(BLOCK_SIZE)).unwrap());
            }

            start.elapsed()
        });
    });

    let mut allocs_op = allocs.operation("acquire_release_churn");
    group.bench_function("acquire_release_churn", |b| {
        b.iter_custom(|iters| {
            let mut pool = BlockPool::new(nz!(16), BLOCK_SIZE).unwrap();

            // Keep the pool partially occupied so the free list is not trivially short.
            let held = iter::repeat_with(|| pool.acquire(BLOCK_SIZE).unwrap().unwrap())
                .take(8)
                .collect::<Vec<_>>();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let handle = pool.acquire(BLOCK_SIZE).unwrap().unwrap();
                pool.release(black_box(handle)).unwrap();
            }

            let elapsed = start.elapsed();

            for handle in held {
                pool.release(handle).unwrap();
            }

            elapsed
        });
    });

    let mut allocs_op = allocs.operation("is_valid_ptr");
    group.bench_function("is_valid_ptr", |b| {
        b.iter_custom(|iters| {
            let mut pool = BlockPool::new(nz!(16), BLOCK_SIZE).unwrap();
            let handle = pool.acquire(BLOCK_SIZE).unwrap().unwrap();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                _ = black_box(pool.is_valid_ptr(black_box(handle.ptr().as_ptr())));
            }

            start.elapsed()
        });
    });

    group.finish();

    allocs.print_to_stdout();
}
