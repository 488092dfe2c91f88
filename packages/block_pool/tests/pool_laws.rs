//! Behavior of `BlockPool` as observed through its public API.
#![allow(
    missing_docs,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    reason = "test code"
)]

use std::collections::HashSet;
use std::num::NonZero;

use block_pool::{BlockHandle, BlockPool, Error};
use new_zealand::nz;

fn fill(pool: &mut BlockPool) -> Vec<BlockHandle> {
    let block_size = pool.block_size();

    let mut handles = Vec::new();
    while let Some(handle) = pool.acquire(block_size).unwrap() {
        handles.push(handle);
    }
    handles
}

#[test]
fn serves_exactly_block_count_acquisitions() {
    for block_count in [1_usize, 2, 7, 64] {
        for block_size in [0_usize, 1, 8, 33] {
            let mut pool =
                BlockPool::new(NonZero::new(block_count).unwrap(), block_size).unwrap();

            let handles = fill(&mut pool);

            assert_eq!(handles.len(), block_count);
            assert!(pool.is_full());
            assert_eq!(pool.free_count(), 0);
            assert!(pool.acquire(0).unwrap().is_none());
        }
    }
}

#[test]
fn four_blocks_of_eight_bytes() {
    let mut pool = BlockPool::new(nz!(4), 8).unwrap();
    let block_size = pool.block_size();
    assert_eq!(block_size, 8);

    let handles: Vec<_> = (0..4)
        .map(|_| pool.acquire(8).unwrap().expect("pool is not yet full"))
        .collect();

    let addresses: Vec<_> = handles.iter().map(|h| h.ptr().as_ptr().addr()).collect();
    let distinct: HashSet<_> = addresses.iter().copied().collect();
    assert_eq!(distinct.len(), 4);

    for pair in addresses.windows(2) {
        assert_eq!(pair[1] - pair[0], block_size);
    }

    assert!(pool.acquire(8).unwrap().is_none());

    pool.release(handles[1]).unwrap();
    let again = pool.acquire(8).unwrap().expect("a block was just released");
    assert_eq!(again.ptr(), handles[1].ptr());
}

#[test]
fn any_release_makes_room_for_the_same_block() {
    let mut pool = BlockPool::new(nz!(5), 16).unwrap();
    let handles = fill(&mut pool);

    for handle in &handles {
        pool.release(*handle).unwrap();
        let again = pool.acquire(16).unwrap().expect("a block was just released");
        assert_eq!(again.ptr(), handle.ptr());
        assert!(pool.is_full());
    }
}

#[test]
fn validity_follows_liveness() {
    let mut pool = BlockPool::new(nz!(4), 24).unwrap();

    let a = pool.acquire(24).unwrap().unwrap();
    let b = pool.acquire(24).unwrap().unwrap();

    assert!(pool.is_valid(a));
    assert!(pool.is_valid(b));
    assert!(pool.is_valid_ptr(a.ptr().as_ptr()));

    // Misaligned addresses inside the arena.
    for offset in [1_usize, 8, 23] {
        // SAFETY: The offset stays inside block `a`.
        let inside = unsafe { a.ptr().byte_add(offset) };
        assert!(!pool.is_valid_ptr(inside.as_ptr()));
    }

    // Never issued: one block past `b`, still inside the arena.
    // SAFETY: The pool has four blocks, so the third one is inside the arena.
    let never_issued = unsafe { b.ptr().byte_add(pool.block_size()) };
    assert!(!pool.is_valid_ptr(never_issued.as_ptr()));

    pool.release(a).unwrap();
    assert!(!pool.is_valid(a));
    assert!(!pool.is_valid_ptr(a.ptr().as_ptr()));
    assert!(pool.is_valid(b));
}

#[test]
fn handles_do_not_cross_pools() {
    let mut first = BlockPool::new(nz!(2), 8).unwrap();
    let mut second = BlockPool::new(nz!(2), 8).unwrap();

    let from_first = first.acquire(8).unwrap().unwrap();
    let from_second = second.acquire(8).unwrap().unwrap();

    assert!(!second.is_valid(from_first));
    assert!(!first.is_valid(from_second));
    assert!(!second.is_valid_ptr(from_first.ptr().as_ptr()));

    assert!(matches!(
        second.release(from_first),
        Err(Error::InvalidPointer { .. })
    ));
    assert!(second.release_ptr(from_first.ptr()).is_err());

    assert!(first.is_valid(from_first));
    assert_eq!(second.len(), 1);
}

#[test]
fn overflowing_dimensions_fail() {
    let result = BlockPool::new(NonZero::new(usize::MAX / 2).unwrap(), 16);
    assert!(matches!(result, Err(Error::Overflow { .. })));

    let result = BlockPool::new(nz!(3), usize::MAX / 2);
    assert!(matches!(result, Err(Error::Overflow { .. })));
}

#[test]
fn oversized_request_fails_without_side_effects() {
    let mut pool = BlockPool::new(nz!(3), 16).unwrap();
    let held = pool.acquire(16).unwrap().unwrap();

    let error = pool.acquire(17).unwrap_err();
    assert!(matches!(
        error,
        Error::Size {
            requested: 17,
            block_size: 16
        }
    ));

    assert_eq!(pool.len(), 1);
    assert!(pool.is_valid(held));

    let remaining = fill(&mut pool);
    assert_eq!(remaining.len(), 2);
    assert_eq!(remaining[0].index(), 1);
    assert_eq!(remaining[1].index(), 2);
}

#[test]
fn reused_block_accepts_fresh_payload() {
    let mut pool = BlockPool::new(nz!(2), 8).unwrap();

    let handle = pool.acquire(8).unwrap().unwrap();
    pool.block_mut(handle)
        .unwrap()
        .copy_from_slice(&0xfeed_face_u64.to_ne_bytes());
    pool.release(handle).unwrap();

    let reused = pool.acquire(8).unwrap().unwrap();
    assert_eq!(reused.ptr(), handle.ptr());

    // No assumption about the old bytes: overwrite and read back.
    pool.block_mut(reused)
        .unwrap()
        .copy_from_slice(&0xcafe_babe_u64.to_ne_bytes());
    assert_eq!(
        pool.block(reused).unwrap(),
        &0xcafe_babe_u64.to_ne_bytes()
    );
}

#[test]
fn typed_blocks_hold_values() {
    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Particle {
        position: [f32; 3],
        life: f32,
    }

    let mut pool = BlockPool::builder()
        .block_count(nz!(8))
        .block_size_of::<Particle>()
        .build()
        .unwrap();

    let handle = pool.acquire_for::<Particle>().unwrap().unwrap();
    let ptr = handle.ptr().cast::<Particle>();

    let particle = Particle {
        position: [1.0, 2.0, 3.0],
        life: 0.5,
    };

    // SAFETY: The block is live, sized and aligned for Particle, and no byte slice into it
    // exists. Particle has no padding.
    unsafe {
        ptr.write(particle);
        assert_eq!(ptr.read(), particle);
    }

    pool.release(handle).unwrap();
}

#[test]
fn destroy_consumes_the_pool() {
    let mut pool = BlockPool::new(nz!(2), 8).unwrap();
    _ = pool.acquire(8).unwrap();

    pool.destroy();
}
