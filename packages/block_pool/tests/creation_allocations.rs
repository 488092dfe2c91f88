//! Memory allocated by `BlockPool` creation, measured with a tracking global allocator.
#![allow(missing_docs, reason = "test code")]

use std::num::NonZero;

use alloc_tracker::{Allocator, Session};
use block_pool::{BlockPool, Error};
use new_zealand::nz;

#[global_allocator]
static ALLOCATOR: Allocator<std::alloc::System> = Allocator::system();

fn bytes_allocated_by(session: &Session, name: &str) -> u64 {
    session
        .to_report()
        .operations()
        .find(|(op_name, _)| *op_name == name)
        .map(|(_, op)| op.total_bytes_allocated())
        .expect("operation was measured")
}

#[test]
fn overflowing_create_allocates_nothing() {
    let session = Session::new();

    let mut successful = session.operation("successful_create");
    {
        let _span = successful.measure_thread();
        let pool = BlockPool::new(nz!(16), 64).unwrap();
        drop(pool);
    }

    let mut count_overflow = session.operation("count_overflow");
    {
        let _span = count_overflow.measure_thread();
        let result = BlockPool::new(NonZero::new(usize::MAX / 2).unwrap(), 16);
        assert!(matches!(result, Err(Error::Overflow { .. })));
    }

    let mut size_overflow = session.operation("size_overflow");
    {
        let _span = size_overflow.measure_thread();
        let result = BlockPool::new(nz!(3), usize::MAX / 2);
        assert!(matches!(result, Err(Error::Overflow { .. })));
    }

    // The arena and slot table are allocated on success, so the tracker sees this thread.
    assert!(bytes_allocated_by(&session, "successful_create") >= 16 * 64);

    assert_eq!(bytes_allocated_by(&session, "count_overflow"), 0);
    assert_eq!(bytes_allocated_by(&session, "size_overflow"), 0);
}
