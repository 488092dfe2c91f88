//! Basic usage example for `BlockPool`.
//!
//! Fills a small pool, shows the "full" signal, releases a block and reacquires it.

use block_pool::BlockPool;
use new_zealand::nz;

fn main() {
    let mut pool = BlockPool::new(nz!(4), 16).unwrap();

    println!(
        "Created BlockPool with {} blocks of {} bytes",
        pool.capacity(),
        pool.block_size()
    );

    let mut handles = Vec::new();
    while let Some(handle) = pool.acquire(16).unwrap() {
        let message = format!("block #{:<9}", handle.index());
        pool.block_mut(handle)
            .unwrap()
            .copy_from_slice(message.as_bytes());
        handles.push(handle);
    }

    println!("Pool is full after {} acquisitions", handles.len());

    for handle in &handles {
        let bytes = pool.block(*handle).unwrap();
        println!(
            "{:p}: {}",
            handle.ptr(),
            String::from_utf8_lossy(bytes).trim_end()
        );
    }

    let second = handles.swap_remove(1);
    pool.release(second).unwrap();
    println!(
        "Released block {}, handle still valid: {}",
        second.index(),
        pool.is_valid(second)
    );

    let reacquired = pool.acquire(16).unwrap().expect("a block was just released");
    println!(
        "Reacquired block {} (same address: {})",
        reacquired.index(),
        reacquired.ptr() == second.ptr()
    );

    // Contents are not cleared between occupants.
    println!(
        "Leftover contents: {}",
        String::from_utf8_lossy(pool.block(reacquired).unwrap()).trim_end()
    );

    pool.destroy();
}
