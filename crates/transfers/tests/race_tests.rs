//! Cancellation race tests
//!
//! Exercises the window the registry exists to close: a caller cancelling a
//! transfer while the engine's event thread is delivering a completion for
//! the same handle. The guarantee under test: once `cancel` has returned,
//! the user callback can no longer fire for that submission, no matter how
//! the two threads interleave.
//!
//! Run with: `cargo test -p transfers --test race_tests`

use common::TransferStatus;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use transfers::DeviceHandle;
use transfers::testing::mock_manager;

const ITERATIONS: usize = 200;

#[test]
fn test_cancel_races_in_flight_completion() {
    let manager = Arc::new(mock_manager());

    for _ in 0..ITERATIONS {
        let transfer = manager.alloc_transfer(0).unwrap();
        let handle = transfer.handle();

        let fired = Arc::new(AtomicU32::new(0));
        let fired_in_callback = Arc::clone(&fired);
        transfer.set_callback(move |_| {
            fired_in_callback.fetch_add(1, Ordering::SeqCst);
        });

        transfer
            .fill_bulk(DeviceHandle(1), 0x81, vec![0u8; 32], 1000)
            .unwrap();
        transfer.submit().unwrap();

        // Engine event thread and cancelling caller released together
        let barrier = Arc::new(Barrier::new(2));
        let engine_barrier = Arc::clone(&barrier);
        let engine = Arc::clone(&manager);
        let event_thread = thread::spawn(move || {
            engine_barrier.wait();
            engine
                .engine()
                .complete_empty(handle, TransferStatus::Completed);
        });

        barrier.wait();
        transfer.cancel().unwrap();
        event_thread.join().unwrap();

        // Either the completion won the race (one dispatch) or the cancel
        // did (zero); never more.
        let dispatched = fired.load(Ordering::SeqCst);
        assert!(dispatched <= 1, "callback dispatched {} times", dispatched);

        // Past this point the outcome is deterministic: the handle is
        // de-registered, so a late notification can never dispatch.
        assert!(!manager.registry().contains(handle));
        manager
            .engine()
            .complete_empty(handle, TransferStatus::Cancelled);
        assert_eq!(fired.load(Ordering::SeqCst), dispatched);

        transfer.free();
    }

    assert!(manager.registry().is_empty());
}

#[test]
fn test_free_after_cancel_under_concurrent_lookups() {
    let manager = Arc::new(mock_manager());
    let transfer = manager.alloc_transfer(0).unwrap();
    let handle = transfer.handle();

    transfer
        .fill_bulk(DeviceHandle(1), 0x81, vec![0u8; 8], 1000)
        .unwrap();
    transfer.submit().unwrap();

    // Hammer the registry from another thread while the caller tears the
    // transfer down; lookups must stay safe against concurrent removal.
    let registry = Arc::clone(manager.registry());
    let done = Arc::new(AtomicU32::new(0));
    let done_flag = Arc::clone(&done);
    let lookup_thread = thread::spawn(move || {
        while done_flag.load(Ordering::SeqCst) == 0 {
            let _ = registry.lookup(handle);
            let _ = registry.contains(handle);
        }
    });

    transfer.cancel().unwrap();
    transfer.free();
    done.store(1, Ordering::SeqCst);
    lookup_thread.join().unwrap();

    assert!(!manager.registry().contains(handle));
}

#[test]
fn test_registry_remove_races_are_idempotent() {
    let manager = Arc::new(mock_manager());
    let transfer = manager.alloc_transfer(0).unwrap();
    let handle = transfer.handle();

    // Cancellation and cleanup paths may both try to remove the same key;
    // every combination must be a no-op after the first.
    let barrier = Arc::new(Barrier::new(2));
    let mut threads = Vec::new();
    for _ in 0..2 {
        let registry = Arc::clone(manager.registry());
        let barrier = Arc::clone(&barrier);
        threads.push(thread::spawn(move || {
            barrier.wait();
            registry.remove(handle);
            registry.remove(handle);
        }));
    }
    for t in threads {
        t.join().unwrap();
    }

    assert!(!manager.registry().contains(handle));
    transfer.free();
}
