//! Operator-visible checkpoint scenarios

use crate::common::{wait_for, TestEngine};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tidemark::{CallerCategory, CheckpointError, FaultPoint, StatusKey};

/// Three sequential checkpoints on a fresh engine
#[test]
fn sequential_checkpoints_on_fresh_engine() {
    let t = TestEngine::new();
    assert_eq!(t.engine.get_status().checkpoint_count, 0);

    for _ in 0..3 {
        t.engine.checkpoint(CallerCategory::Client).unwrap();
    }

    let status = t.engine.get_status();
    assert_eq!(status.checkpoint_count, 3);
    assert_eq!(status.checkpoint_count_fail, 0);
    assert_eq!(status.waiters_max, 0);
    assert_eq!(status.waiters_now, 0);
    assert_eq!(status.footprint, 0);
}

/// Five concurrent checkpoint calls, all queued behind an excluded operation
#[test]
fn concurrent_checkpoints_queue_and_run_one_at_a_time() {
    let t = Arc::new(TestEngine::new());
    t.cache.stall_flush(Duration::from_millis(2));
    let before = t.engine.get_status().checkpoint_count;

    let pause = t.engine.checkpoint_safe_guard();
    let handles: Vec<_> = (0..5)
        .map(|_| {
            let t = Arc::clone(&t);
            thread::spawn(move || t.engine.checkpoint(CallerCategory::Client))
        })
        .collect();

    wait_for(|| t.engine.status().get(StatusKey::WaitersNow) == 5);
    drop(pause);

    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let status = t.engine.get_status();
    assert_eq!(status.checkpoint_count, before + 5);
    assert_eq!(status.checkpoint_count_fail, 0);
    assert!(status.waiters_max >= 4, "waiters_max = {}", status.waiters_max);
    assert_eq!(status.waiters_now, 0);
    assert_eq!(t.cache.max_active(), 1);
    assert_eq!(t.cache.begins(), 5);
}

/// A checkpoint requested while a rename holds the excluded guard waits for it
#[test]
fn checkpoint_waits_for_checkpoint_excluded_operation() {
    let t = Arc::new(TestEngine::new());
    t.dictionaries.open("orders").unwrap();

    let rename = t.engine.checkpoint_safe_guard();
    let done = Arc::new(AtomicBool::new(false));
    let checkpoint = {
        let t = Arc::clone(&t);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let result = t.engine.checkpoint(CallerCategory::Client);
            done.store(true, Ordering::SeqCst);
            result
        })
    };

    wait_for(|| t.engine.status().get(StatusKey::WaitersNow) == 1);
    thread::sleep(Duration::from_millis(50));
    assert!(!done.load(Ordering::SeqCst));
    // Still queued at step 1: no stage recorded yet.
    assert_eq!(t.engine.get_status().footprint, 0);

    t.dictionaries.rename("orders", "orders_v2").unwrap();
    drop(rename);

    checkpoint.join().unwrap().unwrap();
    assert!(done.load(Ordering::SeqCst));
    assert_eq!(t.engine.get_status().checkpoint_count, 1);
    assert!(t.dictionaries.is_open("orders_v2"));
}

/// A failed snapshot releases both locks
#[test]
fn snapshot_failure_releases_locks() {
    let t = Arc::new(TestEngine::new());
    let page = t.cache.pages.allocate_page();
    t.faults.fail_next(FaultPoint::BeginCheckpoint);

    let err = t.engine.checkpoint(CallerCategory::Client).unwrap_err();
    assert!(matches!(err, CheckpointError::Snapshot(_)));

    let status = t.engine.get_status();
    assert_eq!(status.checkpoint_count_fail, 1);
    assert_eq!(status.checkpoint_count, 0);
    assert_eq!(status.footprint, 0);
    assert!(!t.engine.locks().checkpoint_safe().writer_active());
    assert!(!t.engine.locks().multi_operation().writer_active());

    // Run the next checkpoint elsewhere so a leaked lock shows up as a
    // timeout rather than a hung test.
    let (tx, rx) = mpsc::channel();
    {
        let t = Arc::clone(&t);
        thread::spawn(move || {
            drop(t.engine.multi_operation_guard());
            tx.send(t.engine.checkpoint(CallerCategory::Client).is_ok())
                .unwrap();
        });
    }
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(true));

    let status = t.engine.get_status();
    assert_eq!(status.checkpoint_count, 1);
    assert_eq!(status.checkpoint_count_fail, 1);
    assert_eq!(t.cache.pages.durable_version(page), Some(1));
}

/// The footprint encodes the caller category while a checkpoint is stuck
#[test]
fn footprint_identifies_stuck_caller() {
    let t = Arc::new(TestEngine::new());
    let atomic = t.engine.multi_operation_guard();

    let checkpoint = {
        let t = Arc::clone(&t);
        thread::spawn(move || t.engine.checkpoint(CallerCategory::Recovery))
    };

    // Admitted, then blocked acquiring multi_operation behind our guard.
    let expected = CallerCategory::Recovery.footprint_base() + 10;
    wait_for(|| t.engine.get_status().footprint == expected);
    assert_eq!(
        CallerCategory::decode_footprint(expected),
        Some((CallerCategory::Recovery, 10))
    );

    drop(atomic);
    checkpoint.join().unwrap().unwrap();
    assert_eq!(t.engine.get_status().footprint, 0);
}

/// Clients that find a checkpoint holding a lock are counted
#[test]
fn client_waits_are_counted() {
    let t = Arc::new(TestEngine::new());
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let checkpoint = {
        let t = Arc::clone(&t);
        thread::spawn(move || {
            t.engine.checkpoint_with(
                CallerCategory::Client,
                || {
                    entered_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                },
                || {},
            )
        })
    };
    entered_rx.recv().unwrap();

    // The checkpoint is flushing: multi_operation is free, checkpoint_safe is not.
    {
        let _atomic = t.engine.multi_operation_guard();
    }
    assert_eq!(t.engine.get_status().client_wait_on_mo, 0);

    let excluded = {
        let t = Arc::clone(&t);
        thread::spawn(move || {
            let _pause = t.engine.checkpoint_safe_guard();
        })
    };
    wait_for(|| t.engine.get_status().client_wait_on_cs == 1);

    release_tx.send(()).unwrap();
    checkpoint.join().unwrap().unwrap();
    excluded.join().unwrap();
}

/// Shutdown runs a final checkpoint and refuses later ones
#[test]
fn shutdown_checkpoint() {
    let t = TestEngine::new();
    let page = t.cache.pages.allocate_page();

    let report = t.engine.shutdown().unwrap();
    assert_eq!(report.category, CallerCategory::Shutdown);
    assert_eq!(t.cache.pages.durable_version(page), Some(1));
    assert!(matches!(
        t.engine.checkpoint(CallerCategory::Periodic),
        Err(CheckpointError::ShutDown)
    ));
}

/// The status table renders every row
#[test]
fn status_renders_as_table() {
    let t = TestEngine::new();
    t.engine.checkpoint(CallerCategory::Client).unwrap();

    let status = t.engine.get_status();
    let rendered = status.to_string();
    assert_eq!(rendered.lines().count(), StatusKey::ALL.len());
    assert_eq!(status.rows().count(), StatusKey::ALL.len());
    assert_eq!(status.value(StatusKey::CheckpointCount), 1);
}
