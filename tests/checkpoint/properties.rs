//! Concurrency and durability properties of the checkpoint protocol

use crate::common::TestEngine;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tidemark::{CallerCategory, CheckpointError, CheckpointLogger, FaultPoint, Lsn, StatusKey};

#[test]
fn at_most_one_checkpoint_between_begin_and_end() {
    let t = Arc::new(TestEngine::new());
    t.cache.stall_flush(Duration::from_millis(1));

    const THREADS: usize = 8;
    const PER_THREAD: usize = 5;
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let t = Arc::clone(&t);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..PER_THREAD {
                    let category = if i % 2 == 0 {
                        CallerCategory::Client
                    } else {
                        CallerCategory::Periodic
                    };
                    t.engine.checkpoint(category).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(t.cache.max_active(), 1);
    let status = t.engine.get_status();
    assert_eq!(status.checkpoint_count, (THREADS * PER_THREAD) as u64);
    assert_eq!(status.waiters_now, 0);
    assert!(status.waiters_max < THREADS as u64);
}

#[test]
fn waiter_gauges_settle_and_high_water_mark_never_drops() {
    let t = Arc::new(TestEngine::new());
    t.cache.stall_flush(Duration::from_millis(2));
    let stop = Arc::new(AtomicBool::new(false));

    // Samples (waiters_now, waiters_max) while checkpoints contend.
    let monitor = {
        let t = Arc::clone(&t);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut samples = Vec::new();
            while !stop.load(Ordering::SeqCst) {
                let status = t.engine.get_status();
                samples.push((status.waiters_now, status.waiters_max));
                thread::sleep(Duration::from_micros(200));
            }
            samples
        })
    };

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let t = Arc::clone(&t);
            thread::spawn(move || {
                for _ in 0..4 {
                    t.engine.checkpoint(CallerCategory::Client).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    stop.store(true, Ordering::SeqCst);
    let samples = monitor.join().unwrap();

    let status = t.engine.get_status();
    assert_eq!(status.waiters_now, 0);

    let mut previous_max = 0;
    for &(_, max) in &samples {
        assert!(max >= previous_max, "waiters_max decreased");
        previous_max = max;
    }
    // The high-water mark records how many were still queued when one was
    // admitted, so it trails the peak queue length by at most one.
    let peak = samples.iter().map(|&(now, _)| now).max().unwrap_or(0);
    assert!(status.waiters_max + 1 >= peak);
}

#[test]
fn guarded_operation_pairs_are_never_split_by_a_snapshot() {
    let t = Arc::new(TestEngine::new());
    let a = t.cache.pages.allocate_page();
    let b = t.cache.pages.allocate_page();
    let stop = Arc::new(AtomicBool::new(false));

    let writers: Vec<_> = (0..2)
        .map(|_| {
            let t = Arc::clone(&t);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    let _atomic = t.engine.multi_operation_guard();
                    t.cache.pages.write_page(a).unwrap();
                    thread::yield_now();
                    t.cache.pages.write_page(b).unwrap();
                }
            })
        })
        .collect();

    for _ in 0..50 {
        t.engine.checkpoint(CallerCategory::Client).unwrap();
    }
    stop.store(true, Ordering::SeqCst);
    for writer in writers {
        writer.join().unwrap();
    }

    let history = t.cache.pages.checkpoint_history();
    assert_eq!(history.len(), 50);
    for image in &history {
        let translation = &image.metadata.translation;
        assert_eq!(translation.get(&a), translation.get(&b));
        assert_eq!(image.flushed.get(&a), image.flushed.get(&b));
    }
}

#[test]
fn durability_marker_is_non_decreasing() {
    let t = TestEngine::new();
    let mut previous = Lsn::ZERO;
    for round in 0..10u8 {
        for i in 0..round {
            t.log.append(vec![round, i]);
        }
        let report = t.engine.checkpoint(CallerCategory::Periodic).unwrap();
        let marker = t.engine.get_status().last_lsn;
        assert_eq!(report.lsn, Some(marker));
        assert!(marker > previous);
        assert_eq!(marker, t.log.last_completed_checkpoint_lsn());
        previous = marker;
    }
    // Trimming kept everything from the last begin record on.
    assert!(t.log.oldest_lsn().unwrap() <= previous);
}

#[test]
fn log_trim_failure_leaves_flushed_checkpoint_intact() {
    let t = TestEngine::new();
    let p0 = t.cache.pages.allocate_page();
    let p1 = t.cache.pages.allocate_page();
    let p2 = t.cache.pages.allocate_page();
    t.cache.pages.write_page(p1).unwrap();
    t.cache.pages.write_page(p1).unwrap();
    let expected: BTreeMap<_, _> = [(p0, 1), (p1, 3), (p2, 1)].into_iter().collect();

    t.faults.fail_next(FaultPoint::LogTrim);
    let err = t.engine.checkpoint(CallerCategory::Client).unwrap_err();
    assert!(matches!(err, CheckpointError::LogTrim { .. }));
    assert!(err.data_durable());

    let image = t.cache.pages.last_checkpoint().unwrap();
    assert_eq!(image.flushed, expected);
    for (&page, &version) in &expected {
        assert_eq!(t.cache.pages.durable_version(page), Some(version));
    }

    let status = t.engine.get_status();
    assert_eq!(status.checkpoint_count_fail, 1);
    assert_eq!(status.checkpoint_count, 0);
    assert_eq!(status.trim_fail_count, 1);

    // The next checkpoint trims normally.
    t.engine.checkpoint(CallerCategory::Client).unwrap();
    assert_eq!(t.engine.get_status().checkpoint_count, 1);
}

#[test]
fn dictionary_open_waits_for_snapshot_window_only() {
    let t = Arc::new(TestEngine::new());
    let (entered_tx, entered_rx) = std::sync::mpsc::channel();
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

    let checkpoint = {
        let t = Arc::clone(&t);
        thread::spawn(move || {
            t.engine.checkpoint_with(
                CallerCategory::Client,
                || {},
                || {
                    entered_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                },
            )
        })
    };
    entered_rx.recv().unwrap();

    // Mid-flush: the open/close exclusion is no longer held.
    assert!(!t.dictionaries.is_excluded());
    t.dictionaries.open("created_during_flush").unwrap();

    release_tx.send(()).unwrap();
    checkpoint.join().unwrap().unwrap();
}

#[cfg(debug_assertions)]
#[test]
fn checkpoint_under_atomic_guard_violates_lock_order() {
    let t = Arc::new(TestEngine::new());
    let result = {
        let t = Arc::clone(&t);
        thread::spawn(move || {
            let _atomic = t.engine.multi_operation_guard();
            let _ = t.engine.checkpoint(CallerCategory::Client);
        })
        .join()
    };

    let panic = result.unwrap_err();
    let message = panic
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| panic.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_default();
    assert!(message.contains("lock order violation"), "{}", message);

    // Nothing was left behind by the refused request.
    let status = t.engine.get_status();
    assert_eq!(status.waiters_now, 0);
    assert_eq!(status.checkpoint_count, 0);
    t.engine.checkpoint(CallerCategory::Client).unwrap();
}

#[cfg(debug_assertions)]
#[test]
fn excluded_guard_inside_atomic_guard_violates_lock_order() {
    let t = Arc::new(TestEngine::new());
    let result = {
        let t = Arc::clone(&t);
        thread::spawn(move || {
            let _atomic = t.engine.multi_operation_guard();
            let _excluded = t.engine.checkpoint_safe_guard();
        })
        .join()
    };
    assert!(result.is_err());

    // The panicking thread's guard was released during unwinding.
    t.engine.checkpoint(CallerCategory::Client).unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn marker_monotonic_across_workloads(
        ops in prop::collection::vec((0u8..3, 0usize..6), 1..24)
    ) {
        let t = TestEngine::with_segment_records(3);
        let mut previous = 0u64;
        for (op, n) in ops {
            match op {
                0 => {
                    for i in 0..n {
                        t.log.append(vec![i as u8]);
                    }
                }
                1 => {
                    t.faults.fail_next(FaultPoint::LogTrim);
                    let _ = t.engine.checkpoint(CallerCategory::Client);
                }
                _ => {
                    t.engine.checkpoint(CallerCategory::Periodic).unwrap();
                }
            }
            let marker = t.engine.status().get(StatusKey::LastLsn);
            prop_assert!(marker >= previous);
            prop_assert!(marker <= t.log.last_lsn().as_u64());
            previous = marker;
        }
        let status = t.engine.get_status();
        prop_assert_eq!(status.waiters_now, 0);
        prop_assert_eq!(status.footprint, 0);
    }
}
