//! Shared test utilities for the integration test suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tidemark::{
    CheckpointCache, CheckpointConfig, CheckpointLogger, DictionaryRegistry, Engine,
    FaultInjector, PageCache, Result, SegmentedLog,
};

// ============================================================================
// InstrumentedCache
// ============================================================================

/// `PageCache` wrapper that records how many checkpoints are between begin
/// and end at once, and can stall inside the flush to widen overlap windows.
pub struct InstrumentedCache {
    pub pages: PageCache,
    active: AtomicUsize,
    max_active: AtomicUsize,
    begins: AtomicUsize,
    flush_stall: Mutex<Duration>,
}

impl InstrumentedCache {
    pub fn new(faults: Arc<FaultInjector>) -> Self {
        Self {
            pages: PageCache::with_faults(faults),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            begins: AtomicUsize::new(0),
            flush_stall: Mutex::new(Duration::ZERO),
        }
    }

    /// Sleep this long inside every `end_checkpoint`
    pub fn stall_flush(&self, stall: Duration) {
        *self.flush_stall.lock() = stall;
    }

    /// Most checkpoints ever observed between begin and end at once
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Successful begins so far
    pub fn begins(&self) -> usize {
        self.begins.load(Ordering::SeqCst)
    }
}

impl CheckpointCache for InstrumentedCache {
    fn begin_checkpoint(&self, logger: Option<&dyn CheckpointLogger>) -> Result<()> {
        self.pages.begin_checkpoint(logger)?;
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.begins.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn end_checkpoint(
        &self,
        logger: Option<&dyn CheckpointLogger>,
        on_flushed: &mut dyn FnMut(),
    ) -> Result<()> {
        let stall = *self.flush_stall.lock();
        if !stall.is_zero() {
            thread::sleep(stall);
        }
        let result = self.pages.end_checkpoint(logger, on_flushed);
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

// ============================================================================
// TestEngine
// ============================================================================

/// An engine wired to the reference collaborators, periodic checkpoints off
pub struct TestEngine {
    pub engine: Arc<Engine>,
    pub cache: Arc<InstrumentedCache>,
    pub log: Arc<SegmentedLog>,
    pub dictionaries: Arc<DictionaryRegistry>,
    pub faults: Arc<FaultInjector>,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_segment_records(4)
    }

    pub fn with_segment_records(records: usize) -> Self {
        let faults = Arc::new(FaultInjector::new());
        let cache = Arc::new(InstrumentedCache::new(Arc::clone(&faults)));
        let log = Arc::new(SegmentedLog::with_segment_records(records).with_faults(Arc::clone(&faults)));
        let dictionaries = Arc::new(DictionaryRegistry::new());
        let engine = Engine::builder(cache.clone(), dictionaries.clone())
            .logger(log.clone())
            .config(CheckpointConfig::manual())
            .open()
            .expect("engine opens");
        Self {
            engine,
            cache,
            log,
            dictionaries,
            faults,
        }
    }
}

/// Poll `condition` until it holds, failing the test after five seconds
pub fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(1));
    }
}
