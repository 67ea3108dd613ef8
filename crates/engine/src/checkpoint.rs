//! Checkpoint orchestrator
//!
//! Runs one checkpoint under the two checkpoint locks. The protocol, in
//! footprint stages (offset by the caller category's footprint base):
//!
//! ```text
//!  --  queue for checkpoint_safe(W)            waiters_now +1 / -1
//!  10  acquire multi_operation(W)
//!  20  acquire dictionary open/close exclusion
//!  30  cache.begin_checkpoint                  dirty -> pending, metadata image
//!      release exclusion, release multi_operation(W)
//!  40  before_flush(); cache.end_checkpoint(after_flush)
//!  50  read durability marker, trim log
//!  60  bookkeeping; footprint -> 0; release checkpoint_safe(W)
//! ```
//!
//! Clients are blocked only between stages 10 and 40 (the begin phase);
//! checkpoint-excluded operations are blocked for the whole run.
//!
//! # Failure handling
//!
//! - Snapshot failure skips the callbacks, the flush and the trim, but still
//!   does the bookkeeping and releases every lock
//! - Flush failure skips the trim
//! - Trim failure fails the run while the flushed checkpoint stands
//!
//! Every lock is held through an RAII guard, so a panicking callback also
//! releases them.

use crate::error::{CheckpointError, CheckpointResult};
use std::time::{Duration, Instant};
use tidemark_concurrency::lock_order::{self, LockRank};
use tidemark_concurrency::CheckpointLocks;
use tidemark_core::{
    now_micros, CallerCategory, CheckpointCache, CheckpointLogger, DictionaryLifecycle, Lsn,
    StatusKey, StatusRegistry,
};
use tracing::{debug, info, warn};

/// Footprint stage: admitted, acquiring multi_operation
pub const STAGE_ACQUIRE_MULTI_OPERATION: u64 = 10;
/// Footprint stage: acquiring the dictionary open/close exclusion
pub const STAGE_ACQUIRE_DICTIONARY: u64 = 20;
/// Footprint stage: cache is marking pending state
pub const STAGE_BEGIN: u64 = 30;
/// Footprint stage: callbacks and flush
pub const STAGE_END: u64 = 40;
/// Footprint stage: log trim
pub const STAGE_TRIM: u64 = 50;
/// Footprint stage: bookkeeping
pub const STAGE_BOOKKEEPING: u64 = 60;

/// Summary of a successful checkpoint run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointReport {
    /// Who asked for the checkpoint
    pub category: CallerCategory,
    /// Durability marker after the run, if a logger took part
    pub lsn: Option<Lsn>,
    /// Begin timestamp (µs since the Unix epoch)
    pub begin_micros: u64,
    /// End timestamp (µs since the Unix epoch)
    pub end_micros: u64,
    /// Time clients were blocked on multi_operation
    pub begin_phase: Duration,
    /// Time from admission to bookkeeping
    pub duration: Duration,
    /// Log segments reclaimed by the trim
    pub segments_trimmed: usize,
}

/// Holds the dictionary open/close exclusion until dropped
struct DictionaryExclusion<'a> {
    dictionaries: &'a dyn DictionaryLifecycle,
}

impl<'a> DictionaryExclusion<'a> {
    fn acquire(dictionaries: &'a dyn DictionaryLifecycle) -> Self {
        dictionaries.open_close_lock();
        Self { dictionaries }
    }
}

impl Drop for DictionaryExclusion<'_> {
    fn drop(&mut self) {
        self.dictionaries.open_close_unlock();
    }
}

/// Drives one checkpoint against a set of collaborators
///
/// Borrowed, short-lived view over the engine's locks, status registry and
/// collaborators. Construct one per run (or keep one around); all state
/// lives in what it borrows.
pub struct CheckpointOrchestrator<'a> {
    locks: &'a CheckpointLocks,
    status: &'a StatusRegistry,
    cache: &'a dyn CheckpointCache,
    logger: Option<&'a dyn CheckpointLogger>,
    dictionaries: &'a dyn DictionaryLifecycle,
    long_begin_threshold: Duration,
}

impl<'a> CheckpointOrchestrator<'a> {
    /// Default threshold above which a begin phase counts as long
    pub const DEFAULT_LONG_BEGIN_THRESHOLD: Duration = Duration::from_secs(1);

    /// Create an orchestrator without a logger
    pub fn new(
        locks: &'a CheckpointLocks,
        status: &'a StatusRegistry,
        cache: &'a dyn CheckpointCache,
        dictionaries: &'a dyn DictionaryLifecycle,
    ) -> Self {
        Self {
            locks,
            status,
            cache,
            logger: None,
            dictionaries,
            long_begin_threshold: Self::DEFAULT_LONG_BEGIN_THRESHOLD,
        }
    }

    /// Attach the write-ahead log; without one, trimming is skipped
    pub fn with_logger(mut self, logger: Option<&'a dyn CheckpointLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Set the long-begin threshold
    pub fn with_long_begin_threshold(mut self, threshold: Duration) -> Self {
        self.long_begin_threshold = threshold;
        self
    }

    fn set_footprint(&self, category: CallerCategory, stage: u64) {
        self.status
            .set(StatusKey::Footprint, category.footprint_base() + stage);
    }

    /// Run one checkpoint
    ///
    /// Blocks until no other checkpoint and no checkpoint-excluded operation
    /// is running. `before_flush` runs once the snapshot is fixed and
    /// `after_flush` once the pending state is durable; neither runs if the
    /// snapshot fails.
    ///
    /// # Arguments
    /// * `category` - Caller category, for the footprint diagnostic only
    /// * `before_flush` - Invoked after the snapshot, before the flush
    /// * `after_flush` - Invoked when the flush completes
    ///
    /// # Errors
    ///
    /// Returns the phase that failed. A `LogTrim` error still means the
    /// checkpoint itself is complete.
    ///
    /// # Panics
    ///
    /// In debug builds, panics if the calling thread holds the
    /// multi_operation lock.
    pub fn run<B, A>(
        &self,
        category: CallerCategory,
        before_flush: B,
        after_flush: A,
    ) -> CheckpointResult<CheckpointReport>
    where
        B: FnOnce(),
        A: FnOnce(),
    {
        // Step 1: queue behind any running checkpoint or excluded operation.
        lock_order::check_acquire(LockRank::CheckpointSafe);
        self.status.increment(StatusKey::WaitersNow);
        let checkpoint_safe = self.locks.checkpoint_safe().write();
        let still_waiting = self.status.decrement(StatusKey::WaitersNow);
        self.status.raise_to(StatusKey::WaitersMax, still_waiting);
        let admitted = Instant::now();
        debug!(target: "tidemark::checkpoint", %category, still_waiting, "Checkpoint admitted");

        // Steps 2-5: the begin phase, clients blocked.
        self.set_footprint(category, STAGE_ACQUIRE_MULTI_OPERATION);
        let multi_operation = self.locks.multi_operation().write();
        let blocked_since = Instant::now();

        self.set_footprint(category, STAGE_ACQUIRE_DICTIONARY);
        let exclusion = DictionaryExclusion::acquire(self.dictionaries);

        self.set_footprint(category, STAGE_BEGIN);
        let begin_micros = now_micros();
        self.status
            .set(StatusKey::TimeLastCheckpointBegin, begin_micros);
        let begin_result = self.cache.begin_checkpoint(self.logger);

        drop(exclusion);
        drop(multi_operation);
        let begin_phase = blocked_since.elapsed();
        self.record_begin_phase(category, begin_phase);

        // Step 6: callbacks and flush.
        self.set_footprint(category, STAGE_END);
        let mut outcome = begin_result
            .map_err(CheckpointError::Snapshot)
            .and_then(|()| {
                before_flush();
                let mut after_flush = Some(after_flush);
                self.cache
                    .end_checkpoint(self.logger, &mut || {
                        if let Some(callback) = after_flush.take() {
                            callback();
                        }
                    })
                    .map_err(CheckpointError::Flush)
            });

        // Step 7: log trim.
        self.set_footprint(category, STAGE_TRIM);
        let mut lsn = None;
        let mut segments_trimmed = 0;
        if let Some(logger) = self.logger.filter(|_| outcome.is_ok()) {
            let marker = logger.last_completed_checkpoint_lsn();
            self.status.raise_to(StatusKey::LastLsn, marker.as_u64());
            lsn = Some(marker);
            match logger.trim(marker) {
                Ok(removed) => segments_trimmed = removed,
                Err(source) => {
                    self.status.increment(StatusKey::TrimFailCount);
                    outcome = Err(CheckpointError::LogTrim {
                        lsn: marker,
                        source,
                    });
                }
            }
        }

        // Step 8: bookkeeping.
        self.set_footprint(category, STAGE_BOOKKEEPING);
        let end_micros = now_micros();
        let duration = admitted.elapsed();
        self.status.set(StatusKey::TimeLastCheckpointEnd, end_micros);
        self.status
            .set(StatusKey::TimeLastCheckpointBeginComplete, begin_micros);
        self.status
            .set(StatusKey::DurationLast, duration.as_micros() as u64);
        self.status
            .add(StatusKey::DurationTotal, duration.as_micros() as u64);

        let result = match outcome {
            Ok(()) => {
                self.status.increment(StatusKey::CheckpointCount);
                info!(
                    target: "tidemark::checkpoint",
                    %category,
                    lsn = ?lsn.map(|l| l.as_u64()),
                    begin_phase_us = begin_phase.as_micros() as u64,
                    duration_us = duration.as_micros() as u64,
                    segments_trimmed,
                    "Checkpoint complete"
                );
                Ok(CheckpointReport {
                    category,
                    lsn,
                    begin_micros,
                    end_micros,
                    begin_phase,
                    duration,
                    segments_trimmed,
                })
            }
            Err(e) => {
                self.status.increment(StatusKey::CheckpointCountFail);
                warn!(
                    target: "tidemark::checkpoint",
                    %category,
                    phase = e.phase(),
                    data_durable = e.data_durable(),
                    error = %e,
                    "Checkpoint failed"
                );
                Err(e)
            }
        };

        self.status.set(StatusKey::Footprint, 0);
        drop(checkpoint_safe);
        result
    }

    fn record_begin_phase(&self, category: CallerCategory, begin_phase: Duration) {
        let micros = begin_phase.as_micros() as u64;
        self.status.set(StatusKey::BeginDurationLast, micros);
        self.status.add(StatusKey::BeginDurationTotal, micros);
        if begin_phase > self.long_begin_threshold {
            self.status.increment(StatusKey::LongBeginCount);
            warn!(
                target: "tidemark::checkpoint",
                %category,
                begin_phase_us = micros,
                threshold_us = self.long_begin_threshold.as_micros() as u64,
                "Long checkpoint begin"
            );
        }
    }
}
