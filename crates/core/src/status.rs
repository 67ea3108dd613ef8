//! Checkpoint status registry
//!
//! A fixed table of named diagnostic fields, each tagged with a
//! [`StatusKind`] and a human legend. The descriptor table is built lazily
//! exactly once per process and shared by every engine instance; the
//! values live in a per-engine [`StatusRegistry`].
//!
//! # Consistency
//!
//! Every value is an `AtomicU64` accessed with `Relaxed` ordering:
//! 1. Values are purely observational and never gate protocol behavior
//! 2. They do not synchronize any other memory operations
//! 3. A snapshot is eventually consistent, not linearizable
//! 4. Readers never block, not even while a checkpoint is running
//!
//! Most fields are written only by the checkpoint holding the
//! checkpoint-safe lock and use plain stores. The waiter gauge and the
//! client contention counters are touched by many threads without a
//! surrounding lock and use atomic read-modify-write.

use crate::types::{format_micros, Lsn};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// How a status value should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    /// Monotonically increasing count
    Counter,
    /// Point-in-time value that may go up or down
    Gauge,
    /// Elapsed time in microseconds
    Duration,
    /// Wall-clock time in microseconds since the Unix epoch
    Timestamp,
    /// Log sequence number
    Lsn,
}

/// Key of a status field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKey {
    /// Configured checkpoint period in seconds
    Period,
    /// Protocol stage of the running checkpoint, offset by caller category
    Footprint,
    /// Start of the most recent checkpoint attempt
    TimeLastCheckpointBegin,
    /// Start of the most recent checkpoint that reached its bookkeeping stage
    TimeLastCheckpointBeginComplete,
    /// End of the most recent checkpoint attempt
    TimeLastCheckpointEnd,
    /// Durability marker of the last completed checkpoint
    LastLsn,
    /// Checkpoints that succeeded
    CheckpointCount,
    /// Checkpoints that failed
    CheckpointCountFail,
    /// Threads currently queued to start a checkpoint
    WaitersNow,
    /// Largest number of queued checkpoint threads ever observed
    WaitersMax,
    /// Client acquisitions of the multi-operation lock that found a checkpoint holding it
    ClientWaitOnMultiOperation,
    /// Client acquisitions of the checkpoint-safe lock that found a checkpoint holding it
    ClientWaitOnCheckpointSafe,
    /// Duration of the most recent checkpoint
    DurationLast,
    /// Cumulative checkpoint duration
    DurationTotal,
    /// Writer-blocking window of the most recent checkpoint
    BeginDurationLast,
    /// Cumulative writer-blocking window
    BeginDurationTotal,
    /// Begin phases longer than the configured threshold
    LongBeginCount,
    /// Log trims that failed after an otherwise successful checkpoint
    TrimFailCount,
}

impl StatusKey {
    /// Number of status fields
    pub const COUNT: usize = 18;

    /// Every key, in table order
    pub const ALL: [StatusKey; StatusKey::COUNT] = [
        StatusKey::Period,
        StatusKey::Footprint,
        StatusKey::TimeLastCheckpointBegin,
        StatusKey::TimeLastCheckpointBeginComplete,
        StatusKey::TimeLastCheckpointEnd,
        StatusKey::LastLsn,
        StatusKey::CheckpointCount,
        StatusKey::CheckpointCountFail,
        StatusKey::WaitersNow,
        StatusKey::WaitersMax,
        StatusKey::ClientWaitOnMultiOperation,
        StatusKey::ClientWaitOnCheckpointSafe,
        StatusKey::DurationLast,
        StatusKey::DurationTotal,
        StatusKey::BeginDurationLast,
        StatusKey::BeginDurationTotal,
        StatusKey::LongBeginCount,
        StatusKey::TrimFailCount,
    ];

    const fn index(self) -> usize {
        self as usize
    }

    /// Descriptor for this key
    pub fn descriptor(self) -> &'static StatusDescriptor {
        &descriptors()[self.index()]
    }
}

/// Static description of one status field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusDescriptor {
    /// Field key
    pub key: StatusKey,
    /// Stable machine-readable name
    pub name: &'static str,
    /// Value interpretation
    pub kind: StatusKind,
    /// Human legend shown to operators
    pub legend: &'static str,
}

static DESCRIPTORS: Lazy<Vec<StatusDescriptor>> = Lazy::new(|| {
    StatusKey::ALL
        .iter()
        .map(|&key| {
            let (name, kind, legend) = match key {
                StatusKey::Period => (
                    "period",
                    StatusKind::Gauge,
                    "checkpoint: period (seconds)",
                ),
                StatusKey::Footprint => (
                    "footprint",
                    StatusKind::Gauge,
                    "checkpoint: footprint",
                ),
                StatusKey::TimeLastCheckpointBegin => (
                    "time_last_checkpoint_begin",
                    StatusKind::Timestamp,
                    "checkpoint: last checkpoint began",
                ),
                StatusKey::TimeLastCheckpointBeginComplete => (
                    "time_last_checkpoint_begin_complete",
                    StatusKind::Timestamp,
                    "checkpoint: last complete checkpoint began",
                ),
                StatusKey::TimeLastCheckpointEnd => (
                    "time_last_checkpoint_end",
                    StatusKind::Timestamp,
                    "checkpoint: last complete checkpoint ended",
                ),
                StatusKey::LastLsn => (
                    "last_lsn",
                    StatusKind::Lsn,
                    "checkpoint: last complete checkpoint LSN",
                ),
                StatusKey::CheckpointCount => (
                    "checkpoints_taken",
                    StatusKind::Counter,
                    "checkpoint: checkpoints taken",
                ),
                StatusKey::CheckpointCountFail => (
                    "checkpoints_failed",
                    StatusKind::Counter,
                    "checkpoint: checkpoints failed",
                ),
                StatusKey::WaitersNow => (
                    "waiters_now",
                    StatusKind::Gauge,
                    "checkpoint: waiters now",
                ),
                StatusKey::WaitersMax => (
                    "waiters_max",
                    StatusKind::Gauge,
                    "checkpoint: waiters max",
                ),
                StatusKey::ClientWaitOnMultiOperation => (
                    "client_wait_on_mo",
                    StatusKind::Counter,
                    "checkpoint: non-checkpoint client wait on mo lock",
                ),
                StatusKey::ClientWaitOnCheckpointSafe => (
                    "client_wait_on_cs",
                    StatusKind::Counter,
                    "checkpoint: non-checkpoint client wait on cs lock",
                ),
                StatusKey::DurationLast => (
                    "duration_last",
                    StatusKind::Duration,
                    "checkpoint: duration of last checkpoint",
                ),
                StatusKey::DurationTotal => (
                    "duration_total",
                    StatusKind::Duration,
                    "checkpoint: checkpoint duration (total)",
                ),
                StatusKey::BeginDurationLast => (
                    "begin_duration_last",
                    StatusKind::Duration,
                    "checkpoint: begin phase of last checkpoint",
                ),
                StatusKey::BeginDurationTotal => (
                    "begin_duration_total",
                    StatusKind::Duration,
                    "checkpoint: begin phase (total)",
                ),
                StatusKey::LongBeginCount => (
                    "long_begin_count",
                    StatusKind::Counter,
                    "checkpoint: long checkpoint begin count",
                ),
                StatusKey::TrimFailCount => (
                    "trim_failures",
                    StatusKind::Counter,
                    "checkpoint: log trim failures",
                ),
            };
            StatusDescriptor {
                key,
                name,
                kind,
                legend,
            }
        })
        .collect()
});

/// The descriptor table, built on first use
pub fn descriptors() -> &'static [StatusDescriptor] {
    &DESCRIPTORS
}

// ============================================================================
// StatusRegistry
// ============================================================================

/// Live status values for one engine instance
pub struct StatusRegistry {
    values: [AtomicU64; StatusKey::COUNT],
}

impl StatusRegistry {
    /// Create a registry with every value zeroed
    pub fn new() -> Self {
        Self {
            values: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    fn slot(&self, key: StatusKey) -> &AtomicU64 {
        &self.values[key.index()]
    }

    /// Current value of a field
    pub fn get(&self, key: StatusKey) -> u64 {
        self.slot(key).load(Ordering::Relaxed)
    }

    /// Overwrite a field
    pub fn set(&self, key: StatusKey, value: u64) {
        self.slot(key).store(value, Ordering::Relaxed);
    }

    /// Atomically add one, returning the new value
    pub fn increment(&self, key: StatusKey) -> u64 {
        self.slot(key).fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Atomically subtract one (saturating at 0), returning the new value
    pub fn decrement(&self, key: StatusKey) -> u64 {
        let previous = self
            .slot(key)
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| {
                Some(x.saturating_sub(1))
            })
            .unwrap_or(0);
        previous.saturating_sub(1)
    }

    /// Atomically add `delta`
    pub fn add(&self, key: StatusKey, delta: u64) {
        self.slot(key).fetch_add(delta, Ordering::Relaxed);
    }

    /// Atomically raise a field to `candidate` if it is currently smaller
    ///
    /// Used for high-water marks, which must never decrease.
    pub fn raise_to(&self, key: StatusKey, candidate: u64) {
        self.slot(key).fetch_max(candidate, Ordering::Relaxed);
    }

    /// Copy out every value
    pub fn snapshot(&self) -> CheckpointStatus {
        CheckpointStatus::from_values(std::array::from_fn(|i| {
            self.values[i].load(Ordering::Relaxed)
        }))
    }
}

impl Default for StatusRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StatusRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusRegistry")
            .field("checkpoint_count", &self.get(StatusKey::CheckpointCount))
            .field("footprint", &self.get(StatusKey::Footprint))
            .finish_non_exhaustive()
    }
}

// ============================================================================
// CheckpointStatus
// ============================================================================

/// Point-in-time copy of the status registry
///
/// Timestamps are microseconds since the Unix epoch (0 = never); durations
/// are microseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckpointStatus {
    /// Configured checkpoint period in seconds (0 = periodic checkpoints disabled)
    pub period_secs: u64,
    /// Current protocol stage (0 = idle)
    pub footprint: u64,
    /// Start of the most recent checkpoint attempt
    pub time_last_checkpoint_begin: u64,
    /// Start of the most recent checkpoint that reached bookkeeping
    pub time_last_checkpoint_begin_complete: u64,
    /// End of the most recent checkpoint attempt
    pub time_last_checkpoint_end: u64,
    /// Durability marker of the last completed checkpoint
    pub last_lsn: Lsn,
    /// Checkpoints that succeeded
    pub checkpoint_count: u64,
    /// Checkpoints that failed
    pub checkpoint_count_fail: u64,
    /// Threads currently queued to start a checkpoint
    pub waiters_now: u64,
    /// High-water mark of `waiters_now`
    pub waiters_max: u64,
    /// Client waits on the multi-operation lock
    pub client_wait_on_mo: u64,
    /// Client waits on the checkpoint-safe lock
    pub client_wait_on_cs: u64,
    /// Duration of the most recent checkpoint (µs)
    pub duration_last: u64,
    /// Cumulative checkpoint duration (µs)
    pub duration_total: u64,
    /// Writer-blocking window of the most recent checkpoint (µs)
    pub begin_duration_last: u64,
    /// Cumulative writer-blocking window (µs)
    pub begin_duration_total: u64,
    /// Begin phases longer than the configured threshold
    pub long_begin_count: u64,
    /// Failed log trims
    pub trim_fail_count: u64,
}

impl CheckpointStatus {
    fn from_values(v: [u64; StatusKey::COUNT]) -> Self {
        let at = |key: StatusKey| v[key.index()];
        Self {
            period_secs: at(StatusKey::Period),
            footprint: at(StatusKey::Footprint),
            time_last_checkpoint_begin: at(StatusKey::TimeLastCheckpointBegin),
            time_last_checkpoint_begin_complete: at(StatusKey::TimeLastCheckpointBeginComplete),
            time_last_checkpoint_end: at(StatusKey::TimeLastCheckpointEnd),
            last_lsn: Lsn::new(at(StatusKey::LastLsn)),
            checkpoint_count: at(StatusKey::CheckpointCount),
            checkpoint_count_fail: at(StatusKey::CheckpointCountFail),
            waiters_now: at(StatusKey::WaitersNow),
            waiters_max: at(StatusKey::WaitersMax),
            client_wait_on_mo: at(StatusKey::ClientWaitOnMultiOperation),
            client_wait_on_cs: at(StatusKey::ClientWaitOnCheckpointSafe),
            duration_last: at(StatusKey::DurationLast),
            duration_total: at(StatusKey::DurationTotal),
            begin_duration_last: at(StatusKey::BeginDurationLast),
            begin_duration_total: at(StatusKey::BeginDurationTotal),
            long_begin_count: at(StatusKey::LongBeginCount),
            trim_fail_count: at(StatusKey::TrimFailCount),
        }
    }

    /// Raw value of a field
    pub fn value(&self, key: StatusKey) -> u64 {
        match key {
            StatusKey::Period => self.period_secs,
            StatusKey::Footprint => self.footprint,
            StatusKey::TimeLastCheckpointBegin => self.time_last_checkpoint_begin,
            StatusKey::TimeLastCheckpointBeginComplete => self.time_last_checkpoint_begin_complete,
            StatusKey::TimeLastCheckpointEnd => self.time_last_checkpoint_end,
            StatusKey::LastLsn => self.last_lsn.as_u64(),
            StatusKey::CheckpointCount => self.checkpoint_count,
            StatusKey::CheckpointCountFail => self.checkpoint_count_fail,
            StatusKey::WaitersNow => self.waiters_now,
            StatusKey::WaitersMax => self.waiters_max,
            StatusKey::ClientWaitOnMultiOperation => self.client_wait_on_mo,
            StatusKey::ClientWaitOnCheckpointSafe => self.client_wait_on_cs,
            StatusKey::DurationLast => self.duration_last,
            StatusKey::DurationTotal => self.duration_total,
            StatusKey::BeginDurationLast => self.begin_duration_last,
            StatusKey::BeginDurationTotal => self.begin_duration_total,
            StatusKey::LongBeginCount => self.long_begin_count,
            StatusKey::TrimFailCount => self.trim_fail_count,
        }
    }

    /// Iterate (descriptor, value) rows in table order
    pub fn rows(&self) -> impl Iterator<Item = (&'static StatusDescriptor, u64)> + '_ {
        descriptors().iter().map(move |d| (d, self.value(d.key)))
    }
}

fn render(kind: StatusKind, value: u64) -> String {
    match kind {
        StatusKind::Timestamp => format_micros(value),
        StatusKind::Duration => format!("{:?}", Duration::from_micros(value)),
        StatusKind::Counter | StatusKind::Gauge | StatusKind::Lsn => value.to_string(),
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (descriptor, value) in self.rows() {
            writeln!(
                f,
                "{:<52} {}",
                descriptor.legend,
                render(descriptor.kind, value)
            )?;
        }
        Ok(())
    }
}
