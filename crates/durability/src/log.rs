//! Segmented in-memory write-ahead log
//!
//! A reference [`CheckpointLogger`] for engines without their own log, and
//! for tests. Records are grouped into fixed-size segments; trimming removes
//! whole segments.
//!
//! # Trim Semantics
//!
//! - The trim marker is the begin-checkpoint LSN of the last completed
//!   checkpoint: recovery starts from that record, nothing earlier is needed
//! - A segment is removed only if its *last* record is below the marker
//! - The active (newest) segment is never removed
//! - Trimming is idempotent; trimming with an older marker removes nothing

use crate::testing::{FaultInjector, FaultPoint};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tidemark_core::{CheckpointLogger, Lsn, Result};
use tracing::{debug, info};

/// Records per segment unless configured otherwise
pub const DEFAULT_SEGMENT_RECORDS: usize = 64;

/// Payload of one log record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecordKind {
    /// Opaque client data
    Data(Vec<u8>),
    /// A checkpoint began at this record
    BeginCheckpoint,
    /// The checkpoint that began at `begin` completed
    EndCheckpoint {
        /// LSN of the matching begin-checkpoint record
        begin: Lsn,
    },
}

/// One log record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Assigned sequence number
    pub lsn: Lsn,
    /// Record payload
    pub kind: LogRecordKind,
}

#[derive(Debug)]
struct Segment {
    id: u64,
    records: Vec<LogRecord>,
}

impl Segment {
    fn last_lsn(&self) -> Lsn {
        self.records.last().map(|r| r.lsn).unwrap_or(Lsn::ZERO)
    }
}

#[derive(Debug)]
struct LogState {
    last_lsn: Lsn,
    segments: VecDeque<Segment>,
    next_segment_id: u64,
    last_completed_checkpoint: Lsn,
    segments_trimmed: u64,
}

/// In-memory write-ahead log with segment-granular trimming
#[derive(Debug)]
pub struct SegmentedLog {
    state: Mutex<LogState>,
    records_per_segment: usize,
    faults: Arc<FaultInjector>,
}

impl SegmentedLog {
    /// Create an empty log with [`DEFAULT_SEGMENT_RECORDS`] per segment
    pub fn new() -> Self {
        Self::with_segment_records(DEFAULT_SEGMENT_RECORDS)
    }

    /// Create an empty log with `records_per_segment` records per segment
    ///
    /// A value of 0 is treated as 1.
    pub fn with_segment_records(records_per_segment: usize) -> Self {
        Self {
            state: Mutex::new(LogState {
                last_lsn: Lsn::ZERO,
                segments: VecDeque::new(),
                next_segment_id: 0,
                last_completed_checkpoint: Lsn::ZERO,
                segments_trimmed: 0,
            }),
            records_per_segment: records_per_segment.max(1),
            faults: Arc::new(FaultInjector::new()),
        }
    }

    /// Share a fault injector with this log
    pub fn with_faults(mut self, faults: Arc<FaultInjector>) -> Self {
        self.faults = faults;
        self
    }

    fn push(&self, state: &mut LogState, kind: LogRecordKind) -> Lsn {
        let lsn = state.last_lsn.next();
        state.last_lsn = lsn;

        let needs_segment = state
            .segments
            .back()
            .map_or(true, |s| s.records.len() >= self.records_per_segment);
        if needs_segment {
            let id = state.next_segment_id;
            state.next_segment_id += 1;
            state.segments.push_back(Segment {
                id,
                records: Vec::with_capacity(self.records_per_segment),
            });
            debug!(target: "tidemark::log", segment = id, first_lsn = %lsn, "Opened log segment");
        }
        if let Some(segment) = state.segments.back_mut() {
            segment.records.push(LogRecord { lsn, kind });
        }
        lsn
    }

    /// Append a data record, returning its LSN
    pub fn append(&self, payload: impl Into<Vec<u8>>) -> Lsn {
        let mut state = self.state.lock();
        self.push(&mut state, LogRecordKind::Data(payload.into()))
    }

    /// LSN of the newest record (ZERO if empty)
    pub fn last_lsn(&self) -> Lsn {
        self.state.lock().last_lsn
    }

    /// LSN of the oldest retained record, if any
    pub fn oldest_lsn(&self) -> Option<Lsn> {
        let state = self.state.lock();
        state
            .segments
            .front()
            .and_then(|s| s.records.first())
            .map(|r| r.lsn)
    }

    /// Number of retained segments
    pub fn segment_count(&self) -> usize {
        self.state.lock().segments.len()
    }

    /// Ids of retained segments, oldest first
    pub fn segment_ids(&self) -> Vec<u64> {
        self.state.lock().segments.iter().map(|s| s.id).collect()
    }

    /// Total segments removed by trimming
    pub fn segments_trimmed(&self) -> u64 {
        self.state.lock().segments_trimmed
    }

    /// Copy of every retained record, oldest first
    pub fn records(&self) -> Vec<LogRecord> {
        let state = self.state.lock();
        state
            .segments
            .iter()
            .flat_map(|s| s.records.iter().cloned())
            .collect()
    }
}

impl Default for SegmentedLog {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckpointLogger for SegmentedLog {
    fn log_begin_checkpoint(&self) -> Result<Lsn> {
        let mut state = self.state.lock();
        let lsn = self.push(&mut state, LogRecordKind::BeginCheckpoint);
        debug!(target: "tidemark::log", %lsn, "Logged begin checkpoint");
        Ok(lsn)
    }

    fn log_end_checkpoint(&self, begin: Lsn) -> Result<()> {
        let mut state = self.state.lock();
        let lsn = self.push(&mut state, LogRecordKind::EndCheckpoint { begin });
        state.last_completed_checkpoint = state.last_completed_checkpoint.max(begin);
        debug!(target: "tidemark::log", %lsn, %begin, "Logged end checkpoint");
        Ok(())
    }

    fn last_completed_checkpoint_lsn(&self) -> Lsn {
        self.state.lock().last_completed_checkpoint
    }

    fn trim(&self, lsn: Lsn) -> Result<usize> {
        self.faults.check(FaultPoint::LogTrim)?;

        let mut state = self.state.lock();
        let mut removed = 0;
        while state.segments.len() > 1 {
            match state.segments.front() {
                Some(oldest) if oldest.last_lsn() < lsn => {
                    state.segments.pop_front();
                    removed += 1;
                }
                _ => break,
            }
        }
        state.segments_trimmed += removed as u64;

        if removed > 0 {
            info!(
                target: "tidemark::log",
                trim_lsn = %lsn,
                segments_removed = removed,
                segments_retained = state.segments.len(),
                "Trimmed log"
            );
        }
        Ok(removed)
    }
}
