//! The checkpoint lock subsystem
//!
//! Two independent reader-writer locks with distinct roles:
//!
//! - **checkpoint_safe**: the orchestrator holds the writer side for the
//!   whole checkpoint, so at most one checkpoint runs at a time and a second
//!   attempt queues. Readers are operations that must never overlap any
//!   checkpoint (dictionary rename/delete, backup pauses).
//! - **multi_operation**: the orchestrator holds the writer side only while
//!   pending bits are set and the metadata image is captured. Readers are
//!   operation sequences that must be atomic with respect to that window.
//!
//! # Fairness
//!
//! `multi_operation` asks for writer preference so a steady stream of client
//! readers cannot starve a checkpoint that wants to begin. Both policies map
//! onto the same `parking_lot` primitive on every platform:
//!
//! | Policy | Reader acquisition | Queued writer |
//! |--------|--------------------|---------------|
//! | `WriterPreferring` | `read()` | blocks new readers |
//! | `Default` | `read_recursive()` | readers may barge past it |
//!
//! There is therefore no platform on which the writer-preferring request
//! silently degrades; `LockFairness::Default` is only used when asked for.
//!
//! # Writer-active flag
//!
//! Each lock carries a best-effort "a writer holds this" flag. It is set
//! after the writer acquires and cleared before it releases, and read by
//! clients with a relaxed load *outside* the lock, only to bump a contention
//! counter. It is deliberately racy: a reader may see a stale value and the
//! count is then off by one. Synchronizing it would add the very contention
//! the counter measures. Never use it for correctness decisions.

use crate::lock_order::{self, LockRank};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Reader/writer fairness requested from the lock primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockFairness {
    /// Readers may be admitted while a writer is queued
    #[default]
    Default,
    /// A queued writer blocks new readers (starvation-avoiding for writers)
    WriterPreferring,
}

/// One of the two checkpoint locks
pub struct CheckpointRwLock {
    rank: LockRank,
    fairness: LockFairness,
    lock: RwLock<()>,
    writer_active: AtomicBool,
}

impl CheckpointRwLock {
    /// Create a lock occupying `rank` in the acquisition order
    pub fn new(rank: LockRank, fairness: LockFairness) -> Self {
        debug!(
            target: "tidemark::locks",
            lock = rank.name(),
            ?fairness,
            "Checkpoint lock initialized"
        );
        Self {
            rank,
            fairness,
            lock: RwLock::new(()),
            writer_active: AtomicBool::new(false),
        }
    }

    /// Lock name ("checkpoint_safe" or "multi_operation")
    pub fn name(&self) -> &'static str {
        self.rank.name()
    }

    /// Position in the acquisition order
    pub fn rank(&self) -> LockRank {
        self.rank
    }

    /// Fairness policy applied to reader acquisitions
    pub fn fairness(&self) -> LockFairness {
        self.fairness
    }

    /// Acquire in reader mode, blocking while a writer holds the lock
    ///
    /// Not reentrant under `WriterPreferring`: a thread that already holds a
    /// read guard and asks again can deadlock behind a queued writer.
    pub fn read(&self) -> ReadGuard<'_> {
        lock_order::check_acquire(self.rank);
        let guard = match self.fairness {
            LockFairness::WriterPreferring => self.lock.read(),
            LockFairness::Default => self.lock.read_recursive(),
        };
        lock_order::record_acquired(self.rank);
        ReadGuard {
            rank: self.rank,
            _guard: guard,
        }
    }

    /// Acquire in writer mode, blocking until every reader and writer is gone
    pub fn write(&self) -> WriteGuard<'_> {
        lock_order::check_acquire(self.rank);
        let guard = self.lock.write();
        lock_order::record_acquired(self.rank);
        self.writer_active.store(true, Ordering::Relaxed);
        WriteGuard {
            lock: self,
            _guard: guard,
        }
    }

    /// Best-effort: is a writer currently holding this lock?
    ///
    /// Diagnostic only; see the module docs.
    #[inline]
    pub fn writer_active(&self) -> bool {
        self.writer_active.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for CheckpointRwLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckpointRwLock")
            .field("name", &self.name())
            .field("fairness", &self.fairness)
            .field("writer_active", &self.writer_active())
            .finish()
    }
}

/// Reader-side hold on a checkpoint lock, released on drop
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ReadGuard<'a> {
    rank: LockRank,
    _guard: RwLockReadGuard<'a, ()>,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        lock_order::record_released(self.rank);
    }
}

/// Writer-side hold on a checkpoint lock, released on drop
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct WriteGuard<'a> {
    lock: &'a CheckpointRwLock,
    _guard: RwLockWriteGuard<'a, ()>,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        // Cleared while still exclusive; the guard field unlocks afterwards.
        self.lock.writer_active.store(false, Ordering::Relaxed);
        lock_order::record_released(self.lock.rank);
    }
}

// ============================================================================
// CheckpointLocks
// ============================================================================

/// The pair of checkpoint locks owned by one engine instance
#[derive(Debug)]
pub struct CheckpointLocks {
    checkpoint_safe: CheckpointRwLock,
    multi_operation: CheckpointRwLock,
}

impl CheckpointLocks {
    /// Create both locks
    ///
    /// `checkpoint_safe` always uses default fairness: its writer section is
    /// long and rare. `multi_operation` uses `multi_operation_fairness`.
    pub fn new(multi_operation_fairness: LockFairness) -> Self {
        Self {
            checkpoint_safe: CheckpointRwLock::new(LockRank::CheckpointSafe, LockFairness::Default),
            multi_operation: CheckpointRwLock::new(
                LockRank::MultiOperation,
                multi_operation_fairness,
            ),
        }
    }

    /// The lock held by the orchestrator for an entire checkpoint
    pub fn checkpoint_safe(&self) -> &CheckpointRwLock {
        &self.checkpoint_safe
    }

    /// The lock held by the orchestrator while the snapshot is taken
    pub fn multi_operation(&self) -> &CheckpointRwLock {
        &self.multi_operation
    }
}

impl Default for CheckpointLocks {
    fn default() -> Self {
        Self::new(LockFairness::WriterPreferring)
    }
}
