//! Client lock API
//!
//! Scoped reader-side guards for ordinary engine operations. Both guards
//! release on every exit path (including unwinding) because release is
//! tied to `Drop`.
//!
//! ```text
//! MultiOperationGuard   multi_operation(R)
//! CheckpointSafeGuard   checkpoint_safe(R) -> multi_operation(R)
//! ```
//!
//! Before blocking, each acquisition peeks at the lock's writer-active flag
//! and, if a checkpoint appears to hold it, bumps the matching contention
//! counter in the status registry. The peek never changes how the lock is
//! acquired.

use crate::locks::{CheckpointLocks, CheckpointRwLock, ReadGuard};
use tidemark_core::{StatusKey, StatusRegistry};

/// Guard making an operation sequence atomic with respect to checkpoint-begin
///
/// While held, no checkpoint can mark pending state or capture its metadata
/// image; the guarded sequence is seen by a checkpoint either entirely or
/// not at all.
#[must_use = "the multi-operation lock is released as soon as the guard is dropped"]
pub struct MultiOperationGuard<'a> {
    _read: ReadGuard<'a>,
}

/// Guard excluding checkpoints entirely
///
/// No checkpoint can be in progress while this is held, and none can start
/// until it is dropped. Used for dictionary rename/delete and to pause
/// checkpointing (for example during an external backup).
#[must_use = "checkpoints resume as soon as the guard is dropped"]
pub struct CheckpointSafeGuard<'a> {
    // Field order is drop order: multi_operation is released first.
    _multi: MultiOperationGuard<'a>,
    _safe: ReadGuard<'a>,
}

fn read_counting<'a>(
    lock: &'a CheckpointRwLock,
    status: &StatusRegistry,
    contention: StatusKey,
) -> ReadGuard<'a> {
    if lock.writer_active() {
        status.increment(contention);
    }
    lock.read()
}

impl CheckpointLocks {
    /// Take the atomic-with-checkpoint-begin guard
    pub fn multi_operation_guard(&self, status: &StatusRegistry) -> MultiOperationGuard<'_> {
        MultiOperationGuard {
            _read: read_counting(
                self.multi_operation(),
                status,
                StatusKey::ClientWaitOnMultiOperation,
            ),
        }
    }

    /// Take the checkpoint-excluded guard
    ///
    /// Acquires `checkpoint_safe` then `multi_operation`, the same order the
    /// orchestrator uses for its writer acquisitions.
    pub fn checkpoint_safe_guard(&self, status: &StatusRegistry) -> CheckpointSafeGuard<'_> {
        let safe = read_counting(
            self.checkpoint_safe(),
            status,
            StatusKey::ClientWaitOnCheckpointSafe,
        );
        let multi = self.multi_operation_guard(status);
        CheckpointSafeGuard {
            _multi: multi,
            _safe: safe,
        }
    }
}
