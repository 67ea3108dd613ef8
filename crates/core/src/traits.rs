//! Collaborator traits consumed by the checkpoint orchestrator
//!
//! The orchestrator decides *when* and *under what locking* a consistent
//! image may be captured; these traits are how it reaches the components
//! that decide *what* gets durable:
//!
//! - [`CheckpointCache`]: marks dirty state pending and flushes it
//! - [`CheckpointLogger`]: the write-ahead log (durability marker, trim)
//! - [`DictionaryLifecycle`]: excludes dictionary open/close mid-snapshot
//!
//! Thread safety: every method may be called from any thread, so all
//! implementations must be `Send + Sync`.

use crate::error::Result;
use crate::types::Lsn;

/// Cache layer participating in checkpoints
pub trait CheckpointCache: Send + Sync {
    /// Freeze the checkpoint's contents
    ///
    /// Must, synchronously and before returning, mark all currently dirty
    /// in-memory state as pending and capture an in-memory image of the
    /// structural metadata (header + translation table). Called with the
    /// multi-operation lock and the dictionary open/close exclusion held,
    /// which is what makes the image atomic.
    ///
    /// When a logger is supplied the cache writes its begin-checkpoint
    /// record through it.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot could not be taken. Nothing is
    /// flushed for a checkpoint whose begin failed.
    fn begin_checkpoint(&self, logger: Option<&dyn CheckpointLogger>) -> Result<()>;

    /// Flush everything marked pending by the matching `begin_checkpoint`
    ///
    /// `on_flushed` is invoked once the pending state is durable. When a
    /// logger is supplied the cache writes its end-checkpoint record after
    /// `on_flushed` returns.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing or the end-checkpoint record fails; the
    /// checkpoint is then not complete.
    fn end_checkpoint(
        &self,
        logger: Option<&dyn CheckpointLogger>,
        on_flushed: &mut dyn FnMut(),
    ) -> Result<()>;
}

/// Write-ahead log as seen by the checkpoint protocol
pub trait CheckpointLogger: Send + Sync {
    /// Append a begin-checkpoint record and return its LSN
    fn log_begin_checkpoint(&self) -> Result<Lsn>;

    /// Append an end-checkpoint record for the checkpoint that began at `begin`
    ///
    /// This is what advances [`last_completed_checkpoint_lsn`](Self::last_completed_checkpoint_lsn).
    fn log_end_checkpoint(&self, begin: Lsn) -> Result<()>;

    /// Durability marker of the last completed checkpoint
    ///
    /// Log history before this LSN is no longer needed for recovery.
    fn last_completed_checkpoint_lsn(&self) -> Lsn;

    /// Reclaim log space no longer needed given `lsn`
    ///
    /// Returns the number of log segments removed.
    ///
    /// # Errors
    ///
    /// Trimming may fail (I/O). A failed trim never affects checkpoint
    /// correctness; at worst log space accumulates until the next attempt.
    fn trim(&self, lsn: Lsn) -> Result<usize>;
}

/// Dictionary open/close bookkeeping
///
/// While the exclusion is held no dictionary may be opened or closed.
pub trait DictionaryLifecycle: Send + Sync {
    /// Acquire the open/close exclusion, blocking until available
    fn open_close_lock(&self);

    /// Release the open/close exclusion taken by `open_close_lock`
    fn open_close_unlock(&self);
}
