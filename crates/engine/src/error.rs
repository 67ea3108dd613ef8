//! Checkpoint run errors
//!
//! A failed run is classified by the protocol phase that failed. The
//! distinction matters to callers: a snapshot or flush failure means the
//! checkpoint did not complete, while a log-trim failure leaves a complete,
//! durable checkpoint behind and only log space is lost until the next run.

use thiserror::Error;
use tidemark_core::{Error, Lsn};

/// Result type for checkpoint runs
pub type CheckpointResult<T> = std::result::Result<T, CheckpointError>;

/// Why a checkpoint run failed
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// The cache could not mark pending state or capture the metadata image
    #[error("checkpoint snapshot failed: {0}")]
    Snapshot(#[source] Error),

    /// Pending state could not be flushed; the checkpoint is not complete
    #[error("checkpoint flush failed: {0}")]
    Flush(#[source] Error),

    /// Log trimming failed after a complete checkpoint
    #[error("log trim to {lsn} failed: {source}")]
    LogTrim {
        /// Durability marker the trim was attempted with
        lsn: Lsn,
        /// Underlying log error
        #[source]
        source: Error,
    },

    /// The engine has shut down; no further checkpoints run
    #[error("engine is shut down")]
    ShutDown,
}

impl CheckpointError {
    /// Short name of the failed phase
    pub fn phase(&self) -> &'static str {
        match self {
            CheckpointError::Snapshot(_) => "snapshot",
            CheckpointError::Flush(_) => "flush",
            CheckpointError::LogTrim { .. } => "log_trim",
            CheckpointError::ShutDown => "shutdown",
        }
    }

    /// Did the run still produce a complete, durable checkpoint?
    pub fn data_durable(&self) -> bool {
        matches!(self, CheckpointError::LogTrim { .. })
    }
}
