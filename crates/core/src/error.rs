//! Error types for tidemark
//!
//! Collaborator failures (cache snapshot, flush, log I/O) and configuration
//! problems are all reported through [`Error`]. We use `thiserror` for
//! automatic `Display` and `Error` trait implementations.
//!
//! The checkpoint orchestrator wraps these in its own phase-classified error
//! so callers can tell a failed snapshot from a failed log trim.

use std::io;
use thiserror::Error;

/// Result type alias for tidemark operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the checkpoint subsystem and its collaborators
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file operations, config files, log segments)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The cache layer could not mark pending state or capture metadata
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Pending state could not be written to durable storage
    #[error("Flush error: {0}")]
    Flush(String),

    /// Write-ahead log failure (record append, trim)
    #[error("Log error: {0}")]
    Log(String),

    /// Invalid argument or configuration value
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Create a snapshot error
    pub fn snapshot(msg: impl Into<String>) -> Self {
        Error::Snapshot(msg.into())
    }

    /// Create a flush error
    pub fn flush(msg: impl Into<String>) -> Self {
        Error::Flush(msg.into())
    }

    /// Create a log error
    pub fn log(msg: impl Into<String>) -> Self {
        Error::Log(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_io() {
        let err = Error::Io(io::Error::new(io::ErrorKind::NotFound, "file not found"));
        let msg = err.to_string();
        assert!(msg.contains("I/O error"));
    }

    #[test]
    fn test_error_display_snapshot() {
        let err = Error::snapshot("dirty list unavailable");
        let msg = err.to_string();
        assert!(msg.contains("Snapshot error"));
        assert!(msg.contains("dirty list unavailable"));
    }

    #[test]
    fn test_error_display_flush() {
        let err = Error::flush("device full");
        assert_eq!(err.to_string(), "Flush error: device full");
    }

    #[test]
    fn test_error_display_log() {
        let err = Error::log("segment 4 unreadable");
        let msg = err.to_string();
        assert!(msg.contains("Log error"));
        assert!(msg.contains("segment 4"));
    }

    #[test]
    fn test_error_display_invalid_input() {
        let err = Error::invalid_input("period must be non-negative");
        assert!(err.to_string().starts_with("Invalid input"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }

        fn returns_error() -> Result<i32> {
            Err(Error::log("test"))
        }

        assert_eq!(returns_result().unwrap(), 42);
        assert!(returns_error().is_err());
    }
}
