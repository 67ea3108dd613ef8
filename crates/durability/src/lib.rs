//! Checkpoint collaborators for tidemark
//!
//! Reference implementations of the components the checkpoint orchestrator
//! drives. Engines with their own cache or log implement the traits in
//! `tidemark-core` instead; these exist for embedding without one and for
//! tests:
//!
//! - PageCache: marks dirty pages pending, captures the translation table,
//!   flushes pending versions
//! - SegmentedLog: write-ahead log with begin/end-checkpoint records and
//!   segment-granular trimming
//! - DictionaryRegistry: open dictionaries plus the open/close exclusion
//! - Fault injection for exercising failure paths

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache; // Reference page cache (CheckpointCache)
pub mod dictionary; // Dictionary registry (DictionaryLifecycle)
pub mod log; // Segmented write-ahead log (CheckpointLogger)
pub mod testing; // Fault injection

pub use cache::{CheckpointImage, MetadataImage, PageCache, PageId, HISTORY_LIMIT};
pub use dictionary::{DictionaryError, DictionaryId, DictionaryRegistry};
pub use log::{LogRecord, LogRecordKind, SegmentedLog, DEFAULT_SEGMENT_RECORDS};
pub use testing::{FaultInjector, FaultPoint};
