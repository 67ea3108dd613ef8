//! Tidemark - checkpoint coordination for a transactional storage engine
//!
//! Tidemark decides *when* and *under what locking* a consistent,
//! point-in-time image of an engine's state may be captured, and keeps that
//! capture atomic with respect to ordinary traffic. What actually gets
//! written is up to the cache layer behind [`CheckpointCache`].
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use tidemark::{CallerCategory, DictionaryRegistry, Engine, PageCache, SegmentedLog};
//!
//! let cache = Arc::new(PageCache::new());
//! let engine = Engine::builder(cache.clone(), Arc::new(DictionaryRegistry::new()))
//!     .logger(Arc::new(SegmentedLog::new()))
//!     .open()?;
//!
//! {
//!     // Both writes land in the same checkpoint, or neither does.
//!     let _atomic = engine.multi_operation_guard();
//!     cache.write_page(a)?;
//!     cache.write_page(b)?;
//! }
//!
//! engine.checkpoint(CallerCategory::Client)?;
//! println!("{}", engine.get_status());
//! ```
//!
//! # Architecture
//!
//! - `tidemark-core`: LSNs, caller categories, errors, collaborator traits,
//!   status registry
//! - `tidemark-concurrency`: the two checkpoint locks and client guards
//! - `tidemark-durability`: reference page cache, log and dictionary registry
//! - `tidemark-engine`: orchestrator, engine context, periodic checkpointer

pub use tidemark_concurrency::{
    CheckpointLocks, CheckpointSafeGuard, LockFairness, LockRank, MultiOperationGuard,
};
pub use tidemark_core::{
    CallerCategory, CheckpointCache, CheckpointLogger, CheckpointStatus, DictionaryLifecycle,
    Error, Lsn, Result, StatusKey, StatusKind, StatusRegistry,
};
pub use tidemark_durability::{
    CheckpointImage, DictionaryError, DictionaryRegistry, FaultInjector, FaultPoint,
    MetadataImage, PageCache, PageId, SegmentedLog,
};
pub use tidemark_engine::{
    CheckpointConfig, CheckpointError, CheckpointOrchestrator, CheckpointReport,
    CheckpointResult, Engine, EngineBuilder,
};
