//! Checkpoint engine for tidemark
//!
//! Ties the lock subsystem, the status registry and the collaborators
//! together:
//! - CheckpointOrchestrator: runs one checkpoint (the core protocol)
//! - Engine: per-instance context owning locks, status and collaborators
//! - Checkpointer: periodic background checkpoints
//! - CheckpointConfig: `tidemark.toml`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod checkpointer;
pub mod config;
pub mod engine;
pub mod error;

pub use checkpoint::{CheckpointOrchestrator, CheckpointReport};
pub use checkpointer::Checkpointer;
pub use config::{CheckpointConfig, CONFIG_FILE_NAME};
pub use engine::{Engine, EngineBuilder};
pub use error::{CheckpointError, CheckpointResult};
