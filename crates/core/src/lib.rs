//! Core types and traits for tidemark
//!
//! This crate defines the leaf components of the checkpoint subsystem:
//! - Lsn: durability marker produced by the write-ahead log
//! - CallerCategory: diagnostic bucket for whoever requested a checkpoint
//! - Error: error type hierarchy
//! - Traits: collaborator contracts (CheckpointCache, CheckpointLogger, DictionaryLifecycle)
//! - Status: the checkpoint status registry and its descriptor table

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod status;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use status::{
    descriptors, CheckpointStatus, StatusDescriptor, StatusKey, StatusKind, StatusRegistry,
};
pub use traits::{CheckpointCache, CheckpointLogger, DictionaryLifecycle};
pub use types::{format_micros, now_micros, CallerCategory, Lsn};
