//! Lock subsystem and client lock API for tidemark
//!
//! This crate implements the two checkpoint locks and the scoped guards
//! ordinary engine operations use to cooperate with checkpoints:
//! - CheckpointLocks: `checkpoint_safe` + `multi_operation` reader-writer locks
//! - MultiOperationGuard: atomic with respect to checkpoint-begin
//! - CheckpointSafeGuard: excluded from any checkpoint
//! - Lock-order tracking (debug builds)
//!
//! Ordering invariant: `checkpoint_safe` is always acquired before
//! `multi_operation` when both are needed, by clients and orchestrator alike.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod lock_order;
pub mod locks;

pub use client::{CheckpointSafeGuard, MultiOperationGuard};
pub use lock_order::LockRank;
pub use locks::{CheckpointLocks, CheckpointRwLock, LockFairness, ReadGuard, WriteGuard};
