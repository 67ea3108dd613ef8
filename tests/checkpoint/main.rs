//! Checkpoint Integration Tests
//!
//! End-to-end behavior of the checkpoint protocol against the reference
//! collaborators: the operator-visible scenarios and the concurrency
//! properties (mutual exclusion, waiter accounting, snapshot atomicity,
//! marker monotonicity, failure isolation, lock ordering).

#[path = "../common/mod.rs"]
mod common;

mod properties;
mod scenarios;
