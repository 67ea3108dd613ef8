//! Testing utilities for the checkpoint collaborators
//!
//! - **Fault injection**: arm named failure points in the reference page
//!   cache and log so checkpoint failure paths can be exercised
//!
//! # Example
//!
//! ```ignore
//! use tidemark_durability::testing::{FaultInjector, FaultPoint};
//!
//! let faults = Arc::new(FaultInjector::new());
//! let cache = PageCache::with_faults(Arc::clone(&faults));
//! faults.fail_next(FaultPoint::BeginCheckpoint);
//! ```

mod fault;

pub use fault::{FaultInjector, FaultPoint};
