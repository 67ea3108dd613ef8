//! Per-thread lock-order tracking
//!
//! Both the orchestrator and every client must acquire `checkpoint_safe`
//! before `multi_operation` whenever they need both. Taking them in the
//! other order can deadlock against a checkpoint that holds
//! `checkpoint_safe` (writer) and is queued for `multi_operation`.
//!
//! In debug builds each thread records which checkpoint locks it holds and
//! an out-of-order request panics at the call site. Release builds compile
//! the bookkeeping away.

use std::cell::Cell;

/// Position of a lock in the global acquisition order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockRank {
    /// Acquired first
    CheckpointSafe = 0,
    /// Acquired second
    MultiOperation = 1,
}

impl LockRank {
    /// Lock name used in diagnostics
    pub const fn name(self) -> &'static str {
        match self {
            LockRank::CheckpointSafe => "checkpoint_safe",
            LockRank::MultiOperation => "multi_operation",
        }
    }
}

thread_local! {
    static HELD: Cell<[u32; 2]> = const { Cell::new([0, 0]) };
}

/// Check that `rank` may be acquired given what this thread already holds
///
/// Lock acquisitions call this themselves; callers that keep bookkeeping
/// around an acquisition call it first so a violation leaves nothing
/// half-recorded.
///
/// # Panics
///
/// In debug builds, panics if a lower-ranked lock is requested while a
/// higher-ranked one is held.
#[inline]
pub fn check_acquire(rank: LockRank) {
    if cfg!(debug_assertions) {
        let counts = HELD.with(Cell::get);
        let holding = LockRank::MultiOperation;
        if rank < holding && counts[holding as usize] > 0 {
            panic!(
                "lock order violation: {} requested while holding {}",
                rank.name(),
                holding.name()
            );
        }
    }
}

#[inline]
pub(crate) fn record_acquired(rank: LockRank) {
    if cfg!(debug_assertions) {
        HELD.with(|held| {
            let mut counts = held.get();
            counts[rank as usize] += 1;
            held.set(counts);
        });
    }
}

#[inline]
pub(crate) fn record_released(rank: LockRank) {
    if cfg!(debug_assertions) {
        HELD.with(|held| {
            let mut counts = held.get();
            counts[rank as usize] = counts[rank as usize].saturating_sub(1);
            held.set(counts);
        });
    }
}

/// Whether the current thread holds `rank` (always false in release builds)
pub fn holds(rank: LockRank) -> bool {
    HELD.with(|held| held.get()[rank as usize] > 0)
}
