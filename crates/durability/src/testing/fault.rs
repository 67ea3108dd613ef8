use std::sync::atomic::{AtomicU32, Ordering};
use tidemark_core::Error;

/// Named failure points in the reference collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// `PageCache::begin_checkpoint`, before anything is marked pending
    BeginCheckpoint,
    /// `PageCache::end_checkpoint`, before anything is flushed
    EndCheckpoint,
    /// `SegmentedLog::trim`, before any segment is removed
    LogTrim,
}

impl FaultPoint {
    const COUNT: usize = 3;

    fn index(self) -> usize {
        self as usize
    }

    /// The error a tripped fault produces
    pub fn error(self) -> Error {
        match self {
            FaultPoint::BeginCheckpoint => {
                Error::snapshot("injected fault at begin_checkpoint")
            }
            FaultPoint::EndCheckpoint => Error::flush("injected fault at end_checkpoint"),
            FaultPoint::LogTrim => Error::log("injected fault at log trim"),
        }
    }
}

const ALWAYS: u32 = u32::MAX;

/// Arms failure points shared between a test and the collaborators under test
///
/// Each point holds a count of remaining failures; `u32::MAX` means "fail
/// until cleared".
#[derive(Debug, Default)]
pub struct FaultInjector {
    armed: [AtomicU32; FaultPoint::COUNT],
}

impl FaultInjector {
    /// Create an injector with nothing armed
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` hits of `point`
    pub fn fail_times(&self, point: FaultPoint, count: u32) {
        self.armed[point.index()].store(count, Ordering::SeqCst);
    }

    /// Fail the next hit of `point`
    pub fn fail_next(&self, point: FaultPoint) {
        self.fail_times(point, 1);
    }

    /// Fail every hit of `point` until [`clear`](Self::clear)
    pub fn fail_always(&self, point: FaultPoint) {
        self.fail_times(point, ALWAYS);
    }

    /// Disarm `point`
    pub fn clear(&self, point: FaultPoint) {
        self.fail_times(point, 0);
    }

    /// Called by collaborators at `point`; consumes one armed failure
    pub fn check(&self, point: FaultPoint) -> Result<(), Error> {
        let tripped = self.armed[point.index()]
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                ALWAYS => Some(ALWAYS),
                n => Some(n - 1),
            })
            .is_ok();
        if tripped {
            Err(point.error())
        } else {
            Ok(())
        }
    }
}
