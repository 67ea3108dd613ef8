//! Core value types shared by every layer
//!
//! - [`Lsn`]: the durability marker produced by the write-ahead log
//! - [`CallerCategory`]: who asked for a checkpoint (diagnostics only)
//! - Timestamp helpers (microseconds since the Unix epoch)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

// ============================================================================
// Lsn
// ============================================================================

/// Log sequence number
///
/// Opaque, totally ordered and monotonically increasing. The log assigns
/// LSNs starting at 1; [`Lsn::ZERO`] means "nothing logged yet".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Lsn(u64);

impl Lsn {
    /// The LSN before any record has been written
    pub const ZERO: Lsn = Lsn(0);

    /// Wrap a raw LSN value
    pub const fn new(raw: u64) -> Self {
        Lsn(raw)
    }

    /// Raw value
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The LSN immediately after this one
    pub const fn next(self) -> Self {
        Lsn(self.0 + 1)
    }

    /// True if no record has been assigned this LSN
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Lsn {
    fn from(raw: u64) -> Self {
        Lsn(raw)
    }
}

// ============================================================================
// CallerCategory
// ============================================================================

/// Category of the caller that requested a checkpoint
///
/// Used solely to bucket the footprint diagnostic: the footprint value is
/// offset by `category * 1000` so an operator can tell which kind of caller
/// is stuck at which stage. It never changes protocol behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerCategory {
    /// The periodic background checkpointer
    Periodic = 0,
    /// An explicit request from an application or administrator
    Client = 1,
    /// Engine startup, after opening the environment
    Startup = 2,
    /// End of crash recovery
    Recovery = 3,
    /// Engine shutdown
    Shutdown = 4,
}

impl CallerCategory {
    /// All categories, in discriminant order
    pub const ALL: [CallerCategory; 5] = [
        CallerCategory::Periodic,
        CallerCategory::Client,
        CallerCategory::Startup,
        CallerCategory::Recovery,
        CallerCategory::Shutdown,
    ];

    /// Footprint offset for this category
    pub const fn footprint_base(self) -> u64 {
        self as u64 * 1000
    }

    /// Stable name for logs
    pub const fn name(self) -> &'static str {
        match self {
            CallerCategory::Periodic => "periodic",
            CallerCategory::Client => "client",
            CallerCategory::Startup => "startup",
            CallerCategory::Recovery => "recovery",
            CallerCategory::Shutdown => "shutdown",
        }
    }

    /// Decode a footprint value back into (category, stage)
    ///
    /// Returns `None` for the idle footprint (0) and for values that do not
    /// correspond to a known category.
    pub fn decode_footprint(footprint: u64) -> Option<(CallerCategory, u64)> {
        if footprint == 0 {
            return None;
        }
        let category = Self::ALL
            .into_iter()
            .find(|c| c.footprint_base() == footprint / 1000 * 1000)?;
        Some((category, footprint % 1000))
    }
}

impl fmt::Display for CallerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Timestamps
// ============================================================================

/// Current time in microseconds since the Unix epoch
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Render a microsecond timestamp for operators; 0 renders as "never"
pub fn format_micros(micros: u64) -> String {
    if micros == 0 {
        return "never".to_string();
    }
    match DateTime::<Utc>::from_timestamp_micros(micros as i64) {
        Some(ts) => ts.format("%Y-%m-%d %H:%M:%S%.6f UTC").to_string(),
        None => micros.to_string(),
    }
}
