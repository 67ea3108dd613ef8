//! Checkpoint configuration via `tidemark.toml`
//!
//! On first open a commented default `tidemark.toml` is written to the data
//! directory. The checkpoint period can also be changed at runtime through
//! the engine; the file is only read at open.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::time::Duration;
use tidemark_concurrency::LockFairness;
use tidemark_core::{Error, Result};

/// Config file name placed in the data directory.
pub const CONFIG_FILE_NAME: &str = "tidemark.toml";

/// Checkpoint configuration loaded from `tidemark.toml`.
///
/// # Example
///
/// ```toml
/// period_secs = 60
/// prefer_writers = true
/// long_begin_threshold_ms = 1000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Seconds between periodic checkpoints; 0 disables them.
    #[serde(default = "default_period_secs")]
    pub period_secs: u64,
    /// Ask for writer preference on the multi_operation lock.
    #[serde(default = "default_prefer_writers")]
    pub prefer_writers: bool,
    /// Begin phases longer than this are counted and logged as long.
    #[serde(default = "default_long_begin_threshold_ms")]
    pub long_begin_threshold_ms: u64,
}

fn default_period_secs() -> u64 {
    60
}

fn default_prefer_writers() -> bool {
    true
}

fn default_long_begin_threshold_ms() -> u64 {
    1000
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            period_secs: default_period_secs(),
            prefer_writers: default_prefer_writers(),
            long_begin_threshold_ms: default_long_begin_threshold_ms(),
        }
    }
}

fn io_context(action: &str, path: &Path, e: io::Error) -> Error {
    Error::Io(io::Error::new(
        e.kind(),
        format!("Failed to {} config file '{}': {}", action, path.display(), e),
    ))
}

impl CheckpointConfig {
    /// Config with periodic checkpoints disabled; handy for tests.
    pub fn manual() -> Self {
        Self {
            period_secs: 0,
            ..Self::default()
        }
    }

    /// Fairness requested for the multi_operation lock.
    pub fn multi_operation_fairness(&self) -> LockFairness {
        if self.prefer_writers {
            LockFairness::WriterPreferring
        } else {
            LockFairness::Default
        }
    }

    /// Period between checkpoints, `None` when disabled.
    pub fn period(&self) -> Option<Duration> {
        (self.period_secs > 0).then(|| Duration::from_secs(self.period_secs))
    }

    /// Threshold above which a begin phase counts as long.
    pub fn long_begin_threshold(&self) -> Duration {
        Duration::from_millis(self.long_begin_threshold_ms)
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Tidemark checkpoint configuration
#
# Seconds between periodic checkpoints (default: 60). 0 disables the
# background checkpointer; checkpoints then only run when requested.
period_secs = 60

# Writer preference for the multi_operation lock (default: true).
# Keeps a steady stream of client operations from starving checkpoint begin.
prefer_writers = true

# Begin phases (the window in which clients are blocked) longer than this
# many milliseconds are counted and logged (default: 1000).
long_begin_threshold_ms = 1000
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| io_context("read", path, e))?;
        toml::from_str(&content).map_err(|e| {
            Error::invalid_input(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| io_context("write", path, e))?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::invalid_input(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| io_context("write", path, e))
    }

    /// Load `tidemark.toml` from `dir`, writing the default first if missing.
    pub fn load_or_create(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        Self::write_default_if_missing(&path)?;
        Self::from_file(&path)
    }
}
