//! Engine context
//!
//! Owns everything the checkpoint protocol shares for one storage-engine
//! instance: the two checkpoint locks, the status registry, the
//! collaborators and the periodic checkpointer. Nothing here is global;
//! two engines in one process are fully independent.
//!
//! # Lifecycle
//!
//! ```text
//! Engine::builder(cache, dictionaries).logger(log).open()
//!     -> locks + status created, checkpointer started
//! engine.checkpoint(..) / engine.multi_operation_guard() / engine.get_status()
//! engine.shutdown()
//!     -> checkpointer stopped, final Shutdown checkpoint, further
//!        checkpoints refused with CheckpointError::ShutDown
//! ```

use crate::checkpoint::{CheckpointOrchestrator, CheckpointReport};
use crate::checkpointer::Checkpointer;
use crate::config::CheckpointConfig;
use crate::error::{CheckpointError, CheckpointResult};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tidemark_concurrency::{CheckpointLocks, CheckpointSafeGuard, MultiOperationGuard};
use tidemark_core::{
    CallerCategory, CheckpointCache, CheckpointLogger, CheckpointStatus, DictionaryLifecycle,
    Result, StatusRegistry,
};
use tracing::{info, warn};

/// Builder for [`Engine`]
pub struct EngineBuilder {
    cache: Arc<dyn CheckpointCache>,
    dictionaries: Arc<dyn DictionaryLifecycle>,
    logger: Option<Arc<dyn CheckpointLogger>>,
    config: CheckpointConfig,
    checkpoint_on_open: bool,
}

impl EngineBuilder {
    /// Attach a write-ahead log; without one, log trimming is skipped
    pub fn logger(mut self, logger: Arc<dyn CheckpointLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Use `config` instead of the defaults
    pub fn config(mut self, config: CheckpointConfig) -> Self {
        self.config = config;
        self
    }

    /// Load `tidemark.toml` from `dir`, creating the default file if missing
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written, read or parsed.
    pub fn config_dir(mut self, dir: &Path) -> Result<Self> {
        self.config = CheckpointConfig::load_or_create(dir)?;
        Ok(self)
    }

    /// Run a `Startup` checkpoint before returning from `open`
    pub fn checkpoint_on_open(mut self, enabled: bool) -> Self {
        self.checkpoint_on_open = enabled;
        self
    }

    /// Create the engine and start the periodic checkpointer
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpointer thread cannot be spawned. A
    /// failed startup checkpoint is logged, not returned.
    pub fn open(self) -> Result<Arc<Engine>> {
        let period = self.config.period().unwrap_or(Duration::ZERO);
        let engine = Arc::new(Engine {
            locks: CheckpointLocks::new(self.config.multi_operation_fairness()),
            status: StatusRegistry::new(),
            cache: self.cache,
            logger: self.logger,
            dictionaries: self.dictionaries,
            long_begin_threshold: self.config.long_begin_threshold(),
            checkpointer: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        });

        info!(
            target: "tidemark::checkpoint",
            period_secs = self.config.period_secs,
            prefer_writers = self.config.prefer_writers,
            logger = engine.logger.is_some(),
            "Engine opened"
        );

        if self.checkpoint_on_open {
            if let Err(e) = engine.checkpoint(CallerCategory::Startup) {
                warn!(target: "tidemark::checkpoint", error = %e, "Startup checkpoint failed");
            }
        }

        let weak = Arc::downgrade(&engine);
        let checkpointer = Checkpointer::spawn(period, move || periodic_tick(&weak))?;
        *engine.checkpointer.lock() = Some(checkpointer);
        Ok(engine)
    }
}

fn periodic_tick(engine: &Weak<Engine>) -> bool {
    let Some(engine) = engine.upgrade() else {
        return false;
    };
    match engine.checkpoint(CallerCategory::Periodic) {
        Ok(_) => true,
        Err(CheckpointError::ShutDown) => false,
        // Logged by the orchestrator; the next tick retries.
        Err(_) => true,
    }
}

/// One storage-engine instance as seen by the checkpoint subsystem
pub struct Engine {
    locks: CheckpointLocks,
    status: StatusRegistry,
    cache: Arc<dyn CheckpointCache>,
    logger: Option<Arc<dyn CheckpointLogger>>,
    dictionaries: Arc<dyn DictionaryLifecycle>,
    long_begin_threshold: Duration,
    checkpointer: Mutex<Option<Checkpointer>>,
    shut_down: AtomicBool,
}

impl Engine {
    /// Start building an engine around a cache and a dictionary registry
    pub fn builder(
        cache: Arc<dyn CheckpointCache>,
        dictionaries: Arc<dyn DictionaryLifecycle>,
    ) -> EngineBuilder {
        EngineBuilder {
            cache,
            dictionaries,
            logger: None,
            config: CheckpointConfig::default(),
            checkpoint_on_open: false,
        }
    }

    /// Run a checkpoint
    ///
    /// Blocks while another checkpoint or a checkpoint-excluded operation is
    /// running.
    ///
    /// # Errors
    ///
    /// See [`CheckpointError`]; `ShutDown` once [`shutdown`](Self::shutdown)
    /// has been called.
    pub fn checkpoint(&self, category: CallerCategory) -> CheckpointResult<CheckpointReport> {
        self.checkpoint_with(category, || {}, || {})
    }

    /// Run a checkpoint with callbacks at the two fixed protocol points
    ///
    /// `before_flush` runs once the snapshot is fixed, `after_flush` once
    /// the flush is durable.
    pub fn checkpoint_with<B, A>(
        &self,
        category: CallerCategory,
        before_flush: B,
        after_flush: A,
    ) -> CheckpointResult<CheckpointReport>
    where
        B: FnOnce(),
        A: FnOnce(),
    {
        if self.is_shut_down() {
            return Err(CheckpointError::ShutDown);
        }
        self.run_checkpoint(category, before_flush, after_flush)
    }

    fn run_checkpoint<B, A>(
        &self,
        category: CallerCategory,
        before_flush: B,
        after_flush: A,
    ) -> CheckpointResult<CheckpointReport>
    where
        B: FnOnce(),
        A: FnOnce(),
    {
        CheckpointOrchestrator::new(
            &self.locks,
            &self.status,
            self.cache.as_ref(),
            self.dictionaries.as_ref(),
        )
        .with_logger(self.logger.as_deref())
        .with_long_begin_threshold(self.long_begin_threshold)
        .run(category, before_flush, after_flush)
    }

    /// Make an operation sequence atomic with respect to checkpoint-begin
    pub fn multi_operation_guard(&self) -> MultiOperationGuard<'_> {
        self.locks.multi_operation_guard(&self.status)
    }

    /// Exclude checkpoints while the guard is held
    pub fn checkpoint_safe_guard(&self) -> CheckpointSafeGuard<'_> {
        self.locks.checkpoint_safe_guard(&self.status)
    }

    /// Snapshot of the checkpoint status, with the live period
    pub fn get_status(&self) -> CheckpointStatus {
        let mut status = self.status.snapshot();
        status.period_secs = self.checkpoint_period().as_secs();
        status
    }

    /// Current periodic checkpoint period (zero = disabled)
    pub fn checkpoint_period(&self) -> Duration {
        self.checkpointer
            .lock()
            .as_ref()
            .map_or(Duration::ZERO, Checkpointer::period)
    }

    /// Change the periodic checkpoint period; zero disables it
    pub fn set_checkpoint_period(&self, period: Duration) {
        if let Some(checkpointer) = self.checkpointer.lock().as_ref() {
            checkpointer.set_period(period);
        }
    }

    /// Stop the checkpointer, run a final `Shutdown` checkpoint and refuse
    /// further checkpoints
    ///
    /// # Errors
    ///
    /// Returns the final checkpoint's error, or `ShutDown` if already shut
    /// down.
    pub fn shutdown(&self) -> CheckpointResult<CheckpointReport> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Err(CheckpointError::ShutDown);
        }
        let checkpointer = self.checkpointer.lock().take();
        if let Some(checkpointer) = checkpointer {
            checkpointer.stop();
        }
        let result = self.run_checkpoint(CallerCategory::Shutdown, || {}, || {});
        info!(target: "tidemark::checkpoint", ok = result.is_ok(), "Engine shut down");
        result
    }

    /// Has [`shutdown`](Self::shutdown) been called?
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// The engine's checkpoint locks
    pub fn locks(&self) -> &CheckpointLocks {
        &self.locks
    }

    /// The engine's live status registry
    pub fn status(&self) -> &StatusRegistry {
        &self.status
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Checkpointer::stop does not join when run on its own thread, which
        // is where the last Arc can be released.
        if let Some(checkpointer) = self.checkpointer.get_mut().take() {
            checkpointer.stop();
        }
    }
}
