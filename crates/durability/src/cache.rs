//! Reference page cache
//!
//! An in-memory [`CheckpointCache`] that models what a real cache does at a
//! checkpoint without touching disk:
//!
//! - `begin_checkpoint` moves every dirty page into the pending set at its
//!   current version and captures the translation table (page -> version)
//!   as the checkpoint's metadata image
//! - writes after begin bump the in-memory version but never change what the
//!   in-progress checkpoint flushes
//! - `end_checkpoint` makes the pending versions durable, invokes the
//!   flushed callback, then writes the end-checkpoint record
//!
//! The most recent completed checkpoints (up to [`HISTORY_LIMIT`]) are kept
//! as [`CheckpointImage`]s so tests can check exactly what a checkpoint
//! captured.

use crate::testing::{FaultInjector, FaultPoint};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tidemark_core::{CheckpointCache, CheckpointLogger, Error, Lsn, Result};
use tracing::{debug, info, warn};

/// Page identifier
pub type PageId = u64;

/// Completed checkpoint images retained by the cache
pub const HISTORY_LIMIT: usize = 64;

/// Structural metadata captured at checkpoint begin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataImage {
    /// Sequence number of the checkpoint, starting at 1
    pub checkpoint_id: u64,
    /// LSN of the begin-checkpoint record, if a logger was supplied
    pub begin_lsn: Option<Lsn>,
    /// Every live page and its version at begin
    pub translation: BTreeMap<PageId, u64>,
}

/// What one completed checkpoint captured and flushed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointImage {
    /// Metadata image taken at begin
    pub metadata: MetadataImage,
    /// Page versions written by this checkpoint
    pub flushed: BTreeMap<PageId, u64>,
}

#[derive(Debug, Clone, Copy)]
struct Page {
    version: u64,
    dirty: bool,
}

#[derive(Debug)]
struct InProgress {
    metadata: MetadataImage,
    pending: BTreeMap<PageId, u64>,
}

#[derive(Debug, Default)]
struct CacheState {
    pages: BTreeMap<PageId, Page>,
    durable: BTreeMap<PageId, u64>,
    in_progress: Option<InProgress>,
    history: Vec<CheckpointImage>,
    next_page_id: PageId,
    next_checkpoint_id: u64,
}

/// In-memory page cache participating in checkpoints
#[derive(Debug)]
pub struct PageCache {
    state: Mutex<CacheState>,
    faults: Arc<FaultInjector>,
}

impl PageCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::with_faults(Arc::new(FaultInjector::new()))
    }

    /// Create an empty cache sharing `faults`
    pub fn with_faults(faults: Arc<FaultInjector>) -> Self {
        Self {
            state: Mutex::new(CacheState {
                next_checkpoint_id: 1,
                ..CacheState::default()
            }),
            faults,
        }
    }

    /// Allocate a new dirty page at version 1
    pub fn allocate_page(&self) -> PageId {
        let mut state = self.state.lock();
        let id = state.next_page_id;
        state.next_page_id += 1;
        state.pages.insert(
            id,
            Page {
                version: 1,
                dirty: true,
            },
        );
        id
    }

    /// Modify a page, returning its new version
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the page does not exist.
    pub fn write_page(&self, id: PageId) -> Result<u64> {
        let mut state = self.state.lock();
        let page = state
            .pages
            .get_mut(&id)
            .ok_or_else(|| Error::invalid_input(format!("page {} does not exist", id)))?;
        page.version += 1;
        page.dirty = true;
        Ok(page.version)
    }

    /// Free a page; returns false if it did not exist
    ///
    /// A page freed after a checkpoint began is still flushed by that
    /// checkpoint.
    pub fn remove_page(&self, id: PageId) -> bool {
        self.state.lock().pages.remove(&id).is_some()
    }

    /// Current in-memory version of a page
    pub fn page_version(&self, id: PageId) -> Option<u64> {
        self.state.lock().pages.get(&id).map(|p| p.version)
    }

    /// Has the page been modified since it was last marked pending?
    pub fn is_dirty(&self, id: PageId) -> bool {
        self.state
            .lock()
            .pages
            .get(&id)
            .map_or(false, |p| p.dirty)
    }

    /// Is the page pending in the in-progress checkpoint?
    pub fn is_pending(&self, id: PageId) -> bool {
        self.state
            .lock()
            .in_progress
            .as_ref()
            .map_or(false, |ip| ip.pending.contains_key(&id))
    }

    /// Number of pages pending in the in-progress checkpoint
    pub fn pending_count(&self) -> usize {
        self.state
            .lock()
            .in_progress
            .as_ref()
            .map_or(0, |ip| ip.pending.len())
    }

    /// Number of dirty pages
    pub fn dirty_count(&self) -> usize {
        self.state.lock().pages.values().filter(|p| p.dirty).count()
    }

    /// Is a checkpoint between begin and end?
    pub fn checkpoint_in_progress(&self) -> bool {
        self.state.lock().in_progress.is_some()
    }

    /// Version of a page as of the last completed checkpoint
    pub fn durable_version(&self, id: PageId) -> Option<u64> {
        self.state.lock().durable.get(&id).copied()
    }

    /// Retained completed checkpoints, oldest first
    pub fn checkpoint_history(&self) -> Vec<CheckpointImage> {
        self.state.lock().history.clone()
    }

    /// The most recent completed checkpoint
    pub fn last_checkpoint(&self) -> Option<CheckpointImage> {
        self.state.lock().history.last().cloned()
    }
}

impl Default for PageCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckpointCache for PageCache {
    fn begin_checkpoint(&self, logger: Option<&dyn CheckpointLogger>) -> Result<()> {
        self.faults.check(FaultPoint::BeginCheckpoint)?;

        let mut state = self.state.lock();
        if state.in_progress.is_some() {
            return Err(Error::snapshot("a checkpoint is already in progress"));
        }

        let begin_lsn = logger.map(|l| l.log_begin_checkpoint()).transpose()?;

        let mut pending = BTreeMap::new();
        for (&id, page) in state.pages.iter_mut() {
            if page.dirty {
                page.dirty = false;
                pending.insert(id, page.version);
            }
        }
        let translation = state
            .pages
            .iter()
            .map(|(&id, page)| (id, page.version))
            .collect();

        let checkpoint_id = state.next_checkpoint_id;
        state.next_checkpoint_id += 1;

        debug!(
            target: "tidemark::cache",
            checkpoint_id,
            pending = pending.len(),
            ?begin_lsn,
            "Marked dirty pages pending"
        );

        state.in_progress = Some(InProgress {
            metadata: MetadataImage {
                checkpoint_id,
                begin_lsn,
                translation,
            },
            pending,
        });
        Ok(())
    }

    fn end_checkpoint(
        &self,
        logger: Option<&dyn CheckpointLogger>,
        on_flushed: &mut dyn FnMut(),
    ) -> Result<()> {
        let in_progress = {
            let mut state = self.state.lock();
            let in_progress = state
                .in_progress
                .take()
                .ok_or_else(|| Error::flush("no checkpoint in progress"))?;

            if let Err(e) = self.faults.check(FaultPoint::EndCheckpoint) {
                // Nothing was written: the pending pages are dirty again.
                for &id in in_progress.pending.keys() {
                    if let Some(page) = state.pages.get_mut(&id) {
                        page.dirty = true;
                    }
                }
                warn!(
                    target: "tidemark::cache",
                    checkpoint_id = in_progress.metadata.checkpoint_id,
                    error = %e,
                    "Flush failed; pending pages re-marked dirty"
                );
                return Err(e);
            }

            for (&id, &version) in &in_progress.pending {
                state.durable.insert(id, version);
            }
            let translation = &in_progress.metadata.translation;
            state.durable.retain(|id, _| translation.contains_key(id));
            in_progress
        };

        on_flushed();

        if let (Some(logger), Some(begin)) = (logger, in_progress.metadata.begin_lsn) {
            logger.log_end_checkpoint(begin)?;
        }

        info!(
            target: "tidemark::cache",
            checkpoint_id = in_progress.metadata.checkpoint_id,
            pages_flushed = in_progress.pending.len(),
            "Checkpoint flushed"
        );

        let mut state = self.state.lock();
        if state.history.len() == HISTORY_LIMIT {
            state.history.remove(0);
        }
        state.history.push(CheckpointImage {
            metadata: in_progress.metadata,
            flushed: in_progress.pending,
        });
        Ok(())
    }
}
