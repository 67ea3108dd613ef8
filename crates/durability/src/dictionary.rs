//! Dictionary registry
//!
//! Tracks open dictionaries and provides the open/close exclusion the
//! checkpoint orchestrator holds while a snapshot is taken. Opening or
//! closing blocks for the duration of that window; lookups never do.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tidemark_core::DictionaryLifecycle;
use tracing::debug;

/// Identifier assigned to a dictionary when it is opened
pub type DictionaryId = u64;

/// Dictionary registry errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DictionaryError {
    /// A dictionary with this name is already open
    #[error("dictionary already open: {0}")]
    AlreadyOpen(String),

    /// No open dictionary has this name
    #[error("dictionary not open: {0}")]
    NotOpen(String),
}

/// Registry of open dictionaries
#[derive(Debug)]
pub struct DictionaryRegistry {
    excluded: Mutex<bool>,
    released: Condvar,
    open: DashMap<String, DictionaryId>,
    next_id: AtomicU64,
}

impl DictionaryRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            excluded: Mutex::new(false),
            released: Condvar::new(),
            open: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Run `f` with the open/close exclusion held
    fn exclusive<T>(&self, f: impl FnOnce() -> T) -> T {
        self.open_close_lock();
        let result = f();
        self.open_close_unlock();
        result
    }

    /// Open a dictionary
    ///
    /// Blocks while a checkpoint holds the open/close exclusion.
    pub fn open(&self, name: &str) -> Result<DictionaryId, DictionaryError> {
        self.exclusive(|| match self.open.entry(name.to_string()) {
            Entry::Occupied(_) => Err(DictionaryError::AlreadyOpen(name.to_string())),
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                slot.insert(id);
                debug!(target: "tidemark::dictionary", name, id, "Opened dictionary");
                Ok(id)
            }
        })
    }

    /// Close a dictionary
    ///
    /// Blocks while a checkpoint holds the open/close exclusion.
    pub fn close(&self, name: &str) -> Result<DictionaryId, DictionaryError> {
        self.exclusive(|| {
            let (_, id) = self
                .open
                .remove(name)
                .ok_or_else(|| DictionaryError::NotOpen(name.to_string()))?;
            debug!(target: "tidemark::dictionary", name, id, "Closed dictionary");
            Ok(id)
        })
    }

    /// Rename an open dictionary, keeping its id
    ///
    /// Callers hold the checkpoint-excluded guard so no checkpoint observes
    /// a half-renamed dictionary.
    pub fn rename(&self, from: &str, to: &str) -> Result<DictionaryId, DictionaryError> {
        self.exclusive(|| {
            if self.open.contains_key(to) {
                return Err(DictionaryError::AlreadyOpen(to.to_string()));
            }
            let (_, id) = self
                .open
                .remove(from)
                .ok_or_else(|| DictionaryError::NotOpen(from.to_string()))?;
            self.open.insert(to.to_string(), id);
            debug!(target: "tidemark::dictionary", from, to, id, "Renamed dictionary");
            Ok(id)
        })
    }

    /// Id of an open dictionary
    pub fn id(&self, name: &str) -> Option<DictionaryId> {
        self.open.get(name).map(|entry| *entry.value())
    }

    /// Is a dictionary with this name open?
    pub fn is_open(&self, name: &str) -> bool {
        self.open.contains_key(name)
    }

    /// Number of open dictionaries
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Is the open/close exclusion currently held?
    pub fn is_excluded(&self) -> bool {
        *self.excluded.lock()
    }
}

impl Default for DictionaryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DictionaryLifecycle for DictionaryRegistry {
    fn open_close_lock(&self) {
        let mut excluded = self.excluded.lock();
        while *excluded {
            self.released.wait(&mut excluded);
        }
        *excluded = true;
    }

    fn open_close_unlock(&self) {
        let mut excluded = self.excluded.lock();
        *excluded = false;
        self.released.notify_one();
    }
}
