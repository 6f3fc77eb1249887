//! Durable task run state.
//!
//! Maps task name to the timestamp of its last successful run and persists
//! the whole map as a flat JSON object:
//!
//! ```json
//! { "decision_cycle": "2026-03-10T14:05:00Z", "nightly_retrain": "2026-03-09T21:10:00Z" }
//! ```
//!
//! Writes go through [`write_json_atomic`], so a crash leaves either the
//! previous or the new document on disk. Loading is tolerant: a missing or
//! corrupt file yields empty state rather than a boot failure.

use crate::error::Result;
use crate::persist::{read_json, staging_path, write_json_atomic};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Last-run bookkeeping for scheduled tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskStateStore {
    path: Option<PathBuf>,
    records: BTreeMap<String, DateTime<Utc>>,
    /// In-memory records differ from disk after a failed write.
    dirty: bool,
}

impl TaskStateStore {
    /// Open the store at `path` and load whatever is there.
    ///
    /// `None` keeps state in memory only.
    pub fn open(path: Option<PathBuf>) -> Self {
        let mut store = Self {
            path,
            records: BTreeMap::new(),
            dirty: false,
        };
        store.load();
        store
    }

    /// Store that never touches disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Replace in-memory records with the persisted ones.
    pub fn load(&mut self) {
        self.records = match &self.path {
            Some(path) => load_records(path),
            None => BTreeMap::new(),
        };
        self.dirty = false;
    }

    /// Timestamp of the last successful run of `name`.
    pub fn last_run(&self, name: &str) -> Option<DateTime<Utc>> {
        self.records.get(name).copied()
    }

    pub fn records(&self) -> &BTreeMap<String, DateTime<Utc>> {
        &self.records
    }

    /// Whether a previous write failed and memory is ahead of disk.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Record a successful run and persist the full state.
    ///
    /// The in-memory record is updated even if the write fails so the task
    /// is not re-run by this process; the store stays dirty until a later
    /// [`flush`](Self::flush) succeeds.
    ///
    /// # Errors
    /// Returns `PodError::State` if the atomic write fails.
    pub fn update(&mut self, name: &str, at: DateTime<Utc>) -> Result<()> {
        self.records.insert(name.to_owned(), at);
        self.dirty = true;
        self.flush()
    }

    /// Write in-memory records to disk if they are ahead of it.
    ///
    /// # Errors
    /// Returns `PodError::State` if the atomic write fails.
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(path) = &self.path {
            write_json_atomic(path, &self.records)?;
            debug!(path = %path.display(), tasks = self.records.len(), "task state persisted");
        }
        self.dirty = false;
        Ok(())
    }
}

/// Read task records from `path`, treating every failure as empty state.
pub fn load_records(path: &Path) -> BTreeMap<String, DateTime<Utc>> {
    let staged = staging_path(path);
    if staged.exists() {
        warn!(
            path = %staged.display(),
            "discarding staged task state from an interrupted write"
        );
        if let Err(e) = std::fs::remove_file(&staged) {
            warn!(path = %staged.display(), "cannot remove staged task state: {e}");
        }
    }

    match read_json::<BTreeMap<String, DateTime<Utc>>>(path) {
        Ok(Some(records)) => {
            debug!(path = %path.display(), tasks = records.len(), "loaded task state");
            records
        }
        Ok(None) => BTreeMap::new(),
        Err(e) => {
            warn!("task state unusable, starting fresh: {e}");
            BTreeMap::new()
        }
    }
}
