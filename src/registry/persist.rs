// src/registry/persist.rs

//! Pluggable snapshot persistence port.
//!
//! The in-memory task map is the source of truth; the persisted snapshot is
//! a derived, best-effort mirror consulted only at startup recovery. The
//! port exists so the backing store (flat file, embedded KV store) is
//! swappable without touching executor logic.

use std::fmt::Debug;
use std::fs;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::errors::Result;
use crate::task::TaskRecord;

/// Trait abstracting how registry snapshots are stored.
pub trait SnapshotStore: Send + Sync + Debug {
    /// Load every persisted record. Called once, at registry init.
    fn load_all(&self) -> Result<Vec<TaskRecord>>;

    /// Atomically replace the full snapshot: a reader must see either the
    /// old or the fully-updated state, never a partial write.
    fn save_all(&self, records: &[TaskRecord]) -> Result<()>;

    /// Persist a single record update.
    ///
    /// Stores without per-record granularity fall back to rewriting the full
    /// snapshot; `all` carries the complete current state for that purpose.
    fn save_one(&self, record: &TaskRecord, all: &[TaskRecord]) -> Result<()> {
        let _ = record;
        self.save_all(all)
    }
}

/// Default store: one JSON snapshot file, written to a temporary sibling and
/// renamed into place so a crash mid-write never leaves a partial file.
#[derive(Debug)]
pub struct JsonSnapshotStore {
    path: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "tasks.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotStore for JsonSnapshotStore {
    fn load_all(&self) -> Result<Vec<TaskRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        match serde_json::from_str::<Vec<TaskRecord>>(&contents) {
            Ok(records) => {
                debug!(count = records.len(), path = ?self.path, "loaded snapshot");
                Ok(records)
            }
            Err(err) => {
                // An unreadable snapshot should not brick the daemon; start
                // fresh and let the old file be overwritten.
                warn!(path = ?self.path, error = %err, "snapshot unreadable; starting empty");
                Ok(Vec::new())
            }
        }
    }

    fn save_all(&self, records: &[TaskRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(records)?;
        let tmp = self.tmp_path();
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
