// src/registry/mod.rs

//! The task registry: single source of truth for task state.
//!
//! Owns the in-memory `id → record` map, the shell concurrency gate, the
//! auth gate, the persistence port and retention. Every executor and the API
//! surface goes through this type; executors hold a cloned handle.
//!
//! Locking: the map lock is held only for insert/remove/lookup; each task
//! has its own record lock linearizing mutations to that task. Persistence
//! snapshots are taken after dropping the record lock, so a mutation is
//! never written half-applied.

pub mod persist;
pub mod recovery;

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::ConfigFile;
use crate::errors::{OrchestratorError, Result};
use crate::job::context::CancelToken;
use crate::logbuf::TaskLogs;
use crate::task::{TaskDetail, TaskId, TaskKind, TaskRecord, TaskSummary};

pub use persist::{JsonSnapshotStore, SnapshotStore};

/// Live state for one task: the persisted record plus runtime-only handles.
#[derive(Debug)]
pub struct TaskEntry {
    /// Per-task lock; all record mutations are linearized through it.
    pub record: Mutex<TaskRecord>,
    /// Ring buffers + fan-out; written by the shell's reader task.
    pub logs: Arc<TaskLogs>,
    /// Cancellation token checked by job handlers; for shells it marks an
    /// explicit `cancel` so the supervisor records the right terminal state.
    pub cancel: CancelToken,
    /// PTY master writer for interactive shells.
    pub stdin: Mutex<Option<std::fs::File>>,
    /// Set when a graceful stop (or kill) is in flight, so process exit maps
    /// to `stopped` rather than `completed`/`failed`.
    pub stop_requested: AtomicBool,
}

impl TaskEntry {
    fn new(record: TaskRecord, log_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            record: Mutex::new(record),
            logs: Arc::new(TaskLogs::new(log_capacity)),
            cancel: CancelToken::new(),
            stdin: Mutex::new(None),
            stop_requested: AtomicBool::new(false),
        })
    }

    /// Point-in-time copy of the record.
    pub fn record_snapshot(&self) -> TaskRecord {
        self.record.lock().unwrap().clone()
    }
}

#[derive(Debug)]
struct RegistryInner {
    config: ConfigFile,
    store: Box<dyn SnapshotStore>,
    tasks: Mutex<HashMap<TaskId, Arc<TaskEntry>>>,
    auth_token: Option<String>,
}

/// Cloneable handle to the shared registry state.
#[derive(Debug, Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    pub fn new(config: ConfigFile, store: Box<dyn SnapshotStore>) -> Self {
        let auth_token = config.effective_auth_token();
        Self {
            inner: Arc::new(RegistryInner {
                config,
                store,
                tasks: Mutex::new(HashMap::new()),
                auth_token,
            }),
        }
    }

    pub fn config(&self) -> &ConfigFile {
        &self.inner.config
    }

    /// Gate for mutating calls. A no-op when no shared secret is configured.
    pub fn check_auth(&self, credential: Option<&str>) -> Result<()> {
        match &self.inner.auth_token {
            None => Ok(()),
            Some(expected) if credential == Some(expected.as_str()) => Ok(()),
            Some(_) => Err(OrchestratorError::Auth(
                "missing or invalid auth token".to_string(),
            )),
        }
    }

    /// Load persisted records and reconcile them against live OS state.
    ///
    /// See `recovery.rs` for the reconciliation rules.
    pub fn init(&self) -> Result<()> {
        let records = self.inner.store.load_all()?;
        let reloaded = records.len();
        let mut tasks = self.inner.tasks.lock().unwrap();
        for record in records {
            let record = recovery::reconcile(record);
            let id = record.id.clone();
            let cancel_requested = record.cancel_requested;
            let entry = TaskEntry::new(record, self.inner.config.shell.log_buffer_lines);
            if cancel_requested {
                // Restore the runtime token for a cancellation that was
                // requested before the restart.
                entry.cancel.cancel();
            }
            tasks.insert(id, entry);
        }
        drop(tasks);
        info!(reloaded, "registry initialised from snapshot");
        self.persist();
        Ok(())
    }

    /// Persist the final snapshot. Running shells are left alive on purpose:
    /// they are re-attached (or reconciled) on the next startup.
    pub fn shutdown(&self) {
        self.persist();
        info!("registry shut down");
    }

    // ------------------------------------------------------------------
    // Map operations

    /// Number of shells whose status counts against the concurrency limit.
    fn live_shell_count(tasks: &HashMap<TaskId, Arc<TaskEntry>>) -> usize {
        tasks
            .values()
            .filter(|entry| {
                let record = entry.record.lock().unwrap();
                record.kind == TaskKind::Shell && !record.status.is_terminal()
            })
            .count()
    }

    /// Insert a new shell record, atomically enforcing the shell cap.
    pub fn insert_shell(&self, record: TaskRecord) -> Result<Arc<TaskEntry>> {
        let mut tasks = self.inner.tasks.lock().unwrap();
        let live = Self::live_shell_count(&tasks);
        let max = self.inner.config.limits.max_shells;
        if live >= max {
            return Err(OrchestratorError::ConcurrencyLimit(format!(
                "maximum shell count reached ({live}/{max})"
            )));
        }
        let id = record.id.clone();
        let entry = TaskEntry::new(record, self.inner.config.shell.log_buffer_lines);
        tasks.insert(id, entry.clone());
        drop(tasks);
        self.prune_finished();
        Ok(entry)
    }

    /// Insert a new job record. Job capacity is enforced by the job queue,
    /// not here.
    pub fn insert_job(&self, record: TaskRecord) -> Arc<TaskEntry> {
        let id = record.id.clone();
        let entry = TaskEntry::new(record, self.inner.config.shell.log_buffer_lines);
        self.inner.tasks.lock().unwrap().insert(id, entry.clone());
        self.prune_finished();
        entry
    }

    pub fn entry(&self, id: &str) -> Result<Arc<TaskEntry>> {
        self.inner
            .tasks
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| OrchestratorError::NotFound(id.to_string()))
    }

    /// Atomically take an entry out of the map. Exactly one of two concurrent
    /// removals wins; the other observes `NotFound`.
    pub fn remove_entry(&self, id: &str) -> Result<Arc<TaskEntry>> {
        self.inner
            .tasks
            .lock()
            .unwrap()
            .remove(id)
            .ok_or_else(|| OrchestratorError::NotFound(id.to_string()))
    }

    // ------------------------------------------------------------------
    // Mutation + persistence

    /// Apply a mutation under the task's lock, then persist.
    ///
    /// The record lock is dropped before the snapshot is taken, so persistence
    /// never deadlocks against the map-wide snapshot walk.
    pub fn mutate<R>(&self, entry: &TaskEntry, f: impl FnOnce(&mut TaskRecord) -> R) -> R {
        let (result, copy) = {
            let mut record = entry.record.lock().unwrap();
            let result = f(&mut record);
            (result, record.clone())
        };
        self.persist_one(&copy);
        result
    }

    /// Full deep-copied snapshot of every record.
    pub fn snapshot(&self) -> Vec<TaskRecord> {
        let entries: Vec<Arc<TaskEntry>> =
            self.inner.tasks.lock().unwrap().values().cloned().collect();
        let mut records: Vec<TaskRecord> = entries
            .iter()
            .map(|entry| entry.record.lock().unwrap().clone())
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        records
    }

    /// Write the full snapshot. Persistence is best-effort: a failed write is
    /// logged, not propagated, because the in-memory map stays authoritative.
    pub fn persist(&self) {
        let records = self.snapshot();
        if let Err(err) = self.inner.store.save_all(&records) {
            warn!(error = %err, "failed to persist snapshot");
        }
    }

    fn persist_one(&self, record: &TaskRecord) {
        let records = self.snapshot();
        if let Err(err) = self.inner.store.save_one(record, &records) {
            warn!(task = %record.id, error = %err, "failed to persist record");
        }
    }

    // ------------------------------------------------------------------
    // Queries

    /// Lightweight status for every retained task, oldest first.
    pub fn list(&self) -> Vec<TaskSummary> {
        self.prune_finished();
        self.snapshot()
            .iter()
            .map(TaskSummary::from_record)
            .collect()
    }

    /// Full detail for one task, with optional log tails and on-demand
    /// process stats.
    pub fn get_detail(&self, id: &str, include_logs: bool, tail_n: usize) -> Result<TaskDetail> {
        let entry = self.entry(id)?;
        let record = entry.record_snapshot();
        let stats = match (record.kind, record.pid) {
            (TaskKind::Shell, Some(pid)) => Some(crate::shell::stats::sample(pid)),
            _ => None,
        };
        let logs = include_logs.then(|| entry.logs.tails(tail_n));
        Ok(TaskDetail {
            record,
            stats,
            logs,
        })
    }

    // ------------------------------------------------------------------
    // Retention

    /// Prune terminal tasks beyond the retained-count cap or older than the
    /// retention horizon. Called from `list` and the create paths.
    pub fn prune_finished(&self) {
        let horizon =
            Utc::now() - chrono::Duration::seconds(self.inner.config.retention.max_age_secs as i64);
        let max_finished = self.inner.config.retention.max_finished;

        let mut tasks = self.inner.tasks.lock().unwrap();
        let mut finished: Vec<(TaskId, chrono::DateTime<Utc>)> = tasks
            .values()
            .filter_map(|entry| {
                let record = entry.record.lock().unwrap();
                record
                    .status
                    .is_terminal()
                    .then(|| (record.id.clone(), record.finished_at.unwrap_or(record.updated_at)))
            })
            .collect();

        let mut doomed: Vec<TaskId> = finished
            .iter()
            .filter(|(_, finished_at)| *finished_at < horizon)
            .map(|(id, _)| id.clone())
            .collect();

        if finished.len() > max_finished {
            finished.sort_by_key(|(_, finished_at)| *finished_at);
            let overflow = finished.len() - max_finished;
            doomed.extend(finished.iter().take(overflow).map(|(id, _)| id.clone()));
        }

        doomed.sort();
        doomed.dedup();
        if doomed.is_empty() {
            return;
        }
        for id in &doomed {
            tasks.remove(id);
        }
        drop(tasks);
        debug!(pruned = doomed.len(), "retention pruned terminal tasks");
        self.persist();
    }
}
