// src/task/record.rs

//! The serializable task record and its status state machine.
//!
//! A record is created once by `create`, mutated only by its owning executor
//! and by `action`/`cancel` calls, and removed by `delete` or retention
//! pruning. Status moves forward along the transition graph only; a `restart`
//! begins a new *run* (fresh `run_id`) under the same task identity.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// Canonical task id type used throughout the crate.
pub type TaskId = String;

/// The two kinds of supervised work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// A long-lived OS process (e.g. a download daemon).
    Shell,
    /// A one-shot background operation run on a worker thread.
    Job,
}

/// Task lifecycle status.
///
/// Shared shape for both kinds:
/// `pending → running → {stopped | completed | failed | cancelled}`, with
/// `running → stopping → stopped` as the graceful stop path (shells only).
/// Any non-terminal state may move directly to `cancelled`. `unknown` is
/// reachable only via startup recovery and is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Stopping,
    Stopped,
    Completed,
    Failed,
    Cancelled,
    Unknown,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Stopped
                | TaskStatus::Completed
                | TaskStatus::Failed
                | TaskStatus::Cancelled
                | TaskStatus::Unknown
        )
    }

    /// Whether a transition from `self` to `next` is a legal forward edge.
    ///
    /// `unknown` edges exist only for the startup reconciliation of records
    /// that were non-terminal when the previous process died.
    pub fn can_advance_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Pending, Running) => true,
            (Pending, Failed) => true,
            (Running, Stopping) => true,
            (Running, Stopped) => true,
            (Running, Completed) => true,
            (Running, Failed) => true,
            (Stopping, Stopped) => true,
            // Explicit cancellation from any non-terminal state.
            (Pending | Running | Stopping, Cancelled) => true,
            // Recovery reconciliation only.
            (Pending | Running | Stopping, Unknown) => true,
            _ => false,
        }
    }
}

/// Spec for a shell task: the command to supervise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellSpec {
    /// Argv, first element is the program.
    pub command: Vec<String>,
    /// Working directory; defaults to the user's home directory.
    #[serde(default)]
    pub cwd: Option<String>,
    /// Environment overrides applied on top of the daemon's environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Allocate a pseudo-terminal and combine output into the stdout stream.
    #[serde(default)]
    pub pty: bool,
}

/// Spec for a job task: a registered handler type plus its parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub job_type: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Kind-specific task spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TaskSpec {
    Shell(ShellSpec),
    Job(JobSpec),
}

impl TaskSpec {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskSpec::Shell(_) => TaskKind::Shell,
            TaskSpec::Job(_) => TaskKind::Job,
        }
    }
}

/// Progress payload reported by job handlers at checkpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobProgress {
    #[serde(default)]
    pub completed: Option<u64>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub detail: Option<String>,
}

/// Serializable metadata describing one supervised task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub kind: TaskKind,
    pub spec: TaskSpec,
    pub status: TaskStatus,
    /// Free-form label used for discovery by other subsystems.
    #[serde(default)]
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// OS pid; `Some` iff status is `running` or `stopping` (shells only).
    #[serde(default)]
    pub pid: Option<i32>,
    /// `/proc` start-time fingerprint of the spawned process, used to detect
    /// pid reuse during startup recovery.
    #[serde(default)]
    pub start_ticks: Option<u64>,
    /// Run counter under this task identity; bumped by `restart`.
    #[serde(default)]
    pub run_id: u64,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub progress: Option<JobProgress>,
    /// Human-readable status line maintained by job handlers.
    #[serde(default)]
    pub message: Option<String>,
    /// Explanation attached by recovery reconciliation.
    #[serde(default)]
    pub status_note: Option<String>,
    #[serde(default)]
    pub cancel_requested: bool,
    /// Persisted intent flag surfaced to callers; the orchestrator itself
    /// never auto-launches.
    #[serde(default)]
    pub autostart: bool,
    /// Whether this record was re-attached to a live process at startup.
    #[serde(default)]
    pub adopted: bool,
}

fn generate_id(prefix: &str) -> TaskId {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}_{}", Utc::now().timestamp(), &hex[..8])
}

impl TaskRecord {
    pub fn new_shell(spec: ShellSpec, label: Option<String>, autostart: bool) -> Self {
        Self::new(generate_id("sh"), TaskSpec::Shell(spec), label, autostart)
    }

    pub fn new_job(spec: JobSpec, label: Option<String>) -> Self {
        Self::new(generate_id("job"), TaskSpec::Job(spec), label, false)
    }

    fn new(id: TaskId, spec: TaskSpec, label: Option<String>, autostart: bool) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind: spec.kind(),
            spec,
            status: TaskStatus::Pending,
            label,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
            pid: None,
            start_ticks: None,
            run_id: 1,
            exit_code: None,
            result: None,
            error: None,
            progress: None,
            message: None,
            status_note: None,
            cancel_requested: false,
            autostart,
            adopted: false,
        }
    }

    pub fn shell_spec(&self) -> Option<&ShellSpec> {
        match &self.spec {
            TaskSpec::Shell(spec) => Some(spec),
            TaskSpec::Job(_) => None,
        }
    }

    pub fn job_spec(&self) -> Option<&JobSpec> {
        match &self.spec {
            TaskSpec::Job(spec) => Some(spec),
            TaskSpec::Shell(_) => None,
        }
    }

    /// Advance the status along the transition graph.
    ///
    /// Returns `false` (and leaves the record untouched) if the edge is not
    /// legal; callers hold the per-task lock, so a refused edge means a stale
    /// actor lost a race (e.g. an escalation firing after the process exited)
    /// and the refusal is the correct outcome.
    pub fn advance(&mut self, next: TaskStatus) -> bool {
        if !self.status.can_advance_to(next) {
            warn!(
                task = %self.id,
                from = ?self.status,
                to = ?next,
                "refusing illegal status transition"
            );
            return false;
        }
        self.status = next;
        self.updated_at = Utc::now();
        if next.is_terminal() {
            self.finished_at = Some(self.updated_at);
            self.pid = None;
        }
        true
    }

    pub fn mark_running(&mut self, pid: Option<i32>, start_ticks: Option<u64>) -> bool {
        if !self.advance(TaskStatus::Running) {
            return false;
        }
        self.pid = pid;
        self.start_ticks = start_ticks;
        self.started_at = Some(self.updated_at);
        self.exit_code = None;
        true
    }

    pub fn mark_stopping(&mut self) -> bool {
        self.advance(TaskStatus::Stopping)
    }

    pub fn mark_stopped(&mut self, exit_code: Option<i32>) -> bool {
        if !self.advance(TaskStatus::Stopped) {
            return false;
        }
        self.exit_code = exit_code;
        true
    }

    pub fn mark_completed(&mut self, exit_code: Option<i32>, result: Option<serde_json::Value>) -> bool {
        if !self.advance(TaskStatus::Completed) {
            return false;
        }
        self.exit_code = exit_code;
        if result.is_some() {
            self.result = result;
        }
        true
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) -> bool {
        if !self.advance(TaskStatus::Failed) {
            return false;
        }
        self.error = Some(error.into());
        true
    }

    pub fn mark_cancelled(&mut self, result: Option<serde_json::Value>) -> bool {
        if !self.advance(TaskStatus::Cancelled) {
            return false;
        }
        if result.is_some() {
            self.result = result;
        }
        true
    }

    pub fn mark_unknown(&mut self, note: impl Into<String>) -> bool {
        if !self.advance(TaskStatus::Unknown) {
            return false;
        }
        self.status_note = Some(note.into());
        true
    }

    /// Reset per-run state for a `restart`, keeping the task identity.
    ///
    /// Only valid once the previous run is terminal.
    pub fn begin_new_run(&mut self) {
        self.status = TaskStatus::Pending;
        self.run_id += 1;
        self.updated_at = Utc::now();
        self.started_at = None;
        self.finished_at = None;
        self.pid = None;
        self.start_ticks = None;
        self.exit_code = None;
        self.error = None;
        self.status_note = None;
        self.cancel_requested = false;
        self.adopted = false;
    }
}
