// src/task/view.rs

//! Read-only views handed to callers.
//!
//! `list`/`get` must return deep copies, never references into live mutable
//! state, so both views own all of their data.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::shell::stats::ProcessStats;
use crate::task::record::{JobProgress, TaskId, TaskKind, TaskRecord, TaskStatus};

/// Lightweight per-task status, returned by `list`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub id: TaskId,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub pid: Option<i32>,
    pub run_id: u64,
    pub exit_code: Option<i32>,
    pub cancel_requested: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<JobProgress>,
}

impl TaskSummary {
    pub fn from_record(record: &TaskRecord) -> Self {
        Self {
            id: record.id.clone(),
            kind: record.kind,
            status: record.status,
            label: record.label.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
            pid: record.pid,
            run_id: record.run_id,
            exit_code: record.exit_code,
            cancel_requested: record.cancel_requested,
            message: record.message.clone(),
            progress: record.progress.clone(),
        }
    }
}

/// Log tails attached to a detail view on request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LogTails {
    pub stdout_tail: Vec<String>,
    pub stderr_tail: Vec<String>,
}

/// Full point-in-time copy of a record, returned by `get`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub record: TaskRecord,
    /// On-demand resource stats; present for shells with a live process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ProcessStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<LogTails>,
}
