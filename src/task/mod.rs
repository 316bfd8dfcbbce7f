// src/task/mod.rs

//! Task records: the persisted unit of state for one piece of background
//! work, plus the status state machine shared by both task kinds.

pub mod record;
pub mod view;

pub use record::{
    JobProgress, JobSpec, ShellSpec, TaskId, TaskKind, TaskRecord, TaskSpec, TaskStatus,
};
pub use view::{LogTails, TaskDetail, TaskSummary};

use serde::{Deserialize, Serialize};

/// Action that can be requested on an existing task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskAction {
    /// Graceful stop (shells): SIGTERM, then SIGKILL after the grace period.
    Stop,
    /// Immediate forceful stop (shells).
    Kill,
    /// Kill and relaunch the same spec under the same task identity (shells).
    Restart,
    /// Cooperative cancellation (jobs; forceful for shells).
    Cancel,
}
