// src/job/context.rs

//! Typed cancellation token and the helper handed to job handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::debug;

use crate::registry::{Registry, TaskEntry};
use crate::task::JobProgress;

#[derive(Debug, Default)]
struct CancelInner {
    flag: AtomicBool,
    /// Pid of a delegated child process, killed on cancellation.
    child_pid: Mutex<Option<i32>>,
}

/// Cooperative cancellation token, threaded explicitly into every handler
/// invocation and checked at defined checkpoints.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; also kills an attached child process.
    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        let pid = *self.inner.child_pid.lock().unwrap();
        if let Some(pid) = pid {
            debug!(pid, "cancellation: killing delegated child process");
            let _ = kill(Pid::from_raw(pid), Signal::SIGKILL);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Attach the pid of a delegated child. If cancellation has already been
    /// requested, the child is killed immediately, closing the race between
    /// `cancel` and `attach_child`.
    pub fn attach_child(&self, pid: i32) {
        *self.inner.child_pid.lock().unwrap() = Some(pid);
        if self.is_cancelled() {
            let _ = kill(Pid::from_raw(pid), Signal::SIGKILL);
        }
    }

    pub fn detach_child(&self) {
        self.inner.child_pid.lock().unwrap().take();
    }

    /// Clear the token for a fresh run (shells being restarted).
    pub fn reset(&self) {
        self.inner.flag.store(false, Ordering::SeqCst);
        self.inner.child_pid.lock().unwrap().take();
    }
}

/// Helper passed to job handlers: cancellation checkpoints plus progress and
/// message reporting back into the task record.
#[derive(Debug, Clone)]
pub struct JobContext {
    registry: Registry,
    entry: Arc<TaskEntry>,
}

impl JobContext {
    pub fn new(registry: Registry, entry: Arc<TaskEntry>) -> Self {
        Self { registry, entry }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.entry.cancel
    }

    /// Checkpoint: has cancellation been requested?
    pub fn is_cancelled(&self) -> bool {
        self.entry.cancel.is_cancelled()
    }

    pub fn attach_child(&self, pid: i32) {
        self.entry.cancel.attach_child(pid);
    }

    pub fn detach_child(&self) {
        self.entry.cancel.detach_child();
    }

    pub fn set_message(&self, message: impl Into<String>) {
        let message = message.into();
        self.registry.mutate(&self.entry, |record| {
            record.message = Some(message);
            record.updated_at = chrono::Utc::now();
        });
    }

    pub fn set_progress(&self, completed: u64, total: u64, detail: impl Into<String>) {
        let detail = detail.into();
        self.registry.mutate(&self.entry, |record| {
            record.progress = Some(JobProgress {
                completed: Some(completed),
                total: Some(total),
                detail: Some(detail),
            });
            record.updated_at = chrono::Utc::now();
        });
    }
}
