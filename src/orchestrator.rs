// src/orchestrator.rs

//! Top-level facade tying the registry and both executors together.
//!
//! This is the whole operation surface: `create`, `list`, `get`, `action`,
//! `remove`, plus output subscription and pty input. The HTTP layer in
//! [`crate::api`] is a thin wrapper over this type; other subsystems embed
//! it directly and find their tasks via `label`.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::ConfigFile;
use crate::errors::{OrchestratorError, Result};
use crate::job::handlers::builtin_registry;
use crate::job::{HandlerRegistry, JobExecutor};
use crate::logbuf::LogChunk;
use crate::registry::{Registry, SnapshotStore};
use crate::shell::stats::{self, AggregateStats};
use crate::shell::ShellExecutor;
use crate::task::{
    JobSpec, ShellSpec, TaskAction, TaskDetail, TaskKind, TaskSummary,
};

/// Creation request, per task kind.
#[derive(Debug, Clone)]
pub enum CreateTask {
    Shell {
        spec: ShellSpec,
        label: Option<String>,
        autostart: bool,
    },
    Job {
        spec: JobSpec,
        label: Option<String>,
    },
}

/// The background task orchestrator.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    registry: Registry,
    shells: ShellExecutor,
    jobs: JobExecutor,
}

impl Orchestrator {
    /// Wire up a registry and both executors with an explicit handler set.
    pub fn new(config: ConfigFile, store: Box<dyn SnapshotStore>, handlers: HandlerRegistry) -> Self {
        let registry = Registry::new(config, store);
        let shells = ShellExecutor::new(registry.clone());
        let jobs = JobExecutor::new(registry.clone(), Arc::new(handlers));
        Self {
            registry,
            shells,
            jobs,
        }
    }

    /// Like [`Orchestrator::new`] with the built-in job handlers.
    pub fn with_builtin_handlers(config: ConfigFile, store: Box<dyn SnapshotStore>) -> Self {
        let handlers = builtin_registry(&config);
        Self::new(config, store, handlers)
    }

    /// Load the persisted snapshot, reconcile against live OS state and
    /// re-supervise adopted shells.
    pub fn init(&self) -> Result<()> {
        self.registry.init()?;
        self.shells.resume_adopted();
        Ok(())
    }

    /// Persist the final snapshot. Running shells survive on purpose.
    pub fn shutdown(&self) {
        self.registry.shutdown();
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    // ------------------------------------------------------------------
    // Operations

    pub async fn create(&self, request: CreateTask, credential: Option<&str>) -> Result<TaskSummary> {
        self.registry.check_auth(credential)?;
        match request {
            CreateTask::Shell {
                spec,
                label,
                autostart,
            } => self.shells.spawn(spec, label, autostart).await,
            CreateTask::Job { spec, label } => self.jobs.submit(spec, label),
        }
    }

    pub fn list(&self) -> Vec<TaskSummary> {
        self.registry.list()
    }

    pub fn get(&self, id: &str, include_logs: bool, tail_n: usize) -> Result<TaskDetail> {
        self.registry.get_detail(id, include_logs, tail_n)
    }

    /// Dispatch an action. Fire-and-forget except `restart`, which reports
    /// the relaunched run.
    pub async fn action(
        &self,
        id: &str,
        action: TaskAction,
        credential: Option<&str>,
    ) -> Result<TaskSummary> {
        self.registry.check_auth(credential)?;
        let entry = self.registry.entry(id)?;
        let kind = entry.record.lock().unwrap().kind;
        match (kind, action) {
            (TaskKind::Shell, TaskAction::Stop) => self.shells.stop(&entry)?,
            (TaskKind::Shell, TaskAction::Kill) => self.shells.kill(&entry)?,
            (TaskKind::Shell, TaskAction::Restart) => return self.shells.restart(&entry).await,
            (TaskKind::Shell, TaskAction::Cancel) => self.shells.cancel(&entry)?,
            (TaskKind::Job, TaskAction::Cancel) => self.jobs.cancel(&entry)?,
            (TaskKind::Job, other) => {
                return Err(OrchestratorError::Validation(format!(
                    "action {other:?} is not supported for jobs; cancel and submit a new job"
                )))
            }
        }
        Ok(TaskSummary::from_record(&entry.record_snapshot()))
    }

    pub async fn remove(&self, id: &str, force: bool, credential: Option<&str>) -> Result<()> {
        self.registry.check_auth(credential)?;
        let entry = self.registry.entry(id)?;
        let kind = entry.record.lock().unwrap().kind;
        match kind {
            TaskKind::Shell => self.shells.remove(id, force),
            TaskKind::Job => self.jobs.remove(id, force),
        }
    }

    /// Subscribe to a task's live output fan-out.
    pub fn subscribe_output(&self, id: &str) -> Result<broadcast::Receiver<LogChunk>> {
        Ok(self.registry.entry(id)?.logs.subscribe())
    }

    /// Write input bytes to an interactive shell's pty.
    pub fn write_stdin(&self, id: &str, data: &[u8], credential: Option<&str>) -> Result<()> {
        self.registry.check_auth(credential)?;
        let entry = self.registry.entry(id)?;
        self.shells.write_stdin(&entry, data)
    }

    /// Aggregate resource stats across running shells.
    pub fn aggregate_stats(&self) -> AggregateStats {
        stats::aggregate(&self.registry.snapshot())
    }
}
