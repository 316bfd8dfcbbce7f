// src/job/executor.rs

//! Main dispatch loop that manages running job worker threads.
//!
//! Admission policy: up to `max_jobs` jobs run concurrently; requests beyond
//! the cap wait in a bounded FIFO queue; once the queue is full, `submit` is
//! rejected outright. Submissions are never silently dropped.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::errors::{OrchestratorError, Result};
use crate::job::context::JobContext;
use crate::job::handler::{HandlerRegistry, JobHandler, JobOutcome};
use crate::registry::{Registry, TaskEntry};
use crate::task::{JobSpec, TaskId, TaskRecord, TaskSummary};

/// Thread executor for job tasks.
#[derive(Debug, Clone)]
pub struct JobExecutor {
    registry: Registry,
    handlers: Arc<HandlerRegistry>,
    queue_tx: mpsc::Sender<TaskId>,
}

impl JobExecutor {
    /// Create the executor and start its background dispatch loop.
    pub fn new(registry: Registry, handlers: Arc<HandlerRegistry>) -> Self {
        let limits = &registry.config().limits;
        let (queue_tx, queue_rx) = mpsc::channel::<TaskId>(limits.job_queue_length);
        let slots = Arc::new(Semaphore::new(limits.max_jobs));
        spawn_dispatcher(registry.clone(), handlers.clone(), queue_rx, slots);
        Self {
            registry,
            handlers,
            queue_tx,
        }
    }

    /// Validate and enqueue a new job.
    ///
    /// The queue slot is reserved before the record is inserted, so a
    /// rejected submission leaves no trace in the registry.
    pub fn submit(&self, spec: JobSpec, label: Option<String>) -> Result<TaskSummary> {
        if self.handlers.get(&spec.job_type).is_none() {
            return Err(OrchestratorError::Validation(format!(
                "unknown job type: {}",
                spec.job_type
            )));
        }

        let permit = self.queue_tx.try_reserve().map_err(|err| match err {
            TrySendError::Full(()) => OrchestratorError::ConcurrencyLimit(
                "job queue is full; retry later".to_string(),
            ),
            TrySendError::Closed(()) => {
                OrchestratorError::Other(anyhow::anyhow!("job dispatcher is not running"))
            }
        })?;

        let record = TaskRecord::new_job(spec, label);
        let entry = self.registry.insert_job(record);
        let summary = TaskSummary::from_record(&entry.record_snapshot());
        self.registry.persist();
        debug!(task = %summary.id, "job queued");
        permit.send(summary.id.clone());
        Ok(summary)
    }

    /// Request cooperative cancellation of a queued or running job.
    pub fn cancel(&self, entry: &Arc<TaskEntry>) -> Result<()> {
        let (id, terminal) = {
            let record = entry.record.lock().unwrap();
            (record.id.clone(), record.status.is_terminal())
        };
        if terminal {
            return Err(OrchestratorError::AlreadyTerminal(id));
        }
        entry.cancel.cancel();
        self.registry.mutate(entry, |record| {
            record.cancel_requested = true;
        });
        info!(task = %id, "job cancellation requested");
        Ok(())
    }

    /// Remove a job record; rejects a live job unless `force`, in which case
    /// cancellation is requested first.
    pub fn remove(&self, id: &str, force: bool) -> Result<()> {
        let entry = self.registry.entry(id)?;
        let terminal = entry.record.lock().unwrap().status.is_terminal();
        if !terminal {
            if !force {
                return Err(OrchestratorError::Validation(format!(
                    "job '{id}' is still running; pass force=true to cancel and remove"
                )));
            }
            entry.cancel.cancel();
        }
        self.registry.remove_entry(id)?;
        self.registry.persist();
        info!(task = %id, force, "job task removed");
        Ok(())
    }
}

/// Background loop: pull queued job ids, wait for a free slot, run each
/// handler on its own worker thread.
fn spawn_dispatcher(
    registry: Registry,
    handlers: Arc<HandlerRegistry>,
    mut queue_rx: mpsc::Receiver<TaskId>,
    slots: Arc<Semaphore>,
) {
    tokio::spawn(async move {
        info!("job dispatcher started");

        while let Some(id) = queue_rx.recv().await {
            let permit = match slots.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let entry = match registry.entry(&id) {
                Ok(entry) => entry,
                Err(_) => {
                    debug!(task = %id, "job removed while queued; skipping");
                    continue;
                }
            };

            // Cancelled while still waiting in the queue: never started.
            if entry.cancel.is_cancelled() {
                registry.mutate(&entry, |record| {
                    record.mark_cancelled(None);
                });
                continue;
            }

            let spec = entry.record.lock().unwrap().job_spec().cloned();
            let Some(spec) = spec else {
                warn!(task = %id, "queued task is not a job; skipping");
                continue;
            };
            let Some(handler) = handlers.get(&spec.job_type) else {
                // Validated at submit; can only happen for reloaded state.
                registry.mutate(&entry, |record| {
                    record.mark_running(None, None);
                    record.mark_failed(format!("no handler registered for '{}'", spec.job_type));
                });
                continue;
            };

            registry.mutate(&entry, |record| {
                record.mark_running(None, None);
            });
            debug!(task = %id, job_type = %spec.job_type, "job started");

            let registry = registry.clone();
            tokio::spawn(async move {
                run_job(&registry, &entry, handler, spec.params).await;
                drop(permit);
            });
        }

        info!("job dispatcher finished (queue closed)");
    });
}

/// Run one handler on the blocking pool and record its outcome.
async fn run_job(
    registry: &Registry,
    entry: &Arc<TaskEntry>,
    handler: Arc<dyn JobHandler>,
    params: serde_json::Value,
) {
    let ctx = JobContext::new(registry.clone(), entry.clone());
    let joined = tokio::task::spawn_blocking(move || handler.run(&ctx, params)).await;

    registry.mutate(entry, |record| match joined {
        Ok(JobOutcome::Completed { result, message }) => {
            if let Some(message) = message {
                record.message = Some(message);
            }
            record.mark_completed(None, result);
        }
        Ok(JobOutcome::Failed { error, result }) => {
            if record.mark_failed(error) {
                record.result = result;
            }
        }
        Ok(JobOutcome::Cancelled { result, message }) => {
            if let Some(message) = message {
                record.message = Some(message);
            }
            record.mark_cancelled(result);
        }
        Err(join_err) => {
            // Panics are summarized, never surfaced verbatim.
            error!(task = %record.id, error = %join_err, "job handler panicked");
            record.mark_failed("job handler panicked");
        }
    });
}
