// src/job/handlers/noop.rs

//! Trivial job that sleeps in small steps, reporting progress.
//!
//! Kept registered as a cheap way to exercise queueing, progress and
//! cancellation end to end.

use std::time::Duration;

use serde::Deserialize;

use crate::job::context::JobContext;
use crate::job::handler::{JobHandler, JobOutcome};

const STEP: Duration = Duration::from_millis(50);

#[derive(Debug, Default, Deserialize)]
struct NoopParams {
    #[serde(default)]
    duration_ms: u64,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug)]
pub struct NoopHandler;

impl JobHandler for NoopHandler {
    fn job_type(&self) -> &str {
        "noop"
    }

    fn run(&self, ctx: &JobContext, params: serde_json::Value) -> JobOutcome {
        let params: NoopParams = if params.is_null() {
            NoopParams::default()
        } else {
            match serde_json::from_value(params) {
                Ok(params) => params,
                Err(err) => {
                    return JobOutcome::Failed {
                        error: format!("invalid noop params: {err}"),
                        result: None,
                    }
                }
            }
        };

        let steps = (params.duration_ms / STEP.as_millis() as u64).max(1);
        for step in 0..steps {
            if ctx.is_cancelled() {
                return JobOutcome::Cancelled {
                    result: None,
                    message: params.message,
                };
            }
            if params.duration_ms > 0 {
                std::thread::sleep(STEP);
            }
            ctx.set_progress(step + 1, steps, "working");
        }
        JobOutcome::Completed {
            result: None,
            message: params.message.or_else(|| Some("Completed".to_string())),
        }
    }
}
