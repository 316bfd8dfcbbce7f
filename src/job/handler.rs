// src/job/handler.rs

//! Pluggable job handler abstraction.
//!
//! The executor looks job types up in a [`HandlerRegistry`] instead of
//! hard-coding them. The built-in handlers live in [`crate::job::handlers`];
//! tests register their own (e.g. a controllable handler that blocks until
//! released).

use std::collections::HashMap;
use std::sync::Arc;

use crate::job::context::JobContext;

/// Terminal outcome returned by a handler.
///
/// Partial batch failures are not errors: they ride along in `result`
/// whatever the outcome, for the caller to inspect.
#[derive(Debug)]
pub enum JobOutcome {
    Completed {
        result: Option<serde_json::Value>,
        message: Option<String>,
    },
    Failed {
        error: String,
        result: Option<serde_json::Value>,
    },
    Cancelled {
        result: Option<serde_json::Value>,
        message: Option<String>,
    },
}

/// Trait implemented by every job kind.
///
/// `run` executes on a dedicated worker thread and is free to block; it must
/// poll `ctx.is_cancelled()` at reasonable checkpoints (e.g. between batch
/// items) and report `JobOutcome::Cancelled` when it observes the flag.
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> &str;
    fn run(&self, ctx: &JobContext, params: serde_json::Value) -> JobOutcome;
}

/// Registry of known job types.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its `job_type`. Last registration wins.
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        self.handlers
            .insert(handler.job_type().to_string(), handler);
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    pub fn job_types(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("job_types", &self.job_types())
            .finish()
    }
}
