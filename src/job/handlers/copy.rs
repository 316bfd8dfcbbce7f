// src/job/handlers/copy.rs

//! Bulk copy: copy a set of source paths into a destination directory.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::fs::FileSystem;
use crate::job::context::JobContext;
use crate::job::handler::{JobHandler, JobOutcome};
use crate::job::handlers::{copy_into, BatchReport};

#[derive(Debug, Deserialize)]
struct CopyParams {
    sources: Vec<String>,
    destination: String,
}

#[derive(Debug)]
pub struct BulkCopyHandler {
    fs: Arc<dyn FileSystem>,
}

impl BulkCopyHandler {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }
}

impl JobHandler for BulkCopyHandler {
    fn job_type(&self) -> &str {
        "bulk_copy"
    }

    fn run(&self, ctx: &JobContext, params: serde_json::Value) -> JobOutcome {
        let params: CopyParams = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(err) => {
                return JobOutcome::Failed {
                    error: format!("invalid bulk_copy params: {err}"),
                    result: None,
                }
            }
        };
        if params.sources.is_empty() {
            return JobOutcome::Failed {
                error: "sources must not be empty".to_string(),
                result: None,
            };
        }

        let dest = PathBuf::from(&params.destination);
        if let Err(err) = self.fs.create_dir_all(&dest) {
            return JobOutcome::Failed {
                error: format!("cannot create destination: {err}"),
                result: None,
            };
        }

        let total = params.sources.len();
        let mut report = BatchReport::default();
        for (idx, src) in params.sources.iter().enumerate() {
            // Checkpoint between items.
            if ctx.is_cancelled() {
                return report.into_cancelled(idx, total);
            }
            match copy_into(&self.fs, &PathBuf::from(src), &dest) {
                Ok(()) => report.succeeded += 1,
                Err(err) => {
                    debug!(src = %src, error = %err, "bulk_copy item failed");
                    report.record_failure(src, err);
                }
            }
            ctx.set_progress((idx + 1) as u64, total as u64, src.as_str());
        }
        report.into_outcome("copied")
    }
}
