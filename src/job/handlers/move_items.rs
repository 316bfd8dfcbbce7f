// src/job/handlers/move_items.rs

//! Bulk move: move a set of source paths into a destination directory.
//!
//! A plain rename is attempted first; when that fails (e.g. across
//! filesystems) the handler falls back to copy-then-delete.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use tracing::debug;

use crate::fs::FileSystem;
use crate::job::context::JobContext;
use crate::job::handler::{JobHandler, JobOutcome};
use crate::job::handlers::{copy_recursive, BatchReport};

#[derive(Debug, Deserialize)]
struct MoveParams {
    sources: Vec<String>,
    destination: String,
}

#[derive(Debug)]
pub struct BulkMoveHandler {
    fs: Arc<dyn FileSystem>,
}

impl BulkMoveHandler {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    fn move_into(&self, src: &Path, dest_dir: &Path) -> Result<()> {
        let name = src
            .file_name()
            .ok_or_else(|| anyhow!("source has no file name: {:?}", src))?;
        let target = dest_dir.join(name);
        if !self.fs.exists(src) {
            return Err(anyhow!("source not found: {:?}", src));
        }
        if self.fs.rename(src, &target).is_ok() {
            return Ok(());
        }
        // Cross-device fallback.
        copy_recursive(&self.fs, src, &target)?;
        if self.fs.is_dir(src) {
            self.fs.remove_dir_all(src)
        } else {
            self.fs.remove_file(src)
        }
    }
}

impl JobHandler for BulkMoveHandler {
    fn job_type(&self) -> &str {
        "bulk_move"
    }

    fn run(&self, ctx: &JobContext, params: serde_json::Value) -> JobOutcome {
        let params: MoveParams = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(err) => {
                return JobOutcome::Failed {
                    error: format!("invalid bulk_move params: {err}"),
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
            if ctx.is_cancelled() {
                return report.into_cancelled(idx, total);
            }
            match self.move_into(&PathBuf::from(src), &dest) {
                Ok(()) => report.succeeded += 1,
                Err(err) => {
                    debug!(src = %src, error = %err, "bulk_move item failed");
                    report.record_failure(src, err);
                }
            }
            ctx.set_progress((idx + 1) as u64, total as u64, src.as_str());
        }
        report.into_outcome("moved")
    }
}
