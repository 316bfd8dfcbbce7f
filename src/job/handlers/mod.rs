// src/job/handlers/mod.rs

//! Built-in job handlers and their shared batch machinery.

pub mod copy;
pub mod extract;
pub mod move_items;
pub mod noop;

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::config::ConfigFile;
use crate::fs::{FileSystem, RealFileSystem};
use crate::job::handler::{HandlerRegistry, JobOutcome};

pub use copy::BulkCopyHandler;
pub use extract::ExtractArchiveHandler;
pub use move_items::BulkMoveHandler;
pub use noop::NoopHandler;

/// Handler registry preloaded with the built-in job kinds.
pub fn builtin_registry(config: &ConfigFile) -> HandlerRegistry {
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(BulkCopyHandler::new(fs.clone())));
    registry.register(Arc::new(BulkMoveHandler::new(fs)));
    registry.register(Arc::new(ExtractArchiveHandler::new(
        config.job.extract_tool.clone(),
    )));
    registry.register(Arc::new(NoopHandler));
    registry
}

/// One failed item in a batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchError {
    pub path: String,
    pub error: String,
}

/// Aggregate result of a batch handler. Batch handlers do not abort on the
/// first failing item: every item is attempted and tallied here.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<BatchError>,
}

impl BatchReport {
    pub fn record_failure(&mut self, path: &str, error: impl std::fmt::Display) {
        self.failed += 1;
        self.errors.push(BatchError {
            path: path.to_string(),
            error: error.to_string(),
        });
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    /// Map a finished (uncancelled) batch onto a job outcome: `failed` only
    /// when every item failed.
    pub fn into_outcome(self, verb: &str) -> JobOutcome {
        let total = self.succeeded + self.failed;
        if self.succeeded == 0 && self.failed > 0 {
            JobOutcome::Failed {
                error: format!("all {total} items failed"),
                result: Some(self.to_value()),
            }
        } else {
            JobOutcome::Completed {
                message: Some(format!("{verb} {} of {total} items", self.succeeded)),
                result: Some(self.to_value()),
            }
        }
    }

    /// Outcome for a batch interrupted by cancellation after `attempted` of
    /// `total` items.
    pub fn into_cancelled(self, attempted: usize, total: usize) -> JobOutcome {
        JobOutcome::Cancelled {
            message: Some(format!("cancelled after {attempted} of {total} items")),
            result: Some(self.to_value()),
        }
    }
}

/// Copy `src` (file or directory, recursively) *into* `dest_dir`, keeping
/// its file name.
pub(crate) fn copy_into(fs: &Arc<dyn FileSystem>, src: &Path, dest_dir: &Path) -> Result<()> {
    let name = src
        .file_name()
        .ok_or_else(|| anyhow!("source has no file name: {:?}", src))?;
    copy_recursive(fs, src, &dest_dir.join(name))
}

pub(crate) fn copy_recursive(fs: &Arc<dyn FileSystem>, src: &Path, target: &Path) -> Result<()> {
    if fs.is_dir(src) {
        fs.create_dir_all(target)?;
        for child in fs.read_dir(src)? {
            let name = child
                .file_name()
                .ok_or_else(|| anyhow!("directory entry has no file name: {:?}", child))?;
            copy_recursive(fs, &child, &target.join(name))?;
        }
        Ok(())
    } else if fs.is_file(src) {
        fs.copy_file(src, target)?;
        Ok(())
    } else {
        Err(anyhow!("source not found: {:?}", src))
    }
}
