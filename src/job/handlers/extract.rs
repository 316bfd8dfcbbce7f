// src/job/handlers/extract.rs

//! Archive extraction via an external extractor binary.
//!
//! Archive-format semantics are opaque to the orchestrator: the handler
//! builds an extractor command line, runs it as a child process, and
//! captures its output. The child's pid is attached to the cancellation
//! token so cancelling the job kills the extractor immediately.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::job::context::JobContext;
use crate::job::handler::{JobHandler, JobOutcome};

/// Captured extractor output is truncated to this many characters.
const OUTPUT_LIMIT: usize = 2000;

#[derive(Debug, Deserialize)]
struct ExtractParams {
    archive_path: String,
    #[serde(default)]
    destination: Option<String>,
    /// Optional member paths to extract; empty means the whole archive.
    #[serde(default)]
    items: Vec<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug)]
pub struct ExtractArchiveHandler {
    tool: String,
}

impl ExtractArchiveHandler {
    pub fn new(tool: String) -> Self {
        Self { tool }
    }
}

impl JobHandler for ExtractArchiveHandler {
    fn job_type(&self) -> &str {
        "extract_archive"
    }

    fn run(&self, ctx: &JobContext, params: serde_json::Value) -> JobOutcome {
        let params: ExtractParams = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(err) => {
                return JobOutcome::Failed {
                    error: format!("invalid extract_archive params: {err}"),
                    result: None,
                }
            }
        };

        let archive = PathBuf::from(&params.archive_path);
        if !archive.is_file() {
            return JobOutcome::Failed {
                error: format!("archive not found: {}", archive.display()),
                result: None,
            };
        }
        let parent = archive
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let destination = params
            .destination
            .map(PathBuf::from)
            .unwrap_or_else(|| parent.clone());
        if let Err(err) = std::fs::create_dir_all(&destination) {
            return JobOutcome::Failed {
                error: format!("cannot create destination: {err}"),
                result: None,
            };
        }

        ctx.set_message(format!("Extracting {}", archive.display()));

        let mut cmd = Command::new(&self.tool);
        cmd.arg("x")
            .arg(&archive)
            .arg(format!("-o{}", destination.display()))
            .arg("-y");
        if let Some(password) = &params.password {
            cmd.arg(format!("-p{password}"));
        }
        for item in &params.items {
            cmd.arg(item.trim_start_matches('/'));
        }
        cmd.current_dir(&parent)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                return JobOutcome::Failed {
                    error: format!("failed to run {}: {err}", self.tool),
                    result: None,
                }
            }
        };
        ctx.attach_child(child.id() as i32);
        let output = child.wait_with_output();
        ctx.detach_child();

        let output = match output {
            Ok(output) => output,
            Err(err) => {
                return JobOutcome::Failed {
                    error: format!("failed waiting for {}: {err}", self.tool),
                    result: None,
                }
            }
        };

        if ctx.is_cancelled() {
            return JobOutcome::Cancelled {
                result: None,
                message: Some("extraction cancelled".to_string()),
            };
        }

        let result = json!({
            "archive_path": archive.display().to_string(),
            "destination": destination.display().to_string(),
            "stdout": truncate(&String::from_utf8_lossy(&output.stdout)),
            "stderr": truncate(&String::from_utf8_lossy(&output.stderr)),
        });

        if output.status.success() {
            info!(archive = %archive.display(), dest = %destination.display(), "archive extracted");
            JobOutcome::Completed {
                message: Some(format!("Extracted to {}", destination.display())),
                result: Some(result),
            }
        } else {
            JobOutcome::Failed {
                error: format!("{} exited with {}", self.tool, output.status),
                result: Some(result),
            }
        }
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= OUTPUT_LIMIT {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(OUTPUT_LIMIT).collect();
        out.push('…');
        out
    }
}
