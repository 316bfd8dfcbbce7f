// src/api/dto.rs

//! Request DTOs for the HTTP surface.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::orchestrator::CreateTask;
use crate::task::{JobSpec, ShellSpec, TaskAction};

/// Body of `POST /api/tasks`, dispatched on `kind`.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CreateTaskRequest {
    Shell {
        command: Vec<String>,
        #[serde(default)]
        cwd: Option<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
        #[serde(default)]
        pty: bool,
        #[serde(default)]
        label: Option<String>,
        #[serde(default)]
        autostart: bool,
    },
    Job {
        job_type: String,
        #[serde(default)]
        params: serde_json::Value,
        #[serde(default)]
        label: Option<String>,
    },
}

impl From<CreateTaskRequest> for CreateTask {
    fn from(request: CreateTaskRequest) -> Self {
        match request {
            CreateTaskRequest::Shell {
                command,
                cwd,
                env,
                pty,
                label,
                autostart,
            } => CreateTask::Shell {
                spec: ShellSpec {
                    command,
                    cwd,
                    env,
                    pty,
                },
                label,
                autostart,
            },
            CreateTaskRequest::Job {
                job_type,
                params,
                label,
            } => CreateTask::Job {
                spec: JobSpec { job_type, params },
                label,
            },
        }
    }
}

/// Body of `POST /api/tasks/{id}/action`.
#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub action: TaskAction,
}

/// Body of `POST /api/tasks/{id}/stdin`.
#[derive(Debug, Deserialize)]
pub struct StdinRequest {
    pub data: String,
}

/// Query string of `GET /api/tasks/{id}`.
#[derive(Debug, Default, Deserialize)]
pub struct GetQuery {
    #[serde(default)]
    pub logs: bool,
    #[serde(default = "default_tail")]
    pub tail: usize,
}

fn default_tail() -> usize {
    200
}

/// Query string of `DELETE /api/tasks/{id}`.
#[derive(Debug, Default, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub force: bool,
}
