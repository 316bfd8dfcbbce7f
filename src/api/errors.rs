// src/api/errors.rs

//! Error-to-response mapping and the `{"ok": ...}` envelope helpers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;

use crate::errors::OrchestratorError;

pub fn json_ok(data: impl Serialize) -> Response {
    axum::Json(json!({ "ok": true, "data": data })).into_response()
}

pub fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({ "ok": false, "error": message.into() })),
    )
        .into_response()
}

/// Structured mapping of the crate taxonomy onto HTTP statuses. Internal
/// errors are summarized, never surfaced verbatim.
pub fn error_to_response(err: OrchestratorError) -> Response {
    match err {
        OrchestratorError::Validation(msg) | OrchestratorError::Config(msg) => {
            json_error(StatusCode::BAD_REQUEST, msg)
        }
        OrchestratorError::Auth(msg) => json_error(StatusCode::FORBIDDEN, msg),
        OrchestratorError::NotFound(id) => {
            json_error(StatusCode::NOT_FOUND, format!("task not found: {id}"))
        }
        OrchestratorError::ConcurrencyLimit(msg) | OrchestratorError::AlreadyTerminal(msg) => {
            json_error(StatusCode::CONFLICT, msg)
        }
        OrchestratorError::Spawn(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, msg),
        OrchestratorError::Io(_)
        | OrchestratorError::Persist(_)
        | OrchestratorError::TomlError(_)
        | OrchestratorError::Other(_) => {
            tracing::error!(error = %err, "internal error serving API request");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}
