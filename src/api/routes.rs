// src/api/routes.rs

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::api::dto::{
    ActionRequest, CreateTaskRequest, DeleteQuery, GetQuery, StdinRequest,
};
use crate::api::errors::{error_to_response, json_ok};
use crate::orchestrator::Orchestrator;

/// Build the API router. The orchestrator handle travels as an extension.
pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/:id", get(get_task).delete(delete_task))
        .route("/api/tasks/:id/action", post(task_action))
        .route("/api/tasks/:id/logs/stream", get(stream_logs))
        .route("/api/tasks/:id/stdin", post(write_stdin))
        .route("/api/stats", get(daemon_stats))
        .layer(Extension(orchestrator))
}

/// Shared-secret credential from the `X-Auth-Token` header, if present.
fn credential(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-auth-token")
        .and_then(|value| value.to_str().ok())
        .map(String::from)
}

async fn list_tasks(Extension(orch): Extension<Arc<Orchestrator>>) -> Response {
    json_ok(orch.list())
}

async fn create_task(
    Extension(orch): Extension<Arc<Orchestrator>>,
    headers: HeaderMap,
    Json(body): Json<CreateTaskRequest>,
) -> Response {
    let credential = credential(&headers);
    match orch.create(body.into(), credential.as_deref()).await {
        Ok(summary) => (
            StatusCode::CREATED,
            Json(json!({ "ok": true, "data": summary })),
        )
            .into_response(),
        Err(err) => error_to_response(err),
    }
}

async fn get_task(
    Extension(orch): Extension<Arc<Orchestrator>>,
    Path(id): Path<String>,
    Query(query): Query<GetQuery>,
) -> Response {
    match orch.get(&id, query.logs, query.tail) {
        Ok(detail) => json_ok(detail),
        Err(err) => error_to_response(err),
    }
}

async fn task_action(
    Extension(orch): Extension<Arc<Orchestrator>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ActionRequest>,
) -> Response {
    let credential = credential(&headers);
    match orch.action(&id, body.action, credential.as_deref()).await {
        Ok(summary) => json_ok(summary),
        Err(err) => error_to_response(err),
    }
}

async fn delete_task(
    Extension(orch): Extension<Arc<Orchestrator>>,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuery>,
    headers: HeaderMap,
) -> Response {
    let credential = credential(&headers);
    match orch.remove(&id, query.force, credential.as_deref()).await {
        Ok(()) => json_ok(json!({ "id": id })),
        Err(err) => error_to_response(err),
    }
}

/// Live output fan-out as SSE. Lagged subscribers silently drop lines; a
/// stalled consumer never backpressures the producing reader.
async fn stream_logs(
    Extension(orch): Extension<Arc<Orchestrator>>,
    Path(id): Path<String>,
) -> Response {
    let rx = match orch.subscribe_output(&id) {
        Ok(rx) => rx,
        Err(err) => return error_to_response(err),
    };
    let stream = BroadcastStream::new(rx).filter_map(|chunk| match chunk {
        Ok(chunk) => serde_json::to_string(&chunk)
            .ok()
            .map(|data| Ok::<Event, Infallible>(Event::default().event("log").data(data))),
        // Lagged: this subscriber fell behind and skips ahead.
        Err(_) => None,
    });
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

async fn write_stdin(
    Extension(orch): Extension<Arc<Orchestrator>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<StdinRequest>,
) -> Response {
    let credential = credential(&headers);
    match orch.write_stdin(&id, body.data.as_bytes(), credential.as_deref()) {
        Ok(()) => json_ok(json!({ "id": id })),
        Err(err) => error_to_response(err),
    }
}

async fn daemon_stats(Extension(orch): Extension<Arc<Orchestrator>>) -> Response {
    json_ok(orch.aggregate_stats())
}
