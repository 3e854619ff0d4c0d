//! Update request handlers: authenticate, resolve, execute

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use subtle::ConstantTimeEq;
use tokio::task::JoinHandle;

use super::error::ApiError;
use crate::runner::{LogSink, ShellRunner};
use crate::tasks::TaskBook;

/// Shared dispatcher state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub secret: Arc<String>,
    pub tasks: Arc<TaskBook>,
    pub runner: Arc<ShellRunner>,
    /// Deadline for detached async executions.
    pub exec_timeout: Duration,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub task: String,
    pub secret: String,
    #[serde(default, rename = "async")]
    pub async_exec: bool,
}

/// GET /update/:task/:key?async=[0|1|yes]
pub async fn update_get(
    State(state): State<AppState>,
    Path((task, key)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let is_async = matches!(
        query.get("async").map(String::as_str),
        Some("1") | Some("yes")
    );
    exec_task(&state, &key, &task, is_async).await
}

/// POST /update with JSON body `{"task", "secret", "async"}`
pub async fn update_post(
    State(state): State<AppState>,
    body: Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) =
        body.map_err(|e| ApiError::Validation(format!("failed to decode request: {}", e)))?;
    if req.task.is_empty() || req.secret.is_empty() {
        return Err(ApiError::Validation(
            "task and secret must not be empty".into(),
        ));
    }
    exec_task(&state, &req.secret, &req.task, req.async_exec).await
}

/// Authenticate, resolve, and execute. Authentication strictly precedes task
/// resolution: a bad secret is rejected before any lookup happens.
async fn exec_task(
    state: &AppState,
    secret: &str,
    task: &str,
    is_async: bool,
) -> Result<Json<Value>, ApiError> {
    if !bool::from(secret.as_bytes().ct_eq(state.secret.as_bytes())) {
        return Err(ApiError::Auth);
    }

    let command = state
        .tasks
        .command(task)
        .ok_or(ApiError::UnknownTask)?
        .to_string();
    log::info!("invoke task {}", task);

    if is_async {
        spawn_detached(state, task, command);
        return Ok(Json(json!({"submitted": "ok", "task": task})));
    }

    state
        .runner
        .run(&command, Arc::new(LogSink::new()))
        .await
        .map_err(|e| {
            log::warn!("task {} failed: {}", task, e);
            ApiError::Execution
        })?;
    Ok(Json(json!({"updated": "ok", "task": task})))
}

/// Launch a detached execution bounded by the configured timeout, independent
/// of the request that triggered it. Errors and timeouts are logged, never
/// surfaced. The returned handle is a completion signal; the HTTP path drops
/// it without waiting.
pub fn spawn_detached(state: &AppState, task: &str, command: String) -> JoinHandle<()> {
    let runner = state.runner.clone();
    let timeout = state.exec_timeout;
    let task = task.to_string();

    tokio::spawn(async move {
        let run = runner.run(&command, Arc::new(LogSink::new()));
        match tokio::time::timeout(timeout, run).await {
            Ok(Ok(())) => log::info!("task {} completed", task),
            Ok(Err(e)) => log::warn!("task {} failed: {}", task, e),
            Err(_) => log::warn!("task {} timed out", task),
        }
    })
}
