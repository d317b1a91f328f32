//! Route handlers for the HTTP surface.
//!
//! Grounded on the pack's axum handler shape (`feature-flags/src/
//! v0_endpoint.rs`, `agent-sync/src/handlers/sync_get.rs` for the SSE
//! endpoint), wired against `JobBroker` instead of a flags/sync service.

use super::AppState;
use crate::fetch_engine::FetchError;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub url: String,
    pub session_key: Option<String>,
    pub callback_url: Option<String>,
    pub issue_ref: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub url: String,
    pub status: &'static str,
}

pub async fn submit(State(state): State<AppState>, Json(req): Json<SubmitRequest>) -> impl IntoResponse {
    match state.broker.submit(req.url.clone(), req.session_key, req.callback_url, req.issue_ref).await {
        Ok(job_id) => (StatusCode::ACCEPTED, Json(SubmitResponse { job_id, url: req.url, status: "queued" })).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to persist submitted job");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SyncQuery {
    pub url: String,
    pub session_key: Option<String>,
    pub timeout: Option<f64>,
}

/// `200 Artifact` · `502` on no-content/retryable failure · `400` on
/// non-retryable failure · `504` on timeout.
pub async fn fetch_sync_get(State(state): State<AppState>, Query(req): Query<SyncQuery>) -> impl IntoResponse {
    fetch_sync(state, req.url, req.timeout).await
}

pub async fn fetch_sync_post(State(state): State<AppState>, Json(req): Json<SyncQuery>) -> impl IntoResponse {
    fetch_sync(state, req.url, req.timeout).await
}

async fn fetch_sync(state: AppState, url: String, requested_timeout: Option<f64>) -> axum::response::Response {
    let timeout_secs = requested_timeout.unwrap_or(state.settings.sync_timeout_default).min(state.settings.max_sync_timeout);

    match tokio::time::timeout(Duration::from_secs_f64(timeout_secs), state.engine.fetch(&url)).await {
        Ok(Ok(artifact)) => (StatusCode::OK, Json(artifact)).into_response(),
        Ok(Err(err)) => classify_sync_error(&err),
        Err(_) => StatusCode::GATEWAY_TIMEOUT.into_response(),
    }
}

fn classify_sync_error(err: &FetchError) -> axum::response::Response {
    let status = if err.retryable() { StatusCode::BAD_GATEWAY } else { StatusCode::BAD_REQUEST };
    (status, Json(serde_json::json!({"message": err.to_string(), "code": err.code(), "retryable": err.retryable()}))).into_response()
}

pub async fn get_job(State(state): State<AppState>, axum::extract::Path(id): axum::extract::Path<Uuid>) -> impl IntoResponse {
    match state.broker.get(id).await {
        Ok(Some(job)) => (StatusCode::OK, Json(job)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to read job");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `text/event-stream`, one `data: <json>\n\n` per job transition, no
/// replay ("Contract").
pub async fn events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.broker.subscribe();
    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            if let Ok(data) = serde_json::to_string(&event) {
                yield Ok(Event::default().data(data));
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub browser_connected: bool,
    pub active_jobs_queue: i64,
    pub active_browser_contexts: usize,
    pub concurrency_limit: usize,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        browser_connected: state.engine.browser_launched().await,
        active_jobs_queue: state.broker.queue_depth(),
        active_browser_contexts: state.engine.permits_in_use(),
        concurrency_limit: state.settings.max_concurrent_browsers,
    })
}
