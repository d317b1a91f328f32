//! The HTTP surface collaborator: routes `/fetch`,
//! `/fetch/sync`, `/job/:id`, `/events`, `/health`, `/metrics`.
//!
//! Grounded on `feature-flags/src/router.rs`'s `with_state` pattern, with
//! `State` renamed `AppState` to avoid colliding with `axum::extract::State`
//! the way most of the pack's multi-binary services do.

mod handlers;

use crate::config::Settings;
use crate::fetch_engine::FetchEngine;
use crate::job_broker::JobBroker;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<JobBroker>,
    pub engine: Arc<FetchEngine>,
    pub settings: Settings,
}

pub fn router(state: AppState, metrics_handle: metrics_exporter_prometheus::PrometheusHandle) -> Router {
    Router::new()
        .route("/fetch", post(handlers::submit))
        .route("/fetch/sync", get(handlers::fetch_sync_get).post(handlers::fetch_sync_post))
        .route("/job/:id", get(handlers::get_job))
        .route("/events", get(handlers::events))
        .route("/health", get(handlers::health))
        .merge(crate::metrics::router(metrics_handle))
        .layer(axum::middleware::from_fn(crate::metrics::track_http_metrics))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}
