//! Prometheus metrics: registration, the `/metrics` route, and an HTTP
//! request-tracking middleware.
//!
//! Grounded on PostHog's `hook-common/src/metrics.rs`: `metrics` +
//! `metrics-exporter-prometheus`, a `PrometheusHandle` rendered behind a
//! plain `axum::routing::get`, and a `track_metrics` middleware recording
//! per-route latency/status. `jobs_total`/`job_duration_seconds`/
//! `active_workers`/`queue_size` are recorded at the call sites in
//! `job_broker::broker`; this module only builds the recorder and exposes
//! it.

use axum::extract::MatchedPath;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{body::Body, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

const DURATION_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new().set_buckets(DURATION_BUCKETS).expect("static bucket list is valid").install_recorder().expect("no recorder installed yet")
}

/// `GET /metrics`, rendering whatever the process has recorded so far.
pub fn router(handle: PrometheusHandle) -> Router {
    Router::new().route("/metrics", get(move || std::future::ready(handle.render())))
}

pub async fn track_http_metrics(req: Request<Body>, next: Next) -> impl IntoResponse {
    let start = Instant::now();
    let path = req.extensions().get::<MatchedPath>().map(|p| p.as_str().to_owned()).unwrap_or_else(|| req.uri().path().to_owned());
    let method = req.method().clone();

    let response = next.run(req).await;

    let latency = start.elapsed().as_secs_f64();
    let labels = [("method", method.to_string()), ("path", path), ("status", response.status().as_u16().to_string())];

    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_requests_duration_seconds", &labels).record(latency);

    response
}
