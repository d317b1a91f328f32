//! Shared helpers for spinning up a real instance of the HTTP surface
//! against an in-memory store, grounded on `feature-flags/tests/common/
//! mod.rs`'s `ServerHandle` (bind an ephemeral port, `tokio::spawn` the
//! server, drive it with a real `reqwest::Client`).

use covertfetch::config::Settings;
use covertfetch::fetch_engine::FetchEngine;
use covertfetch::http::{self, AppState};
use covertfetch::job_broker::{JobBroker, Store};
use covertfetch::proxy::ProxyHealth;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::net::TcpListener;

/// `PrometheusBuilder::install_recorder` sets a process-global recorder and
/// panics if called twice; every test in this binary shares one instead of
/// installing its own.
fn metrics_handle() -> metrics_exporter_prometheus::PrometheusHandle {
    static HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();
    HANDLE.get_or_init(covertfetch::metrics::install_recorder).clone()
}

#[allow(dead_code)]
pub fn test_settings() -> Settings {
    Settings {
        host: "127.0.0.1".into(),
        port: 0,
        max_concurrent_browsers: 2,
        min_domain_delay_secs: 10,
        max_requests_per_browser: 50,
        max_retries: 3,
        github_repo: String::new(),
        database_url: "sqlite::memory:".into(),
        storage_dir: "storage".into(),
        job_ttl_seconds: 86400,
        sync_timeout_default: 120.0,
        max_sync_timeout: 300.0,
        proxies_file: "proxies.txt".into(),
        proxy_strategy: "round_robin".into(),
        requeue_abandoned_on_start: false,
    }
}

pub struct ServerHandle {
    pub addr: SocketAddr,
    pub broker: Arc<JobBroker>,
}

impl ServerHandle {
    /// Binds an ephemeral port and spawns the full axum router, backed by a
    /// fresh in-memory sqlite store. Workers are never started, so no real
    /// browser is ever launched — submitted jobs stay `queued`.
    pub async fn start() -> ServerHandle {
        let settings = test_settings();
        let proxies = Arc::new(ProxyHealth::new(Vec::new(), &settings.proxy_strategy));
        let engine = Arc::new(FetchEngine::new(settings.clone(), proxies));
        let store = Store::connect(&settings.database_url).await.expect("in-memory store connects");
        let broker = Arc::new(JobBroker::new(settings.clone(), store, engine.clone()));

        let state = AppState { broker: broker.clone(), engine, settings };
        let app = http::router(state, metrics_handle());

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("binds an ephemeral port");
        let addr = listener.local_addr().expect("listener has a local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("server exits cleanly on test drop");
        });

        ServerHandle { addr, broker }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}
