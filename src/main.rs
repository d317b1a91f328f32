//! Process entry point: wires config, logging, the job store, the fetch
//! engine, the job broker, and the HTTP surface together.
//!
//! Grounded on `feature-flags/src/main.rs`'s `envconfig` + `tracing_subscriber`
//! + graceful-shutdown bootstrap, adapted with a `tracing_appender` rotating
//! file layer (logging through its daemon host process rather than owning a
//! log file itself wouldn't fit a standalone binary) and a `--once <url>`
//! standalone-fetch branch for operators who just want one artifact printed
//! without standing up the server.

use covertfetch::config::Settings;
use covertfetch::fetch_engine::FetchEngine;
use covertfetch::http::{self, AppState};
use covertfetch::job_broker::{JobBroker, Store};
use covertfetch::proxy::ProxyHealth;
use envconfig::Envconfig;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

async fn shutdown_signal() {
    let ctrl_c = async { signal::ctrl_c().await.expect("failed to install SIGINT handler") };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate()).expect("failed to install SIGTERM handler").recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutting down gracefully; workers finish in-flight attempts, processing jobs stay processing");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::init_from_env()?;
    std::fs::create_dir_all(settings.storage_path())?;

    let file_appender = tracing_appender::rolling::daily(settings.storage_path(), "scraper.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
        .with(tracing_subscriber::fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();

    let mut args = std::env::args().skip(1);
    if args.next().as_deref() == Some("--once") {
        let url = args.next().ok_or_else(|| anyhow::anyhow!("--once requires a URL argument"))?;
        let proxies = Arc::new(ProxyHealth::new(ProxyHealth::load_proxies_file(std::path::Path::new(&settings.proxies_file)), &settings.proxy_strategy));
        let engine = FetchEngine::new(settings, proxies);
        let artifact = engine.fetch(&url).await?;
        println!("{}", serde_json::to_string_pretty(&artifact)?);
        return Ok(());
    }

    let addr = format!("{}:{}", settings.host, settings.port);
    let proxies = Arc::new(ProxyHealth::new(ProxyHealth::load_proxies_file(std::path::Path::new(&settings.proxies_file)), &settings.proxy_strategy));
    let engine = Arc::new(FetchEngine::new(settings.clone(), proxies));
    let store = Store::connect(&settings.database_url).await?;
    let broker = Arc::new(JobBroker::new(settings.clone(), store, engine.clone()));

    broker.requeue_abandoned().await?;
    broker.start();

    let metrics_handle = covertfetch::metrics::install_recorder();
    let state = AppState { broker, engine, settings: settings.clone() };
    let app = http::router(state, metrics_handle);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "covertfetch listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}
