//! Stealth fetch service: drive a headless browser through anti-bot defenses,
//! extract structured metadata and Markdown from the rendered page, and
//! return the artifact synchronously or via a polled/subscribed/webhooked job.

pub mod config;
pub mod extractor;
pub mod fetch_engine;
pub mod fingerprint;
pub mod http;
pub mod job_broker;
pub mod metrics;
pub mod proxy;
pub mod webhook;

pub use config::Settings;
pub use extractor::{extract, Artifact, Metadata};
pub use fetch_engine::{FetchEngine, FetchError};
pub use job_broker::{Job, JobBroker, JobStatus};
pub use proxy::ProxyHealth;
