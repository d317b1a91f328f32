//! Environment-driven configuration.
//!
//! Mirrors the service's env-var surface field for field. Grounded on
//! the pack's `hook-worker`/`hook-api` config structs: an `envconfig` derive
//! rather than a hand-rolled `std::env::var` parser.

use envconfig::Envconfig;
use std::path::PathBuf;

#[derive(Envconfig, Clone, Debug)]
pub struct Settings {
    #[envconfig(from = "HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "PORT", default = "8000")]
    pub port: u16,

    #[envconfig(from = "MAX_CONCURRENT_BROWSERS", default = "2")]
    pub max_concurrent_browsers: usize,

    #[envconfig(from = "MIN_DOMAIN_DELAY", default = "10")]
    pub min_domain_delay_secs: u64,

    #[envconfig(from = "MAX_REQUESTS_PER_BROWSER", default = "50")]
    pub max_requests_per_browser: u64,

    #[envconfig(from = "MAX_RETRIES", default = "3")]
    pub max_retries: u32,

    #[envconfig(from = "GITHUB_REPO", default = "")]
    pub github_repo: String,

    #[envconfig(from = "DATABASE_URL", default = "sqlite://./storage/jobs.db")]
    pub database_url: String,

    #[envconfig(from = "STORAGE_DIR", default = "storage")]
    pub storage_dir: String,

    #[envconfig(from = "JOB_TTL_SECONDS", default = "86400")]
    pub job_ttl_seconds: u64,

    #[envconfig(from = "SYNC_TIMEOUT_DEFAULT", default = "120.0")]
    pub sync_timeout_default: f64,

    #[envconfig(from = "MAX_SYNC_TIMEOUT", default = "300.0")]
    pub max_sync_timeout: f64,

    #[envconfig(from = "PROXIES_FILE", default = "proxies.txt")]
    pub proxies_file: String,

    #[envconfig(from = "PROXY_STRATEGY", default = "round_robin")]
    pub proxy_strategy: String,

    /// Whether jobs abandoned in `processing` at the last crash are
    /// resurfaced as `queued` on startup.
    /// The original source does not requeue them; default preserves that.
    #[envconfig(from = "REQUEUE_ABANDONED_ON_START", default = "false")]
    pub requeue_abandoned_on_start: bool,
}

impl Settings {
    pub fn storage_path(&self) -> PathBuf {
        PathBuf::from(&self.storage_dir)
    }

    pub fn cookie_path(&self, host: &str) -> PathBuf {
        self.storage_path().join(format!("cookies_{host}.json"))
    }

    pub fn min_domain_delay(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.min_domain_delay_secs)
    }

    pub fn job_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.job_ttl_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helper_methods_use_configured_values() {
        let settings = Settings {
            host: "0.0.0.0".into(),
            port: 8000,
            max_concurrent_browsers: 2,
            min_domain_delay_secs: 10,
            max_requests_per_browser: 50,
            max_retries: 3,
            github_repo: String::new(),
            database_url: "sqlite://./storage/jobs.db".into(),
            storage_dir: "storage".into(),
            job_ttl_seconds: 86400,
            sync_timeout_default: 120.0,
            max_sync_timeout: 300.0,
            proxies_file: "proxies.txt".into(),
            proxy_strategy: "round_robin".into(),
            requeue_abandoned_on_start: false,
        };
        assert_eq!(settings.cookie_path("example.com"), PathBuf::from("storage/cookies_example.com.json"));
        assert_eq!(settings.min_domain_delay(), std::time::Duration::from_secs(10));
    }
}
