//! Proxy rotation, failure tracking, and latency profiling.
//!
//! Grounded on `stealth_utils.py::ProxyManager`: round-robin/random rotation
//! over a pool, quarantine after 3 consecutive failures, a 10-sample latency
//! window. Adapted to the pack's lock-free-friendly idiom (`dashmap` for the
//! per-proxy records, a `parking_lot::Mutex` guarding the small quarantine
//! set) instead of Python's single-threaded dicts.

use dashmap::DashSet;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::{info, warn};

use super::strategy::{self, ProxyStrategy};

const QUARANTINE_THRESHOLD: u32 = 3;
const LATENCY_WINDOW: usize = 10;

#[derive(Debug, Default, Clone)]
struct ProxyRecord {
    consecutive_failures: u32,
    recent_latencies: VecDeque<f64>,
}

/// Tracks proxy health and hands out the next proxy to use per the
/// configured rotation strategy.
pub struct ProxyHealth {
    proxies: Vec<String>,
    strategy: Box<dyn ProxyStrategy>,
    quarantined: DashSet<String>,
    records: Mutex<std::collections::HashMap<String, ProxyRecord>>,
}

impl std::fmt::Debug for ProxyHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyHealth")
            .field("proxies", &self.proxies.len())
            .field("quarantined", &self.quarantined.len())
            .finish()
    }
}

impl ProxyHealth {
    pub fn new(proxies: Vec<String>, strategy_name: &str) -> Self {
        if !proxies.is_empty() {
            info!(count = proxies.len(), strategy = strategy_name, "loaded proxy pool");
        }
        Self {
            proxies,
            strategy: strategy::from_name(strategy_name),
            quarantined: DashSet::new(),
            records: Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Parse `PROXIES_FILE`, dropping malformed entries (anything that is not
    /// `http(s)://host:port`) with a warning, matching
    /// `stealth_utils.py::_validate_proxy`.
    pub fn load_proxies_file(path: &std::path::Path) -> Vec<String> {
        let Ok(contents) = std::fs::read_to_string(path) else {
            return Vec::new();
        };
        let lines: Vec<&str> = contents.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        let valid: Vec<String> = lines.iter().filter(|l| is_valid_proxy_url(l)).map(|l| l.to_string()).collect();
        if valid.len() < lines.len() {
            warn!(removed = lines.len() - valid.len(), "dropped invalid proxy URLs from pool");
        }
        valid
    }

    /// Returns one proxy using the configured strategy, drawn from the
    /// non-quarantined subset. If every proxy is quarantined (and at least
    /// one ever existed), clears the quarantine set and draws from the full
    /// pool.
    pub fn next(&self) -> Option<String> {
        if self.proxies.is_empty() {
            return None;
        }
        let mut available: Vec<String> = self
            .proxies
            .iter()
            .filter(|p| !self.quarantined.contains(*p))
            .cloned()
            .collect();

        if available.is_empty() {
            warn!("all proxies quarantined, resetting pool");
            self.quarantined.clear();
            available = self.proxies.clone();
        }

        self.strategy.pick(&available).cloned()
    }

    pub fn mark_bad(&self, proxy: &str) {
        let mut records = self.records.lock();
        let record = records.entry(proxy.to_string()).or_default();
        record.consecutive_failures += 1;
        if record.consecutive_failures >= QUARANTINE_THRESHOLD {
            warn!(proxy, "quarantining proxy after repeated failures");
            self.quarantined.insert(proxy.to_string());
        }
    }

    pub fn mark_good(&self, proxy: &str) {
        let mut records = self.records.lock();
        if let Some(record) = records.get_mut(proxy) {
            record.consecutive_failures = 0;
        }
        self.quarantined.remove(proxy);
    }

    pub fn record_latency(&self, proxy: &str, latency_ms: f64) {
        let mut records = self.records.lock();
        let record = records.entry(proxy.to_string()).or_default();
        record.recent_latencies.push_back(latency_ms);
        while record.recent_latencies.len() > LATENCY_WINDOW {
            record.recent_latencies.pop_front();
        }
    }

    #[cfg(test)]
    fn is_quarantined(&self, proxy: &str) -> bool {
        self.quarantined.contains(proxy)
    }
}

fn is_valid_proxy_url(s: &str) -> bool {
    match url::Url::parse(s) {
        Ok(u) => matches!(u.scheme(), "http" | "https") && u.host().is_some() && u.port().is_some(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn validates_proxy_urls() {
        assert!(is_valid_proxy_url("http://localhost:8080"));
        assert!(is_valid_proxy_url("https://proxy.example.com:3128"));
        assert!(!is_valid_proxy_url("ftp://localhost:21"));
        assert!(!is_valid_proxy_url("not a url"));
        assert!(!is_valid_proxy_url("http://localhost"));
    }

    #[test]
    fn quarantine_after_three_failures() {
        let health = ProxyHealth::new(vec!["http://p1:8080".into(), "http://p2:8080".into()], "round_robin");
        health.mark_bad("http://p1:8080");
        health.mark_bad("http://p1:8080");
        assert!(!health.is_quarantined("http://p1:8080"));
        health.mark_bad("http://p1:8080");
        assert!(health.is_quarantined("http://p1:8080"));

        // p1 excluded now; next() always returns p2.
        for _ in 0..4 {
            assert_eq!(health.next().as_deref(), Some("http://p2:8080"));
        }
    }

    #[test]
    fn full_pool_reset_when_all_quarantined() {
        let health = ProxyHealth::new(vec!["http://p1:8080".into()], "round_robin");
        for _ in 0..3 {
            health.mark_bad("http://p1:8080");
        }
        assert!(health.is_quarantined("http://p1:8080"));
        // only proxy ever existed -> pool resets and is handed back out
        assert_eq!(health.next().as_deref(), Some("http://p1:8080"));
    }

    #[test]
    fn mark_good_clears_failures_and_quarantine() {
        let health = ProxyHealth::new(vec!["http://p1:8080".into()], "round_robin");
        health.mark_bad("http://p1:8080");
        health.mark_bad("http://p1:8080");
        health.mark_bad("http://p1:8080");
        assert!(health.is_quarantined("http://p1:8080"));
        health.mark_good("http://p1:8080");
        assert!(!health.is_quarantined("http://p1:8080"));
    }

    #[test]
    fn latency_window_caps_at_ten() {
        let health = ProxyHealth::new(vec!["http://p1:8080".into()], "round_robin");
        for i in 0..15 {
            health.record_latency("http://p1:8080", i as f64);
        }
        let records = health.records.lock();
        let record = records.get("http://p1:8080").unwrap();
        assert_eq!(record.recent_latencies.len(), LATENCY_WINDOW);
        assert_eq!(record.recent_latencies.front(), Some(&5.0));
    }

    #[test]
    fn empty_pool_returns_none() {
        let health = ProxyHealth::new(vec![], "round_robin");
        assert!(health.next().is_none());
    }

    #[test]
    fn load_proxies_file_drops_malformed_entries() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        writeln!(file, "http://good1:8080").unwrap();
        writeln!(file, "not a url").unwrap();
        writeln!(file, "https://good2:3128").unwrap();
        writeln!(file, "ftp://bad:21").unwrap();
        writeln!(file).unwrap();

        let proxies = ProxyHealth::load_proxies_file(file.path());
        assert_eq!(proxies, vec!["http://good1:8080".to_string(), "https://good2:3128".to_string()]);
    }

    #[test]
    fn load_proxies_file_missing_path_is_empty() {
        let proxies = ProxyHealth::load_proxies_file(std::path::Path::new("/nonexistent/proxies.txt"));
        assert!(proxies.is_empty());
    }

    proptest! {
        /// "Proxy quarantine": `next()` only ever returns a proxy still in
        /// the configured pool, whatever subset happens to be quarantined.
        #[test]
        fn next_always_returns_a_member_of_the_configured_pool(
            pool in prop::collection::vec("[a-z]{3,8}", 1..6),
            draws in 1usize..20,
        ) {
            let urls: Vec<String> = pool.iter().map(|name| format!("http://{name}:8080")).collect();
            let health = ProxyHealth::new(urls.clone(), "round_robin");
            for _ in 0..draws {
                if let Some(picked) = health.next() {
                    prop_assert!(urls.contains(&picked));
                }
            }
        }

        /// Quarantining strictly fewer than 3 consecutive failures never
        /// removes a proxy from rotation ("Proxy quarantine").
        #[test]
        fn fewer_than_three_failures_never_quarantines(failures in 0u32..3) {
            let health = ProxyHealth::new(vec!["http://p1:8080".into()], "round_robin");
            for _ in 0..failures {
                health.mark_bad("http://p1:8080");
            }
            prop_assert!(!health.is_quarantined("http://p1:8080"));
        }
    }
}
