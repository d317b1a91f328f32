//! Per-domain pacing: one fetch per host at a time, spaced by
//! `MIN_DOMAIN_DELAY`.
//!
//! Grounded on `StealthScraper.last_fetch`'s dict-of-timestamps, adapted to
//! `dashmap` plus a per-entry `tokio::sync::Mutex` so the wait-then-stamp
//! sequence stays atomic per host without holding a global lock while
//! asleep.

use dashmap::DashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::info;

#[derive(Debug, Default)]
pub struct PacingMap {
    last_fetch: DashMap<String, Mutex<Option<Instant>>>,
}

impl PacingMap {
    pub fn new() -> Self {
        Self { last_fetch: DashMap::new() }
    }

    /// Block until `min_delay` has elapsed since the last dispatch to `host`,
    /// then stamp "now" before releasing, so the *next* caller's wait starts
    /// from this dispatch rather than from when it woke up.
    pub async fn wait_turn(&self, host: &str, min_delay: Duration) {
        let entry = self.last_fetch.entry(host.to_string()).or_insert_with(|| Mutex::new(None));
        let mut last = entry.lock().await;

        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < min_delay {
                let wait = min_delay - elapsed;
                info!(host, wait_ms = wait.as_millis() as u64, "pacing dispatch to host");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn serializes_same_host_with_minimum_gap() {
        let pacing = PacingMap::new();
        let delay = Duration::from_secs(10);

        pacing.wait_turn("example.com", delay).await;
        let t0 = Instant::now();

        pacing.wait_turn("example.com", delay).await;
        assert!(t0.elapsed() >= delay);
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_hosts_do_not_block_each_other() {
        let pacing = PacingMap::new();
        let delay = Duration::from_secs(10);

        pacing.wait_turn("a.example.com", delay).await;
        let t0 = Instant::now();
        pacing.wait_turn("b.example.com", delay).await;
        assert!(t0.elapsed() < delay);
    }
}
