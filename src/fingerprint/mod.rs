//! Fingerprint generation, stealth script rendering, and the per-host
//! fingerprint cache.
//!
//! Repeat visits to the same host within the cache TTL present the same
//! browser identity, even across workers. The cache is owned here (not in
//! `fetch_engine`) because it is pure in-memory
//! bookkeeping with no browser/session dependency, mirroring
//! `stealth_utils.py`'s `domain_fingerprints` dict living on the scraper
//! instance rather than on any single browser context.

mod generator;
mod stealth;

pub use generator::{generate, Fingerprint, Resolution};
pub use stealth::build_script;

use dashmap::DashMap;
use std::time::{Duration, Instant};

struct CacheEntry {
    fingerprint: Fingerprint,
    expires_at: Instant,
}

/// Per-host cache handing back a sticky fingerprint within `ttl` of first
/// use, and a freshly generated one afterward.
#[derive(Debug)]
pub struct FingerprintCache {
    ttl: Duration,
    entries: DashMap<String, CacheEntry>,
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry").field("platform", &self.fingerprint.platform).finish()
    }
}

impl FingerprintCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: DashMap::new() }
    }

    /// Returns the cached fingerprint for `host` if still fresh, generating
    /// and caching a new one otherwise.
    pub fn get_or_generate(&self, host: &str) -> Fingerprint {
        if let Some(entry) = self.entries.get(host) {
            if entry.expires_at > Instant::now() {
                return entry.fingerprint.clone();
            }
        }
        let fingerprint = generate();
        self.entries.insert(
            host.to_string(),
            CacheEntry { fingerprint: fingerprint.clone(), expires_at: Instant::now() + self.ttl },
        );
        fingerprint
    }
}
