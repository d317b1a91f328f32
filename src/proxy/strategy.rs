//! Proxy selection strategies.

use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Picks one proxy out of the currently-available subset.
pub trait ProxyStrategy: Send + Sync + std::fmt::Debug {
    fn pick<'a>(&self, available: &'a [String]) -> Option<&'a String>;
}

#[derive(Debug, Default)]
pub struct RoundRobin {
    index: AtomicUsize,
}

impl ProxyStrategy for RoundRobin {
    fn pick<'a>(&self, available: &'a [String]) -> Option<&'a String> {
        if available.is_empty() {
            return None;
        }
        let i = self.index.fetch_add(1, Ordering::Relaxed);
        available.get(i % available.len())
    }
}

#[derive(Debug, Default)]
pub struct Random;

impl ProxyStrategy for Random {
    fn pick<'a>(&self, available: &'a [String]) -> Option<&'a String> {
        if available.is_empty() {
            return None;
        }
        let i = rand::rng().random_range(0..available.len());
        available.get(i)
    }
}

/// Parse `PROXY_STRATEGY` into a concrete strategy, defaulting to round-robin
/// for any unrecognized value (matches `stealth_utils.py`'s `== "random"` check).
pub fn from_name(name: &str) -> Box<dyn ProxyStrategy> {
    if name.eq_ignore_ascii_case("random") {
        Box::new(Random)
    } else {
        Box::new(RoundRobin::default())
    }
}
