//! The Fetch Engine: one shared browser, multiplexed into isolated pages,
//! paced per host, fingerprinted per host, and classified into a fixed
//! error taxonomy.
//!
//! Grounded on `StealthScraper.fetch` (`original_source/src/core/
//! scraper.py`) for the state machine itself, and on
//! `browser_setup.rs`/`kromekover/mod.rs`/`crawl_engine/core.rs` for the
//! chromiumoxide idiom each step is expressed in.

mod browser;
mod pacing;
mod session;

use crate::config::Settings;
use crate::extractor::{self, Artifact};
use crate::fingerprint::{self, FingerprintCache};
use crate::proxy::ProxyHealth;
use chromiumoxide::cdp::browser_protocol::network::{EventResponseReceived, ResourceType};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::timeout;
use tracing::{info, warn};
use url::Url;

const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(60);
const SETTLE_JITTER_MIN: f64 = 1.5;
const SETTLE_JITTER_MAX: f64 = 3.0;
const TWEET_SELECTOR_TIMEOUT: Duration = Duration::from_secs(30);
const TWEET_SELECTOR_POLL: Duration = Duration::from_millis(250);
const TWEET_SELECTOR: &str = r#"[data-testid="tweetText"]"#;
const FINGERPRINT_TTL: Duration = Duration::from_secs(3600);

/// The classified outcome of one fetch attempt ("Error
/// classification"). `code()`/`retryable()` mirror the wire shape exactly.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no response from {host}")]
    NoResponse { host: String },
    #[error("HTTP {status} from {host}")]
    Http { host: String, status: u16 },
    #[error("timeout fetching {host}")]
    Timeout { host: String },
    #[error("error fetching {host}: {message}")]
    FetchError { host: String, message: String },
    #[error("no content captured from {host}")]
    NoContent { host: String },
    #[error("internal error: {0}")]
    Internal(String),
}

impl FetchError {
    pub fn code(&self) -> String {
        match self {
            FetchError::NoResponse { .. } => "no_response".to_string(),
            FetchError::Http { status, .. } => format!("http_{status}"),
            FetchError::Timeout { .. } => "timeout".to_string(),
            FetchError::FetchError { .. } => "fetch_error".to_string(),
            FetchError::NoContent { .. } => "no_content".to_string(),
            FetchError::Internal(_) => "internal_error".to_string(),
        }
    }

    pub fn retryable(&self) -> bool {
        match self {
            FetchError::NoResponse { .. }
            | FetchError::Timeout { .. }
            | FetchError::FetchError { .. }
            | FetchError::NoContent { .. } => true,
            FetchError::Http { status, .. } => matches!(status, 408 | 429 | 500 | 502 | 503 | 504),
            FetchError::Internal(_) => false,
        }
    }
}

struct BrowserSlot {
    handle: Option<browser::BrowserHandle>,
    requests_since_launch: u64,
}

/// Owns the shared browser, the concurrency gate, per-host pacing, the
/// fingerprint cache, and proxy health. Safe to call `fetch` concurrently
/// from multiple workers.
pub struct FetchEngine {
    settings: Settings,
    gate: Semaphore,
    restart_lock: Mutex<BrowserSlot>,
    pacing: pacing::PacingMap,
    fingerprints: FingerprintCache,
    proxies: Arc<ProxyHealth>,
}

impl FetchEngine {
    pub fn new(settings: Settings, proxies: Arc<ProxyHealth>) -> Self {
        let gate = Semaphore::new(settings.max_concurrent_browsers);
        Self {
            gate,
            restart_lock: Mutex::new(BrowserSlot { handle: None, requests_since_launch: 0 }),
            pacing: pacing::PacingMap::new(),
            fingerprints: FingerprintCache::new(FINGERPRINT_TTL),
            proxies,
            settings,
        }
    }

    /// `acquire-slot -> pace -> [maybe restart browser] -> build-context ->
    /// navigate -> (ok | classified-error) -> settle -> capture -> extract
    /// -> release-slot`, per its own state machine.
    pub async fn fetch(&self, url: &str) -> Result<Artifact, FetchError> {
        let _permit = self.gate.acquire().await.map_err(|e| FetchError::Internal(e.to_string()))?;

        let parsed = Url::parse(url).map_err(|e| FetchError::Internal(format!("invalid URL: {e}")))?;
        let host = parsed.host_str().ok_or_else(|| FetchError::Internal("URL has no host".into()))?.to_string();

        self.maybe_restart_browser().await?;
        self.pacing.wait_turn(&host, self.settings.min_domain_delay()).await;

        let fingerprint = self.fingerprints.get_or_generate(&host);
        let proxy = self.proxies.next();

        let slot = self.restart_lock.lock().await;
        let browser = &slot.handle.as_ref().expect("browser launched by maybe_restart_browser").browser;

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| FetchError::FetchError { host: host.clone(), message: e.to_string() })?;

        let script = fingerprint::build_script(&fingerprint);
        page.execute(AddScriptToEvaluateOnNewDocumentParams {
            source: script,
            include_command_line_api: None,
            world_name: None,
            run_immediately: None,
        })
        .await
        .map_err(|e| FetchError::FetchError { host: host.clone(), message: e.to_string() })?;

        page.execute(SetUserAgentOverrideParams {
            user_agent: fingerprint.user_agent.clone(),
            accept_language: Some(fingerprint.locale.clone()),
            platform: Some(fingerprint.platform.clone()),
            user_agent_metadata: None,
        })
        .await
        .map_err(|e| FetchError::FetchError { host: host.clone(), message: e.to_string() })?;

        let cookie_path = self.settings.cookie_path(&host);
        if let Err(e) = session::load(&page, &cookie_path).await {
            warn!(host, error = %e, "failed to load prior session state");
        }

        drop(slot);

        let dispatch_result = self.dispatch(&page, url, &host).await;

        match &dispatch_result {
            Ok(latency_ms) => {
                if let Some(proxy_url) = &proxy {
                    self.proxies.record_latency(proxy_url, *latency_ms);
                    self.proxies.mark_good(proxy_url);
                }
            }
            Err(_) => {
                if let Some(proxy_url) = &proxy {
                    self.proxies.mark_bad(proxy_url);
                }
            }
        }
        dispatch_result?;

        self.settle(&page, url, &host).await;

        let html = page.content().await.unwrap_or_default();

        if let Err(e) = session::save(&page, &cookie_path).await {
            warn!(host, error = %e, "failed to persist session state");
        }

        let _ = page.close().await;

        if html.is_empty() {
            return Err(FetchError::NoContent { host });
        }

        Ok(extractor::extract(&html))
    }

    /// Whether a browser is currently launched (`/health`'s
    /// `browser_connected`).
    pub async fn browser_launched(&self) -> bool {
        self.restart_lock.lock().await.handle.is_some()
    }

    /// Contexts currently in flight, out of `MAX_CONCURRENT_BROWSERS`
    /// (`/health`'s `active_browser_contexts`).
    pub fn permits_in_use(&self) -> usize {
        self.settings.max_concurrent_browsers.saturating_sub(self.gate.available_permits())
    }

    /// Ensure a browser is running; tear down and relaunch if the
    /// per-browser request budget has been exceeded.
    async fn maybe_restart_browser(&self) -> Result<(), FetchError> {
        let mut slot = self.restart_lock.lock().await;
        slot.requests_since_launch += 1;

        let needs_restart = slot.handle.is_none() || slot.requests_since_launch > self.settings.max_requests_per_browser;
        if needs_restart {
            if slot.handle.is_some() {
                info!("recycling browser after max requests reached");
            }
            slot.handle = None;
            let handle = browser::BrowserHandle::launch()
                .await
                .map_err(|e| FetchError::Internal(format!("launching browser: {e}")))?;
            slot.handle = Some(handle);
            slot.requests_since_launch = 1;
        }
        Ok(())
    }

    /// Navigate with a 60s budget and classify the outcome. Returns the
    /// navigation latency in milliseconds on success.
    async fn dispatch(&self, page: &chromiumoxide::Page, url: &str, host: &str) -> Result<f64, FetchError> {
        let start = std::time::Instant::now();

        let mut response_events = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| FetchError::Internal(format!("subscribing to response events: {e}")))?;

        let goto = timeout(NAVIGATION_TIMEOUT, page.goto(url)).await;

        let navigated = match goto {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                return Err(FetchError::FetchError { host: host.to_string(), message: e.to_string() });
            }
            Err(_) => return Err(FetchError::Timeout { host: host.to_string() }),
        };
        if !navigated {
            return Err(FetchError::NoResponse { host: host.to_string() });
        }

        let target_url_normalized = normalize_url_for_matching(url);

        let status = timeout(Duration::from_secs(1), async {
            while let Some(event) = response_events.next().await {
                if event.r#type != ResourceType::Document {
                    continue;
                }
                let response_url_normalized = normalize_url_for_matching(&event.response.url);
                if response_url_normalized.is_some() && response_url_normalized == target_url_normalized {
                    return Some(event.response.status);
                }
            }
            None
        })
        .await
        .ok()
        .flatten();

        match status {
            None => Err(FetchError::NoResponse { host: host.to_string() }),
            Some(status) if status >= 400 => {
                let status = status as u16;
                Err(FetchError::Http { host: host.to_string(), status })
            }
            Some(_) => Ok(start.elapsed().as_secs_f64() * 1000.0),
        }
    }

    /// Human-like jitter, plus the x.com/twitter.com tweet-selector special
    /// case ("Post-navigation settle").
    async fn settle(&self, page: &chromiumoxide::Page, url: &str, host: &str) {
        let jitter = rand::random::<f64>() * (SETTLE_JITTER_MAX - SETTLE_JITTER_MIN) + SETTLE_JITTER_MIN;
        tokio::time::sleep(Duration::from_secs_f64(jitter)).await;

        if url.contains("x.com") || url.contains("twitter.com") {
            let found = timeout(TWEET_SELECTOR_TIMEOUT, async {
                loop {
                    if page.find_element(TWEET_SELECTOR).await.is_ok() {
                        return;
                    }
                    tokio::time::sleep(TWEET_SELECTOR_POLL).await;
                }
            })
            .await
            .is_ok();

            if found {
                let _ = page.evaluate("window.scrollBy(0, 500)").await;
                tokio::time::sleep(Duration::from_secs(2)).await;
            } else {
                warn!(host, "tweet selector timeout, continuing anyway");
            }
        }
    }
}

/// Normalize a URL for matching the navigated-to URL against the Document
/// response CDP reports for it: strip fragment/query and trailing slash,
/// lowercase the host, keep the scheme (http and https stay distinct).
/// Chrome reports the main-document response URL in normalized form (e.g.
/// a trailing slash added), so a raw string comparison against the
/// submitted URL never matches.
fn normalize_url_for_matching(url_str: &str) -> Option<String> {
    let parsed = Url::parse(url_str).ok()?;
    let scheme = parsed.scheme();
    let host = parsed.host_str()?.to_lowercase();
    let path = parsed.path().trim_end_matches('/');
    let normalized_path = if path.is_empty() { "/" } else { path };
    Some(format!("{scheme}://{host}{normalized_path}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_and_retryability_are_correct() {
        assert_eq!(FetchError::NoResponse { host: "h".into() }.code(), "no_response");
        assert!(FetchError::NoResponse { host: "h".into() }.retryable());

        assert_eq!(FetchError::Http { host: "h".into(), status: 404 }.code(), "http_404");
        assert!(!FetchError::Http { host: "h".into(), status: 404 }.retryable());

        for status in [408, 429, 500, 502, 503, 504] {
            assert!(FetchError::Http { host: "h".into(), status }.retryable(), "{status} should be retryable");
        }
        for status in [400, 401, 403, 404, 410] {
            assert!(!FetchError::Http { host: "h".into(), status }.retryable(), "{status} should not be retryable");
        }

        assert!(FetchError::Timeout { host: "h".into() }.retryable());
        assert!(FetchError::FetchError { host: "h".into(), message: "x".into() }.retryable());
        assert!(FetchError::NoContent { host: "h".into() }.retryable());
        assert!(!FetchError::Internal("x".into()).retryable());
        assert_eq!(FetchError::Internal("x".into()).code(), "internal_error");
    }

    #[test]
    fn normalize_matches_a_trailing_slash_redirect() {
        assert_eq!(normalize_url_for_matching("https://example.com"), normalize_url_for_matching("https://example.com/"));
    }

    #[test]
    fn normalize_ignores_query_and_fragment() {
        let base = normalize_url_for_matching("https://example.com/page");
        assert_eq!(base, normalize_url_for_matching("https://example.com/page?utm=x"));
        assert_eq!(base, normalize_url_for_matching("https://example.com/page#section"));
    }

    #[test]
    fn normalize_is_case_insensitive_on_host() {
        assert_eq!(normalize_url_for_matching("https://Example.com/page"), normalize_url_for_matching("https://example.com/page"));
    }

    #[test]
    fn normalize_keeps_scheme_distinct() {
        assert_ne!(normalize_url_for_matching("http://example.com/page"), normalize_url_for_matching("https://example.com/page"));
    }

    #[test]
    fn normalize_rejects_unparseable_urls() {
        assert!(normalize_url_for_matching("not a url").is_none());
    }
}
