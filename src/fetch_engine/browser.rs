//! Browser process lifecycle: launch, stealth-hardened configuration, and
//! teardown.
//!
//! Grounded on `browser_setup.rs::launch_browser` (find-or-fetch executable,
//! `BrowserConfigBuilder` with the stealth `--disable-*` argument set) and
//! `browser_pool::PooledBrowserWrapper`'s RAII pattern (`Drop` aborts the
//! CDP event-handler task). Trimmed to one browser instance — no pool, no
//! auto-scaling — since the engine shares a single browser, recycled in
//! place, rather than drawing from a warm pool.

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use futures::StreamExt;
use std::path::PathBuf;
use tokio::task::{self, JoinHandle};
use tracing::{error, info, trace, warn};

const STEALTH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--disable-notifications",
    "--disable-dev-shm-usage",
    "--disable-browser-side-navigation",
    "--disable-software-rasterizer",
    "--disable-setuid-sandbox",
    "--no-first-run",
    "--no-default-browser-check",
    "--no-sandbox",
    "--disable-extensions",
    "--disable-popup-blocking",
    "--disable-background-networking",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-breakpad",
    "--disable-hang-monitor",
    "--disable-ipc-flooding-protection",
    "--disable-prompt-on-repost",
    "--metrics-recording-only",
    "--password-store=basic",
    "--use-mock-keychain",
    "--hide-scrollbars",
    "--mute-audio",
    "--use-fake-ui-for-media-stream",
    "--use-fake-device-for-media-stream",
];

async fn find_browser_executable() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CHROMIUM_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
        warn!(path = %path.display(), "CHROMIUM_PATH does not exist");
    }

    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &["/Applications/Google Chrome.app/Contents/MacOS/Google Chrome", "/Applications/Chromium.app/Contents/MacOS/Chromium"]
    } else if cfg!(target_os = "windows") {
        &[r"C:\Program Files\Google\Chrome\Application\chrome.exe", r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"]
    } else {
        &["/usr/bin/google-chrome", "/usr/bin/google-chrome-stable", "/usr/bin/chromium", "/usr/bin/chromium-browser"]
    };

    for candidate in candidates {
        let path = PathBuf::from(candidate);
        if path.exists() {
            return Some(path);
        }
    }
    None
}

async fn download_managed_browser() -> Result<PathBuf> {
    let cache_dir = std::env::temp_dir().join("covertfetch_chrome_cache");
    std::fs::create_dir_all(&cache_dir).context("creating browser cache dir")?;

    let fetcher = BrowserFetcher::new(
        BrowserFetcherOptions::builder().with_path(&cache_dir).build().context("building fetcher options")?,
    );
    let revision = fetcher.fetch().await.context("downloading managed Chromium")?;
    Ok(revision.executable_path)
}

/// A launched browser, the task draining its CDP event stream, and the
/// scratch profile directory it owns. Dropping this aborts the handler task
/// and removes the profile directory.
pub struct BrowserHandle {
    pub browser: Browser,
    handler_task: JoinHandle<()>,
    user_data_dir: PathBuf,
}

impl BrowserHandle {
    pub async fn launch() -> Result<Self> {
        let executable = match find_browser_executable().await {
            Some(path) => path,
            None => download_managed_browser().await?,
        };

        let user_data_dir = std::env::temp_dir().join(format!("covertfetch_profile_{}", std::process::id()));
        std::fs::create_dir_all(&user_data_dir).context("creating browser profile dir")?;

        let mut builder = BrowserConfigBuilder::default()
            .headless_mode(HeadlessMode::default())
            .window_size(1920, 1080)
            .user_data_dir(user_data_dir.clone())
            .chrome_executable(executable);

        for arg in STEALTH_ARGS {
            builder = builder.arg(*arg);
        }

        let config = builder.build().map_err(|e| anyhow::anyhow!("building browser config: {e}"))?;

        info!("launching browser");
        let (browser, mut handler) = Browser::launch(config).await.context("launching browser")?;

        let handler_task = task::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    let msg = e.to_string();
                    let benign = msg.contains("did not match any variant of untagged enum Message")
                        || msg.contains("Failed to deserialize WS response");
                    if benign {
                        trace!(error = %msg, "suppressed benign CDP event deserialization error");
                    } else {
                        error!(error = %msg, "browser event handler error");
                    }
                }
            }
        });

        Ok(Self { browser, handler_task, user_data_dir })
    }
}

impl Drop for BrowserHandle {
    fn drop(&mut self) {
        self.handler_task.abort();
        if let Err(e) = std::fs::remove_dir_all(&self.user_data_dir) {
            warn!(error = %e, dir = %self.user_data_dir.display(), "failed to clean up browser profile dir");
        }
    }
}
