//! Per-host session-state persistence: the cookie jar survives across
//! fetches to the same host, written to `storage_dir/cookies_<host>.json`.
//!
//! Nothing else here persists session state across runs — there's no
//! notion of a returning visitor elsewhere — so this is built directly
//! against chromiumoxide's
//! `Page::get_cookies`/`set_cookies` CDP wrappers, one of the capabilities
//! required of any browser automation library here, rather than ported
//! from a corpus example.

use chromiumoxide::cdp::browser_protocol::network::{CookieParam, SetCookiesParams};
use chromiumoxide::Page;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
struct StoredCookie {
    name: String,
    value: String,
    domain: String,
    path: String,
    secure: bool,
    http_only: bool,
    expires: Option<f64>,
}

/// Load `storage_dir/cookies_<host>.json` into the page's cookie jar, if it
/// exists. Missing or unreadable files are treated as "no prior session".
pub async fn load(page: &Page, path: &Path) -> anyhow::Result<()> {
    let Ok(contents) = tokio::fs::read_to_string(path).await else {
        return Ok(());
    };
    let stored: Vec<StoredCookie> = match serde_json::from_str(&contents) {
        Ok(cookies) => cookies,
        Err(e) => {
            warn!(error = %e, path = %path.display(), "ignoring unreadable session state file");
            return Ok(());
        }
    };

    let params: Vec<CookieParam> = stored
        .into_iter()
        .filter_map(|c| {
            CookieParam::builder()
                .name(c.name)
                .value(c.value)
                .domain(c.domain)
                .path(c.path)
                .secure(c.secure)
                .http_only(c.http_only)
                .expires(c.expires)
                .build()
                .ok()
        })
        .collect();

    if !params.is_empty() {
        page.execute(SetCookiesParams::new(params)).await?;
    }
    Ok(())
}

/// Read the page's current cookie jar and write it to
/// `storage_dir/cookies_<host>.json`, overwriting any prior state.
pub async fn save(page: &Page, path: &Path) -> anyhow::Result<()> {
    let cookies = page.get_cookies().await?;
    let stored: Vec<StoredCookie> = cookies
        .into_iter()
        .map(|c| StoredCookie {
            name: c.name,
            value: c.value,
            domain: c.domain,
            path: c.path,
            secure: c.secure,
            http_only: c.http_only,
            expires: Some(c.expires),
        })
        .collect();

    let json = serde_json::to_string_pretty(&stored)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, json).await?;
    debug!(path = %path.display(), count = stored.len(), "wrote session state");
    Ok(())
}
