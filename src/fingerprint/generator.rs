//! Coherent synthetic fingerprint bundles drawn from a finite platform
//! catalogue, grounded on `stealth_utils.py::FingerprintGenerator`.

use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

struct Platform {
    user_agents: &'static [&'static str],
    resolutions: &'static [Resolution],
    platform_name: &'static str,
}

const WINDOWS: Platform = Platform {
    user_agents: &[
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    ],
    resolutions: &[
        Resolution { width: 1920, height: 1080 },
        Resolution { width: 2560, height: 1440 },
    ],
    platform_name: "Win32",
};

const MACOS: Platform = Platform {
    user_agents: &[
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    ],
    resolutions: &[
        Resolution { width: 1440, height: 900 },
        Resolution { width: 2880, height: 1800 },
    ],
    platform_name: "MacIntel",
};

const PLATFORMS: &[Platform] = &[WINDOWS, MACOS];
const LOCALES: &[&str] = &["en-US", "en-GB"];
const TIMEZONES: &[&str] = &["America/New_York", "Europe/London", "America/Los_Angeles", "Asia/Tokyo"];
const SCALE_FACTORS: &[u8] = &[1, 2];
const HARDWARE_CONCURRENCIES: &[u32] = &[4, 8, 16];
const DEVICE_MEMORIES: &[u32] = &[8, 16, 32];

/// A cohesive synthetic browser identity: one OS family, one matching
/// user-agent, one matching resolution, plus independently-drawn locale,
/// timezone, and hardware characteristics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fingerprint {
    pub user_agent: String,
    pub viewport: Resolution,
    pub screen: Resolution,
    pub locale: String,
    pub timezone_id: String,
    pub device_scale_factor: u8,
    pub hardware_concurrency: u32,
    pub device_memory: u32,
    pub platform: String,
}

/// Draw a fresh, internally-consistent fingerprint bundle.
pub fn generate() -> Fingerprint {
    let mut rng = rand::rng();
    let platform = PLATFORMS.choose(&mut rng).expect("PLATFORMS is non-empty");
    let user_agent = (*platform.user_agents.choose(&mut rng).expect("non-empty")).to_string();
    let resolution = *platform.resolutions.choose(&mut rng).expect("non-empty");

    Fingerprint {
        user_agent,
        viewport: resolution,
        screen: resolution,
        locale: (*LOCALES.choose(&mut rng).expect("non-empty")).to_string(),
        timezone_id: (*TIMEZONES.choose(&mut rng).expect("non-empty")).to_string(),
        device_scale_factor: *SCALE_FACTORS.choose(&mut rng).expect("non-empty"),
        hardware_concurrency: *HARDWARE_CONCURRENCIES.choose(&mut rng).expect("non-empty"),
        device_memory: *DEVICE_MEMORIES.choose(&mut rng).expect("non-empty"),
        platform: platform.platform_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_bundle_is_internally_consistent() {
        for _ in 0..50 {
            let fp = generate();
            assert!(fp.platform == "Win32" || fp.platform == "MacIntel");
            if fp.platform == "Win32" {
                assert!(WINDOWS.user_agents.contains(&fp.user_agent.as_str()));
                assert!(WINDOWS.resolutions.contains(&fp.viewport));
            } else {
                assert!(MACOS.user_agents.contains(&fp.user_agent.as_str()));
                assert!(MACOS.resolutions.contains(&fp.viewport));
            }
            assert_eq!(fp.viewport, fp.screen);
        }
    }
}
