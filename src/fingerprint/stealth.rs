//! The stealth override script: a single pre-navigation-script injected via
//! `Page::evaluate_on_new_document` that makes the page-visible fingerprint
//! match the generated bundle and counters common automation tells.
//!
//! Grounded on `stealth_utils.py::FingerprintGenerator.get_stealth_script`,
//! restructured as one self-invoking function so no named globals are left
//! behind for a page script to discover.

use super::generator::Fingerprint;

/// Build the stealth script enforcing `fp`'s identity in the page context.
pub fn build_script(fp: &Fingerprint) -> String {
    format!(
        r#"(() => {{
    const define = (obj, prop, value) => {{
        Object.defineProperty(obj, prop, {{ get: () => value, configurable: true }});
    }};

    define(navigator, 'webdriver', undefined);
    define(navigator, 'languages', Object.freeze([{locale_json}, 'en']));
    define(navigator, 'platform', {platform_json});
    define(navigator, 'hardwareConcurrency', {hardware_concurrency});
    define(navigator, 'deviceMemory', {device_memory});

    const jitter = () => Math.floor(Math.random() * 10);
    define(window, 'screen', Object.freeze({{
        width: {screen_width} + jitter(),
        height: {screen_height} + jitter(),
        availWidth: {screen_width},
        availHeight: {screen_height},
        colorDepth: 24,
        pixelDepth: 24,
    }}));

    if (window.CanvasRenderingContext2D) {{
        const originalGetImageData = CanvasRenderingContext2D.prototype.getImageData;
        CanvasRenderingContext2D.prototype.getImageData = function (...args) {{
            const imageData = originalGetImageData.apply(this, args);
            for (let i = 0; i < imageData.data.length; i += 4) {{
                imageData.data[i] = imageData.data[i] + (Math.random() > 0.5 ? 1 : -1);
            }}
            return imageData;
        }};
    }}

    if (window.WebGLRenderingContext) {{
        const originalGetParameter = WebGLRenderingContext.prototype.getParameter;
        WebGLRenderingContext.prototype.getParameter = function (parameter) {{
            if (parameter === 37445) return 'Intel Inc.';
            if (parameter === 37446) return 'Intel(R) Iris(TM) Plus Graphics 640';
            return originalGetParameter.apply(this, [parameter]);
        }};
    }}

    if (window.AudioBuffer) {{
        const originalGetChannelData = AudioBuffer.prototype.getChannelData;
        AudioBuffer.prototype.getChannelData = function (...args) {{
            const channelData = originalGetChannelData.apply(this, args);
            for (let i = 0; i < channelData.length; i += 100) {{
                channelData[i] = channelData[i] + Math.random() * 1e-4;
            }}
            return channelData;
        }};
    }}

    if (navigator.getBattery) {{
        navigator.getBattery = () => Promise.resolve({{
            charging: true,
            chargingTime: 0,
            dischargingTime: Infinity,
            level: 0.9 + Math.random() * 0.1,
            addEventListener: () => {{}},
            removeEventListener: () => {{}},
            dispatchEvent: () => true,
        }});
    }}

    if (navigator.mediaDevices && navigator.mediaDevices.enumerateDevices) {{
        navigator.mediaDevices.enumerateDevices = () => Promise.resolve([
            {{ deviceId: 'default', kind: 'videoinput', label: 'FaceTime HD Camera', groupId: 'g1' }},
            {{ deviceId: 'default', kind: 'audioinput', label: 'Default Audio Input', groupId: 'g2' }},
            {{ deviceId: 'default', kind: 'audiooutput', label: 'Default Audio Output', groupId: 'g2' }},
        ]);
    }}
}})();"#,
        locale_json = serde_json::to_string(&fp.locale).unwrap_or_else(|_| "\"en-US\"".to_string()),
        platform_json = serde_json::to_string(&fp.platform).unwrap_or_else(|_| "\"Win32\"".to_string()),
        hardware_concurrency = fp.hardware_concurrency,
        device_memory = fp.device_memory,
        screen_width = fp.screen.width,
        screen_height = fp.screen.height,
    )
}
