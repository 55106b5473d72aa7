//! Browser session lifetime management with `chromiumoxide`.
//!
//! One [`BrowsingSession`] wraps one launched browser process, its CDP
//! event-handler task, and one page. Sessions are never reused across
//! requests; `release()` is idempotent and safe on every exit path.

use std::path::Path;
use std::time::Duration;

use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::emulation::SetTimezoneOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    BlockPattern, EnableParams as NetworkEnableParams, SetBlockedUrLsParams,
    SetExtraHttpHeadersParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::core::error::FetchError;
use crate::session::profile::SessionProfile;

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan — finds package-manager installs on all platforms.
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    if let Ok(p) = std::env::var("CHROME_EXECUTABLE") {
        if Path::new(&p).exists() {
            return Some(p);
        }
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = ["google-chrome", "chromium", "chromium-browser", "chrome"];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/google-chrome",
            "/usr/local/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

/// Build a headless `BrowserConfig` presenting as `profile`.
///
/// Flags chosen for compatibility with CI / restricted environments
/// (`--no-sandbox`, `--disable-dev-shm-usage`) and to suppress the CDP
/// automation fingerprint (`--disable-blink-features=AutomationControlled`).
fn build_headless_config(exe: &str, profile: &SessionProfile) -> Result<BrowserConfig, FetchError> {
    BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width: profile.viewport_width,
            height: profile.viewport_height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(profile.viewport_width, profile.viewport_height)
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--disable-crash-reporter")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--hide-scrollbars")
        .arg("--mute-audio")
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--lang={}", profile.locale))
        .arg(format!("--user-agent={}", profile.user_agent))
        .build()
        .map_err(|e| FetchError::Launch(format!("browser config: {e}")))
}

/// Render the profile's blocklist entries into URLPattern constructor
/// strings for `Network.setBlockedURLs`. Host entries cover the host and
/// its subdomains on any scheme; extension entries (leading dot) match
/// that suffix anywhere in a path.
fn block_patterns(entries: &[String]) -> Vec<BlockPattern> {
    let mut patterns = Vec::with_capacity(entries.len() * 2);
    for entry in entries {
        if let Some(ext) = entry.strip_prefix('.') {
            patterns.push(BlockPattern::new(format!("*://*/*.{ext}*"), true));
        } else {
            patterns.push(BlockPattern::new(format!("*://{entry}/*"), true));
            patterns.push(BlockPattern::new(format!("*://*.{entry}/*"), true));
        }
    }
    patterns
}

/// One live browser process + page, exclusively owned by a single
/// orchestration run.
pub struct BrowsingSession {
    browser: Mutex<Option<Browser>>,
    handler_task: tokio::task::JoinHandle<()>,
    page: Page,
}

impl BrowsingSession {
    /// Launch a fresh browser and open one page configured per `profile`:
    /// extra headers, timezone override, blocked URL patterns, and the
    /// property-override init script applied before any page script runs.
    pub async fn launch(profile: &SessionProfile) -> Result<Self, FetchError> {
        let exe = find_chrome_executable().ok_or_else(|| {
            FetchError::Launch(
                "no browser found; install Chrome or Chromium, or set CHROME_EXECUTABLE"
                    .to_string(),
            )
        })?;

        let config = build_headless_config(&exe, profile)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| FetchError::Launch(format!("launch ({exe}): {e}")))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler event error: {e}");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| FetchError::Launch(format!("open page: {e}")))?;

        let session = Self {
            browser: Mutex::new(Some(browser)),
            handler_task,
            page,
        };

        if let Err(e) = session.apply_profile(profile).await {
            // Half-configured sessions must not leak.
            session.release().await;
            return Err(e);
        }

        info!(browser = %exe, "browsing session started");
        Ok(session)
    }

    async fn apply_profile(&self, profile: &SessionProfile) -> Result<(), FetchError> {
        self.page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(
                profile.override_script(),
            ))
            .await
            .map_err(|e| FetchError::Engine(format!("inject overrides: {e}")))?;

        self.page
            .execute(SetTimezoneOverrideParams::new(profile.timezone.clone()))
            .await
            .map_err(|e| FetchError::Engine(format!("timezone override: {e}")))?;

        let headers: serde_json::Map<String, serde_json::Value> = profile
            .extra_headers
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        self.page
            .execute(SetExtraHttpHeadersParams::new(
                chromiumoxide::cdp::browser_protocol::network::Headers::new(
                    serde_json::Value::Object(headers),
                ),
            ))
            .await
            .map_err(|e| FetchError::Engine(format!("extra headers: {e}")))?;

        if !profile.blocked_url_patterns.is_empty() {
            self.page
                .execute(NetworkEnableParams::default())
                .await
                .map_err(|e| FetchError::Engine(format!("network enable: {e}")))?;
            self.page
                .execute(SetBlockedUrLsParams {
                    url_patterns: Some(block_patterns(&profile.blocked_url_patterns)),
                })
                .await
                .map_err(|e| FetchError::Engine(format!("blocklist: {e}")))?;
        }

        Ok(())
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Close the browser process. Idempotent: the first call takes the
    /// handle, later calls are no-ops. Close failures are logged, never
    /// propagated — the response has already been determined by then.
    pub async fn release(&self) {
        let taken = self.browser.lock().await.take();
        if let Some(mut browser) = taken {
            if let Err(e) = browser.close().await {
                warn!("browser close error (non-fatal): {e}");
            }
            // Give the process a beat to exit before dropping the handler.
            let _ = tokio::time::timeout(Duration::from_secs(2), browser.wait()).await;
            self.handler_task.abort();
        }
    }
}

impl Drop for BrowsingSession {
    fn drop(&mut self) {
        // Backstop only; the orchestrator releases on every path. Drop
        // cannot await, so spawn the close when a runtime is available.
        // The handler task must keep driving the CDP websocket until the
        // close command resolves, so it is only aborted afterwards.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        if let Ok(mut guard) = self.browser.try_lock() {
            if let Some(mut browser) = guard.take() {
                warn!("browsing session dropped without release; closing in background");
                let handler = self.handler_task.abort_handle();
                handle.spawn(async move {
                    if let Err(e) = browser.close().await {
                        warn!("background browser close error (non-fatal): {e}");
                    }
                    let _ = tokio::time::timeout(Duration::from_secs(2), browser.wait()).await;
                    handler.abort();
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FetchOptions;

    #[test]
    fn block_patterns_use_url_pattern_syntax() {
        let profile = SessionProfile::from_options(&FetchOptions::default());
        let patterns = block_patterns(&profile.blocked_url_patterns);

        assert!(patterns.iter().all(|p| p.block));
        // Host entries match the host and its subdomains.
        assert!(patterns
            .iter()
            .any(|p| p.url_pattern == "*://doubleclick.net/*"));
        assert!(patterns
            .iter()
            .any(|p| p.url_pattern == "*://*.doubleclick.net/*"));
        // Extension entries match the suffix on any origin.
        assert!(patterns.iter().any(|p| p.url_pattern == "*://*/*.mp4*"));
        // No raw substring globs sneak through.
        assert!(patterns.iter().all(|p| !p.url_pattern.starts_with("*.")));
    }

    #[test]
    fn blocking_disabled_renders_no_patterns() {
        let profile = SessionProfile::from_options(&FetchOptions {
            block_heavy_resources: false,
            ..FetchOptions::default()
        });
        assert!(block_patterns(&profile.blocked_url_patterns).is_empty());
    }
}
