//! Single-navigation execution against a live page.
//!
//! [`NavigationDriver`] is the seam between the retry scheduler and the
//! browser engine: one navigation (or reload) per call, wait for a
//! readiness condition, report the outcome. Retry policy lives entirely
//! in the scheduler; the driver never retries.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::Page;
use tracing::debug;
use url::Url;

use crate::core::error::FetchError;
use crate::core::types::{NavigationOutcome, WaitCondition};

#[async_trait]
pub trait NavigationDriver: Send + Sync {
    /// Navigate the session's page to `url` and wait for `wait`, failing
    /// with `NavigationTimeout` if the condition is not reached in time.
    async fn navigate(
        &self,
        url: &Url,
        wait: WaitCondition,
        timeout: Duration,
    ) -> Result<NavigationOutcome, FetchError>;

    /// Reload the current page (not a fresh navigation — keeps any
    /// challenge cookies the page has accumulated).
    async fn reload(
        &self,
        wait: WaitCondition,
        timeout: Duration,
    ) -> Result<NavigationOutcome, FetchError>;

    /// Current document title, without navigating.
    async fn title(&self) -> Result<String, FetchError>;

    /// Current rendered HTML.
    async fn content(&self) -> Result<String, FetchError>;

    /// Best-effort wait until any of `selectors` matches. Returns whether
    /// one appeared before `timeout`; never fails.
    async fn wait_for_any_selector(&self, selectors: &[&str], timeout: Duration) -> bool;
}

/// Production driver speaking CDP through `chromiumoxide`.
pub struct CdpDriver {
    page: Page,
}

impl CdpDriver {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    async fn outcome(&self, requested: &Url, started: Instant) -> NavigationOutcome {
        let final_url = self
            .page
            .url()
            .await
            .ok()
            .flatten()
            .and_then(|u| Url::parse(&u).ok())
            .unwrap_or_else(|| requested.clone());
        let title = self
            .page
            .get_title()
            .await
            .ok()
            .flatten()
            .unwrap_or_default();
        NavigationOutcome {
            final_url,
            title,
            elapsed_ms: started.elapsed().as_millis() as u64,
            succeeded: true,
        }
    }

    async fn settle_if_requested(&self, wait: WaitCondition, timeout: Duration) {
        if wait == WaitCondition::NetworkSettled {
            // Inner cap: chatty pages (analytics beacons) never pin us to
            // the full navigation timeout.
            let cap = timeout.min(Duration::from_secs(8));
            wait_until_settled(&self.page, Duration::from_millis(1200), cap).await;
        }
    }
}

#[async_trait]
impl NavigationDriver for CdpDriver {
    async fn navigate(
        &self,
        url: &Url,
        wait: WaitCondition,
        timeout: Duration,
    ) -> Result<NavigationOutcome, FetchError> {
        let started = Instant::now();
        let navigation = async {
            self.page.goto(url.as_str()).await?.wait_for_navigation().await?;
            Ok::<(), chromiumoxide::error::CdpError>(())
        };
        match tokio::time::timeout(timeout, navigation).await {
            Err(_) => Err(FetchError::NavigationTimeout {
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
            Ok(Err(e)) => Err(FetchError::Navigation(e.to_string())),
            Ok(Ok(())) => {
                self.settle_if_requested(wait, timeout).await;
                Ok(self.outcome(url, started).await)
            }
        }
    }

    async fn reload(
        &self,
        wait: WaitCondition,
        timeout: Duration,
    ) -> Result<NavigationOutcome, FetchError> {
        let started = Instant::now();
        let current = self
            .page
            .url()
            .await
            .ok()
            .flatten()
            .and_then(|u| Url::parse(&u).ok())
            .ok_or_else(|| FetchError::Engine("no current URL to reload".to_string()))?;

        match tokio::time::timeout(timeout, self.page.reload()).await {
            Err(_) => Err(FetchError::NavigationTimeout {
                url: current.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
            Ok(Err(e)) => Err(FetchError::Navigation(e.to_string())),
            Ok(Ok(_)) => {
                self.settle_if_requested(wait, timeout).await;
                Ok(self.outcome(&current, started).await)
            }
        }
    }

    async fn title(&self) -> Result<String, FetchError> {
        Ok(self
            .page
            .get_title()
            .await
            .map_err(|e| FetchError::Engine(format!("read title: {e}")))?
            .unwrap_or_default())
    }

    async fn content(&self) -> Result<String, FetchError> {
        self.page
            .content()
            .await
            .map_err(|e| FetchError::Engine(format!("capture html: {e}")))
    }

    async fn wait_for_any_selector(&self, selectors: &[&str], timeout: Duration) -> bool {
        let selector_list = selectors.join(", ");
        let expr = format!(
            "document.querySelector({}) !== null",
            serde_json::Value::String(selector_list)
        );
        let started = Instant::now();
        loop {
            let found = self
                .page
                .evaluate(expr.as_str())
                .await
                .ok()
                .and_then(|v| v.into_value::<bool>().ok())
                .unwrap_or(false);
            if found {
                return true;
            }
            if started.elapsed() >= timeout {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }
}

/// Wait until the page network goes idle (no new resource entries for
/// `quiet` consecutively) or until `cap` elapses. Best-effort: polls
/// `performance.getEntriesByType("resource")` rather than CDP network
/// events, and degrades silently on pages that never go quiet.
async fn wait_until_settled(page: &Page, quiet: Duration, cap: Duration) {
    let poll = Duration::from_millis(250);
    let started = Instant::now();
    let mut last_count: u64 = 0;
    let mut stable_since = Instant::now();

    loop {
        if started.elapsed() >= cap {
            debug!("network settle: cap reached after {:?}", cap);
            return;
        }

        let count: u64 = page
            .evaluate("performance.getEntriesByType('resource').length")
            .await
            .ok()
            .and_then(|v| v.into_value::<serde_json::Value>().ok())
            .and_then(|j| j.as_u64())
            .unwrap_or(0);

        let ready: bool = page
            .evaluate("document.readyState")
            .await
            .ok()
            .and_then(|v| v.into_value::<serde_json::Value>().ok())
            .and_then(|j| j.as_str().map(|s| s == "complete"))
            .unwrap_or(false);

        if !ready || count != last_count {
            last_count = count;
            stable_since = Instant::now();
        } else if stable_since.elapsed() >= quiet {
            debug!(
                "network settle: idle after {}ms ({} resources)",
                started.elapsed().as_millis(),
                count
            );
            return;
        }

        tokio::time::sleep(poll).await;
    }
}
