//! The challenge-aware page retrieval orchestrator.
//!
//! One call to [`fetch_rendered`] owns one browsing session for its whole
//! life: validate → launch → scheduler run (under a hard total budget) →
//! readiness gate → snapshot → release. Release happens on every exit
//! path through a single release point, and is idempotent below that.

pub mod detector;
pub mod driver;
pub mod readiness;
pub mod scheduler;

use std::time::Instant;

use async_trait::async_trait;
use tracing::info;
use url::Url;

use crate::core::error::FetchError;
use crate::core::types::{
    ChallengeState, FetchOptions, FetchRequest, FetchResult, NavigationOutcome,
};
use crate::core::AppState;
use crate::orchestrator::detector::ChallengeDetector;
use crate::orchestrator::driver::{CdpDriver, NavigationDriver};
use crate::orchestrator::scheduler::{RetryPolicy, RetryScheduler};
use crate::session::{BrowsingSession, SessionProfile};

/// Anything holding an expensive live resource the run must give back.
#[async_trait]
pub trait SessionHandle: Send + Sync {
    async fn release(&self);
}

#[async_trait]
impl SessionHandle for BrowsingSession {
    async fn release(&self) {
        BrowsingSession::release(self).await;
    }
}

/// Everything the assembler needs from a finished (or exhausted) run.
#[derive(Debug)]
pub struct RenderedPage {
    pub navigation: NavigationOutcome,
    pub challenge: ChallengeState,
    pub html: String,
    pub content_verified: bool,
}

/// Run the retrieval pipeline against `driver`, then release `session` —
/// the one place release happens, regardless of which branch exits.
pub async fn execute_with<D, S>(
    session: &S,
    driver: &D,
    detector: &ChallengeDetector,
    target: &Url,
    options: &FetchOptions,
) -> Result<RenderedPage, FetchError>
where
    D: NavigationDriver + ?Sized,
    S: SessionHandle + ?Sized,
{
    let result = execute(driver, detector, target, options).await;
    session.release().await;
    result
}

async fn execute<D: NavigationDriver + ?Sized>(
    driver: &D,
    detector: &ChallengeDetector,
    target: &Url,
    options: &FetchOptions,
) -> Result<RenderedPage, FetchError> {
    let policy = RetryPolicy::from_options(options);
    let budget = policy.total_budget();
    let warmup = options.warmup_for(target);
    let scheduler = RetryScheduler::new(detector, policy);

    // Hard ceiling: even if every step almost-but-not-quite times out, the
    // run cannot exceed the documented budget formula.
    let sched = tokio::time::timeout(budget, scheduler.run(driver, target, warmup.as_ref()))
        .await
        .map_err(|_| FetchError::NavigationTimeout {
            url: target.to_string(),
            timeout_ms: budget.as_millis() as u64,
        })??;

    let content_verified = readiness::content_ready(driver).await;
    let html = driver.content().await?;

    info!(
        challenge = sched.challenge.as_str(),
        navigations = sched.navigation_calls,
        classifications = sched.classify_calls,
        html_len = html.len(),
        content_verified,
        "retrieval run finished"
    );

    Ok(RenderedPage {
        navigation: sched.navigation,
        challenge: sched.challenge,
        html,
        content_verified,
    })
}

/// Full per-request pipeline. The request URL was validated at
/// construction; fatal errors bubble up typed so the handler can map them
/// to 400/500/502, and the session never outlives the call either way.
pub async fn fetch_rendered(
    state: &AppState,
    request: FetchRequest,
) -> Result<FetchResult, FetchError> {
    let started = Instant::now();
    let FetchRequest {
        target_url,
        options,
    } = request;

    // Backpressure: queue here instead of spawning unbounded browsers.
    let _permit = state
        .session_limit
        .acquire()
        .await
        .map_err(|_| FetchError::Engine("service shutting down".to_string()))?;

    let profile = SessionProfile::from_options(&options);
    let session = BrowsingSession::launch(&profile).await?;
    let driver = CdpDriver::new(session.page().clone());

    let rendered = execute_with(&session, &driver, &state.detector, &target_url, &options).await?;
    Ok(assemble(&target_url, rendered, started.elapsed().as_millis() as u64))
}

/// Package the final snapshot. Always well-formed; `Exhausted` is a
/// degraded success, not an error.
fn assemble(target: &Url, rendered: RenderedPage, timing_ms: u64) -> FetchResult {
    FetchResult {
        ok: true,
        url: target.to_string(),
        final_url: rendered.navigation.final_url.to_string(),
        title: rendered.navigation.title,
        html_len: rendered.html.len(),
        html: rendered.html,
        timing_ms,
        challenge: rendered.challenge.as_str().to_string(),
        content_verified: rendered.content_verified,
        fetched_at: chrono::Utc::now().to_rfc3339(),
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assemble_marks_exhausted_as_ok() {
        let target = Url::parse("https://example.com/page").unwrap();
        let rendered = RenderedPage {
            navigation: NavigationOutcome {
                final_url: target.clone(),
                title: "Just a moment...".to_string(),
                elapsed_ms: 1200,
                succeeded: true,
            },
            challenge: ChallengeState::Exhausted,
            html: "<html><body>interstitial</body></html>".to_string(),
            content_verified: false,
        };
        let result = assemble(&target, rendered, 4200);
        assert!(result.ok);
        assert_eq!(result.challenge, "exhausted");
        assert_eq!(result.html_len, result.html.len());
        assert_eq!(result.timing_ms, 4200);
        assert!(result.error.is_none());
    }
}
