//! Retry scheduler scenarios against a scripted fake driver: no browser,
//! no network, deterministic title streams.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use clearfetch::core::error::FetchError;
use clearfetch::core::types::{ChallengeState, FetchOptions, NavigationOutcome, WaitCondition};
use clearfetch::orchestrator::detector::ChallengeDetector;
use clearfetch::orchestrator::driver::NavigationDriver;
use clearfetch::orchestrator::scheduler::{RetryPolicy, RetryScheduler};
use clearfetch::orchestrator::{execute_with, SessionHandle};

/// Driver that serves titles from a script. Every observation (navigation
/// outcome or title read) consumes the next entry; the last entry repeats
/// once the script runs out.
struct FakeDriver {
    titles: Mutex<Vec<String>>,
    last_title: Mutex<String>,
    navigate_calls: AtomicU32,
    reload_calls: AtomicU32,
    fail_navigation: bool,
    fail_title_reads: bool,
}

impl FakeDriver {
    fn scripted(titles: &[&str]) -> Self {
        Self {
            titles: Mutex::new(titles.iter().map(|s| s.to_string()).collect()),
            last_title: Mutex::new(String::new()),
            navigate_calls: AtomicU32::new(0),
            reload_calls: AtomicU32::new(0),
            fail_navigation: false,
            fail_title_reads: false,
        }
    }

    fn failing() -> Self {
        let mut d = Self::scripted(&["never seen"]);
        d.fail_navigation = true;
        d
    }

    fn with_failing_title_reads(titles: &[&str]) -> Self {
        let mut d = Self::scripted(titles);
        d.fail_title_reads = true;
        d
    }

    fn next_title(&self) -> String {
        let mut queue = self.titles.lock().unwrap();
        let title = match queue.len() {
            0 => self.last_title.lock().unwrap().clone(),
            1 => queue[0].clone(),
            _ => queue.remove(0),
        };
        *self.last_title.lock().unwrap() = title.clone();
        title
    }

    fn outcome(&self, url: &Url) -> NavigationOutcome {
        NavigationOutcome {
            final_url: url.clone(),
            title: self.next_title(),
            elapsed_ms: 5,
            succeeded: true,
        }
    }

    fn total_navigations(&self) -> u32 {
        self.navigate_calls.load(Ordering::SeqCst) + self.reload_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NavigationDriver for FakeDriver {
    async fn navigate(
        &self,
        url: &Url,
        _wait: WaitCondition,
        timeout: Duration,
    ) -> Result<NavigationOutcome, FetchError> {
        self.navigate_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_navigation {
            return Err(FetchError::NavigationTimeout {
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        Ok(self.outcome(url))
    }

    async fn reload(
        &self,
        _wait: WaitCondition,
        timeout: Duration,
    ) -> Result<NavigationOutcome, FetchError> {
        self.reload_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_navigation {
            return Err(FetchError::NavigationTimeout {
                url: "about:blank".to_string(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        Ok(self.outcome(&Url::parse("https://example.com/page").unwrap()))
    }

    async fn title(&self) -> Result<String, FetchError> {
        if self.fail_title_reads {
            return Err(FetchError::Engine("read title: connection reset".to_string()));
        }
        Ok(self.next_title())
    }

    async fn content(&self) -> Result<String, FetchError> {
        Ok(format!(
            "<html><head><title>{}</title></head><body>body</body></html>",
            self.last_title.lock().unwrap()
        ))
    }

    async fn wait_for_any_selector(&self, _selectors: &[&str], _timeout: Duration) -> bool {
        true
    }
}

struct FakeSession {
    releases: AtomicU32,
}

impl FakeSession {
    fn new() -> Self {
        Self {
            releases: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl SessionHandle for FakeSession {
    async fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Zero-delay policy so tests never sleep.
fn instant_policy(max_challenge_retries: u32) -> RetryPolicy {
    RetryPolicy {
        navigation_timeout: Duration::from_secs(1),
        max_challenge_retries,
        settle_base: Duration::ZERO,
        settle_step: Duration::ZERO,
    }
}

fn target() -> Url {
    Url::parse("https://example.com/page").unwrap()
}

#[tokio::test]
async fn scenario_a_challenge_resolves_within_settle_budget() {
    let driver = FakeDriver::scripted(&["Just a moment...", "Just a moment...", "Example Site"]);
    let detector = ChallengeDetector::default();
    let scheduler = RetryScheduler::new(&detector, instant_policy(2));

    let out = scheduler.run(&driver, &target(), None).await.unwrap();

    assert_eq!(out.challenge, ChallengeState::Resolved);
    assert_eq!(out.classify_calls, 3);
    assert_eq!(out.navigation.title, "Example Site");
    // No warm-up configured: the single initial navigation is enough.
    assert_eq!(driver.navigate_calls.load(Ordering::SeqCst), 1);
    assert_eq!(driver.reload_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn scenario_b_persistent_challenge_exhausts_after_escalations() {
    let driver = FakeDriver::scripted(&["Just a moment..."]);
    let detector = ChallengeDetector::default();
    let scheduler = RetryScheduler::new(&detector, instant_policy(1));
    let warmup = Url::parse("https://example.com/").unwrap();

    let out = scheduler
        .run(&driver, &target(), Some(&warmup))
        .await
        .unwrap();

    assert_eq!(out.challenge, ChallengeState::Exhausted);
    // initial + 1 settle round + reload + warm-up escalation
    assert_eq!(out.classify_calls, 4);
    // warm-up, target, escalation warm-up, escalation target
    assert_eq!(driver.navigate_calls.load(Ordering::SeqCst), 4);
    assert_eq!(driver.reload_calls.load(Ordering::SeqCst), 1);
    // The last-seen snapshot is still returned.
    assert_eq!(out.navigation.title, "Just a moment...");
}

#[tokio::test]
async fn attempt_count_is_bounded_by_the_policy_formula() {
    for retries in [0u32, 1, 3, 5] {
        let driver = FakeDriver::scripted(&["Checking your browser"]);
        let detector = ChallengeDetector::default();
        let scheduler = RetryScheduler::new(&detector, instant_policy(retries));
        let warmup = Url::parse("https://example.com/").unwrap();

        let out = scheduler
            .run(&driver, &target(), Some(&warmup))
            .await
            .unwrap();

        assert_eq!(out.challenge, ChallengeState::Exhausted);
        // classify: initial + retries settle rounds + one reload + one
        // warm-up escalation — never more.
        assert_eq!(out.classify_calls, 1 + retries + 1 + 1);
        // navigations: two warm-ups + two target visits + one reload.
        assert_eq!(driver.total_navigations(), 5);
        assert_eq!(out.navigation_calls, 5);
    }
}

#[tokio::test]
async fn transient_title_read_failure_does_not_abort_the_run() {
    // Navigations succeed but every bare title read errors: the settle
    // loop must keep the last known title and carry on to the
    // escalations instead of discarding a loaded page.
    let driver = FakeDriver::with_failing_title_reads(&["Just a moment..."]);
    let detector = ChallengeDetector::default();
    let scheduler = RetryScheduler::new(&detector, instant_policy(2));

    let out = scheduler.run(&driver, &target(), None).await.unwrap();

    assert_eq!(out.challenge, ChallengeState::Exhausted);
    // The stale title is still re-checked each settle round.
    assert_eq!(out.classify_calls, 1 + 2 + 1 + 1);
    assert_eq!(out.navigation.title, "Just a moment...");
}

#[tokio::test]
async fn scenario_d_first_navigation_failure_propagates_and_releases() {
    let driver = FakeDriver::failing();
    let session = FakeSession::new();
    let detector = ChallengeDetector::default();
    let options = FetchOptions {
        navigation_timeout: Duration::from_millis(50),
        max_challenge_retries: 1,
        warmup_domain: Some(Url::parse("https://example.com/").unwrap()),
        ..FetchOptions::default()
    };

    let result = execute_with(&session, &driver, &detector, &target(), &options).await;

    match result {
        Err(FetchError::NavigationTimeout { .. }) => {}
        other => panic!("expected NavigationTimeout, got {other:?}"),
    }
    // Release fires exactly once even on the failure path.
    assert_eq!(session.releases.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn release_fires_exactly_once_on_success() {
    let driver = FakeDriver::scripted(&["Example Site"]);
    let session = FakeSession::new();
    let detector = ChallengeDetector::default();
    let options = FetchOptions {
        navigation_timeout: Duration::from_millis(200),
        max_challenge_retries: 0,
        ..FetchOptions::default()
    };

    let rendered = execute_with(&session, &driver, &detector, &target(), &options)
        .await
        .unwrap();

    assert_eq!(rendered.challenge, ChallengeState::Resolved);
    assert!(rendered.content_verified);
    assert!(rendered.html.contains("Example Site"));
    assert_eq!(session.releases.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn exhausted_run_still_returns_last_seen_html() {
    let driver = FakeDriver::scripted(&["Just a moment..."]);
    let session = FakeSession::new();
    let detector = ChallengeDetector::default();
    let options = FetchOptions {
        navigation_timeout: Duration::from_millis(200),
        // Zero settle rounds keeps this test sleep-free; reload and
        // warm-up escalations still run.
        max_challenge_retries: 0,
        ..FetchOptions::default()
    };

    let rendered = execute_with(&session, &driver, &detector, &target(), &options)
        .await
        .unwrap();

    assert_eq!(rendered.challenge, ChallengeState::Exhausted);
    assert!(rendered.html.contains("Just a moment..."));
    assert_eq!(session.releases.load(Ordering::SeqCst), 1);
}
