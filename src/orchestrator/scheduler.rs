//! The challenge retry state machine.
//!
//! States: `Init → Navigated → (Detected ⇄ Waiting) → Resolved | Exhausted`.
//! The budget is deliberately small and bounded: interstitial challenges
//! either resolve client-side within seconds or need interactive solving
//! that no retry count fixes.

use std::time::Duration;

use tracing::{info, warn};
use url::Url;

use crate::core::error::FetchError;
use crate::core::types::{ChallengeState, FetchOptions, NavigationOutcome, WaitCondition};
use crate::orchestrator::detector::ChallengeDetector;
use crate::orchestrator::driver::NavigationDriver;

/// Bounded retry budget. Settle delays are part of the policy (not
/// hard-coded sleeps) so tests can zero them out.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub navigation_timeout: Duration,
    pub max_challenge_retries: u32,
    /// First settle wait; grows by `settle_step` each iteration.
    pub settle_base: Duration,
    pub settle_step: Duration,
}

impl RetryPolicy {
    pub fn from_options(options: &FetchOptions) -> Self {
        Self {
            navigation_timeout: options.navigation_timeout,
            max_challenge_retries: options.max_challenge_retries,
            settle_base: Duration::from_millis(1000),
            settle_step: Duration::from_millis(500),
        }
    }

    fn settle_delay(&self, iteration: u32) -> Duration {
        self.settle_base + self.settle_step * iteration
    }

    /// Hard ceiling on one scheduler run: at most four navigations (two
    /// warm-ups, two target visits), one reload, every settle wait, plus
    /// fixed slack for title reads. The orchestrator enforces this with an
    /// outer timeout so a run cannot outlive its documented worst case.
    pub fn total_budget(&self) -> Duration {
        let settles: Duration = (0..self.max_challenge_retries)
            .map(|i| self.settle_delay(i))
            .sum();
        self.navigation_timeout * 5 + settles + Duration::from_secs(5)
    }
}

/// What a finished run hands back: the last navigation outcome, the
/// terminal challenge state, and step counters for observability.
#[derive(Debug, Clone)]
pub struct ScheduleOutcome {
    pub navigation: NavigationOutcome,
    pub challenge: ChallengeState,
    pub classify_calls: u32,
    pub navigation_calls: u32,
}

pub struct RetryScheduler<'a> {
    detector: &'a ChallengeDetector,
    policy: RetryPolicy,
}

impl<'a> RetryScheduler<'a> {
    pub fn new(detector: &'a ChallengeDetector, policy: RetryPolicy) -> Self {
        Self { detector, policy }
    }

    /// Drive the page to the target and resolve (or exhaust) any
    /// interstitial challenge.
    ///
    /// Step order, each bounded:
    /// 1. optional warm-up navigation — failures logged, never propagated;
    /// 2. initial target navigation — failures are fatal (nothing to
    ///    snapshot yet);
    /// 3. up to `max_challenge_retries` settle-wait + re-classify rounds;
    /// 4. exactly one reload escalation;
    /// 5. exactly one warm-up-then-target escalation;
    /// 6. terminal `Resolved` or `Exhausted` — `Exhausted` is not an error.
    pub async fn run<D: NavigationDriver + ?Sized>(
        &self,
        driver: &D,
        target: &Url,
        warmup: Option<&Url>,
    ) -> Result<ScheduleOutcome, FetchError> {
        let timeout = self.policy.navigation_timeout;
        let mut navigation_calls = 0u32;
        let mut classify_calls = 0u32;

        if let Some(w) = warmup {
            navigation_calls += 1;
            match driver.navigate(w, WaitCondition::DomReady, timeout).await {
                Ok(o) => info!(warmup = %w, elapsed_ms = o.elapsed_ms, "warm-up visit done"),
                Err(e) => warn!(warmup = %w, "warm-up failed (non-fatal): {e}"),
            }
        }

        navigation_calls += 1;
        let mut last = driver
            .navigate(target, WaitCondition::NetworkSettled, timeout)
            .await?;

        classify_calls += 1;
        let mut state = self.detector.classify(&last.title);
        info!(title = %last.title, state = state.as_str(), "initial navigation classified");
        if state == ChallengeState::Resolved {
            return Ok(ScheduleOutcome {
                navigation: last,
                challenge: state,
                classify_calls,
                navigation_calls,
            });
        }

        // Settle loop: the challenge script usually flips the title within
        // a few seconds without any further navigation.
        for i in 0..self.policy.max_challenge_retries {
            tokio::time::sleep(self.policy.settle_delay(i)).await;
            // A snapshot-worthy page is already loaded; a transient title
            // read failure keeps the last known title instead of aborting.
            match driver.title().await {
                Ok(t) => last.title = t,
                Err(e) => warn!(round = i + 1, "settle title read failed (non-fatal): {e}"),
            }
            classify_calls += 1;
            state = self.detector.classify(&last.title);
            info!(round = i + 1, title = %last.title, state = state.as_str(), "settle re-check");
            if state == ChallengeState::Resolved {
                return Ok(ScheduleOutcome {
                    navigation: last,
                    challenge: state,
                    classify_calls,
                    navigation_calls,
                });
            }
        }

        // Escalation 1: one reload of the current page. We already hold a
        // snapshot-worthy page, so escalation failures degrade, not abort.
        navigation_calls += 1;
        match driver.reload(WaitCondition::NetworkSettled, timeout).await {
            Ok(o) => {
                last = o;
                classify_calls += 1;
                state = self.detector.classify(&last.title);
                info!(title = %last.title, state = state.as_str(), "reload escalation classified");
                if state == ChallengeState::Resolved {
                    return Ok(ScheduleOutcome {
                        navigation: last,
                        challenge: state,
                        classify_calls,
                        navigation_calls,
                    });
                }
            }
            Err(e) => warn!("reload escalation failed (non-fatal): {e}"),
        }

        // Escalation 2: re-run the warm-up-then-target sequence once.
        if let Some(w) = warmup {
            navigation_calls += 1;
            if let Err(e) = driver.navigate(w, WaitCondition::DomReady, timeout).await {
                warn!(warmup = %w, "escalation warm-up failed (non-fatal): {e}");
            }
        }
        navigation_calls += 1;
        match driver
            .navigate(target, WaitCondition::NetworkSettled, timeout)
            .await
        {
            Ok(o) => {
                last = o;
                classify_calls += 1;
                state = self.detector.classify(&last.title);
                info!(title = %last.title, state = state.as_str(), "warm-up escalation classified");
            }
            Err(e) => warn!("escalation navigation failed (non-fatal): {e}"),
        }

        let challenge = if state == ChallengeState::Resolved {
            ChallengeState::Resolved
        } else {
            ChallengeState::Exhausted
        };
        Ok(ScheduleOutcome {
            navigation: last,
            challenge,
            classify_calls,
            navigation_calls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settle_delay_increases_lightly() {
        let p = RetryPolicy::from_options(&FetchOptions::default());
        assert_eq!(p.settle_delay(0), Duration::from_millis(1000));
        assert_eq!(p.settle_delay(1), Duration::from_millis(1500));
        assert_eq!(p.settle_delay(2), Duration::from_millis(2000));
    }

    #[test]
    fn total_budget_is_a_fixed_formula() {
        let p = RetryPolicy {
            navigation_timeout: Duration::from_secs(10),
            max_challenge_retries: 2,
            settle_base: Duration::from_secs(1),
            settle_step: Duration::from_millis(500),
        };
        // 5 navigations + 1s + 1.5s settles + 5s slack
        assert_eq!(p.total_budget(), Duration::from_millis(57_500));
    }
}
