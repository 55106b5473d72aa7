use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::error::FetchError;

/// Validate a raw `?url=` value. Only absolute http(s) URLs pass, and
/// nothing downstream allocates a resource until this has.
pub fn parse_target_url(raw: &str) -> Result<Url, FetchError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(FetchError::Input("Missing ?url=".to_string()));
    }
    let url = Url::parse(raw).map_err(|_| FetchError::Input("Invalid url".to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(FetchError::Input("Invalid url: http(s) only".to_string()));
    }
    Ok(url)
}

/// One validated retrieval request. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub target_url: Url,
    pub options: FetchOptions,
}

impl FetchRequest {
    pub fn new(target_url: Url, options: FetchOptions) -> Self {
        Self {
            target_url,
            options,
        }
    }
}

/// Per-request knobs for the rendered-fetch pipeline.
///
/// Defaults are explicit here; environment config and query parameters
/// override individual fields, never a shared global.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    /// Timeout for a single navigation to reach its wait condition.
    pub navigation_timeout: Duration,
    /// Settle-wait / re-classify iterations before escalation.
    pub max_challenge_retries: u32,
    /// Block ads, trackers, and heavy media during navigation.
    pub block_heavy_resources: bool,
    /// Domain visited before the target so protection cookies get set.
    /// `None` means "derive the target's origin root".
    pub warmup_domain: Option<Url>,
    pub locale: String,
    pub timezone: String,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(20),
            max_challenge_retries: 2,
            block_heavy_resources: true,
            warmup_domain: None,
            locale: "en-US".to_string(),
            timezone: "America/New_York".to_string(),
        }
    }
}

impl FetchOptions {
    /// The warm-up URL for `target`: the configured domain, or the
    /// target's origin root when none was configured.
    pub fn warmup_for(&self, target: &Url) -> Option<Url> {
        if let Some(w) = &self.warmup_domain {
            return Some(w.clone());
        }
        let mut root = target.clone();
        root.set_path("/");
        root.set_query(None);
        root.set_fragment(None);
        // A warm-up to the target itself is pointless.
        if root == *target {
            None
        } else {
            Some(root)
        }
    }
}

/// Readiness condition a navigation waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    /// DOM parsed and the load event fired.
    DomReady,
    /// DOM ready plus no new network resource entries for a quiet window.
    /// Capped by an inner timeout; degrades silently on chatty pages.
    NetworkSettled,
}

/// Result of a single navigation attempt. Immutable; the scheduler
/// consumes it and decides the next step.
#[derive(Debug, Clone)]
pub struct NavigationOutcome {
    pub final_url: Url,
    pub title: String,
    pub elapsed_ms: u64,
    pub succeeded: bool,
}

/// Challenge status of the current page. Transitions happen only inside
/// the retry scheduler; `Exhausted` is terminal and not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeState {
    Unknown,
    Detected,
    Resolved,
    Exhausted,
}

impl ChallengeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeState::Unknown => "unknown",
            ChallengeState::Detected => "detected",
            ChallengeState::Resolved => "resolved",
            ChallengeState::Exhausted => "exhausted",
        }
    }
}

/// Final snapshot returned to the caller. Produced exactly once per
/// request, including degraded (`Exhausted`) and failed runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    pub ok: bool,
    pub url: String,
    #[serde(rename = "finalUrl")]
    pub final_url: String,
    pub title: String,
    pub html: String,
    pub html_len: usize,
    #[serde(rename = "timingMs")]
    pub timing_ms: u64,
    /// `resolved` / `exhausted` / `unknown` — lets callers tell verified
    /// snapshots from best-effort ones.
    pub challenge: String,
    /// Whether a structural content selector was found before capture.
    pub content_verified: bool,
    #[serde(rename = "fetchedAt")]
    pub fetched_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FetchResult {
    /// Well-formed failure result; nothing throws past the assembler.
    pub fn failure(url: &str, err: &FetchError, timing_ms: u64) -> Self {
        Self {
            ok: false,
            url: url.to_string(),
            final_url: url.to_string(),
            title: String::new(),
            html: String::new(),
            html_len: 0,
            timing_ms,
            challenge: "unknown".to_string(),
            content_verified: false,
            fetched_at: chrono::Utc::now().to_rfc3339(),
            error: Some(err.to_string()),
        }
    }
}
