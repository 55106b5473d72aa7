//! Challenge interstitial detection from page titles.

use aho_corasick::AhoCorasick;

use crate::core::types::ChallengeState;

/// Titles shown by known anti-bot interstitials. Substring match,
/// case-insensitive.
const DEFAULT_CHALLENGE_TITLES: &[&str] = &[
    "just a moment",
    "checking your browser",
    "attention required",
    "verification in progress",
    "verifying you are human",
    "verify you are human",
    "access denied",
    "ddos protection",
    "security check",
    "please wait",
    "un momento",
];

/// Pure title classifier. Holds its vocabulary as data so new challenge
/// providers can be added through configuration without touching the
/// retry state machine.
pub struct ChallengeDetector {
    patterns: Vec<String>,
    matcher: AhoCorasick,
}

impl ChallengeDetector {
    pub fn new(patterns: Vec<String>) -> Self {
        let matcher = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(&patterns)
            .expect("valid challenge-title patterns");
        Self { patterns, matcher }
    }

    /// Built-in vocabulary plus extra patterns from configuration.
    pub fn with_extra_patterns(extra: &[String]) -> Self {
        let mut patterns: Vec<String> = DEFAULT_CHALLENGE_TITLES
            .iter()
            .map(|s| s.to_string())
            .collect();
        patterns.extend(extra.iter().cloned());
        Self::new(patterns)
    }

    /// Classify a page title. No network, no timing — same title, same
    /// answer, always.
    pub fn classify(&self, title: &str) -> ChallengeState {
        if self.matcher.is_match(title) {
            ChallengeState::Detected
        } else {
            ChallengeState::Resolved
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Default for ChallengeDetector {
    fn default() -> Self {
        Self::with_extra_patterns(&[])
    }
}
