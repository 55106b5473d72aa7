use std::sync::Arc;

use crate::core::config::ServiceConfig;
use crate::orchestrator::detector::ChallengeDetector;

/// Shared service state handed to every handler.
///
/// The session-ceiling semaphore is the primary backpressure mechanism:
/// browser sessions are heavyweight, so requests beyond `max_sessions`
/// queue here instead of spawning unbounded Chromium processes.
#[derive(Clone)]
pub struct AppState {
    pub http_client: reqwest::Client,
    pub config: Arc<ServiceConfig>,
    pub detector: Arc<ChallengeDetector>,
    pub session_limit: Arc<tokio::sync::Semaphore>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("max_sessions", &self.config.max_sessions)
            .field("available_sessions", &self.session_limit.available_permits())
            .finish()
    }
}

impl AppState {
    pub fn new(http_client: reqwest::Client, config: ServiceConfig) -> Self {
        let detector = ChallengeDetector::with_extra_patterns(&config.extra_challenge_titles);
        let session_limit = Arc::new(tokio::sync::Semaphore::new(config.max_sessions));
        Self {
            http_client,
            config: Arc::new(config),
            detector: Arc::new(detector),
            session_limit,
        }
    }
}
