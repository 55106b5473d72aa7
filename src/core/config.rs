use std::env;
use std::time::Duration;

use crate::core::types::FetchOptions;

// ---------------------------------------------------------------------------
// ServiceConfig — env-var configuration with explicit defaults
// ---------------------------------------------------------------------------

/// Process-level configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Listening port. `CLEARFETCH_PORT` → `PORT` → 3000.
    pub port: u16,
    /// Ceiling on simultaneously live browser sessions. `MAX_SESSIONS` → 4.
    pub max_sessions: usize,
    /// Default per-navigation timeout. `NAV_TIMEOUT_MS` → 20 000.
    pub navigation_timeout: Duration,
    /// Default settle-wait retry budget. `MAX_CHALLENGE_RETRIES` → 2.
    pub max_challenge_retries: u32,
    /// Extra challenge-title patterns, comma-separated. `CHALLENGE_TITLES`.
    pub extra_challenge_titles: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            max_sessions: 4,
            navigation_timeout: Duration::from_secs(20),
            max_challenge_retries: 2,
            extra_challenge_titles: Vec::new(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

impl ServiceConfig {
    /// Resolve configuration from the environment.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let port = env_parse::<u16>("CLEARFETCH_PORT")
            .or_else(|| env_parse::<u16>("PORT"))
            .unwrap_or(defaults.port);
        let max_sessions = env_parse::<usize>("MAX_SESSIONS")
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_sessions);
        let navigation_timeout = env_parse::<u64>("NAV_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.navigation_timeout);
        let max_challenge_retries =
            env_parse::<u32>("MAX_CHALLENGE_RETRIES").unwrap_or(defaults.max_challenge_retries);
        let extra_challenge_titles = env::var("CHALLENGE_TITLES")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            port,
            max_sessions,
            navigation_timeout,
            max_challenge_retries,
            extra_challenge_titles,
        }
    }

    /// Baseline per-request options derived from this config.
    pub fn default_fetch_options(&self) -> FetchOptions {
        FetchOptions {
            navigation_timeout: self.navigation_timeout,
            max_challenge_retries: self.max_challenge_retries,
            ..FetchOptions::default()
        }
    }
}
