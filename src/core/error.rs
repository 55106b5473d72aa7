use thiserror::Error;

/// Error taxonomy for one fetch request.
///
/// Variants map onto HTTP status codes at the handler boundary via
/// [`FetchError::status_code`]; nothing below the handler layer formats
/// HTTP responses.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Invalid or missing input — rejected before any session is created.
    #[error("invalid input: {0}")]
    Input(String),

    /// The browser engine failed to start.
    #[error("browser launch failed: {0}")]
    Launch(String),

    /// The wait condition was not reached within the navigation timeout.
    #[error("navigation timed out after {timeout_ms}ms: {url}")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    /// Engine-level navigation failure (DNS, TLS, connection refused).
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// Any other CDP / engine failure outside navigation itself.
    #[error("browser engine error: {0}")]
    Engine(String),
}

impl FetchError {
    /// HTTP status for this failure class.
    pub fn status_code(&self) -> u16 {
        match self {
            FetchError::Input(_) => 400,
            FetchError::Launch(_) => 500,
            FetchError::NavigationTimeout { .. } | FetchError::Navigation(_) => 502,
            FetchError::Engine(_) => 502,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(FetchError::Input("x".into()).status_code(), 400);
        assert_eq!(FetchError::Launch("x".into()).status_code(), 500);
        assert_eq!(
            FetchError::NavigationTimeout {
                url: "https://example.com".into(),
                timeout_ms: 1000
            }
            .status_code(),
            502
        );
        assert_eq!(FetchError::Navigation("refused".into()).status_code(), 502);
    }
}
