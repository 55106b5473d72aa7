//! HTTP surface: health, usage, the direct fast path, and the full
//! orchestrator path.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use url::Url;

use crate::core::error::FetchError;
use crate::core::types::{parse_target_url, FetchRequest, FetchResult};
use crate::core::AppState;
use crate::orchestrator;
use crate::session::SessionProfile;

/// Per-request override caps; query parameters beyond these are clamped.
const MAX_NAV_TIMEOUT_MS: u64 = 120_000;
const MIN_NAV_TIMEOUT_MS: u64 = 1_000;
const MAX_RETRIES: u32 = 10;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(usage))
        .route("/health", get(health))
        .route("/fetch", get(fetch_handler))
        .route("/scrape", get(scrape_handler))
        // Alias kept for callers that know the endpoint as /content.
        .route("/content", get(scrape_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "clearfetch",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn usage() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "ok": true,
        "usage": "/scrape?url=<encoded url> (rendered) or /fetch?url=<encoded url> (direct)"
    }))
}

#[derive(Debug, Deserialize)]
struct FetchQuery {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScrapeQuery {
    url: Option<String>,
    timeout_ms: Option<u64>,
    retries: Option<u32>,
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "ok": false, "error": message })),
    )
        .into_response()
}

/// Validate `?url=` before any resource is allocated.
fn parse_target(raw: Option<&str>) -> Result<Url, Response> {
    parse_target_url(raw.unwrap_or_default()).map_err(|e| match e {
        FetchError::Input(msg) => bad_request(&msg),
        other => bad_request(&other.to_string()),
    })
}

/// Fast path: plain HTTP fetch with browser-like headers, no session.
async fn fetch_handler(
    State(state): State<AppState>,
    Query(query): Query<FetchQuery>,
) -> Response {
    let target = match parse_target(query.url.as_deref()) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    let profile = SessionProfile::from_options(&state.config.default_fetch_options());
    let mut request = state
        .http_client
        .get(target.clone())
        .header(header::USER_AGENT, profile.user_agent.as_str());
    for (name, value) in &profile.extra_headers {
        request = request.header(name.as_str(), value.as_str());
    }

    match request.send().await {
        Ok(resp) => match resp.text().await {
            Ok(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                body,
            )
                .into_response(),
            Err(e) => {
                error!(url = %target, "fast path body read failed: {e}");
                upstream_error(&format!("upstream read failed: {e}"))
            }
        },
        Err(e) => {
            error!(url = %target, "fast path fetch failed: {e}");
            upstream_error(&format!("upstream fetch failed: {e}"))
        }
    }
}

fn upstream_error(message: &str) -> Response {
    (
        StatusCode::BAD_GATEWAY,
        Json(serde_json::json!({ "ok": false, "error": message })),
    )
        .into_response()
}

/// Orchestrator path: full browsing session with challenge recovery.
/// Exhausted challenges are a 200 with best-effort content; only launch
/// and fatal navigation errors become 5xx.
async fn scrape_handler(
    State(state): State<AppState>,
    Query(query): Query<ScrapeQuery>,
) -> Response {
    let target = match parse_target(query.url.as_deref()) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    let mut options = state.config.default_fetch_options();
    if let Some(ms) = query.timeout_ms {
        options.navigation_timeout =
            Duration::from_millis(ms.clamp(MIN_NAV_TIMEOUT_MS, MAX_NAV_TIMEOUT_MS));
    }
    if let Some(r) = query.retries {
        options.max_challenge_retries = r.min(MAX_RETRIES);
    }

    info!(url = %target, "scrape request");
    let started = std::time::Instant::now();

    let request = FetchRequest::new(target.clone(), options);
    match orchestrator::fetch_rendered(&state, request).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => {
            error!(url = %target, "scrape failed: {e}");
            let timing_ms = started.elapsed().as_millis() as u64;
            let status = StatusCode::from_u16(e.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (
                status,
                Json(FetchResult::failure(target.as_str(), &e, timing_ms)),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_and_malformed_urls() {
        assert!(parse_target(None).is_err());
        assert!(parse_target(Some("")).is_err());
        assert!(parse_target(Some("   ")).is_err());
        assert!(parse_target(Some("not a url")).is_err());
        assert!(parse_target(Some("example.com/no-scheme")).is_err());
        assert!(parse_target(Some("ftp://example.com/file")).is_err());
    }

    #[test]
    fn accepts_absolute_http_urls() {
        assert!(parse_target(Some("https://example.com/page?q=1")).is_ok());
        assert!(parse_target(Some("http://localhost:8080/")).is_ok());
    }
}
