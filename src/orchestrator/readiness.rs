//! Best-effort structural content check, independent of challenge state.

use std::time::Duration;

use tracing::debug;

use crate::orchestrator::driver::NavigationDriver;

/// Landmarks that indicate meaningful content has arrived.
pub const CONTENT_SELECTORS: &[&str] = &[
    "main",
    "article",
    "[role=\"main\"]",
    "#content",
    ".content",
    "h1",
];

pub const GATE_TIMEOUT: Duration = Duration::from_secs(3);

/// Wait briefly for any content landmark. Absence is never fatal — it
/// only downgrades the snapshot from "content verified" to "raw,
/// unverified" in the assembled result.
pub async fn content_ready<D: NavigationDriver + ?Sized>(driver: &D) -> bool {
    let found = driver
        .wait_for_any_selector(CONTENT_SELECTORS, GATE_TIMEOUT)
        .await;
    if !found {
        debug!("no content landmark appeared within {:?}", GATE_TIMEOUT);
    }
    found
}
