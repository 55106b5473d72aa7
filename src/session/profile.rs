//! Session presentation: how a browsing session introduces itself.
//!
//! Everything here is plain data derived deterministically from
//! [`FetchOptions`] — same options, same profile. The automation-masking
//! overrides are a declarative list rendered into a single init script,
//! so they can be validated and unit-tested without a browser.

use serde_json::Value;

use crate::core::types::FetchOptions;

/// Fixed desktop Chrome identity. Kept constant (not rotated) so profile
/// construction stays deterministic and testable via equality.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36";

pub const DEFAULT_VIEWPORT: (u32, u32) = (1920, 1080);

/// One spoofed client-side property, e.g. `navigator.webdriver` → undefined.
/// `Value::Null` renders as JavaScript `undefined` ("absent" reads as less
/// suspicious than `false` to most detectors).
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyOverride {
    pub path: String,
    pub value: Value,
}

impl PropertyOverride {
    pub fn new(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            value,
        }
    }
}

/// Immutable description of how one browsing session presents itself.
/// Owned by exactly one [`BrowsingSession`](crate::session::BrowsingSession);
/// never shared across concurrent requests.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionProfile {
    pub user_agent: String,
    pub locale: String,
    pub timezone: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub extra_headers: Vec<(String, String)>,
    pub property_overrides: Vec<PropertyOverride>,
    /// URL substring patterns blocked at the network layer; empty when
    /// heavy-resource blocking is off.
    pub blocked_url_patterns: Vec<String>,
}

impl SessionProfile {
    /// Pure, deterministic mapping from options to profile.
    pub fn from_options(options: &FetchOptions) -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            locale: options.locale.clone(),
            timezone: options.timezone.clone(),
            viewport_width: DEFAULT_VIEWPORT.0,
            viewport_height: DEFAULT_VIEWPORT.1,
            extra_headers: browserlike_headers(&options.locale),
            property_overrides: default_property_overrides(),
            blocked_url_patterns: if options.block_heavy_resources {
                heavy_resource_patterns()
            } else {
                Vec::new()
            },
        }
    }

    /// Render the override list into one script injected before any page
    /// script runs (`Page.addScriptToEvaluateOnNewDocument`). Each entry is
    /// wrapped in its own try/catch: a property a given engine build refuses
    /// to redefine must not break the rest.
    pub fn override_script(&self) -> String {
        let mut script = String::from("(() => {\n");
        for o in &self.property_overrides {
            let (owner, prop) = split_property_path(&o.path);
            let rendered = render_value(&o.value);
            script.push_str(&format!(
                "  try {{ Object.defineProperty({owner}, '{prop}', {{ get: () => {rendered}, configurable: true }}); }} catch (e) {{}}\n",
            ));
        }
        script.push_str("})();\n");
        script
    }
}

/// Header set a real desktop browser sends on a top-level navigation.
fn browserlike_headers(locale: &str) -> Vec<(String, String)> {
    vec![
        (
            "Accept".to_string(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"
                .to_string(),
        ),
        (
            "Accept-Language".to_string(),
            format!("{locale},{};q=0.9", locale.split('-').next().unwrap_or("en")),
        ),
        ("Upgrade-Insecure-Requests".to_string(), "1".to_string()),
        ("Sec-Fetch-Dest".to_string(), "document".to_string()),
        ("Sec-Fetch-Mode".to_string(), "navigate".to_string()),
        ("Sec-Fetch-Site".to_string(), "none".to_string()),
    ]
}

/// Automation signals masked on every session.
fn default_property_overrides() -> Vec<PropertyOverride> {
    vec![
        PropertyOverride::new("navigator.webdriver", Value::Null),
        PropertyOverride::new(
            "navigator.languages",
            serde_json::json!(["en-US", "en"]),
        ),
        PropertyOverride::new("navigator.plugins", serde_json::json!([1, 2, 3, 4, 5])),
        PropertyOverride::new("navigator.hardwareConcurrency", serde_json::json!(8)),
    ]
}

/// Analytics/ad hosts plus heavy media extensions (leading dot). The
/// session layer renders these into engine URL patterns.
fn heavy_resource_patterns() -> Vec<String> {
    [
        "doubleclick.net",
        "googlesyndication.com",
        "googletagmanager.com",
        "google-analytics.com",
        "amazon-adsystem.com",
        "criteo.com",
        "taboola.com",
        "outbrain.com",
        "adnxs.com",
        "hotjar.com",
        "fullstory.com",
        "connect.facebook.net",
        ".mp4",
        ".webm",
        ".woff",
        ".woff2",
        ".ttf",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn split_property_path(path: &str) -> (&str, &str) {
    match path.rfind('.') {
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("window", path),
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "undefined".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_is_deterministic() {
        let opts = FetchOptions::default();
        assert_eq!(
            SessionProfile::from_options(&opts),
            SessionProfile::from_options(&opts)
        );
    }

    #[test]
    fn blocking_toggle_controls_patterns() {
        let blocked = SessionProfile::from_options(&FetchOptions::default());
        assert!(!blocked.blocked_url_patterns.is_empty());

        let open = SessionProfile::from_options(&FetchOptions {
            block_heavy_resources: false,
            ..FetchOptions::default()
        });
        assert!(open.blocked_url_patterns.is_empty());
    }

    #[test]
    fn override_script_renders_undefined_for_null() {
        let profile = SessionProfile::from_options(&FetchOptions::default());
        let script = profile.override_script();
        assert!(script.contains(
            "Object.defineProperty(navigator, 'webdriver', { get: () => undefined"
        ));
        assert!(script.contains("'languages'"));
        // Every entry individually guarded.
        assert_eq!(
            script.matches("try {").count(),
            profile.property_overrides.len()
        );
    }

    #[test]
    fn property_path_splits_on_last_dot() {
        assert_eq!(
            split_property_path("navigator.webdriver"),
            ("navigator", "webdriver")
        );
        assert_eq!(split_property_path("chrome"), ("window", "chrome"));
        assert_eq!(
            split_property_path("navigator.connection.rtt"),
            ("navigator.connection", "rtt")
        );
    }

    #[test]
    fn locale_flows_into_headers() {
        let opts = FetchOptions {
            locale: "de-DE".to_string(),
            ..FetchOptions::default()
        };
        let profile = SessionProfile::from_options(&opts);
        let accept_language = profile
            .extra_headers
            .iter()
            .find(|(k, _)| k == "Accept-Language")
            .map(|(_, v)| v.clone())
            .unwrap();
        assert_eq!(accept_language, "de-DE,de;q=0.9");
    }
}
