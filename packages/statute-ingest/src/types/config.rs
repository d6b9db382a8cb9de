//! Configuration types for fetching, extraction and slot generation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default pause between outbound scraping requests.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(3000);

/// Default wait after network idle for deferred client-side rendering.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(5);

/// Default HTML budget embedded in the extraction prompt.
pub const DEFAULT_MAX_HTML_CHARS: usize = 80_000;

/// Default deadline for a single model call.
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(120);

/// A desktop Chrome user agent.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Configuration for page fetching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// User agent presented to the target site.
    pub user_agent: String,

    /// Extra request headers sent with navigation.
    ///
    /// Ordered so the header set matches what a real browser sends.
    pub headers: Vec<(String, String)>,

    /// Suppress automation-detection signals (navigator.webdriver etc.).
    pub stealth: bool,

    /// Bound on navigation until network idle.
    ///
    /// Default: 60 seconds.
    pub navigation_timeout: Duration,

    /// Extra wait after network idle before reading the document.
    ///
    /// Default: 5 seconds.
    pub settle: Duration,

    /// Viewport presented to the page.
    pub viewport: (u32, u32),
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            headers: vec![
                (
                    "Accept".to_string(),
                    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"
                        .to_string(),
                ),
                ("Accept-Language".to_string(), "en-US,en;q=0.9".to_string()),
                ("Cache-Control".to_string(), "no-cache".to_string()),
                ("Upgrade-Insecure-Requests".to_string(), "1".to_string()),
            ],
            stealth: true,
            navigation_timeout: Duration::from_secs(60),
            settle: DEFAULT_SETTLE,
            viewport: (1920, 1080),
        }
    }
}

impl FetchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Add or replace a request header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    /// Set the navigation bound.
    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    /// Set the settle period.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Enable or disable stealth mode.
    pub fn with_stealth(mut self, stealth: bool) -> Self {
        self.stealth = stealth;
        self
    }
}

/// Configuration for structured statute extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Characters of HTML embedded in the prompt. Default: 80,000.
    pub max_html_chars: usize,

    /// Deadline for the model call. Default: 120 seconds.
    pub timeout: Duration,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_html_chars: DEFAULT_MAX_HTML_CHARS,
            timeout: DEFAULT_MODEL_TIMEOUT,
        }
    }
}

impl ExtractorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_html_chars(mut self, max: usize) -> Self {
        self.max_html_chars = max;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Options for one slot generation run over a source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotRunOptions {
    /// Domain the slots are inferred for
    pub domain_slug: String,

    /// Provisions per model call. Default: 10.
    pub batch_size: usize,
}

impl SlotRunOptions {
    pub fn new(domain_slug: impl Into<String>) -> Self {
        Self {
            domain_slug: domain_slug.into(),
            batch_size: 10,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_config_defaults() {
        let config = FetchConfig::default();
        assert_eq!(config.settle, Duration::from_secs(5));
        assert!(config.stealth);
        assert!(config.user_agent.contains("Chrome"));
    }

    #[test]
    fn test_with_header_replaces_case_insensitively() {
        let config = FetchConfig::new().with_header("accept-language", "fr-CA");
        let values: Vec<_> = config
            .headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case("accept-language"))
            .collect();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].1, "fr-CA");
    }

    #[test]
    fn test_extractor_defaults() {
        let config = ExtractorConfig::default();
        assert_eq!(config.max_html_chars, 80_000);
        assert_eq!(config.timeout, Duration::from_secs(120));
    }
}
