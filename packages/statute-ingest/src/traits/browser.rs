//! Browser traits for rendering pages.
//!
//! A [`Browser`] hands out isolated [`BrowserSession`]s. A session is owned
//! by exactly one fetch and must be closed by it on every exit path; Rust has
//! no async drop, so [`crate::fetch::PageFetcher`] performs the close
//! explicitly after the navigation future resolves, success or failure.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::FetchResult;

/// When navigation counts as finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitUntil {
    /// DOMContentLoaded fired
    DomContentLoaded,
    /// No network connections for 500 ms
    #[default]
    NetworkIdle,
}

impl WaitUntil {
    /// Puppeteer-style name used by remote browser APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitUntil::DomContentLoaded => "domcontentloaded",
            WaitUntil::NetworkIdle => "networkidle0",
        }
    }
}

/// Identity and evasion settings applied to a fresh session.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowserProfile {
    pub user_agent: String,
    pub headers: Vec<(String, String)>,
    pub viewport: (u32, u32),
    pub stealth: bool,
}

/// How to navigate and when to read the document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavigateOptions {
    pub wait_until: WaitUntil,
    pub timeout: Duration,

    /// Extra wait after `wait_until` for deferred rendering
    pub settle: Duration,
}

/// Outcome of a navigation.
#[derive(Debug, Clone, PartialEq)]
pub struct Navigation {
    /// HTTP status of the main document, if the backend reports one
    pub status: Option<u16>,

    /// URL after redirects
    pub final_url: String,
}

/// One exclusive browser context.
#[async_trait]
pub trait BrowserSession: Send {
    /// Apply user agent, headers, viewport and stealth settings.
    async fn apply_profile(&mut self, profile: &BrowserProfile) -> FetchResult<()>;

    /// Navigate to the URL and wait as requested.
    async fn navigate(&mut self, url: &str, options: &NavigateOptions) -> FetchResult<Navigation>;

    /// Read the full rendered document.
    async fn content(&mut self) -> FetchResult<String>;

    /// Release the session. Called exactly once.
    async fn close(&mut self) -> FetchResult<()>;
}

/// Factory for isolated sessions.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn open_session(&self) -> FetchResult<Box<dyn BrowserSession>>;

    /// Backend name (for logging/debugging).
    fn name(&self) -> &str {
        "unknown"
    }
}
