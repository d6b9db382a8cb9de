//! Rendered page retrieval through an isolated browser session.

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::{FetchError, FetchResult};
use crate::fetch::rate_limit::RateLimiter;
use crate::traits::browser::{Browser, BrowserProfile, BrowserSession, NavigateOptions, WaitUntil};
use crate::types::config::FetchConfig;

/// Markers of interstitial "access denied" pages served with a 200 status.
const BLOCK_PAGE_MARKERS: &[&str] = &[
    "<title>access denied</title>",
    "attention required! | cloudflare",
    "cf-chl-bypass",
    "request unsuccessful. incapsula incident",
    "<title>403 forbidden</title>",
];

/// Fetches fully-rendered HTML, one browser session per call.
///
/// # Example
///
/// ```rust,ignore
/// let limiter = Arc::new(RateLimiter::default());
/// let fetcher = PageFetcher::new(BrowserlessBrowser::new("http://localhost:3000", None), limiter);
/// let html = fetcher.fetch("https://www.ontario.ca/laws/statute/00e41").await?;
/// ```
pub struct PageFetcher<B: Browser> {
    browser: B,
    limiter: Arc<RateLimiter>,
    config: FetchConfig,
}

impl<B: Browser> PageFetcher<B> {
    /// Create a fetcher sharing the given limiter.
    pub fn new(browser: B, limiter: Arc<RateLimiter>) -> Self {
        Self {
            browser,
            limiter,
            config: FetchConfig::default(),
        }
    }

    /// Set fetch configuration.
    pub fn with_config(mut self, config: FetchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn browser(&self) -> &B {
        &self.browser
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Retrieve the rendered document at `url`.
    ///
    /// The session is closed before any error propagates.
    #[instrument(skip(self), fields(browser = self.browser.name()))]
    pub async fn fetch(&self, url: &str) -> FetchResult<String> {
        let site = site_of(url)?;

        self.limiter.throttle().await;

        let mut session = self.browser.open_session().await?;
        debug!(url = %url, "Browser session opened");

        let result = self.render(session.as_mut(), url, &site).await;

        if let Err(e) = session.close().await {
            warn!(url = %url, error = %e, "Failed to close browser session");
        }

        match &result {
            Ok(html) => info!(url = %url, html_len = html.len(), "Page rendered"),
            Err(e) => warn!(url = %url, error = %e, "Page fetch failed"),
        }

        result
    }

    async fn render(
        &self,
        session: &mut dyn BrowserSession,
        url: &str,
        site: &str,
    ) -> FetchResult<String> {
        session.apply_profile(&self.profile()).await?;

        let navigation = session.navigate(url, &self.navigate_options()).await?;

        if let Some(status) = navigation.status {
            classify_status(url, site, status)?;
        }

        let html = session.content().await?;

        if looks_like_block_page(&html) {
            return Err(FetchError::Blocked {
                url: url.to_string(),
                site: site.to_string(),
                status: navigation.status.unwrap_or(403),
            });
        }

        Ok(html)
    }

    fn profile(&self) -> BrowserProfile {
        BrowserProfile {
            user_agent: self.config.user_agent.clone(),
            headers: self.config.headers.clone(),
            viewport: self.config.viewport,
            stealth: self.config.stealth,
        }
    }

    fn navigate_options(&self) -> NavigateOptions {
        NavigateOptions {
            wait_until: WaitUntil::NetworkIdle,
            timeout: self.config.navigation_timeout,
            settle: self.config.settle,
        }
    }
}

/// Host of an absolute http(s) URL.
fn site_of(url: &str) -> FetchResult<String> {
    let invalid = || FetchError::InvalidUrl {
        url: url.to_string(),
    };
    let parsed = Url::parse(url).map_err(|_| invalid())?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid());
    }
    parsed.host_str().map(str::to_string).ok_or_else(invalid)
}

fn classify_status(url: &str, site: &str, status: u16) -> FetchResult<()> {
    match status {
        200..=399 => Ok(()),
        401 | 403 => Err(FetchError::Blocked {
            url: url.to_string(),
            site: site.to_string(),
            status,
        }),
        _ => Err(FetchError::Status {
            url: url.to_string(),
            status,
        }),
    }
}

fn looks_like_block_page(html: &str) -> bool {
    // Interstitials are short; real statutes never are
    if html.len() > 20_000 {
        return false;
    }
    let lower = html.to_ascii_lowercase();
    BLOCK_PAGE_MARKERS.iter().any(|m| lower.contains(m))
}
