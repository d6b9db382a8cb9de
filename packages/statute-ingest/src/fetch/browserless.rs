//! Headless Chrome through the Browserless `/content` API.
//!
//! Each session is one remote browser context: Browserless opens a fresh
//! incognito page for the request, navigates, waits, serialises the DOM and
//! tears the page down before answering. The status of the target document
//! comes back in the `X-Response-Code` header.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{FetchError, FetchResult};
use crate::traits::browser::{
    Browser, BrowserProfile, BrowserSession, NavigateOptions, Navigation,
};

/// Slack on top of navigation + settle for the HTTP round trip.
const REQUEST_MARGIN: Duration = Duration::from_secs(15);

/// Browserless-backed [`Browser`].
#[derive(Clone)]
pub struct BrowserlessBrowser {
    client: reqwest::Client,
    base_url: String,
    token: Option<Arc<SecretString>>,
}

impl BrowserlessBrowser {
    pub fn new(base_url: &str, token: Option<SecretString>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(Arc::new),
        }
    }

    /// Set a custom HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn endpoint(&self, stealth: bool) -> String {
        let mut endpoint = format!("{}/content", self.base_url);
        let mut params = Vec::new();
        if let Some(ref token) = self.token {
            params.push(format!("token={}", token.expose_secret()));
        }
        if stealth {
            params.push("stealth=true".to_string());
        }
        if !params.is_empty() {
            endpoint.push('?');
            endpoint.push_str(&params.join("&"));
        }
        endpoint
    }
}

#[async_trait]
impl Browser for BrowserlessBrowser {
    async fn open_session(&self) -> FetchResult<Box<dyn BrowserSession>> {
        Ok(Box::new(BrowserlessSession {
            browser: self.clone(),
            profile: None,
            html: None,
            closed: false,
        }))
    }

    fn name(&self) -> &str {
        "browserless"
    }
}

struct BrowserlessSession {
    browser: BrowserlessBrowser,
    profile: Option<BrowserProfile>,
    html: Option<String>,
    closed: bool,
}

impl BrowserlessSession {
    fn ensure_open(&self) -> FetchResult<()> {
        if self.closed {
            return Err(FetchError::browser("browser session already closed"));
        }
        Ok(())
    }

    fn request_body(&self, url: &str, options: &NavigateOptions) -> serde_json::Value {
        let mut body = json!({
            "url": url,
            "gotoOptions": {
                "waitUntil": options.wait_until.as_str(),
                "timeout": options.timeout.as_millis() as u64,
            },
            "waitForTimeout": options.settle.as_millis() as u64,
            "bestAttempt": false,
        });

        if let Some(profile) = &self.profile {
            let headers: HashMap<&str, &str> = profile
                .headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            body["userAgent"] = json!({ "userAgent": profile.user_agent });
            body["setExtraHTTPHeaders"] = json!(headers);
            body["viewport"] = json!({
                "width": profile.viewport.0,
                "height": profile.viewport.1,
            });
        }

        body
    }
}

#[async_trait]
impl BrowserSession for BrowserlessSession {
    async fn apply_profile(&mut self, profile: &BrowserProfile) -> FetchResult<()> {
        self.ensure_open()?;
        self.profile = Some(profile.clone());
        Ok(())
    }

    async fn navigate(&mut self, url: &str, options: &NavigateOptions) -> FetchResult<Navigation> {
        self.ensure_open()?;

        let stealth = self.profile.as_ref().is_some_and(|p| p.stealth);
        let endpoint = self.browser.endpoint(stealth);
        let body = self.request_body(url, options);

        debug!(url = %url, wait_until = options.wait_until.as_str(), "Browserless navigation");

        let resp = self
            .browser
            .client
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .timeout(options.timeout + options.settle + REQUEST_MARGIN)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout {
                        url: url.to_string(),
                    }
                } else {
                    FetchError::browser(e)
                }
            })?;

        let status = resp.status();
        // Browserless answers 408 when page.goto exceeds its timeout
        if status.as_u16() == 408 {
            return Err(FetchError::Timeout {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(FetchError::browser(format!(
                "browserless API error (status {}): {}",
                status.as_u16(),
                message
            )));
        }

        let page_status = resp
            .headers()
            .get("x-response-code")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u16>().ok());
        let final_url = resp
            .headers()
            .get("x-response-url")
            .and_then(|v| v.to_str().ok())
            .unwrap_or(url)
            .to_string();

        let html = resp.text().await.map_err(FetchError::browser)?;
        self.html = Some(html);

        Ok(Navigation {
            status: page_status,
            final_url,
        })
    }

    async fn content(&mut self) -> FetchResult<String> {
        self.ensure_open()?;
        self.html
            .clone()
            .ok_or_else(|| FetchError::browser("content requested before navigation"))
    }

    async fn close(&mut self) -> FetchResult<()> {
        self.closed = true;
        self.html = None;
        self.profile = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::browser::WaitUntil;

    fn session() -> BrowserlessSession {
        BrowserlessSession {
            browser: BrowserlessBrowser::new("http://localhost:3000/", Some(SecretString::from("tok".to_string()))),
            profile: None,
            html: None,
            closed: false,
        }
    }

    #[test]
    fn test_endpoint_includes_token_and_stealth() {
        let browser = BrowserlessBrowser::new("http://localhost:3000/", Some(SecretString::from("tok".to_string())));
        assert_eq!(
            browser.endpoint(true),
            "http://localhost:3000/content?token=tok&stealth=true"
        );

        let anonymous = BrowserlessBrowser::new("http://localhost:3000", None);
        assert_eq!(anonymous.endpoint(false), "http://localhost:3000/content");
    }

    #[tokio::test]
    async fn test_request_body_carries_profile_and_waits() {
        let mut session = session();
        session
            .apply_profile(&BrowserProfile {
                user_agent: "UA".to_string(),
                headers: vec![("Accept-Language".to_string(), "en-CA".to_string())],
                viewport: (1280, 720),
                stealth: true,
            })
            .await
            .unwrap();

        let body = session.request_body(
            "https://laws.example.gov/act",
            &NavigateOptions {
                wait_until: WaitUntil::NetworkIdle,
                timeout: Duration::from_secs(60),
                settle: Duration::from_secs(5),
            },
        );

        assert_eq!(body["gotoOptions"]["waitUntil"], "networkidle0");
        assert_eq!(body["waitForTimeout"], 5000);
        assert_eq!(body["userAgent"]["userAgent"], "UA");
        assert_eq!(body["setExtraHTTPHeaders"]["Accept-Language"], "en-CA");
        // Stealth is requested on the endpoint, never injected into the page
        assert!(body.get("addScriptTag").is_none());
        assert!(session.browser.endpoint(true).ends_with("stealth=true"));
    }

    #[tokio::test]
    async fn test_closed_session_rejects_use() {
        let mut session = session();
        session.close().await.unwrap();
        assert!(session.content().await.is_err());
    }
}
