use anyhow::{Context, Result};
use dotenvy::dotenv;
use secrecy::SecretString;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use statute_ingest::types::config::DEFAULT_MIN_DELAY;

/// CLI configuration loaded from environment variables
#[derive(Debug)]
pub struct Config {
    pub browserless_url: String,
    pub browserless_token: Option<SecretString>,
    pub openai_api_key: Option<SecretString>,
    pub openai_model: Option<String>,
    pub database_url: Option<String>,
    pub scrape_min_delay: Duration,
    pub relevance_rules_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            browserless_url: env::var("BROWSERLESS_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            browserless_token: env::var("BROWSERLESS_TOKEN").ok().map(SecretString::from),
            openai_api_key: env::var("OPENAI_API_KEY").ok().map(SecretString::from),
            openai_model: env::var("OPENAI_MODEL").ok(),
            database_url: env::var("DATABASE_URL").ok(),
            scrape_min_delay: match env::var("SCRAPE_MIN_DELAY_MS") {
                Ok(ms) => Duration::from_millis(
                    ms.parse()
                        .context("SCRAPE_MIN_DELAY_MS must be a whole number of milliseconds")?,
                ),
                Err(_) => DEFAULT_MIN_DELAY,
            },
            relevance_rules_path: env::var("RELEVANCE_RULES_PATH").ok().map(PathBuf::from),
        })
    }
}
