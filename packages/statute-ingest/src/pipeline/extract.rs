//! Structured extraction - turn rendered HTML into a statute record.
//!
//! There are no per-jurisdiction selectors. The model reads the page and
//! the repair rules below make its output usable regardless of shape:
//!
//! 1. A missing or placeholder citation is synthesised from the URL's
//!    trailing path segment plus a millisecond timestamp.
//! 2. A missing or placeholder title falls back to the citation.
//! 3. Sections get a zero-based `order` equal to their array position;
//!    section numbers are free text and never used for ordering.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::{IngestError, Result};
use crate::pipeline::json::{first_json_object, string_field};
use crate::pipeline::prompts::{format_extract_prompt, EXTRACT_SYSTEM_PROMPT, PLACEHOLDER};
use crate::traits::ai::LanguageModel;
use crate::types::{
    config::ExtractorConfig,
    statute::{ExtractedSection, ExtractedStatute},
};

/// Extracts statutes from HTML with a language model.
pub struct StructuredExtractor<M: LanguageModel> {
    model: M,
    config: ExtractorConfig,
}

impl<M: LanguageModel> StructuredExtractor<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            config: ExtractorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ExtractorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Extract a statute from rendered HTML.
    pub async fn extract(&self, html: &str, url: &str) -> Result<ExtractedStatute> {
        self.extract_with_cancel(html, url, &CancellationToken::new())
            .await
    }

    /// Extract, abandoning the model call if `cancel` fires first.
    #[instrument(skip(self, html, cancel), fields(html_len = html.len(), model = self.model.name()))]
    pub async fn extract_with_cancel(
        &self,
        html: &str,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<ExtractedStatute> {
        let html = truncate_html(html, self.config.max_html_chars, url);
        let prompt = format_extract_prompt(url, html);

        let raw = complete_with_deadline(
            &self.model,
            EXTRACT_SYSTEM_PROMPT,
            &prompt,
            self.config.timeout,
            cancel,
        )
        .await?;

        let statute = parse_statute_response(&raw, url, Utc::now())?;

        info!(
            url = %url,
            citation = %statute.citation,
            sections = statute.sections.len(),
            "Statute extracted"
        );

        Ok(statute)
    }
}

/// Race a model call against a deadline and a cancellation token.
///
/// Whichever finishes first wins; the losing request future is dropped,
/// which abandons the wait without guaranteeing the provider stops work.
pub(crate) async fn complete_with_deadline<M: LanguageModel + ?Sized>(
    model: &M,
    system: &str,
    prompt: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<String> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(IngestError::Cancelled),
        response = model.complete(system, prompt) => response.map_err(IngestError::from),
        _ = tokio::time::sleep(timeout) => {
            warn!(timeout_secs = timeout.as_secs(), model = model.name(), "Model call exceeded deadline");
            Err(IngestError::ExtractionTimeout { after: timeout })
        }
    }
}

/// Cap HTML at `max_chars` characters on a char boundary.
pub fn truncate_html<'a>(html: &'a str, max_chars: usize, url: &str) -> &'a str {
    match html.char_indices().nth(max_chars) {
        Some((cut, _)) => {
            warn!(
                url = %url,
                original_bytes = html.len(),
                kept_bytes = cut,
                max_chars,
                "Truncating HTML before extraction"
            );
            &html[..cut]
        }
        None => html,
    }
}

/// Parse and repair a raw model response into a statute.
///
/// `now` feeds citation synthesis so repeated runs never collide.
pub fn parse_statute_response(raw: &str, url: &str, now: DateTime<Utc>) -> Result<ExtractedStatute> {
    let map = first_json_object(raw).map_err(|e| IngestError::MalformedModelResponse {
        reason: e.to_string(),
    })?;

    // 1. Citation
    let citation = match present(&map, &["citation"]) {
        Some(citation) => citation,
        None => {
            let synthesized = synthesize_citation(url, now);
            warn!(url = %url, citation = %synthesized, "Model gave no citation, synthesized one");
            synthesized
        }
    };

    // 2. Title
    let long_title = present(&map, &["title", "longTitle", "long_title"])
        .unwrap_or_else(|| citation.clone());

    let short_title = present(&map, &["shortTitle", "short_title"]);

    // 3. Sections, ordered by array position
    let sections = repair_sections(map.get("sections"));

    let full_text = present(&map, &["fullText", "full_text"]).unwrap_or_else(|| {
        debug!(url = %url, "Model gave no fullText, rebuilding from sections");
        sections
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    });

    Ok(ExtractedStatute {
        citation,
        long_title,
        short_title,
        full_text,
        sections,
        url: url.to_string(),
    })
}

/// Citation built from the URL's last path segment and a timestamp.
pub fn synthesize_citation(url: &str, now: DateTime<Utc>) -> String {
    let segment = Url::parse(url)
        .ok()
        .and_then(|u| {
            let last = u
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                .map(str::to_string);
            last.or_else(|| u.host_str().map(str::to_string))
        })
        .map(|s| sanitize_segment(&s))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "source".to_string());

    format!("{}-{}", segment, now.timestamp_millis())
}

fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}

fn is_placeholder(value: &str) -> bool {
    let value = value.trim();
    value.eq_ignore_ascii_case(PLACEHOLDER)
        || value.eq_ignore_ascii_case("null")
        || value.eq_ignore_ascii_case("n/a")
}

/// String field that is present, non-empty and not a placeholder.
fn present(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    string_field(map, keys).filter(|v| !is_placeholder(v))
}

fn repair_sections(value: Option<&Value>) -> Vec<ExtractedSection> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let Value::Object(section) = item else {
                return None;
            };
            let heading = present(section, &["heading", "title"]);
            let text = string_field(section, &["text", "content", "body"]).unwrap_or_default();
            if text.is_empty() && heading.is_none() {
                return None;
            }
            let number = present(section, &["number", "section", "id"]);
            Some((number, heading, text))
        })
        .enumerate()
        .map(|(position, (number, heading, text))| ExtractedSection {
            number: number.unwrap_or_else(|| (position + 1).to_string()),
            heading,
            text,
            order: position as u32,
        })
        .collect()
}
