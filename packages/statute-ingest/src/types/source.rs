//! Legal source and provision records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::statute::{ExtractedSection, ExtractedStatute};

/// Creator tag recorded on sources written by the scraper.
pub const SCRAPER_CREATOR: &str = "scraper";

/// One ingested statute or regulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegalSource {
    pub id: Uuid,

    /// Unique human-readable identifier; the upsert key
    pub citation: String,

    pub long_title: String,

    pub short_title: Option<String>,

    pub full_text: String,

    /// Page the source was captured from
    pub url: String,

    /// SHA-256 of `full_text`
    pub content_hash: String,

    pub captured_at: DateTime<Utc>,

    /// False until a slot generation run completes for this version
    pub ai_processed: bool,

    pub ai_processed_at: Option<DateTime<Utc>>,

    pub created_by: String,

    /// Bumped each time the citation is re-ingested with different text
    pub version: i32,

    pub in_force: bool,

    /// Owning jurisdiction code (e.g. "CA-ON")
    pub jurisdiction: String,

    /// Domain slug the source was ingested for
    pub primary_domain: Option<String>,
}

impl LegalSource {
    /// Materialise a new record at version 1.
    pub fn from_new(new: NewLegalSource) -> Self {
        Self {
            id: Uuid::now_v7(),
            citation: new.citation,
            long_title: new.long_title,
            short_title: new.short_title,
            full_text: new.full_text,
            url: new.url,
            content_hash: new.content_hash,
            captured_at: new.captured_at,
            ai_processed: false,
            ai_processed_at: None,
            created_by: new.created_by,
            version: 1,
            in_force: new.in_force,
            jurisdiction: new.jurisdiction,
            primary_domain: new.primary_domain,
        }
    }

    /// Apply a re-ingest of the same citation.
    ///
    /// Changed text bumps the version and clears the processed flag, since
    /// the provisions the slots were inferred from are replaced. Unchanged
    /// text only refreshes the capture metadata.
    pub fn apply_update(&mut self, new: NewLegalSource) -> bool {
        let changed = self.content_hash != new.content_hash;
        self.long_title = new.long_title;
        self.short_title = new.short_title;
        self.url = new.url;
        self.captured_at = new.captured_at;
        self.in_force = new.in_force;
        self.jurisdiction = new.jurisdiction;
        if new.primary_domain.is_some() {
            self.primary_domain = new.primary_domain;
        }
        if changed {
            self.full_text = new.full_text;
            self.content_hash = new.content_hash;
            self.version += 1;
            self.ai_processed = false;
            self.ai_processed_at = None;
        }
        changed
    }

    /// Short title when present, otherwise the long title.
    pub fn display_title(&self) -> &str {
        self.short_title.as_deref().unwrap_or(&self.long_title)
    }
}

/// Fields for creating or updating a source, keyed by citation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLegalSource {
    pub citation: String,
    pub long_title: String,
    pub short_title: Option<String>,
    pub full_text: String,
    pub url: String,
    pub content_hash: String,
    pub captured_at: DateTime<Utc>,
    pub created_by: String,
    pub in_force: bool,
    pub jurisdiction: String,
    pub primary_domain: Option<String>,
}

impl NewLegalSource {
    /// Build from an extracted statute.
    pub fn from_statute(statute: &ExtractedStatute, jurisdiction: impl Into<String>) -> Self {
        Self {
            citation: statute.citation.clone(),
            long_title: statute.long_title.clone(),
            short_title: statute.short_title.clone(),
            full_text: statute.full_text.clone(),
            url: statute.url.clone(),
            content_hash: statute.content_hash(),
            captured_at: Utc::now(),
            created_by: SCRAPER_CREATOR.to_string(),
            in_force: true,
            jurisdiction: jurisdiction.into(),
            primary_domain: None,
        }
    }

    /// Set the primary domain slug.
    pub fn with_primary_domain(mut self, slug: impl Into<String>) -> Self {
        self.primary_domain = Some(slug.into());
        self
    }

    /// Set the creator tag.
    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = created_by.into();
        self
    }
}

/// One addressable section of a legal source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegalProvision {
    pub id: Uuid,
    pub source_id: Uuid,

    /// Statute-scoped provision number
    pub number: String,

    pub heading: Option<String>,

    pub text: String,

    /// Canonical reading order, unique within the source
    pub sort_order: i32,

    pub version: i32,

    pub in_force: bool,
}

impl LegalProvision {
    pub fn from_new(source_id: Uuid, version: i32, new: NewProvision) -> Self {
        Self {
            id: Uuid::now_v7(),
            source_id,
            number: new.number,
            heading: new.heading,
            text: new.text,
            sort_order: new.sort_order,
            version,
            in_force: true,
        }
    }
}

/// Fields for creating a provision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProvision {
    pub number: String,
    pub heading: Option<String>,
    pub text: String,
    pub sort_order: i32,
}

impl From<&ExtractedSection> for NewProvision {
    fn from(section: &ExtractedSection) -> Self {
        Self {
            number: section.number.clone(),
            heading: section.heading.clone(),
            text: section.text.clone(),
            sort_order: section.order as i32,
        }
    }
}
