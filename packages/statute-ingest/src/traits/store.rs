//! Storage traits for sources, provisions, slots and domains.
//!
//! The storage layer is split into focused traits for flexibility:
//! - `SourceStore`: Legal sources, upserted by citation
//! - `ProvisionStore`: Provisions owned by a source
//! - `SlotStore`: Generated slots, grouped by batch
//! - `DomainStore`: The catalogue of legal domains
//! - `LegalStore`: Composite trait combining all four
//!
//! Write failures are surfaced to the caller as `IngestError::Storage`;
//! the pipeline never retries them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{
    domain::LegalDomain,
    slot::{BatchRef, GeneratedSlot, Slot},
    source::{LegalProvision, LegalSource, NewLegalSource, NewProvision},
};

/// Result of an upsert keyed by citation.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub source: LegalSource,

    /// True when no source with this citation existed
    pub created: bool,

    /// True when the stored text changed (new or new version)
    pub content_changed: bool,
}

/// Store for legal sources.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Insert or update the source with this citation.
    async fn upsert_source(&self, source: &NewLegalSource) -> Result<UpsertOutcome>;

    /// Get a source by id.
    async fn get_source(&self, id: Uuid) -> Result<Option<LegalSource>>;

    /// Get a source by citation.
    async fn get_source_by_citation(&self, citation: &str) -> Result<Option<LegalSource>>;

    /// Most recently captured source whose processed flag is false.
    async fn latest_unprocessed_source(&self) -> Result<Option<LegalSource>>;

    /// Set the processed flag and timestamp if not already set.
    ///
    /// Returns false when the flag was already true (no write happened).
    async fn mark_processed(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool>;
}

/// Store for provisions.
#[async_trait]
pub trait ProvisionStore: Send + Sync {
    /// Replace all provisions of a source.
    async fn replace_provisions(
        &self,
        source_id: Uuid,
        version: i32,
        provisions: &[NewProvision],
    ) -> Result<Vec<LegalProvision>>;

    /// Provisions of a source ordered by `sort_order`.
    async fn provisions_for_source(&self, source_id: Uuid) -> Result<Vec<LegalProvision>>;
}

/// Store for generated slots.
#[async_trait]
pub trait SlotStore: Send + Sync {
    /// Slots already saved for a source and domain.
    async fn existing_slots(&self, source_id: Uuid, domain_slug: &str) -> Result<Vec<Slot>>;

    /// Persist the slots produced by one batch.
    async fn save_slots(
        &self,
        source_id: Uuid,
        domain_slug: &str,
        batch: BatchRef,
        slots: &[GeneratedSlot],
    ) -> Result<Vec<Slot>>;

    /// Delete all slots of a source (all domains). Returns the count removed.
    async fn delete_slots_for_source(&self, source_id: Uuid) -> Result<usize>;
}

/// Catalogue of legal domains.
#[async_trait]
pub trait DomainStore: Send + Sync {
    async fn list_domains(&self) -> Result<Vec<LegalDomain>>;

    async fn get_domain(&self, slug: &str) -> Result<Option<LegalDomain>> {
        Ok(self
            .list_domains()
            .await?
            .into_iter()
            .find(|d| d.slug == slug))
    }
}

/// Composite storage trait combining all stores.
///
/// This is the main trait used by the pipeline.
pub trait LegalStore: SourceStore + ProvisionStore + SlotStore + DomainStore {}

// Blanket implementation: anything implementing all four traits is a LegalStore
impl<T> LegalStore for T where T: SourceStore + ProvisionStore + SlotStore + DomainStore {}
