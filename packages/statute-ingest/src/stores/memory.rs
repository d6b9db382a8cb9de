//! In-memory storage implementation for testing and development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

use crate::error::{IngestError, Result};
use crate::traits::store::{DomainStore, ProvisionStore, SlotStore, SourceStore, UpsertOutcome};
use crate::types::{
    domain::LegalDomain,
    slot::{BatchRef, GeneratedSlot, Slot},
    source::{LegalProvision, LegalSource, NewLegalSource, NewProvision},
};

/// In-memory storage for sources, provisions, slots and domains.
///
/// Useful for testing and dry runs. Not suitable for production
/// as data is lost on restart.
pub struct MemoryStore {
    sources: RwLock<HashMap<Uuid, LegalSource>>,
    provisions: RwLock<HashMap<Uuid, Vec<LegalProvision>>>,
    slots: RwLock<Vec<Slot>>,
    domains: RwLock<Vec<LegalDomain>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: PoisonError<T>) -> IngestError {
    IngestError::storage("memory store lock poisoned")
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(HashMap::new()),
            provisions: RwLock::new(HashMap::new()),
            slots: RwLock::new(Vec::new()),
            domains: RwLock::new(Vec::new()),
        }
    }

    /// Seed the domain catalogue.
    pub fn with_domains(self, domains: Vec<LegalDomain>) -> Self {
        if let Ok(mut catalogue) = self.domains.write() {
            *catalogue = domains;
        }
        self
    }

    /// Get the number of stored sources.
    pub fn source_count(&self) -> usize {
        self.sources.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Get the number of stored slots across all sources.
    pub fn slot_count(&self) -> usize {
        self.slots.read().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl SourceStore for MemoryStore {
    async fn upsert_source(&self, source: &NewLegalSource) -> Result<UpsertOutcome> {
        let mut sources = self.sources.write().map_err(poisoned)?;

        if let Some(existing) = sources.values_mut().find(|s| s.citation == source.citation) {
            let content_changed = existing.apply_update(source.clone());
            return Ok(UpsertOutcome {
                source: existing.clone(),
                created: false,
                content_changed,
            });
        }

        let created = LegalSource::from_new(source.clone());
        sources.insert(created.id, created.clone());
        Ok(UpsertOutcome {
            source: created,
            created: true,
            content_changed: true,
        })
    }

    async fn get_source(&self, id: Uuid) -> Result<Option<LegalSource>> {
        Ok(self.sources.read().map_err(poisoned)?.get(&id).cloned())
    }

    async fn get_source_by_citation(&self, citation: &str) -> Result<Option<LegalSource>> {
        Ok(self
            .sources
            .read()
            .map_err(poisoned)?
            .values()
            .find(|s| s.citation == citation)
            .cloned())
    }

    async fn latest_unprocessed_source(&self) -> Result<Option<LegalSource>> {
        Ok(self
            .sources
            .read()
            .map_err(poisoned)?
            .values()
            .filter(|s| !s.ai_processed)
            .max_by_key(|s| (s.captured_at, s.id))
            .cloned())
    }

    async fn mark_processed(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let mut sources = self.sources.write().map_err(poisoned)?;
        let source = sources
            .get_mut(&id)
            .ok_or(IngestError::SourceNotFound { id })?;

        if source.ai_processed {
            return Ok(false);
        }
        source.ai_processed = true;
        source.ai_processed_at = Some(at);
        Ok(true)
    }
}

#[async_trait]
impl ProvisionStore for MemoryStore {
    async fn replace_provisions(
        &self,
        source_id: Uuid,
        version: i32,
        provisions: &[NewProvision],
    ) -> Result<Vec<LegalProvision>> {
        if !self.sources.read().map_err(poisoned)?.contains_key(&source_id) {
            return Err(IngestError::SourceNotFound { id: source_id });
        }

        let mut stored: Vec<LegalProvision> = provisions
            .iter()
            .cloned()
            .map(|p| LegalProvision::from_new(source_id, version, p))
            .collect();
        stored.sort_by_key(|p| p.sort_order);

        self.provisions
            .write()
            .map_err(poisoned)?
            .insert(source_id, stored.clone());
        Ok(stored)
    }

    async fn provisions_for_source(&self, source_id: Uuid) -> Result<Vec<LegalProvision>> {
        Ok(self
            .provisions
            .read()
            .map_err(poisoned)?
            .get(&source_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl SlotStore for MemoryStore {
    async fn existing_slots(&self, source_id: Uuid, domain_slug: &str) -> Result<Vec<Slot>> {
        let mut slots: Vec<Slot> = self
            .slots
            .read()
            .map_err(poisoned)?
            .iter()
            .filter(|s| s.source_id == source_id && s.domain_slug == domain_slug)
            .cloned()
            .collect();
        slots.sort_by_key(|s| s.batch.index);
        Ok(slots)
    }

    async fn save_slots(
        &self,
        source_id: Uuid,
        domain_slug: &str,
        batch: BatchRef,
        slots: &[GeneratedSlot],
    ) -> Result<Vec<Slot>> {
        let saved: Vec<Slot> = slots
            .iter()
            .cloned()
            .map(|g| Slot::from_generated(source_id, domain_slug, batch, g))
            .collect();
        self.slots
            .write()
            .map_err(poisoned)?
            .extend(saved.iter().cloned());
        Ok(saved)
    }

    async fn delete_slots_for_source(&self, source_id: Uuid) -> Result<usize> {
        let mut slots = self.slots.write().map_err(poisoned)?;
        let before = slots.len();
        slots.retain(|s| s.source_id != source_id);
        Ok(before - slots.len())
    }
}

#[async_trait]
impl DomainStore for MemoryStore {
    async fn list_domains(&self) -> Result<Vec<LegalDomain>> {
        Ok(self.domains.read().map_err(poisoned)?.clone())
    }
}
