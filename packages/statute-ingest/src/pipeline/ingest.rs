//! End-to-end ingestion of one statute URL.
//!
//! ```text
//! URL ──► PageFetcher ──► StructuredExtractor ──► upsert by citation
//!                                                     │
//!                          ┌──────────────────────────┴───────────┐
//!                          ▼                                      ▼
//!                   RelevanceEngine                    BatchSlotOrchestrator
//!                   (optional, computed)               (optional)
//! ```
//!
//! Relevance links are computed views. They are returned to the caller
//! and recomputed on demand by [`IngestionCoordinator::link_domains`];
//! nothing here persists them.

use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{IngestError, Result};
use crate::fetch::PageFetcher;
use crate::pipeline::{
    extract::StructuredExtractor,
    relevance::RelevanceEngine,
    slots::{BatchSlotOrchestrator, SlotGenerator, SlotRunSummary},
};
use crate::traits::{ai::LanguageModel, browser::Browser, store::LegalStore};
use crate::types::{
    config::{ExtractorConfig, SlotRunOptions},
    domain::DomainRelevance,
    source::{LegalSource, NewLegalSource, NewProvision, SCRAPER_CREATOR},
};

/// Options for [`IngestionCoordinator::ingest_url`].
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Jurisdiction code recorded on the source (e.g. "CA-ON")
    pub jurisdiction: String,

    /// Domain the source is being ingested for
    pub primary_domain: Option<String>,

    pub created_by: String,

    /// Compute cross-domain relevance after persisting
    pub link_domains: bool,

    /// Run slot generation after persisting
    pub slots: Option<SlotRunOptions>,
}

impl IngestOptions {
    pub fn new(jurisdiction: impl Into<String>) -> Self {
        Self {
            jurisdiction: jurisdiction.into(),
            primary_domain: None,
            created_by: SCRAPER_CREATOR.to_string(),
            link_domains: false,
            slots: None,
        }
    }

    pub fn with_primary_domain(mut self, slug: impl Into<String>) -> Self {
        self.primary_domain = Some(slug.into());
        self
    }

    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = created_by.into();
        self
    }

    pub fn with_domain_links(mut self, enabled: bool) -> Self {
        self.link_domains = enabled;
        self
    }

    pub fn with_slots(mut self, options: SlotRunOptions) -> Self {
        self.slots = Some(options);
        self
    }
}

/// What one ingestion produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    pub source: LegalSource,

    /// No source with this citation existed before
    pub created: bool,

    /// Stored text changed (new source or new version)
    pub content_changed: bool,

    /// Provisions now stored for the source
    pub provisions: usize,

    pub relevant_domains: Vec<DomainRelevance>,

    pub slots: Option<SlotRunSummary>,
}

/// Composes fetching, extraction, persistence, relevance and slot generation.
pub struct IngestionCoordinator<S: LegalStore, B: Browser, M: LanguageModel> {
    store: Arc<S>,
    fetcher: PageFetcher<B>,
    model: Arc<M>,
    extractor: StructuredExtractor<Arc<M>>,
    relevance: RelevanceEngine,
    slots: BatchSlotOrchestrator<S, Arc<M>>,
    cancel: CancellationToken,
}

impl<S: LegalStore, B: Browser, M: LanguageModel> IngestionCoordinator<S, B, M> {
    /// Create a coordinator with default extraction, relevance and slot settings.
    pub fn new(store: Arc<S>, fetcher: PageFetcher<B>, model: Arc<M>) -> Self {
        Self {
            extractor: StructuredExtractor::new(model.clone()),
            relevance: RelevanceEngine::default(),
            slots: BatchSlotOrchestrator::new(store.clone(), SlotGenerator::new(model.clone())),
            cancel: CancellationToken::new(),
            store,
            fetcher,
            model,
        }
    }

    pub fn with_extractor_config(mut self, config: ExtractorConfig) -> Self {
        self.extractor = StructuredExtractor::new(self.model.clone()).with_config(config);
        self
    }

    pub fn with_relevance(mut self, relevance: RelevanceEngine) -> Self {
        self.relevance = relevance;
        self
    }

    /// Replace the slot orchestrator (e.g. to change concurrency or deadline).
    pub fn with_slot_orchestrator(mut self, slots: BatchSlotOrchestrator<S, Arc<M>>) -> Self {
        self.slots = slots.with_cancellation(self.cancel.clone());
        self
    }

    /// Abandon in-flight model calls when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.slots = self.slots.with_cancellation(token.clone());
        self.cancel = token;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn fetcher(&self) -> &PageFetcher<B> {
        &self.fetcher
    }

    pub fn relevance(&self) -> &RelevanceEngine {
        &self.relevance
    }

    pub fn slot_orchestrator(&self) -> &BatchSlotOrchestrator<S, Arc<M>> {
        &self.slots
    }

    /// Fetch, extract and persist the statute at `url`.
    #[instrument(skip(self, options), fields(jurisdiction = %options.jurisdiction))]
    pub async fn ingest_url(&self, url: &str, options: &IngestOptions) -> Result<IngestOutcome> {
        let html = self.fetcher.fetch(url).await?;

        let statute = self
            .extractor
            .extract_with_cancel(&html, url, &self.cancel)
            .await?;

        let mut new_source = NewLegalSource::from_statute(&statute, options.jurisdiction.clone())
            .with_created_by(options.created_by.clone());
        if let Some(slug) = &options.primary_domain {
            new_source = new_source.with_primary_domain(slug.clone());
        }

        let upsert = self.store.upsert_source(&new_source).await?;
        let source = upsert.source;

        // Provisions carry the source version they were written for, so a
        // replacement interrupted by a storage error is redone on the next run
        let existing = self.store.provisions_for_source(source.id).await?;
        let stale = upsert.content_changed
            || existing.is_empty()
            || existing.iter().any(|p| p.version != source.version);

        let provisions = if stale {
            if !upsert.created {
                // Slots were inferred from the replaced provisions
                let removed = self.store.delete_slots_for_source(source.id).await?;
                info!(source_id = %source.id, removed, version = source.version, "Provisions out of date, cleared stale slots");
            }
            let new_provisions: Vec<NewProvision> =
                statute.sections.iter().map(NewProvision::from).collect();
            self.store
                .replace_provisions(source.id, source.version, &new_provisions)
                .await?
                .len()
        } else {
            existing.len()
        };

        let relevant_domains = if options.link_domains {
            self.relevant_domains(&source).await?
        } else {
            Vec::new()
        };

        let slots = match &options.slots {
            Some(_) if provisions == 0 => {
                warn!(citation = %source.citation, "Statute has no provisions, skipping slot generation");
                None
            }
            Some(slot_options) => Some(self.slots.process_source(source.id, slot_options).await?),
            None => None,
        };

        info!(
            url = %url,
            citation = %source.citation,
            version = source.version,
            created = upsert.created,
            provisions,
            relevant_domains = relevant_domains.len(),
            "Statute ingested"
        );

        Ok(IngestOutcome {
            // Re-read so a completed slot run's processed flag is reflected
            source: match slots {
                Some(ref summary) if summary.completed => self
                    .store
                    .get_source(source.id)
                    .await?
                    .unwrap_or(source),
                _ => source,
            },
            created: upsert.created,
            content_changed: upsert.content_changed,
            provisions,
            relevant_domains,
            slots,
        })
    }

    /// Recompute relevance for a stored source.
    pub async fn link_domains(&self, source_id: Uuid) -> Result<Vec<DomainRelevance>> {
        let source = self
            .store
            .get_source(source_id)
            .await?
            .ok_or(IngestError::SourceNotFound { id: source_id })?;
        self.relevant_domains(&source).await
    }

    /// Run slot generation for a stored source.
    pub async fn generate_slots(
        &self,
        source_id: Uuid,
        options: &SlotRunOptions,
    ) -> Result<SlotRunSummary> {
        self.slots.process_source(source_id, options).await
    }

    async fn relevant_domains(&self, source: &LegalSource) -> Result<Vec<DomainRelevance>> {
        let domains = self.store.list_domains().await?;
        Ok(self.relevance.find_relevant_domains(source, &domains))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::RateLimiter;
    use crate::stores::MemoryStore;
    use crate::testing::{FailingStore, MockBrowser, MockModel, MockPage, StoreOp};
    use crate::traits::store::{ProvisionStore, SlotStore, SourceStore};
    use crate::types::domain::LegalDomain;
    use std::time::Duration;

    const URL: &str = "https://www.ontario.ca/laws/statute/00e41";

    fn statute_json(section_text: &str) -> String {
        serde_json::json!({
            "citation": "S.O. 2000, c. 41",
            "title": "Employment Standards Act, 2000",
            "sections": [
                {"number": "54", "heading": "Notice", "text": section_text},
                {"number": "57", "heading": "Period of notice", "text": "The notice shall be given..."}
            ],
            "fullText": format!("{section_text} The notice shall be given...")
        })
        .to_string()
    }

    fn coordinator<S: LegalStore>(
        store: Arc<S>,
        model: MockModel,
    ) -> IngestionCoordinator<S, MockBrowser, MockModel> {
        let browser = MockBrowser::new().with_page(URL, MockPage::ok("<html><body>ESA</body></html>"));
        let fetcher = PageFetcher::new(browser, Arc::new(RateLimiter::new(Duration::ZERO)));
        IngestionCoordinator::new(store, fetcher, Arc::new(model))
    }

    #[tokio::test]
    async fn test_reingest_with_changed_text_bumps_version_and_clears_slots() {
        let store = Arc::new(MemoryStore::new().with_domains(vec![LegalDomain::new(
            "wrongful-termination",
            "Wrongful Termination",
        )]));
        let slots = r#"{"slots": [{"key": "notice_weeks", "label": "Notice", "confidence": 0.9}]}"#;
        let options = IngestOptions::new("CA-ON")
            .with_slots(SlotRunOptions::new("wrongful-termination"));

        let first = coordinator(
            store.clone(),
            MockModel::new()
                .with_response_containing("Page HTML:", statute_json("No employer shall terminate..."))
                .with_response_containing("Legal domain:", slots),
        );
        let outcome = first.ingest_url(URL, &options).await.unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.source.version, 1);
        assert!(outcome.source.ai_processed);
        assert_eq!(outcome.provisions, 2);

        let second = coordinator(
            store.clone(),
            MockModel::new()
                .with_response_containing("Page HTML:", statute_json("Amended: no employer shall terminate...")),
        );
        let outcome = second.ingest_url(URL, &IngestOptions::new("CA-ON")).await.unwrap();
        assert!(!outcome.created);
        assert!(outcome.content_changed);
        assert_eq!(outcome.source.version, 2);
        assert!(!outcome.source.ai_processed);

        let id = outcome.source.id;
        assert!(store.existing_slots(id, "wrongful-termination").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reingest_unchanged_keeps_version() {
        let store = Arc::new(MemoryStore::new());
        let model = MockModel::new().with_default_response(statute_json("Same text"));
        let coordinator = coordinator(store.clone(), model);

        let first = coordinator.ingest_url(URL, &IngestOptions::new("CA-ON")).await.unwrap();
        let second = coordinator.ingest_url(URL, &IngestOptions::new("CA-ON")).await.unwrap();

        assert_eq!(first.source.id, second.source.id);
        assert_eq!(second.source.version, 1);
        assert!(!second.content_changed);
        assert_eq!(second.provisions, 2);
    }

    #[tokio::test]
    async fn test_link_domains_unknown_source() {
        let coordinator = coordinator(Arc::new(MemoryStore::new()), MockModel::new());
        let err = coordinator.link_domains(Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, IngestError::SourceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_extraction_failure_persists_nothing() {
        let store = Arc::new(MemoryStore::new());
        let coordinator = coordinator(
            store.clone(),
            MockModel::new().with_default_response("I could not find a statute."),
        );

        let err = coordinator
            .ingest_url(URL, &IngestOptions::new("CA-ON"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::MalformedModelResponse { .. }));
        assert!(store
            .get_source_by_citation("S.O. 2000, c. 41")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_failed_provision_write_is_redone_on_retry() {
        // First replacement succeeds, the one for the amended text fails
        let store = Arc::new(
            FailingStore::new(MemoryStore::new()).fail_after(StoreOp::ReplaceProvisions, 1),
        );

        let original = coordinator(store.clone(), MockModel::new().with_default_response(statute_json("Old text")));
        original.ingest_url(URL, &IngestOptions::new("CA-ON")).await.unwrap();

        let amended = coordinator(
            store.clone(),
            MockModel::new().with_default_response(statute_json("Amended text")),
        );
        let err = amended
            .ingest_url(URL, &IngestOptions::new("CA-ON"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Storage(_)));

        // The source moved to version 2 but its provisions are still version 1
        let source = store
            .get_source_by_citation("S.O. 2000, c. 41")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(source.version, 2);
        let stale = store.provisions_for_source(source.id).await.unwrap();
        assert!(stale.iter().all(|p| p.version == 1));

        // Same text again: the upsert reports no change, provisions are still rewritten
        let outcome = amended.ingest_url(URL, &IngestOptions::new("CA-ON")).await.unwrap();
        assert!(!outcome.content_changed);
        assert_eq!(outcome.source.version, 2);
        assert_eq!(outcome.provisions, 2);

        let provisions = store.provisions_for_source(source.id).await.unwrap();
        assert!(provisions.iter().all(|p| p.version == 2));
        assert_eq!(provisions[0].text, "Amended text");
        assert_eq!(store.call_count(StoreOp::ReplaceProvisions), 3);
    }

    #[tokio::test]
    async fn test_upsert_failure_surfaces_storage_error() {
        let store = Arc::new(FailingStore::new(MemoryStore::new()).fail_once(StoreOp::UpsertSource));
        let coordinator = coordinator(store.clone(), MockModel::new().with_default_response(statute_json("Text")));

        let err = coordinator
            .ingest_url(URL, &IngestOptions::new("CA-ON"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "storage_error");
        assert!(!err.is_retryable());
        assert_eq!(store.inner().source_count(), 0);
        assert_eq!(coordinator.fetcher().browser().open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_slot_save_failure_keeps_source_and_provisions() {
        let store = Arc::new(
            FailingStore::new(MemoryStore::new().with_domains(vec![LegalDomain::new(
                "wrongful-termination",
                "Wrongful Termination",
            )]))
            .fail_once(StoreOp::SaveSlots),
        );
        let slots = r#"{"slots": [{"key": "notice_weeks", "label": "Notice", "confidence": 0.9}]}"#;
        let coordinator = coordinator(
            store.clone(),
            MockModel::new()
                .with_response_containing("Page HTML:", statute_json("No employer shall terminate..."))
                .with_response_containing("Legal domain:", slots),
        );

        let err = coordinator
            .ingest_url(
                URL,
                &IngestOptions::new("CA-ON").with_slots(SlotRunOptions::new("wrongful-termination")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Storage(_)));

        let source = store
            .get_source_by_citation("S.O. 2000, c. 41")
            .await
            .unwrap()
            .unwrap();
        assert!(!source.ai_processed);
        assert_eq!(store.provisions_for_source(source.id).await.unwrap().len(), 2);
        assert_eq!(store.inner().slot_count(), 0);
    }
}
