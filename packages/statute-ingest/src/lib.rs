//! Statute Ingestion Library
//!
//! Ingests statutory text from government legislation sites, turns it into
//! structured provisions, links each source to the legal domains it governs
//! and infers reusable "slots" (decision-relevant facts) per domain.
//!
//! # Design Philosophy
//!
//! - No per-site selectors: a model reads the page, repair rules make the
//!   output usable whatever its shape
//! - Relevance is data: jurisdictions are added as rules, not code
//! - Batches fail alone: one bad model call never discards sibling work
//! - Library handles mechanics, app handles storage and triggering
//!
//! # Usage
//!
//! ```rust,ignore
//! use statute_ingest::{
//!     BrowserlessBrowser, IngestOptions, IngestionCoordinator, MemoryStore, PageFetcher,
//!     RateLimiter, SlotRunOptions,
//! };
//!
//! let store = Arc::new(MemoryStore::new());
//! let fetcher = PageFetcher::new(
//!     BrowserlessBrowser::new("http://localhost:3000", None),
//!     Arc::new(RateLimiter::default()),
//! );
//! let coordinator = IngestionCoordinator::new(store, fetcher, Arc::new(model));
//!
//! let outcome = coordinator
//!     .ingest_url(
//!         "https://www.ontario.ca/laws/statute/00e41",
//!         &IngestOptions::new("CA-ON")
//!             .with_primary_domain("wrongful-termination")
//!             .with_domain_links(true)
//!             .with_slots(SlotRunOptions::new("wrongful-termination")),
//!     )
//!     .await?;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Core trait abstractions (LanguageModel, Browser, LegalStore)
//! - [`types`] - Statute, source, slot and config types
//! - [`fetch`] - Rate limiting and rendered page retrieval
//! - [`pipeline`] - Extraction, relevance, slot generation and ingest flow
//! - [`stores`] - Storage implementations (MemoryStore, PostgresStore)
//! - [`testing`] - Mock implementations for testing

pub mod error;
pub mod fetch;
pub mod pipeline;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

#[cfg(feature = "openai")]
pub mod ai;

// Re-export core types at crate root
pub use error::{ErrorPayload, FetchError, IngestError, ModelError, Result};
pub use traits::{
    ai::LanguageModel,
    browser::{Browser, BrowserProfile, BrowserSession, NavigateOptions, Navigation, WaitUntil},
    store::{DomainStore, LegalStore, ProvisionStore, SlotStore, SourceStore, UpsertOutcome},
};
pub use types::{
    config::{ExtractorConfig, FetchConfig, SlotRunOptions},
    domain::{DomainRelevance, LegalDomain},
    slot::{BatchRef, GeneratedSlot, Importance, Slot, SlotType},
    source::{LegalProvision, LegalSource, NewLegalSource, NewProvision},
    statute::{ExtractedSection, ExtractedStatute},
};

// Re-export fetch components
pub use fetch::{BrowserlessBrowser, PageFetcher, RateLimiter};

// Re-export pipeline components
pub use pipeline::{
    BatchFailure, BatchSlotOrchestrator, IngestOptions, IngestOutcome, IngestionCoordinator,
    RelevanceEngine, RelevanceRule, RuleTable, SlotGenerator, SlotRunSummary, StructuredExtractor,
    RELEVANCE_THRESHOLD,
};

// Re-export stores
pub use stores::MemoryStore;

#[cfg(feature = "postgres")]
pub use stores::PostgresStore;

#[cfg(feature = "openai")]
pub use ai::OpenAI;
