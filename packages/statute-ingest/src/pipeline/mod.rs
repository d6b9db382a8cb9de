//! Ingestion pipeline - the core of the library.
//!
//! The pipeline orchestrates:
//! - Structured extraction of rendered HTML (with repair rules)
//! - Cross-domain relevance from a declarative rule table
//! - Batched slot generation with confidence aggregation
//! - Ingest flow (fetch → extract → upsert → link → slots)

pub mod extract;
pub mod ingest;
pub mod json;
pub mod prompts;
pub mod relevance;
pub mod slots;

pub use extract::{parse_statute_response, synthesize_citation, truncate_html, StructuredExtractor};
pub use ingest::{IngestOptions, IngestOutcome, IngestionCoordinator};
pub use json::{first_json_object, JsonScanError};
pub use prompts::{format_extract_prompt, format_slots_prompt, EXTRACT_STATUTE_PROMPT, GENERATE_SLOTS_PROMPT};
pub use relevance::{
    RelevanceEngine, RelevanceRule, RuleTable, NO_MATCH_REASONING, RELEVANCE_THRESHOLD,
};
pub use slots::{
    parse_slots_response, BatchFailure, BatchSlotOrchestrator, SlotGenerator, SlotRunSummary,
};
