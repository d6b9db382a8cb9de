//! Slot inference over provision batches.
//!
//! [`SlotGenerator`] turns one batch of provisions into slots with a single
//! model call. [`BatchSlotOrchestrator`] partitions a source's provisions,
//! runs the generator per batch, persists each batch as it completes and
//! aggregates the run.
//!
//! Batches are independent: a failed batch is recorded in the summary and
//! the run moves on. Batches whose sort-order range already has saved slots
//! for the domain are skipped, so re-running after a partial failure only
//! pays for the batches that failed. A re-run must use the batch size of
//! the run that saved them; any other size is rejected as a config error.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{IngestError, Result};
use crate::pipeline::extract::complete_with_deadline;
use crate::pipeline::json::{first_json_object, string_field};
use crate::pipeline::prompts::{format_slots_prompt, SlotPromptContext, SLOT_SYSTEM_PROMPT};
use crate::traits::{ai::LanguageModel, store::LegalStore};
use crate::types::{
    config::{SlotRunOptions, DEFAULT_MODEL_TIMEOUT},
    domain::LegalDomain,
    slot::{clamp_confidence, BatchRef, GeneratedSlot, Importance, SlotType},
    source::{LegalProvision, LegalSource},
};

/// Confidence assumed when the model omits one.
const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Generates slots for one batch of provisions.
pub struct SlotGenerator<M: LanguageModel> {
    model: M,
    timeout: Duration,
}

impl<M: LanguageModel> SlotGenerator<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            timeout: DEFAULT_MODEL_TIMEOUT,
        }
    }

    /// Set the per-call model deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Infer slots for `batch` in the context of `domain`.
    pub async fn generate(
        &self,
        domain: &LegalDomain,
        source: &LegalSource,
        batch: &[LegalProvision],
        cancel: &CancellationToken,
    ) -> Result<Vec<GeneratedSlot>> {
        let context = SlotPromptContext {
            domain,
            source_title: source.display_title(),
            citation: &source.citation,
        };
        let prompt = format_slots_prompt(&context, batch);

        let raw =
            complete_with_deadline(&self.model, SLOT_SYSTEM_PROMPT, &prompt, self.timeout, cancel)
                .await?;

        parse_slots_response(&raw)
    }
}

/// Parse and repair a raw slot response.
///
/// Entries without both key and label are dropped; a repeated key keeps
/// its first occurrence.
pub fn parse_slots_response(raw: &str) -> Result<Vec<GeneratedSlot>> {
    let map = first_json_object(raw).map_err(|e| IngestError::MalformedModelResponse {
        reason: e.to_string(),
    })?;

    let Some(Value::Array(items)) = map.get("slots") else {
        return Err(IngestError::MalformedModelResponse {
            reason: "response has no \"slots\" array".to_string(),
        });
    };

    let mut seen = HashSet::new();
    let slots = items
        .iter()
        .filter_map(|item| match item {
            Value::Object(entry) => repair_slot(entry),
            _ => None,
        })
        .filter(|slot| seen.insert(slot.key.clone()))
        .collect();

    Ok(slots)
}

fn repair_slot(entry: &Map<String, Value>) -> Option<GeneratedSlot> {
    let label = string_field(entry, &["label", "name"]);
    let key = string_field(entry, &["key", "id"])
        .map(|k| snake_case(&k))
        .filter(|k| !k.is_empty())
        .or_else(|| label.as_deref().map(snake_case).filter(|k| !k.is_empty()))?;
    let label = label.unwrap_or_else(|| key.replace('_', " "));

    let slot_type = string_field(entry, &["type", "slotType", "slot_type"])
        .and_then(|t| SlotType::parse(&t))
        .unwrap_or_default();
    let importance = string_field(entry, &["importance", "priority"])
        .and_then(|i| Importance::parse(&i))
        .unwrap_or_default();
    let confidence = entry
        .get("confidence")
        .and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .map(clamp_confidence)
        .unwrap_or(DEFAULT_CONFIDENCE);

    let provision_numbers = match entry.get("provisions").or_else(|| entry.get("provisionNumbers")) {
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    Some(GeneratedSlot {
        key,
        label,
        description: string_field(entry, &["description"]).unwrap_or_default(),
        slot_type,
        importance,
        confidence,
        provision_numbers,
    })
}

/// Lowercase snake_case identifier from free text.
fn snake_case(text: &str) -> String {
    let mut key = String::with_capacity(text.len());
    for c in text.trim().chars() {
        if c.is_ascii_alphanumeric() {
            key.push(c.to_ascii_lowercase());
        } else if !key.ends_with('_') {
            key.push('_');
        }
    }
    key.trim_matches('_').to_string()
}

/// A batch that produced no slots because generation failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub batch_index: u32,
    pub error: String,
}

/// Aggregate result of one slot generation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotRunSummary {
    pub source_id: Uuid,
    pub domain_slug: String,

    /// Slots across successful and resumed batches
    pub total_slots: usize,

    /// Number of batches the provisions were partitioned into
    pub batches: usize,

    /// Batches skipped because their slots were already saved
    pub batches_resumed: usize,

    /// Mean confidence over all counted slots; 0 when there are none
    pub average_confidence: f64,

    /// Slot count per batch index (0 for failed batches)
    pub slots_per_batch: Vec<usize>,

    pub failures: Vec<BatchFailure>,

    /// True when every batch succeeded and the source was marked processed
    pub completed: bool,
}

impl SlotRunSummary {
    pub fn batches_succeeded(&self) -> usize {
        self.batches - self.failures.len()
    }
}

/// Runs slot generation over every batch of a source.
pub struct BatchSlotOrchestrator<S: LegalStore, M: LanguageModel> {
    store: Arc<S>,
    generator: SlotGenerator<M>,
    concurrency: usize,
    cancel: CancellationToken,
}

impl<S: LegalStore, M: LanguageModel> BatchSlotOrchestrator<S, M> {
    pub fn new(store: Arc<S>, generator: SlotGenerator<M>) -> Self {
        Self {
            store,
            generator,
            concurrency: 1,
            cancel: CancellationToken::new(),
        }
    }

    /// Run up to `n` batches at once. Results are still saved in batch order.
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Abort the run when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn generator(&self) -> &SlotGenerator<M> {
        &self.generator
    }

    /// Generate slots for the most recently captured unprocessed source.
    pub async fn process_next_unprocessed(&self, options: &SlotRunOptions) -> Result<SlotRunSummary> {
        let source = self
            .store
            .latest_unprocessed_source()
            .await?
            .ok_or(IngestError::NothingToProcess)?;
        self.process_source(source.id, options).await
    }

    /// Generate slots for every batch of the source's provisions.
    #[instrument(skip(self, options), fields(domain = %options.domain_slug, batch_size = options.batch_size))]
    pub async fn process_source(
        &self,
        source_id: Uuid,
        options: &SlotRunOptions,
    ) -> Result<SlotRunSummary> {
        if options.batch_size == 0 {
            return Err(IngestError::Config("batch_size must be at least 1".into()));
        }

        let source = self
            .store
            .get_source(source_id)
            .await?
            .ok_or(IngestError::SourceNotFound { id: source_id })?;

        let domain = match self.store.get_domain(&options.domain_slug).await? {
            Some(domain) => domain,
            None => {
                warn!(domain = %options.domain_slug, "Domain not in catalogue, using slug as name");
                LegalDomain::new(&options.domain_slug, &options.domain_slug)
            }
        };

        let provisions = self.store.provisions_for_source(source_id).await?;
        if provisions.is_empty() {
            return Err(IngestError::NoProvisions { id: source_id });
        }

        let batches = partition(&provisions, options.batch_size);

        // Confidences of slots already saved, keyed by batch range
        let mut saved: HashMap<(i32, i32), Vec<f64>> = HashMap::new();
        for slot in self.store.existing_slots(source_id, &domain.slug).await? {
            saved
                .entry((slot.batch.first_sort_order, slot.batch.last_sort_order))
                .or_default()
                .push(slot.confidence);
        }

        // Saved slots are resumed by batch range, which only lines up when
        // the batch size matches the run that saved them
        if let Some((first, last)) = saved.keys().find(|range| {
            !batches
                .iter()
                .any(|(b, _)| (b.first_sort_order, b.last_sort_order) == **range)
        }) {
            return Err(IngestError::Config(
                format!(
                    "saved slots for {} cover provisions {first}..={last}, which is not a batch at batch_size {}; resume with the original batch size",
                    domain.slug, options.batch_size
                )
                .into(),
            ));
        }

        let mut confidences: Vec<f64> = Vec::new();
        let mut slots_per_batch = vec![0usize; batches.len()];
        let mut batches_resumed = 0;
        let mut pending = Vec::new();

        for (batch, chunk) in &batches {
            match saved.get(&(batch.first_sort_order, batch.last_sort_order)) {
                Some(existing) => {
                    debug!(batch = batch.index, slots = existing.len(), "Batch already generated, skipping");
                    slots_per_batch[batch.index as usize] = existing.len();
                    confidences.extend(existing);
                    batches_resumed += 1;
                }
                None => pending.push((*batch, *chunk)),
            }
        }

        info!(
            source_id = %source_id,
            provisions = provisions.len(),
            batches = batches.len(),
            resumed = batches_resumed,
            "Starting slot generation"
        );

        let generator = &self.generator;
        let cancel = &self.cancel;
        let (domain_ref, source_ref) = (&domain, &source);

        let mut failures = Vec::new();
        let mut results = stream::iter(pending)
            .map(|(batch, chunk)| async move {
                let outcome = generator.generate(domain_ref, source_ref, chunk, cancel).await;
                (batch, outcome)
            })
            .buffered(self.concurrency);

        while let Some((batch, outcome)) = results.next().await {
            match outcome {
                Ok(generated) => {
                    if !generated.is_empty() {
                        self.store
                            .save_slots(source_id, &domain.slug, batch, &generated)
                            .await?;
                    }
                    debug!(batch = batch.index, slots = generated.len(), "Batch generated");
                    slots_per_batch[batch.index as usize] = generated.len();
                    confidences.extend(generated.iter().map(|s| s.confidence));
                }
                Err(IngestError::Cancelled) => return Err(IngestError::Cancelled),
                Err(e) => {
                    warn!(batch = batch.index, error = %e, "Batch slot generation failed");
                    failures.push(BatchFailure {
                        batch_index: batch.index,
                        error: e.to_string(),
                    });
                }
            }
        }

        let completed = failures.is_empty();
        if completed {
            let marked = self.store.mark_processed(source_id, Utc::now()).await?;
            if !marked {
                debug!(source_id = %source_id, "Source was already marked processed");
            }
        }

        let total_slots = confidences.len();
        let average_confidence = if total_slots == 0 {
            0.0
        } else {
            confidences.iter().sum::<f64>() / total_slots as f64
        };

        info!(
            source_id = %source_id,
            total_slots,
            average_confidence,
            failed_batches = failures.len(),
            completed,
            "Slot generation finished"
        );

        Ok(SlotRunSummary {
            source_id,
            domain_slug: domain.slug.clone(),
            total_slots,
            batches: batches.len(),
            batches_resumed,
            average_confidence,
            slots_per_batch,
            failures,
            completed,
        })
    }
}

/// Fixed-size batches in sort order.
fn partition(provisions: &[LegalProvision], batch_size: usize) -> Vec<(BatchRef, &[LegalProvision])> {
    provisions
        .chunks(batch_size)
        .enumerate()
        .filter_map(|(index, chunk)| {
            let first = chunk.first()?;
            let last = chunk.last()?;
            Some((
                BatchRef {
                    index: index as u32,
                    first_sort_order: first.sort_order,
                    last_sort_order: last.sort_order,
                },
                chunk,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use crate::testing::{
        sample_provisions, sample_source_new, FailingStore, MockFailure, MockModel, StoreOp,
    };
    use crate::traits::store::{ProvisionStore, SlotStore, SourceStore};

    const DOMAIN: &str = "wrongful-termination";

    fn slots_json(confidences: &[f64]) -> String {
        let slots: Vec<Value> = confidences
            .iter()
            .enumerate()
            .map(|(i, c)| {
                serde_json::json!({
                    "key": format!("fact_{i}_{c}"),
                    "label": format!("Fact {i}"),
                    "type": "text",
                    "importance": "high",
                    "confidence": c,
                    "provisions": ["1"]
                })
            })
            .collect();
        serde_json::json!({ "slots": slots }).to_string()
    }

    async fn seeded_store(provision_count: usize) -> (Arc<MemoryStore>, Uuid) {
        let store = Arc::new(MemoryStore::new().with_domains(vec![LegalDomain::new(
            DOMAIN,
            "Wrongful Termination",
        )]));
        let outcome = store
            .upsert_source(&sample_source_new("S.O. 2000, c. 41", "Employment Standards Act, 2000"))
            .await
            .unwrap();
        let id = outcome.source.id;
        store
            .replace_provisions(id, 1, &sample_provisions(provision_count))
            .await
            .unwrap();
        (store, id)
    }

    #[test]
    fn test_parse_slots_repairs_entries() {
        let raw = r#"Sure! {"slots": [
            {"label": "Notice Period (weeks)", "type": "period", "importance": "urgent", "confidence": 1.7},
            {"key": "Hire Date", "label": "Hire date", "type": "date", "importance": "critical", "confidence": "0.8", "provisions": [54, "57"]},
            {"description": "no key, no label"},
            {"key": "hire_date", "label": "Duplicate"}
        ]}"#;

        let slots = parse_slots_response(raw).unwrap();
        assert_eq!(slots.len(), 2);

        assert_eq!(slots[0].key, "notice_period_weeks");
        assert_eq!(slots[0].slot_type, SlotType::Duration);
        assert_eq!(slots[0].importance, Importance::Medium);
        assert_eq!(slots[0].confidence, 1.0);

        assert_eq!(slots[1].key, "hire_date");
        assert_eq!(slots[1].importance, Importance::Critical);
        assert_eq!(slots[1].confidence, 0.8);
        assert_eq!(slots[1].provision_numbers, vec!["54", "57"]);
    }

    #[test]
    fn test_parse_slots_unknown_type_is_text() {
        let slots = parse_slots_response(r#"{"slots": [{"key": "k", "type": "hologram"}]}"#).unwrap();
        assert_eq!(slots[0].slot_type, SlotType::Text);
        assert_eq!(slots[0].label, "k");
        assert_eq!(slots[0].confidence, DEFAULT_CONFIDENCE);
    }

    #[test]
    fn test_parse_slots_requires_array() {
        assert!(matches!(
            parse_slots_response(r#"{"fields": []}"#),
            Err(IngestError::MalformedModelResponse { .. })
        ));
        assert!(matches!(
            parse_slots_response("no json at all"),
            Err(IngestError::MalformedModelResponse { .. })
        ));
    }

    #[test]
    fn test_partition_preserves_order_and_ranges() {
        let source_id = Uuid::now_v7();
        let provisions: Vec<LegalProvision> = sample_provisions(5)
            .into_iter()
            .map(|p| LegalProvision::from_new(source_id, 1, p))
            .collect();

        let batches = partition(&provisions, 2);
        let ranges: Vec<(u32, i32, i32, usize)> = batches
            .iter()
            .map(|(b, c)| (b.index, b.first_sort_order, b.last_sort_order, c.len()))
            .collect();
        assert_eq!(ranges, vec![(0, 0, 1, 2), (1, 2, 3, 2), (2, 4, 4, 1)]);
    }

    #[tokio::test]
    async fn test_failed_batch_is_isolated() {
        let (store, id) = seeded_store(4).await;
        let model = MockModel::new()
            .with_response(slots_json(&[0.8, 0.9, 0.7]))
            .with_failure(MockFailure::Transport("connection reset".to_string()));
        let orchestrator = BatchSlotOrchestrator::new(store.clone(), SlotGenerator::new(model));

        let summary = orchestrator
            .process_source(id, &SlotRunOptions::new(DOMAIN).with_batch_size(2))
            .await
            .unwrap();

        assert_eq!(summary.total_slots, 3);
        assert!((summary.average_confidence - 0.8).abs() < 1e-9);
        assert_eq!(summary.batches, 2);
        assert_eq!(summary.slots_per_batch, vec![3, 0]);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].batch_index, 1);
        assert!(!summary.completed);

        let source = store.get_source(id).await.unwrap().unwrap();
        assert!(!source.ai_processed);
        assert_eq!(store.existing_slots(id, DOMAIN).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_full_success_marks_processed() {
        let (store, id) = seeded_store(3).await;
        let model = MockModel::new().with_default_response(slots_json(&[0.6]));
        let orchestrator = BatchSlotOrchestrator::new(store.clone(), SlotGenerator::new(model));

        let summary = orchestrator
            .process_source(id, &SlotRunOptions::new(DOMAIN).with_batch_size(2))
            .await
            .unwrap();

        assert!(summary.completed);
        assert_eq!(summary.total_slots, 2);
        assert_eq!(summary.batches_succeeded(), 2);

        let source = store.get_source(id).await.unwrap().unwrap();
        assert!(source.ai_processed);
        assert!(source.ai_processed_at.is_some());
    }

    #[tokio::test]
    async fn test_retry_resumes_only_failed_batches() {
        let (store, id) = seeded_store(4).await;
        let options = SlotRunOptions::new(DOMAIN).with_batch_size(2);

        let first = MockModel::new()
            .with_response(slots_json(&[0.8, 0.9, 0.7]))
            .with_failure(MockFailure::Timeout);
        BatchSlotOrchestrator::new(store.clone(), SlotGenerator::new(first))
            .process_source(id, &options)
            .await
            .unwrap();

        let second = MockModel::new().with_default_response(slots_json(&[0.4]));
        let orchestrator = BatchSlotOrchestrator::new(store.clone(), SlotGenerator::new(second));
        let summary = orchestrator.process_source(id, &options).await.unwrap();

        // Only the failed batch hit the model
        assert_eq!(orchestrator.generator().model().call_count(), 1);
        assert_eq!(summary.batches_resumed, 1);
        assert_eq!(summary.total_slots, 4);
        assert!((summary.average_confidence - 0.7).abs() < 1e-9);
        assert!(summary.completed);
        assert!(store.get_source(id).await.unwrap().unwrap().ai_processed);
    }

    #[tokio::test]
    async fn test_concurrent_run_matches_sequential_order() {
        let (store, id) = seeded_store(6).await;
        let model = MockModel::new()
            .with_response_containing("[Section 1]", slots_json(&[0.9]))
            .with_response_containing("[Section 3]", slots_json(&[0.8, 0.8]))
            .with_response_containing("[Section 5]", slots_json(&[0.7, 0.7, 0.7]));
        let orchestrator =
            BatchSlotOrchestrator::new(store.clone(), SlotGenerator::new(model)).with_concurrency(3);

        let summary = orchestrator
            .process_source(id, &SlotRunOptions::new(DOMAIN).with_batch_size(2))
            .await
            .unwrap();

        assert_eq!(summary.slots_per_batch, vec![1, 2, 3]);
        assert_eq!(summary.total_slots, 6);

        let saved = store.existing_slots(id, DOMAIN).await.unwrap();
        let batch_order: Vec<u32> = saved.iter().map(|s| s.batch.index).collect();
        assert_eq!(batch_order, vec![0, 1, 1, 2, 2, 2]);
    }

    #[tokio::test]
    async fn test_zero_batch_size_rejected() {
        let (store, id) = seeded_store(2).await;
        let orchestrator = BatchSlotOrchestrator::new(store, SlotGenerator::new(MockModel::new()));

        let err = orchestrator
            .process_source(id, &SlotRunOptions::new(DOMAIN).with_batch_size(0))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[tokio::test]
    async fn test_source_without_provisions() {
        let (store, id) = seeded_store(0).await;
        let orchestrator = BatchSlotOrchestrator::new(store, SlotGenerator::new(MockModel::new()));

        let err = orchestrator
            .process_source(id, &SlotRunOptions::new(DOMAIN))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::NoProvisions { .. }));
    }

    #[tokio::test]
    async fn test_unknown_source() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = BatchSlotOrchestrator::new(store, SlotGenerator::new(MockModel::new()));

        let err = orchestrator
            .process_source(Uuid::now_v7(), &SlotRunOptions::new(DOMAIN))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::SourceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_process_next_unprocessed() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator =
            BatchSlotOrchestrator::new(store.clone(), SlotGenerator::new(MockModel::new()));
        let err = orchestrator
            .process_next_unprocessed(&SlotRunOptions::new(DOMAIN))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::NothingToProcess));

        let (store, id) = seeded_store(2).await;
        let orchestrator = BatchSlotOrchestrator::new(
            store,
            SlotGenerator::new(MockModel::new().with_default_response(slots_json(&[0.9]))),
        );
        let summary = orchestrator
            .process_next_unprocessed(&SlotRunOptions::new(DOMAIN))
            .await
            .unwrap();
        assert_eq!(summary.source_id, id);
        assert!(summary.completed);
    }

    #[tokio::test]
    async fn test_cancellation_aborts_run() {
        let (store, id) = seeded_store(2).await;
        let token = CancellationToken::new();
        token.cancel();
        let orchestrator = BatchSlotOrchestrator::new(
            store.clone(),
            SlotGenerator::new(MockModel::new().with_default_response(slots_json(&[0.9]))),
        )
        .with_cancellation(token);

        let err = orchestrator
            .process_source(id, &SlotRunOptions::new(DOMAIN))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Cancelled));
        assert!(store.existing_slots(id, DOMAIN).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resume_with_different_batch_size_rejected() {
        let (store, id) = seeded_store(4).await;

        let first = MockModel::new()
            .with_response(slots_json(&[0.8]))
            .with_failure(MockFailure::Timeout);
        BatchSlotOrchestrator::new(store.clone(), SlotGenerator::new(first))
            .process_source(id, &SlotRunOptions::new(DOMAIN).with_batch_size(2))
            .await
            .unwrap();

        let orchestrator = BatchSlotOrchestrator::new(
            store.clone(),
            SlotGenerator::new(MockModel::new().with_default_response(slots_json(&[0.9]))),
        );
        let err = orchestrator
            .process_source(id, &SlotRunOptions::new(DOMAIN).with_batch_size(4))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
        assert!(err.to_string().contains("batch_size 4"));

        // Nothing regenerated next to the saved batch
        assert_eq!(orchestrator.generator().model().call_count(), 0);
        assert_eq!(store.existing_slots(id, DOMAIN).await.unwrap().len(), 1);
        assert!(!store.get_source(id).await.unwrap().unwrap().ai_processed);

        // The original batch size still resumes
        let summary = orchestrator
            .process_source(id, &SlotRunOptions::new(DOMAIN).with_batch_size(2))
            .await
            .unwrap();
        assert_eq!(summary.batches_resumed, 1);
        assert!(summary.completed);
    }

    #[tokio::test]
    async fn test_save_failure_aborts_run_and_keeps_saved_batches() {
        let memory = MemoryStore::new().with_domains(vec![LegalDomain::new(DOMAIN, "Wrongful Termination")]);
        let id = memory
            .upsert_source(&sample_source_new("S.O. 2000, c. 41", "Employment Standards Act, 2000"))
            .await
            .unwrap()
            .source
            .id;
        memory.replace_provisions(id, 1, &sample_provisions(6)).await.unwrap();
        let store = Arc::new(FailingStore::new(memory).fail_after(StoreOp::SaveSlots, 1));

        let orchestrator = BatchSlotOrchestrator::new(
            store.clone(),
            SlotGenerator::new(MockModel::new().with_default_response(slots_json(&[0.8]))),
        );
        let options = SlotRunOptions::new(DOMAIN).with_batch_size(2);

        let err = orchestrator.process_source(id, &options).await.unwrap_err();
        assert!(matches!(err, IngestError::Storage(_)));
        assert_eq!(err.kind(), "storage_error");

        // The run stopped at the failed write: batch 0 kept, batch 2 never saved
        let saved = store.inner().existing_slots(id, DOMAIN).await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].batch.index, 0);
        assert_eq!(store.call_count(StoreOp::SaveSlots), 2);
        assert_eq!(store.call_count(StoreOp::MarkProcessed), 0);
        assert!(!store.get_source(id).await.unwrap().unwrap().ai_processed);

        let summary = orchestrator.process_source(id, &options).await.unwrap();
        assert_eq!(summary.batches_resumed, 1);
        assert_eq!(summary.total_slots, 3);
        assert!(summary.completed);
    }
}
