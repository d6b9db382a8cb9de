//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the ingestion library
//! without making real model or browser calls.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{FetchError, FetchResult, IngestError, ModelError, ModelResult, Result};
use crate::stores::MemoryStore;
use crate::traits::{
    ai::LanguageModel,
    browser::{Browser, BrowserProfile, BrowserSession, NavigateOptions, Navigation},
    store::{DomainStore, ProvisionStore, SlotStore, SourceStore, UpsertOutcome},
};
use crate::types::{
    domain::LegalDomain,
    slot::{BatchRef, GeneratedSlot, Slot},
    source::{LegalProvision, LegalSource, NewLegalSource, NewProvision},
    statute::ExtractedStatute,
};

// ============================================================================
// Model
// ============================================================================

/// Failure a [`MockModel`] can be scripted to return.
#[derive(Debug, Clone)]
pub enum MockFailure {
    Timeout,
    Malformed(String),
    Refused(String),
    Transport(String),
}

impl From<MockFailure> for ModelError {
    fn from(failure: MockFailure) -> Self {
        match failure {
            MockFailure::Timeout => ModelError::Timeout,
            MockFailure::Malformed(m) => ModelError::Malformed(m),
            MockFailure::Refused(m) => ModelError::Refused(m),
            MockFailure::Transport(m) => ModelError::transport(m),
        }
    }
}

#[derive(Debug, Clone)]
enum MockReply {
    Text(String),
    Fail(MockFailure),
}

impl MockReply {
    fn into_result(self) -> ModelResult<String> {
        match self {
            MockReply::Text(text) => Ok(text),
            MockReply::Fail(failure) => Err(failure.into()),
        }
    }
}

/// Record of a call made to the mock model.
#[derive(Debug, Clone)]
pub struct MockModelCall {
    pub system: String,
    pub prompt: String,
}

/// A mock language model for testing.
///
/// Replies are resolved in this order:
/// 1. Queued replies (`with_response` / `with_failure`), consumed one per call
/// 2. Prompt rules (`with_response_containing`), first match wins
/// 3. The default reply
///
/// With nothing configured the call fails as malformed.
#[derive(Default, Clone)]
pub struct MockModel {
    queue: Arc<RwLock<VecDeque<MockReply>>>,
    rules: Arc<RwLock<Vec<(String, MockReply)>>>,
    default: Arc<RwLock<Option<MockReply>>>,
    delay: Option<Duration>,
    calls: Arc<RwLock<Vec<MockModelCall>>>,
}

impl MockModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a text reply for the next unanswered call.
    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.queue
            .write()
            .unwrap()
            .push_back(MockReply::Text(text.into()));
        self
    }

    /// Queue a failure for the next unanswered call.
    pub fn with_failure(self, failure: MockFailure) -> Self {
        self.queue
            .write()
            .unwrap()
            .push_back(MockReply::Fail(failure));
        self
    }

    /// Reply with `text` whenever the prompt contains `needle`.
    pub fn with_response_containing(self, needle: impl Into<String>, text: impl Into<String>) -> Self {
        self.rules
            .write()
            .unwrap()
            .push((needle.into(), MockReply::Text(text.into())));
        self
    }

    /// Reply used when nothing else matches.
    pub fn with_default_response(self, text: impl Into<String>) -> Self {
        *self.default.write().unwrap() = Some(MockReply::Text(text.into()));
        self
    }

    /// Refuse every call that nothing else answers.
    pub fn fail_with_refusal(self, message: impl Into<String>) -> Self {
        *self.default.write().unwrap() = Some(MockReply::Fail(MockFailure::Refused(message.into())));
        self
    }

    /// Sleep before replying (use with paused tokio time).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockModelCall> {
        self.calls.read().unwrap().clone()
    }

    /// User prompts of all calls, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.prompt).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    fn reply_for(&self, prompt: &str) -> Option<MockReply> {
        if let Some(reply) = self.queue.write().unwrap().pop_front() {
            return Some(reply);
        }
        let rules = self.rules.read().unwrap();
        if let Some((_, reply)) = rules.iter().find(|(needle, _)| prompt.contains(needle.as_str())) {
            return Some(reply.clone());
        }
        self.default.read().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for MockModel {
    async fn complete(&self, system: &str, prompt: &str) -> ModelResult<String> {
        self.calls.write().unwrap().push(MockModelCall {
            system: system.to_string(),
            prompt: prompt.to_string(),
        });

        // Resolve before sleeping so concurrent callers keep call order
        let reply = self.reply_for(prompt);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match reply {
            Some(reply) => reply.into_result(),
            None => Err(ModelError::Malformed("no mock response configured".to_string())),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Browser
// ============================================================================

#[derive(Debug, Clone)]
enum MockPageKind {
    Ok { html: String },
    Status { status: u16, body: String },
    Timeout,
}

/// Scripted page for [`MockBrowser`].
#[derive(Debug, Clone)]
pub struct MockPage {
    kind: MockPageKind,
}

impl MockPage {
    /// 200 with the given document.
    pub fn ok(html: impl Into<String>) -> Self {
        Self {
            kind: MockPageKind::Ok { html: html.into() },
        }
    }

    /// Any status with the given body.
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            kind: MockPageKind::Status {
                status,
                body: body.into(),
            },
        }
    }

    /// Navigation never reaches network idle.
    pub fn timeout() -> Self {
        Self {
            kind: MockPageKind::Timeout,
        }
    }
}

/// Record of a navigation made through the mock browser.
#[derive(Debug, Clone)]
pub struct NavigationRecord {
    pub url: String,
    pub options: NavigateOptions,
    pub profile: BrowserProfile,
}

/// A mock browser with session accounting.
///
/// Unknown URLs answer 404.
#[derive(Default, Clone)]
pub struct MockBrowser {
    pages: Arc<RwLock<HashMap<String, MockPage>>>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    navigations: Arc<RwLock<Vec<NavigationRecord>>>,
}

impl MockBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scripted page.
    pub fn with_page(self, url: impl Into<String>, page: MockPage) -> Self {
        self.pages.write().unwrap().insert(url.into(), page);
        self
    }

    pub fn sessions_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Sessions opened but not yet closed.
    pub fn open_sessions(&self) -> usize {
        self.sessions_opened() - self.sessions_closed()
    }

    /// Get all navigations made through this browser.
    pub fn navigations(&self) -> Vec<NavigationRecord> {
        self.navigations.read().unwrap().clone()
    }
}

#[async_trait]
impl Browser for MockBrowser {
    async fn open_session(&self) -> FetchResult<Box<dyn BrowserSession>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            browser: self.clone(),
            profile: None,
            html: None,
            closed: false,
        }))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

struct MockSession {
    browser: MockBrowser,
    profile: Option<BrowserProfile>,
    html: Option<String>,
    closed: bool,
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn apply_profile(&mut self, profile: &BrowserProfile) -> FetchResult<()> {
        self.profile = Some(profile.clone());
        Ok(())
    }

    async fn navigate(&mut self, url: &str, options: &NavigateOptions) -> FetchResult<Navigation> {
        let profile = self.profile.clone().unwrap_or_else(|| BrowserProfile {
            user_agent: String::new(),
            headers: Vec::new(),
            viewport: (0, 0),
            stealth: false,
        });
        self.browser.navigations.write().unwrap().push(NavigationRecord {
            url: url.to_string(),
            options: *options,
            profile,
        });

        let page = self
            .browser
            .pages
            .read()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| MockPage::status(404, "Not Found"));

        let (status, html) = match page.kind {
            MockPageKind::Ok { html } => (200, html),
            MockPageKind::Status { status, body } => (status, body),
            MockPageKind::Timeout => {
                return Err(FetchError::Timeout {
                    url: url.to_string(),
                })
            }
        };

        self.html = Some(html);
        Ok(Navigation {
            status: Some(status),
            final_url: url.to_string(),
        })
    }

    async fn content(&mut self) -> FetchResult<String> {
        self.html
            .clone()
            .ok_or_else(|| FetchError::browser("content requested before navigation"))
    }

    async fn close(&mut self) -> FetchResult<()> {
        if !self.closed {
            self.closed = true;
            self.browser.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

// ============================================================================
// Storage
// ============================================================================

/// Store operation a [`FailingStore`] can be scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    UpsertSource,
    ReplaceProvisions,
    SaveSlots,
    DeleteSlots,
    MarkProcessed,
}

#[derive(Debug, Clone, Copy)]
struct FailurePlan {
    /// Calls that succeed before failures start
    skip: usize,
    failures: usize,
}

/// A [`MemoryStore`] whose writes can be made to fail.
///
/// Failed writes leave the inner store untouched and return
/// `IngestError::Storage`, the way a dropped database connection would.
#[derive(Default)]
pub struct FailingStore {
    inner: MemoryStore,
    plans: RwLock<HashMap<StoreOp, FailurePlan>>,
    calls: RwLock<HashMap<StoreOp, usize>>,
}

impl FailingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    /// Fail the next call of `op`.
    pub fn fail_once(self, op: StoreOp) -> Self {
        self.fail_after(op, 0)
    }

    /// Let `skip` calls of `op` succeed, then fail the one after.
    pub fn fail_after(self, op: StoreOp, skip: usize) -> Self {
        self.plans
            .write()
            .unwrap()
            .insert(op, FailurePlan { skip, failures: 1 });
        self
    }

    /// The wrapped store, for inspecting what was actually written.
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Calls made for `op`, failed ones included.
    pub fn call_count(&self, op: StoreOp) -> usize {
        self.calls.read().unwrap().get(&op).copied().unwrap_or(0)
    }

    fn check(&self, op: StoreOp) -> Result<()> {
        *self.calls.write().unwrap().entry(op).or_insert(0) += 1;

        let mut plans = self.plans.write().unwrap();
        let Some(plan) = plans.get_mut(&op) else {
            return Ok(());
        };
        if plan.skip > 0 {
            plan.skip -= 1;
            return Ok(());
        }
        if plan.failures == 0 {
            return Ok(());
        }
        plan.failures -= 1;
        Err(IngestError::storage(format!("{op:?} failed: connection reset")))
    }
}

#[async_trait]
impl SourceStore for FailingStore {
    async fn upsert_source(&self, source: &NewLegalSource) -> Result<UpsertOutcome> {
        self.check(StoreOp::UpsertSource)?;
        self.inner.upsert_source(source).await
    }

    async fn get_source(&self, id: Uuid) -> Result<Option<LegalSource>> {
        self.inner.get_source(id).await
    }

    async fn get_source_by_citation(&self, citation: &str) -> Result<Option<LegalSource>> {
        self.inner.get_source_by_citation(citation).await
    }

    async fn latest_unprocessed_source(&self) -> Result<Option<LegalSource>> {
        self.inner.latest_unprocessed_source().await
    }

    async fn mark_processed(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        self.check(StoreOp::MarkProcessed)?;
        self.inner.mark_processed(id, at).await
    }
}

#[async_trait]
impl ProvisionStore for FailingStore {
    async fn replace_provisions(
        &self,
        source_id: Uuid,
        version: i32,
        provisions: &[NewProvision],
    ) -> Result<Vec<LegalProvision>> {
        self.check(StoreOp::ReplaceProvisions)?;
        self.inner
            .replace_provisions(source_id, version, provisions)
            .await
    }

    async fn provisions_for_source(&self, source_id: Uuid) -> Result<Vec<LegalProvision>> {
        self.inner.provisions_for_source(source_id).await
    }
}

#[async_trait]
impl SlotStore for FailingStore {
    async fn existing_slots(&self, source_id: Uuid, domain_slug: &str) -> Result<Vec<Slot>> {
        self.inner.existing_slots(source_id, domain_slug).await
    }

    async fn save_slots(
        &self,
        source_id: Uuid,
        domain_slug: &str,
        batch: BatchRef,
        slots: &[GeneratedSlot],
    ) -> Result<Vec<Slot>> {
        self.check(StoreOp::SaveSlots)?;
        self.inner
            .save_slots(source_id, domain_slug, batch, slots)
            .await
    }

    async fn delete_slots_for_source(&self, source_id: Uuid) -> Result<usize> {
        self.check(StoreOp::DeleteSlots)?;
        self.inner.delete_slots_for_source(source_id).await
    }
}

#[async_trait]
impl DomainStore for FailingStore {
    async fn list_domains(&self) -> Result<Vec<LegalDomain>> {
        self.inner.list_domains().await
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// New source fields for a statute with the given citation and title.
pub fn sample_source_new(citation: &str, title: &str) -> NewLegalSource {
    let statute = ExtractedStatute {
        citation: citation.to_string(),
        long_title: title.to_string(),
        short_title: None,
        full_text: format!("{title}. Full text."),
        sections: Vec::new(),
        url: "https://laws.example.gov/statute".to_string(),
    };
    NewLegalSource::from_statute(&statute, "CA-ON")
}

/// A materialised source, not stored anywhere.
pub fn sample_source(citation: &str, title: &str) -> LegalSource {
    LegalSource::from_new(sample_source_new(citation, title))
}

/// `count` provisions numbered from 1 with sort orders from 0.
pub fn sample_provisions(count: usize) -> Vec<NewProvision> {
    (0..count)
        .map(|i| NewProvision {
            number: (i + 1).to_string(),
            heading: Some(format!("Heading {}", i + 1)),
            text: format!("Text of section {}.", i + 1),
            sort_order: i as i32,
        })
        .collect()
}
