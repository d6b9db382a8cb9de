//! Typed errors for the ingestion pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling. Callers classify failures
//! with [`FetchError::is_retryable`] and [`IngestError::kind`] instead of
//! matching on message text.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur anywhere in the ingestion pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Page fetch failed
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Language model call failed before producing a response
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Model did not answer within the extraction deadline
    #[error("extraction timed out after {}s", .after.as_secs())]
    ExtractionTimeout { after: Duration },

    /// Model answered but no usable JSON object could be recovered
    #[error("malformed model response: {reason}")]
    MalformedModelResponse { reason: String },

    /// Source not found in store
    #[error("legal source not found: {id}")]
    SourceNotFound { id: Uuid },

    /// No unprocessed source is waiting for slot generation
    #[error("no unprocessed legal source available")]
    NothingToProcess,

    /// Source has no provisions to generate slots from
    #[error("legal source {id} has no provisions")]
    NoProvisions { id: Uuid },

    /// Storage operation failed
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Relevance rule table failed validation
    #[error("invalid rule table: {reason}")]
    InvalidRules { reason: String },

    /// Operation was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Configuration error
    #[error("config error: {0}")]
    Config(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl IngestError {
    /// Wrap any error as a storage failure.
    pub fn storage(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        IngestError::Storage(err.into())
    }

    /// Stable machine-readable classification.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Fetch(FetchError::Blocked { .. }) => "fetch_blocked",
            IngestError::Fetch(FetchError::Timeout { .. }) => "fetch_timeout",
            IngestError::Fetch(_) => "fetch_failed",
            IngestError::Model(_) => "model_error",
            IngestError::ExtractionTimeout { .. } => "extraction_timeout",
            IngestError::MalformedModelResponse { .. } => "malformed_model_response",
            IngestError::SourceNotFound { .. } => "source_not_found",
            IngestError::NothingToProcess => "nothing_to_process",
            IngestError::NoProvisions { .. } => "no_provisions",
            IngestError::Storage(_) => "storage_error",
            IngestError::InvalidRules { .. } => "invalid_rules",
            IngestError::Cancelled => "cancelled",
            IngestError::JsonParse(_) => "json_parse",
            IngestError::Config(_) => "config_error",
        }
    }

    /// Whether the caller may reasonably retry the same unit of work.
    pub fn is_retryable(&self) -> bool {
        match self {
            IngestError::Fetch(e) => e.is_retryable(),
            IngestError::Model(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Errors raised while retrieving a rendered page.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Site denies automated access (HTTP 401/403). Terminal for this URL.
    #[error("{site} blocked automated access to {url} (HTTP {status})")]
    Blocked {
        url: String,
        site: String,
        status: u16,
    },

    /// Navigation exceeded its bound
    #[error("timeout navigating to {url}")]
    Timeout { url: String },

    /// Target page answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// Invalid URL format or scheme
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// Browser backend failed (session could not be opened, transport error)
    #[error("browser error: {0}")]
    Browser(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl FetchError {
    /// Wrap any error as a browser failure.
    pub fn browser(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        FetchError::Browser(err.into())
    }

    /// Timeouts and transport failures may succeed later; blocks never will.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Browser(_) => true,
            FetchError::Status { status, .. } => *status >= 500 || *status == 429,
            FetchError::Blocked { .. } | FetchError::InvalidUrl { .. } => false,
        }
    }
}

/// Typed failures from the language model collaborator.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Provider-side timeout
    #[error("model request timed out")]
    Timeout,

    /// Provider returned a response the client could not decode
    #[error("malformed provider response: {0}")]
    Malformed(String),

    /// Model declined to answer
    #[error("model refused: {0}")]
    Refused(String),

    /// Network or API failure
    #[error("model transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ModelError {
    /// Wrap any error as a transport failure.
    pub fn transport(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        ModelError::Transport(err.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ModelError::Timeout | ModelError::Transport(_))
    }
}

/// Structured error body returned at the trigger boundary.
///
/// Carries a message and a classification, never a backtrace.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub error: String,
    pub kind: &'static str,
    pub retryable: bool,
}

impl From<&IngestError> for ErrorPayload {
    fn from(err: &IngestError) -> Self {
        Self {
            error: err.to_string(),
            kind: err.kind(),
            retryable: err.is_retryable(),
        }
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for model calls.
pub type ModelResult<T> = std::result::Result<T, ModelError>;
