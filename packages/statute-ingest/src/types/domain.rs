//! Legal domains and relevance results.

use serde::{Deserialize, Serialize};

/// A legal practice area (e.g. `wrongful-termination`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LegalDomain {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl LegalDomain {
    pub fn new(slug: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Score of one source against one domain.
///
/// Computed on demand from the rule table; never persisted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainRelevance {
    pub domain_slug: String,

    /// Confidence in [0, 1] that the source governs the domain
    pub score: f64,

    pub reasoning: String,
}
