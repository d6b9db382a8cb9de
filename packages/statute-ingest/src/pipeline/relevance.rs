//! Cross-domain relevance from a declarative rule table.
//!
//! Each rule maps a keyword set to a domain set with a fixed score. For a
//! (source, domain) pair the first rule, in table order, whose keyword
//! appears in the source's title or citation and whose domain set contains
//! the slug decides the score. Rules are never combined.
//!
//! Adding a jurisdiction means adding rules, either to
//! [`RuleTable::builtin`] or to a JSON file loaded with
//! [`RuleTable::from_path`].

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{IngestError, Result};
use crate::types::{
    domain::{DomainRelevance, LegalDomain},
    source::LegalSource,
};

/// Minimum score for a domain to be reported as relevant.
pub const RELEVANCE_THRESHOLD: f64 = 0.7;

/// Reasoning attached to pairs no rule matched.
pub const NO_MATCH_REASONING: &str = "No relevance rule links this source to the domain";

/// One declarative relevance rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevanceRule {
    /// Case-insensitive substrings matched against title and citation
    pub keywords: Vec<String>,

    /// Domain slugs the rule applies to
    pub domains: Vec<String>,

    pub score: f64,

    pub reasoning: String,
}

impl RelevanceRule {
    fn matches_text(&self, haystack_lower: &str) -> bool {
        self.keywords
            .iter()
            .any(|k| haystack_lower.contains(&k.to_lowercase()))
    }

    fn covers(&self, domain_slug: &str) -> bool {
        self.domains.iter().any(|d| d == domain_slug)
    }
}

/// Ordered, versioned list of relevance rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTable {
    pub version: String,
    pub rules: Vec<RelevanceRule>,
}

/// (keywords, domains, score, reasoning)
type BuiltinRule = (&'static [&'static str], &'static [&'static str], f64, &'static str);

const BUILTIN_VERSION: &str = "2025.1";

// Specific statutes first, generic subject keywords last.
const BUILTIN_RULES: &[BuiltinRule] = &[
    // Ontario
    (
        &["Employment Standards Act", "2000, c. 41"],
        &["wrongful-termination", "unpaid-wages"],
        0.95,
        "Employment Standards Act, 2000 (Ontario) sets minimum notice, termination and severance pay entitlements",
    ),
    (
        &["Residential Tenancies Act", "2006, c. 17"],
        &["landlord-tenant"],
        0.95,
        "Residential Tenancies Act, 2006 (Ontario) governs residential leases, rent and evictions",
    ),
    (
        &["Occupational Health and Safety Act", "R.S.O. 1990, c. O.1"],
        &["workplace-harassment", "workplace-safety"],
        0.9,
        "Occupational Health and Safety Act (Ontario) requires workplace harassment and violence policies",
    ),
    (
        &["Human Rights Code", "R.S.O. 1990, c. H.19"],
        &["discrimination", "workplace-harassment"],
        0.9,
        "Human Rights Code (Ontario) prohibits discrimination and harassment in employment, housing and services",
    ),
    (
        &["Human Rights Code", "R.S.O. 1990, c. H.19"],
        &["wrongful-termination", "landlord-tenant"],
        0.75,
        "Human Rights Code (Ontario) makes discriminatory dismissals and tenancy decisions unlawful",
    ),
    (
        &["Consumer Protection Act", "2002, c. 30"],
        &["consumer-protection"],
        0.9,
        "Consumer Protection Act, 2002 (Ontario) regulates consumer agreements and unfair practices",
    ),
    (
        &["Family Law Act", "R.S.O. 1990, c. F.3"],
        &["family-law"],
        0.9,
        "Family Law Act (Ontario) governs property division and support on separation",
    ),
    // Federal Canada
    (
        &["Canada Labour Code", "R.S.C. 1985, c. L-2"],
        &["wrongful-termination", "unpaid-wages"],
        0.9,
        "Canada Labour Code sets termination and wage standards for federally regulated employers",
    ),
    (
        &["Canadian Human Rights Act", "R.S.C. 1985, c. H-6"],
        &["discrimination", "workplace-harassment"],
        0.9,
        "Canadian Human Rights Act prohibits discrimination by federally regulated bodies",
    ),
    (
        &["Divorce Act", "R.S.C. 1985, c. 3 (2nd Supp.)"],
        &["family-law"],
        0.9,
        "Divorce Act governs divorce, parenting orders and spousal support",
    ),
    // United Kingdom
    (
        &["Employment Rights Act 1996", "1996 c. 18"],
        &["wrongful-termination", "unpaid-wages"],
        0.95,
        "Employment Rights Act 1996 establishes unfair dismissal, notice and wage protection rights",
    ),
    (
        &["Equality Act 2010", "2010 c. 15"],
        &["discrimination", "workplace-harassment"],
        0.9,
        "Equality Act 2010 prohibits discrimination and harassment on protected characteristics",
    ),
    (
        &["Housing Act 1988", "1988 c. 50"],
        &["landlord-tenant"],
        0.85,
        "Housing Act 1988 governs assured and assured shorthold tenancies",
    ),
    (
        &["Consumer Rights Act 2015", "2015 c. 15"],
        &["consumer-protection"],
        0.9,
        "Consumer Rights Act 2015 sets statutory rights for goods, services and digital content",
    ),
    // California
    (
        &["Fair Employment and Housing Act", "Gov. Code, § 12900"],
        &["discrimination", "workplace-harassment"],
        0.9,
        "Fair Employment and Housing Act (California) prohibits employment and housing discrimination",
    ),
    (
        &["California Labor Code", "Cal. Lab. Code"],
        &["unpaid-wages", "wrongful-termination"],
        0.85,
        "California Labor Code governs wage payment, final pay and retaliation",
    ),
    // Generic subject matter, below threshold
    (
        &["Employment", "Labour", "Labor"],
        &["wrongful-termination", "unpaid-wages", "workplace-harassment"],
        0.5,
        "Title refers to employment generally; no specific termination or wage provisions identified",
    ),
    (
        &["Tenan", "Landlord", "Housing"],
        &["landlord-tenant"],
        0.6,
        "Title refers to housing generally; not a residential tenancy statute",
    ),
    (
        &["Human Rights", "Equality"],
        &["discrimination"],
        0.6,
        "Title refers to equality rights generally",
    ),
];

impl RuleTable {
    /// Rules shipped with the crate.
    pub fn builtin() -> Self {
        let rules = BUILTIN_RULES
            .iter()
            .map(|(keywords, domains, score, reasoning)| RelevanceRule {
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
                domains: domains.iter().map(|d| d.to_string()).collect(),
                score: *score,
                reasoning: reasoning.to_string(),
            })
            .collect();

        Self {
            version: BUILTIN_VERSION.to_string(),
            rules,
        }
    }

    /// Parse and validate a JSON rule table.
    pub fn from_json(json: &str) -> Result<Self> {
        let table: RuleTable = serde_json::from_str(json)?;
        table.validate()?;
        Ok(table)
    }

    /// Load and validate a JSON rule table from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| IngestError::InvalidRules {
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
        let table = Self::from_json(&json)?;
        info!(
            path = %path.display(),
            version = %table.version,
            rules = table.rules.len(),
            "Loaded relevance rule table"
        );
        Ok(table)
    }

    /// Check every rule is usable.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(IngestError::InvalidRules { reason });

        if self.version.trim().is_empty() {
            return invalid("version is empty".to_string());
        }
        if self.rules.is_empty() {
            return invalid("table has no rules".to_string());
        }
        for (i, rule) in self.rules.iter().enumerate() {
            if !rule.score.is_finite() || !(0.0..=1.0).contains(&rule.score) {
                return invalid(format!("rule {i}: score {} outside [0, 1]", rule.score));
            }
            if rule.keywords.is_empty() || rule.keywords.iter().any(|k| k.trim().is_empty()) {
                return invalid(format!("rule {i}: keywords must be non-empty"));
            }
            if rule.domains.is_empty() || rule.domains.iter().any(|d| d.trim().is_empty()) {
                return invalid(format!("rule {i}: domains must be non-empty"));
            }
        }
        Ok(())
    }

    /// Distinct domain slugs mentioned by any rule, in first-seen order.
    pub fn domain_slugs(&self) -> Vec<&str> {
        let mut slugs: Vec<&str> = Vec::new();
        for slug in self.rules.iter().flat_map(|r| r.domains.iter()) {
            if !slugs.contains(&slug.as_str()) {
                slugs.push(slug);
            }
        }
        slugs
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Scores sources against domains with a shared rule table.
#[derive(Debug, Clone)]
pub struct RelevanceEngine {
    rules: Arc<RuleTable>,
}

impl RelevanceEngine {
    pub fn new(rules: Arc<RuleTable>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Raw score of one source against one domain, including zero.
    pub fn score(&self, source: &LegalSource, domain_slug: &str) -> DomainRelevance {
        let haystack = haystack(source);

        let matched = self
            .rules
            .rules
            .iter()
            .find(|rule| rule.covers(domain_slug) && rule.matches_text(&haystack));

        match matched {
            Some(rule) => DomainRelevance {
                domain_slug: domain_slug.to_string(),
                score: rule.score,
                reasoning: rule.reasoning.clone(),
            },
            None => DomainRelevance {
                domain_slug: domain_slug.to_string(),
                score: 0.0,
                reasoning: NO_MATCH_REASONING.to_string(),
            },
        }
    }

    /// Domains, other than the source's primary one, the source governs.
    ///
    /// Results follow the order of `domains`. An empty result is valid.
    pub fn find_relevant_domains(
        &self,
        source: &LegalSource,
        domains: &[LegalDomain],
    ) -> Vec<DomainRelevance> {
        let relevant: Vec<DomainRelevance> = domains
            .iter()
            .filter(|d| source.primary_domain.as_deref() != Some(d.slug.as_str()))
            .map(|d| self.score(source, &d.slug))
            .filter(|r| r.score >= RELEVANCE_THRESHOLD)
            .collect();

        debug!(
            citation = %source.citation,
            candidates = domains.len(),
            relevant = relevant.len(),
            rules_version = %self.rules.version,
            "Scored source relevance"
        );

        relevant
    }
}

impl Default for RelevanceEngine {
    fn default() -> Self {
        Self::new(Arc::new(RuleTable::builtin()))
    }
}

/// Text keywords are matched against: title and citation.
fn haystack(source: &LegalSource) -> String {
    format!("{}\n{}", source.long_title, source.citation).to_lowercase()
}
