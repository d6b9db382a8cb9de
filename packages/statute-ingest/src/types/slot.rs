//! Slot types - AI-inferred fact templates per legal domain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Value type a slot collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotType {
    #[default]
    Text,
    Number,
    Currency,
    Date,
    Duration,
    Boolean,
    Choice,
}

impl SlotType {
    /// Lenient parse of a model-reported type. Unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" | "string" => Some(Self::Text),
            "number" | "integer" | "float" => Some(Self::Number),
            "currency" | "money" | "amount" => Some(Self::Currency),
            "date" | "datetime" => Some(Self::Date),
            "duration" | "period" => Some(Self::Duration),
            "boolean" | "bool" | "yes_no" => Some(Self::Boolean),
            "choice" | "enum" | "select" => Some(Self::Choice),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Currency => "currency",
            Self::Date => "date",
            Self::Duration => "duration",
            Self::Boolean => "boolean",
            Self::Choice => "choice",
        }
    }
}

/// How strongly a slot drives the downstream decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl Importance {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "critical" | "required" => Some(Self::Critical),
            "high" => Some(Self::High),
            "medium" | "normal" => Some(Self::Medium),
            "low" | "optional" => Some(Self::Low),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Identifies the provision batch a slot came from.
///
/// Batches are identified by the sort-order range they cover, so a resumed
/// run with the same batch size recognises work already saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchRef {
    pub index: u32,
    pub first_sort_order: i32,
    pub last_sort_order: i32,
}

impl BatchRef {
    /// Whether two refs cover the same provisions.
    pub fn same_range(&self, other: &BatchRef) -> bool {
        self.first_sort_order == other.first_sort_order
            && self.last_sort_order == other.last_sort_order
    }
}

/// A slot as produced by the model, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedSlot {
    /// Stable snake_case key (e.g. `notice_period_weeks`)
    pub key: String,
    pub label: String,
    pub description: String,
    pub slot_type: SlotType,
    pub importance: Importance,

    /// Model confidence, always within [0, 1]
    pub confidence: f64,

    /// Provision numbers the slot was inferred from
    #[serde(default)]
    pub provision_numbers: Vec<String>,
}

/// A persisted slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub id: Uuid,
    pub source_id: Uuid,
    pub domain_slug: String,
    pub batch: BatchRef,
    pub key: String,
    pub label: String,
    pub description: String,
    pub slot_type: SlotType,
    pub importance: Importance,
    pub confidence: f64,
    pub provision_numbers: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Slot {
    pub fn from_generated(
        source_id: Uuid,
        domain_slug: impl Into<String>,
        batch: BatchRef,
        generated: GeneratedSlot,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            source_id,
            domain_slug: domain_slug.into(),
            batch,
            key: generated.key,
            label: generated.label,
            description: generated.description,
            slot_type: generated.slot_type,
            importance: generated.importance,
            confidence: generated.confidence,
            provision_numbers: generated.provision_numbers,
            created_at: Utc::now(),
        }
    }
}

/// Clamp a model-reported confidence into [0, 1]. NaN becomes 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_type_parse_is_lenient() {
        assert_eq!(SlotType::parse("Money"), Some(SlotType::Currency));
        assert_eq!(SlotType::parse(" yes_no "), Some(SlotType::Boolean));
        assert_eq!(SlotType::parse("geo"), None);
    }

    #[test]
    fn test_importance_parse() {
        assert_eq!(Importance::parse("REQUIRED"), Some(Importance::Critical));
        assert_eq!(Importance::parse("whatever"), None);
    }

    #[test]
    fn test_clamp_confidence() {
        assert_eq!(clamp_confidence(1.4), 1.0);
        assert_eq!(clamp_confidence(-0.2), 0.0);
        assert_eq!(clamp_confidence(f64::NAN), 0.0);
        assert_eq!(clamp_confidence(0.85), 0.85);
    }

    #[test]
    fn test_batch_range_identity() {
        let a = BatchRef {
            index: 0,
            first_sort_order: 0,
            last_sort_order: 1,
        };
        let b = BatchRef { index: 4, ..a };
        assert!(a.same_range(&b));
    }
}
