//! Statute types - the structured output of a scrape.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A statute as recovered from a rendered page.
///
/// Serialises to the scrape output contract:
/// `{citation, longTitle, shortTitle?, fullText, sections, url}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedStatute {
    /// Unique human-readable identifier (e.g. "S.O. 2000, c. 41")
    pub citation: String,

    /// Full title of the statute
    pub long_title: String,

    /// Short title if the statute declares one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_title: Option<String>,

    /// Complete statute text
    pub full_text: String,

    /// Sections in document order
    #[serde(default)]
    pub sections: Vec<ExtractedSection>,

    /// Page the statute was scraped from
    pub url: String,
}

impl ExtractedStatute {
    /// SHA-256 of the full text, used to detect unchanged re-ingests.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.full_text.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// One section of an extracted statute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedSection {
    /// Section number as printed (free text, e.g. "54", "57.1", "Schedule A")
    pub number: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,

    pub text: String,

    /// Zero-based position in the section list
    pub order: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_camel_case() {
        let statute = ExtractedStatute {
            citation: "S.O. 2000, c. 41".to_string(),
            long_title: "Employment Standards Act, 2000".to_string(),
            short_title: None,
            full_text: "1 Definitions".to_string(),
            sections: vec![ExtractedSection {
                number: "1".to_string(),
                heading: Some("Definitions".to_string()),
                text: "In this Act...".to_string(),
                order: 0,
            }],
            url: "https://www.ontario.ca/laws/statute/00e41".to_string(),
        };

        let json = serde_json::to_value(&statute).unwrap();
        assert_eq!(json["longTitle"], "Employment Standards Act, 2000");
        assert_eq!(json["fullText"], "1 Definitions");
        assert!(json.get("shortTitle").is_none());
        assert_eq!(json["sections"][0]["order"], 0);
    }

    #[test]
    fn test_content_hash_tracks_text() {
        let mut statute = ExtractedStatute {
            citation: "c".to_string(),
            long_title: "t".to_string(),
            short_title: None,
            full_text: "body".to_string(),
            sections: vec![],
            url: "https://example.com".to_string(),
        };
        let first = statute.content_hash();
        assert_eq!(first, statute.content_hash());

        statute.full_text.push_str(" amended");
        assert_ne!(first, statute.content_hash());
    }
}
