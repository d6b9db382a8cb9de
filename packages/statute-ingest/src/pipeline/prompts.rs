//! LLM prompts for statute extraction and slot inference.
//!
//! Prompts are plain templates with `{placeholder}` markers filled by the
//! `format_*` functions below.

use crate::types::{domain::LegalDomain, source::LegalProvision};

/// Literal the model is told to emit when a field cannot be determined.
pub const PLACEHOLDER: &str = "UNKNOWN";

/// System prompt for statute extraction.
pub const EXTRACT_SYSTEM_PROMPT: &str = "You are a legal document parser. You read raw HTML of government legislation pages and return the statute they contain as strict JSON. You never invent text that is not on the page.";

/// Prompt for extracting a statute from rendered HTML.
pub const EXTRACT_STATUTE_PROMPT: &str = r#"Extract the statute or regulation published on this page.

Rules:
- Ignore navigation, headers, footers, cookie banners and version menus.
- "citation" is the official citation (e.g. "S.O. 2000, c. 41", "R.S.C. 1985, c. L-2", "1996 c. 18").
- "title" is the full long title; "shortTitle" is the short title if the statute declares one.
- "sections" lists every section in document order. "number" is the section number exactly as printed.
- Copy section text verbatim, including subsections and clauses.
- If a value cannot be determined, use "UNKNOWN".

Output JSON:
{
    "citation": "official citation",
    "title": "full title",
    "shortTitle": "short title or null",
    "sections": [
        {"number": "1", "heading": "Definitions", "text": "section text"}
    ],
    "fullText": "entire statute text"
}

Page URL: {url}
Page HTML:
{html}"#;

/// System prompt for slot inference.
pub const SLOT_SYSTEM_PROMPT: &str = "You are a legal knowledge engineer. You identify the facts a lawyer needs to collect from a client to apply legislation to their situation. You respond with strict JSON only.";

/// Prompt for inferring slots from a batch of provisions.
pub const GENERATE_SLOTS_PROMPT: &str = r#"Legal domain: {domain_name} ({domain_slug})
{domain_description}
Statute: {source_title} ({citation})

Read the provisions below and list the decision-relevant facts ("slots") a
client interview must collect to apply them to a matter in this domain.
Only include facts these provisions actually make relevant. Skip provisions
that have no bearing on the domain.

For each slot give:
- "key": stable snake_case identifier (e.g. "notice_period_weeks")
- "label": short human label
- "description": what to ask and why it matters under these provisions
- "type": one of text, number, currency, date, duration, boolean, choice
- "importance": one of critical, high, medium, low
- "confidence": 0.0 to 1.0, how sure you are the provisions make this fact relevant
- "provisions": section numbers the slot comes from

Output JSON:
{
    "slots": [
        {
            "key": "...",
            "label": "...",
            "description": "...",
            "type": "duration",
            "importance": "critical",
            "confidence": 0.9,
            "provisions": ["54"]
        }
    ]
}

Provisions:
{provisions}"#;

/// Format the extraction prompt.
pub fn format_extract_prompt(url: &str, html: &str) -> String {
    EXTRACT_STATUTE_PROMPT
        .replace("{url}", url)
        .replace("{html}", html)
}

/// Context about the source a slot batch belongs to.
pub struct SlotPromptContext<'a> {
    pub domain: &'a LegalDomain,
    pub source_title: &'a str,
    pub citation: &'a str,
}

/// Format the slot prompt for one batch of provisions.
pub fn format_slots_prompt(context: &SlotPromptContext<'_>, provisions: &[LegalProvision]) -> String {
    let provisions_text = provisions
        .iter()
        .map(|p| match &p.heading {
            Some(heading) => format!("[Section {}] {}\n{}", p.number, heading, p.text),
            None => format!("[Section {}]\n{}", p.number, p.text),
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    GENERATE_SLOTS_PROMPT
        .replace("{domain_name}", &context.domain.name)
        .replace("{domain_slug}", &context.domain.slug)
        .replace(
            "{domain_description}",
            context.domain.description.as_deref().unwrap_or(""),
        )
        .replace("{source_title}", context.source_title)
        .replace("{citation}", context.citation)
        .replace("{provisions}", &provisions_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_format_extract_prompt() {
        let prompt = format_extract_prompt("https://example.gov/act", "<p>Act</p>");
        assert!(prompt.contains("https://example.gov/act"));
        assert!(prompt.contains("<p>Act</p>"));
        assert!(!prompt.contains("{html}"));
    }

    #[test]
    fn test_format_slots_prompt_lists_provisions_in_order() {
        let domain = LegalDomain::new("wrongful-termination", "Wrongful Termination");
        let source_id = Uuid::now_v7();
        let provisions = vec![
            LegalProvision {
                id: Uuid::now_v7(),
                source_id,
                number: "54".to_string(),
                heading: Some("Notice of termination".to_string()),
                text: "No employer shall terminate...".to_string(),
                sort_order: 0,
                version: 1,
                in_force: true,
            },
            LegalProvision {
                id: Uuid::now_v7(),
                source_id,
                number: "57".to_string(),
                heading: None,
                text: "The notice shall be...".to_string(),
                sort_order: 1,
                version: 1,
                in_force: true,
            },
        ];
        let context = SlotPromptContext {
            domain: &domain,
            source_title: "Employment Standards Act, 2000",
            citation: "S.O. 2000, c. 41",
        };

        let prompt = format_slots_prompt(&context, &provisions);

        let first = prompt.find("[Section 54] Notice of termination").unwrap();
        let second = prompt.find("[Section 57]").unwrap();
        assert!(first < second);
        assert!(prompt.contains("wrongful-termination"));
        assert!(prompt.contains("S.O. 2000, c. 41"));
    }
}
