//! Recover JSON objects from free-form model output.
//!
//! Models wrap JSON in prose, markdown fences, or both. The scanner walks
//! the text for `{`, matches braces while respecting string literals, and
//! returns the first balanced candidate that parses as a JSON object.

use serde_json::{Map, Value};

/// Why no object could be recovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonScanError {
    /// No `{ ... }` pattern anywhere in the text
    NoObject,
    /// Brace-delimited candidates exist but none is valid JSON
    Unparseable,
}

impl std::fmt::Display for JsonScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JsonScanError::NoObject => write!(f, "no JSON object in model response"),
            JsonScanError::Unparseable => write!(f, "no parseable JSON object in model response"),
        }
    }
}

/// First brace-delimited JSON object in `text`.
pub fn first_json_object(text: &str) -> Result<Map<String, Value>, JsonScanError> {
    let mut saw_candidate = false;

    for (start, _) in text.match_indices('{') {
        let Some(end) = balanced_end(&text[start..]) else {
            continue;
        };
        saw_candidate = true;
        if let Ok(Value::Object(map)) = serde_json::from_str(&text[start..start + end]) {
            return Ok(map);
        }
    }

    // Unbalanced output (e.g. truncated mid-string): fall back to the widest span
    if !saw_candidate {
        if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
            if end > start {
                return match serde_json::from_str(&text[start..=end]) {
                    Ok(Value::Object(map)) => Ok(map),
                    _ => Err(JsonScanError::Unparseable),
                };
            }
        }
        return Err(JsonScanError::NoObject);
    }

    Err(JsonScanError::Unparseable)
}

/// Byte length of the balanced `{...}` starting at `s[0]`.
fn balanced_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Non-empty trimmed string field.
pub(crate) fn string_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_object() {
        let map = first_json_object(r#"{"a": 1}"#).unwrap();
        assert_eq!(map["a"], 1);
    }

    #[test]
    fn test_object_inside_prose_and_fences() {
        let text = "Here is the result:\n```json\n{\"citation\": \"S.O. 2000, c. 41\"}\n```\nLet me know!";
        let map = first_json_object(text).unwrap();
        assert_eq!(map["citation"], "S.O. 2000, c. 41");
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let text = r#"{"text": "use {placeholders} like }this", "n": 2} trailing }"#;
        let map = first_json_object(text).unwrap();
        assert_eq!(map["n"], 2);
    }

    #[test]
    fn test_skips_non_json_braces() {
        let text = r#"The {template} is below. {"ok": true}"#;
        let map = first_json_object(text).unwrap();
        assert_eq!(map["ok"], true);
    }

    #[test]
    fn test_no_object() {
        assert_eq!(
            first_json_object("I cannot help with that."),
            Err(JsonScanError::NoObject)
        );
    }

    #[test]
    fn test_unparseable_object() {
        assert_eq!(
            first_json_object("{not: json}"),
            Err(JsonScanError::Unparseable)
        );
    }

    #[test]
    fn test_string_field_skips_blank() {
        let map = first_json_object(r#"{"a": "  ", "b": "value", "n": 7}"#).unwrap();
        assert_eq!(string_field(&map, &["a", "b"]), Some("value".to_string()));
        assert_eq!(string_field(&map, &["n"]), Some("7".to_string()));
        assert_eq!(string_field(&map, &["missing"]), None);
    }
}
