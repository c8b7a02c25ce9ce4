/// Pulls the JSON value out of a free-form model reply.
///
/// Models are told to answer with bare JSON but regularly wrap it in prose or
/// markdown fences. Extraction takes the span from the earliest `{` or `[` to
/// the last matching closer (greedy). If that span does not parse, for example
/// because the reply holds two separate JSON blobs, the first balanced span
/// starting at the same opener is tried, then the other bracket kind, unless
/// that opener sits inside the span that just failed.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::utils::log_sanitizer::{sanitize_with_limit, MAX_MODEL_LOG_LENGTH};

static OBJECT_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("valid object span regex"));
static ARRAY_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\[.*\]").expect("valid array span regex"));

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("no JSON object or array found in model reply")]
    NotFound,
    #[error("extracted JSON could not be parsed: {message}")]
    Parse { span: String, message: String },
}

/// Extract and parse the first JSON object or array in `raw`
pub fn extract_json(raw: &str) -> Result<Value, ExtractionError> {
    let mut spans: Vec<(usize, &str)> = [&*OBJECT_SPAN, &*ARRAY_SPAN]
        .iter()
        .filter_map(|re| re.find(raw))
        .map(|m| (m.start(), m.as_str()))
        .collect();
    spans.sort_by_key(|(start, _)| *start);

    if spans.is_empty() {
        tracing::warn!(
            "No JSON found in model response: {}",
            sanitize_with_limit(raw, MAX_MODEL_LOG_LENGTH)
        );
        return Err(ExtractionError::NotFound);
    }

    let mut first_error: Option<ExtractionError> = None;
    let mut failed_until = 0usize;

    for (start, greedy) in &spans {
        // A span opening inside one that already failed is a fragment of it
        if *start < failed_until {
            continue;
        }

        let balanced = balanced_span(&raw[*start..]);
        let candidates =
            std::iter::once(*greedy).chain(balanced.filter(|balanced| balanced != greedy));

        for candidate in candidates {
            match serde_json::from_str::<Value>(candidate) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    first_error.get_or_insert_with(|| ExtractionError::Parse {
                        span: candidate.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }
        failed_until = failed_until.max(start + balanced.unwrap_or(*greedy).len());
    }

    let error = first_error.unwrap_or(ExtractionError::NotFound);
    if let ExtractionError::Parse { span, message } = &error {
        tracing::warn!(
            "Failed to parse extracted JSON ({}): {}",
            message,
            sanitize_with_limit(span, MAX_MODEL_LOG_LENGTH)
        );
    }
    Err(error)
}

/// The shortest prefix of `text` (which starts with `{` or `[`) whose brackets
/// balance, skipping over string literals.
fn balanced_span(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (index, c) in text.char_indices() {
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
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=index]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_object() {
        let value = extract_json(r#"{"name": "John"}"#).unwrap();
        assert_eq!(value, json!({"name": "John"}));
    }

    #[test]
    fn test_object_in_markdown_fence() {
        let raw = "Here is your query:\n```json\n{\n  \"collections\": [\"users\"],\n  \"query\": {\"age\": {\"$gt\": 25}}\n}\n```\nLet me know!";
        let value = extract_json(raw).unwrap();
        assert_eq!(
            value,
            json!({"collections": ["users"], "query": {"age": {"$gt": 25}}})
        );
    }

    #[test]
    fn test_top_level_array() {
        let value = extract_json("```\n[{\"$match\": {\"a\": 1}}]\n```").unwrap();
        assert_eq!(value, json!([{"$match": {"a": 1}}]));
    }

    #[test]
    fn test_no_brackets_is_not_found() {
        assert_eq!(
            extract_json("I could not translate that question."),
            Err(ExtractionError::NotFound)
        );
        assert_eq!(extract_json(""), Err(ExtractionError::NotFound));
    }

    #[test]
    fn test_unclosed_brace_is_not_found() {
        assert_eq!(extract_json("{\"name\": "), Err(ExtractionError::NotFound));
    }

    #[test]
    fn test_invalid_span_is_parse_error() {
        match extract_json("Sure: {name: John}") {
            Err(ExtractionError::Parse { span, .. }) => assert_eq!(span, "{name: John}"),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_two_blobs_fall_back_to_first_balanced() {
        let raw = r#"{"name": "John"} and alternatively {"name": "Jon"}"#;
        assert_eq!(extract_json(raw).unwrap(), json!({"name": "John"}));
    }

    #[test]
    fn test_braces_inside_strings() {
        let raw = r#"{"name": {"$regex": "^J}"}} trailing } brace"#;
        assert_eq!(
            extract_json(raw).unwrap(),
            json!({"name": {"$regex": "^J}"}})
        );
    }

    #[test]
    fn test_footnote_bracket_before_object() {
        let raw = r#"[see note] the filter is {"status": "active"}"#;
        assert_eq!(extract_json(raw).unwrap(), json!({"status": "active"}));
    }

    #[test]
    fn test_array_inside_invalid_object_is_parse_error() {
        match extract_json("Sure: {name: John, tags: [1, 2]}") {
            Err(ExtractionError::Parse { span, .. }) => {
                assert_eq!(span, "{name: John, tags: [1, 2]}")
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_footnote_with_later_brackets_before_object() {
        let raw = r#"[see note] the filter is {"status": "active"} [1]"#;
        assert_eq!(extract_json(raw).unwrap(), json!({"status": "active"}));
    }

    #[test]
    fn test_balanced_span() {
        assert_eq!(balanced_span(r#"{"a": [1, 2]} tail"#), Some(r#"{"a": [1, 2]}"#));
        assert_eq!(balanced_span(r#"{"a": "\"}"}"#), Some(r#"{"a": "\"}"}"#));
        assert_eq!(balanced_span("{ never closed"), None);
    }
}
