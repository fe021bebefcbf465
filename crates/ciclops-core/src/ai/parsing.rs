//! JSON parsing helpers for AI backend responses
//!
//! Models often wrap the JSON payload in prose or a ```json fence; these
//! helpers cut out the outermost object before deserializing.

use crate::error::{Error, Result};

use super::types::ClassificationSuggestion;

/// Longest raw response excerpt kept in error messages
const EXCERPT_CHARS: usize = 200;

fn excerpt(text: &str) -> String {
    if text.chars().count() > EXCERPT_CHARS {
        let cut: String = text.chars().take(EXCERPT_CHARS).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

/// Slice between the first `{` and the last `}`
pub fn extract_json_object(response: &str) -> Option<&str> {
    let response = response.trim();
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (start < end).then(|| &response[start..=end])
}

/// Parse a classification suggestion from a model response
pub fn parse_classification_suggestion(response: &str) -> Result<ClassificationSuggestion> {
    let json_str = extract_json_object(response).ok_or_else(|| {
        Error::InvalidData(format!(
            "No JSON found in AI response | Raw: {}",
            excerpt(response.trim())
        ))
    })?;

    let mut suggestion: ClassificationSuggestion = serde_json::from_str(json_str).map_err(|e| {
        Error::InvalidData(format!(
            "Invalid JSON from AI: {} | Raw: {}",
            e,
            excerpt(json_str)
        ))
    })?;

    suggestion.confidence = suggestion.confidence.clamp(0.0, 1.0);
    suggestion.store_guesses.retain(|s| !s.trim().is_empty());
    if suggestion
        .doc_type
        .as_deref()
        .is_some_and(|t| t.trim().is_empty())
    {
        suggestion.doc_type = None;
    }
    Ok(suggestion)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let s = parse_classification_suggestion(
            r#"{"doc_type": "bank_statement", "period_guess": "2025-P3", "store_guesses": ["Centro"], "confidence": 0.8}"#,
        )
        .unwrap();
        assert_eq!(s.doc_type.as_deref(), Some("bank_statement"));
        assert_eq!(s.period_guess.as_deref(), Some("2025-P3"));
        assert_eq!(s.store_guesses, vec!["Centro"]);
    }

    #[test]
    fn test_parse_fenced_json_with_prose() {
        let raw = "Sure! Here is the result:\n```json\n{\"doc_type\": \"inventory\", \"confidence\": 1.7}\n```";
        let s = parse_classification_suggestion(raw).unwrap();
        assert_eq!(s.doc_type.as_deref(), Some("inventory"));
        assert_eq!(s.confidence, 1.0);
        assert!(s.store_guesses.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_classification_suggestion("no json here").is_err());
        assert!(parse_classification_suggestion("{not json}").is_err());
    }
}
