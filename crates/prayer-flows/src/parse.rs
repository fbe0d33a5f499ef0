//! Decoding of model answers.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;

use crate::error::FlowsError;

static FENCED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```[A-Za-z]*\s*\n?(.*?)\s*```\s*$").expect("valid regex"));

/// Strips an optional Markdown code fence around the answer
pub fn strip_code_fence(raw: &str) -> &str {
    match FENCED.captures(raw).and_then(|c| c.get(1)) {
        Some(body) => body.as_str(),
        None => raw.trim(),
    }
}

/// Parses a JSON answer, fenced or not
pub fn parse_model_json<T: DeserializeOwned>(operation: &str, raw: &str) -> Result<T, FlowsError> {
    serde_json::from_str(strip_code_fence(raw)).map_err(|e| {
        let message = e.to_string();
        let message = message.split(" at line ").next().unwrap_or_default().to_string();
        FlowsError::MalformedOutput {
            operation: operation.to_string(),
            message,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DailyVerse;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_plain_and_fenced_json() {
        let plain = r#"{"verse": "Pray without ceasing.", "reference": "1 Thessalonians 5:17"}"#;
        let fenced = format!("```json\n{plain}\n```");
        let bare_fence = format!("```\n{plain}\n```\n");

        let expected = DailyVerse {
            verse: "Pray without ceasing.".to_string(),
            reference: "1 Thessalonians 5:17".to_string(),
        };
        for raw in [plain.to_string(), fenced, bare_fence] {
            assert_eq!(parse_model_json::<DailyVerse>("dailyVerse", &raw).unwrap(), expected);
        }
    }

    #[test]
    fn test_malformed_output() {
        let err = parse_model_json::<DailyVerse>("dailyVerse", "Here is a verse for you!").unwrap_err();
        match err {
            FlowsError::MalformedOutput { operation, message } => {
                assert_eq!(operation, "dailyVerse");
                assert!(!message.contains("line"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_output_omits_position() {
        let raw = format!("{}?", " ".repeat(428));
        let err = parse_model_json::<DailyVerse>("dailyVerse", &raw).unwrap_err();
        match err {
            FlowsError::MalformedOutput { message, .. } => {
                assert!(!message.contains("429"), "{message}");
                assert!(!message.contains("column"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
