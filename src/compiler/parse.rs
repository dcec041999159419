//! Lenient JSON extraction for model output
//!
//! The validator is told to answer with bare JSON, but models still wrap it
//! in prose or code fences. Extraction is deliberately shallow: the whole
//! string, then the first `{` through the last `}`. No brace balancing,
//! trailing-comma repair or comment stripping. Prose that contains a brace
//! before the real object, or output with several objects, will mis-extract.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no extractable JSON object found in model output")]
    NoJsonObject,
    #[error("malformed JSON in model output: {0}")]
    Malformed(String),
}

/// Parse model output as JSON, falling back to the outermost brace pair.
pub fn parse_json_loose(text: &str) -> Result<Value, ParseError> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Ok(value);
    }

    let fragment = extract_json_fragment(text).ok_or(ParseError::NoJsonObject)?;
    serde_json::from_str(fragment).map_err(|e| ParseError::Malformed(e.to_string()))
}

/// Slice from the first `{` to the last `}` inclusive.
fn extract_json_fragment(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if start < end {
        Some(&text[start..=end])
    } else {
        None
    }
}
