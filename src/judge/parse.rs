//! Parsing of judge responses.
//!
//! Judges are asked for JSON but routinely wrap it in markdown code fences or
//! answer with prose. Everything here is total: malformed input becomes a
//! [`ParseFailure`] and the caller substitutes its documented default.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Why a judge response could not be turned into the expected value.
#[derive(Debug, thiserror::Error)]
pub enum ParseFailure {
    #[error("judge response is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("judge response is missing key `{0}`")]
    MissingKey(String),

    #[error("judge response key `{key}` has the wrong type: {source}")]
    WrongType {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Remove a surrounding markdown code fence, if any.
///
/// Handles ```` ```json\n...\n``` ````, ```` ```\n...\n``` ```` and bare text.
/// The result is always trimmed.
pub fn strip_fences(raw: &str) -> &str {
    let mut clean = raw.trim();
    if let Some(rest) = clean.strip_prefix("```json") {
        clean = rest;
    } else if let Some(rest) = clean.strip_prefix("```") {
        clean = rest;
    }
    if let Some(rest) = clean.strip_suffix("```") {
        clean = rest;
    }
    clean.trim()
}

/// Parse a judge response as JSON after stripping fences.
pub fn extract_json(raw: &str) -> Result<Value, ParseFailure> {
    Ok(serde_json::from_str(strip_fences(raw))?)
}

/// Parse a judge response straight into a typed value.
pub fn extract_as<T: DeserializeOwned>(raw: &str) -> Result<T, ParseFailure> {
    Ok(serde_json::from_str(strip_fences(raw))?)
}

/// Extract one typed field from a JSON-object judge response.
pub fn extract_field<T: DeserializeOwned>(raw: &str, key: &str) -> Result<T, ParseFailure> {
    let mut value = extract_json(raw)?;
    let field = value
        .get_mut(key)
        .map(Value::take)
        .ok_or_else(|| ParseFailure::MissingKey(key.to_string()))?;
    serde_json::from_value(field).map_err(|source| ParseFailure::WrongType {
        key: key.to_string(),
        source,
    })
}

/// Score a judge constrained to answer exactly `1` or `0`.
///
/// Anything other than a bare `1` (prose, the client's error sentinel, other
/// numbers) scores 0.
pub fn parse_binary(raw: &str) -> f64 {
    if strip_fences(raw) == "1" {
        1.0
    } else {
        0.0
    }
}
