//! Selector evaluation.
//!
//! Extracts the value of interest from a JSON payload and normalizes it to a canonical
//! string plus a type tag. The canonical form is what gets stored in check history and
//! what the diff engine compares, so it has to be stable: evaluating the same payload
//! twice must produce byte-identical output.

pub mod path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("invalid JSON payload: {0}")]
    InvalidJson(String),
    #[error("failed to encode selected value: {0}")]
    Encode(String),
}

/// Type tag of a selected value, as persisted next to the normalized value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    True,
    False,
    Null,
    Json,
    None,
}

impl ValueType {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::String(_) => ValueType::String,
            Value::Number(_) => ValueType::Number,
            Value::Bool(true) => ValueType::True,
            Value::Bool(false) => ValueType::False,
            Value::Null => ValueType::Null,
            Value::Array(_) | Value::Object(_) => ValueType::Json,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Number => "number",
            ValueType::True => "true",
            ValueType::False => "false",
            ValueType::Null => "null",
            ValueType::Json => "json",
            ValueType::None => "none",
        }
    }

    /// Parses a stored type tag. Unknown tags yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "string" => Some(ValueType::String),
            "number" => Some(ValueType::Number),
            "true" => Some(ValueType::True),
            "false" => Some(ValueType::False),
            "null" => Some(ValueType::Null),
            "json" => Some(ValueType::Json),
            "none" => Some(ValueType::None),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a selected value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub exists: bool,
    pub value_type: ValueType,
    /// Raw textual form of the selected value (compact JSON for sub-values).
    pub raw: String,
    /// Canonical form used for equality and storage.
    pub value: String,
}

impl Selection {
    pub fn missing() -> Self {
        Self {
            exists: false,
            value_type: ValueType::None,
            raw: String::new(),
            value: String::new(),
        }
    }

    /// Rebuilds a snapshot from a stored history row. The raw form is not persisted.
    pub fn from_stored(value_type: ValueType, value: String) -> Self {
        Self {
            exists: true,
            value_type,
            raw: String::new(),
            value,
        }
    }

    fn from_value(value: &Value, raw: String) -> Self {
        let normalized = normalize(value, &raw);
        Self {
            exists: true,
            value_type: ValueType::of(value),
            raw,
            value: normalized,
        }
    }
}

/// Evaluates `path` against a JSON payload.
///
/// An empty path selects the whole document. A path that does not resolve yields a
/// selection with `exists == false`. A payload that is not valid JSON, or a selected value
/// that cannot be re-encoded, is an error.
pub fn evaluate(payload: &[u8], path: &str) -> Result<Selection, SelectorError> {
    let document: Value =
        serde_json::from_slice(payload).map_err(|e| SelectorError::InvalidJson(e.to_string()))?;

    let path = path.trim();
    if path.is_empty() {
        let raw = String::from_utf8_lossy(payload).trim().to_string();
        return Ok(Selection::from_value(&document, raw));
    }

    match path::resolve(&document, path) {
        Some(selected) => {
            let raw = serde_json::to_string(&selected)
                .map_err(|e| SelectorError::Encode(e.to_string()))?;
            Ok(Selection::from_value(&selected, raw))
        }
        None => Ok(Selection::missing()),
    }
}

/// Normalizes a selected value. Strings are trimmed as-is, everything else goes through
/// a canonical JSON encoding, falling back to the trimmed raw text.
pub fn normalize(value: &Value, raw: &str) -> String {
    match value {
        Value::String(text) => text.trim().to_string(),
        other => canonical_json(other).unwrap_or_else(|| raw.trim().to_string()),
    }
}

/// Compact JSON with sorted object keys and integral floats written as integers.
pub fn canonical_json(value: &Value) -> Option<String> {
    serde_json::to_string(&canonicalize(value)).ok()
}

// Largest integer an f64 represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

pub(crate) fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Number(number) => {
            if number.is_f64() {
                if let Some(float) = number.as_f64() {
                    if float.fract() == 0.0 && float.abs() < MAX_SAFE_INTEGER {
                        return Value::from(float as i64);
                    }
                }
            }
            value.clone()
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_path_selects_whole_document() {
        let selection = evaluate(br#" {"b": 2, "a": [1, 2.50]} "#, "  ").unwrap();
        assert!(selection.exists);
        assert_eq!(selection.value_type, ValueType::Json);
        assert_eq!(selection.raw, r#"{"b": 2, "a": [1, 2.50]}"#);
        assert_eq!(selection.value, r#"{"a":[1,2.5],"b":2}"#);
    }

    #[test]
    fn test_nested_path_selects_number() {
        let selection = evaluate(br#"{"data":{"price":"x","ask":91650.30}}"#, "data.ask").unwrap();
        assert_eq!(selection.value_type, ValueType::Number);
        assert_eq!(selection.value, "91650.3");
    }

    #[test]
    fn test_strings_are_trimmed_not_reencoded() {
        let selection = evaluate(br#"{"status":"  ready  "}"#, "status").unwrap();
        assert_eq!(selection.value_type, ValueType::String);
        assert_eq!(selection.value, "ready");
        assert_eq!(selection.raw, r#""  ready  ""#);
    }

    #[test]
    fn test_booleans_and_null_tags() {
        let payload = br#"{"a":true,"b":false,"c":null}"#;
        assert_eq!(evaluate(payload, "a").unwrap().value_type, ValueType::True);
        assert_eq!(evaluate(payload, "b").unwrap().value_type, ValueType::False);
        let null = evaluate(payload, "c").unwrap();
        assert_eq!(null.value_type, ValueType::Null);
        assert_eq!(null.value, "null");
    }

    #[test]
    fn test_missing_path_is_not_an_error() {
        let selection = evaluate(br#"{"a":1}"#, "b.c").unwrap();
        assert!(!selection.exists);
        assert_eq!(selection.value_type, ValueType::None);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(matches!(
            evaluate(b"<html></html>", ""),
            Err(SelectorError::InvalidJson(_))
        ));
        assert!(evaluate(b"", "a").is_err());
    }

    #[test]
    fn test_selected_sub_value_keeps_compact_raw() {
        let selection = evaluate(br#"{"a":{"list":[1, 2.5, "x"]}}"#, "a.list").unwrap();
        assert_eq!(selection.raw, r#"[1,2.5,"x"]"#);
        assert!(!selection.raw.is_empty());

        let err = SelectorError::Encode("key must be a string".into());
        assert_eq!(err.to_string(), "failed to encode selected value: key must be a string");
    }

    #[test]
    fn test_integral_floats_normalize_to_integers() {
        let selection = evaluate(br#"{"v":[1.0, 1e3, 0.5]}"#, "v").unwrap();
        assert_eq!(selection.value, "[1,1000,0.5]");
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let payload = br#"{"markets":[{"id":"BTC-AUD","bid":"91218.00"},{"id":"ETH-AUD","z":{"b":1,"a":2}}]}"#;
        let first = evaluate(payload, "markets").unwrap();
        let second = evaluate(payload, "markets").unwrap();
        assert_eq!(first.value.as_bytes(), second.value.as_bytes());
        assert_eq!(first, second);
    }

    #[test]
    fn test_value_type_round_trips_through_storage_tag() {
        for tag in [
            ValueType::String,
            ValueType::Number,
            ValueType::True,
            ValueType::False,
            ValueType::Null,
            ValueType::Json,
        ] {
            assert_eq!(ValueType::parse(tag.as_str()), Some(tag));
        }
        assert_eq!(ValueType::parse("bogus"), None);
    }
}
