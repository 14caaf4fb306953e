//! Type-aware structural diff between two selection snapshots.

mod array;
pub mod number;
mod object;

use chrono::{DateTime, FixedOffset, TimeDelta, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

use crate::selector::{canonical_json, Selection, ValueType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiffKind {
    Initial,
    TypeChanged,
    Number,
    Boolean,
    Null,
    Text,
    DateTime,
    Array,
    ArrayReorder,
    ArrayObject,
    Object,
}

impl DiffKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffKind::Initial => "initial",
            DiffKind::TypeChanged => "typeChanged",
            DiffKind::Number => "number",
            DiffKind::Boolean => "boolean",
            DiffKind::Null => "null",
            DiffKind::Text => "text",
            DiffKind::DateTime => "dateTime",
            DiffKind::Array => "array",
            DiffKind::ArrayReorder => "arrayReorder",
            DiffKind::ArrayObject => "arrayObject",
            DiffKind::Object => "object",
        }
    }
}

impl fmt::Display for DiffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffRecord {
    pub kind: DiffKind,
    pub changed: bool,
    pub summary: String,
    pub details: Map<String, Value>,
}

impl DiffRecord {
    fn new(kind: DiffKind, changed: bool, summary: impl Into<String>, details: Map<String, Value>) -> Self {
        Self {
            kind,
            changed,
            summary: summary.into(),
            details,
        }
    }

    /// Canonical JSON text of the details, `None` when there are none.
    pub fn details_json(&self) -> Option<String> {
        if self.details.is_empty() {
            return None;
        }
        canonical_json(&Value::Object(self.details.clone()))
    }
}

/// Coarse kind a selection is compared under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectionKind {
    None,
    Text,
    Number,
    Boolean,
    Null,
    Array,
    Object,
    Json,
    Unknown,
}

impl SelectionKind {
    fn of(selection: &Selection) -> Self {
        if !selection.exists {
            return SelectionKind::None;
        }
        match selection.value_type {
            ValueType::String => SelectionKind::Text,
            ValueType::Number => SelectionKind::Number,
            ValueType::True | ValueType::False => SelectionKind::Boolean,
            ValueType::Null => SelectionKind::Null,
            ValueType::Json => {
                let raw = selection.raw.trim();
                let raw = if raw.is_empty() { selection.value.trim() } else { raw };
                if raw.starts_with('[') {
                    SelectionKind::Array
                } else if raw.starts_with('{') {
                    SelectionKind::Object
                } else {
                    SelectionKind::Json
                }
            }
            ValueType::None => SelectionKind::Unknown,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            SelectionKind::None => "none",
            SelectionKind::Text => "text",
            SelectionKind::Number => "number",
            SelectionKind::Boolean => "boolean",
            SelectionKind::Null => "null",
            SelectionKind::Array => "array",
            SelectionKind::Object => "object",
            SelectionKind::Json => "json",
            SelectionKind::Unknown => "unknown",
        }
    }
}

/// Compares the current selection with the previously stored one.
///
/// Returns `None` when there is nothing to compare (the current selection does not
/// exist). A missing previous selection yields an `initial` record.
pub fn diff(previous: Option<&Selection>, current: &Selection) -> Option<DiffRecord> {
    if !current.exists {
        return None;
    }

    let current_kind = SelectionKind::of(current);
    let previous = match previous {
        Some(previous) if previous.exists => previous,
        _ => {
            let mut details = Map::new();
            details.insert("type".into(), json!(current_kind.as_str()));
            details.insert("current".into(), json!(current.value));
            return Some(DiffRecord::new(
                DiffKind::Initial,
                false,
                "initial value captured",
                details,
            ));
        }
    };

    let previous_kind = SelectionKind::of(previous);
    if previous_kind != current_kind {
        let mut details = Map::new();
        details.insert("oldType".into(), json!(previous_kind.as_str()));
        details.insert("newType".into(), json!(current_kind.as_str()));
        details.insert("old".into(), json!(previous.value));
        details.insert("new".into(), json!(current.value));
        return Some(DiffRecord::new(
            DiffKind::TypeChanged,
            true,
            format!(
                "type changed from {} to {}",
                previous_kind.as_str(),
                current_kind.as_str()
            ),
            details,
        ));
    }

    let record = match current_kind {
        SelectionKind::Number => number_diff(previous, current),
        SelectionKind::Boolean => boolean_diff(previous, current),
        SelectionKind::Null => null_diff(previous, current),
        SelectionKind::Text => {
            datetime_diff(previous, current).unwrap_or_else(|| text_diff(previous, current))
        }
        SelectionKind::Array => array::array_diff(previous, current),
        SelectionKind::Object => object::object_diff(previous, current),
        _ => text_diff(previous, current),
    };
    Some(record)
}

fn old_new(old: Value, new: Value) -> Map<String, Value> {
    let mut details = Map::new();
    details.insert("old".into(), old);
    details.insert("new".into(), new);
    details
}

fn text_diff(previous: &Selection, current: &Selection) -> DiffRecord {
    let changed = previous.value != current.value;
    let summary = if changed { "text changed" } else { "text unchanged" };
    DiffRecord::new(
        DiffKind::Text,
        changed,
        summary,
        old_new(json!(previous.value), json!(current.value)),
    )
}

fn number_diff(previous: &Selection, current: &Selection) -> DiffRecord {
    let (Ok(old), Ok(new)) = (
        previous.value.trim().parse::<f64>(),
        current.value.trim().parse::<f64>(),
    ) else {
        return text_diff(previous, current);
    };

    let precision = number::max_decimal_places(
        number::decimal_places(&previous.value),
        number::decimal_places(&current.value),
    );
    let delta = number::round_to_places(new - old, precision);
    let changed = delta != 0.0;
    let summary = if changed {
        format!("number changed by {}", number::format_signed(delta))
    } else {
        "number unchanged".to_string()
    };

    let mut details = old_new(json!(old), json!(new));
    details.insert("delta".into(), json!(delta));
    if old != 0.0 {
        details.insert("percent".into(), json!(delta / old * 100.0));
    }
    DiffRecord::new(DiffKind::Number, changed, summary, details)
}

fn boolean_diff(previous: &Selection, current: &Selection) -> DiffRecord {
    let old = previous.value_type == ValueType::True;
    let new = current.value_type == ValueType::True;
    let changed = old != new;
    let summary = if changed {
        format!("boolean changed from {old} to {new}")
    } else {
        "boolean unchanged".to_string()
    };
    DiffRecord::new(DiffKind::Boolean, changed, summary, old_new(json!(old), json!(new)))
}

fn null_diff(previous: &Selection, current: &Selection) -> DiffRecord {
    let changed = previous.value_type != current.value_type;
    let summary = if changed { "value changed to null" } else { "null unchanged" };
    DiffRecord::new(
        DiffKind::Null,
        changed,
        summary,
        old_new(json!(previous.value), json!(current.value)),
    )
}

fn datetime_diff(previous: &Selection, current: &Selection) -> Option<DiffRecord> {
    let old = parse_datetime(&previous.value)?;
    let new = parse_datetime(&current.value)?;

    let delta = new.signed_duration_since(old);
    let changed = delta != TimeDelta::zero();
    let summary = if changed {
        format!("datetime shifted by {}", format_delta(delta))
    } else {
        "datetime unchanged".to_string()
    };

    let mut details = old_new(json!(format_rfc3339(&old)), json!(format_rfc3339(&new)));
    details.insert("deltaSeconds".into(), json!(delta_seconds(delta)));
    Some(DiffRecord::new(DiffKind::DateTime, changed, summary, details))
}

fn parse_datetime(value: &str) -> Option<DateTime<FixedOffset>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(trimmed).ok()
}

/// RFC 3339 with only the fractional digits that are needed and `Z` for UTC.
fn format_rfc3339(value: &DateTime<FixedOffset>) -> String {
    let mut out = value.format("%Y-%m-%dT%H:%M:%S").to_string();
    let nanos = value.nanosecond() % 1_000_000_000;
    if nanos > 0 {
        let fraction = format!("{nanos:09}");
        out.push('.');
        out.push_str(fraction.trim_end_matches('0'));
    }
    if value.offset().local_minus_utc() == 0 {
        out.push('Z');
    } else {
        out.push_str(&value.format("%:z").to_string());
    }
    out
}

fn delta_seconds(delta: TimeDelta) -> f64 {
    delta.num_seconds() as f64 + f64::from(delta.subsec_nanos()) / 1e9
}

/// Compact `1h2m3.5s` rendering of a signed duration.
fn format_delta(delta: TimeDelta) -> String {
    let negative = delta < TimeDelta::zero();
    let delta = delta.abs();
    let hours = delta.num_hours();
    let minutes = delta.num_minutes() % 60;
    let seconds = delta.num_seconds() % 60;
    let nanos = delta.subsec_nanos();

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    out.push_str(&seconds.to_string());
    if nanos > 0 {
        let fraction = format!("{nanos:09}");
        out.push('.');
        out.push_str(fraction.trim_end_matches('0'));
    }
    out.push('s');
    out
}

/// Structural equality that compares numbers by value, so `1` equals `1.0`.
pub(crate) fn json_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| json_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| json_equal(x, y)))
        }
        _ => left == right,
    }
}

/// Stable encoding used as a multiset or lookup key.
pub(crate) fn stable_json(value: &Value) -> String {
    canonical_json(value).unwrap_or_else(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::evaluate;

    fn number(value: &str) -> Selection {
        Selection::from_stored(ValueType::Number, value.to_string())
    }

    fn text(value: &str) -> Selection {
        Selection::from_stored(ValueType::String, value.to_string())
    }

    #[test]
    fn test_missing_current_yields_nothing() {
        assert!(diff(Some(&number("1")), &Selection::missing()).is_none());
    }

    #[test]
    fn test_first_value_is_initial() {
        let record = diff(None, &number("42")).unwrap();
        assert_eq!(record.kind, DiffKind::Initial);
        assert!(!record.changed);
        assert_eq!(record.summary, "initial value captured");
        assert_eq!(record.details["type"], json!("number"));
        assert_eq!(record.details["current"], json!("42"));

        let again = diff(Some(&Selection::missing()), &number("42")).unwrap();
        assert_eq!(again.kind, DiffKind::Initial);
    }

    #[test]
    fn test_initial_then_unchanged() {
        let payload = br#"{"price":"91218.00"}"#;
        let first = evaluate(payload, "price").unwrap();
        assert_eq!(diff(None, &first).unwrap().kind, DiffKind::Initial);

        let second = evaluate(payload, "price").unwrap();
        let record = diff(Some(&first), &second).unwrap();
        assert_eq!(record.kind, DiffKind::Text);
        assert!(!record.changed);
    }

    #[test]
    fn test_type_change() {
        let record = diff(Some(&number("1")), &text("one")).unwrap();
        assert_eq!(record.kind, DiffKind::TypeChanged);
        assert!(record.changed);
        assert_eq!(record.summary, "type changed from number to text");
        assert_eq!(record.details["oldType"], json!("number"));
        assert_eq!(record.details["new"], json!("one"));
    }

    #[test]
    fn test_number_delta() {
        let record = diff(Some(&number("10")), &number("12.5")).unwrap();
        assert_eq!(record.kind, DiffKind::Number);
        assert!(record.changed);
        assert_eq!(record.summary, "number changed by +2.5");
        assert_eq!(record.details["delta"], json!(2.5));
        assert_eq!(record.details["percent"], json!(25.0));
    }

    #[test]
    fn test_number_delta_is_rounded_to_input_precision() {
        let record = diff(Some(&number("91650.3")), &number("91652.9")).unwrap();
        assert_eq!(record.details["delta"].as_f64(), Some(2.6));
        assert_eq!(record.summary, "number changed by +2.6");
    }

    #[test]
    fn test_number_formatting_does_not_count_as_change() {
        let record = diff(Some(&number("91650.30")), &number("91650.3")).unwrap();
        assert_eq!(record.kind, DiffKind::Number);
        assert!(!record.changed);
        assert_eq!(record.summary, "number unchanged");
        assert_eq!(record.details["delta"].as_f64(), Some(0.0));
    }

    #[test]
    fn test_number_without_previous_zero_has_no_percent() {
        let record = diff(Some(&number("0")), &number("3")).unwrap();
        assert!(!record.details.contains_key("percent"));
    }

    #[test]
    fn test_unparseable_number_falls_back_to_text() {
        let record = diff(Some(&number("abc")), &number("1")).unwrap();
        assert_eq!(record.kind, DiffKind::Text);
        assert!(record.changed);
    }

    #[test]
    fn test_boolean_flip() {
        let previous = Selection::from_stored(ValueType::True, "true".into());
        let current = Selection::from_stored(ValueType::False, "false".into());
        let record = diff(Some(&previous), &current).unwrap();
        assert_eq!(record.kind, DiffKind::Boolean);
        assert_eq!(record.summary, "boolean changed from true to false");
        assert_eq!(record.details["old"], json!(true));
    }

    #[test]
    fn test_null_unchanged() {
        let null = Selection::from_stored(ValueType::Null, "null".into());
        let record = diff(Some(&null), &null).unwrap();
        assert_eq!(record.kind, DiffKind::Null);
        assert!(!record.changed);
    }

    #[test]
    fn test_text_change() {
        let record = diff(Some(&text("open")), &text("closed")).unwrap();
        assert_eq!(record.kind, DiffKind::Text);
        assert!(record.changed);
        assert_eq!(record.summary, "text changed");
    }

    #[test]
    fn test_datetime_shift() {
        let record = diff(
            Some(&text("2026-02-25T12:00:00Z")),
            &text("2026-02-25T13:30:00.5+00:00"),
        )
        .unwrap();
        assert_eq!(record.kind, DiffKind::DateTime);
        assert!(record.changed);
        assert_eq!(record.summary, "datetime shifted by 1h30m0.5s");
        assert_eq!(record.details["deltaSeconds"], json!(5400.5));
        assert_eq!(record.details["new"], json!("2026-02-25T13:30:00.5Z"));
    }

    #[test]
    fn test_datetime_same_instant_in_other_offset_is_unchanged() {
        let record = diff(
            Some(&text("2026-02-25T12:00:00Z")),
            &text("2026-02-25T23:00:00+11:00"),
        )
        .unwrap();
        assert_eq!(record.kind, DiffKind::DateTime);
        assert!(!record.changed);
        assert_eq!(record.summary, "datetime unchanged");
    }

    #[test]
    fn test_json_equal_compares_numbers_by_value() {
        assert!(json_equal(&json!({"a": [1, 2.0]}), &json!({"a": [1.0, 2]})));
        assert!(!json_equal(&json!([1]), &json!([1, 1])));
        assert!(!json_equal(&json!({"a": 1}), &json!({"b": 1})));
    }

    #[test]
    fn test_details_json_is_canonical() {
        let record = diff(Some(&number("10")), &number("12")).unwrap();
        assert_eq!(
            record.details_json().unwrap(),
            r#"{"delta":2,"new":12,"old":10,"percent":20}"#
        );
    }
}
