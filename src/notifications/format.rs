//! Plain-text rendering of a diff notification.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{ser::PrettyFormatter, Map, Serializer, Value};

use crate::diff::number::{format_plain, numeric_value};
use crate::diff::{DiffKind, DiffRecord};
use crate::monitoring::models::Monitor;
use crate::selector::canonicalize;

const MAX_VALUE_LEN: usize = 240;

pub fn format_message(monitor: &Monitor, diff: &DiffRecord, checked_at: DateTime<Utc>) -> String {
    let monitor_line = match monitor_label(monitor) {
        Some(label) => format!("Monitor: {label} (#{})", monitor.id),
        None => format!("Monitor: {}", monitor.id),
    };

    let mut lines = vec![
        "fieldwatch diff detected".to_string(),
        monitor_line,
        format!("URL: {}", monitor.url),
        format!(
            "CheckedAt (UTC): {}",
            checked_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        ),
        format!("Kind: {}", diff.kind),
        format!("Summary: {}", diff.summary),
    ];

    let detail = format_detail(diff);
    if !detail.is_empty() {
        lines.push(detail);
    }
    lines.join("\n")
}

pub fn monitor_label(monitor: &Monitor) -> Option<&str> {
    monitor
        .label
        .as_deref()
        .map(str::trim)
        .filter(|label| !label.is_empty())
}

fn format_detail(diff: &DiffRecord) -> String {
    let details = &diff.details;
    if details.is_empty() {
        return String::new();
    }

    match diff.kind {
        DiffKind::Text | DiffKind::DateTime | DiffKind::TypeChanged => {
            let old = details.get("old").and_then(Value::as_str).unwrap_or_default();
            let new = details.get("new").and_then(Value::as_str).unwrap_or_default();
            if old.is_empty() && new.is_empty() {
                return String::new();
            }
            format!("Old: {}\nNew: {}", truncate(old), truncate(new))
        }
        DiffKind::Number => format!(
            "Details: old={} new={} delta={}",
            detail_number(details, "old"),
            detail_number(details, "new"),
            detail_number(details, "delta"),
        ),
        DiffKind::Array => {
            let lines: Vec<String> = [("Added", "added"), ("Removed", "removed")]
                .into_iter()
                .filter_map(|(title, field)| {
                    let counts = format_count_map(details.get(field))?;
                    Some(format!("{title}: {counts}"))
                })
                .collect();
            if lines.is_empty() {
                format_json_details(details)
            } else {
                lines.join("\n")
            }
        }
        DiffKind::ArrayObject => {
            let key_field = details
                .get("keyField")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .unwrap_or("key");
            let lines: Vec<String> = [("Added", "added"), ("Removed", "removed"), ("Updated", "updated")]
                .into_iter()
                .filter_map(|(title, field)| {
                    let keys = format_key_list(details.get(field))?;
                    Some(format!("{title} by {key_field}: {keys}"))
                })
                .collect();
            if lines.is_empty() {
                format_json_details(details)
            } else {
                lines.join("\n")
            }
        }
        DiffKind::ArrayReorder => match (details.get("oldCount"), details.get("newCount")) {
            (Some(old), Some(new)) => format!("Order changed ({old} -> {new} items)"),
            _ => format_json_details(details),
        },
        DiffKind::Object => format_json_details(details),
        _ => String::new(),
    }
}

fn detail_number(details: &Map<String, Value>, field: &str) -> String {
    match details.get(field) {
        Some(value) => numeric_value(value)
            .map(format_plain)
            .unwrap_or_else(|| value.to_string()),
        None => "<nil>".to_string(),
    }
}

/// `"a" (x2), b (x1)` from a map of encoded primitive to occurrence count, sorted by
/// decoded value and truncated like the Old/New lines.
fn format_count_map(value: Option<&Value>) -> Option<String> {
    let counts = value?.as_object()?;
    if counts.is_empty() {
        return None;
    }
    let mut entries: Vec<(String, String)> = counts
        .iter()
        .map(|(encoded, count)| (decode_primitive(encoded), count.to_string()))
        .collect();
    entries.sort();
    let joined = entries
        .into_iter()
        .map(|(value, count)| format!("{value} (x{count})"))
        .collect::<Vec<_>>()
        .join(", ");
    Some(truncate(&joined))
}

fn format_key_list(value: Option<&Value>) -> Option<String> {
    let keys = value?.as_array()?;
    if keys.is_empty() {
        return None;
    }
    let decoded: Vec<String> = keys
        .iter()
        .map(|key| match key {
            Value::String(encoded) => decode_primitive(encoded),
            other => other.to_string(),
        })
        .collect();
    Some(truncate(&decoded.join(", ")))
}

/// Turns a JSON-encoded primitive back into display text: strings lose their quotes,
/// `null` stays `null`, anything unparsable is shown as is.
pub fn decode_primitive(raw: &str) -> String {
    if raw.trim().is_empty() {
        return raw.to_string();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Null) => "null".to_string(),
        Ok(Value::String(text)) => text,
        Ok(Value::Number(number)) => number
            .as_f64()
            .map(format_plain)
            .unwrap_or_else(|| number.to_string()),
        Ok(other) => other.to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Whether a detail value carries nothing worth printing.
fn is_empty_detail(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::String(_) | Value::Number(_) | Value::Bool(_) => false,
    }
}

fn format_json_details(details: &Map<String, Value>) -> String {
    let compact: Map<String, Value> = details
        .iter()
        .filter(|(_, value)| !is_empty_detail(value))
        .map(|(key, value)| (key.clone(), canonicalize(value)))
        .collect();
    if compact.is_empty() {
        return String::new();
    }

    let mut buffer = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(b"  "));
    if Value::Object(compact).serialize(&mut serializer).is_err() {
        return String::new();
    }
    format!("Details: {}", truncate(&String::from_utf8_lossy(&buffer)))
}

/// Trims and cuts to at most 240 bytes on a char boundary, marking the cut with `...`.
pub fn truncate(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.len() <= MAX_VALUE_LEN {
        return trimmed.to_string();
    }
    let mut end = MAX_VALUE_LEN;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;
    use crate::selector::{evaluate, Selection, ValueType};
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn monitor(label: Option<&str>) -> Monitor {
        Monitor {
            id: 12,
            label: label.map(str::to_string),
            method: "GET".into(),
            url: "https://example.test/price".into(),
            body: None,
            headers: BTreeMap::new(),
            auth: BTreeMap::new(),
            selector: None,
            expected_type: "json".into(),
            expected_response: None,
            cron: "* * * * *".into(),
            enabled: true,
            notification_channels: vec!["telegram".into()],
        }
    }

    fn select(payload: &str) -> Selection {
        evaluate(payload.as_bytes(), "").unwrap()
    }

    fn checked_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 30, 5).unwrap()
    }

    #[test]
    fn test_message_includes_label_when_present() {
        let record = diff(
            Some(&Selection::from_stored(ValueType::String, "a".into())),
            &Selection::from_stored(ValueType::String, "b".into()),
        )
        .unwrap();
        let message = format_message(&monitor(Some("  BTC ticker ")), &record, checked_at());
        assert_eq!(
            message,
            "fieldwatch diff detected\n\
             Monitor: BTC ticker (#12)\n\
             URL: https://example.test/price\n\
             CheckedAt (UTC): 2025-03-01T08:30:05Z\n\
             Kind: text\n\
             Summary: text changed\n\
             Old: a\n\
             New: b"
        );
    }

    #[test]
    fn test_message_falls_back_to_id() {
        let record = diff(Some(&select("10")), &select("12")).unwrap();
        let message = format_message(&monitor(Some("   ")), &record, checked_at());
        assert!(message.contains("\nMonitor: 12\n"), "{message}");
        assert!(message.ends_with("Details: old=10 new=12 delta=2"), "{message}");
    }

    #[test]
    fn test_object_details_are_pretty_json() {
        let record = diff(
            Some(&select(r#"{"ask":91384.2,"bid":1}"#)),
            &select(r#"{"ask":91360.1,"bid":1}"#),
        )
        .unwrap();
        let detail = format_detail(&record);
        assert_eq!(
            detail,
            "Details: {\n  \"changed\": [\n    \"ask\"\n  ],\n  \"changes\": {\n    \"ask\": {\n      \"delta\": -24.1,\n      \"new\": 91360.1,\n      \"old\": 91384.2\n    }\n  }\n}"
        );
    }

    #[test]
    fn test_array_detail_decodes_string_entries() {
        let record = diff(Some(&select(r#"["b","z"]"#)), &select(r#"["a","a","b",3]"#)).unwrap();
        assert_eq!(format_detail(&record), "Added: 3 (x1), a (x2)\nRemoved: z (x1)");
    }

    #[test]
    fn test_array_object_detail_decodes_keys() {
        let record = diff(
            Some(&select(r#"[{"id":"x","v":1},{"id":"y","v":1}]"#)),
            &select(r#"[{"id":"x","v":2},{"id":"w","v":1}]"#),
        )
        .unwrap();
        assert_eq!(
            format_detail(&record),
            "Added by id: w\nRemoved by id: y\nUpdated by id: x"
        );
    }

    #[test]
    fn test_large_key_lists_are_capped() {
        let current: Vec<String> = (0..300).map(|i| format!(r#"{{"id":"k{i}"}}"#)).collect();
        let record = diff(
            Some(&select(r#"[{"id":"k0"}]"#)),
            &select(&format!("[{}]", current.join(","))),
        )
        .unwrap();
        let message = format_message(&monitor(None), &record, checked_at());
        let added = message
            .lines()
            .find(|line| line.starts_with("Added by id: "))
            .unwrap();
        assert!(added.ends_with("..."), "{added}");
        let longest = message.lines().map(str::len).max().unwrap();
        assert!(longest <= "Added by id: ".len() + MAX_VALUE_LEN + 3, "{longest}");
    }

    #[test]
    fn test_large_count_maps_are_capped() {
        let current: Vec<String> = (0..300).map(|i| i.to_string()).collect();
        let record = diff(Some(&select("[]")), &select(&format!("[{}]", current.join(",")))).unwrap();
        let detail = format_detail(&record);
        assert!(detail.starts_with("Added: 0 (x1), 1 (x1)"), "{detail}");
        assert!(detail.len() <= "Added: ".len() + MAX_VALUE_LEN + 3, "{detail}");
    }

    #[test]
    fn test_reorder_detail() {
        let record = diff(Some(&select("[1,2]")), &select("[2,1]")).unwrap();
        assert_eq!(format_detail(&record), "Order changed (2 -> 2 items)");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let long = "é".repeat(200);
        let cut = truncate(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.len(), 240 + 3);

        assert_eq!(truncate("  short  "), "short");
    }

    #[test]
    fn test_decode_primitive() {
        assert_eq!(decode_primitive("\"text\""), "text");
        assert_eq!(decode_primitive("null"), "null");
        assert_eq!(decode_primitive("2.50"), "2.5");
        assert_eq!(decode_primitive("true"), "true");
        assert_eq!(decode_primitive("not json"), "not json");
        assert_eq!(decode_primitive("  "), "  ");
    }
}
