use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

use super::number::{decimal_places_of, max_decimal_places, numeric_value, round_to_places};
use super::{json_equal, text_diff, DiffKind, DiffRecord};
use crate::selector::Selection;

#[derive(Default)]
struct ObjectChanges {
    added: Vec<String>,
    removed: Vec<String>,
    changed: Vec<String>,
    changes: Map<String, Value>,
}

pub(super) fn object_diff(previous: &Selection, current: &Selection) -> DiffRecord {
    let (Ok(Value::Object(old)), Ok(Value::Object(new))) = (
        serde_json::from_str::<Value>(&previous.value),
        serde_json::from_str::<Value>(&current.value),
    ) else {
        return text_diff(previous, current);
    };

    let mut collected = ObjectChanges::default();
    collect("", &old, &new, &mut collected);
    collected.added.sort();
    collected.removed.sort();
    collected.changed.sort();

    let ObjectChanges {
        added,
        removed,
        changed: changed_paths,
        changes,
    } = collected;

    let changed = !added.is_empty() || !removed.is_empty() || !changed_paths.is_empty();
    let summary = if changed {
        format!(
            "object changed (+{} -{} ~{})",
            added.len(),
            removed.len(),
            changed_paths.len()
        )
    } else {
        "object unchanged".to_string()
    };

    let mut details = Map::new();
    if !added.is_empty() {
        details.insert("added".into(), json!(added));
    }
    if !removed.is_empty() {
        details.insert("removed".into(), json!(removed));
    }
    if !changed_paths.is_empty() {
        details.insert("changed".into(), json!(changed_paths));
    }
    if !changes.is_empty() {
        details.insert("changes".into(), Value::Object(changes));
    }
    DiffRecord::new(DiffKind::Object, changed, summary, details)
}

fn collect(
    prefix: &str,
    old: &Map<String, Value>,
    new: &Map<String, Value>,
    out: &mut ObjectChanges,
) {
    let keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();

    for key in keys {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        match (old.get(key), new.get(key)) {
            (None, Some(_)) => out.added.push(path),
            (Some(_), None) => out.removed.push(path),
            (Some(Value::Object(old_child)), Some(Value::Object(new_child))) => {
                collect(&path, old_child, new_child, out);
            }
            (Some(old_value), Some(new_value)) => {
                if json_equal(old_value, new_value) {
                    continue;
                }
                let mut entry = Map::new();
                entry.insert("old".into(), old_value.clone());
                entry.insert("new".into(), new_value.clone());
                if let (Some(old_number), Some(new_number)) =
                    (numeric_value(old_value), numeric_value(new_value))
                {
                    let precision = max_decimal_places(
                        decimal_places_of(old_value),
                        decimal_places_of(new_value),
                    );
                    entry.insert(
                        "delta".into(),
                        json!(round_to_places(new_number - old_number, precision)),
                    );
                }
                out.changes.insert(path.clone(), Value::Object(entry));
                out.changed.push(path);
            }
            (None, None) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::diff;
    use super::*;
    use crate::selector::evaluate;

    fn select(payload: &str) -> Selection {
        evaluate(payload.as_bytes(), "").unwrap()
    }

    #[test]
    fn test_ask_delta_is_rounded() {
        let record = diff(
            Some(&select(r#"{"ask":91384.2,"bid":91300.0,"pair":"BTC-AUD"}"#)),
            &select(r#"{"ask":91360.1,"bid":91300.0,"pair":"BTC-AUD"}"#),
        )
        .unwrap();
        assert_eq!(record.kind, DiffKind::Object);
        assert!(record.changed);
        assert_eq!(record.summary, "object changed (+0 -0 ~1)");
        assert_eq!(record.details["changed"], json!(["ask"]));
        assert_eq!(record.details["changes"]["ask"]["delta"].as_f64(), Some(-24.1));
        assert!(!record.details.contains_key("added"));
        assert!(!record.details.contains_key("removed"));
    }

    #[test]
    fn test_numeric_strings_get_a_delta() {
        let record = diff(
            Some(&select(r#"{"data":{"last":"91242.61"}}"#)),
            &select(r#"{"data":{"last":"91500.31"}}"#),
        )
        .unwrap();
        let change = &record.details["changes"]["data.last"];
        assert_eq!(change["old"], json!("91242.61"));
        assert_eq!(change["delta"].as_f64(), Some(257.7));
    }

    #[test]
    fn test_added_removed_and_nested_paths() {
        let record = diff(
            Some(&select(r#"{"a":1,"gone":true,"nested":{"x":"1","y":[1]}}"#)),
            &select(r#"{"a":1,"fresh":null,"nested":{"x":"2","y":[1,2],"z":0}}"#),
        )
        .unwrap();
        assert!(record.changed);
        assert_eq!(record.summary, "object changed (+2 -1 ~2)");
        assert_eq!(record.details["added"], json!(["fresh", "nested.z"]));
        assert_eq!(record.details["removed"], json!(["gone"]));
        assert_eq!(record.details["changed"], json!(["nested.x", "nested.y"]));
        assert_eq!(record.details["changes"]["nested.x"]["delta"].as_f64(), Some(1.0));
        assert!(record.details["changes"]["nested.y"].get("delta").is_none());
    }

    #[test]
    fn test_equal_objects_have_no_details() {
        let record = diff(Some(&select(r#"{"a":{"b":1}}"#)), &select(r#"{"a":{"b":1.0}}"#)).unwrap();
        assert!(!record.changed);
        assert_eq!(record.summary, "object unchanged");
        assert!(record.details.is_empty());
        assert!(record.details_json().is_none());
    }
}
