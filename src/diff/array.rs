use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use super::{json_equal, stable_json, text_diff, DiffKind, DiffRecord};
use crate::selector::Selection;

/// Fields tried, in order, to pair up objects of two arrays.
const KEY_CANDIDATES: [&str; 5] = ["id", "key", "name", "slug", "uuid"];

pub(super) fn array_diff(previous: &Selection, current: &Selection) -> DiffRecord {
    let (Ok(old), Ok(new)) = (
        serde_json::from_str::<Vec<Value>>(&previous.value),
        serde_json::from_str::<Vec<Value>>(&current.value),
    ) else {
        return text_diff(previous, current);
    };

    if let Some(record) = primitive_array_diff(&old, &new) {
        return record;
    }
    if let Some(record) = keyed_object_array_diff(&old, &new) {
        return record;
    }

    let changed = !json_equal(&Value::Array(old.clone()), &Value::Array(new.clone()));
    let summary = if changed {
        format!("array changed ({} to {} items)", old.len(), new.len())
    } else {
        "array unchanged".to_string()
    };
    let mut details = Map::new();
    details.insert("oldCount".into(), json!(old.len()));
    details.insert("newCount".into(), json!(new.len()));
    DiffRecord::new(DiffKind::Array, changed, summary, details)
}

fn is_primitive(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

/// Multiset comparison of arrays holding only scalars.
fn primitive_array_diff(old: &[Value], new: &[Value]) -> Option<DiffRecord> {
    if !old.iter().all(is_primitive) || !new.iter().all(is_primitive) {
        return None;
    }

    let (old_counts, old_order) = count_values(old);
    let (new_counts, new_order) = count_values(new);
    let added = count_surplus(&new_counts, &old_counts);
    let removed = count_surplus(&old_counts, &new_counts);
    let reordered_only = added.is_empty() && removed.is_empty() && old_order != new_order;
    let changed = reordered_only || !added.is_empty() || !removed.is_empty();

    let (kind, summary) = if reordered_only {
        (
            DiffKind::ArrayReorder,
            format!("array reordered ({} items)", new.len()),
        )
    } else if changed {
        (
            DiffKind::Array,
            format!(
                "array changed (+{} -{})",
                added.values().sum::<usize>(),
                removed.values().sum::<usize>()
            ),
        )
    } else {
        (DiffKind::Array, "array unchanged".to_string())
    };

    let mut details = Map::new();
    details.insert("oldCount".into(), json!(old.len()));
    details.insert("newCount".into(), json!(new.len()));
    details.insert("added".into(), json!(added));
    details.insert("removed".into(), json!(removed));
    details.insert("reorderedOnly".into(), json!(reordered_only));
    Some(DiffRecord::new(kind, changed, summary, details))
}

fn count_values(values: &[Value]) -> (BTreeMap<String, usize>, Vec<String>) {
    let mut counts = BTreeMap::new();
    let mut order = Vec::with_capacity(values.len());
    for value in values {
        let key = stable_json(value);
        *counts.entry(key.clone()).or_insert(0) += 1;
        order.push(key);
    }
    (counts, order)
}

/// Occurrences in `left` beyond those in `right`.
fn count_surplus(
    left: &BTreeMap<String, usize>,
    right: &BTreeMap<String, usize>,
) -> BTreeMap<String, usize> {
    left.iter()
        .filter_map(|(key, count)| {
            let surplus = count.saturating_sub(right.get(key).copied().unwrap_or(0));
            (surplus > 0).then(|| (key.clone(), surplus))
        })
        .collect()
}

/// Pairs objects across both arrays by a detected identity field.
fn keyed_object_array_diff(old: &[Value], new: &[Value]) -> Option<DiffRecord> {
    let old_objects = as_objects(old)?;
    let new_objects = as_objects(new)?;

    let key_field = KEY_CANDIDATES
        .iter()
        .copied()
        .find(|candidate| {
            has_unique_key(candidate, &old_objects) && has_unique_key(candidate, &new_objects)
        })?;

    let old_by_key = index_by_key(&old_objects, key_field)?;
    let new_by_key = index_by_key(&new_objects, key_field)?;

    let added: Vec<&String> = new_by_key
        .keys()
        .filter(|key| !old_by_key.contains_key(*key))
        .collect();
    let mut removed = Vec::new();
    let mut updated = Vec::new();
    for (key, old_item) in &old_by_key {
        match new_by_key.get(key) {
            None => removed.push(key),
            Some(new_item) => {
                if !json_equal(old_item, new_item) {
                    updated.push(key);
                }
            }
        }
    }

    let changed = !added.is_empty() || !removed.is_empty() || !updated.is_empty();
    let summary = if changed {
        format!(
            "array objects changed (+{} -{} ~{})",
            added.len(),
            removed.len(),
            updated.len()
        )
    } else {
        "array unchanged".to_string()
    };

    let mut details = Map::new();
    details.insert("keyField".into(), json!(key_field));
    details.insert("added".into(), json!(added));
    details.insert("removed".into(), json!(removed));
    details.insert("updated".into(), json!(updated));
    Some(DiffRecord::new(DiffKind::ArrayObject, changed, summary, details))
}

fn as_objects(values: &[Value]) -> Option<Vec<&Map<String, Value>>> {
    values.iter().map(Value::as_object).collect()
}

fn has_unique_key(key: &str, items: &[&Map<String, Value>]) -> bool {
    let mut seen = BTreeSet::new();
    for item in items {
        match item.get(key) {
            None | Some(Value::Null) | Some(Value::Object(_)) | Some(Value::Array(_)) => {
                return false
            }
            Some(value) => {
                if !seen.insert(stable_json(value)) {
                    return false;
                }
            }
        }
    }
    true
}

// Keys iterate in sorted order, so added/removed/updated come out sorted.
fn index_by_key(items: &[&Map<String, Value>], key: &str) -> Option<BTreeMap<String, Value>> {
    let mut indexed = BTreeMap::new();
    for item in items {
        let encoded = stable_json(item.get(key)?);
        if indexed.contains_key(&encoded) {
            return None;
        }
        indexed.insert(encoded, Value::Object((*item).clone()));
    }
    Some(indexed)
}
