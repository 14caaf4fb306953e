//! Dotted path expressions over JSON documents.
//!
//! Supported syntax:
//! - `a.b.c` walks object keys; `\.` escapes a literal dot inside a key.
//! - a numeric segment indexes into arrays (and still matches an object key of that text).
//! - `#` as the last segment on an array yields its length.
//! - `#` followed by more segments maps the rest of the path over every element.
//! - `*` and `?` inside a key segment are wildcards; the first matching key in sorted
//!   order is followed.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    text: String,
    wildcard: bool,
}

/// Resolves `path` against `document`. Returns `None` when nothing matches.
pub fn resolve(document: &Value, path: &str) -> Option<Value> {
    let segments = split_segments(path);
    if segments.is_empty() {
        return Some(document.clone());
    }
    resolve_segments(document, &segments)
}

fn split_segments(path: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut wildcard = false;
    let mut chars = path.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            '.' => {
                segments.push(Segment {
                    text: std::mem::take(&mut current),
                    wildcard,
                });
                wildcard = false;
            }
            '*' | '?' => {
                wildcard = true;
                current.push(ch);
            }
            _ => current.push(ch),
        }
    }
    segments.push(Segment {
        text: current,
        wildcard,
    });
    segments
}

fn resolve_segments(value: &Value, segments: &[Segment]) -> Option<Value> {
    let Some((head, rest)) = segments.split_first() else {
        return Some(value.clone());
    };

    match value {
        Value::Array(items) => {
            if head.text == "#" {
                if rest.is_empty() {
                    return Some(Value::from(items.len()));
                }
                let collected: Vec<Value> = items
                    .iter()
                    .filter_map(|item| resolve_segments(item, rest))
                    .collect();
                return Some(Value::Array(collected));
            }
            let index: usize = head.text.parse().ok()?;
            resolve_segments(items.get(index)?, rest)
        }
        Value::Object(map) => {
            if let Some(child) = map.get(head.text.as_str()) {
                return resolve_segments(child, rest);
            }
            if !head.wildcard {
                return None;
            }
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let key = keys.into_iter().find(|key| wildcard_match(&head.text, key))?;
            resolve_segments(&map[key], rest)
        }
        _ => None,
    }
}

fn wildcard_match(pattern: &str, candidate: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let candidate: Vec<char> = candidate.chars().collect();
    match_from(&pattern, &candidate)
}

fn match_from(pattern: &[char], candidate: &[char]) -> bool {
    match pattern.split_first() {
        None => candidate.is_empty(),
        Some(('*', rest)) => {
            (0..=candidate.len()).any(|skip| match_from(rest, &candidate[skip..]))
        }
        Some(('?', rest)) => !candidate.is_empty() && match_from(rest, &candidate[1..]),
        Some((ch, rest)) => candidate.first() == Some(ch) && match_from(rest, &candidate[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "result": {
                "markets": [
                    {"id": "BTC-AUD", "bid": 91218},
                    {"id": "ETH-AUD", "bid": 4100.5},
                    {"id": "XRP-AUD"}
                ],
                "PAIR0AUD": {"status": "online"},
                "a.b": "dotted"
            }
        })
    }

    #[test]
    fn test_walks_object_keys_and_array_indexes() {
        assert_eq!(resolve(&doc(), "result.markets.1.id"), Some(json!("ETH-AUD")));
        assert_eq!(resolve(&doc(), "result.markets.9.id"), None);
        assert_eq!(resolve(&doc(), "result.missing"), None);
    }

    #[test]
    fn test_hash_counts_and_maps_arrays() {
        assert_eq!(resolve(&doc(), "result.markets.#"), Some(json!(3)));
        assert_eq!(
            resolve(&doc(), "result.markets.#.bid"),
            Some(json!([91218, 4100.5]))
        );
    }

    #[test]
    fn test_escaped_dot_matches_literal_key() {
        assert_eq!(resolve(&doc(), r"result.a\.b"), Some(json!("dotted")));
    }

    #[test]
    fn test_wildcard_key_segment() {
        assert_eq!(
            resolve(&doc(), "result.PAIR*.status"),
            Some(json!("online"))
        );
        assert_eq!(resolve(&doc(), "result.PAIR?AUD.status"), Some(json!("online")));
        assert_eq!(resolve(&doc(), "result.NOPE*"), None);
    }

    #[test]
    fn test_scalar_cannot_be_descended() {
        assert_eq!(resolve(&json!({"a": 1}), "a.b"), None);
    }
}
