//! Decimal-precision heuristic used to round numeric deltas.
//!
//! Deltas are rounded to the larger number of decimal places written in either operand so
//! that `91650.3 -> 91652.9` reports `2.6` rather than `2.599999999991269`.

use serde_json::Value;

/// Number of decimal places in a textual number, accounting for an exponent.
/// Returns -1 when the text is empty or not a number.
pub fn decimal_places(raw: &str) -> i32 {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.parse::<f64>().is_err() {
        return -1;
    }

    let (mantissa, exponent) = match trimmed.split_once('e').or_else(|| trimmed.split_once('E')) {
        Some((mantissa, exponent)) => match exponent.parse::<i32>() {
            Ok(exponent) => (mantissa, exponent),
            Err(_) => return -1,
        },
        None => (trimmed, 0),
    };

    let places = match mantissa.find('.') {
        Some(index) => (mantissa.len() - index - 1) as i32,
        None => 0,
    };

    (places - exponent).max(0)
}

/// Decimal places of a JSON value: strings by their own text, integers are 0, floats by
/// their shortest plain rendering, everything else -1.
pub fn decimal_places_of(value: &Value) -> i32 {
    match value {
        Value::String(text) => decimal_places(text),
        Value::Number(number) => {
            if number.is_f64() {
                number
                    .as_f64()
                    .map(|float| decimal_places(&format_plain(float)))
                    .unwrap_or(-1)
            } else {
                0
            }
        }
        _ => -1,
    }
}

/// Larger of two decimal-place counts, ignoring negative (unknown) counts.
pub fn max_decimal_places(left: i32, right: i32) -> i32 {
    if left < 0 {
        return right;
    }
    if right < 0 {
        return left;
    }
    left.max(right)
}

/// Rounds half away from zero to `places` decimals. Negative `places` leaves the value
/// untouched. A rounded zero is always `+0`.
pub fn round_to_places(value: f64, places: i32) -> f64 {
    if places < 0 {
        return value;
    }
    let factor = 10f64.powi(places);
    let rounded = (value * factor).round() / factor;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Numeric reading of a JSON value: numbers, or strings holding a number.
pub fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok()
        }
        _ => None,
    }
}

/// Shortest plain (non-exponent) decimal rendering.
pub fn format_plain(value: f64) -> String {
    format!("{value}")
}

/// Plain rendering with a leading `+` for positive values.
pub fn format_signed(value: f64) -> String {
    if value > 0.0 {
        format!("+{}", format_plain(value))
    } else {
        format_plain(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decimal_places_from_text() {
        assert_eq!(decimal_places("91650.30"), 2);
        assert_eq!(decimal_places(" 10 "), 0);
        assert_eq!(decimal_places("1.25e1"), 1);
        assert_eq!(decimal_places("1.5E-3"), 4);
        assert_eq!(decimal_places("12e5"), 0);
        assert_eq!(decimal_places(""), -1);
        assert_eq!(decimal_places("abc"), -1);
    }

    #[test]
    fn test_decimal_places_of_json_values() {
        assert_eq!(decimal_places_of(&json!("91242.61")), 2);
        assert_eq!(decimal_places_of(&json!(100)), 0);
        assert_eq!(decimal_places_of(&json!(91384.2)), 1);
        assert_eq!(decimal_places_of(&json!(true)), -1);
    }

    #[test]
    fn test_max_ignores_unknown() {
        assert_eq!(max_decimal_places(-1, 3), 3);
        assert_eq!(max_decimal_places(2, -1), 2);
        assert_eq!(max_decimal_places(-1, -1), -1);
        assert_eq!(max_decimal_places(1, 4), 4);
    }

    #[test]
    fn test_rounding_normalizes_negative_zero() {
        let rounded = round_to_places(-0.0001, 2);
        assert_eq!(rounded, 0.0);
        assert!(rounded.is_sign_positive());
        assert_eq!(round_to_places(91652.9 - 91650.3, 1), 2.6);
        assert_eq!(round_to_places(0.123456, -1), 0.123456);
    }

    #[test]
    fn test_numeric_value_accepts_numeric_strings() {
        assert_eq!(numeric_value(&json!(" 12.5 ")), Some(12.5));
        assert_eq!(numeric_value(&json!(3)), Some(3.0));
        assert_eq!(numeric_value(&json!("")), None);
        assert_eq!(numeric_value(&json!("n/a")), None);
        assert_eq!(numeric_value(&json!(null)), None);
    }

    #[test]
    fn test_format_signed() {
        assert_eq!(format_signed(2.5), "+2.5");
        assert_eq!(format_signed(-24.1), "-24.1");
        assert_eq!(format_signed(0.0), "0");
        assert_eq!(format_signed(3.0), "+3");
    }
}
