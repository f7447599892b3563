// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cross-representation field equality.
//!
//! [`field_equals`] is the single place where the engine decides whether a
//! stored value and an incoming value differ. A false "different" causes a
//! write on every run; a false "same" leaves stale data behind. Rules, in the
//! order they are tried:
//!
//! | existing / incoming          | equal when                                      |
//! |------------------------------|-------------------------------------------------|
//! | `Null` / anything            | the other side is its type's zero value         |
//! | `Int`/`Float` / `Int`/`Float`| same numeric value, exactly; NaN equals NaN     |
//! | `Bool` / number              | `true == 1`, `false == 0`                       |
//! | `Text` / `Text`              | identical, same instant to the second, or same JSON (numbers by value) |
//! | `List` / `List` (or JSON text)| same multiset of strings                       |
//! | anything else                | exact equality                                  |
//!
//! # Example
//!
//! ```
//! use reconcile_engine::{field_equals, FieldValue};
//!
//! assert!(field_equals(&FieldValue::Float(1.0), &FieldValue::Bool(true)));
//! assert!(field_equals(
//!     &FieldValue::from("2024-01-15T10:00:00Z"),
//!     &FieldValue::from("2024-01-15 10:00:00"),
//! ));
//! ```

use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike};
use serde_json::Value;

use crate::value::{FieldValue, Fields};

/// Compare a stored value against an incoming value for semantic equality.
#[must_use]
pub fn field_equals(existing: &FieldValue, incoming: &FieldValue) -> bool {
    use FieldValue::*;

    match (existing, incoming) {
        (Null, other) | (other, Null) => other.is_zero(),

        (Int(a), Int(b)) => a == b,
        (Float(a), Float(b)) => floats_equal(*a, *b),
        (Int(i), Float(f)) | (Float(f), Int(i)) => int_float_equal(*i, *f),

        (Bool(b), n @ (Int(_) | Float(_))) | (n @ (Int(_) | Float(_)), Bool(b)) => {
            field_equals(&Int(i64::from(*b)), n)
        }

        (Text(a), Text(b)) => a == b || timestamps_equal(a, b) || json_equal(a, b),

        (List(a), List(b)) => same_multiset(a, b),
        (List(list), Text(text)) | (Text(text), List(list)) => {
            string_array(text).is_some_and(|parsed| same_multiset(list, &parsed))
        }

        _ => existing == incoming,
    }
}

/// Field-by-field comparison over an explicit field list.
///
/// Returns the names of fields that differ, in the order given.
#[must_use]
pub fn changed_fields<'a>(
    existing: &Fields,
    incoming: &Fields,
    compare: &'a [String],
) -> Vec<&'a str> {
    compare
        .iter()
        .filter(|name| !field_equals(existing.get_or_null(name), incoming.get_or_null(name)))
        .map(String::as_str)
        .collect()
}

/// NaN equals NaN so a stored NaN does not look changed on every run.
fn floats_equal(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

/// Exact comparison: no `i64 as f64` rounding above 2^53.
fn int_float_equal(i: i64, f: f64) -> bool {
    // i64::MIN is exactly representable, i64::MAX + 1 is the first value out of range
    const LOWER: f64 = -9_223_372_036_854_775_808.0;
    const UPPER: f64 = 9_223_372_036_854_775_808.0;

    f.is_finite() && f.fract() == 0.0 && (LOWER..UPPER).contains(&f) && f as i64 == i
}

fn json_numbers_equal(a: &serde_json::Number, b: &serde_json::Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    match (a.as_i64(), b.as_i64(), a.as_f64(), b.as_f64()) {
        (Some(i), None, _, Some(f)) | (None, Some(i), Some(f), _) => int_float_equal(i, f),
        (_, _, Some(x), Some(y)) => floats_equal(x, y),
        _ => false,
    }
}

/// Deep equality with numbers compared by value, so `1` and `1.0` match.
fn json_values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => json_numbers_equal(x, y),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| json_values_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(key, l)| y.get(key).is_some_and(|r| json_values_equal(l, r)))
        }
        _ => a == b,
    }
}

fn same_multiset(a: &[String], b: &[String]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut left: Vec<&str> = a.iter().map(String::as_str).collect();
    let mut right: Vec<&str> = b.iter().map(String::as_str).collect();
    left.sort_unstable();
    right.sort_unstable();
    left == right
}

fn string_array(text: &str) -> Option<Vec<String>> {
    match serde_json::from_str::<Value>(text).ok()? {
        Value::Array(items) => items
            .into_iter()
            .map(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

fn json_equal(a: &str, b: &str) -> bool {
    match (
        serde_json::from_str::<Value>(a),
        serde_json::from_str::<Value>(b),
    ) {
        (Ok(x), Ok(y)) => json_values_equal(&x, &y),
        _ => false,
    }
}

fn timestamps_equal(a: &str, b: &str) -> bool {
    match (canonical_timestamp(a), canonical_timestamp(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Canonicalize a date/time string to UTC with whole-second precision.
///
/// Accepts `T` or space separators, optional fractional seconds, an optional
/// `Z`, or an explicit `+HH:MM`/`-HH:MM` offset (converted to UTC). A bare
/// `YYYY-MM-DD` is read as midnight. Returns `None` for anything else.
#[must_use]
pub fn canonical_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.len() < 10 || !s.is_char_boundary(10) {
        return None;
    }

    if s.len() == 10 {
        return NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0));
    }

    // Only the date/time separator at byte 10 is rewritten
    let (date, rest) = s.split_at(10);
    let rest = match rest.strip_prefix(' ') {
        Some(r) => r,
        None => rest.strip_prefix(['T', 't'])?,
    };
    let unified = format!("{}T{}", date, rest);

    let parsed = if let Some(naive) = unified.strip_suffix(['Z', 'z']) {
        NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M:%S%.f").ok()
    } else if has_offset(rest) {
        DateTime::parse_from_str(&unified, "%Y-%m-%dT%H:%M:%S%.f%:z")
            .or_else(|_| DateTime::parse_from_str(&unified, "%Y-%m-%dT%H:%M:%S%.f%z"))
            .ok()
            .map(|dt| dt.naive_utc())
    } else {
        NaiveDateTime::parse_from_str(&unified, "%Y-%m-%dT%H:%M:%S%.f").ok()
    }?;

    parsed.with_nanosecond(0)
}

fn has_offset(time_part: &str) -> bool {
    // Time part looks like HH:MM:SS[.fff]+HH:MM; a sign after the seconds is an offset
    time_part
        .get(8..)
        .is_some_and(|tail| tail.contains(['+', '-']))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.to_string())
    }

    fn list(items: &[&str]) -> FieldValue {
        FieldValue::List(items.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_null_equals_zero_values() {
        assert!(field_equals(&FieldValue::Null, &text("")));
        assert!(field_equals(&FieldValue::Int(0), &FieldValue::Null));
        assert!(field_equals(&FieldValue::Null, &FieldValue::Float(0.0)));
        assert!(field_equals(&FieldValue::Null, &FieldValue::Null));
        assert!(field_equals(&FieldValue::Null, &list(&[])));
    }

    #[test]
    fn test_null_not_equal_to_non_zero() {
        assert!(!field_equals(&FieldValue::Null, &text("x")));
        assert!(!field_equals(&FieldValue::Int(5), &FieldValue::Null));
        assert!(!field_equals(&FieldValue::Null, &FieldValue::Bool(true)));
    }

    #[test]
    fn test_numeric_width_drift() {
        assert!(field_equals(&FieldValue::Float(12345.0), &FieldValue::Int(12345)));
        assert!(field_equals(&FieldValue::Int(7), &FieldValue::Float(7.0)));
        assert!(!field_equals(&FieldValue::Float(7.5), &FieldValue::Int(7)));
        assert!(!field_equals(&FieldValue::Int(1), &FieldValue::Int(2)));
    }

    #[test]
    fn test_int_float_beyond_f64_precision() {
        // 2^53 + 1 has no exact f64 form
        assert!(!field_equals(
            &FieldValue::Int(9_007_199_254_740_993),
            &FieldValue::Float(9_007_199_254_740_992.0)
        ));
        assert!(field_equals(
            &FieldValue::Int(9_007_199_254_740_992),
            &FieldValue::Float(9_007_199_254_740_992.0)
        ));
        assert!(!field_equals(&FieldValue::Int(i64::MAX), &FieldValue::Float(9.3e18)));
        assert!(!field_equals(&FieldValue::Int(0), &FieldValue::Float(f64::INFINITY)));
    }

    #[test]
    fn test_nan_equals_nan() {
        assert!(field_equals(&FieldValue::Float(f64::NAN), &FieldValue::Float(f64::NAN)));
        assert!(!field_equals(&FieldValue::Float(f64::NAN), &FieldValue::Int(0)));
        assert!(!field_equals(&FieldValue::Float(f64::NAN), &FieldValue::Bool(false)));
    }

    #[test]
    fn test_bool_as_integer() {
        assert!(field_equals(&FieldValue::Float(1.0), &FieldValue::Bool(true)));
        assert!(field_equals(&FieldValue::Float(0.0), &FieldValue::Bool(false)));
        assert!(field_equals(&FieldValue::Bool(true), &FieldValue::Int(1)));
        assert!(!field_equals(&FieldValue::Float(1.0), &FieldValue::Bool(false)));
        assert!(!field_equals(&FieldValue::Int(2), &FieldValue::Bool(true)));
    }

    #[test]
    fn test_timestamp_separator_and_zulu() {
        assert!(field_equals(&text("2024-01-15T10:00:00Z"), &text("2024-01-15 10:00:00")));
        assert!(!field_equals(&text("2024-01-15T10:00:00Z"), &text("2024-01-16 10:00:00")));
    }

    #[test]
    fn test_timestamp_drops_subseconds() {
        assert!(field_equals(
            &text("2024-01-15 10:00:00.123Z"),
            &text("2024-01-15T10:00:00")
        ));
        assert!(!field_equals(
            &text("2024-01-15 10:00:01.000Z"),
            &text("2024-01-15T10:00:00")
        ));
    }

    #[test]
    fn test_timestamp_offsets_are_instants() {
        // Same instant expressed with an offset
        assert!(field_equals(
            &text("2024-01-15T12:00:00+02:00"),
            &text("2024-01-15T10:00:00Z")
        ));
        // Same wall clock, different instants
        assert!(!field_equals(
            &text("2024-01-15T10:00:00+02:00"),
            &text("2024-01-15T10:00:00Z")
        ));
    }

    #[test]
    fn test_date_only_is_midnight() {
        assert!(field_equals(&text("2024-03-01"), &text("2024-03-01 00:00:00.000Z")));
        assert!(!field_equals(&text("2024-03-01"), &text("2024-03-01 09:00:00")));
    }

    #[test]
    fn test_canonical_timestamp_rejects_garbage() {
        assert!(canonical_timestamp("not a date").is_none());
        assert!(canonical_timestamp("2024-01-15X10:00:00").is_none());
        assert!(canonical_timestamp("").is_none());
    }

    #[test]
    fn test_json_text_key_order() {
        assert!(field_equals(&text(r#"{"a":1,"b":[1,2]}"#), &text(r#"{ "b": [1, 2], "a": 1 }"#)));
        assert!(!field_equals(&text(r#"{"a":1}"#), &text(r#"{"a":2}"#)));
    }

    #[test]
    fn test_json_text_numeric_width() {
        assert!(field_equals(&text(r#"{"a":1,"b":2}"#), &text(r#"{"b":2.0,"a":1.0}"#)));
        assert!(field_equals(&text("1"), &text("1.0")));
        assert!(field_equals(&text("[1,[2.0]]"), &text("[1.0,[2]]")));
        assert!(!field_equals(&text(r#"{"a":1}"#), &text(r#"{"a":1.5}"#)));
        // arrays stay ordered, objects must have the same key set
        assert!(!field_equals(&text("[1,2]"), &text("[2,1]")));
        assert!(!field_equals(&text(r#"{"a":1}"#), &text(r#"{"a":1,"b":null}"#)));
    }

    #[test]
    fn test_json_text_large_integers_exact() {
        assert!(!field_equals(&text("9007199254740993"), &text("9007199254740992.0")));
        assert!(field_equals(&text("18446744073709551615"), &text("18446744073709551615")));
    }

    #[test]
    fn test_plain_strings() {
        assert!(field_equals(&text("Spring League"), &text("Spring League")));
        assert!(!field_equals(&text("Spring League"), &text("Fall League")));
    }

    #[test]
    fn test_unordered_lists() {
        assert!(field_equals(&list(&["c", "a", "b"]), &list(&["a", "b", "c"])));
        assert!(!field_equals(&list(&["a", "b"]), &list(&["a", "b", "c"])));
        assert!(!field_equals(&list(&["a", "a", "b"]), &list(&["a", "b", "b"])));
    }

    #[test]
    fn test_list_against_json_array_text() {
        assert!(field_equals(&text(r#"["b","a"]"#), &list(&["a", "b"])));
        assert!(!field_equals(&text(r#"["b",1]"#), &list(&["b", "1"])));
    }

    #[test]
    fn test_mismatched_variants_fall_back_to_exact() {
        assert!(!field_equals(&text("1"), &FieldValue::Int(1)));
        assert!(!field_equals(&FieldValue::Bool(true), &text("true")));
    }

    #[test]
    fn test_changed_fields_only_considers_compare_set() {
        let existing = Fields::new().with("name", "A").with("notes", "local").with("year", 2025.0);
        let incoming = Fields::new().with("name", "B").with("year", 2025);
        let compare = vec!["name".to_string(), "year".to_string()];
        assert_eq!(changed_fields(&existing, &incoming, &compare), vec!["name"]);
    }
}
