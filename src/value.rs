// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Loosely-typed field values as they cross the store and upstream boundaries.
//!
//! Stores and HTTP payloads disagree about concrete types: an integer column
//! may come back as a float, a boolean as `0`/`1`, a JSON column as text.
//! [`FieldValue`] captures what was observed without guessing, and the
//! [`crate::normalize`] module decides whether two observations mean the same
//! thing.
//!
//! # Example
//!
//! ```
//! use reconcile_engine::{FieldValue, Fields};
//! use serde_json::json;
//!
//! let fields = Fields::from_json(&json!({"name": "Spring", "year": 2025, "tags": ["a", "b"]}));
//! assert_eq!(fields.get("year"), Some(&FieldValue::Int(2025)));
//! assert_eq!(fields.get("tags"), Some(&FieldValue::List(vec!["a".into(), "b".into()])));
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single loosely-typed field value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    /// True when the value is the zero value of its own variant.
    ///
    /// `Null` is trivially zero. Used by the normalizer to treat a missing
    /// value as equal to `""`, `0`, `0.0`, `false` or `[]`.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Bool(b) => !*b,
            Self::Int(i) => *i == 0,
            Self::Float(f) => *f == 0.0,
            Self::Text(s) => s.is_empty(),
            Self::List(l) => l.is_empty(),
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view of the value (`Int` and `Float` only).
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view, accepting floats that carry a whole number.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    /// Convert a JSON value observed at a store or transport boundary.
    ///
    /// Arrays made only of strings become [`FieldValue::List`]. Any other
    /// array or object is kept as its JSON text so structured comparison
    /// still applies.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map_or(Self::Null, Self::Float),
            },
            Value::String(s) => Self::Text(s.clone()),
            Value::Array(items) => {
                let strings: Option<Vec<String>> = items
                    .iter()
                    .map(|v| v.as_str().map(str::to_owned))
                    .collect();
                match strings {
                    Some(list) => Self::List(list),
                    None => Self::Text(value.to_string()),
                }
            }
            Value::Object(_) => Self::Text(value.to_string()),
        }
    }

    /// Convert back to JSON for storage.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
            Self::Text(s) => Value::String(s.clone()),
            Self::List(l) => Value::Array(l.iter().cloned().map(Value::String).collect()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => write!(f, "{:?}", s),
            Self::List(l) => write!(f, "{:?}", l),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(v: Vec<String>) -> Self {
        Self::List(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Named field values for one record, ordered by field name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fields(BTreeMap<String, FieldValue>);

impl Fields {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.insert(name.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }

    /// Value of `name`, or `Null` when the field is absent.
    #[must_use]
    pub fn get_or_null(&self, name: &str) -> &FieldValue {
        static NULL: FieldValue = FieldValue::Null;
        self.0.get(name).unwrap_or(&NULL)
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.0.remove(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    /// Overwrite every field present in `other`, keeping fields `other` lacks.
    pub fn merge_from(&mut self, other: &Fields) {
        for (name, value) in other.iter() {
            self.0.insert(name.clone(), value.clone());
        }
    }

    /// Build from a JSON object. Non-object values yield an empty set.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self(
                map.iter()
                    .map(|(k, v)| (k.clone(), FieldValue::from_json(v)))
                    .collect(),
            ),
            _ => Self::default(),
        }
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
