use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::normalize::field_equals;
use crate::value::{FieldValue, Fields};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Stored record '{id}' in '{collection}' could not be decoded: {reason}")]
    Decode {
        collection: String,
        id: String,
        reason: String,
    },
}

/// Opaque reference to a persisted record.
///
/// Only the store that issued a handle knows what `id` means.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordHandle {
    pub collection: String,
    pub id: String,
}

impl RecordHandle {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for RecordHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A record as the local store returned it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub handle: RecordHandle,
    pub fields: Fields,
}

/// Conjunction of field-equality conditions.
///
/// Matching goes through [`field_equals`], so `year = 2025` matches a stored
/// `2025.0`. An empty filter matches every record in the collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    conditions: Vec<(String, FieldValue)>,
}

impl Filter {
    /// Match everything (global tables).
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Single `field = value` condition.
    pub fn eq(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::all().and_eq(field, value)
    }

    /// Shorthand for the common `year = N` scope.
    #[must_use]
    pub fn year(year: i32) -> Self {
        Self::eq("year", year)
    }

    #[must_use]
    pub fn and_eq(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    #[must_use]
    pub fn is_all(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> &[(String, FieldValue)] {
        &self.conditions
    }

    #[must_use]
    pub fn matches(&self, fields: &Fields) -> bool {
        self.conditions
            .iter()
            .all(|(name, expected)| field_equals(fields.get_or_null(name), expected))
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.conditions.is_empty() {
            return write!(f, "*");
        }
        for (i, (name, value)) in self.conditions.iter().enumerate() {
            if i > 0 {
                write!(f, " && ")?;
            }
            write!(f, "{} = {}", name, value)?;
        }
        Ok(())
    }
}

/// The local persisted store the engine converges onto.
///
/// Every call is a single synchronous unit from the engine's point of view;
/// no locking is layered on top, so backends provide whatever transactional
/// guarantees they have.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All records in `collection` matching `filter`.
    async fn query_by_filter(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<StoredRecord>, StorageError>;

    /// Create a record with exactly `fields`.
    async fn insert(&self, collection: &str, fields: &Fields) -> Result<RecordHandle, StorageError>;

    /// Overwrite every field in `fields`; fields not mentioned are preserved.
    async fn update_fields(&self, handle: &RecordHandle, fields: &Fields) -> Result<(), StorageError>;

    async fn delete(&self, handle: &RecordHandle) -> Result<(), StorageError>;
}
