//! Entity descriptions.
//!
//! An [`EntitySync`] tells the engine everything entity-specific about a
//! run: where the records live, how to key them, which fields count as a
//! real change and how to turn an upstream record into local fields.

use thiserror::Error;

use crate::keys::SyncKey;
use crate::storage::{Filter, StoredRecord};
use crate::value::Fields;

/// A single upstream record that could not be turned into local fields.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("Required field '{0}' is missing")]
    MissingField(String),
    #[error("Field '{field}' is invalid: {reason}")]
    InvalidField { field: String, reason: String },
}

/// Fields considered for change detection. Anything else (bookkeeping,
/// derived columns) never triggers an update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompareFieldSet(Vec<String>);

impl CompareFieldSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for CompareFieldSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// A transformed upstream record, ready for `process`.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRecord {
    pub key: SyncKey,
    pub fields: Fields,
}

impl PreparedRecord {
    pub fn new(key: SyncKey, fields: Fields) -> Self {
        Self { key, fields }
    }
}

/// One reconcilable entity type.
pub trait EntitySync: Send + Sync {
    /// Raw upstream record shape.
    type Raw: Send;

    /// Label used in logs, metrics and reports (e.g. `"sessions"`).
    fn label(&self) -> &str;

    /// Local collection the records are persisted in.
    fn collection(&self) -> &str;

    /// Scope of this run in the local store. [`Filter::all`] for global
    /// tables.
    fn filter(&self) -> Filter;

    fn compare_fields(&self) -> &CompareFieldSet;

    /// Turn one upstream record into its key and local fields.
    fn transform(&self, raw: &Self::Raw) -> Result<PreparedRecord, TransformError>;

    /// Recover the key of a persisted record. `None` excludes the record
    /// from both the preload index and orphan cleanup.
    fn record_key(&self, record: &StoredRecord) -> Option<SyncKey>;

    /// Whole-batch adjustment applied after the fetch phase and before
    /// processing.
    fn prepare_batch(&self, _records: &mut Vec<PreparedRecord>) {}
}
