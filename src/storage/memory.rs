//! In-memory [`RecordStore`] backed by a `DashMap`.
//!
//! Used for tests and dry runs. Keeps per-operation write counters and an
//! optional fault plan so callers can exercise the engine's error paths.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::traits::{Filter, RecordHandle, RecordStore, StorageError, StoredRecord};
use crate::value::Fields;

/// Store operation, used to target injected faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Query,
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Default)]
struct FaultPlan {
    /// Fail every call of these operations
    always: HashSet<StoreOp>,
    /// Fail update/delete calls against these record ids
    ids: HashSet<String>,
    /// Fail inserts whose fields contain this (field, text) pair
    insert_matching: Vec<(String, String)>,
}

/// Snapshot of how many writes reached the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteCounts {
    pub inserts: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl WriteCounts {
    #[must_use]
    pub fn total(&self) -> usize {
        self.inserts + self.updates + self.deletes
    }
}

pub struct InMemoryStore {
    data: DashMap<RecordHandle, Fields>,
    next_id: AtomicU64,
    inserts: AtomicUsize,
    updates: AtomicUsize,
    deletes: AtomicUsize,
    faults: Mutex<FaultPlan>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            next_id: AtomicU64::new(1),
            inserts: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            faults: Mutex::new(FaultPlan::default()),
        }
    }

    /// Seed a record directly, bypassing write counters and faults.
    pub fn seed(&self, collection: &str, fields: Fields) -> RecordHandle {
        let handle = self.allocate(collection);
        self.data.insert(handle.clone(), fields);
        handle
    }

    /// Current fields of a record.
    #[must_use]
    pub fn fields(&self, handle: &RecordHandle) -> Option<Fields> {
        self.data.get(handle).map(|r| r.value().clone())
    }

    /// All records of a collection, ordered by id.
    #[must_use]
    pub fn records(&self, collection: &str) -> Vec<StoredRecord> {
        let mut out: Vec<StoredRecord> = self
            .data
            .iter()
            .filter(|entry| entry.key().collection == collection)
            .map(|entry| StoredRecord {
                handle: entry.key().clone(),
                fields: entry.value().clone(),
            })
            .collect();
        out.sort_by(|a, b| a.handle.id.cmp(&b.handle.id));
        out
    }

    /// Get current record count across all collections
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn write_counts(&self) -> WriteCounts {
        WriteCounts {
            inserts: self.inserts.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }

    pub fn reset_write_counts(&self) {
        self.inserts.store(0, Ordering::Relaxed);
        self.updates.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
    }

    /// Make every call of `op` fail with a backend error.
    pub fn fail_always(&self, op: StoreOp) {
        self.faults.lock().always.insert(op);
    }

    /// Make updates and deletes of the record with this id fail.
    pub fn fail_record(&self, id: impl Into<String>) {
        self.faults.lock().ids.insert(id.into());
    }

    /// Make inserts fail when `field` holds the text `value`.
    pub fn fail_insert_where(&self, field: impl Into<String>, value: impl Into<String>) {
        self.faults
            .lock()
            .insert_matching
            .push((field.into(), value.into()));
    }

    pub fn clear_faults(&self) {
        *self.faults.lock() = FaultPlan::default();
    }

    /// Clear all records
    pub fn clear(&self) {
        self.data.clear();
    }

    fn allocate(&self, collection: &str) -> RecordHandle {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        RecordHandle::new(collection, format!("rec{:08}", n))
    }

    fn check(&self, op: StoreOp, id: Option<&str>) -> Result<(), StorageError> {
        let faults = self.faults.lock();
        if faults.always.contains(&op) {
            return Err(StorageError::Backend(format!("injected {:?} failure", op)));
        }
        if let Some(id) = id {
            if faults.ids.contains(id) {
                return Err(StorageError::Backend(format!("injected {:?} failure for {}", op, id)));
            }
        }
        Ok(())
    }

    fn check_insert(&self, fields: &Fields) -> Result<(), StorageError> {
        self.check(StoreOp::Insert, None)?;
        let faults = self.faults.lock();
        let hit = faults
            .insert_matching
            .iter()
            .any(|(name, value)| fields.get(name).and_then(|v| v.as_str()) == Some(value.as_str()));
        if hit {
            return Err(StorageError::Backend("injected Insert failure".to_string()));
        }
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn query_by_filter(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<StoredRecord>, StorageError> {
        self.check(StoreOp::Query, None)?;
        Ok(self
            .records(collection)
            .into_iter()
            .filter(|r| filter.matches(&r.fields))
            .collect())
    }

    async fn insert(&self, collection: &str, fields: &Fields) -> Result<RecordHandle, StorageError> {
        self.check_insert(fields)?;
        let handle = self.allocate(collection);
        self.data.insert(handle.clone(), fields.clone());
        self.inserts.fetch_add(1, Ordering::Relaxed);
        Ok(handle)
    }

    async fn update_fields(&self, handle: &RecordHandle, fields: &Fields) -> Result<(), StorageError> {
        self.check(StoreOp::Update, Some(&handle.id))?;
        match self.data.get_mut(handle) {
            Some(mut entry) => {
                entry.value_mut().merge_from(fields);
                self.updates.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            None => Err(StorageError::NotFound(handle.to_string())),
        }
    }

    async fn delete(&self, handle: &RecordHandle) -> Result<(), StorageError> {
        self.check(StoreOp::Delete, Some(&handle.id))?;
        match self.data.remove(handle) {
            Some(_) => {
                self.deletes.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            None => Err(StorageError::NotFound(handle.to_string())),
        }
    }
}
