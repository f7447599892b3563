//! Per-run state: the preloaded index, the processed key set and the
//! run context that owns them.
//!
//! Nothing here lives on the long-lived [`super::Reconciler`]. Every run
//! builds a fresh [`RunContext`], so counters and key sets cannot leak from
//! one run into the next.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, warn};

use super::types::{RunOutcome, RunReport, RunState, SyncStats};
use crate::keys::SyncKey;
use crate::storage::{Filter, StoredRecord};

/// Local records keyed by [`SyncKey`], captured once before any writes.
#[derive(Debug, Clone, Default)]
pub struct PreloadedIndex {
    filter: Filter,
    entries: HashMap<SyncKey, StoredRecord>,
    duplicates: usize,
}

impl PreloadedIndex {
    /// Build from already-queried records. Records whose extractor yields
    /// no key are left out; when two records share a key the first wins.
    pub fn from_records<F>(filter: Filter, records: Vec<StoredRecord>, key_extractor: F) -> Self
    where
        F: Fn(&StoredRecord) -> Option<SyncKey>,
    {
        let mut entries = HashMap::with_capacity(records.len());
        let mut duplicates = 0;
        for record in records {
            let Some(key) = key_extractor(&record) else {
                debug!(handle = %record.handle, "Local record has no sync key, not indexed");
                continue;
            };
            if entries.contains_key(&key) {
                duplicates += 1;
                warn!(key = %key, handle = %record.handle, "Duplicate local record for sync key");
                continue;
            }
            entries.insert(key, record);
        }
        Self {
            filter,
            entries,
            duplicates,
        }
    }

    #[must_use]
    pub fn get(&self, key: &SyncKey) -> Option<&StoredRecord> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &SyncKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &SyncKey> {
        self.entries.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Filter the index was built under.
    #[must_use]
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Local records skipped because another record already held their key.
    #[must_use]
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }
}

/// Keys observed upstream during the current run. Only grows.
#[derive(Debug, Clone, Default)]
pub struct ProcessedKeySet {
    keys: HashSet<SyncKey>,
}

impl ProcessedKeySet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the key was already present.
    pub fn insert(&mut self, key: SyncKey) -> bool {
        self.keys.insert(key)
    }

    #[must_use]
    pub fn contains(&self, key: &SyncKey) -> bool {
        self.keys.contains(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SyncKey> {
        self.keys.iter()
    }
}

impl<K: Into<SyncKey>> FromIterator<K> for ProcessedKeySet {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Everything one run mutates.
pub struct RunContext {
    entity: String,
    pub processed: ProcessedKeySet,
    pub stats: SyncStats,
    pub outcome: RunOutcome,
    cancelled: bool,
    error: Option<String>,
    deleted_keys: Vec<SyncKey>,
    started: Instant,
    state: watch::Sender<RunState>,
}

impl RunContext {
    pub fn new(entity: impl Into<String>) -> Self {
        let (state, _) = watch::channel(RunState::NotStarted);
        Self {
            entity: entity.into(),
            processed: ProcessedKeySet::new(),
            stats: SyncStats::default(),
            outcome: RunOutcome::default(),
            cancelled: false,
            error: None,
            deleted_keys: Vec::new(),
            started: Instant::now(),
            state,
        }
    }

    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Record that `key` was seen upstream this run. Returns false when it
    /// had already been tracked.
    pub fn track_processed(&mut self, key: SyncKey) -> bool {
        self.processed.insert(key)
    }

    /// Watch run state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    pub(crate) fn set_state(&self, state: RunState) {
        debug!(entity = %self.entity, %state, "Run state");
        crate::metrics::set_run_state(&self.entity, state.as_u8());
        self.state.send_replace(state);
    }

    pub(crate) fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub(crate) fn record_deleted(&mut self, key: SyncKey) {
        self.stats.deleted += 1;
        self.deleted_keys.push(key);
    }

    /// Stamp the duration, publish `Completed` and produce the report.
    pub fn finish(mut self) -> RunReport {
        self.stats.duration_secs = self.started.elapsed().as_secs();
        self.set_state(RunState::Completed);
        crate::metrics::record_run(&self.entity, self.outcome.successful(), self.started.elapsed());
        self.deleted_keys.sort();
        RunReport {
            entity: self.entity,
            stats: self.stats,
            successful: self.outcome.successful(),
            cancelled: self.cancelled,
            deleted_keys: self.deleted_keys,
            error: self.error,
        }
    }
}
