//! Orphan detection and cleanup.
//!
//! An orphan is a local record whose upstream counterpart was not observed
//! during a run that demonstrably fetched everything. Both entry points
//! refuse to produce or delete anything unless the run was successful: a
//! failed fetch must never read as "upstream now has zero records".

use tracing::{debug, info, warn};

use super::context::{PreloadedIndex, ProcessedKeySet, RunContext};
use super::Reconciler;
use crate::keys::SyncKey;
use crate::storage::{Filter, StorageError, StoredRecord};

/// Keys present in `index` but absent from `processed`, sorted.
///
/// Always empty when `successful` is false.
#[must_use]
pub fn find_orphans(index: &PreloadedIndex, processed: &ProcessedKeySet, successful: bool) -> Vec<SyncKey> {
    if !successful {
        return Vec::new();
    }
    let mut orphans: Vec<SyncKey> = index
        .keys()
        .filter(|key| !processed.contains(key))
        .cloned()
        .collect();
    orphans.sort();
    orphans
}

impl Reconciler {
    /// Delete local records in `collection` whose key was not processed in
    /// this run.
    ///
    /// Re-queries the store under `filter` and recomputes every key, so
    /// records written by someone else since the preload are judged on
    /// their current state. A failed delete is logged and skipped; the
    /// remaining orphans are still attempted. Only the initial query can
    /// fail the call. Returns the keys that were deleted.
    pub async fn delete_orphans<F>(
        &self,
        ctx: &mut RunContext,
        collection: &str,
        record_key_extractor: F,
        entity_label: &str,
        filter: &Filter,
    ) -> Result<Vec<SyncKey>, StorageError>
    where
        F: Fn(&StoredRecord) -> Option<SyncKey>,
    {
        if !ctx.outcome.successful() {
            warn!(entity = entity_label, "Fetch did not complete, skipping orphan cleanup");
            crate::metrics::record_orphan_cleanup_skipped(entity_label, "fetch_incomplete");
            return Ok(Vec::new());
        }

        let records = self.store.query_by_filter(collection, filter).await?;
        let mut deleted = Vec::new();

        for record in records {
            let Some(key) = record_key_extractor(&record) else {
                continue;
            };
            if ctx.processed.contains(&key) {
                continue;
            }
            match self.store.delete(&record.handle).await {
                Ok(()) => {
                    debug!(entity = entity_label, key = %key, handle = %record.handle, "Deleted orphan");
                    ctx.record_deleted(key.clone());
                    deleted.push(key);
                }
                Err(e) => {
                    crate::metrics::record_orphan_delete_failure(entity_label);
                    warn!(
                        entity = entity_label,
                        key = %key,
                        handle = %record.handle,
                        error = %e,
                        "Failed to delete orphan"
                    );
                }
            }
        }

        if !deleted.is_empty() {
            info!(entity = entity_label, count = deleted.len(), "Deleted orphaned records");
            crate::metrics::record_orphans_deleted(entity_label, deleted.len());
        }
        Ok(deleted)
    }
}
