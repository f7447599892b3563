//! Preload and per-record diff/upsert.

use tracing::{debug, error, info};

use super::context::{PreloadedIndex, RunContext};
use super::entity::CompareFieldSet;
use super::types::ProcessOutcome;
use super::Reconciler;
use crate::keys::SyncKey;
use crate::normalize::changed_fields;
use crate::storage::{Filter, StorageError, StoredRecord};
use crate::value::Fields;

impl Reconciler {
    /// Index every local record in `collection` matching `filter` by its key.
    ///
    /// Records for which `key_extractor` returns `None` are left out and so
    /// can never be treated as orphans. Store failures are returned as-is;
    /// there is no internal retry.
    pub async fn preload<F>(
        &self,
        collection: &str,
        filter: &Filter,
        key_extractor: F,
    ) -> Result<PreloadedIndex, StorageError>
    where
        F: Fn(&StoredRecord) -> Option<SyncKey>,
    {
        let records = self.store.query_by_filter(collection, filter).await?;
        let total = records.len();
        let index = PreloadedIndex::from_records(filter.clone(), records, key_extractor);
        info!(
            collection,
            filter = %filter,
            records = total,
            indexed = index.len(),
            "Preloaded local records"
        );
        crate::metrics::set_preloaded_records(collection, index.len());
        Ok(index)
    }

    /// Create, update or skip one record.
    ///
    /// - key absent from `index`: insert `new_fields` (Created)
    /// - any field in `compare_fields` differs: write every field of
    ///   `new_fields` (Updated)
    /// - otherwise no write (Skipped)
    ///
    /// A store failure increments the error counter and is returned; the
    /// caller moves on to the next record.
    pub async fn process(
        &self,
        ctx: &mut RunContext,
        collection: &str,
        key: &SyncKey,
        new_fields: &Fields,
        index: &PreloadedIndex,
        compare_fields: &CompareFieldSet,
    ) -> Result<ProcessOutcome, StorageError> {
        let result = match index.get(key) {
            None => self
                .store
                .insert(collection, new_fields)
                .await
                .map(|handle| {
                    debug!(key = %key, handle = %handle, "Created");
                    ProcessOutcome::Created
                }),
            Some(existing) => {
                let changed = changed_fields(&existing.fields, new_fields, compare_fields.names());
                if changed.is_empty() {
                    Ok(ProcessOutcome::Skipped)
                } else {
                    debug!(key = %key, handle = %existing.handle, ?changed, "Updating");
                    self.store
                        .update_fields(&existing.handle, new_fields)
                        .await
                        .map(|()| ProcessOutcome::Updated)
                }
            }
        };

        match result {
            Ok(outcome) => {
                ctx.stats.count(outcome);
                crate::metrics::record_outcome(ctx.entity(), outcome.as_str());
                Ok(outcome)
            }
            Err(e) => {
                ctx.stats.errors += 1;
                crate::metrics::record_outcome(ctx.entity(), "error");
                error!(entity = %ctx.entity(), key = %key, error = %e, "Failed to persist record");
                Err(e)
            }
        }
    }
}
