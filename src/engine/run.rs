// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The run driver: one complete reconciliation of one entity.

use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::context::{PreloadedIndex, RunContext};
use super::entity::{EntitySync, PreparedRecord};
use super::orphans::find_orphans;
use super::types::{RunReport, RunState};
use super::Reconciler;
use crate::metrics::PhaseTimer;
use crate::resilience::retry::retry_fetch;
use crate::upstream::{FetchError, UpstreamSource};

/// Resolves once `cancel` flips to true. Never resolves if the sender is
/// dropped without cancelling.
async fn cancelled(mut cancel: watch::Receiver<bool>) {
    let closed = cancel.wait_for(|c| *c).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

impl Reconciler {
    /// Reconcile `entity` against `source` with a fresh [`RunContext`].
    ///
    /// Never fails outright: fetch, storage and cancellation outcomes are
    /// all reported through the returned [`RunReport`]. Use
    /// [`RunReport::ensure_ok`] to turn a failed run into an error.
    pub async fn run<E, S>(&self, entity: &E, source: &S, cancel: &watch::Receiver<bool>) -> RunReport
    where
        E: EntitySync,
        S: UpstreamSource<Record = E::Raw>,
    {
        self.run_with_context(RunContext::new(entity.label()), entity, source, cancel)
            .await
    }

    /// Like [`Reconciler::run`] but with a caller-built context, so the
    /// caller can [`RunContext::subscribe`] to state transitions first.
    #[tracing::instrument(skip_all, fields(entity = %entity.label()))]
    pub async fn run_with_context<E, S>(
        &self,
        mut ctx: RunContext,
        entity: &E,
        source: &S,
        cancel: &watch::Receiver<bool>,
    ) -> RunReport
    where
        E: EntitySync,
        S: UpstreamSource<Record = E::Raw>,
    {
        let label = entity.label();
        let collection = entity.collection();
        let filter = entity.filter();
        info!(collection, filter = %filter, "Starting reconciliation");

        // ========== PHASE 1: Preload + fetch ==========
        ctx.set_state(RunState::Fetching);

        let index = {
            let _timer = PhaseTimer::new(label, "preload");
            match self.preload(collection, &filter, |r| entity.record_key(r)).await {
                Ok(index) => index,
                Err(e) => {
                    error!(error = %e, "Preload failed, aborting run");
                    ctx.fail(format!("preload failed: {}", e));
                    return ctx.finish();
                }
            }
        };

        let fetched = {
            let _timer = PhaseTimer::new(label, "fetch");
            self.fetch_all(&mut ctx, entity, source, cancel).await
        };
        let mut prepared = match fetched {
            Ok(records) => records,
            Err(FetchError::Cancelled) => {
                info!(stats = %ctx.stats, "Run cancelled during fetch");
                ctx.mark_cancelled();
                return ctx.finish();
            }
            Err(e) => {
                error!(error = %e, "Fetch failed, orphan cleanup will be skipped");
                crate::metrics::record_fetch_failure(label);
                crate::metrics::record_orphan_cleanup_skipped(label, "fetch_failed");
                ctx.fail(format!("fetch failed: {}", e));
                return ctx.finish();
            }
        };
        ctx.outcome.mark_successful();

        // ========== PHASE 2: Diff + upsert ==========
        ctx.set_state(RunState::Processing);
        entity.prepare_batch(&mut prepared);

        if !self.process_all(&mut ctx, entity, prepared, &index, cancel).await {
            info!(stats = %ctx.stats, "Run cancelled during processing");
            ctx.mark_cancelled();
            return ctx.finish();
        }

        // ========== PHASE 3: Orphan cleanup ==========
        if self.config.delete_orphans {
            ctx.set_state(RunState::OrphanCleanup);
            let _timer = PhaseTimer::new(label, "orphan_cleanup");

            let candidates = find_orphans(&index, &ctx.processed, ctx.outcome.successful());
            debug!(candidates = candidates.len(), "Orphans in preload snapshot");

            let result = self
                .delete_orphans(&mut ctx, collection, |r| entity.record_key(r), label, &filter)
                .await;
            if let Err(e) = result {
                error!(error = %e, "Orphan cleanup failed");
                ctx.fail(format!("orphan cleanup failed: {}", e));
            }
        } else {
            debug!("Orphan deletion disabled");
        }

        let report = ctx.finish();
        info!(stats = %report.stats, "Reconciliation complete");
        report
    }

    /// Page through `source` until `has_more` is false, transforming as
    /// records arrive. Transform failures are counted and skipped.
    async fn fetch_all<E, S>(
        &self,
        ctx: &mut RunContext,
        entity: &E,
        source: &S,
        cancel: &watch::Receiver<bool>,
    ) -> Result<Vec<PreparedRecord>, FetchError>
    where
        E: EntitySync,
        S: UpstreamSource<Record = E::Raw>,
    {
        let label = entity.label();
        let page_size = self.config.page_size;
        let retry_config = self.config.fetch_retry();
        let mut prepared = Vec::new();
        let mut page: u32 = 1;

        loop {
            if *cancel.borrow() {
                return Err(FetchError::Cancelled);
            }

            let started = Instant::now();
            let operation = format!("{}_page_{}", label, page);
            let fetch = retry_fetch(&operation, &retry_config, &self.config, || {
                source.fetch_page(page, page_size)
            });
            let result = tokio::select! {
                biased;
                () = cancelled(cancel.clone()) => Err(FetchError::Cancelled),
                result = fetch => result,
            };
            let batch = match result {
                Ok(batch) => batch,
                Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
                Err(e) => {
                    warn!(page, error = %e, "Giving up on page");
                    return Err(e);
                }
            };

            crate::metrics::record_page_fetched(label, batch.records.len(), started.elapsed());
            debug!(page, records = batch.records.len(), has_more = batch.has_more, "Fetched page");

            for raw in &batch.records {
                match entity.transform(raw) {
                    Ok(record) => prepared.push(record),
                    Err(e) => {
                        ctx.stats.errors += 1;
                        crate::metrics::record_transform_error(label);
                        warn!(page, error = %e, "Skipping record that failed to transform");
                    }
                }
            }

            if !batch.has_more {
                return Ok(prepared);
            }
            page = page.checked_add(1).ok_or_else(|| {
                FetchError::InvalidResponse("upstream never reported a last page".into())
            })?;
        }
    }

    /// Track and process every prepared record. Returns false if the run was
    /// cancelled part way.
    async fn process_all<E: EntitySync>(
        &self,
        ctx: &mut RunContext,
        entity: &E,
        records: Vec<PreparedRecord>,
        index: &PreloadedIndex,
        cancel: &watch::Receiver<bool>,
    ) -> bool {
        let _timer = PhaseTimer::new(entity.label(), "process");
        let collection = entity.collection();
        let compare = entity.compare_fields();

        for record in records {
            if *cancel.borrow() {
                return false;
            }
            if !ctx.track_processed(record.key.clone()) {
                ctx.stats.errors += 1;
                warn!(key = %record.key, "Duplicate key in upstream feed, skipping repeat");
                continue;
            }
            // Failures are counted and logged inside process
            let _ = self
                .process(ctx, collection, &record.key, &record.fields, index, compare)
                .await;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::config::ReconcileConfig;
    use crate::engine::{CompareFieldSet, TransformError};
    use crate::keys::{build_key, SyncKey};
    use crate::storage::{Filter, InMemoryStore, StoredRecord};
    use crate::upstream::{Page, StaticSource};
    use crate::value::Fields;

    struct Divisions {
        compare: CompareFieldSet,
    }

    impl Divisions {
        fn new() -> Self {
            Self {
                compare: CompareFieldSet::new(["name"]),
            }
        }
    }

    impl EntitySync for Divisions {
        type Raw = (i64, &'static str);

        fn label(&self) -> &str {
            "divisions"
        }

        fn collection(&self) -> &str {
            "divisions"
        }

        fn filter(&self) -> Filter {
            Filter::year(2025)
        }

        fn compare_fields(&self) -> &CompareFieldSet {
            &self.compare
        }

        fn transform(&self, raw: &Self::Raw) -> Result<PreparedRecord, TransformError> {
            let (id, name) = *raw;
            if name.is_empty() {
                return Err(TransformError::MissingField("name".into()));
            }
            Ok(PreparedRecord::new(
                build_key(id, 2025),
                Fields::new().with("external_id", id).with("year", 2025).with("name", name),
            ))
        }

        fn record_key(&self, record: &StoredRecord) -> Option<SyncKey> {
            record.fields.get("external_id")?.as_i64().map(|id| build_key(id, 2025))
        }
    }

    struct FailingSource;

    #[async_trait]
    impl UpstreamSource for FailingSource {
        type Record = (i64, &'static str);

        async fn fetch_page(&self, page: u32, _: u32) -> Result<Page<Self::Record>, FetchError> {
            if page == 1 {
                Ok(Page::more(vec![(1, "U10")]))
            } else {
                Err(FetchError::InvalidResponse("bad json".into()))
            }
        }
    }

    fn setup(page_size: u32) -> (Arc<InMemoryStore>, Reconciler) {
        let store = Arc::new(InMemoryStore::new());
        let config = ReconcileConfig {
            page_size,
            fetch_initial_delay_ms: 1,
            fetch_max_delay_ms: 5,
            ..Default::default()
        };
        (store.clone(), Reconciler::new(store, config).unwrap())
    }

    #[tokio::test]
    async fn test_run_creates_then_skips() {
        let (store, reconciler) = setup(2);
        let source = StaticSource::new(vec![(1, "U10"), (2, "U12"), (3, "U14")]);
        let (_tx, rx) = watch::channel(false);

        let first = reconciler.run(&Divisions::new(), &source, &rx).await;
        assert!(first.successful);
        assert_eq!(first.stats.created, 3);

        store.reset_write_counts();
        let second = reconciler.run(&Divisions::new(), &source, &rx).await;
        assert_eq!(second.stats.skipped, 3);
        assert_eq!(second.stats.created, 0);
        assert_eq!(store.write_counts().total(), 0);
    }

    #[tokio::test]
    async fn test_transform_errors_are_counted_and_skipped() {
        let (store, reconciler) = setup(10);
        let source = StaticSource::new(vec![(1, "U10"), (2, ""), (3, "U14")]);
        let (_tx, rx) = watch::channel(false);

        let report = reconciler.run(&Divisions::new(), &source, &rx).await;
        assert!(report.successful);
        assert_eq!(report.stats.errors, 1);
        assert_eq!(report.stats.created, 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_local_records() {
        let (store, reconciler) = setup(1);
        store.seed("divisions", Fields::new().with("external_id", 7).with("year", 2025));
        let (_tx, rx) = watch::channel(false);

        let report = reconciler.run(&Divisions::new(), &FailingSource, &rx).await;

        assert!(!report.successful);
        assert!(report.error.as_deref().unwrap_or_default().contains("bad json"));
        assert_eq!(report.stats.deleted, 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_upstream_key_counted_once() {
        let (store, reconciler) = setup(10);
        let source = StaticSource::new(vec![(1, "U10"), (1, "U10 again")]);
        let (_tx, rx) = watch::channel(false);

        let report = reconciler.run(&Divisions::new(), &source, &rx).await;
        assert_eq!(report.stats.created, 1);
        assert_eq!(report.stats.errors, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let (store, reconciler) = setup(10);
        let source = StaticSource::new(vec![(1, "U10")]);
        let (_tx, rx) = watch::channel(true);

        let report = reconciler.run(&Divisions::new(), &source, &rx).await;
        assert!(report.cancelled);
        assert!(!report.successful);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_state_reaches_completed() {
        let (_store, reconciler) = setup(10);
        let source = StaticSource::new(vec![(1, "U10")]);
        let (_tx, rx) = watch::channel(false);
        let ctx = RunContext::new("divisions");
        let state = ctx.subscribe();

        let report = reconciler.run_with_context(ctx, &Divisions::new(), &source, &rx).await;
        assert!(report.ensure_ok().is_ok());
        assert_eq!(*state.borrow(), RunState::Completed);
    }
}
