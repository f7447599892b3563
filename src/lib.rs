//! # Reconcile Engine
//!
//! Converges a local record store onto an upstream source of record, one
//! entity type at a time, without ever mistaking a failed fetch for an
//! empty upstream.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Upstream Source                        │
//! │  • Paginated fetch_page(page, page_size)                   │
//! │  • Rate limit aware retry (parse_wait + exponential)       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                   (transform to canonical Fields)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Batch preparation                         │
//! │  • EntitySync::prepare_batch                               │
//! │  • Session overlap resolver for dated sessions             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Reconciliation Engine                      │
//! │  • Preloaded index of local records by SyncKey             │
//! │  • Create / update / skip via the field equality normalizer│
//! │  • Processed key tracking, per-run stats                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                   (only after a successful fetch)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Orphan cleanup                          │
//! │  • Re-scan local store, recompute keys                     │
//! │  • Delete records not seen upstream this run               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use reconcile_engine::{
//!     build_key, CompareFieldSet, EntitySync, Fields, Filter, InMemoryStore, PreparedRecord,
//!     ReconcileConfig, Reconciler, StaticSource, StoredRecord, SyncKey, TransformError,
//! };
//! use tokio::sync::watch;
//!
//! struct Divisions(CompareFieldSet);
//!
//! impl EntitySync for Divisions {
//!     type Raw = (i64, String);
//!     fn label(&self) -> &str { "divisions" }
//!     fn collection(&self) -> &str { "divisions" }
//!     fn filter(&self) -> Filter { Filter::year(2025) }
//!     fn compare_fields(&self) -> &CompareFieldSet { &self.0 }
//!     fn transform(&self, (id, name): &Self::Raw) -> Result<PreparedRecord, TransformError> {
//!         let fields = Fields::new().with("external_id", *id).with("year", 2025).with("name", name.as_str());
//!         Ok(PreparedRecord::new(build_key(id, 2025), fields))
//!     }
//!     fn record_key(&self, record: &StoredRecord) -> Option<SyncKey> {
//!         record.fields.get("external_id")?.as_i64().map(|id| build_key(id, 2025))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(InMemoryStore::new());
//!     let reconciler = Reconciler::new(store, ReconcileConfig::default()).expect("valid config");
//!     let source = StaticSource::new(vec![(1, "U10".to_string()), (2, "U12".to_string())]);
//!     let (_cancel, cancelled) = watch::channel(false);
//!
//!     let report = reconciler
//!         .run(&Divisions(CompareFieldSet::new(["name"])), &source, &cancelled)
//!         .await;
//!     println!("{}", report.stats);
//! }
//! ```
//!
//! ## Features
//!
//! - **Safe orphan cleanup**: deletion is gated on a demonstrably complete fetch
//! - **Drift-tolerant diffing**: ints vs floats, bools vs 0/1, timestamp styles,
//!   JSON key order and list order never cause spurious updates
//! - **Per-run state**: stats and key sets live in a fresh [`RunContext`]
//! - **Cooperative cancellation**: checked between pages and between records
//! - **Rate limit backoff**: waits the server-advertised time plus a buffer
//! - **Session overlap resolution**: deterministic main/embedded nesting
//!
//! ## Modules
//!
//! - [`engine`]: The [`Reconciler`] and its per-run types
//! - [`normalize`]: Field equality across representations
//! - [`keys`]: Canonical [`SyncKey`] construction
//! - [`overlap`]: Session classification and overlap resolution
//! - [`storage`]: Local store trait and backends (memory, SQL)
//! - [`upstream`]: Paginated upstream source trait
//! - [`resilience`]: Retry and rate limit backoff

pub mod config;
pub mod value;
pub mod normalize;
pub mod keys;
pub mod storage;
pub mod upstream;
pub mod engine;
pub mod overlap;
pub mod resilience;
pub mod metrics;

// Note: We don't expose a `tracing` module to avoid conflict with the tracing crate

pub use config::{ConfigError, ReconcileConfig};
pub use value::{FieldValue, Fields};
pub use normalize::{changed_fields, field_equals};
pub use keys::{build_composite_key, build_global_key, build_key, SyncKey};
pub use storage::{Filter, InMemoryStore, RecordHandle, RecordStore, SqlStore, StorageError, StoredRecord};
pub use upstream::{FetchError, Page, StaticSource, UpstreamSource};
pub use engine::{
    find_orphans, CompareFieldSet, EntitySync, PreloadedIndex, PreparedRecord, ProcessOutcome,
    ProcessedKeySet, ReconcileError, Reconciler, RunContext, RunOutcome, RunReport, RunState,
    SyncStats, TransformError,
};
pub use overlap::{
    classify_session, resolve_overlaps, resolve_prepared, ResolvedSession, SessionEntity,
    SessionFields, SessionKind,
};
pub use resilience::backoff::parse_wait;
pub use resilience::retry::RetryConfig;
pub use metrics::PhaseTimer;
