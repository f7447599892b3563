// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Reconciliation engine.
//!
//! The [`Reconciler`] converges one local collection onto an upstream feed:
//!
//! ```text
//! preload ──→ fetch pages ──→ prepare_batch ──→ process + track ──→ delete orphans
//!   │              │                               │                     │
//!   index     RunOutcome                     SyncStats             gated on
//! (read-only)  successful                  created/updated/       successful
//!                                           skipped/errors
//! ```
//!
//! The reconciler itself only holds the store and configuration. All run
//! state (processed keys, stats, outcome) lives in a [`RunContext`] built
//! fresh for every run.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use reconcile_engine::{InMemoryStore, ReconcileConfig, Reconciler};
//!
//! let store = Arc::new(InMemoryStore::new());
//! let reconciler = Reconciler::new(store, ReconcileConfig::default())
//!     .expect("valid config");
//! assert_eq!(reconciler.config().page_size, 100);
//! ```

mod context;
mod entity;
mod orphans;
mod process;
mod run;
mod types;

pub use context::{PreloadedIndex, ProcessedKeySet, RunContext};
pub use entity::{CompareFieldSet, EntitySync, PreparedRecord, TransformError};
pub use orphans::find_orphans;
pub use types::{ProcessOutcome, ReconcileError, RunOutcome, RunReport, RunState, SyncStats};

use std::sync::Arc;

use crate::config::{ConfigError, ReconcileConfig};
use crate::storage::RecordStore;

/// Converges local collections onto upstream feeds.
///
/// Cheap to clone; clones share the store.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn RecordStore>,
    config: ReconcileConfig,
}

impl Reconciler {
    /// Create a reconciler over `store`. Fails if `config` is invalid.
    pub fn new(store: Arc<dyn RecordStore>, config: ReconcileConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { store, config })
    }

    #[must_use]
    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
