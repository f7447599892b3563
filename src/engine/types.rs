//! Public types for the reconciliation engine.

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::keys::SyncKey;
use crate::storage::StorageError;
use crate::upstream::FetchError;

/// Run lifecycle state.
///
/// ```text
/// NotStarted → Fetching → Processing → OrphanCleanup → Completed
///                  │            │
///                  └────────────┴──(fetch failure / cancel)──→ Completed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    /// Context created, nothing read yet
    NotStarted,
    /// Preloading local records and paging through the upstream
    Fetching,
    /// Diffing and upserting transformed records
    Processing,
    /// Removing local records not seen upstream
    OrphanCleanup,
    /// Finished, successfully or not
    Completed,
}

impl RunState {
    /// Numeric form for gauges.
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::Fetching => 1,
            Self::Processing => 2,
            Self::OrphanCleanup => 3,
            Self::Completed => 4,
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "NotStarted"),
            Self::Fetching => write!(f, "Fetching"),
            Self::Processing => write!(f, "Processing"),
            Self::OrphanCleanup => write!(f, "OrphanCleanup"),
            Self::Completed => write!(f, "Completed"),
        }
    }
}

/// What [`super::Reconciler::process`] did with one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Created,
    Updated,
    Skipped,
}

impl ProcessOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Skipped => "skipped",
        }
    }
}

/// Run-scoped counters. Observational only, never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
    pub deleted: usize,
    /// Whole seconds from run start to completion
    pub duration_secs: u64,
}

impl SyncStats {
    /// Records that reached a decision (created, updated or skipped).
    #[must_use]
    pub fn processed(&self) -> usize {
        self.created + self.updated + self.skipped
    }

    pub(crate) fn count(&mut self, outcome: ProcessOutcome) {
        match outcome {
            ProcessOutcome::Created => self.created += 1,
            ProcessOutcome::Updated => self.updated += 1,
            ProcessOutcome::Skipped => self.skipped += 1,
        }
    }
}

impl std::fmt::Display for SyncStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "created={} updated={} skipped={} errors={} deleted={} duration={}s",
            self.created, self.updated, self.skipped, self.errors, self.deleted, self.duration_secs
        )
    }
}

/// Whether the upstream fetch demonstrably completed.
///
/// Gates orphan deletion: a run that never saw the last page must not
/// conclude that missing records were removed upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    successful: bool,
}

impl RunOutcome {
    #[must_use]
    pub fn successful(&self) -> bool {
        self.successful
    }

    /// Only called once the final page has been received.
    pub(crate) fn mark_successful(&mut self) {
        self.successful = true;
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub entity: String,
    pub stats: SyncStats,
    pub successful: bool,
    pub cancelled: bool,
    /// Keys removed by orphan cleanup
    pub deleted_keys: Vec<SyncKey>,
    /// Why the run stopped early, if it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    /// Convert a failed run into an error for `?` propagation.
    pub fn ensure_ok(&self) -> Result<(), ReconcileError> {
        if self.cancelled {
            return Err(ReconcileError::Cancelled);
        }
        match &self.error {
            Some(message) => Err(ReconcileError::RunFailed {
                entity: self.entity.clone(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Reconciliation of '{entity}' failed: {message}")]
    RunFailed { entity: String, message: String },
    #[error("Run cancelled")]
    Cancelled,
}
