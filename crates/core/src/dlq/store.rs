//! DLQ storage trait and guarded enqueue.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;

use super::{DlqEntry, DlqFilter, DlqUpdate, NewDlqEntry};

/// Error type for DLQ operations.
#[derive(Debug, Error)]
pub enum DlqError {
    #[error("DLQ entry not found: {0}")]
    NotFound(String),

    #[error("DLQ entry already exists for run {run_id} operation {operation}")]
    Duplicate { run_id: String, operation: String },

    #[error("Cannot {operation} DLQ entry {id}: current status is {current_status}")]
    InvalidState {
        id: String,
        current_status: String,
        operation: String,
    },

    #[error("DLQ entry refers to unknown run: {0}")]
    UnknownRun(String),

    #[error("unknown DLQ operation: {0}")]
    UnknownOperation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Trait for DLQ storage backends.
///
/// Status transitions (`claim_for_retry`, `release`, `resolve`,
/// `requeue_stale`) are compare-and-set: they only touch rows in the
/// expected status, so two workers can never process the same entry.
pub trait DlqStore: Send + Sync {
    /// Insert a new pending entry. Fails with `Duplicate` if one already
    /// exists for the same (run_id, operation).
    fn create_entry(&self, entry: NewDlqEntry) -> Result<DlqEntry, DlqError>;

    /// Whether an entry exists for (run_id, operation), in any status.
    fn check_exists(&self, run_id: &str, operation: &str) -> Result<bool, DlqError>;

    /// Apply a partial update without status checks.
    fn update_entry(&self, id: &str, update: DlqUpdate) -> Result<DlqEntry, DlqError>;

    fn get(&self, id: &str) -> Result<Option<DlqEntry>, DlqError>;

    /// Entries matching the filter, oldest first.
    fn list(&self, filter: &DlqFilter) -> Result<Vec<DlqEntry>, DlqError>;

    fn count(&self, filter: &DlqFilter) -> Result<i64, DlqError>;

    /// Atomically move a pending entry with remaining budget to `retrying`,
    /// incrementing `retry_count`. Returns `None` if the entry was not
    /// claimable (already claimed, terminal, or out of budget).
    fn claim_for_retry(&self, id: &str) -> Result<Option<DlqEntry>, DlqError>;

    /// Record a failed replay of a `retrying` entry. The entry becomes
    /// `failed` once `retry_count >= max_retries`, `pending` otherwise.
    fn release(&self, id: &str, error: &str) -> Result<DlqEntry, DlqError>;

    /// Mark a `retrying` entry as resolved.
    fn resolve(&self, id: &str) -> Result<DlqEntry, DlqError>;

    /// Return `retrying` entries claimed before `older_than` to `pending`.
    fn requeue_stale(&self, older_than: DateTime<Utc>) -> Result<usize, DlqError>;
}

/// Result of a guarded enqueue.
#[derive(Debug, Clone)]
pub enum EnqueueOutcome {
    Created(DlqEntry),
    AlreadyExists,
}

/// Dead-letter a failed call unless an entry already exists for the same
/// (run_id, operation).
pub fn enqueue_dead_letter(
    store: &dyn DlqStore,
    request: NewDlqEntry,
) -> Result<EnqueueOutcome, DlqError> {
    if store.check_exists(&request.run_id, request.operation.as_str())? {
        warn!(
            run_id = %request.run_id,
            operation = %request.operation,
            "DLQ entry already exists, skipping"
        );
        return Ok(EnqueueOutcome::AlreadyExists);
    }

    let run_id = request.run_id.clone();
    let operation = request.operation;

    match store.create_entry(request) {
        Ok(entry) => {
            crate::metrics::DLQ_ENTRIES_CREATED
                .with_label_values(&[operation.as_str()])
                .inc();
            Ok(EnqueueOutcome::Created(entry))
        }
        // Lost a race against a concurrent insert.
        Err(DlqError::Duplicate { .. }) => {
            warn!(run_id = %run_id, operation = %operation, "DLQ entry created concurrently, skipping");
            Ok(EnqueueOutcome::AlreadyExists)
        }
        Err(e) => Err(e),
    }
}
