use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};

use crate::dlq::{DlqEntry, DlqError, DlqFilter, DlqStore, DlqUpdate, NewDlqEntry};

/// A DLQ store whose database is unreachable. Every call fails with
/// `DlqError::Database`.
#[derive(Debug, Default)]
pub struct FailingDlqStore {
    calls: AtomicU32,
}

impl FailingDlqStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls made against the store.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> Result<T, DlqError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(DlqError::Database("database is locked".to_string()))
    }
}

impl DlqStore for FailingDlqStore {
    fn create_entry(&self, _entry: NewDlqEntry) -> Result<DlqEntry, DlqError> {
        self.fail()
    }

    fn check_exists(&self, _run_id: &str, _operation: &str) -> Result<bool, DlqError> {
        self.fail()
    }

    fn update_entry(&self, _id: &str, _update: DlqUpdate) -> Result<DlqEntry, DlqError> {
        self.fail()
    }

    fn get(&self, _id: &str) -> Result<Option<DlqEntry>, DlqError> {
        self.fail()
    }

    fn list(&self, _filter: &DlqFilter) -> Result<Vec<DlqEntry>, DlqError> {
        self.fail()
    }

    fn count(&self, _filter: &DlqFilter) -> Result<i64, DlqError> {
        self.fail()
    }

    fn claim_for_retry(&self, _id: &str) -> Result<Option<DlqEntry>, DlqError> {
        self.fail()
    }

    fn release(&self, _id: &str, _error: &str) -> Result<DlqEntry, DlqError> {
        self.fail()
    }

    fn resolve(&self, _id: &str) -> Result<DlqEntry, DlqError> {
        self.fail()
    }

    fn requeue_stale(&self, _older_than: DateTime<Utc>) -> Result<usize, DlqError> {
        self.fail()
    }
}
