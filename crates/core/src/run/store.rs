//! Run storage trait and types.

use thiserror::Error;

use super::{
    Asset, AssetStatus, LogEntry, NewAsset, NewLogEntry, Run, RunDetail, RunStatus, RunTrigger,
};

/// Error type for run storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Run not found: {0}")]
    NotFound(String),

    #[error("Cannot {operation} run {run_id}: current status is {current_status}")]
    InvalidState {
        run_id: String,
        current_status: String,
        operation: String,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Filter for querying runs.
#[derive(Debug, Clone)]
pub struct RunFilter {
    pub status: Option<RunStatus>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for RunFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl RunFilter {
    pub fn new() -> Self {
        Self {
            status: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: RunStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Trait for run storage backends.
///
/// A run owns its logs and assets. Status moves `running -> completed | failed`
/// exactly once; implementations must reject any other transition.
pub trait RunStore: Send + Sync {
    /// Create a new run in the `running` state.
    fn create_run(&self, trigger: RunTrigger) -> Result<Run, StoreError>;

    /// Get a run by ID.
    fn get_run(&self, id: &str) -> Result<Option<Run>, StoreError>;

    /// List runs matching the filter, newest first.
    fn list_runs(&self, filter: &RunFilter) -> Result<Vec<Run>, StoreError>;

    /// Count runs matching the filter.
    fn count_runs(&self, filter: &RunFilter) -> Result<i64, StoreError>;

    /// Mark a running run as completed.
    fn complete_run(&self, id: &str) -> Result<Run, StoreError>;

    /// Mark a running run as failed with an error message.
    fn fail_run(&self, id: &str, error: &str) -> Result<Run, StoreError>;

    /// Append a log line to a run.
    fn append_log(&self, entry: NewLogEntry) -> Result<LogEntry, StoreError>;

    /// Logs of a run in chronological order.
    fn list_logs(&self, run_id: &str) -> Result<Vec<LogEntry>, StoreError>;

    /// Persist an asset.
    fn create_asset(&self, asset: NewAsset) -> Result<Asset, StoreError>;

    /// Set the status of every asset of a run. Returns the number of rows touched.
    fn set_assets_status(&self, run_id: &str, status: AssetStatus) -> Result<usize, StoreError>;

    /// Assets of a run in creation order.
    fn list_assets(&self, run_id: &str) -> Result<Vec<Asset>, StoreError>;

    /// A run with its logs and assets.
    fn get_run_detail(&self, id: &str) -> Result<Option<RunDetail>, StoreError> {
        let Some(run) = self.get_run(id)? else {
            return Ok(None);
        };
        let logs = self.list_logs(id)?;
        let assets = self.list_assets(id)?;
        Ok(Some(RunDetail { run, logs, assets }))
    }
}
