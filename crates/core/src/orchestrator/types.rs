//! Types for the pipeline orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::RetryError;
use crate::run::RunTrigger;
use crate::stages::{Stage, StageError};

/// Errors that can occur while running the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Required configuration is missing or invalid. No run was created.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Another run is active and concurrent runs are disabled.
    #[error("pipeline already running: {0}")]
    AlreadyRunning(String),

    /// A stage exhausted its retries.
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: RetryError<StageError>,
    },

    /// Generated text failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A stage succeeded but its artifact could not be written.
    #[error("failed to store {stage} artifact: {source}")]
    Artifact {
        stage: Stage,
        #[source]
        source: StageError,
    },

    /// Run store error.
    #[error("run store error: {0}")]
    Store(#[from] crate::run::StoreError),

    /// DLQ store error.
    #[error("DLQ error: {0}")]
    Dlq(#[from] crate::dlq::DlqError),

    /// Filesystem error preparing the run directories.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A run currently executing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveRun {
    pub run_id: String,
    pub trigger: RunTrigger,
    pub started_at: DateTime<Utc>,
}

/// Current status of the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    /// Oldest run still executing, if any.
    pub active_run: Option<ActiveRun>,
    /// Number of runs executing (at most 1 unless concurrency is allowed).
    pub active_count: usize,
    pub allow_concurrent_runs: bool,
    /// Counters since process start.
    pub runs_started: u64,
    pub runs_completed: u64,
    pub runs_failed: u64,
}
