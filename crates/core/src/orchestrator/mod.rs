//! Pipeline orchestrator.
//!
//! Creates a run, executes the stages strictly in order through the retry
//! wrapper and records exactly one terminal status. A stage that exhausts
//! its retries is dead-lettered and aborts the run.
//!
//! With `pipeline.allow_concurrent_runs = false` (the default) at most one
//! run is active; further triggers fail with
//! [`PipelineError::AlreadyRunning`].

mod runner;
mod types;

pub use runner::PipelineOrchestrator;
pub use types::{ActiveRun, OrchestratorStatus, PipelineError};
