pub mod config;
mod db;
pub mod dlq;
pub mod metrics;
pub mod orchestrator;
pub mod retry;
pub mod run;
pub mod scheduler;
pub mod stages;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, missing_credentials, validate_config,
    validate_pipeline_config, Config, ConfigError, SanitizedConfig,
};
pub use dlq::{
    DlqEntry, DlqError, DlqFilter, DlqOperation, DlqProcessReport, DlqProcessor,
    DlqProcessorStatus, DlqStatus, DlqStore, SqliteDlqStore,
};
pub use orchestrator::{OrchestratorStatus, PipelineError, PipelineOrchestrator};
pub use retry::{
    with_retry, DeadLetter, DeadLetterOutcome, ReplayPayload, RetryError, RetryPolicy,
    RetryableError,
};
pub use run::{RunFilter, RunLogger, RunStatus, RunStore, RunTrigger, SqliteRunStore, StoreError};
pub use scheduler::{Scheduler, SchedulerStatus, TickOutcome};
pub use stages::{build_stage_executor, Stage, StageError, StageExecutor};
