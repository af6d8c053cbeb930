//! Pipeline orchestrator implementation.
//!
//! Drives one run through topic → text → audio → video → distribution:
//! - every stage call goes through the retry wrapper
//! - a stage that exhausts its retries is dead-lettered and aborts the run
//! - the run reaches exactly one terminal status

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::config::{validate_pipeline_config, Config};
use crate::dlq::{enqueue_dead_letter, DlqOperation, DlqStore, EnqueueOutcome, NewDlqEntry};
use crate::retry::{with_retry, DeadLetter, DeadLetterOutcome, ReplayPayload, RetryPolicy};
use crate::run::{AssetStatus, RunLogger, RunStore, RunTrigger};
use crate::stages::{
    validate_text_payload, AudioInput, DeliveredReceipts, DistributionInput, Stage, StageError,
    StageExecutor, StageOutput, TextInput, VideoInput,
};

use super::types::{ActiveRun, OrchestratorStatus, PipelineError};

/// Counters since process start.
#[derive(Default)]
struct RunCounters {
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Holds a slot in the active run set until dropped.
///
/// Dropping releases the single-flight guard, so a run that errors or
/// panics never blocks the next trigger.
struct ActiveRunGuard {
    active: Arc<Mutex<Vec<ActiveRun>>>,
    run_id: String,
}

impl Drop for ActiveRunGuard {
    fn drop(&mut self) {
        lock_active(&self.active).retain(|run| run.run_id != self.run_id);
    }
}

fn lock_active(active: &Mutex<Vec<ActiveRun>>) -> MutexGuard<'_, Vec<ActiveRun>> {
    // The set stays consistent even if a holder panicked.
    active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The pipeline orchestrator: sequences stages and owns the run lifecycle.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    config: Arc<Config>,
    run_store: Arc<dyn RunStore>,
    dlq_store: Arc<dyn DlqStore>,
    executor: Arc<StageExecutor>,
    policy: RetryPolicy,

    // Runtime state
    active: Arc<Mutex<Vec<ActiveRun>>>,
    counters: Arc<RunCounters>,
}

impl PipelineOrchestrator {
    pub fn new(
        config: Arc<Config>,
        run_store: Arc<dyn RunStore>,
        dlq_store: Arc<dyn DlqStore>,
        executor: Arc<StageExecutor>,
    ) -> Self {
        let policy = RetryPolicy::from_config(&config.retry);
        Self {
            config,
            run_store,
            dlq_store,
            executor,
            policy,
            active: Arc::new(Mutex::new(Vec::new())),
            counters: Arc::new(RunCounters::default()),
        }
    }

    /// Override the retry policy built from `[retry]`.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn executor(&self) -> &Arc<StageExecutor> {
        &self.executor
    }

    /// Run the whole pipeline and wait for it to finish.
    ///
    /// Returns the run id on success. On failure the run is already marked
    /// failed when the error is returned.
    pub async fn run_pipeline(&self, trigger: RunTrigger) -> Result<String, PipelineError> {
        let guard = self.begin(trigger)?;
        let run_id = guard.run_id.clone();
        self.execute(guard).await?;
        Ok(run_id)
    }

    /// Create the run and execute it on a background task.
    ///
    /// Returns as soon as the run record exists. Errors from the run itself
    /// are logged, not returned.
    pub async fn trigger(&self, trigger: RunTrigger) -> Result<String, PipelineError> {
        let guard = self.begin(trigger)?;
        let run_id = guard.run_id.clone();

        let orchestrator = self.clone();
        tokio::spawn(async move {
            let run_id = guard.run_id.clone();
            if let Err(e) = orchestrator.execute(guard).await {
                error!(run_id = %run_id, error = %e, "Pipeline run failed");
            }
        });

        Ok(run_id)
    }

    /// Get current orchestrator status.
    pub fn status(&self) -> OrchestratorStatus {
        let active = lock_active(&self.active);
        OrchestratorStatus {
            active_run: active.first().cloned(),
            active_count: active.len(),
            allow_concurrent_runs: self.config.pipeline.allow_concurrent_runs,
            runs_started: self.counters.started.load(Ordering::Relaxed),
            runs_completed: self.counters.completed.load(Ordering::Relaxed),
            runs_failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Validate configuration, take the single-flight slot and create the
    /// run record.
    fn begin(&self, trigger: RunTrigger) -> Result<ActiveRunGuard, PipelineError> {
        validate_pipeline_config(&self.config)?;

        // Held across create_run so two triggers cannot both pass the check.
        let mut active = lock_active(&self.active);
        if !self.config.pipeline.allow_concurrent_runs {
            if let Some(current) = active.first() {
                crate::metrics::RUNS_REJECTED.inc();
                info!(active_run = %current.run_id, trigger = trigger.as_str(), "Run already active, rejecting trigger");
                return Err(PipelineError::AlreadyRunning(current.run_id.clone()));
            }
        }

        let run = self.run_store.create_run(trigger)?;
        active.push(ActiveRun {
            run_id: run.id.clone(),
            trigger,
            started_at: run.started_at,
        });
        drop(active);

        self.counters.started.fetch_add(1, Ordering::Relaxed);
        crate::metrics::RUNS_STARTED
            .with_label_values(&[trigger.as_str()])
            .inc();
        info!(run_id = %run.id, trigger = trigger.as_str(), "Pipeline run created");

        Ok(ActiveRunGuard {
            active: Arc::clone(&self.active),
            run_id: run.id,
        })
    }

    /// Execute every stage, then record the terminal status.
    async fn execute(&self, guard: ActiveRunGuard) -> Result<(), PipelineError> {
        let logger = RunLogger::new(Arc::clone(&self.run_store), guard.run_id.clone());
        logger.info("Pipeline started", None);

        let result = match self.execute_stages(&logger).await {
            Ok(()) => self
                .run_store
                .complete_run(logger.run_id())
                .map(|_| ())
                .map_err(PipelineError::from),
            Err(e) => Err(e),
        };
        let run_id = logger.run_id();

        match result {
            Ok(()) => {
                logger.info("Pipeline completed", None);
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                crate::metrics::RUNS_FINISHED
                    .with_label_values(&["completed"])
                    .inc();
                info!(run_id, "Pipeline run completed");
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                logger.error("Pipeline failed", Some(json!({ "error": message })));
                if let Err(store_err) = self.run_store.fail_run(run_id, &message) {
                    error!(run_id, error = %store_err, "Failed to mark run as failed");
                }
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                crate::metrics::RUNS_FINISHED
                    .with_label_values(&["failed"])
                    .inc();
                Err(e)
            }
        }
    }

    async fn execute_stages(&self, logger: &RunLogger) -> Result<(), PipelineError> {
        let run_id = logger.run_id().to_string();
        let executor = self.executor.as_ref();

        self.executor.run_dirs(&run_id).create().await?;

        // Topic
        let topic = self
            .run_stage(Stage::Topic, logger, json!({ "run_id": run_id }), |_| {
                executor.topic(&run_id)
            })
            .await?;
        logger.info(
            "topic stage completed",
            Some(json!({ "stage": Stage::Topic, "topic": topic })),
        );

        // Text
        let text_input = TextInput {
            run_id: run_id.clone(),
            topic,
        };
        let text = self
            .run_stage(Stage::Text, logger, to_payload(&text_input), |_| {
                executor.text(&text_input)
            })
            .await?;
        if let Err(e) = validate_text_payload(&text) {
            return Err(self.reject_text(logger, &text_input, e));
        }
        let text_path = executor
            .store_text(&run_id, &text)
            .await
            .map_err(|source| PipelineError::Artifact {
                stage: Stage::Text,
                source,
            })?;
        self.record_output(
            logger,
            StageOutput::Text {
                payload: text.clone(),
                path: text_path,
            },
        )?;

        // Audio
        let audio_input = AudioInput {
            run_id: run_id.clone(),
            text: text.primary.clone(),
        };
        let audio = self
            .run_stage(Stage::Audio, logger, to_payload(&audio_input), |_| {
                executor.audio(&audio_input)
            })
            .await?;
        self.record_output(logger, StageOutput::Audio(audio.clone()))?;

        // Video
        let video_input = VideoInput {
            run_id: run_id.clone(),
            audio_path: audio.path.clone(),
        };
        let video = self
            .run_stage(Stage::Video, logger, to_payload(&video_input), |_| {
                executor.video(&video_input)
            })
            .await?;
        self.record_output(logger, StageOutput::Video(video.clone()))?;

        // Distribution
        let distribution_input = DistributionInput {
            run_id: run_id.clone(),
            text,
            audio_path: audio.path,
            video_path: video.path,
            delivered: vec![],
        };
        let delivered = Arc::new(DeliveredReceipts::default());
        let payload = {
            let input = distribution_input.clone();
            let delivered = Arc::clone(&delivered);
            ReplayPayload::deferred(move || {
                let mut input = input.clone();
                input.delivered = delivered.snapshot();
                to_payload(&input)
            })
        };
        let receipts = self
            .run_stage(Stage::Distribution, logger, payload, |_| {
                executor.distribute(&distribution_input, &delivered)
            })
            .await?;
        self.record_output(logger, StageOutput::Distribution(receipts))?;

        Ok(())
    }

    /// Run one stage call through the retry wrapper.
    ///
    /// `payload` is the stage's input for replay, dead-lettered if the call
    /// exhausts its retries.
    async fn run_stage<T, F, Fut>(
        &self,
        stage: Stage,
        logger: &RunLogger,
        payload: impl Into<ReplayPayload>,
        call: F,
    ) -> Result<T, PipelineError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, StageError>>,
    {
        let run_id = logger.run_id();
        debug!(run_id, stage = stage.as_str(), "Stage started");

        let dead_letter = stage.dlq_operation().map(|operation| DeadLetter {
            store: Arc::clone(&self.dlq_store),
            run_id: run_id.to_string(),
            operation,
            payload: payload.into(),
            max_retries: self.config.dlq.max_retries,
        });

        let started = Instant::now();
        let result = with_retry(&self.policy, stage.as_str(), call, dead_letter).await;
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(value) => {
                crate::metrics::STAGE_DURATION
                    .with_label_values(&[stage.as_str(), "success"])
                    .observe(elapsed);
                Ok(value)
            }
            Err(e) => {
                crate::metrics::STAGE_DURATION
                    .with_label_values(&[stage.as_str(), "failure"])
                    .observe(elapsed);
                if e.dead_letter() == Some(DeadLetterOutcome::AlreadyExists) {
                    logger.warn(
                        "DLQ entry already exists, skipping",
                        Some(json!({ "stage": stage, "operation": stage.dlq_operation() })),
                    );
                }
                logger.error(
                    &format!("{} stage failed", stage),
                    Some(json!({
                        "stage": stage,
                        "attempts": e.attempts(),
                        "error": e.last_error().to_string(),
                        "operation": stage.dlq_operation(),
                        "dead_letter": e.dead_letter(),
                    })),
                );
                Err(PipelineError::Stage { stage, source: e })
            }
        }
    }

    /// Dead-letter generated text that failed validation. Not retried.
    fn reject_text(
        &self,
        logger: &RunLogger,
        input: &TextInput,
        error: StageError,
    ) -> PipelineError {
        let message = error.to_string();
        let request = NewDlqEntry {
            run_id: input.run_id.clone(),
            operation: DlqOperation::TextGeneration,
            error: message.clone(),
            payload: to_payload(input),
            max_retries: self.config.dlq.max_retries,
        };
        match enqueue_dead_letter(self.dlq_store.as_ref(), request) {
            Ok(EnqueueOutcome::Created(_)) => {}
            Ok(EnqueueOutcome::AlreadyExists) => logger.warn(
                "DLQ entry already exists, skipping",
                Some(json!({ "stage": Stage::Text, "operation": DlqOperation::TextGeneration })),
            ),
            Err(e) => {
                error!(run_id = %input.run_id, error = %e, "Failed to persist DLQ entry");
            }
        }

        logger.error(
            "text stage produced an invalid payload",
            Some(json!({ "stage": Stage::Text, "error": message })),
        );
        PipelineError::Validation(message)
    }

    /// Persist a stage's asset and log its completion.
    fn record_output(&self, logger: &RunLogger, output: StageOutput) -> Result<(), PipelineError> {
        let run_id = logger.run_id();
        let stage = output.stage();

        if let Some(asset) = output.asset(run_id) {
            let asset = self.run_store.create_asset(asset)?;
            logger.info(
                &format!("{} stage completed", stage),
                Some(json!({
                    "stage": stage,
                    "asset_id": asset.id,
                    "path": asset.path,
                })),
            );
        }

        if let StageOutput::Distribution(receipts) = &output {
            let marked = self
                .run_store
                .set_assets_status(run_id, AssetStatus::Distributed)?;
            logger.info(
                &format!("{} stage completed", stage),
                Some(json!({
                    "stage": stage,
                    "receipts": receipts,
                    "assets_distributed": marked,
                    "finished_at": Utc::now(),
                })),
            );
        }

        Ok(())
    }
}

fn to_payload<T: serde::Serialize>(input: &T) -> serde_json::Value {
    serde_json::to_value(input).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to serialize stage input");
        serde_json::Value::Null
    })
}
