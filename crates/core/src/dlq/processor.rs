//! Periodic replay of dead-lettered stage calls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::config::DlqConfig;
use crate::run::{AssetStatus, RunLogger, RunStore};
use crate::stages::{StageExecutor, StageOutput};

use super::store::{DlqError, DlqStore};
use super::{DlqEntry, DlqFilter, DlqOperation, DlqStatus, DlqUpdate};

/// Entries examined per pass.
const BATCH_SIZE: i64 = 100;

/// Outcome of one processor pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DlqProcessReport {
    /// Retryable entries found.
    pub scanned: usize,
    /// Replayed successfully.
    pub resolved: usize,
    /// Replay failed with budget left; back to pending.
    pub requeued: usize,
    /// Replay failed terminally, or the operation is unknown.
    pub failed: usize,
    /// Claimed by someone else first.
    pub skipped: usize,
}

/// Processor state for the monitoring surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqProcessorStatus {
    pub running: bool,
    pub enabled: bool,
    pub interval_secs: u64,
    pub pending_entries: i64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_report: Option<DlqProcessReport>,
}

/// Scans pending DLQ entries and replays them through the stage executor.
#[derive(Clone)]
pub struct DlqProcessor {
    config: DlqConfig,
    dlq_store: Arc<dyn DlqStore>,
    run_store: Arc<dyn RunStore>,
    executor: Arc<StageExecutor>,

    // Runtime state
    running: Arc<AtomicBool>,
    last_run: Arc<RwLock<Option<(DateTime<Utc>, DlqProcessReport)>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl DlqProcessor {
    pub fn new(
        config: DlqConfig,
        dlq_store: Arc<dyn DlqStore>,
        run_store: Arc<dyn RunStore>,
        executor: Arc<StageExecutor>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            dlq_store,
            run_store,
            executor,
            running: Arc::new(AtomicBool::new(false)),
            last_run: Arc::new(RwLock::new(None)),
            shutdown_tx,
        }
    }

    /// Requeue stale claims, then process once now and every interval after.
    pub async fn start(&self) {
        if !self.config.enabled {
            info!("DLQ processor disabled");
            return;
        }
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("DLQ processor already running");
            return;
        }

        let stale_before = Utc::now() - chrono::Duration::seconds(self.config.stale_after_secs as i64);
        match self.dlq_store.requeue_stale(stale_before) {
            Ok(0) => {}
            Ok(count) => info!(count, "Requeued stale DLQ entries"),
            Err(e) => warn!(error = %e, "Failed to requeue stale DLQ entries"),
        }

        self.spawn_loop();
        info!(interval_secs = self.config.interval_secs, "DLQ processor started");
    }

    /// Stop the background loop.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(());
        info!("DLQ processor stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub async fn status(&self) -> DlqProcessorStatus {
        let last_run = self.last_run.read().await.clone();
        let pending_entries = self
            .dlq_store
            .count(&DlqFilter::retryable())
            .unwrap_or(0);

        DlqProcessorStatus {
            running: self.is_running(),
            enabled: self.config.enabled,
            interval_secs: self.config.interval_secs,
            pending_entries,
            last_run_at: last_run.as_ref().map(|(at, _)| *at),
            last_report: last_run.map(|(_, report)| report),
        }
    }

    fn spawn_loop(&self) {
        let processor = self.clone();
        let interval = Duration::from_secs(self.config.interval_secs);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("DLQ loop started");
            loop {
                if !processor.is_running() {
                    break;
                }
                if let Err(e) = processor.process_once().await {
                    warn!(error = %e, "DLQ pass failed");
                }

                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("DLQ loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            info!("DLQ loop stopped");
        });
    }

    /// Run a single pass over retryable entries.
    pub async fn process_once(&self) -> Result<DlqProcessReport, DlqError> {
        let entries = self
            .dlq_store
            .list(&DlqFilter::retryable().with_limit(BATCH_SIZE))?;

        let mut report = DlqProcessReport {
            scanned: entries.len(),
            ..Default::default()
        };

        for entry in entries {
            match self.process_entry(&entry).await {
                Ok(Some(status)) => match status {
                    DlqStatus::Resolved => report.resolved += 1,
                    DlqStatus::Pending => report.requeued += 1,
                    DlqStatus::Failed => report.failed += 1,
                    DlqStatus::Retrying => report.skipped += 1,
                },
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    warn!(dlq_id = %entry.id, error = %e, "Failed to process DLQ entry");
                    report.skipped += 1;
                }
            }
        }

        if report.scanned > 0 {
            info!(
                scanned = report.scanned,
                resolved = report.resolved,
                requeued = report.requeued,
                failed = report.failed,
                skipped = report.skipped,
                "DLQ pass complete"
            );
        } else {
            debug!("DLQ pass found nothing to do");
        }

        *self.last_run.write().await = Some((Utc::now(), report.clone()));
        Ok(report)
    }

    /// Returns the entry's resulting status, or `None` if it was claimed
    /// elsewhere first.
    async fn process_entry(&self, entry: &DlqEntry) -> Result<Option<DlqStatus>, DlqError> {
        let Some(operation) = entry.operation_kind() else {
            let error = DlqError::UnknownOperation(entry.operation.clone());
            warn!(dlq_id = %entry.id, operation = %entry.operation, "Unknown DLQ operation");
            self.dlq_store.update_entry(
                &entry.id,
                DlqUpdate {
                    status: Some(DlqStatus::Failed),
                    error: Some(error.to_string()),
                    ..Default::default()
                },
            )?;
            record_processed(&entry.operation, "failed");
            return Ok(Some(DlqStatus::Failed));
        };

        let Some(claimed) = self.dlq_store.claim_for_retry(&entry.id)? else {
            debug!(dlq_id = %entry.id, "DLQ entry claimed elsewhere, skipping");
            return Ok(None);
        };

        let logger = RunLogger::new(Arc::clone(&self.run_store), claimed.run_id.clone());
        info!(
            dlq_id = %claimed.id,
            run_id = %claimed.run_id,
            operation = %operation,
            attempt = claimed.retry_count,
            "Replaying DLQ entry"
        );

        let mut payload = claimed.payload.clone();
        let result = self.executor.replay(operation, &mut payload).await;

        match result {
            Ok(output) => {
                let resolved = self.dlq_store.resolve(&claimed.id)?;
                self.persist_output(&logger, &resolved, operation, &output);
                record_processed(operation.as_str(), "resolved");
                Ok(Some(resolved.status))
            }
            Err(e) => {
                // Keep partial progress so the next replay does not repeat it.
                if payload != claimed.payload {
                    self.dlq_store.update_entry(
                        &claimed.id,
                        DlqUpdate {
                            payload: Some(payload),
                            ..Default::default()
                        },
                    )?;
                }
                let released = self.dlq_store.release(&claimed.id, &e.to_string())?;
                let (message, result) = if released.status == DlqStatus::Failed {
                    ("DLQ replay failed, retries exhausted", "failed")
                } else {
                    ("DLQ replay failed, will retry", "requeued")
                };
                logger.warn(
                    message,
                    Some(json!({
                        "dlq_id": released.id,
                        "operation": operation,
                        "retry_count": released.retry_count,
                        "max_retries": released.max_retries,
                        "error": e.to_string(),
                    })),
                );
                record_processed(operation.as_str(), result);
                Ok(Some(released.status))
            }
        }
    }

    fn persist_output(
        &self,
        logger: &RunLogger,
        entry: &DlqEntry,
        operation: DlqOperation,
        output: &StageOutput,
    ) {
        if let Some(asset) = output.asset(&entry.run_id) {
            if let Err(e) = self.run_store.create_asset(asset) {
                warn!(run_id = %entry.run_id, error = %e, "Failed to persist replayed asset");
            }
        }

        let mut metadata = json!({
            "dlq_id": entry.id,
            "operation": operation,
            "retry_count": entry.retry_count,
        });
        if let StageOutput::Distribution(receipts) = output {
            metadata["receipts"] = json!(receipts);
            if let Err(e) = self
                .run_store
                .set_assets_status(&entry.run_id, AssetStatus::Distributed)
            {
                warn!(run_id = %entry.run_id, error = %e, "Failed to mark assets distributed");
            }
        }

        logger.info("DLQ replay succeeded", Some(metadata));
    }
}

fn record_processed(operation: &str, result: &str) {
    crate::metrics::DLQ_PROCESSED
        .with_label_values(&[operation, result])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dlq::{NewDlqEntry, SqliteDlqStore};
    use crate::run::{AssetType, RunTrigger, SqliteRunStore};

    struct Fixture {
        _temp: tempfile::TempDir,
        dlq_store: Arc<dyn DlqStore>,
        run_store: Arc<dyn RunStore>,
        processor: DlqProcessor,
    }

    fn fixture() -> Fixture {
        let temp = tempfile::tempdir().unwrap();
        let dlq_store: Arc<dyn DlqStore> = Arc::new(SqliteDlqStore::in_memory().unwrap());
        let run_store: Arc<dyn RunStore> = Arc::new(SqliteRunStore::in_memory().unwrap());
        let executor = Arc::new(StageExecutor::placeholders(temp.path(), &["twitter"]));
        let processor = DlqProcessor::new(
            DlqConfig::default(),
            Arc::clone(&dlq_store),
            Arc::clone(&run_store),
            executor,
        );
        Fixture {
            _temp: temp,
            dlq_store,
            run_store,
            processor,
        }
    }

    #[tokio::test]
    async fn test_replay_resolves_and_records_asset() {
        let f = fixture();
        let run = f.run_store.create_run(RunTrigger::Manual).unwrap();
        f.run_store.fail_run(&run.id, "voice down").unwrap();

        let entry = f
            .dlq_store
            .create_entry(NewDlqEntry {
                run_id: run.id.clone(),
                operation: DlqOperation::VoiceGeneration,
                error: "voice down".to_string(),
                payload: json!({ "run_id": run.id, "text": "Narrate" }),
                max_retries: 3,
            })
            .unwrap();

        let report = f.processor.process_once().await.unwrap();
        assert_eq!(
            report,
            DlqProcessReport {
                scanned: 1,
                resolved: 1,
                ..Default::default()
            }
        );

        let entry = f.dlq_store.get(&entry.id).unwrap().unwrap();
        assert_eq!(entry.status, DlqStatus::Resolved);
        assert_eq!(entry.retry_count, 1);

        let assets = f.run_store.list_assets(&run.id).unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].asset_type, AssetType::Audio);

        let logs = f.run_store.list_logs(&run.id).unwrap();
        assert!(logs.iter().any(|l| l.message == "DLQ replay succeeded"));

        // Run stays failed; replay never rewrites history.
        let run = f.run_store.get_run(&run.id).unwrap().unwrap();
        assert_eq!(run.status, crate::run::RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_unknown_operation_marked_failed() {
        let f = fixture();
        let run = f.run_store.create_run(RunTrigger::Scheduled).unwrap();
        let entry = f
            .dlq_store
            .create_entry(NewDlqEntry {
                run_id: run.id.clone(),
                operation: DlqOperation::TextGeneration,
                error: "boom".to_string(),
                payload: json!({}),
                max_retries: 3,
            })
            .unwrap();
        // As if written by a newer build.
        let unknown = DlqEntry {
            operation: "thumbnail_generation".to_string(),
            ..entry.clone()
        };

        let status = f.processor.process_entry(&unknown).await.unwrap();
        assert_eq!(status, Some(DlqStatus::Failed));

        let stored = f.dlq_store.get(&entry.id).unwrap().unwrap();
        assert_eq!(stored.status, DlqStatus::Failed);
        assert_eq!(stored.error, "unknown DLQ operation: thumbnail_generation");
    }

    #[tokio::test]
    async fn test_malformed_payload_requeued_then_failed() {
        let f = fixture();
        let run = f.run_store.create_run(RunTrigger::Scheduled).unwrap();
        let entry = f
            .dlq_store
            .create_entry(NewDlqEntry {
                run_id: run.id.clone(),
                operation: DlqOperation::VideoGeneration,
                error: "boom".to_string(),
                payload: json!({ "garbage": true }),
                max_retries: 2,
            })
            .unwrap();

        let first = f.processor.process_once().await.unwrap();
        assert_eq!(first.requeued, 1);
        let stored = f.dlq_store.get(&entry.id).unwrap().unwrap();
        assert_eq!(stored.status, DlqStatus::Pending);
        assert_eq!(stored.retry_count, 1);

        let second = f.processor.process_once().await.unwrap();
        assert_eq!(second.failed, 1);
        let stored = f.dlq_store.get(&entry.id).unwrap().unwrap();
        assert_eq!(stored.status, DlqStatus::Failed);
        assert_eq!(stored.retry_count, 2);
        assert!(stored.error.contains("invalid replay payload"));

        let third = f.processor.process_once().await.unwrap();
        assert_eq!(third.scanned, 0);
    }

    #[tokio::test]
    async fn test_status_reports_last_pass() {
        let f = fixture();
        let status = f.processor.status().await;
        assert!(!status.running);
        assert!(status.last_report.is_none());

        f.processor.process_once().await.unwrap();
        let status = f.processor.status().await;
        assert!(status.last_run_at.is_some());
        assert_eq!(status.last_report, Some(DlqProcessReport::default()));
    }
}
