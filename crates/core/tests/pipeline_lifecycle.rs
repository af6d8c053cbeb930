//! Pipeline lifecycle integration tests.
//!
//! These tests run the orchestrator against mock capabilities and
//! file-backed stores:
//! - Run status transitions (running -> completed | failed)
//! - Retry exhaustion routed to the DLQ
//! - Asset and log persistence per stage
//! - Replay of a dead-lettered stage after the provider recovers

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use aurora_core::{
    dlq::{DlqFilter, DlqOperation, DlqStatus},
    run::{AssetStatus, AssetType, LogLevel, RunStatus, RunTrigger},
    stages::Stage,
    testing::{fixtures, MockFailure, MockStages, MockTextGenerator, MockVideo},
    Config, DlqProcessor, DlqStore, PipelineError, PipelineOrchestrator, RunStore,
    SqliteDlqStore, SqliteRunStore,
};

const PLATFORMS: &[&str] = &["twitter", "youtube"];

/// Test helper wiring the orchestrator to one database file.
struct TestHarness {
    config: Arc<Config>,
    run_store: Arc<dyn RunStore>,
    dlq_store: Arc<dyn DlqStore>,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = fixtures::config(temp_dir.path(), PLATFORMS);

        // Keep backoff short; timing is covered by the retry unit tests.
        config.retry.backoff_base_ms = 1;
        config.retry.rate_limit_backoff_base_ms = 2;

        let run_store = Arc::new(
            SqliteRunStore::new(&config.database.path).expect("Failed to create run store"),
        );
        let dlq_store = Arc::new(
            SqliteDlqStore::new(&config.database.path).expect("Failed to create DLQ store"),
        );

        Self {
            config: Arc::new(config),
            run_store,
            dlq_store,
            _temp_dir: temp_dir,
        }
    }

    fn orchestrator(&self, stages: &MockStages) -> PipelineOrchestrator {
        PipelineOrchestrator::new(
            Arc::clone(&self.config),
            Arc::clone(&self.run_store),
            Arc::clone(&self.dlq_store),
            Arc::new(stages.executor(&self.config.storage.runs_dir)),
        )
    }

    fn processor(&self, stages: &MockStages) -> DlqProcessor {
        DlqProcessor::new(
            self.config.dlq.clone(),
            Arc::clone(&self.dlq_store),
            Arc::clone(&self.run_store),
            Arc::new(stages.executor(&self.config.storage.runs_dir)),
        )
    }

    /// Poll until the run leaves `running`.
    async fn wait_for_terminal(&self, run_id: &str) -> RunStatus {
        for _ in 0..500 {
            let run = self.run_store.get_run(run_id).unwrap().unwrap();
            if run.status.is_terminal() {
                return run.status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run {} did not finish", run_id);
    }
}

#[tokio::test]
async fn test_all_stages_succeed() {
    let harness = TestHarness::new();
    let stages = MockStages::new(PLATFORMS);
    let orchestrator = harness.orchestrator(&stages);

    let run_id = orchestrator.run_pipeline(RunTrigger::Manual).await.unwrap();

    let detail = harness.run_store.get_run_detail(&run_id).unwrap().unwrap();
    assert_eq!(detail.run.status, RunStatus::Completed);
    assert!(detail.run.completed_at.is_some());
    assert!(detail.run.error.is_none());

    let types: Vec<_> = detail.assets.iter().map(|a| a.asset_type).collect();
    assert_eq!(types, vec![AssetType::Text, AssetType::Audio, AssetType::Video]);
    assert!(detail
        .assets
        .iter()
        .all(|a| a.status == AssetStatus::Distributed));

    // One receipt per configured platform, recorded on the distribution log.
    let distribution_log = detail
        .logs
        .iter()
        .find(|l| l.message == "distribution stage completed")
        .expect("distribution log");
    let receipts = distribution_log.metadata.as_ref().unwrap()["receipts"]
        .as_array()
        .unwrap()
        .clone();
    assert_eq!(receipts.len(), PLATFORMS.len());
    for publisher in &stages.publishers {
        assert_eq!(publisher.published_runs(), vec![run_id.clone()]);
    }

    // Artifacts land in the run directory.
    let run_dir = harness.config.storage.runs_dir.join(&run_id);
    assert!(run_dir.join("text/payload.json").exists());
    assert!(run_dir.join("audio/main.mp3").exists());
    assert!(run_dir.join("video/main.mp4").exists());

    assert_eq!(harness.dlq_store.count(&DlqFilter::new()).unwrap(), 0);
}

#[tokio::test]
async fn test_text_always_fails() {
    let harness = TestHarness::new();
    let mut stages = MockStages::new(PLATFORMS);
    stages.text = Arc::new(MockTextGenerator::new().failing(MockFailure::RateLimited));
    let orchestrator = harness.orchestrator(&stages);

    let err = orchestrator
        .run_pipeline(RunTrigger::Manual)
        .await
        .unwrap_err();
    match err {
        PipelineError::Stage { stage, source } => {
            assert_eq!(stage, Stage::Text);
            assert_eq!(source.attempts(), 3);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert_eq!(stages.text.call_count(), 3);
    assert_eq!(stages.voice.call_count(), 0);
    assert_eq!(stages.video.call_count(), 0);

    let runs = harness.run_store.list_runs(&Default::default()).unwrap();
    assert_eq!(runs.len(), 1);
    let detail = harness.run_store.get_run_detail(&runs[0].id).unwrap().unwrap();
    assert_eq!(detail.run.status, RunStatus::Failed);
    assert!(detail.run.completed_at.is_some());
    assert!(detail.run.error.as_deref().unwrap().contains("Rate limited"));
    assert!(detail.assets.is_empty());
    assert!(detail.logs.iter().any(|l| l.level == LogLevel::Error));

    let entries = harness.dlq_store.list(&DlqFilter::new()).unwrap();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.run_id, detail.run.id);
    assert_eq!(entry.operation_kind(), Some(DlqOperation::TextGeneration));
    assert_eq!(entry.status, DlqStatus::Pending);
    assert_eq!(entry.retry_count, 0);
    assert_eq!(entry.max_retries, harness.config.dlq.max_retries);
    assert_eq!(entry.payload["run_id"], detail.run.id.as_str());
    assert_eq!(entry.payload["topic"]["id"], "mock-topic");
    assert_eq!(entry.payload_hash.len(), 64);
}

#[tokio::test]
async fn test_transient_failure_recovers_without_dlq() {
    let harness = TestHarness::new();
    let mut stages = MockStages::new(PLATFORMS);
    stages.text = Arc::new(MockTextGenerator::new().failing_times(MockFailure::Http, 1));
    let orchestrator = harness.orchestrator(&stages);

    let run_id = orchestrator.run_pipeline(RunTrigger::Manual).await.unwrap();

    let run = harness.run_store.get_run(&run_id).unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(stages.text.call_count(), 2);
    assert_eq!(harness.dlq_store.count(&DlqFilter::new()).unwrap(), 0);
}

#[tokio::test]
async fn test_video_failure_keeps_earlier_assets() {
    let harness = TestHarness::new();
    let mut stages = MockStages::new(PLATFORMS);
    stages.video = Arc::new(MockVideo::new().failing(MockFailure::Timeout));
    let orchestrator = harness.orchestrator(&stages);

    orchestrator
        .run_pipeline(RunTrigger::Scheduled)
        .await
        .unwrap_err();

    let runs = harness.run_store.list_runs(&Default::default()).unwrap();
    let detail = harness.run_store.get_run_detail(&runs[0].id).unwrap().unwrap();
    assert_eq!(detail.run.status, RunStatus::Failed);

    let types: Vec<_> = detail.assets.iter().map(|a| a.asset_type).collect();
    assert_eq!(types, vec![AssetType::Text, AssetType::Audio]);
    assert!(detail
        .assets
        .iter()
        .all(|a| a.status == AssetStatus::Generated));

    let entries = harness.dlq_store.list(&DlqFilter::new()).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].operation, "video_generation");
    assert!(entries[0].payload["audio_path"]
        .as_str()
        .unwrap()
        .ends_with("main.mp3"));

    // Nothing was published.
    assert!(stages.publishers.iter().all(|p| p.call_count() == 0));
}

#[tokio::test]
async fn test_trigger_returns_immediately() {
    let harness = TestHarness::new();
    let stages = MockStages::new(PLATFORMS);
    let orchestrator = harness.orchestrator(&stages);

    let run_id = orchestrator.trigger(RunTrigger::Api).await.unwrap();
    let run = harness.run_store.get_run(&run_id).unwrap().unwrap();
    assert_eq!(run.trigger, RunTrigger::Api);

    assert_eq!(harness.wait_for_terminal(&run_id).await, RunStatus::Completed);

    // Guard released once the spawned run finished.
    let second = orchestrator.trigger(RunTrigger::Api).await.unwrap();
    assert_ne!(second, run_id);
    harness.wait_for_terminal(&second).await;
}

#[tokio::test]
async fn test_dead_lettered_stage_replayed_after_recovery() {
    let harness = TestHarness::new();

    let mut broken = MockStages::new(PLATFORMS);
    broken.text = Arc::new(MockTextGenerator::new().failing(MockFailure::Api(503)));
    harness
        .orchestrator(&broken)
        .run_pipeline(RunTrigger::Manual)
        .await
        .unwrap_err();

    let healthy = MockStages::new(PLATFORMS);
    let report = harness.processor(&healthy).process_once().await.unwrap();
    assert_eq!(report.resolved, 1);

    let entries = harness.dlq_store.list(&DlqFilter::new()).unwrap();
    assert_eq!(entries[0].status, DlqStatus::Resolved);
    assert_eq!(entries[0].retry_count, 1);

    let detail = harness
        .run_store
        .get_run_detail(&entries[0].run_id)
        .unwrap()
        .unwrap();
    // Replay adds the artifact but never rewrites the run's outcome.
    assert_eq!(detail.run.status, RunStatus::Failed);
    assert_eq!(detail.assets.len(), 1);
    assert_eq!(detail.assets[0].asset_type, AssetType::Text);
    assert_eq!(healthy.text.call_count(), 1);
}
