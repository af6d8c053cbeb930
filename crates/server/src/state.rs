use std::sync::Arc;

use aurora_core::{
    Config, DlqProcessor, DlqStore, PipelineOrchestrator, RunStore, SanitizedConfig, Scheduler,
    StageExecutor,
};

/// Shared application state
pub struct AppState {
    config: Arc<Config>,
    run_store: Arc<dyn RunStore>,
    dlq_store: Arc<dyn DlqStore>,
    orchestrator: PipelineOrchestrator,
    scheduler: Scheduler,
    dlq_processor: DlqProcessor,
}

impl AppState {
    /// Wire the orchestrator, scheduler and DLQ processor around one
    /// executor. Nothing is started here.
    pub fn new(
        config: Config,
        run_store: Arc<dyn RunStore>,
        dlq_store: Arc<dyn DlqStore>,
        executor: Arc<StageExecutor>,
    ) -> Self {
        let config = Arc::new(config);

        let orchestrator = PipelineOrchestrator::new(
            Arc::clone(&config),
            Arc::clone(&run_store),
            Arc::clone(&dlq_store),
            Arc::clone(&executor),
        );
        let scheduler = Scheduler::new(
            config.pipeline.enabled,
            config.scheduler.clone(),
            orchestrator.clone(),
        );
        let dlq_processor = DlqProcessor::new(
            config.dlq.clone(),
            Arc::clone(&dlq_store),
            Arc::clone(&run_store),
            executor,
        );

        Self {
            config,
            run_store,
            dlq_store,
            orchestrator,
            scheduler,
            dlq_processor,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(self.config.as_ref())
    }

    pub fn run_store(&self) -> &dyn RunStore {
        self.run_store.as_ref()
    }

    pub fn dlq_store(&self) -> &dyn DlqStore {
        self.dlq_store.as_ref()
    }

    pub fn orchestrator(&self) -> &PipelineOrchestrator {
        &self.orchestrator
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn dlq_processor(&self) -> &DlqProcessor {
        &self.dlq_processor
    }
}
