//! Orchestrator API handlers.

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;
use aurora_core::{DlqProcessorStatus, OrchestratorStatus, SchedulerStatus};

use crate::state::AppState;

/// Combined status of the orchestrator and both background loops
#[derive(Debug, Serialize)]
pub struct OrchestratorStatusResponse {
    pub orchestrator: OrchestratorStatus,
    pub scheduler: SchedulerStatus,
    pub dlq_processor: DlqProcessorStatus,
}

/// Get orchestrator status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<OrchestratorStatusResponse> {
    Json(OrchestratorStatusResponse {
        orchestrator: state.orchestrator().status(),
        scheduler: state.scheduler().status().await,
        dlq_processor: state.dlq_processor().status().await,
    })
}
