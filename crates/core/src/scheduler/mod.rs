//! Time-based pipeline trigger.
//!
//! Fires [`PipelineOrchestrator::trigger`] every `scheduler.interval_secs`
//! while `pipeline.enabled` is set. A tick that finds a run still active is
//! skipped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;
use crate::orchestrator::{PipelineError, PipelineOrchestrator};
use crate::run::RunTrigger;

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// A run was started.
    Triggered(String),
    /// Another run was active.
    Skipped(String),
    /// The trigger failed, e.g. on invalid configuration.
    Failed(String),
}

/// Scheduler state for the monitoring surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub enabled: bool,
    pub running: bool,
    pub interval_secs: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_run_id: Option<String>,
    pub next_tick_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct TickState {
    last_tick_at: Option<DateTime<Utc>>,
    last_run_id: Option<String>,
    next_tick_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct Scheduler {
    enabled: bool,
    config: SchedulerConfig,
    orchestrator: PipelineOrchestrator,

    // Runtime state
    running: Arc<AtomicBool>,
    state: Arc<RwLock<TickState>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Scheduler {
    /// `enabled` is `pipeline.enabled`; a disabled scheduler never fires.
    pub fn new(enabled: bool, config: SchedulerConfig, orchestrator: PipelineOrchestrator) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            enabled,
            config,
            orchestrator,
            running: Arc::new(AtomicBool::new(false)),
            state: Arc::new(RwLock::new(TickState::default())),
            shutdown_tx,
        }
    }

    /// Start the background loop. No-op when disabled or already running.
    pub async fn start(&self) {
        if !self.enabled {
            info!("Pipeline disabled, scheduler not started");
            return;
        }
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Scheduler already running");
            return;
        }

        self.spawn_loop();
        info!(
            interval_secs = self.config.interval_secs,
            run_on_start = self.config.run_on_start,
            "Scheduler started"
        );
    }

    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(());
        self.state.write().await.next_tick_at = None;
        info!("Scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub async fn status(&self) -> SchedulerStatus {
        let state = self.state.read().await;
        SchedulerStatus {
            enabled: self.enabled,
            running: self.is_running(),
            interval_secs: self.config.interval_secs,
            last_tick_at: state.last_tick_at,
            last_run_id: state.last_run_id.clone(),
            next_tick_at: state.next_tick_at,
        }
    }

    fn spawn_loop(&self) {
        let scheduler = self.clone();
        let interval = Duration::from_secs(self.config.interval_secs);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Scheduler loop started");
            if scheduler.config.run_on_start {
                scheduler.tick().await;
            }
            loop {
                if !scheduler.is_running() {
                    break;
                }
                scheduler.state.write().await.next_tick_at = next_tick(interval);

                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Scheduler loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !scheduler.is_running() {
                            break;
                        }
                        scheduler.tick().await;
                    }
                }
            }
            info!("Scheduler loop stopped");
        });
    }

    /// Trigger one scheduled run.
    pub async fn tick(&self) -> TickOutcome {
        let outcome = match self.orchestrator.trigger(RunTrigger::Scheduled).await {
            Ok(run_id) => {
                info!(run_id = %run_id, "Scheduled run triggered");
                TickOutcome::Triggered(run_id)
            }
            Err(PipelineError::AlreadyRunning(active)) => {
                info!(active_run = %active, "Run still active, skipping scheduled tick");
                TickOutcome::Skipped(active)
            }
            Err(e) => {
                error!(error = %e, "Scheduled trigger failed");
                TickOutcome::Failed(e.to_string())
            }
        };

        let mut state = self.state.write().await;
        state.last_tick_at = Some(Utc::now());
        if let TickOutcome::Triggered(ref run_id) = outcome {
            state.last_run_id = Some(run_id.clone());
        }
        outcome
    }
}

fn next_tick(interval: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(interval)
        .ok()
        .and_then(|interval| Utc::now().checked_add_signed(interval))
}
