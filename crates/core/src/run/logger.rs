use std::sync::Arc;

use tracing::{error, info, warn};

use super::{LogLevel, NewLogEntry, RunStore};

/// Writes run-scoped log lines to the store and mirrors them to tracing.
///
/// A failed write is reported through tracing only; logging never fails
/// the caller.
#[derive(Clone)]
pub struct RunLogger {
    store: Arc<dyn RunStore>,
    run_id: String,
}

impl RunLogger {
    pub fn new(store: Arc<dyn RunStore>, run_id: impl Into<String>) -> Self {
        Self {
            store,
            run_id: run_id.into(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn info(&self, message: &str, metadata: Option<serde_json::Value>) {
        self.log(LogLevel::Info, message, metadata);
    }

    pub fn warn(&self, message: &str, metadata: Option<serde_json::Value>) {
        self.log(LogLevel::Warn, message, metadata);
    }

    pub fn error(&self, message: &str, metadata: Option<serde_json::Value>) {
        self.log(LogLevel::Error, message, metadata);
    }

    pub fn log(&self, level: LogLevel, message: &str, metadata: Option<serde_json::Value>) {
        let run_id = self.run_id.as_str();
        match level {
            LogLevel::Info => info!(run_id, "{}", message),
            LogLevel::Warn => warn!(run_id, "{}", message),
            LogLevel::Error => error!(run_id, "{}", message),
        }

        let entry = NewLogEntry {
            run_id: self.run_id.clone(),
            level,
            message: message.to_string(),
            metadata,
        };
        if let Err(e) = self.store.append_log(entry) {
            warn!(run_id, error = %e, "Failed to persist run log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::{RunTrigger, SqliteRunStore};
    use serde_json::json;

    #[test]
    fn test_logger_persists_entries() {
        let store: Arc<dyn RunStore> = Arc::new(SqliteRunStore::in_memory().unwrap());
        let run = store.create_run(RunTrigger::Manual).unwrap();
        let logger = RunLogger::new(Arc::clone(&store), run.id.clone());

        logger.info("Pipeline started", None);
        logger.warn("Using placeholder", Some(json!({ "stage": "video" })));
        logger.error("Pipeline failed", None);

        let logs = store.list_logs(&run.id).unwrap();
        let levels: Vec<_> = logs.iter().map(|l| l.level).collect();
        assert_eq!(levels, vec![LogLevel::Info, LogLevel::Warn, LogLevel::Error]);
        assert_eq!(logs[1].metadata, Some(json!({ "stage": "video" })));
    }

    #[test]
    fn test_logger_swallows_store_errors() {
        let store: Arc<dyn RunStore> = Arc::new(SqliteRunStore::in_memory().unwrap());
        let logger = RunLogger::new(store, "missing-run");
        // Foreign key violation is logged, not raised.
        logger.info("orphan line", None);
    }
}
