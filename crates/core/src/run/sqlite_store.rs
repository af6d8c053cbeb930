//! SQLite-backed run store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::{format_ts, open, open_in_memory, parse_ts};

use super::{
    Asset, AssetStatus, AssetType, LogEntry, LogLevel, NewAsset, NewLogEntry, Run, RunFilter,
    RunStatus, RunStore, RunTrigger, StoreError,
};

const RUN_COLUMNS: &str = "id, status, trigger, started_at, completed_at, error";

/// SQLite-backed run store.
pub struct SqliteRunStore {
    conn: Mutex<Connection>,
}

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

impl SqliteRunStore {
    /// Create a new SQLite run store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = open(path).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite run store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL DEFAULT 'pending',
                trigger TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                error TEXT
            );

            CREATE TABLE IF NOT EXISTS pipeline_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL REFERENCES runs(id),
                level TEXT NOT NULL,
                message TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                metadata TEXT
            );

            CREATE TABLE IF NOT EXISTS assets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL REFERENCES runs(id),
                type TEXT NOT NULL,
                path TEXT,
                metadata TEXT,
                status TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at DESC);
            CREATE INDEX IF NOT EXISTS idx_runs_status ON runs(status);
            CREATE INDEX IF NOT EXISTS idx_logs_run_id ON pipeline_logs(run_id, timestamp);
            CREATE INDEX IF NOT EXISTS idx_assets_run_id ON assets(run_id);
            "#,
        )
        .map_err(db_err)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".to_string()))
    }

    fn build_where_clause(filter: &RunFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<Run> {
        let id: String = row.get(0)?;
        let status: String = row.get(1)?;
        let trigger: String = row.get(2)?;
        let started_at: String = row.get(3)?;
        let completed_at: Option<String> = row.get(4)?;
        let error: Option<String> = row.get(5)?;

        Ok(Run {
            id,
            status: RunStatus::parse(&status).unwrap_or(RunStatus::Failed),
            trigger: RunTrigger::parse(&trigger).unwrap_or(RunTrigger::Manual),
            started_at: parse_ts(&started_at).unwrap_or_else(Utc::now),
            completed_at: completed_at.as_deref().and_then(parse_ts),
            error,
        })
    }

    fn row_to_log(row: &rusqlite::Row) -> rusqlite::Result<LogEntry> {
        let level: String = row.get(2)?;
        let timestamp: String = row.get(4)?;
        let metadata: Option<String> = row.get(5)?;

        Ok(LogEntry {
            id: row.get(0)?,
            run_id: row.get(1)?,
            level: LogLevel::parse(&level).unwrap_or(LogLevel::Info),
            message: row.get(3)?,
            timestamp: parse_ts(&timestamp).unwrap_or_else(Utc::now),
            metadata: metadata.and_then(|json| serde_json::from_str(&json).ok()),
        })
    }

    fn row_to_asset(row: &rusqlite::Row) -> rusqlite::Result<Asset> {
        let asset_type: String = row.get(2)?;
        let metadata: Option<String> = row.get(4)?;
        let status: String = row.get(5)?;

        Ok(Asset {
            id: row.get(0)?,
            run_id: row.get(1)?,
            asset_type: AssetType::parse(&asset_type).unwrap_or(AssetType::Text),
            path: row.get(3)?,
            metadata: metadata.and_then(|json| serde_json::from_str(&json).ok()),
            status: AssetStatus::parse(&status).unwrap_or(AssetStatus::Failed),
        })
    }

    fn fetch_run(conn: &Connection, id: &str) -> Result<Option<Run>, StoreError> {
        conn.query_row(
            &format!("SELECT {} FROM runs WHERE id = ?", RUN_COLUMNS),
            params![id],
            Self::row_to_run,
        )
        .optional()
        .map_err(db_err)
    }

    /// Move a running run into a terminal status.
    fn finish_run(
        &self,
        id: &str,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<Run, StoreError> {
        let conn = self.conn()?;
        let now = format_ts(Utc::now());

        let updated = conn
            .execute(
                "UPDATE runs SET status = ?, completed_at = ?, error = ? WHERE id = ? AND status = 'running'",
                params![status.as_str(), now, error, id],
            )
            .map_err(db_err)?;

        match Self::fetch_run(&conn, id)? {
            Some(run) if updated == 1 => Ok(run),
            Some(run) => Err(StoreError::InvalidState {
                run_id: id.to_string(),
                current_status: run.status.as_str().to_string(),
                operation: format!("mark {}", status.as_str()),
            }),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }
}

impl RunStore for SqliteRunStore {
    fn create_run(&self, trigger: RunTrigger) -> Result<Run, StoreError> {
        let conn = self.conn()?;

        let run = Run {
            id: uuid::Uuid::new_v4().to_string(),
            status: RunStatus::Running,
            trigger,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        };

        conn.execute(
            "INSERT INTO runs (id, status, trigger, started_at) VALUES (?, ?, ?, ?)",
            params![
                run.id,
                run.status.as_str(),
                trigger.as_str(),
                format_ts(run.started_at),
            ],
        )
        .map_err(db_err)?;

        Ok(run)
    }

    fn get_run(&self, id: &str) -> Result<Option<Run>, StoreError> {
        let conn = self.conn()?;
        Self::fetch_run(&conn, id)
    }

    fn list_runs(&self, filter: &RunFilter) -> Result<Vec<Run>, StoreError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!(
            "SELECT {} FROM runs {} ORDER BY started_at DESC, rowid DESC LIMIT ? OFFSET ?",
            RUN_COLUMNS, where_clause
        );

        let mut stmt = conn.prepare(&sql).map_err(db_err)?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_run)
            .map_err(db_err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    fn count_runs(&self, filter: &RunFilter) -> Result<i64, StoreError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM runs {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(db_err)
    }

    fn complete_run(&self, id: &str) -> Result<Run, StoreError> {
        self.finish_run(id, RunStatus::Completed, None)
    }

    fn fail_run(&self, id: &str, error: &str) -> Result<Run, StoreError> {
        self.finish_run(id, RunStatus::Failed, Some(error))
    }

    fn append_log(&self, entry: NewLogEntry) -> Result<LogEntry, StoreError> {
        let conn = self.conn()?;
        let timestamp = Utc::now();

        let metadata_json = entry
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO pipeline_logs (run_id, level, message, timestamp, metadata) VALUES (?, ?, ?, ?, ?)",
            params![
                entry.run_id,
                entry.level.as_str(),
                entry.message,
                format_ts(timestamp),
                metadata_json,
            ],
        )
        .map_err(db_err)?;

        Ok(LogEntry {
            id: conn.last_insert_rowid(),
            run_id: entry.run_id,
            level: entry.level,
            message: entry.message,
            timestamp,
            metadata: entry.metadata,
        })
    }

    fn list_logs(&self, run_id: &str) -> Result<Vec<LogEntry>, StoreError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                "SELECT id, run_id, level, message, timestamp, metadata FROM pipeline_logs WHERE run_id = ? ORDER BY timestamp ASC, id ASC",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![run_id], Self::row_to_log)
            .map_err(db_err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    fn create_asset(&self, asset: NewAsset) -> Result<Asset, StoreError> {
        let conn = self.conn()?;

        let metadata_json = asset
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO assets (run_id, type, path, metadata, status) VALUES (?, ?, ?, ?, ?)",
            params![
                asset.run_id,
                asset.asset_type.as_str(),
                asset.path,
                metadata_json,
                asset.status.as_str(),
            ],
        )
        .map_err(db_err)?;

        Ok(Asset {
            id: conn.last_insert_rowid(),
            run_id: asset.run_id,
            asset_type: asset.asset_type,
            path: asset.path,
            metadata: asset.metadata,
            status: asset.status,
        })
    }

    fn set_assets_status(&self, run_id: &str, status: AssetStatus) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE assets SET status = ? WHERE run_id = ?",
            params![status.as_str(), run_id],
        )
        .map_err(db_err)
    }

    fn list_assets(&self, run_id: &str) -> Result<Vec<Asset>, StoreError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                "SELECT id, run_id, type, path, metadata, status FROM assets WHERE run_id = ? ORDER BY id ASC",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![run_id], Self::row_to_asset)
            .map_err(db_err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_test_store() -> SqliteRunStore {
        SqliteRunStore::in_memory().unwrap()
    }

    fn info(run_id: &str, message: &str) -> NewLogEntry {
        NewLogEntry {
            run_id: run_id.to_string(),
            level: LogLevel::Info,
            message: message.to_string(),
            metadata: None,
        }
    }

    #[test]
    fn test_create_run_starts_running() {
        let store = create_test_store();
        let run = store.create_run(RunTrigger::Manual).unwrap();

        assert!(!run.id.is_empty());
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.completed_at.is_none());

        let fetched = store.get_run(&run.id).unwrap().unwrap();
        assert_eq!(fetched.id, run.id);
        assert_eq!(fetched.status, RunStatus::Running);
        assert_eq!(fetched.trigger, RunTrigger::Manual);
    }

    #[test]
    fn test_get_nonexistent_run() {
        let store = create_test_store();
        assert!(store.get_run("nonexistent-id").unwrap().is_none());
        assert!(store.get_run_detail("nonexistent-id").unwrap().is_none());
    }

    #[test]
    fn test_complete_run_sets_completed_at() {
        let store = create_test_store();
        let run = store.create_run(RunTrigger::Scheduled).unwrap();

        let completed = store.complete_run(&run.id).unwrap();
        assert_eq!(completed.status, RunStatus::Completed);
        assert!(completed.completed_at.is_some());
        assert!(completed.error.is_none());
    }

    #[test]
    fn test_fail_run_records_error() {
        let store = create_test_store();
        let run = store.create_run(RunTrigger::Manual).unwrap();

        let failed = store.fail_run(&run.id, "voice provider down").unwrap();
        assert_eq!(failed.status, RunStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("voice provider down"));
        assert!(failed.completed_at.is_some());
    }

    #[test]
    fn test_terminal_run_is_immutable() {
        let store = create_test_store();
        let run = store.create_run(RunTrigger::Manual).unwrap();
        store.complete_run(&run.id).unwrap();

        let again = store.fail_run(&run.id, "late failure");
        assert!(matches!(again, Err(StoreError::InvalidState { .. })));

        let twice = store.complete_run(&run.id);
        assert!(matches!(twice, Err(StoreError::InvalidState { .. })));

        let fetched = store.get_run(&run.id).unwrap().unwrap();
        assert_eq!(fetched.status, RunStatus::Completed);
        assert!(fetched.error.is_none());
    }

    #[test]
    fn test_finish_unknown_run() {
        let store = create_test_store();
        let result = store.complete_run("missing");
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_list_and_count_with_status_filter() {
        let store = create_test_store();
        let a = store.create_run(RunTrigger::Manual).unwrap();
        let b = store.create_run(RunTrigger::Manual).unwrap();
        store.create_run(RunTrigger::Scheduled).unwrap();
        store.complete_run(&a.id).unwrap();
        store.fail_run(&b.id, "boom").unwrap();

        assert_eq!(store.count_runs(&RunFilter::new()).unwrap(), 3);
        let failed = store
            .list_runs(&RunFilter::new().with_status(RunStatus::Failed))
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, b.id);
        assert_eq!(
            store
                .count_runs(&RunFilter::new().with_status(RunStatus::Running))
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_list_runs_newest_first_with_pagination() {
        let store = create_test_store();
        let ids: Vec<String> = (0..5)
            .map(|_| store.create_run(RunTrigger::Manual).unwrap().id)
            .collect();

        let page = store
            .list_runs(&RunFilter::new().with_limit(2).with_offset(0))
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, ids[4]);

        let last = store
            .list_runs(&RunFilter::new().with_limit(2).with_offset(4))
            .unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].id, ids[0]);
    }

    #[test]
    fn test_logs_are_append_only_and_ordered() {
        let store = create_test_store();
        let run = store.create_run(RunTrigger::Manual).unwrap();

        store.append_log(info(&run.id, "Pipeline started")).unwrap();
        store
            .append_log(NewLogEntry {
                run_id: run.id.clone(),
                level: LogLevel::Warn,
                message: "Using placeholder audio".to_string(),
                metadata: Some(json!({ "stage": "audio" })),
            })
            .unwrap();
        store.append_log(info(&run.id, "Pipeline completed")).unwrap();

        let logs = store.list_logs(&run.id).unwrap();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].message, "Pipeline started");
        assert_eq!(logs[1].level, LogLevel::Warn);
        assert_eq!(logs[1].metadata, Some(json!({ "stage": "audio" })));
        assert_eq!(logs[2].message, "Pipeline completed");
    }

    #[test]
    fn test_log_for_unknown_run_is_rejected() {
        let store = create_test_store();
        let result = store.append_log(info("ghost-run", "hello"));
        assert!(matches!(result, Err(StoreError::Database(_))));
    }

    #[test]
    fn test_assets_scoped_to_run() {
        let store = create_test_store();
        let run = store.create_run(RunTrigger::Manual).unwrap();
        let other = store.create_run(RunTrigger::Manual).unwrap();

        store
            .create_asset(NewAsset {
                run_id: run.id.clone(),
                asset_type: AssetType::Text,
                path: None,
                metadata: Some(json!({ "primary": "script" })),
                status: AssetStatus::Generated,
            })
            .unwrap();
        store
            .create_asset(NewAsset {
                run_id: run.id.clone(),
                asset_type: AssetType::Audio,
                path: Some("runs/x/audio/main.mp3".to_string()),
                metadata: None,
                status: AssetStatus::Generated,
            })
            .unwrap();

        let assets = store.list_assets(&run.id).unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].asset_type, AssetType::Text);
        assert_eq!(assets[0].metadata, Some(json!({ "primary": "script" })));
        assert!(store.list_assets(&other.id).unwrap().is_empty());

        let touched = store
            .set_assets_status(&run.id, AssetStatus::Distributed)
            .unwrap();
        assert_eq!(touched, 2);
        assert!(store
            .list_assets(&run.id)
            .unwrap()
            .iter()
            .all(|a| a.status == AssetStatus::Distributed));
    }

    #[test]
    fn test_run_detail_includes_logs_and_assets() {
        let store = create_test_store();
        let run = store.create_run(RunTrigger::Manual).unwrap();
        store.append_log(info(&run.id, "Pipeline started")).unwrap();
        store
            .create_asset(NewAsset {
                run_id: run.id.clone(),
                asset_type: AssetType::Video,
                path: Some("runs/x/video/main.mp4".to_string()),
                metadata: None,
                status: AssetStatus::Generated,
            })
            .unwrap();

        let detail = store.get_run_detail(&run.id).unwrap().unwrap();
        assert_eq!(detail.run.id, run.id);
        assert_eq!(detail.logs.len(), 1);
        assert_eq!(detail.assets.len(), 1);
    }

    #[test]
    fn test_file_based_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("aurora.db");

        let store = SqliteRunStore::new(&db_path).unwrap();
        let run = store.create_run(RunTrigger::Manual).unwrap();
        assert!(db_path.exists());
        drop(store);

        let reopened = SqliteRunStore::new(&db_path).unwrap();
        assert!(reopened.get_run(&run.id).unwrap().is_some());
    }
}
