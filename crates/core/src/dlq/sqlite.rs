//! SQLite-backed DLQ store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{ffi, params, Connection, OptionalExtension};

use crate::db::{format_ts, open, open_in_memory, parse_ts};

use super::hash::payload_hash;
use super::store::{DlqError, DlqStore};
use super::{DlqEntry, DlqFilter, DlqStatus, DlqUpdate, NewDlqEntry};

const ENTRY_COLUMNS: &str = "id, run_id, operation, status, error, payload, payload_hash, \
     retry_count, max_retries, last_retry_at, created_at, updated_at";

/// SQLite-backed DLQ store.
pub struct SqliteDlqStore {
    conn: Mutex<Connection>,
}

fn db_err(e: rusqlite::Error) -> DlqError {
    DlqError::Database(e.to_string())
}

impl SqliteDlqStore {
    /// Open (or create) the DLQ tables in the given database file.
    pub fn new(path: &Path) -> Result<Self, DlqError> {
        let conn = open(path).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory DLQ store (useful for testing).
    pub fn in_memory() -> Result<Self, DlqError> {
        let conn = open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), DlqError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS dlq_entries (
                id TEXT PRIMARY KEY,
                run_id TEXT NOT NULL REFERENCES runs(id),
                operation TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                error TEXT NOT NULL,
                payload TEXT NOT NULL,
                payload_hash TEXT NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL DEFAULT 3,
                last_retry_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_dlq_run_operation ON dlq_entries(run_id, operation);
            CREATE INDEX IF NOT EXISTS idx_dlq_status ON dlq_entries(status, retry_count);
            "#,
        )
        .map_err(db_err)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DlqError> {
        self.conn
            .lock()
            .map_err(|_| DlqError::Database("connection lock poisoned".to_string()))
    }

    fn build_where_clause(filter: &DlqFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str()));
        }

        if let Some(ref operation) = filter.operation {
            conditions.push("operation = ?");
            params.push(Box::new(operation.clone()));
        }

        if let Some(ref run_id) = filter.run_id {
            conditions.push("run_id = ?");
            params.push(Box::new(run_id.clone()));
        }

        if filter.retryable_only {
            conditions.push("retry_count < max_retries");
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<DlqEntry> {
        let status: String = row.get(3)?;
        let payload: String = row.get(5)?;
        let last_retry_at: Option<String> = row.get(9)?;
        let created_at: String = row.get(10)?;
        let updated_at: String = row.get(11)?;

        Ok(DlqEntry {
            id: row.get(0)?,
            run_id: row.get(1)?,
            operation: row.get(2)?,
            status: DlqStatus::parse(&status).unwrap_or(DlqStatus::Failed),
            error: row.get(4)?,
            payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
            payload_hash: row.get(6)?,
            retry_count: row.get(7)?,
            max_retries: row.get(8)?,
            last_retry_at: last_retry_at.as_deref().and_then(parse_ts),
            created_at: parse_ts(&created_at).unwrap_or_else(Utc::now),
            updated_at: parse_ts(&updated_at).unwrap_or_else(Utc::now),
        })
    }

    fn fetch(conn: &Connection, id: &str) -> Result<Option<DlqEntry>, DlqError> {
        conn.query_row(
            &format!("SELECT {} FROM dlq_entries WHERE id = ?", ENTRY_COLUMNS),
            params![id],
            Self::row_to_entry,
        )
        .optional()
        .map_err(db_err)
    }

    /// Re-read a row after a conditional update, mapping "no rows changed"
    /// to `NotFound` or `InvalidState`.
    fn after_transition(
        conn: &Connection,
        id: &str,
        updated: usize,
        operation: &str,
    ) -> Result<DlqEntry, DlqError> {
        match Self::fetch(conn, id)? {
            Some(entry) if updated == 1 => Ok(entry),
            Some(entry) => Err(DlqError::InvalidState {
                id: id.to_string(),
                current_status: entry.status.as_str().to_string(),
                operation: operation.to_string(),
            }),
            None => Err(DlqError::NotFound(id.to_string())),
        }
    }
}

impl DlqStore for SqliteDlqStore {
    fn create_entry(&self, entry: NewDlqEntry) -> Result<DlqEntry, DlqError> {
        let conn = self.conn()?;
        let now = Utc::now();

        let record = DlqEntry {
            id: uuid::Uuid::new_v4().to_string(),
            run_id: entry.run_id,
            operation: entry.operation.as_str().to_string(),
            status: DlqStatus::Pending,
            error: entry.error,
            payload_hash: payload_hash(&entry.payload),
            payload: entry.payload,
            retry_count: 0,
            max_retries: entry.max_retries,
            last_retry_at: None,
            created_at: now,
            updated_at: now,
        };

        let payload_json = serde_json::to_string(&record.payload)
            .map_err(|e| DlqError::Serialization(e.to_string()))?;

        let result = conn.execute(
            r#"INSERT INTO dlq_entries
               (id, run_id, operation, status, error, payload, payload_hash, retry_count, max_retries, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                record.id,
                record.run_id,
                record.operation,
                record.status.as_str(),
                record.error,
                payload_json,
                record.payload_hash,
                record.retry_count,
                record.max_retries,
                format_ts(now),
                format_ts(now),
            ],
        );

        match result {
            Ok(_) => Ok(record),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Err(DlqError::Duplicate {
                    run_id: record.run_id,
                    operation: record.operation,
                })
            }
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.extended_code == ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
            {
                Err(DlqError::UnknownRun(record.run_id))
            }
            Err(e) => Err(db_err(e)),
        }
    }

    fn check_exists(&self, run_id: &str, operation: &str) -> Result<bool, DlqError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM dlq_entries WHERE run_id = ? AND operation = ?)",
            params![run_id, operation],
            |row| row.get(0),
        )
        .map_err(db_err)
    }

    fn update_entry(&self, id: &str, update: DlqUpdate) -> Result<DlqEntry, DlqError> {
        let conn = self.conn()?;

        let mut sets = vec!["updated_at = ?"];
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(format_ts(Utc::now()))];

        if let Some(status) = update.status {
            sets.push("status = ?");
            params.push(Box::new(status.as_str()));
        }
        if let Some(error) = update.error {
            sets.push("error = ?");
            params.push(Box::new(error));
        }
        if let Some(retry_count) = update.retry_count {
            sets.push("retry_count = ?");
            params.push(Box::new(retry_count));
        }
        if let Some(max_retries) = update.max_retries {
            sets.push("max_retries = ?");
            params.push(Box::new(max_retries));
        }
        if let Some(payload) = update.payload {
            let json = serde_json::to_string(&payload)
                .map_err(|e| DlqError::Serialization(e.to_string()))?;
            sets.push("payload = ?");
            params.push(Box::new(json));
            sets.push("payload_hash = ?");
            params.push(Box::new(payload_hash(&payload)));
        }
        params.push(Box::new(id.to_string()));

        let sql = format!("UPDATE dlq_entries SET {} WHERE id = ?", sets.join(", "));
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let updated = conn.execute(&sql, param_refs.as_slice()).map_err(db_err)?;

        if updated == 0 {
            return Err(DlqError::NotFound(id.to_string()));
        }
        Self::fetch(&conn, id)?.ok_or_else(|| DlqError::NotFound(id.to_string()))
    }

    fn get(&self, id: &str) -> Result<Option<DlqEntry>, DlqError> {
        let conn = self.conn()?;
        Self::fetch(&conn, id)
    }

    fn list(&self, filter: &DlqFilter) -> Result<Vec<DlqEntry>, DlqError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!(
            "SELECT {} FROM dlq_entries {} ORDER BY created_at ASC, rowid ASC LIMIT ? OFFSET ?",
            ENTRY_COLUMNS, where_clause
        );

        let mut stmt = conn.prepare(&sql).map_err(db_err)?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_entry)
            .map_err(db_err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    fn count(&self, filter: &DlqFilter) -> Result<i64, DlqError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM dlq_entries {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(db_err)
    }

    fn claim_for_retry(&self, id: &str) -> Result<Option<DlqEntry>, DlqError> {
        let conn = self.conn()?;
        let now = format_ts(Utc::now());

        let updated = conn
            .execute(
                r#"UPDATE dlq_entries
                   SET status = 'retrying', retry_count = retry_count + 1, last_retry_at = ?, updated_at = ?
                   WHERE id = ? AND status = 'pending' AND retry_count < max_retries"#,
                params![now, now, id],
            )
            .map_err(db_err)?;

        if updated == 0 {
            return Ok(None);
        }
        Self::fetch(&conn, id)
    }

    fn release(&self, id: &str, error: &str) -> Result<DlqEntry, DlqError> {
        let conn = self.conn()?;
        let now = format_ts(Utc::now());

        let updated = conn
            .execute(
                r#"UPDATE dlq_entries
                   SET status = CASE WHEN retry_count >= max_retries THEN 'failed' ELSE 'pending' END,
                       error = ?, updated_at = ?
                   WHERE id = ? AND status = 'retrying'"#,
                params![error, now, id],
            )
            .map_err(db_err)?;

        Self::after_transition(&conn, id, updated, "release")
    }

    fn resolve(&self, id: &str) -> Result<DlqEntry, DlqError> {
        let conn = self.conn()?;
        let now = format_ts(Utc::now());

        let updated = conn
            .execute(
                "UPDATE dlq_entries SET status = 'resolved', updated_at = ? WHERE id = ? AND status = 'retrying'",
                params![now, id],
            )
            .map_err(db_err)?;

        Self::after_transition(&conn, id, updated, "resolve")
    }

    fn requeue_stale(&self, older_than: DateTime<Utc>) -> Result<usize, DlqError> {
        let conn = self.conn()?;
        let now = format_ts(Utc::now());

        conn.execute(
            r#"UPDATE dlq_entries
               SET status = CASE WHEN retry_count >= max_retries THEN 'failed' ELSE 'pending' END,
                   updated_at = ?
               WHERE status = 'retrying' AND (last_retry_at IS NULL OR last_retry_at < ?)"#,
            params![now, format_ts(older_than)],
        )
        .map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dlq::{enqueue_dead_letter, DlqOperation, EnqueueOutcome};
    use serde_json::json;

    fn create_test_store() -> SqliteDlqStore {
        SqliteDlqStore::in_memory().unwrap()
    }

    fn new_entry(run_id: &str, operation: DlqOperation) -> NewDlqEntry {
        NewDlqEntry {
            run_id: run_id.to_string(),
            operation,
            error: "provider returned 503".to_string(),
            payload: json!({ "run_id": run_id, "topic": { "label": "AI" } }),
            max_retries: 3,
        }
    }

    #[test]
    fn test_create_entry_defaults() {
        let store = create_test_store();
        let entry = store
            .create_entry(new_entry("run-1", DlqOperation::TextGeneration))
            .unwrap();

        assert_eq!(entry.status, DlqStatus::Pending);
        assert_eq!(entry.retry_count, 0);
        assert_eq!(entry.max_retries, 3);
        assert_eq!(entry.operation, "text_generation");
        assert_eq!(entry.payload_hash, payload_hash(&entry.payload));
        assert!(entry.last_retry_at.is_none());

        let fetched = store.get(&entry.id).unwrap().unwrap();
        assert_eq!(fetched.payload, json!({ "run_id": "run-1", "topic": { "label": "AI" } }));
    }

    #[test]
    fn test_unique_per_run_and_operation() {
        let store = create_test_store();
        store
            .create_entry(new_entry("run-1", DlqOperation::TextGeneration))
            .unwrap();

        let dup = store.create_entry(new_entry("run-1", DlqOperation::TextGeneration));
        assert!(matches!(dup, Err(DlqError::Duplicate { .. })));

        // Same run, different operation is fine.
        store
            .create_entry(new_entry("run-1", DlqOperation::Distribution))
            .unwrap();
        assert_eq!(store.count(&DlqFilter::new()).unwrap(), 2);
    }

    #[test]
    fn test_guarded_enqueue_skips_existing() {
        let store = create_test_store();

        let first = enqueue_dead_letter(&store, new_entry("run-1", DlqOperation::VideoGeneration))
            .unwrap();
        assert!(matches!(first, EnqueueOutcome::Created(_)));

        let second = enqueue_dead_letter(&store, new_entry("run-1", DlqOperation::VideoGeneration))
            .unwrap();
        assert!(matches!(second, EnqueueOutcome::AlreadyExists));

        assert!(store.check_exists("run-1", "video_generation").unwrap());
        assert!(!store.check_exists("run-1", "voice_generation").unwrap());
        assert_eq!(
            store
                .count(&DlqFilter::new().with_run_id("run-1"))
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_claim_is_compare_and_set() {
        let store = create_test_store();
        let entry = store
            .create_entry(new_entry("run-1", DlqOperation::VoiceGeneration))
            .unwrap();

        let claimed = store.claim_for_retry(&entry.id).unwrap().unwrap();
        assert_eq!(claimed.status, DlqStatus::Retrying);
        assert_eq!(claimed.retry_count, 1);
        assert!(claimed.last_retry_at.is_some());

        assert!(store.claim_for_retry(&entry.id).unwrap().is_none());
        assert!(store.claim_for_retry("missing").unwrap().is_none());
    }

    #[test]
    fn test_claim_respects_budget() {
        let store = create_test_store();
        let entry = store
            .create_entry(new_entry("run-1", DlqOperation::TextGeneration))
            .unwrap();
        store
            .update_entry(
                &entry.id,
                DlqUpdate {
                    retry_count: Some(3),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(store.claim_for_retry(&entry.id).unwrap().is_none());
    }

    #[test]
    fn test_release_back_to_pending_with_budget_left() {
        let store = create_test_store();
        let entry = store
            .create_entry(new_entry("run-1", DlqOperation::TextGeneration))
            .unwrap();
        store.claim_for_retry(&entry.id).unwrap().unwrap();

        let released = store.release(&entry.id, "still 503").unwrap();
        assert_eq!(released.status, DlqStatus::Pending);
        assert_eq!(released.retry_count, 1);
        assert_eq!(released.error, "still 503");
    }

    #[test]
    fn test_release_fails_when_budget_spent() {
        let store = create_test_store();
        let entry = store
            .create_entry(new_entry("run-1", DlqOperation::TextGeneration))
            .unwrap();
        store
            .update_entry(
                &entry.id,
                DlqUpdate {
                    retry_count: Some(2),
                    ..Default::default()
                },
            )
            .unwrap();

        let claimed = store.claim_for_retry(&entry.id).unwrap().unwrap();
        assert_eq!(claimed.retry_count, 3);

        let released = store.release(&entry.id, "gave up").unwrap();
        assert_eq!(released.status, DlqStatus::Failed);
        assert_eq!(released.retry_count, 3);
        assert_eq!(released.error, "gave up");
    }

    #[test]
    fn test_resolve_requires_retrying() {
        let store = create_test_store();
        let entry = store
            .create_entry(new_entry("run-1", DlqOperation::Distribution))
            .unwrap();

        let early = store.resolve(&entry.id);
        assert!(matches!(early, Err(DlqError::InvalidState { .. })));

        store.claim_for_retry(&entry.id).unwrap().unwrap();
        let resolved = store.resolve(&entry.id).unwrap();
        assert_eq!(resolved.status, DlqStatus::Resolved);

        assert!(matches!(
            store.resolve("missing"),
            Err(DlqError::NotFound(_))
        ));
    }

    #[test]
    fn test_requeue_stale() {
        let store = create_test_store();
        let entry = store
            .create_entry(new_entry("run-1", DlqOperation::TextGeneration))
            .unwrap();
        store.claim_for_retry(&entry.id).unwrap().unwrap();

        // Claimed just now: not stale relative to an hour ago.
        let hour_ago = Utc::now() - chrono::Duration::hours(1);
        assert_eq!(store.requeue_stale(hour_ago).unwrap(), 0);

        let future = Utc::now() + chrono::Duration::seconds(1);
        assert_eq!(store.requeue_stale(future).unwrap(), 1);
        let entry = store.get(&entry.id).unwrap().unwrap();
        assert_eq!(entry.status, DlqStatus::Pending);
        assert_eq!(entry.retry_count, 1);
    }

    #[test]
    fn test_list_filters() {
        let store = create_test_store();
        let a = store
            .create_entry(new_entry("run-1", DlqOperation::TextGeneration))
            .unwrap();
        store
            .create_entry(new_entry("run-2", DlqOperation::TextGeneration))
            .unwrap();
        let c = store
            .create_entry(new_entry("run-2", DlqOperation::Distribution))
            .unwrap();
        store
            .update_entry(
                &c.id,
                DlqUpdate {
                    retry_count: Some(3),
                    ..Default::default()
                },
            )
            .unwrap();

        let text = store
            .list(&DlqFilter::new().with_operation("text_generation"))
            .unwrap();
        assert_eq!(text.len(), 2);
        assert_eq!(text[0].id, a.id);

        let retryable = store.list(&DlqFilter::retryable()).unwrap();
        assert_eq!(retryable.len(), 2);
        assert!(retryable.iter().all(|e| e.id != c.id));

        assert_eq!(
            store
                .count(&DlqFilter::new().with_status(DlqStatus::Pending))
                .unwrap(),
            3
        );
        assert_eq!(
            store
                .list(&DlqFilter::new().with_limit(1).with_offset(1))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_update_missing_entry() {
        let store = create_test_store();
        let result = store.update_entry("missing", DlqUpdate::default());
        assert!(matches!(result, Err(DlqError::NotFound(_))));
    }
}
