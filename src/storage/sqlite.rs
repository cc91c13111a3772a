//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::state::RunStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{RunRecord, RunTotals};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const RUN_COLUMNS: &str = "id, started_at, finished_at, config_hash, status, \
     pages_fetched, pages_failed, records_published, publish_failures, duplicates";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Failed),
        totals: RunTotals {
            pages_fetched: row.get(5)?,
            pages_failed: row.get(6)?,
            records_published: row.get(7)?,
            publish_failures: row.get(8)?,
            duplicates: row.get(9)?,
        },
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let sql = format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS);
        self.conn
            .query_row(&sql, params![run_id], run_from_row)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let sql = format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS);
        let run = self.conn.query_row(&sql, [], run_from_row).optional()?;
        Ok(run)
    }

    fn list_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>> {
        let sql = format!("SELECT {} FROM runs ORDER BY id DESC LIMIT ?1", RUN_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let runs = stmt
            .query_map(params![limit as i64], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    fn complete_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        totals: &RunTotals,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, pages_fetched = ?3,
             pages_failed = ?4, records_published = ?5, publish_failures = ?6,
             duplicates = ?7
             WHERE id = ?8",
            params![
                status.to_db_string(),
                now,
                totals.pages_fetched,
                totals.pages_failed,
                totals.records_published,
                totals.publish_failures,
                totals.duplicates,
                run_id
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Delivered Records =====

    fn is_delivered(&self, record_id: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM delivered_records WHERE id = ?1",
                params![record_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn mark_delivered(&mut self, record_id: &str, run_id: i64) -> StorageResult<bool> {
        if record_id.is_empty() {
            return Err(StorageError::Database(
                "cannot store an empty record id".to_string(),
            ));
        }

        let now = Utc::now().to_rfc3339();
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO delivered_records (id, run_id, delivered_at) VALUES (?1, ?2, ?3)",
            params![record_id, run_id, now],
        )?;
        Ok(inserted == 1)
    }

    fn count_delivered(&self) -> StorageResult<u64> {
        let count: u64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM delivered_records", [], |row| row.get(0))?;
        Ok(count)
    }

    fn count_delivered_in_run(&self, run_id: i64) -> StorageResult<u64> {
        let count: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM delivered_records WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_in_memory() {
        let storage = SqliteStorage::new_in_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_run_lifecycle() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();

        let run_id = storage.create_run("abc123").unwrap();
        let run = storage.get_run(run_id).unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.config_hash, "abc123");
        assert!(run.finished_at.is_none());
        assert_eq!(run.totals, RunTotals::default());

        let totals = RunTotals {
            pages_fetched: 3,
            pages_failed: 1,
            records_published: 40,
            publish_failures: 2,
            duplicates: 5,
        };
        storage
            .complete_run(run_id, RunStatus::Completed, &totals)
            .unwrap();

        let run = storage.get_run(run_id).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.finished_at.is_some());
        assert_eq!(run.totals, totals);
    }

    #[test]
    fn test_get_missing_run() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        assert!(matches!(
            storage.get_run(42),
            Err(StorageError::RunNotFound(42))
        ));
    }

    #[test]
    fn test_complete_missing_run() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let result = storage.complete_run(7, RunStatus::Completed, &RunTotals::default());
        assert!(matches!(result, Err(StorageError::RunNotFound(7))));
    }

    #[test]
    fn test_latest_and_list_runs() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        assert!(storage.get_latest_run().unwrap().is_none());

        let first = storage.create_run("h").unwrap();
        let second = storage.create_run("h").unwrap();
        let third = storage.create_run("h").unwrap();

        assert_eq!(storage.get_latest_run().unwrap().unwrap().id, third);

        let ids: Vec<i64> = storage.list_runs(2).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![third, second]);
        assert_eq!(storage.list_runs(10).unwrap().len(), 3);
        assert!(first < second);
    }

    #[test]
    fn test_mark_delivered_is_idempotent() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("h").unwrap();

        assert!(!storage.is_delivered("scene-a").unwrap());
        assert!(storage.mark_delivered("scene-a", run_id).unwrap());
        assert!(!storage.mark_delivered("scene-a", run_id).unwrap());
        assert!(storage.is_delivered("scene-a").unwrap());
        assert_eq!(storage.count_delivered().unwrap(), 1);
    }

    #[test]
    fn test_mark_delivered_rejects_empty_id() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("h").unwrap();
        assert!(storage.mark_delivered("", run_id).is_err());
    }

    #[test]
    fn test_delivered_counts_per_run() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run1 = storage.create_run("h").unwrap();
        let run2 = storage.create_run("h").unwrap();

        storage.mark_delivered("a", run1).unwrap();
        storage.mark_delivered("b", run1).unwrap();
        storage.mark_delivered("b", run2).unwrap();
        storage.mark_delivered("c", run2).unwrap();

        assert_eq!(storage.count_delivered_in_run(run1).unwrap(), 2);
        assert_eq!(storage.count_delivered_in_run(run2).unwrap(), 1);
        assert_eq!(storage.count_delivered().unwrap(), 3);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("harvest.db");

        {
            let mut storage = SqliteStorage::new(&path).unwrap();
            let run_id = storage.create_run("h").unwrap();
            storage.mark_delivered("scene-a", run_id).unwrap();
        }

        let storage = SqliteStorage::new(&path).unwrap();
        assert!(storage.is_delivered("scene-a").unwrap());
        assert_eq!(storage.list_runs(10).unwrap().len(), 1);
    }
}
