//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::RunStatus;
use crate::storage::{RunRecord, RunTotals};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Run history plus the set of record ids already delivered to the broker.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new harvest run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Lists the most recent runs, newest first
    fn list_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>>;

    /// Stores the final status and counters of a run with a finish timestamp
    fn complete_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        totals: &RunTotals,
    ) -> StorageResult<()>;

    // ===== Delivered Records =====

    /// Returns true if the broker has acknowledged a record with this id before
    fn is_delivered(&self, record_id: &str) -> StorageResult<bool>;

    /// Remembers an acknowledged record id
    ///
    /// # Returns
    ///
    /// `true` if the id was not known yet
    fn mark_delivered(&mut self, record_id: &str, run_id: i64) -> StorageResult<bool>;

    /// Counts every id ever delivered
    fn count_delivered(&self) -> StorageResult<u64>;

    /// Counts the ids first delivered by one run
    fn count_delivered_in_run(&self, run_id: i64) -> StorageResult<u64>;
}
