//! Storage module for persisting harvest state
//!
//! This module handles all database operations for the harvester, including:
//! - SQLite database initialization and schema management
//! - Run history with per-run counters
//! - The set of record ids the broker has acknowledged

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::RunStatus;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Storage handle shared between the harvester and the deduplicator
pub type SharedStorage = Arc<Mutex<SqliteStorage>>;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// Wraps a storage backend for sharing across the harvest components
pub fn shared(storage: SqliteStorage) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

/// Locks shared storage
///
/// A panic while holding the lock leaves the connection itself usable, so a
/// poisoned lock is recovered rather than propagated.
pub fn lock(storage: &SharedStorage) -> MutexGuard<'_, SqliteStorage> {
    storage.lock().unwrap_or_else(|e| e.into_inner())
}

/// Counters stored with a finished run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub pages_fetched: u64,
    pub pages_failed: u64,
    pub records_published: u64,
    pub publish_failures: u64,
    pub duplicates: u64,
}

/// Represents a harvest run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub totals: RunTotals,
}
