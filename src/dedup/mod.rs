//! Record deduplication
//!
//! The first occurrence of a record id wins; every later occurrence in the
//! same run is dropped before it reaches the broker. With
//! [`DedupPolicy::Persistent`] ids the broker acknowledged in earlier runs are
//! treated as already seen as well.

use crate::config::DedupPolicy;
use crate::storage::{self, SharedStorage, Storage};
use std::collections::HashSet;

/// Classifies record ids as new or duplicate
#[derive(Default)]
pub struct Deduplicator {
    seen: HashSet<String>,
    delivered: Option<SharedStorage>,
}

impl Deduplicator {
    /// In-memory deduplication scoped to one run
    pub fn new() -> Self {
        Self::default()
    }

    /// Deduplication that also consults ids delivered in earlier runs
    pub fn with_delivered(storage: SharedStorage) -> Self {
        Self {
            seen: HashSet::new(),
            delivered: Some(storage),
        }
    }

    /// Builds the deduplicator a run's policy asks for
    ///
    /// `Persistent` without a database degrades to run scope; configuration
    /// validation rejects that combination before a run starts.
    pub fn for_policy(policy: DedupPolicy, storage: Option<SharedStorage>) -> Self {
        match (policy, storage) {
            (DedupPolicy::Persistent, Some(storage)) => Self::with_delivered(storage),
            _ => Self::new(),
        }
    }

    /// Returns true the first time an id is seen and registers it
    ///
    /// Check and insert happen under one `&mut self` borrow, so callers that
    /// own the deduplicator cannot interleave two checks of the same id.
    pub fn is_new(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        self.seen.insert(id.to_string());

        if let Some(storage) = &self.delivered {
            match storage::lock(storage).is_delivered(id) {
                Ok(true) => return false,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        "Could not check delivery history for {}: {}; treating as new",
                        id,
                        e
                    );
                }
            }
        }

        true
    }

    /// Number of distinct ids seen in this run
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub fn is_persistent(&self) -> bool {
        self.delivered.is_some()
    }
}
