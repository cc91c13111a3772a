//! Crawl counters and run history statistics
//!
//! This module provides the counters a crawl keeps while it runs and the
//! functionality for extracting and displaying run history from storage.

use crate::storage::{RunRecord, Storage, StorageResult};

/// Counters kept by one crawl
///
/// Every page-scoped or entry-scoped failure lands in one of these, so a
/// failure that does not stop the crawl is still observable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStats {
    /// Pages fetched with a 2xx status
    pub pages_fetched: u64,

    /// Pages whose fetch failed (network error, timeout, non-2xx status)
    pub pages_failed_fetch: u64,

    /// Pages fetched but not parseable as an Atom feed
    pub pages_failed_parse: u64,

    /// Queued pages dropped because of a stop signal
    pub pages_abandoned: u64,

    /// Entry elements seen across all pages
    pub entries_seen: u64,

    /// Entries skipped for lack of an id
    pub entries_skipped: u64,

    /// Entries dropped as already seen
    pub duplicates: u64,

    /// Records handed out by the crawl
    pub records_emitted: u64,

    /// Follow-up pages queued
    pub links_enqueued: u64,

    /// Follow-up pages refused by the page cap
    pub links_capped: u64,
}

impl CrawlStats {
    /// Pages that produced no records because of an error
    pub fn pages_failed(&self) -> u64 {
        self.pages_failed_fetch + self.pages_failed_parse
    }
}

/// Run history summary
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    /// Most recent runs, newest first
    pub recent_runs: Vec<RunRecord>,

    /// Record ids ever acknowledged by the broker
    pub delivered_records: u64,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `limit` - How many recent runs to include
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage, limit: usize) -> StorageResult<HarvestStatistics> {
    Ok(HarvestStatistics {
        recent_runs: storage.list_runs(limit)?,
        delivered_records: storage.count_delivered()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Delivered records (all runs): {}", stats.delivered_records);
    println!();

    if stats.recent_runs.is_empty() {
        println!("No runs recorded yet.");
        return;
    }

    println!("Recent Runs:");
    for run in &stats.recent_runs {
        println!(
            "  #{} {} [{}] pages {} ok / {} failed, published {}, failed {}, duplicates {}",
            run.id,
            run.started_at,
            run.status,
            run.totals.pages_fetched,
            run.totals.pages_failed,
            run.totals.records_published,
            run.totals.publish_failures,
            run.totals.duplicates,
        );
    }

    let published: u64 = stats
        .recent_runs
        .iter()
        .map(|r| r.totals.records_published)
        .sum();
    let failed: u64 = stats
        .recent_runs
        .iter()
        .map(|r| r.totals.publish_failures)
        .sum();
    let attempted = published + failed;
    let success_rate = if attempted > 0 {
        (published as f64 / attempted as f64) * 100.0
    } else {
        0.0
    };

    println!();
    println!(
        "Publish Success Rate: {:.1}% ({} / {} records over {} runs)",
        success_rate,
        published,
        attempted,
        stats.recent_runs.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RunStatus;
    use crate::storage::{RunTotals, SqliteStorage};

    #[test]
    fn test_pages_failed_sums_both_kinds() {
        let stats = CrawlStats {
            pages_failed_fetch: 2,
            pages_failed_parse: 3,
            ..Default::default()
        };
        assert_eq!(stats.pages_failed(), 5);
    }

    #[test]
    fn test_load_statistics() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run1 = storage.create_run("h").unwrap();
        storage.mark_delivered("a", run1).unwrap();
        storage
            .complete_run(
                run1,
                RunStatus::Completed,
                &RunTotals {
                    records_published: 1,
                    ..Default::default()
                },
            )
            .unwrap();
        storage.create_run("h").unwrap();

        let stats = load_statistics(&storage, 10).unwrap();
        assert_eq!(stats.recent_runs.len(), 2);
        assert_eq!(stats.recent_runs[1].status, RunStatus::Completed);
        assert_eq!(stats.delivered_records, 1);

        print_statistics(&stats);
    }
}
