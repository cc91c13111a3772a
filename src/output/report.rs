use crate::feed::Record;
use crate::output::CrawlStats;
use crate::state::RunStatus;
use crate::storage::RunTotals;
use std::time::Duration;

/// Outcome of one harvest run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Run history id, when a database is configured
    pub run_id: Option<i64>,

    pub status: RunStatus,

    pub stats: CrawlStats,

    /// Records the broker acknowledged
    pub published: u64,

    /// Records the broker did not acknowledge
    pub publish_failures: u64,

    /// The records behind `publish_failures`, in crawl order
    pub unpublished: Vec<Record>,

    /// Acked records whose delivery could not be stored
    ///
    /// With persistent dedup these records are offered again by the next run.
    pub delivery_record_failures: u64,

    pub duration: Duration,
}

impl Default for RunReport {
    fn default() -> Self {
        Self {
            run_id: None,
            status: RunStatus::Running,
            stats: CrawlStats::default(),
            published: 0,
            publish_failures: 0,
            unpublished: Vec::new(),
            delivery_record_failures: 0,
            duration: Duration::ZERO,
        }
    }
}

impl RunReport {
    /// Counters stored in the run history
    pub fn totals(&self) -> RunTotals {
        RunTotals {
            pages_fetched: self.stats.pages_fetched,
            pages_failed: self.stats.pages_failed(),
            records_published: self.published,
            publish_failures: self.publish_failures,
            duplicates: self.stats.duplicates,
        }
    }

    /// Logs the run summary at info level
    pub fn log_summary(&self) {
        tracing::info!(
            status = %self.status,
            pages_fetched = self.stats.pages_fetched,
            pages_failed = self.stats.pages_failed(),
            entries_skipped = self.stats.entries_skipped,
            duplicates = self.stats.duplicates,
            published = self.published,
            publish_failures = self.publish_failures,
            delivery_record_failures = self.delivery_record_failures,
            "Harvest finished in {:.1}s",
            self.duration.as_secs_f64()
        );

        for record in &self.unpublished {
            tracing::warn!("Not delivered: {} ({})", record.id, record.identifier);
        }
    }
}
