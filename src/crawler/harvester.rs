//! One harvest run: crawl, publish, remember
//!
//! The harvester composes a [`Crawl`] with a [`PublishSink`] and, when a
//! database is configured, the run history and delivered-id store.

use crate::config::{Config, DedupPolicy};
use crate::crawler::coordinator::{Crawl, CrawlOptions};
use crate::crawler::fetcher::{Credentials, Fetcher};
use crate::crawler::frontier::StopSignal;
use crate::dedup::Deduplicator;
use crate::feed::{LinkPolicy, Navigator, Record};
use crate::output::RunReport;
use crate::query::SearchQuery;
use crate::sink::{PublishOutcome, PublishSink};
use crate::state::RunStatus;
use crate::storage::{self, SharedStorage, Storage};
use crate::ConfigError;
use std::sync::Arc;
use std::time::Instant;

/// Runs harvests with a fixed set of collaborators
pub struct Harvester {
    fetcher: Arc<dyn Fetcher>,
    credentials: Credentials,
    sink: PublishSink,
    navigator: Navigator,
    options: CrawlOptions,
    dedup_policy: DedupPolicy,
    storage: Option<SharedStorage>,
    config_hash: String,
}

impl Harvester {
    pub fn new(fetcher: Arc<dyn Fetcher>, credentials: Credentials, sink: PublishSink) -> Self {
        Self {
            fetcher,
            credentials,
            sink,
            navigator: Navigator::default(),
            options: CrawlOptions::default(),
            dedup_policy: DedupPolicy::Run,
            storage: None,
            config_hash: String::new(),
        }
    }

    /// Builds a harvester with the pagination, crawl and dedup settings of `config`
    pub fn from_config(
        config: &Config,
        fetcher: Arc<dyn Fetcher>,
        sink: PublishSink,
    ) -> Result<Self, ConfigError> {
        let navigator = Navigator::new(LinkPolicy::from_config(&config.pagination)?);

        Ok(Self::new(fetcher, Credentials::from(&config.catalog), sink)
            .with_navigator(navigator)
            .with_options(CrawlOptions::from(&config.crawler))
            .with_dedup_policy(config.state.dedup))
    }

    pub fn with_navigator(mut self, navigator: Navigator) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn with_options(mut self, options: CrawlOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_dedup_policy(mut self, policy: DedupPolicy) -> Self {
        self.dedup_policy = policy;
        self
    }

    /// Records runs and delivered ids in `storage`
    pub fn with_storage(mut self, storage: SharedStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = hash.into();
        self
    }

    /// Runs one harvest to completion or until `stop` is raised
    ///
    /// Every record the crawl yields is published once. Acked ids are stored
    /// as delivered; records the broker did not ack are kept in
    /// [`RunReport::unpublished`] and never stored, so a later run with
    /// persistent dedup offers them again.
    pub async fn run(&self, query: &SearchQuery, stop: &StopSignal) -> RunReport {
        let started = Instant::now();
        let run_id = self.start_run();

        tracing::info!(
            "Starting harvest{} for {}",
            run_id.map(|id| format!(" run {}", id)).unwrap_or_default(),
            query.filter_expression()
        );

        let dedup = Deduplicator::for_policy(self.dedup_policy, self.storage.clone());
        let mut crawl = Crawl::new(
            query,
            Arc::clone(&self.fetcher),
            self.credentials.clone(),
            self.options,
        )
        .with_navigator(self.navigator.clone())
        .with_deduplicator(dedup)
        .with_stop_signal(stop.clone());

        let mut report = RunReport {
            run_id,
            ..Default::default()
        };

        while let Some(record) = crawl.next_record().await {
            match self.sink.publish(&record).await {
                PublishOutcome::Acked => {
                    report.published += 1;
                    if !self.remember_delivery(run_id, &record) {
                        report.delivery_record_failures += 1;
                    }
                }
                PublishOutcome::Failed(e) => {
                    tracing::warn!("Failed to publish {}: {}", record.id, e);
                    report.publish_failures += 1;
                    report.unpublished.push(record);
                }
            }
        }

        report.stats = crawl.stats().clone();
        report.status = if stop.is_raised() {
            RunStatus::Stopped
        } else {
            RunStatus::Completed
        };
        report.duration = started.elapsed();

        self.finish_run(&report);
        report
    }

    fn start_run(&self) -> Option<i64> {
        let storage = self.storage.as_ref()?;
        match storage::lock(storage).create_run(&self.config_hash) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!("Could not record run start: {}", e);
                None
            }
        }
    }

    /// Stores an acked id; false when storage was configured but the write failed
    fn remember_delivery(&self, run_id: Option<i64>, record: &Record) -> bool {
        let (Some(storage), Some(run_id)) = (&self.storage, run_id) else {
            return true;
        };
        match storage::lock(storage).mark_delivered(&record.id, run_id) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Could not remember delivery of {}: {}", record.id, e);
                false
            }
        }
    }

    fn finish_run(&self, report: &RunReport) {
        let (Some(storage), Some(run_id)) = (&self.storage, report.run_id) else {
            return;
        };
        if let Err(e) = storage::lock(storage).complete_run(run_id, report.status, &report.totals())
        {
            tracing::warn!("Could not record end of run {}: {}", run_id, e);
        }
    }
}
