//! Crawler module for catalog feed harvesting
//!
//! This module contains the core harvesting logic, including:
//! - HTTP fetching with basic auth and retry logic
//! - The frontier of result pages and the stop signal
//! - The pagination crawl state machine
//! - Harvest runs that publish and record what the crawl yields

mod coordinator;
mod fetcher;
mod frontier;
mod harvester;

pub use coordinator::{Crawl, CrawlOptions, PageOutput};
pub use fetcher::{
    build_http_client, Credentials, FetchError, FetchResponse, Fetcher, HttpFetcher,
};
pub use frontier::{FetchTarget, Frontier, StopSignal};
pub use harvester::Harvester;

use crate::config::Config;
use crate::output::RunReport;
use crate::query::SearchQuery;
use crate::sink::{NatsQueue, PublishSink};
use crate::state::RunStatus;
use crate::storage::{self, open_storage, RunTotals, SharedStorage, Storage};
use crate::HarvestError;
use std::path::Path;
use std::sync::Arc;

/// Runs one complete harvest against the configured catalog and broker
///
/// This is the main entry point for a run. It will:
/// 1. Build the search query and the HTTP fetcher
/// 2. Open the state database, if one is configured
/// 3. Connect to the broker (a failed connection is recorded as a failed run)
/// 4. Crawl the result feed and publish every new record
/// 5. Release the broker connection, whatever the crawl outcome
///
/// # Arguments
///
/// * `config` - Validated configuration
/// * `config_hash` - Hash of the configuration file, stored with the run
/// * `stop` - Raised to end the run early
///
/// # Returns
///
/// * `Ok(RunReport)` - The run happened; page and publish failures are in the report
/// * `Err(HarvestError)` - The run could not start
///
/// # Example
///
/// ```no_run
/// use sat_harvest::config::load_config_with_hash;
/// use sat_harvest::crawler::{harvest, StopSignal};
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("harvest.toml"))?;
/// let report = harvest(&config, &hash, &StopSignal::new()).await?;
/// println!("published {}", report.published);
/// # Ok(())
/// # }
/// ```
pub async fn harvest(
    config: &Config,
    config_hash: &str,
    stop: &StopSignal,
) -> Result<RunReport, HarvestError> {
    let query = SearchQuery::from_config(&config.catalog, &config.query)?;
    let fetcher = Arc::new(HttpFetcher::new(&config.catalog)?);

    let storage = match config.state.database_path.as_deref() {
        Some(path) => Some(storage::shared(open_storage(Path::new(path))?)),
        None => None,
    };

    let queue = match NatsQueue::connect(&config.broker).await {
        Ok(queue) => Arc::new(queue),
        Err(e) => {
            if let Some(storage) = &storage {
                record_failed_run(storage, config_hash);
            }
            return Err(e.into());
        }
    };

    let sink = PublishSink::new(queue, config.broker.subject());
    let mut harvester =
        Harvester::from_config(config, fetcher, sink.clone())?.with_config_hash(config_hash);
    if let Some(storage) = storage {
        harvester = harvester.with_storage(storage);
    }

    let report = harvester.run(&query, stop).await;

    if let Err(e) = sink.close().await {
        tracing::warn!("Failed to flush broker connection: {}", e);
    }

    Ok(report)
}

/// Stores a run that ended before crawling started
fn record_failed_run(storage: &SharedStorage, config_hash: &str) {
    let mut guard = storage::lock(storage);
    let result = match guard.create_run(config_hash) {
        Ok(run_id) => guard.complete_run(run_id, RunStatus::Failed, &RunTotals::default()),
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        tracing::warn!("Could not record failed run: {}", e);
    }
}
