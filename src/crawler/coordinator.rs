//! Crawl coordinator - feed pagination state machine
//!
//! This module contains the crawl loop that turns one search query into a
//! stream of deduplicated records, including:
//! - Seeding the frontier from the search query
//! - Bounded concurrent fetching through the fetch collaborator
//! - Parsing each page into records and follow-up fetch targets
//! - Threading the deduplicator and the visited-link set
//! - Honoring the external stop signal

use crate::crawler::fetcher::{Credentials, FetchError, FetchResponse, Fetcher};
use crate::crawler::frontier::{FetchTarget, Frontier, StopSignal};
use crate::dedup::Deduplicator;
use crate::feed::{extract, FeedDocument, FeedError, Navigator, Record, VisitedLinks};
use crate::output::CrawlStats;
use crate::query::SearchQuery;
use crate::state::CrawlState;
use crate::url::normalize_url;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Output of processing one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutput {
    /// A record that passed deduplication
    Record(Record),
    /// A follow-up page to fetch
    Fetch(FetchTarget),
}

/// Crawl limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlOptions {
    /// Maximum number of fetches in flight
    pub max_in_flight: usize,

    /// Maximum number of pages scheduled in one run
    pub max_pages: Option<u32>,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_in_flight: 1,
            max_pages: None,
        }
    }
}

impl From<&crate::config::CrawlerConfig> for CrawlOptions {
    fn from(config: &crate::config::CrawlerConfig) -> Self {
        Self {
            max_in_flight: config.max_concurrent_fetches.max(1) as usize,
            max_pages: config.max_pages,
        }
    }
}

type FetchOutcome = (FetchTarget, Result<FetchResponse, FetchError>);

/// One run over a search query
///
/// The crawl owns every piece of mutable run state: the frontier, the visited
/// set, the deduplicator and the counters. Fetches run as tasks on a
/// [`JoinSet`], but their results are folded back into that state one at a
/// time on the caller's task, so no lock guards the visited set or the seen
/// ids.
///
/// Within a page, records come out of [`Crawl::next_record`] in document
/// order. With one fetch in flight pages are also yielded in the order they
/// were scheduled; with more, they are yielded as their fetches complete.
pub struct Crawl {
    fetcher: Arc<dyn Fetcher>,
    credentials: Arc<Credentials>,
    navigator: Navigator,
    dedup: Deduplicator,
    frontier: Frontier,
    visited: VisitedLinks,
    in_flight: JoinSet<FetchOutcome>,
    max_in_flight: usize,
    outgoing: VecDeque<Record>,
    state: CrawlState,
    stats: CrawlStats,
    stop: StopSignal,
}

impl Crawl {
    /// Creates a crawl seeded with the query's search URL
    ///
    /// # Arguments
    ///
    /// * `query` - The search to run
    /// * `fetcher` - Fetch collaborator shared by every page fetch
    /// * `credentials` - Sent with every fetch
    /// * `options` - Concurrency and page limits
    pub fn new(
        query: &SearchQuery,
        fetcher: Arc<dyn Fetcher>,
        credentials: Credentials,
        options: CrawlOptions,
    ) -> Self {
        let search_url = query.search_url();
        let seed = normalize_url(search_url.as_str()).unwrap_or(search_url);

        let mut visited = VisitedLinks::new();
        visited.insert(&seed);

        let mut frontier = Frontier::new(options.max_pages);
        frontier.push(FetchTarget::seed(seed.clone()));

        tracing::debug!("Seeded crawl with {}", seed);

        Self {
            fetcher,
            credentials: Arc::new(credentials),
            navigator: Navigator::default(),
            dedup: Deduplicator::new(),
            frontier,
            visited,
            in_flight: JoinSet::new(),
            max_in_flight: options.max_in_flight.max(1),
            outgoing: VecDeque::new(),
            state: CrawlState::Seeded,
            stats: CrawlStats::default(),
            stop: StopSignal::new(),
        }
    }

    pub fn with_navigator(mut self, navigator: Navigator) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn with_deduplicator(mut self, dedup: Deduplicator) -> Self {
        self.dedup = dedup;
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn state(&self) -> CrawlState {
        self.state
    }

    pub fn stats(&self) -> &CrawlStats {
        &self.stats
    }

    /// Returns the next record, or `None` once the crawl is done
    ///
    /// Drives fetching and parsing as needed. Page failures are counted and
    /// logged, never returned.
    pub async fn next_record(&mut self) -> Option<Record> {
        loop {
            if let Some(record) = self.outgoing.pop_front() {
                self.transition(CrawlState::Yielding);
                self.stats.records_emitted += 1;
                return Some(record);
            }

            if self.state.is_terminal() {
                return None;
            }

            self.start_fetches();

            match self.in_flight.join_next().await {
                Some(Ok((target, result))) => self.handle_fetched(target, result),
                Some(Err(e)) => {
                    tracing::error!("Fetch task ended abnormally: {}", e);
                    self.stats.pages_failed_fetch += 1;
                }
                None => {
                    self.finish();
                    return None;
                }
            }
        }
    }

    /// Drives the crawl to completion and collects every record
    pub async fn collect_records(&mut self) -> Vec<Record> {
        let mut records = Vec::new();
        while let Some(record) = self.next_record().await {
            records.push(record);
        }
        records
    }

    /// Processes one fetched page body
    ///
    /// Entries without an id are skipped, duplicates are dropped. Follow-up
    /// links are only produced while the stop signal is down.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<PageOutput>)` - Records in document order, then follow-up targets in document order
    /// * `Err(FeedError)` - The body is not an Atom feed; nothing from it is used
    pub fn process_page(
        &mut self,
        target: &FetchTarget,
        body: &[u8],
    ) -> Result<Vec<PageOutput>, FeedError> {
        let text = FeedDocument::decode(body)?;
        let doc = FeedDocument::parse(text)?;

        if let Some(total) = doc.total_results() {
            tracing::debug!("Page {} reports {} total results", target.page, total);
        }

        let mut outputs = Vec::new();

        for entry in doc.entries() {
            self.stats.entries_seen += 1;
            match extract(entry) {
                Ok(record) => {
                    if self.dedup.is_new(&record.id) {
                        outputs.push(PageOutput::Record(record));
                    } else {
                        tracing::debug!("Dropping duplicate {}", record.id);
                        self.stats.duplicates += 1;
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        "Skipping entry on page {} ({}): {}",
                        target.page,
                        target.url,
                        e
                    );
                    self.stats.entries_skipped += 1;
                }
            }
        }

        if !self.stop.is_raised() {
            let links: Vec<_> = self
                .navigator
                .next_links(&doc, &target.url, &mut self.visited)
                .collect();
            outputs.extend(
                links
                    .into_iter()
                    .map(|url| PageOutput::Fetch(FetchTarget::follow(url, target))),
            );
        }

        Ok(outputs)
    }

    /// Spawns fetches until the in-flight bound is reached or the frontier is empty
    fn start_fetches(&mut self) {
        if self.stop.is_raised() {
            let dropped = self.frontier.clear();
            if dropped > 0 {
                tracing::info!("Stop requested, abandoning {} queued pages", dropped);
                self.stats.pages_abandoned += dropped as u64;
            }
            return;
        }

        while self.in_flight.len() < self.max_in_flight {
            let Some(target) = self.frontier.pop() else {
                break;
            };

            self.transition(CrawlState::Fetching);
            tracing::debug!("Fetching page {}: {}", target.page, target.url);

            let fetcher = Arc::clone(&self.fetcher);
            let credentials = Arc::clone(&self.credentials);
            self.in_flight.spawn(async move {
                let result = fetcher.fetch(&target.url, &credentials).await;
                (target, result)
            });
        }

        if !self.in_flight.is_empty() {
            self.transition(CrawlState::Fetching);
        }
    }

    fn handle_fetched(&mut self, target: FetchTarget, result: Result<FetchResponse, FetchError>) {
        let response = match result {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                self.record_fetch_failure(&target, FetchError::Status {
                    status: response.status,
                });
                return;
            }
            Err(e) => {
                self.record_fetch_failure(&target, e);
                return;
            }
        };

        self.stats.pages_fetched += 1;
        self.transition(CrawlState::Parsing);

        match self.process_page(&target, &response.body) {
            Ok(outputs) => {
                for output in outputs {
                    match output {
                        PageOutput::Record(record) => self.outgoing.push_back(record),
                        PageOutput::Fetch(next) => self.schedule(next),
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Unusable page {} ({}): {}", target.page, target.url, e);
                self.stats.pages_failed_parse += 1;
            }
        }
    }

    fn record_fetch_failure(&mut self, target: &FetchTarget, error: FetchError) {
        match &target.referrer {
            Some(referrer) => tracing::warn!(
                "Failed to fetch page {} ({}, linked from {}): {}",
                target.page,
                target.url,
                referrer,
                error
            ),
            None => tracing::warn!(
                "Failed to fetch page {} ({}): {}",
                target.page,
                target.url,
                error
            ),
        }
        self.stats.pages_failed_fetch += 1;
    }

    fn schedule(&mut self, target: FetchTarget) {
        let url = target.url.clone();
        if self.frontier.push(target) {
            tracing::debug!("Queued {}", url);
            self.stats.links_enqueued += 1;
        } else {
            tracing::info!("Page limit reached, not following {}", url);
            self.stats.links_capped += 1;
        }
    }

    fn finish(&mut self) {
        self.transition(CrawlState::Done);
        tracing::info!(
            "Crawl done: {} pages fetched, {} failed, {} records, {} duplicates",
            self.stats.pages_fetched,
            self.stats.pages_failed(),
            self.stats.records_emitted,
            self.stats.duplicates
        );
    }

    fn transition(&mut self, next: CrawlState) {
        if self.state == next {
            return;
        }
        if !self.state.can_transition_to(next) {
            tracing::debug!("Unexpected crawl transition {} -> {}", self.state, next);
        }
        tracing::trace!("Crawl {} -> {}", self.state, next);
        self.state = next;
    }
}
