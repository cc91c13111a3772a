//! Frontier of pages waiting to be fetched
//!
//! This module handles:
//! - First-in first-out queueing of fetch targets, in discovery order
//! - The per-run page cap
//! - The external stop signal that halts frontier expansion

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use url::Url;

/// A page queued for fetching
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTarget {
    /// Normalized URL to fetch
    pub url: Url,

    /// 1 for the seed query, then one more per link followed
    pub page: u32,

    /// Page the link was found on; `None` for the seed
    pub referrer: Option<Url>,
}

impl FetchTarget {
    pub fn seed(url: Url) -> Self {
        Self {
            url,
            page: 1,
            referrer: None,
        }
    }

    /// A target reached by following a link on `from`
    pub fn follow(url: Url, from: &FetchTarget) -> Self {
        Self {
            url,
            page: from.page.saturating_add(1),
            referrer: Some(from.url.clone()),
        }
    }
}

/// Pages waiting to be fetched
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<FetchTarget>,
    scheduled: u32,
    max_pages: Option<u32>,
}

impl Frontier {
    /// Creates an empty frontier
    ///
    /// # Arguments
    ///
    /// * `max_pages` - Upper bound on targets accepted over the run; `None` is unbounded
    pub fn new(max_pages: Option<u32>) -> Self {
        Self {
            queue: VecDeque::new(),
            scheduled: 0,
            max_pages,
        }
    }

    /// Queues a target
    ///
    /// # Returns
    ///
    /// `false` if the page cap has been reached and the target was dropped
    pub fn push(&mut self, target: FetchTarget) -> bool {
        if self.max_pages.is_some_and(|max| self.scheduled >= max) {
            return false;
        }
        self.scheduled += 1;
        self.queue.push_back(target);
        true
    }

    pub fn pop(&mut self) -> Option<FetchTarget> {
        self.queue.pop_front()
    }

    /// Drops every queued target
    ///
    /// # Returns
    ///
    /// The number of targets dropped
    pub fn clear(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Targets accepted so far, including those already popped
    pub fn scheduled(&self) -> u32 {
        self.scheduled
    }
}

/// Cooperative stop request shared between the crawl and its owner
///
/// Raising it stops the crawl from starting new fetches or queueing new
/// links. Fetches already in flight complete and their records are still
/// yielded.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    stop_requested: Arc<AtomicBool>,
    raised: Arc<Notify>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.raised.notify_waiters();
    }

    pub fn is_raised(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Completes once the signal is raised, immediately if it already was
    pub async fn raised(&self) {
        loop {
            // Registered before the check so a concurrent raise is not missed
            let notified = self.raised.notified();
            if self.is_raised() {
                return;
            }
            notified.await;
        }
    }
}
