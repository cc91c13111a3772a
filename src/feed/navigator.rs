//! Pagination link selection
//!
//! The catalog links successive result pages with feed-level `atom:link`
//! elements. A [`LinkPolicy`] decides which of them are pagination links,
//! and [`Navigator::next_links`] yields the ones not visited yet.

use crate::config::PaginationConfig;
use crate::feed::document::{FeedDocument, FeedLink};
use crate::url::normalize_link;
use crate::ConfigError;
use regex::Regex;
use std::collections::HashSet;
use url::Url;

/// Declarative filter for pagination links
#[derive(Debug, Clone, Default)]
pub struct LinkPolicy {
    relations: Vec<String>,
    allow: Option<Regex>,
}

impl LinkPolicy {
    /// Creates a policy
    ///
    /// # Arguments
    ///
    /// * `relations` - Accepted `rel` values; empty accepts every link
    /// * `allow` - Regex the resolved URL must match
    pub fn new(relations: Vec<String>, allow: Option<Regex>) -> Self {
        Self { relations, allow }
    }

    pub fn from_config(config: &PaginationConfig) -> Result<Self, ConfigError> {
        let allow = match config.allow.as_deref().filter(|p| !p.is_empty()) {
            Some(pattern) => Some(Regex::new(pattern).map_err(|e| {
                ConfigError::InvalidPattern(format!("Invalid allow pattern '{}': {}", pattern, e))
            })?),
            None => None,
        };

        Ok(Self::new(config.relations.clone(), allow))
    }

    /// Checks the link relation
    pub fn accepts_relation(&self, rel: Option<&str>) -> bool {
        if self.relations.is_empty() {
            return true;
        }
        rel.is_some_and(|rel| self.relations.iter().any(|r| r == rel))
    }

    /// Checks the resolved URL against the allow pattern
    pub fn accepts_url(&self, url: &Url) -> bool {
        self.allow
            .as_ref()
            .map_or(true, |pattern| pattern.is_match(url.as_str()))
    }
}

/// Normalized URLs already turned into fetches during one run
#[derive(Debug, Default)]
pub struct VisitedLinks {
    urls: HashSet<String>,
}

impl VisitedLinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a URL
    ///
    /// # Returns
    ///
    /// `true` if the URL had not been visited before
    pub fn insert(&mut self, url: &Url) -> bool {
        self.urls.insert(url.as_str().to_string())
    }

    pub fn contains(&self, url: &Url) -> bool {
        self.urls.contains(url.as_str())
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

/// Picks follow-up pages out of a fetched feed
#[derive(Debug, Clone, Default)]
pub struct Navigator {
    policy: LinkPolicy,
}

impl Navigator {
    pub fn new(policy: LinkPolicy) -> Self {
        Self { policy }
    }

    /// Unvisited pagination links of `doc`, in document order
    ///
    /// Links are resolved against `base` (the URL the page was fetched from)
    /// and normalized before the visited check. Each yielded URL is inserted
    /// into `visited` before it is returned, so it is yielded at most once
    /// per run. The sequence is lazy and walks the document's links once.
    pub fn next_links<'a>(
        &'a self,
        doc: &FeedDocument<'_>,
        base: &'a Url,
        visited: &'a mut VisitedLinks,
    ) -> NextLinks<'a> {
        NextLinks {
            links: doc.links().into_iter(),
            base,
            policy: &self.policy,
            visited,
        }
    }
}

/// Lazy sequence returned by [`Navigator::next_links`]
pub struct NextLinks<'a> {
    links: std::vec::IntoIter<FeedLink>,
    base: &'a Url,
    policy: &'a LinkPolicy,
    visited: &'a mut VisitedLinks,
}

impl Iterator for NextLinks<'_> {
    type Item = Url;

    fn next(&mut self) -> Option<Url> {
        for link in self.links.by_ref() {
            if !self.policy.accepts_relation(link.rel.as_deref()) {
                continue;
            }

            let url = match normalize_link(self.base, &link.href) {
                Ok(url) => url,
                Err(e) => {
                    tracing::debug!("Ignoring feed link {}: {}", link.href, e);
                    continue;
                }
            };

            if !self.policy.accepts_url(&url) {
                tracing::trace!("Link {} rejected by allow pattern", url);
                continue;
            }

            if self.visited.insert(&url) {
                return Some(url);
            }
        }
        None
    }
}
