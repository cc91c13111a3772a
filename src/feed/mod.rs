//! Atom feed handling
//!
//! This module turns one fetched result page into records and pagination links:
//! - `document`: namespace-aware parsing of the Atom/OpenSearch page
//! - `extractor`: per-entry field extraction into a [`Record`]
//! - `navigator`: selection of follow-up page links against the visited set

mod document;
mod extractor;
mod navigator;

pub use document::{FeedDocument, FeedError, FeedLink, ATOM_NS, OPENSEARCH_NS};
pub use extractor::{extract, ExtractError, Record};
pub use navigator::{LinkPolicy, Navigator, NextLinks, VisitedLinks};
