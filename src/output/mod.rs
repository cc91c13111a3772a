//! Output module for harvest counters and reports
//!
//! This module handles:
//! - Live counters kept by the crawl loop
//! - The per-run report returned to the caller
//! - Run history statistics for `--stats`

mod report;
pub mod stats;

pub use report::RunReport;
pub use stats::{load_statistics, print_statistics, CrawlStats, HarvestStatistics};
