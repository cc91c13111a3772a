//! State module for tracking harvest progress
//!
//! # Components
//!
//! - `CrawlState`: The phase the crawl loop is in (seeded, fetching, parsing, yielding, done)
//! - `RunStatus`: The outcome recorded for a whole run in the run history

mod crawl_state;
mod run_status;

// Re-export main types
pub use crawl_state::CrawlState;
pub use run_status::RunStatus;
