//! Sat-Harvest: a satellite scene catalog harvester
//!
//! This crate pages through a catalog's OpenSearch/Atom result feed, extracts
//! one metadata record per scene, drops scenes it has already seen and
//! publishes every new record onto a durable message queue.

pub mod config;
pub mod crawler;
pub mod dedup;
pub mod feed;
pub mod output;
pub mod query;
pub mod sink;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Sat-Harvest operations
///
/// Only configuration and startup failures surface here. Failures scoped to a
/// single page or a single record are reported through [`output::CrawlStats`]
/// and the log, never as a run-level error.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Broker error: {0}")]
    Broker(#[from] sink::PublishError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),
}

/// Result type alias for Sat-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{harvest, Crawl, Harvester, StopSignal};
pub use feed::Record;
pub use query::SearchQuery;
pub use state::{CrawlState, RunStatus};
pub use url::normalize_link;
