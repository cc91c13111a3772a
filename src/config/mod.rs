//! Configuration module for Sat-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use sat_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Publishing to: {}", config.broker.subject());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BrokerConfig, CatalogConfig, Config, CrawlerConfig, DedupPolicy, PaginationConfig,
    QueryConfig, ScheduleConfig, StateConfig,
};

// Re-export parser functions
pub use parser::{
    apply_env_overrides, compute_config_hash, load_config, load_config_with_hash,
    BROKER_PASSWORD_ENV, BROKER_USERNAME_ENV, CATALOG_PASSWORD_ENV, CATALOG_USERNAME_ENV,
};
pub use validation::validate;
