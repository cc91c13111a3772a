use serde::Deserialize;
use std::fmt;

/// Main configuration structure for Sat-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub catalog: CatalogConfig,
    pub query: QueryConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub broker: BrokerConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Catalog search API access
#[derive(Clone, Deserialize)]
pub struct CatalogConfig {
    /// Base search endpoint, e.g. `https://scihub.copernicus.eu/dhus/api/search`
    pub endpoint: String,

    /// Basic-auth username (may come from the environment instead)
    #[serde(default)]
    pub username: String,

    /// Basic-auth password (may come from the environment instead)
    #[serde(default)]
    pub password: String,

    /// User-Agent header sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Total request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries for 5xx responses and timeouts
    #[serde(rename = "max-retries", default)]
    pub max_retries: u32,

    /// Delay between retries (milliseconds)
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl fmt::Debug for CatalogConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogConfig")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .finish()
    }
}

/// Search filters applied to every run
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    /// Area of interest as a WKT polygon
    pub polygon: String,

    /// Sensing start range, e.g. `NOW-14DAYS TO NOW`
    #[serde(default)]
    pub begin: Option<String>,

    /// Sensing end range, e.g. `NOW-14DAYS TO NOW`
    #[serde(default)]
    pub end: Option<String>,

    /// Results per page (`rows` parameter)
    #[serde(rename = "page-size", default)]
    pub page_size: Option<u32>,
}

/// Which feed links count as pagination links
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    /// Accepted link relations; empty accepts any relation
    #[serde(default)]
    pub relations: Vec<String>,

    /// Regex the resolved link URL must match
    #[serde(default = "default_allow")]
    pub allow: Option<String>,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            relations: Vec::new(),
            allow: default_allow(),
        }
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum number of page fetches in flight
    #[serde(rename = "max-concurrent-fetches", default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: u32,

    /// Maximum number of pages fetched per run
    #[serde(rename = "max-pages", default)]
    pub max_pages: Option<u32>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_max_concurrent_fetches(),
            max_pages: None,
        }
    }
}

/// Message broker connection
#[derive(Clone, Deserialize)]
pub struct BrokerConfig {
    /// Server URL, e.g. `nats://localhost:4222`
    pub url: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Routing namespace, prepended to the topic as a subject prefix
    #[serde(default)]
    pub namespace: String,

    /// Topic every record is published to
    #[serde(default = "default_topic")]
    pub topic: String,
}

impl BrokerConfig {
    /// Full subject records are published on (`namespace.topic`)
    pub fn subject(&self) -> String {
        let namespace = self.namespace.trim_matches(|c| c == '.' || c == '/');
        if namespace.is_empty() {
            self.topic.clone()
        } else {
            format!("{}.{}", namespace.replace('/', "."), self.topic)
        }
    }
}

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("namespace", &self.namespace)
            .field("topic", &self.topic)
            .finish()
    }
}

/// How long record ids stay "seen"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DedupPolicy {
    /// Ids are forgotten when the run ends
    #[default]
    Run,
    /// Ids acked by the broker are remembered across runs
    Persistent,
}

/// Local state configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateConfig {
    #[serde(default)]
    pub dedup: DedupPolicy,

    /// Path to the SQLite database (run history and delivered ids)
    #[serde(rename = "database-path", default)]
    pub database_path: Option<String>,
}

/// Repeat schedule
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds between the start of consecutive runs; absent means run once
    #[serde(rename = "interval-secs", default)]
    pub interval_secs: Option<u64>,
}

fn default_user_agent() -> String {
    format!("sat-harvest/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_retry_delay_ms() -> u64 {
    5000
}

fn default_allow() -> Option<String> {
    Some("/api/search".to_string())
}

fn default_max_concurrent_fetches() -> u32 {
    1
}

fn default_topic() -> String {
    "crisis_crawl".to_string()
}
