use crate::config::types::{
    BrokerConfig, CatalogConfig, Config, CrawlerConfig, DedupPolicy, PaginationConfig,
    ScheduleConfig, StateConfig,
};
use crate::query::SearchQuery;
use crate::ConfigError;
use regex::Regex;
use url::Url;

/// Validates the entire configuration
///
/// Everything that can make a run fail for reasons other than the network is
/// checked here, before the first request is sent.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_catalog_config(&config.catalog)?;
    SearchQuery::from_config(&config.catalog, &config.query)?;
    validate_pagination_config(&config.pagination)?;
    validate_crawler_config(&config.crawler)?;
    validate_broker_config(&config.broker)?;
    validate_state_config(&config.state)?;
    validate_schedule_config(&config.schedule)?;
    Ok(())
}

/// Validates catalog access configuration
fn validate_catalog_config(config: &CatalogConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.endpoint)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid catalog endpoint: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "Catalog endpoint '{}' must use HTTP or HTTPS",
            config.endpoint
        )));
    }

    if config.username.is_empty() || config.password.is_empty() {
        return Err(ConfigError::MissingCredentials(
            "catalog username and password are required".to_string(),
        ));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be between 0 and 10, got {}",
            config.max_retries
        )));
    }

    Ok(())
}

/// Validates pagination link policy
fn validate_pagination_config(config: &PaginationConfig) -> Result<(), ConfigError> {
    if config.relations.iter().any(|r| r.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "pagination relations cannot contain empty entries".to_string(),
        ));
    }

    if let Some(pattern) = config.allow.as_deref().filter(|p| !p.is_empty()) {
        Regex::new(pattern).map_err(|e| {
            ConfigError::InvalidPattern(format!("Invalid allow pattern '{}': {}", pattern, e))
        })?;
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_fetches < 1 || config.max_concurrent_fetches > 32 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_fetches must be between 1 and 32, got {}",
            config.max_concurrent_fetches
        )));
    }

    if config.max_pages == Some(0) {
        return Err(ConfigError::Validation(
            "max_pages must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates broker configuration
fn validate_broker_config(config: &BrokerConfig) -> Result<(), ConfigError> {
    Url::parse(&config.url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid broker url: {}", e)))?;

    if config.username.is_empty() != config.password.is_empty() {
        return Err(ConfigError::MissingCredentials(
            "broker username and password must be set together".to_string(),
        ));
    }

    validate_subject_token("topic", &config.topic)?;

    let namespace = config.namespace.trim_matches(|c| c == '.' || c == '/');
    if !namespace.is_empty() {
        for token in namespace.split(|c| c == '.' || c == '/') {
            validate_subject_token("namespace", token)?;
        }
    }

    Ok(())
}

/// A subject token cannot be empty, contain whitespace or broker wildcards
fn validate_subject_token(field: &str, token: &str) -> Result<(), ConfigError> {
    if token.is_empty() {
        return Err(ConfigError::Validation(format!("{} cannot be empty", field)));
    }

    if token
        .chars()
        .any(|c| c.is_whitespace() || c == '*' || c == '>' || c == '.')
    {
        return Err(ConfigError::Validation(format!(
            "{} '{}' contains characters not allowed in a subject",
            field, token
        )));
    }

    Ok(())
}

/// Validates local state configuration
fn validate_state_config(config: &StateConfig) -> Result<(), ConfigError> {
    let has_path = config
        .database_path
        .as_deref()
        .is_some_and(|p| !p.trim().is_empty());

    if config.dedup == DedupPolicy::Persistent && !has_path {
        return Err(ConfigError::Validation(
            "dedup = \"persistent\" requires database-path".to_string(),
        ));
    }

    if config.database_path.is_some() && !has_path {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates the repeat schedule
fn validate_schedule_config(config: &ScheduleConfig) -> Result<(), ConfigError> {
    if config.interval_secs == Some(0) {
        return Err(ConfigError::Validation(
            "interval_secs must be >= 1 when set".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::QueryConfig;

    fn create_test_config() -> Config {
        Config {
            catalog: CatalogConfig {
                endpoint: "https://catalog.example/dhus/api/search".to_string(),
                username: "alice".to_string(),
                password: "wonderland".to_string(),
                user_agent: "sat-harvest-test".to_string(),
                timeout_secs: 30,
                max_retries: 0,
                retry_delay_ms: 10,
            },
            query: QueryConfig {
                polygon: "POLYGON((2 51,4 51,4 55,2 54,2 51))".to_string(),
                begin: Some("NOW-14DAYS TO NOW".to_string()),
                end: None,
                page_size: None,
            },
            pagination: PaginationConfig::default(),
            crawler: CrawlerConfig::default(),
            broker: BrokerConfig {
                url: "nats://localhost:4222".to_string(),
                username: String::new(),
                password: String::new(),
                namespace: String::new(),
                topic: "crisis_crawl".to_string(),
            },
            state: StateConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&create_test_config()).is_ok());
    }

    #[test]
    fn test_missing_catalog_credentials() {
        let mut config = create_test_config();
        config.catalog.password = String::new();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::MissingCredentials(_))
        ));
    }

    #[test]
    fn test_half_broker_credentials() {
        let mut config = create_test_config();
        config.broker.username = "guest".to_string();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::MissingCredentials(_))
        ));
    }

    #[test]
    fn test_invalid_endpoint() {
        let mut config = create_test_config();
        config.catalog.endpoint = "ftp://catalog.example/search".to_string();
        assert!(matches!(validate(&config), Err(ConfigError::InvalidUrl(_))));

        config.catalog.endpoint = "not a url".to_string();
        assert!(matches!(validate(&config), Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_malformed_polygon() {
        let mut config = create_test_config();
        config.query.polygon = "somewhere in europe".to_string();
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_invalid_allow_pattern() {
        let mut config = create_test_config();
        config.pagination.allow = Some("(unclosed".to_string());
        assert!(matches!(validate(&config), Err(ConfigError::InvalidPattern(_))));
    }

    #[test]
    fn test_concurrency_bounds() {
        let mut config = create_test_config();
        config.crawler.max_concurrent_fetches = 0;
        assert!(validate(&config).is_err());

        config.crawler.max_concurrent_fetches = 33;
        assert!(validate(&config).is_err());

        config.crawler.max_concurrent_fetches = 8;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_persistent_dedup_requires_database() {
        let mut config = create_test_config();
        config.state.dedup = DedupPolicy::Persistent;
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));

        config.state.database_path = Some("./harvest.db".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_validate_subject_token() {
        assert!(validate_subject_token("topic", "crisis_crawl").is_ok());
        assert!(validate_subject_token("topic", "").is_err());
        assert!(validate_subject_token("topic", "crisis crawl").is_err());
        assert!(validate_subject_token("topic", "scenes.*").is_err());
        assert!(validate_subject_token("topic", "scenes>").is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = create_test_config();
        config.schedule.interval_secs = Some(0);
        assert!(validate(&config).is_err());
    }
}
