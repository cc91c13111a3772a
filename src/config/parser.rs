use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Environment variables that take precedence over credentials in the file
pub const CATALOG_USERNAME_ENV: &str = "SAT_HARVEST_CATALOG_USERNAME";
pub const CATALOG_PASSWORD_ENV: &str = "SAT_HARVEST_CATALOG_PASSWORD";
pub const BROKER_USERNAME_ENV: &str = "SAT_HARVEST_BROKER_USERNAME";
pub const BROKER_PASSWORD_ENV: &str = "SAT_HARVEST_BROKER_PASSWORD";

/// Loads and parses a configuration file from the given path
///
/// Credentials found in the process environment override the ones in the
/// file, then the whole configuration is validated.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use sat_harvest::config::load_config;
///
/// let config = load_config(Path::new("harvest.toml")).unwrap();
/// println!("Endpoint: {}", config.catalog.endpoint);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&content)?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    validate(&config)?;

    Ok(config)
}

/// Replaces credentials with values from `lookup` when it returns a non-empty one
///
/// The lookup is injected so the same code path serves the real environment
/// and tests.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let pick = |key: &str, current: &mut String| {
        if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
            tracing::debug!("Using {} from the environment", key);
            *current = value;
        }
    };

    pick(CATALOG_USERNAME_ENV, &mut config.catalog.username);
    pick(CATALOG_PASSWORD_ENV, &mut config.catalog.password);
    pick(BROKER_USERNAME_ENV, &mut config.broker.username);
    pick(BROKER_PASSWORD_ENV, &mut config.broker.password);
}

/// Computes a SHA-256 hash of the configuration file content
///
/// The hash is stored with every run so that a change of search area or
/// broker between runs is visible in the run history.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DedupPolicy;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const VALID_CONFIG: &str = r#"
[catalog]
endpoint = "https://catalog.example/dhus/api/search"
username = "alice"
password = "wonderland"
max-retries = 2

[query]
polygon = "POLYGON((2 51,4 51,4 55,2 54,2 51))"
begin = "NOW-14DAYS TO NOW"
end = "NOW-14DAYS TO NOW"

[broker]
url = "nats://localhost:4222"
username = "guest"
password = "guest"
"#;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(VALID_CONFIG);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.catalog.endpoint, "https://catalog.example/dhus/api/search");
        assert_eq!(config.catalog.max_retries, 2);
        assert_eq!(config.catalog.timeout_secs, 30);
        assert_eq!(config.query.begin.as_deref(), Some("NOW-14DAYS TO NOW"));
        assert_eq!(config.broker.topic, "crisis_crawl");
        assert_eq!(config.crawler.max_concurrent_fetches, 1);
        assert_eq!(config.pagination.allow.as_deref(), Some("/api/search"));
        assert_eq!(config.state.dedup, DedupPolicy::Run);
        assert!(config.schedule.interval_secs.is_none());
    }

    #[test]
    fn test_load_full_config() {
        let content = format!(
            "{}{}",
            VALID_CONFIG,
            r#"
[pagination]
relations = ["next"]
allow = "/dhus/api/search"

[crawler]
max-concurrent-fetches = 4
max-pages = 50

[state]
dedup = "persistent"
database-path = "./harvest.db"

[schedule]
interval-secs = 3600
"#
        );
        let file = create_temp_config(&content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.pagination.relations, vec!["next".to_string()]);
        assert_eq!(config.crawler.max_concurrent_fetches, 4);
        assert_eq!(config.crawler.max_pages, Some(50));
        assert_eq!(config.state.dedup, DedupPolicy::Persistent);
        assert_eq!(config.state.database_path.as_deref(), Some("./harvest.db"));
        assert_eq!(config.schedule.interval_secs, Some(3600));
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/harvest.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let content = VALID_CONFIG.replace("NOW-14DAYS TO NOW", "last two weeks");
        let file = create_temp_config(&content);
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_env_overrides_credentials() {
        let file = create_temp_config(VALID_CONFIG);
        let content = std::fs::read_to_string(file.path()).unwrap();
        let mut config: Config = toml::from_str(&content).unwrap();

        let env: HashMap<&str, &str> = HashMap::from([
            (CATALOG_PASSWORD_ENV, "from-env"),
            (BROKER_USERNAME_ENV, ""),
        ]);
        apply_env_overrides(&mut config, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.catalog.username, "alice");
        assert_eq!(config.catalog.password, "from-env");
        // Empty values do not override
        assert_eq!(config.broker.username, "guest");
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
