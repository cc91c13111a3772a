//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests to the catalog, including:
//! - Building the HTTP client with user agent and timeouts
//! - Basic-auth credentials on every request
//! - Retry logic for transient failures
//! - Error classification

use crate::config::CatalogConfig;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Username and password sent with every catalog request
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl From<&CatalogConfig> for Credentials {
    fn from(config: &CatalogConfig) -> Self {
        Self::new(config.username.clone(), config.password.clone())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A successful response
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Bytes,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Why a page could not be fetched
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP {status}")]
    Status { status: u16 },
}

impl FetchError {
    /// Timeouts and server errors may succeed on a second attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Status { status } => *status >= 500,
            Self::Network(_) => false,
        }
    }
}

/// Fetch collaborator used by the crawl
///
/// Implementations return `Err` for network failures and non-2xx statuses.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url, credentials: &Credentials)
        -> Result<FetchResponse, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The catalog configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &CatalogConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.timeout_secs.min(10)))
        .gzip(true)
        .brotli(true)
        .build()
}

/// reqwest-backed fetcher
///
/// # Retry Logic
///
/// | Condition | Action |
/// |-----------|--------|
/// | HTTP 2xx | Success |
/// | HTTP 4xx | Immediate failure |
/// | HTTP 5xx | Retry up to `max_retries` times, `retry_delay` apart |
/// | Timeout | Retry up to `max_retries` times, `retry_delay` apart |
/// | Connection refused, TLS error | Immediate failure |
pub struct HttpFetcher {
    client: Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpFetcher {
    pub fn new(config: &CatalogConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::with_client(
            build_http_client(config)?,
            config.max_retries,
            Duration::from_millis(config.retry_delay_ms),
        ))
    }

    pub fn with_client(client: Client, max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            client,
            max_retries,
            retry_delay,
        }
    }

    async fn fetch_once(
        &self,
        url: &Url,
        credentials: &Credentials,
    ) -> Result<FetchResponse, FetchError> {
        let response = self
            .client
            .get(url.as_str())
            .basic_auth(&credentials.username, Some(&credentials.password))
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(classify)?;

        Ok(FetchResponse {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &Url,
        credentials: &Credentials,
    ) -> Result<FetchResponse, FetchError> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(url, credentials).await {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        "Fetching {} failed ({}), retry {}/{}",
                        url,
                        e,
                        attempt,
                        self.max_retries
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                result => return result,
            }
        }
    }
}

fn classify(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(e.to_string())
    }
}
