//! Search query construction
//!
//! A [`SearchQuery`] is built once per run from configuration and never
//! changes afterwards. It renders the catalog's OpenSearch filter expression:
//!
//! ```text
//! footprint:"Intersects(<WKT polygon>)" AND beginPosition:[<range>] AND endPosition:[<range>]
//! ```
//!
//! and the seed URL that carries it in the `q` parameter.

use crate::config::{CatalogConfig, QueryConfig};
use crate::ConfigError;
use chrono::{DateTime, SecondsFormat, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use url::Url;

lazy_static! {
    // WKT polygon, outer ring plus optional holes
    static ref POLYGON_REGEX: Regex = Regex::new(
        r"(?i)^POLYGON\s*\(\s*\([-+0-9.eE\s,]+\)(\s*,\s*\([-+0-9.eE\s,]+\))*\s*\)$"
    )
    .expect("polygon pattern compiles");

    // Solr date math: NOW, offsets and rounding
    static ref DATE_MATH_REGEX: Regex = Regex::new(
        r"^NOW(([+-]\d+(YEARS?|MONTHS?|DAYS?|HOURS?|MINUTES?|SECONDS?))|(/(YEAR|MONTH|DAY|HOUR|MINUTE|SECOND)))*$"
    )
    .expect("date math pattern compiles");
}

/// One temporal bound of the search, a `<start> TO <end>` range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRange {
    start: String,
    end: String,
}

impl TimeRange {
    /// Parses a range expression such as `NOW-14DAYS TO NOW` or
    /// `2024-03-01T00:00:00.000Z TO NOW`
    ///
    /// Each side must be `*`, a `NOW` date-math expression or an RFC 3339
    /// timestamp. Surrounding brackets are tolerated.
    pub fn parse(expr: &str) -> Result<Self, ConfigError> {
        let trimmed = expr
            .trim()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .trim();

        let (start, end) = trimmed.split_once(" TO ").ok_or_else(|| {
            ConfigError::Validation(format!(
                "Time range '{}' must have the form '<start> TO <end>'",
                expr
            ))
        })?;

        let start = start.trim();
        let end = end.trim();
        validate_bound(start, expr)?;
        validate_bound(end, expr)?;

        Ok(Self {
            start: start.to_string(),
            end: end.to_string(),
        })
    }

    /// A range between two concrete instants
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: start.to_rfc3339_opts(SecondsFormat::Millis, true),
            end: end.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn end(&self) -> &str {
        &self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} TO {}", self.start, self.end)
    }
}

fn validate_bound(bound: &str, expr: &str) -> Result<(), ConfigError> {
    if bound == "*" {
        return Ok(());
    }

    if DATE_MATH_REGEX.is_match(bound) {
        return Ok(());
    }

    if DateTime::parse_from_rfc3339(bound).is_ok() {
        return Ok(());
    }

    Err(ConfigError::Validation(format!(
        "Invalid bound '{}' in time range '{}'",
        bound, expr
    )))
}

/// Immutable description of what one harvest run searches for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    endpoint: Url,
    polygon: String,
    begin: Option<TimeRange>,
    end: Option<TimeRange>,
    page_size: Option<u32>,
}

impl SearchQuery {
    /// Creates a query for scenes intersecting `polygon`
    ///
    /// # Returns
    ///
    /// * `Ok(SearchQuery)` - The endpoint and polygon are well formed
    /// * `Err(ConfigError)` - The endpoint is not an HTTP(S) URL or the polygon is not WKT
    pub fn new(endpoint: &str, polygon: &str) -> Result<Self, ConfigError> {
        let endpoint = Url::parse(endpoint.trim())
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid catalog endpoint: {}", e)))?;
        if endpoint.scheme() != "http" && endpoint.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(format!(
                "Catalog endpoint '{}' must use HTTP or HTTPS",
                endpoint
            )));
        }

        let polygon = polygon.trim();
        if !POLYGON_REGEX.is_match(polygon) {
            return Err(ConfigError::Validation(format!(
                "Footprint '{}' is not a WKT polygon",
                polygon
            )));
        }

        Ok(Self {
            endpoint,
            polygon: polygon.to_string(),
            begin: None,
            end: None,
            page_size: None,
        })
    }

    /// Builds the query described by the configuration file
    pub fn from_config(catalog: &CatalogConfig, query: &QueryConfig) -> Result<Self, ConfigError> {
        let mut search = Self::new(&catalog.endpoint, &query.polygon)?;

        if let Some(begin) = query.begin.as_deref() {
            search = search.with_begin(TimeRange::parse(begin)?);
        }
        if let Some(end) = query.end.as_deref() {
            search = search.with_end(TimeRange::parse(end)?);
        }
        if let Some(rows) = query.page_size {
            if rows == 0 {
                return Err(ConfigError::Validation(
                    "page_size must be >= 1 when set".to_string(),
                ));
            }
            search = search.with_page_size(rows);
        }

        Ok(search)
    }

    /// Restricts the sensing start time
    pub fn with_begin(mut self, range: TimeRange) -> Self {
        self.begin = Some(range);
        self
    }

    /// Restricts the sensing end time
    pub fn with_end(mut self, range: TimeRange) -> Self {
        self.end = Some(range);
        self
    }

    /// Requests `rows` results per page
    pub fn with_page_size(mut self, rows: u32) -> Self {
        self.page_size = Some(rows);
        self
    }

    /// Renders the unencoded filter expression sent in `q`
    pub fn filter_expression(&self) -> String {
        let mut clauses = vec![format!("footprint:\"Intersects({})\"", self.polygon)];

        if let Some(begin) = &self.begin {
            clauses.push(format!("beginPosition:[{}]", begin));
        }
        if let Some(end) = &self.end {
            clauses.push(format!("endPosition:[{}]", end));
        }

        clauses.join(" AND ")
    }

    /// The seed URL of a run: the endpoint with the encoded filter appended
    pub fn search_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("q", &self.filter_expression());
            if let Some(rows) = self.page_size {
                pairs.append_pair("rows", &rows.to_string());
            }
        }
        url
    }
}
