//! Per-API configuration.
//!
//! Everything here is plain data, loaded once when an API is registered and
//! never mutated afterwards.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::auth::{AuthConfig, RawAuthConfig};
use crate::http::DEFAULT_TIMEOUT;

/// Errors detected while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Authentication is required but the credential is absent
    #[error("Missing credential: {0}")]
    MissingCredential(String),
    /// The configured authentication does not satisfy the API's requirements
    #[error("Authentication mismatch: {0}")]
    AuthMismatch(String),
    /// The authentication section itself is malformed
    #[error("Invalid authentication config: {0}")]
    InvalidAuth(String),
    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("Invalid rate limit config: {0}")]
    InvalidRateLimit(String),
    #[error("Invalid retry config: {0}")]
    InvalidRetry(String),
    #[error("Invalid pagination config: {0}")]
    InvalidPagination(String),
    #[error("Invalid request timeout: {0}")]
    InvalidTimeout(String),
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

/// Request volume caps for one API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RateLimitConfig {
    /// Maximum requests per minute
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u64,
    /// Maximum requests per hour (defaults to 60x the minute cap)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_hour: Option<u64>,
    /// Maximum requests per day (defaults to 24x the hour cap)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_day: Option<u64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_requests_per_minute() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            requests_per_hour: None,
            requests_per_day: None,
            enabled: true,
        }
    }
}

impl RateLimitConfig {
    /// Rate limiting switched off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// A per-minute cap with derived hour/day caps.
    pub fn per_minute(requests_per_minute: u64) -> Self {
        Self {
            requests_per_minute,
            ..Self::default()
        }
    }

    pub fn hour_capacity(&self) -> u64 {
        self.requests_per_hour
            .unwrap_or_else(|| self.requests_per_minute.saturating_mul(60))
    }

    pub fn day_capacity(&self) -> u64 {
        match self.requests_per_hour {
            Some(hour) => self.requests_per_day.unwrap_or_else(|| hour.saturating_mul(24)),
            None => self
                .requests_per_day
                .unwrap_or_else(|| self.requests_per_minute.saturating_mul(60 * 24)),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if self.requests_per_minute == 0 || self.hour_capacity() == 0 || self.day_capacity() == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "request caps must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Retry behavior for transient failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay in seconds; attempt `n` waits `backoff_factor * 2^n`
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    /// Status codes that trigger a retry
    #[serde(default = "default_retry_status_codes")]
    pub retry_on_status_codes: Vec<u16>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_factor() -> f64 {
    0.5
}

fn default_retry_status_codes() -> Vec<u16> {
    vec![429, 500, 502, 503, 504]
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_factor: default_backoff_factor(),
            retry_on_status_codes: default_retry_status_codes(),
            enabled: true,
        }
    }
}

impl RetryConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.backoff_factor.is_finite() || self.backoff_factor < 0.0 {
            return Err(ConfigError::InvalidRetry(format!(
                "backoff_factor must be a non-negative number, got {}",
                self.backoff_factor
            )));
        }
        Ok(())
    }
}

/// How the next page of results is located.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaginationMechanism {
    /// Try link header, cursor, offset/limit, then page number
    #[default]
    Auto,
    /// RFC 5988 `Link` header with `rel="next"`
    Link,
    /// Opaque cursor read from the response body
    Cursor,
    /// Offset/limit query parameters
    Offset,
    /// Page-number query parameter
    Page,
}

/// Pagination behavior for one API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PaginationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub mechanism: PaginationMechanism,
    /// Maximum number of pages fetched per call
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// Query parameter carrying the cursor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_param: Option<String>,
    /// Response field holding the next cursor; dotted paths reach nested fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_response_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_param: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_param: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_param: Option<String>,
    /// Query parameter carrying the page size; a shorter page ends page pagination
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size_param: Option<String>,
    /// Response field holding the result array merged across pages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results_field: Option<String>,
}

fn default_max_pages() -> u32 {
    5
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mechanism: PaginationMechanism::Auto,
            max_pages: default_max_pages(),
            cursor_param: None,
            cursor_response_field: None,
            offset_param: None,
            limit_param: None,
            page_param: None,
            page_size_param: None,
            results_field: None,
        }
    }
}

impl PaginationConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if self.max_pages == 0 {
            return Err(ConfigError::InvalidPagination(
                "max_pages must be at least 1".to_string(),
            ));
        }
        let missing = match self.mechanism {
            PaginationMechanism::Cursor if self.cursor_param.is_none() => Some("cursor_param"),
            PaginationMechanism::Cursor if self.cursor_response_field.is_none() => {
                Some("cursor_response_field")
            }
            PaginationMechanism::Offset if self.offset_param.is_none() => Some("offset_param"),
            PaginationMechanism::Offset if self.limit_param.is_none() => Some("limit_param"),
            PaginationMechanism::Page if self.page_param.is_none() => Some("page_param"),
            _ => None,
        };
        if let Some(field) = missing {
            return Err(ConfigError::InvalidPagination(format!(
                "{:?} pagination requires '{}'",
                self.mechanism, field
            )));
        }
        Ok(())
    }
}

/// An OpenAPI security scheme, as declared by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SecuritySchemeSpec {
    /// `apiKey`, `http`, `oauth2`, ...
    #[serde(rename = "type")]
    pub scheme_type: String,
    /// HTTP scheme (`bearer`, `basic`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    /// API key name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// API key location
    #[serde(rename = "in", default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl SecuritySchemeSpec {
    pub fn api_key(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            scheme_type: "apiKey".to_string(),
            scheme: None,
            name: Some(name.into()),
            location: Some(location.into()),
        }
    }

    pub fn http(scheme: impl Into<String>) -> Self {
        Self {
            scheme_type: "http".to_string(),
            scheme: Some(scheme.into()),
            name: None,
            location: None,
        }
    }

    pub fn oauth2() -> Self {
        Self {
            scheme_type: "oauth2".to_string(),
            scheme: None,
            name: None,
            location: None,
        }
    }
}

/// One operation as produced by the OpenAPI collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OperationSpec {
    /// `"<METHOD> <path>"`, e.g. `"GET /users/{id}"`
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// The raw OpenAPI operation object
    #[serde(default)]
    pub spec: Value,
}

impl OperationSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, spec: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            spec,
        }
    }
}

/// Everything needed to expose one API as tools.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ApiConfig {
    /// Display name of the API
    pub name: String,
    /// Base URL every path is appended to
    pub base_url: String,
    #[serde(default)]
    #[schemars(with = "Option<RawAuthConfig>")]
    pub authentication: Option<AuthConfig>,
    #[serde(default)]
    pub rate_limits: RateLimitConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    /// Per-attempt HTTP timeout
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Declared security schemes, keyed by name
    #[serde(default)]
    pub security_schemes: BTreeMap<String, SecuritySchemeSpec>,
    /// Global security requirements
    #[serde(default)]
    pub security: Vec<BTreeMap<String, Vec<String>>>,
    /// Operations exposed as tools, in order
    #[serde(default)]
    pub operations: Vec<OperationSpec>,
}

impl ApiConfig {
    /// Creates a config with default limits and no operations.
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            authentication: None,
            rate_limits: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            pagination: PaginationConfig::default(),
            request_timeout_secs: default_timeout_secs(),
            security_schemes: BTreeMap::new(),
            security: Vec::new(),
            operations: Vec::new(),
        }
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.authentication = Some(auth);
        self
    }

    pub fn with_rate_limits(mut self, rate_limits: RateLimitConfig) -> Self {
        self.rate_limits = rate_limits;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_pagination(mut self, pagination: PaginationConfig) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn with_operation(mut self, operation: OperationSpec) -> Self {
        self.operations.push(operation);
        self
    }

    /// Declares a security scheme and makes it the global requirement.
    pub fn with_security_requirement(
        mut self,
        name: impl Into<String>,
        scheme: SecuritySchemeSpec,
    ) -> Self {
        let name = name.into();
        self.security_schemes.insert(name.clone(), scheme);
        self.security = vec![BTreeMap::from([(name, Vec::new())])];
        self
    }

    /// Parses a config from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a config from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// The JSON schema of the configuration file format.
    pub fn json_schema() -> Value {
        serde_json::to_value(schemars::schema_for!(ApiConfig)).unwrap_or(Value::Null)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Base URL without a trailing slash.
    pub fn normalized_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Validates every section. Authentication is checked separately, against
    /// the declared security requirements.
    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(self.normalized_base_url()).map_err(|e| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        self.rate_limits.validate()?;
        self.retry.validate()?;
        self.pagination.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let raw = r#"{"name": "demo", "base_url": "https://api.example.com/"}"#;
        let config = ApiConfig::from_json_str(raw).unwrap();
        assert_eq!(config.rate_limits, RateLimitConfig::default());
        assert_eq!(config.retry.retry_on_status_codes, vec![429, 500, 502, 503, 504]);
        assert_eq!(config.retry.backoff_factor, 0.5);
        assert_eq!(config.pagination.max_pages, 5);
        assert_eq!(config.pagination.mechanism, PaginationMechanism::Auto);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.normalized_base_url(), "https://api.example.com");
        assert!(config.authentication.is_none());
    }

    #[test]
    fn test_derived_capacities() {
        let minute_only = RateLimitConfig::per_minute(2);
        assert_eq!(minute_only.hour_capacity(), 120);
        assert_eq!(minute_only.day_capacity(), 2880);

        let with_hour = RateLimitConfig {
            requests_per_hour: Some(100),
            ..RateLimitConfig::per_minute(10)
        };
        assert_eq!(with_hour.hour_capacity(), 100);
        assert_eq!(with_hour.day_capacity(), 2400);
    }

    #[test]
    fn test_full_config_parses_auth() {
        let config: ApiConfig = serde_json::from_value(json!({
            "name": "demo",
            "base_url": "https://api.example.com",
            "authentication": {"type": "http", "scheme": "bearer", "value": "t"},
            "pagination": {
                "mechanism": "cursor",
                "cursor_param": "cursor",
                "cursor_response_field": "meta.next"
            },
            "operations": [{"name": "GET /items", "description": "List items", "spec": {}}]
        }))
        .unwrap();
        assert_eq!(config.authentication, Some(AuthConfig::bearer("t")));
        assert_eq!(config.pagination.mechanism, PaginationMechanism::Cursor);
        assert_eq!(config.operations.len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        let mut config = ApiConfig::new("demo", "not a url");
        assert!(matches!(config.validate(), Err(ConfigError::InvalidBaseUrl { .. })));

        config.base_url = "https://api.example.com".to_string();
        config.rate_limits = RateLimitConfig::per_minute(0);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRateLimit(_))));

        config.rate_limits = RateLimitConfig::default();
        config.retry.backoff_factor = -1.0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRetry(_))));

        config.retry = RetryConfig::default();
        config.pagination = PaginationConfig {
            mechanism: PaginationMechanism::Offset,
            offset_param: Some("offset".to_string()),
            ..PaginationConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPagination(_))));

        config.pagination = PaginationConfig {
            max_pages: 0,
            ..PaginationConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPagination(_))));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let config = ApiConfig::from_json_str(
            r#"{"name": "demo", "base_url": "https://api.example.com", "request_timeout_secs": 0}"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTimeout(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let body = json!({
            "name": "files",
            "base_url": "https://files.example.com",
            "rate_limits": {"requests_per_minute": 5}
        });
        write!(file, "{}", body).unwrap();
        let config = ApiConfig::from_file(file.path()).unwrap();
        assert_eq!(config.name, "files");
        assert_eq!(config.rate_limits.requests_per_minute, 5);

        assert!(matches!(
            ApiConfig::from_file("/nonexistent/api.json"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_json_schema_describes_fields() {
        let schema = ApiConfig::json_schema();
        let properties = &schema["properties"];
        assert!(properties.get("base_url").is_some());
        assert!(properties.get("pagination").is_some());
    }
}
