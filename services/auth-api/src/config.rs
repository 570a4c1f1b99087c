//! Type-Safe Configuration with Validation
//!
//! Environment-driven configuration. `.env` files are honoured through
//! `dotenvy`; tests feed values through [`Config::from_lookup`] instead.

use std::env;
use std::time::Duration;

use rust_common::{CircuitBreakerConfig, HttpConfig, MAX_DURATION, TracingConfig};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

use crate::jwt::HmacTokenIssuer;

/// Service name used for logs and the HTTP user agent.
pub const SERVICE_NAME: &str = "auth-api";

/// Largest accepted value for any duration setting, in seconds.
const MAX_DURATION_SECS: u64 = MAX_DURATION.as_secs();

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid URL format
    #[error("Invalid URL for {field}: {reason}")]
    InvalidUrl { field: String, reason: String },

    /// Invalid threshold value
    #[error("Invalid {field}: must be greater than 0")]
    InvalidThreshold { field: String },

    /// Invalid timeout value
    #[error("Invalid {field}: must be greater than 0 and at most {MAX_DURATION_SECS} seconds")]
    InvalidTimeout { field: String },

    /// Missing required field
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    /// Environment variable parse error
    #[error("Failed to parse environment variable {name}: {reason}")]
    ParseError { name: String, reason: String },
}

/// Service configuration with validation.
#[derive(Debug, Clone)]
pub struct Config {
    /// Users API base URL
    pub user_api_address: Url,
    /// HS256 secret shared with the users API
    pub jwt_secret: SecretString,
    /// Circuit breaker name
    pub circuit_breaker_name: String,
    /// Consecutive failures that open the circuit (must be > 0)
    pub circuit_breaker_failure_threshold: u32,
    /// Seconds spent open before probing (must be > 0)
    pub circuit_breaker_open_timeout_secs: u64,
    /// Trial calls admitted while half-open (must be > 0)
    pub circuit_breaker_half_open_max_requests: u32,
    /// Closed-state counting window in seconds, 0 disables clearing
    pub circuit_breaker_interval_secs: u64,
    /// Upstream request timeout in seconds (must be > 0)
    pub request_timeout_secs: u64,
    /// Bearer token lifetime in seconds (must be > 0)
    pub token_ttl_secs: u64,
    /// Log level filter
    pub log_level: String,
    /// JSON log output
    pub log_json: bool,
}

impl Config {
    /// Loads configuration from environment variables with validation.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for missing, unparsable or invalid values.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for missing, unparsable or invalid values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|secret| !secret.is_empty())
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingRequired("JWT_SECRET".to_string()))?;

        let config = Self {
            user_api_address: parse_url(&lookup, "USER_API_ADDRESS", "http://127.0.0.1:8083")?,
            jwt_secret,
            circuit_breaker_name: lookup("CB_NAME").unwrap_or_else(|| "users-api".to_string()),
            circuit_breaker_failure_threshold: parse(&lookup, "CB_FAILURE_THRESHOLD", 5)?,
            circuit_breaker_open_timeout_secs: parse(&lookup, "CB_OPEN_TIMEOUT", 10)?,
            circuit_breaker_half_open_max_requests: parse(&lookup, "CB_HALF_OPEN_MAX_REQUESTS", 3)?,
            circuit_breaker_interval_secs: parse(&lookup, "CB_INTERVAL", 30)?,
            request_timeout_secs: parse(&lookup, "REQUEST_TIMEOUT", 10)?,
            token_ttl_secs: parse(&lookup, "TOKEN_TTL", 60)?,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_json: parse(&lookup, "LOG_JSON", false)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.expose_secret().is_empty() {
            return Err(ConfigError::MissingRequired("JWT_SECRET".to_string()));
        }
        if self.circuit_breaker_name.is_empty() {
            return Err(ConfigError::MissingRequired("CB_NAME".to_string()));
        }
        if self.circuit_breaker_failure_threshold == 0 {
            return Err(ConfigError::InvalidThreshold {
                field: "CB_FAILURE_THRESHOLD".to_string(),
            });
        }
        if self.circuit_breaker_half_open_max_requests == 0 {
            return Err(ConfigError::InvalidThreshold {
                field: "CB_HALF_OPEN_MAX_REQUESTS".to_string(),
            });
        }
        let durations = [
            ("CB_OPEN_TIMEOUT", self.circuit_breaker_open_timeout_secs, false),
            ("CB_INTERVAL", self.circuit_breaker_interval_secs, true),
            ("REQUEST_TIMEOUT", self.request_timeout_secs, false),
            ("TOKEN_TTL", self.token_ttl_secs, false),
        ];
        for (field, secs, zero_allowed) in durations {
            if (secs == 0 && !zero_allowed) || secs > MAX_DURATION_SECS {
                return Err(ConfigError::InvalidTimeout {
                    field: field.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Upstream request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Breaker tunables. The state-change observer is attached by the caller.
    #[must_use]
    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new(&self.circuit_breaker_name)
            .with_failure_threshold(self.circuit_breaker_failure_threshold)
            .with_open_timeout(Duration::from_secs(self.circuit_breaker_open_timeout_secs))
            .with_half_open_max_requests(self.circuit_breaker_half_open_max_requests)
            .with_interval(Duration::from_secs(self.circuit_breaker_interval_secs))
    }

    /// HTTP client settings for the users API.
    #[must_use]
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig::default()
            .with_timeout(self.request_timeout())
            .with_user_agent(format!("{SERVICE_NAME}/{}", env!("CARGO_PKG_VERSION")))
    }

    /// Logging settings.
    #[must_use]
    pub fn tracing_config(&self) -> TracingConfig {
        TracingConfig::default()
            .with_service_name(SERVICE_NAME)
            .with_log_level(&self.log_level)
            .with_json_output(self.log_json)
    }

    /// Bearer token issuer for the users API.
    #[must_use]
    pub fn token_issuer(&self) -> HmacTokenIssuer {
        HmacTokenIssuer::new(
            self.jwt_secret.clone(),
            Duration::from_secs(self.token_ttl_secs),
        )
    }
}

/// Parse a variable with a default value.
fn parse<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(val) => val.trim().parse().map_err(|e: T::Err| ConfigError::ParseError {
            name: name.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Parse a URL variable with a default value.
fn parse_url<F>(lookup: &F, name: &str, default: &str) -> Result<Url, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let url_str = lookup(name).unwrap_or_else(|| default.to_string());
    Url::parse(&url_str).map_err(|e| ConfigError::InvalidUrl {
        field: name.to_string(),
        reason: e.to_string(),
    })
}
