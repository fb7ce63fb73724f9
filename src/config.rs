//! Interceptor settings.
//!
//! Every field is optional and falls back to its default, so partial
//! configuration merges over the defaults:
//!
//! | field                  | default               | env override                      |
//! |------------------------|-----------------------|-----------------------------------|
//! | `hourly_request_limit` | 6000                  | `TOLLGATE_HOURLY_REQUEST_LIMIT`   |
//! | `minute_request_limit` | 200                   | `TOLLGATE_MINUTE_REQUEST_LIMIT`   |
//! | `second_request_limit` | 20                    | `TOLLGATE_SECOND_REQUEST_LIMIT`   |
//! | `prefix`               | `rate_limits:`        | `TOLLGATE_PREFIX`                 |
//! | `trusted_header_names` | `["X-Forwarded-For"]` | `TOLLGATE_TRUSTED_HEADERS` (csv)  |
//! | `redis_url`            | none                  | `TOLLGATE_REDIS_URL`              |
//! | `emit_headers`         | `false`               | `TOLLGATE_EMIT_HEADERS`           |
//!
//! A limit `<= 0` disables its window.

use crate::identity::IdentityResolver;
use crate::rate_limit::store::DEFAULT_PREFIX;
use crate::rate_limit::window::{
    WindowLimits, DEFAULT_HOURLY_LIMIT, DEFAULT_MINUTE_LIMIT, DEFAULT_SECOND_LIMIT,
};
use http::header::HeaderName;
use serde::Deserialize;

/// Errors produced when loading or validating settings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid trusted header name `{0}`")]
    InvalidHeaderName(String),
    #[error("key prefix must not be empty")]
    EmptyPrefix,
    #[error("invalid value `{value}` for {var}")]
    InvalidValue { var: &'static str, value: String },
}

/// Settings recognized by the interceptor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub hourly_request_limit: i64,
    pub minute_request_limit: i64,
    pub second_request_limit: i64,
    /// Namespace for every counter key.
    pub prefix: String,
    /// Proxy headers trusted to carry the client address, highest priority first.
    pub trusted_header_names: Vec<String>,
    /// Connection URL for the Redis counter store.
    pub redis_url: Option<String>,
    /// Attach `X-Rate-Limit-*` headers to responses.
    pub emit_headers: bool,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            hourly_request_limit: DEFAULT_HOURLY_LIMIT,
            minute_request_limit: DEFAULT_MINUTE_LIMIT,
            second_request_limit: DEFAULT_SECOND_LIMIT,
            prefix: DEFAULT_PREFIX.to_string(),
            trusted_header_names: vec!["X-Forwarded-For".to_string()],
            redis_url: None,
            emit_headers: false,
        }
    }
}

impl RateLimitSettings {
    /// Defaults overlaid with `TOLLGATE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overlaid with values from `lookup`, keyed by env var name.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(v) = parse_var(&lookup, "TOLLGATE_HOURLY_REQUEST_LIMIT")? {
            settings.hourly_request_limit = v;
        }
        if let Some(v) = parse_var(&lookup, "TOLLGATE_MINUTE_REQUEST_LIMIT")? {
            settings.minute_request_limit = v;
        }
        if let Some(v) = parse_var(&lookup, "TOLLGATE_SECOND_REQUEST_LIMIT")? {
            settings.second_request_limit = v;
        }
        if let Some(v) = parse_var(&lookup, "TOLLGATE_EMIT_HEADERS")? {
            settings.emit_headers = v;
        }
        if let Some(prefix) = lookup("TOLLGATE_PREFIX") {
            settings.prefix = prefix;
        }
        if let Some(headers) = lookup("TOLLGATE_TRUSTED_HEADERS") {
            settings.trusted_header_names = headers
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(url) = lookup("TOLLGATE_REDIS_URL") {
            settings.redis_url = Some(url);
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Check the prefix and header names.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefix.is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }
        self.trusted_headers().map(|_| ())
    }

    /// Windows enabled by the three limits.
    pub fn window_limits(&self) -> WindowLimits {
        WindowLimits::standard(
            self.hourly_request_limit,
            self.minute_request_limit,
            self.second_request_limit,
        )
    }

    fn trusted_headers(&self) -> Result<Vec<HeaderName>, ConfigError> {
        self.trusted_header_names
            .iter()
            .map(|name| {
                HeaderName::try_from(name.as_str())
                    .map_err(|_| ConfigError::InvalidHeaderName(name.clone()))
            })
            .collect()
    }

    /// Resolver trusting the configured headers.
    pub fn identity_resolver(&self) -> Result<IdentityResolver, ConfigError> {
        Ok(IdentityResolver::new(self.trusted_headers()?))
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value }),
    }
}
