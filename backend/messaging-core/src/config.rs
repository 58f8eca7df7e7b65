use crate::rate_limit::{RateLimitConfig, MAX_WINDOW_SECONDS};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("{0}")]
    OutOfRange(String),
}

#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub rate_limit: RateLimitConfig,
    /// Upper bound on a single identity directory call
    pub identity_timeout_ms: u64,
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// Maximum message length in characters
    pub max_content_length: usize,
    pub event_channel_capacity: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            identity_timeout_ms: 500,
            default_page_size: 20,
            max_page_size: 200,
            max_content_length: 10_000,
            event_channel_capacity: 1024,
        }
    }
}

impl CoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            rate_limit: RateLimitConfig {
                max_events: parse_or(
                    &lookup,
                    "MESSAGING_RATE_LIMIT_MAX_EVENTS",
                    defaults.rate_limit.max_events,
                )?,
                window_seconds: parse_or(
                    &lookup,
                    "MESSAGING_RATE_LIMIT_WINDOW_SECONDS",
                    defaults.rate_limit.window_seconds,
                )?,
                sweep_interval_seconds: parse_or(
                    &lookup,
                    "MESSAGING_RATE_LIMIT_SWEEP_SECONDS",
                    defaults.rate_limit.sweep_interval_seconds,
                )?,
            },
            identity_timeout_ms: parse_or(
                &lookup,
                "MESSAGING_IDENTITY_TIMEOUT_MS",
                defaults.identity_timeout_ms,
            )?,
            default_page_size: parse_or(
                &lookup,
                "MESSAGING_DEFAULT_PAGE_SIZE",
                defaults.default_page_size,
            )?,
            max_page_size: parse_or(&lookup, "MESSAGING_MAX_PAGE_SIZE", defaults.max_page_size)?,
            max_content_length: parse_or(
                &lookup,
                "MESSAGING_MAX_CONTENT_LENGTH",
                defaults.max_content_length,
            )?,
            event_channel_capacity: parse_or(
                &lookup,
                "MESSAGING_EVENT_CHANNEL_CAPACITY",
                defaults.event_channel_capacity,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.max_events == 0 {
            return Err(ConfigError::OutOfRange(
                "MESSAGING_RATE_LIMIT_MAX_EVENTS must be at least 1".into(),
            ));
        }
        if self.rate_limit.window_seconds == 0 {
            return Err(ConfigError::OutOfRange(
                "MESSAGING_RATE_LIMIT_WINDOW_SECONDS must be at least 1".into(),
            ));
        }
        if self.rate_limit.window_seconds > MAX_WINDOW_SECONDS {
            return Err(ConfigError::OutOfRange(format!(
                "MESSAGING_RATE_LIMIT_WINDOW_SECONDS must be at most {MAX_WINDOW_SECONDS}"
            )));
        }
        if self.max_page_size == 0 || self.default_page_size == 0 {
            return Err(ConfigError::OutOfRange("page sizes must be at least 1".into()));
        }
        if self.default_page_size > self.max_page_size {
            return Err(ConfigError::OutOfRange(format!(
                "default page size {} exceeds max page size {}",
                self.default_page_size, self.max_page_size
            )));
        }
        if self.event_channel_capacity == 0 {
            return Err(ConfigError::OutOfRange(
                "MESSAGING_EVENT_CHANNEL_CAPACITY must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn identity_timeout(&self) -> Duration {
        Duration::from_millis(self.identity_timeout_ms)
    }

    /// Clamp a requested page size into `[1, max_page_size]`
    pub fn page_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size)
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}
