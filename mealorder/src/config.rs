//! Configuration management for the meal order service.
//!
//! Loads configuration from environment variables with sensible defaults.

use mealorder_runtime::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,
    /// Reactor delivery configuration
    pub reactor: ReactorConfig,
    /// Vendor dispatch configuration
    pub dispatch: DispatchConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directives (default: info)
    pub filter: String,
}

/// Retry settings for delivering derived order commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactorConfig {
    /// Retries after the first attempt (default: 5)
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds (default: 50)
    pub initial_delay_ms: u64,
    /// Backoff cap in milliseconds (default: 5000)
    pub max_delay_ms: u64,
    /// How often undelivered purchase order streams are retried, in
    /// milliseconds (default: 1000)
    pub sweep_interval_ms: u64,
}

/// Vendor dispatch configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Address purchase orders are created from in the demo
    pub sender_email: String,
}

impl Config {
    /// Read configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Read configuration through `lookup`, falling back to defaults for
    /// missing or unparsable values.
    #[must_use]
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            log: LogConfig {
                filter: lookup("MEALORDER_LOG").unwrap_or_else(|| "info".to_string()),
            },
            reactor: ReactorConfig {
                max_retries: lookup("MEALORDER_REACTOR_MAX_RETRIES")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
                initial_delay_ms: lookup("MEALORDER_REACTOR_INITIAL_DELAY_MS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(50),
                max_delay_ms: lookup("MEALORDER_REACTOR_MAX_DELAY_MS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5000),
                sweep_interval_ms: lookup("MEALORDER_REACTOR_SWEEP_INTERVAL_MS")
                    .and_then(|s| s.parse().ok())
                    .filter(|ms| *ms > 0)
                    .unwrap_or(1000),
            },
            dispatch: DispatchConfig {
                sender_email: lookup("MEALORDER_SENDER_EMAIL")
                    .unwrap_or_else(|| "office@example.com".to_string()),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_vars(|_| None)
    }
}

impl ReactorConfig {
    /// Backoff policy for reactor deliveries
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.max_retries)
            .initial_delay(Duration::from_millis(self.initial_delay_ms))
            .max_delay(Duration::from_millis(self.max_delay_ms))
            .build()
    }

    /// Pause between retries of undelivered purchase order streams
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}
