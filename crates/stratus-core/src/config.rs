// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::time::Duration;

use crate::polling::PollingConfig;

/// Stratus engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Environment readiness waits
    pub environment_polling: PollingConfig,
    /// FreeIPA operation waits
    pub freeipa_polling: PollingConfig,
    /// Datalake / FreeIPA deletion waits during cascading deletion
    pub deletion_polling: PollingConfig,
}

impl Default for Config {
    fn default() -> Self {
        let polling = PollingConfig::new(Duration::from_secs(10), Duration::from_secs(60 * 60));
        Self {
            environment_polling: polling,
            freeipa_polling: polling,
            deletion_polling: polling,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `STRATUS_ENVIRONMENT_POLL_INTERVAL_SECS` (default: 10)
    /// - `STRATUS_ENVIRONMENT_POLL_DURATION_MINS` (default: 60)
    /// - `STRATUS_FREEIPA_POLL_INTERVAL_SECS` (default: 10)
    /// - `STRATUS_FREEIPA_POLL_DURATION_MINS` (default: 60)
    /// - `STRATUS_DELETION_POLL_INTERVAL_SECS` (default: 10)
    /// - `STRATUS_DELETION_POLL_DURATION_MINS` (default: 60)
    /// - `STRATUS_STOP_POLLING_ON_ERROR`: Abort a wait on the first failed attempt (default: false)
    pub fn from_env() -> Result<Self, ConfigError> {
        let stop_on_error: bool = std::env::var("STRATUS_STOP_POLLING_ON_ERROR")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("STRATUS_STOP_POLLING_ON_ERROR", "must be true or false")
            })?;

        let environment_polling = polling_from_env(
            "STRATUS_ENVIRONMENT_POLL_INTERVAL_SECS",
            "STRATUS_ENVIRONMENT_POLL_DURATION_MINS",
            stop_on_error,
        )?;
        let freeipa_polling = polling_from_env(
            "STRATUS_FREEIPA_POLL_INTERVAL_SECS",
            "STRATUS_FREEIPA_POLL_DURATION_MINS",
            stop_on_error,
        )?;
        let deletion_polling = polling_from_env(
            "STRATUS_DELETION_POLL_INTERVAL_SECS",
            "STRATUS_DELETION_POLL_DURATION_MINS",
            stop_on_error,
        )?;

        Ok(Self {
            environment_polling,
            freeipa_polling,
            deletion_polling,
        })
    }
}

fn polling_from_env(
    interval_var: &'static str,
    duration_var: &'static str,
    stop_on_error: bool,
) -> Result<PollingConfig, ConfigError> {
    let interval_secs: u64 = std::env::var(interval_var)
        .unwrap_or_else(|_| "10".to_string())
        .parse()
        .map_err(|_| ConfigError::Invalid(interval_var, "must be a positive integer"))?;
    if interval_secs == 0 {
        return Err(ConfigError::Invalid(interval_var, "must be greater than zero"));
    }

    let duration_mins: u64 = std::env::var(duration_var)
        .unwrap_or_else(|_| "60".to_string())
        .parse()
        .map_err(|_| ConfigError::Invalid(duration_var, "must be a positive integer"))?;
    let duration_secs = duration_mins
        .checked_mul(60)
        .ok_or(ConfigError::Invalid(duration_var, "is too large"))?;

    Ok(PollingConfig {
        interval: Duration::from_secs(interval_secs),
        timeout: Duration::from_secs(duration_secs),
        stop_on_error,
    })
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
