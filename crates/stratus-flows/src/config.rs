// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Telemetry upgrade configuration loaded from environment variables.

/// Desired versions of node telemetry components.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryUpgradeConfig {
    /// Target version of the CDP telemetry package.
    pub desired_cdp_telemetry_version: String,
    /// Target version of the logging agent.
    pub desired_logging_agent_version: String,
    /// Release date of the metering agent to install.
    pub metering_desired_date: String,
}

impl TelemetryUpgradeConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional (default: empty):
    /// - `STRATUS_DESIRED_CDP_TELEMETRY_VERSION`
    /// - `STRATUS_DESIRED_LOGGING_AGENT_VERSION`
    /// - `STRATUS_METERING_DESIRED_DATE`
    pub fn from_env() -> Self {
        Self {
            desired_cdp_telemetry_version: std::env::var("STRATUS_DESIRED_CDP_TELEMETRY_VERSION")
                .unwrap_or_default(),
            desired_logging_agent_version: std::env::var("STRATUS_DESIRED_LOGGING_AGENT_VERSION")
                .unwrap_or_default(),
            metering_desired_date: std::env::var("STRATUS_METERING_DESIRED_DATE")
                .unwrap_or_default(),
        }
    }
}
