// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Telemetry component upgrades on cluster nodes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use stratus_core::node_filter::{Node, NodeFilter};
use stratus_core::ResourceId;
use tracing::{debug, info};

use crate::collaborators::{HostOrchestrator, OrchestratorMetadataProvider, TelemetryOrchestrator};
use crate::config::TelemetryUpgradeConfig;
use crate::error::{Result, ServiceError};

pub const DESIRED_CDP_TELEMETRY_VERSION: &str = "desiredCdpTelemetryVersion";
pub const DESIRED_LOGGING_AGENT_VERSION: &str = "desiredCdpLoggingAgentVersion";

/// Upgradable telemetry component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TelemetryComponent {
    CdpTelemetry,
    CdpLoggingAgent,
    Metering,
}

impl TelemetryComponent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CdpTelemetry => "CDP_TELEMETRY",
            Self::CdpLoggingAgent => "CDP_LOGGING_AGENT",
            Self::Metering => "METERING",
        }
    }
}

/// Upgrades telemetry components on the nodes of a stack.
pub struct TelemetryUpgradeService {
    config: TelemetryUpgradeConfig,
    metadata: Arc<dyn OrchestratorMetadataProvider>,
    telemetry: Arc<dyn TelemetryOrchestrator>,
    hosts: Arc<dyn HostOrchestrator>,
}

impl TelemetryUpgradeService {
    pub fn new(
        config: TelemetryUpgradeConfig,
        metadata: Arc<dyn OrchestratorMetadataProvider>,
        telemetry: Arc<dyn TelemetryOrchestrator>,
        hosts: Arc<dyn HostOrchestrator>,
    ) -> Self {
        Self {
            config,
            metadata,
            telemetry,
            hosts,
        }
    }

    /// Upgrade `component` on the stack's nodes, narrowed by `filter`.
    ///
    /// Metering is upgraded to the desired date; the other components get
    /// their desired version while the remaining version key is left empty.
    pub async fn upgrade_telemetry_component(
        &self,
        stack_id: ResourceId,
        component: TelemetryComponent,
        filter: Option<&NodeFilter>,
    ) -> Result<()> {
        let metadata = self.metadata.metadata(stack_id).await?;
        let nodes = match filter {
            Some(filter) => filter.apply(&metadata.nodes),
            None => metadata.nodes.clone(),
        };
        info!(
            stack_id,
            component = component.as_str(),
            nodes = nodes.len(),
            "Upgrading telemetry component"
        );

        match component {
            TelemetryComponent::Metering => {
                self.telemetry
                    .upgrade_metering(&metadata, &nodes, &self.config.metering_desired_date)
                    .await?;
            }
            TelemetryComponent::CdpLoggingAgent => {
                let versions = versions(&self.config.desired_logging_agent_version, "");
                self.telemetry
                    .update_telemetry_component(&metadata, &nodes, &versions)
                    .await?;
            }
            TelemetryComponent::CdpTelemetry => {
                let versions = versions("", &self.config.desired_cdp_telemetry_version);
                self.telemetry
                    .update_telemetry_component(&metadata, &nodes, &versions)
                    .await?;
            }
        }
        Ok(())
    }

    /// Refresh the configuration pillars of `components` on every node that
    /// still answers.
    pub async fn upgrade_telemetry_salt_pillars(
        &self,
        stack_id: ResourceId,
        components: &HashSet<TelemetryComponent>,
    ) -> Result<()> {
        let metadata = self.metadata.metadata(stack_id).await?;
        let unresponsive = self
            .telemetry
            .collect_unresponsive_nodes(&metadata, &metadata.nodes)
            .await?;
        let unresponsive_hosts: HashSet<&str> =
            unresponsive.iter().map(|n| n.hostname.as_str()).collect();
        let available: HashSet<Node> = metadata
            .nodes
            .iter()
            .filter(|n| !unresponsive_hosts.contains(n.hostname.as_str()))
            .cloned()
            .collect();

        if available.is_empty() {
            let message = format!("Not found any available nodes for stack: {}", stack_id);
            info!(stack_id, "{}", message);
            return Err(ServiceError::Orchestrator(message));
        }

        let mut names: Vec<String> = components.iter().map(|c| c.as_str().to_string()).collect();
        names.sort_unstable();
        debug!(
            stack_id,
            available = available.len(),
            unresponsive = unresponsive.len(),
            "Refreshing telemetry pillars"
        );
        self.hosts.init_salt_config(&metadata, &available, &names).await?;
        Ok(())
    }
}

fn versions(logging_agent: &str, cdp_telemetry: &str) -> HashMap<String, String> {
    HashMap::from([
        (DESIRED_LOGGING_AGENT_VERSION.to_string(), logging_agent.to_string()),
        (DESIRED_CDP_TELEMETRY_VERSION.to_string(), cdp_telemetry.to_string()),
    ])
}
