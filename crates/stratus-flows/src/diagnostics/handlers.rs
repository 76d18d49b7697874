// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Handlers of the diagnostics collection chain.
//!
//! Every handler owns the failure tag reported when it fails.

use std::sync::Arc;

use async_trait::async_trait;
use stratus_core::dispatch::{EventHandler, HandlerEvent};
use stratus_core::flow::ActionError;
use stratus_core::node_filter::NodeFilter;
use stratus_core::{Event, FailureType, ResourceId};
use tracing::debug;

use crate::collaborators::{
    DiagnosticParameters, DiagnosticsDestination, DiagnosticsOperations, MachineUserService,
};
use crate::telemetry::{TelemetryComponent, TelemetryUpgradeService};

use super::flow::{DiagnosticsEvent, DiagnosticsFlowEvent};

type Handled = Result<DiagnosticsFlowEvent, ActionError>;

pub(crate) fn diagnostics_failure(
    event: &DiagnosticsFlowEvent,
    error: &ActionError,
    failure_type: FailureType,
) -> DiagnosticsFlowEvent {
    Event::failure(
        event,
        DiagnosticsEvent::Failed,
        error.failure_type(failure_type),
        error.to_string(),
    )
}

/// Stamps the collection id and prepares the nodes.
pub struct InitHandler {
    operations: Arc<dyn DiagnosticsOperations>,
}

impl InitHandler {
    pub fn new(operations: Arc<dyn DiagnosticsOperations>) -> Self {
        Self { operations }
    }
}

#[async_trait]
impl EventHandler<DiagnosticsEvent, DiagnosticParameters> for InitHandler {
    fn selector(&self) -> DiagnosticsEvent {
        DiagnosticsEvent::Init
    }

    async fn accept(&self, event: HandlerEvent<'_, DiagnosticsEvent, DiagnosticParameters>) -> Handled {
        let mut parameters = event.event.payload.clone();
        parameters.uuid = event.flow_id.map(|id| id.to_string());
        debug!(
            resource_crn = %event.event.resource_crn,
            uuid = ?parameters.uuid,
            "Diagnostics collection initialization started"
        );
        self.operations.init(event.event.resource_id, &parameters).await?;
        Ok(event
            .event
            .follow_up_with(DiagnosticsEvent::StartUpgrade, parameters))
    }

    fn default_failure_event(
        &self,
        _resource_id: ResourceId,
        error: &ActionError,
        event: &DiagnosticsFlowEvent,
    ) -> DiagnosticsFlowEvent {
        diagnostics_failure(event, error, FailureType::InitializationFailure)
    }
}

/// Upgrades the telemetry component on the targeted nodes.
pub struct UpgradeTelemetryHandler {
    telemetry: Arc<TelemetryUpgradeService>,
}

impl UpgradeTelemetryHandler {
    pub fn new(telemetry: Arc<TelemetryUpgradeService>) -> Self {
        Self { telemetry }
    }
}

#[async_trait]
impl EventHandler<DiagnosticsEvent, DiagnosticParameters> for UpgradeTelemetryHandler {
    fn selector(&self) -> DiagnosticsEvent {
        DiagnosticsEvent::Upgrade
    }

    async fn accept(&self, event: HandlerEvent<'_, DiagnosticsEvent, DiagnosticParameters>) -> Handled {
        let parameters = &event.event.payload;
        let filter = NodeFilter {
            include_hosts: parameters.hosts.clone(),
            exclude_hosts: parameters.exclude_hosts.clone(),
            include_host_groups: parameters.host_groups.clone(),
            override_nodes: None,
        };
        debug!(filter = %filter, "Upgrading telemetry before diagnostics collection");
        self.telemetry
            .upgrade_telemetry_component(
                event.event.resource_id,
                TelemetryComponent::CdpTelemetry,
                Some(&filter),
            )
            .await?;
        Ok(event.event.follow_up(DiagnosticsEvent::StartEnsureMachineUser))
    }

    fn default_failure_event(
        &self,
        _resource_id: ResourceId,
        error: &ActionError,
        event: &DiagnosticsFlowEvent,
    ) -> DiagnosticsFlowEvent {
        diagnostics_failure(event, error, FailureType::UpgradeFailure)
    }
}

/// Creates the databus credential needed to ship a bundle to support.
pub struct EnsureMachineUserHandler {
    machine_users: Arc<dyn MachineUserService>,
}

impl EnsureMachineUserHandler {
    pub fn new(machine_users: Arc<dyn MachineUserService>) -> Self {
        Self { machine_users }
    }
}

#[async_trait]
impl EventHandler<DiagnosticsEvent, DiagnosticParameters> for EnsureMachineUserHandler {
    fn selector(&self) -> DiagnosticsEvent {
        DiagnosticsEvent::EnsureMachineUser
    }

    async fn accept(&self, event: HandlerEvent<'_, DiagnosticsEvent, DiagnosticParameters>) -> Handled {
        let mut parameters = event.event.payload.clone();
        if parameters.destination == DiagnosticsDestination::Support {
            debug!("Generating databus credential for support destination");
            let credential = self
                .machine_users
                .get_or_create_databus_credential(event.event.resource_id)
                .await?;
            parameters.support_bundle_dbus_access_key = Some(credential.access_key);
            parameters.support_bundle_dbus_private_key = Some(credential.private_key);
        }
        Ok(event
            .event
            .follow_up_with(DiagnosticsEvent::StartCollection, parameters))
    }

    fn default_failure_event(
        &self,
        _resource_id: ResourceId,
        error: &ActionError,
        event: &DiagnosticsFlowEvent,
    ) -> DiagnosticsFlowEvent {
        diagnostics_failure(event, error, FailureType::UmsResourceCheckFailure)
    }
}

pub struct CollectHandler {
    operations: Arc<dyn DiagnosticsOperations>,
}

impl CollectHandler {
    pub fn new(operations: Arc<dyn DiagnosticsOperations>) -> Self {
        Self { operations }
    }
}

#[async_trait]
impl EventHandler<DiagnosticsEvent, DiagnosticParameters> for CollectHandler {
    fn selector(&self) -> DiagnosticsEvent {
        DiagnosticsEvent::Collect
    }

    async fn accept(&self, event: HandlerEvent<'_, DiagnosticsEvent, DiagnosticParameters>) -> Handled {
        debug!(resource_crn = %event.event.resource_crn, "Diagnostics collection started");
        self.operations
            .collect(event.event.resource_id, &event.event.payload)
            .await?;
        Ok(event.event.follow_up(DiagnosticsEvent::StartCleanup))
    }

    fn default_failure_event(
        &self,
        _resource_id: ResourceId,
        error: &ActionError,
        event: &DiagnosticsFlowEvent,
    ) -> DiagnosticsFlowEvent {
        diagnostics_failure(event, error, FailureType::CollectionFailure)
    }
}

pub struct CleanupHandler {
    operations: Arc<dyn DiagnosticsOperations>,
}

impl CleanupHandler {
    pub fn new(operations: Arc<dyn DiagnosticsOperations>) -> Self {
        Self { operations }
    }
}

#[async_trait]
impl EventHandler<DiagnosticsEvent, DiagnosticParameters> for CleanupHandler {
    fn selector(&self) -> DiagnosticsEvent {
        DiagnosticsEvent::Cleanup
    }

    async fn accept(&self, event: HandlerEvent<'_, DiagnosticsEvent, DiagnosticParameters>) -> Handled {
        debug!(resource_crn = %event.event.resource_crn, "Diagnostics cleanup started");
        self.operations
            .cleanup(event.event.resource_id, &event.event.payload)
            .await?;
        Ok(event.event.follow_up(DiagnosticsEvent::Finish))
    }

    fn default_failure_event(
        &self,
        _resource_id: ResourceId,
        error: &ActionError,
        event: &DiagnosticsFlowEvent,
    ) -> DiagnosticsFlowEvent {
        diagnostics_failure(event, error, FailureType::CleanupFailure)
    }
}
