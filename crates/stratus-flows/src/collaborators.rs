// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Contracts of the external services the flows call.
//!
//! Every call may fail with [`CollaboratorError`]; transport failures are
//! retryable, not-found and rejections are not. Implementations live
//! outside this crate (HTTP clients, orchestrators) or in tests.

use std::collections::{HashMap, HashSet};
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stratus_core::node_filter::Node;
use stratus_core::ResourceId;

use crate::error::CollaboratorError;

pub type CallResult<T> = std::result::Result<T, CollaboratorError>;

// ============================================================================
// FreeIPA
// ============================================================================

/// Number of FreeIPA instances an environment should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AvailabilityType {
    NonHa,
    Ha,
}

impl AvailabilityType {
    pub fn instance_count(&self) -> u64 {
        match self {
            Self::NonHa => 1,
            Self::Ha => 3,
        }
    }
}

/// Coarse availability reported next to the detailed FreeIPA status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AvailabilityStatus {
    Available,
    Unavailable,
    Unknown,
}

impl AvailabilityStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceGroup {
    pub name: String,
    pub node_count: u64,
}

/// Result of describing an environment's FreeIPA.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeIpaDescription {
    /// Detailed status name, e.g. `AVAILABLE` or `UPDATE_IN_PROGRESS`.
    pub status: String,
    pub availability: Option<AvailabilityStatus>,
    pub instance_groups: Vec<InstanceGroup>,
}

/// State of an asynchronous FreeIPA operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationState {
    Running,
    Completed,
    Failed,
    Rejected,
    TimedOut,
}

impl OperationState {
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Rejected => "REJECTED",
            Self::TimedOut => "TIMEDOUT",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationStatus {
    pub operation_id: String,
    pub status: OperationState,
    pub error: Option<String>,
}

#[async_trait]
pub trait FreeIpaClient: Send + Sync {
    async fn describe(&self, environment_crn: &str) -> CallResult<FreeIpaDescription>;

    /// Start an upscale to `target`, returning the operation id.
    async fn upscale(&self, environment_crn: &str, target: AvailabilityType) -> CallResult<String>;

    async fn operation_status(&self, operation_id: &str, account_id: &str) -> CallResult<OperationStatus>;

    async fn delete(&self, environment_crn: &str, forced: bool) -> CallResult<()>;
}

// ============================================================================
// Environments
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnvironmentStatus {
    CreationInitiated,
    NetworkCreationInProgress,
    PublicKeyCreationInProgress,
    FreeipaCreationInProgress,
    Available,
    UpdateInitiated,
    CreateFailed,
    DeleteFailed,
    StopDatahubStarted,
    StopFreeipaStarted,
    EnvStopped,
    StartDatahubStarted,
    StartFreeipaStarted,
    Archived,
}

impl EnvironmentStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }

    /// Whether the network exists, i.e. creation moved past network setup.
    pub fn is_network_creation_finished(&self) -> bool {
        matches!(
            self,
            Self::PublicKeyCreationInProgress
                | Self::FreeipaCreationInProgress
                | Self::Available
                | Self::UpdateInitiated
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::CreateFailed | Self::DeleteFailed)
    }

    pub fn is_stop_in_progress_or_stopped(&self) -> bool {
        matches!(
            self,
            Self::StopDatahubStarted | Self::StopFreeipaStarted | Self::EnvStopped
        )
    }

    pub fn is_start_in_progress(&self) -> bool {
        matches!(self, Self::StartDatahubStarted | Self::StartFreeipaStarted)
    }
}

/// Detailed environment returned by the environment service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentDetails {
    pub crn: String,
    pub name: String,
    pub status: EnvironmentStatus,
}

/// Environment row as seen by the deletion service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentView {
    pub id: ResourceId,
    pub name: String,
    pub crn: String,
    pub account_id: String,
}

#[async_trait]
pub trait EnvironmentClient: Send + Sync {
    async fn describe(&self, environment_crn: &str) -> CallResult<EnvironmentDetails>;
}

/// Resources attached to an environment, consulted before deleting it.
#[async_trait]
pub trait EnvironmentResources: Send + Sync {
    /// Names of non-archived child environments.
    async fn child_environment_names(&self, environment: &EnvironmentView) -> CallResult<Vec<String>>;

    async fn attached_datahub_names(&self, environment: &EnvironmentView) -> CallResult<HashSet<String>>;

    async fn connected_experience_count(&self, environment: &EnvironmentView) -> CallResult<usize>;

    async fn attached_datalake_crns(&self, environment: &EnvironmentView) -> CallResult<HashSet<String>>;

    /// Datalakes known only to the legacy cluster API.
    async fn legacy_datalake_names(&self, environment: &EnvironmentView) -> CallResult<HashSet<String>>;

    /// Remove network, credentials and other environment-owned resources.
    async fn delete_environment_resources(&self, environment_crn: &str, forced: bool) -> CallResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatalakeSummary {
    pub crn: String,
    pub name: String,
}

#[async_trait]
pub trait DatalakeClient: Send + Sync {
    async fn list_datalakes(&self, environment_crn: &str) -> CallResult<Vec<DatalakeSummary>>;

    async fn delete_datalake(&self, datalake_crn: &str, forced: bool) -> CallResult<()>;
}

// ============================================================================
// Diagnostics and telemetry
// ============================================================================

/// Where a diagnostics bundle is shipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticsDestination {
    Support,
    CloudStorage,
    Eng,
    Local,
}

/// Parameters of one diagnostics collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticParameters {
    /// Collection id; set to the flow id when the collection starts.
    pub uuid: Option<String>,
    pub destination: DiagnosticsDestination,
    pub description: Option<String>,
    pub hosts: HashSet<String>,
    pub host_groups: HashSet<String>,
    pub exclude_hosts: HashSet<String>,
    pub support_bundle_dbus_access_key: Option<String>,
    #[serde(skip_serializing)]
    pub support_bundle_dbus_private_key: Option<String>,
}

impl DiagnosticParameters {
    pub fn new(destination: DiagnosticsDestination) -> Self {
        Self {
            uuid: None,
            destination,
            description: None,
            hosts: HashSet::new(),
            host_groups: HashSet::new(),
            exclude_hosts: HashSet::new(),
            support_bundle_dbus_access_key: None,
            support_bundle_dbus_private_key: None,
        }
    }
}

#[async_trait]
pub trait DiagnosticsOperations: Send + Sync {
    async fn init(&self, stack_id: ResourceId, parameters: &DiagnosticParameters) -> CallResult<()>;

    async fn collect(&self, stack_id: ResourceId, parameters: &DiagnosticParameters) -> CallResult<()>;

    async fn cleanup(&self, stack_id: ResourceId, parameters: &DiagnosticParameters) -> CallResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabusCredential {
    pub access_key: String,
    pub private_key: String,
}

#[async_trait]
pub trait MachineUserService: Send + Sync {
    async fn get_or_create_databus_credential(&self, stack_id: ResourceId) -> CallResult<DatabusCredential>;
}

/// Nodes and gateway of one stack, as known to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorMetadata {
    pub stack_id: ResourceId,
    pub nodes: HashSet<Node>,
}

#[async_trait]
pub trait OrchestratorMetadataProvider: Send + Sync {
    async fn metadata(&self, stack_id: ResourceId) -> CallResult<OrchestratorMetadata>;
}

#[async_trait]
pub trait TelemetryOrchestrator: Send + Sync {
    /// Push new desired component versions to `nodes`.
    async fn update_telemetry_component(
        &self,
        metadata: &OrchestratorMetadata,
        nodes: &HashSet<Node>,
        versions: &HashMap<String, String>,
    ) -> CallResult<()>;

    async fn upgrade_metering(
        &self,
        metadata: &OrchestratorMetadata,
        nodes: &HashSet<Node>,
        desired_date: &str,
    ) -> CallResult<()>;

    async fn collect_unresponsive_nodes(
        &self,
        metadata: &OrchestratorMetadata,
        nodes: &HashSet<Node>,
    ) -> CallResult<HashSet<Node>>;
}

#[async_trait]
pub trait HostOrchestrator: Send + Sync {
    /// Write configuration pillars for `components` to `nodes`.
    async fn init_salt_config(
        &self,
        metadata: &OrchestratorMetadata,
        nodes: &HashSet<Node>,
        components: &[String],
    ) -> CallResult<()>;
}
