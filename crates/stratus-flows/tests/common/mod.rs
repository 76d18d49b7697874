// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for stratus-flows tests.
//!
//! Hand-written collaborator fakes with scripted responses and call counters.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use stratus_core::node_filter::Node;
use stratus_core::polling::PollingConfig;
use stratus_core::{FlowRegistry, ResourceId};

use stratus_flows::collaborators::{
    AvailabilityStatus, AvailabilityType, CallResult, DatabusCredential, DatalakeClient,
    DatalakeSummary, DiagnosticParameters, DiagnosticsOperations, EnvironmentClient,
    EnvironmentDetails, EnvironmentResources, EnvironmentStatus, EnvironmentView, FreeIpaClient,
    FreeIpaDescription, HostOrchestrator, InstanceGroup, MachineUserService, OperationState,
    OperationStatus, OrchestratorMetadata, OrchestratorMetadataProvider, TelemetryOrchestrator,
};
use stratus_flows::CollaboratorError;

/// Route logs to the test writer; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// 1s interval, 60s timeout.
pub fn fast_polling() -> PollingConfig {
    PollingConfig::new(Duration::from_secs(1), Duration::from_secs(60))
}

pub fn env_crn(resource_id: ResourceId) -> String {
    format!("crn:cdp:environments:us-west-1:acme:environment:{}", resource_id)
}

pub fn environment(id: ResourceId, name: &str) -> EnvironmentView {
    EnvironmentView {
        id,
        name: name.to_string(),
        crn: env_crn(id),
        account_id: "acme".to_string(),
    }
}

pub fn names(items: &[&str]) -> HashSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// FreeIPA
// ============================================================================

pub struct FakeFreeIpa {
    pub node_count: AtomicU64,
    pub availability: Mutex<Option<AvailabilityStatus>>,
    pub status: Mutex<String>,
    /// Describe answers not-found.
    pub missing: AtomicBool,
    pub upscale_result: Mutex<CallResult<String>>,
    /// Popped per status call; `Completed` once empty.
    pub operation_statuses: Mutex<VecDeque<CallResult<OperationState>>>,
    pub delete_result: Mutex<CallResult<()>>,
    /// Describe calls after a delete that still find FreeIPA.
    pub polls_until_gone: AtomicU32,
    pub describe_calls: AtomicU32,
    pub upscale_calls: AtomicU32,
    pub status_calls: AtomicU32,
    pub delete_calls: AtomicU32,
    pub last_upscale_target: Mutex<Option<AvailabilityType>>,
}

impl FakeFreeIpa {
    pub fn with_nodes(count: u64) -> Self {
        Self {
            node_count: AtomicU64::new(count),
            availability: Mutex::new(Some(AvailabilityStatus::Available)),
            status: Mutex::new("AVAILABLE".to_string()),
            missing: AtomicBool::new(false),
            upscale_result: Mutex::new(Ok("op-1".to_string())),
            operation_statuses: Mutex::new(VecDeque::new()),
            delete_result: Mutex::new(Ok(())),
            polls_until_gone: AtomicU32::new(0),
            describe_calls: AtomicU32::new(0),
            upscale_calls: AtomicU32::new(0),
            status_calls: AtomicU32::new(0),
            delete_calls: AtomicU32::new(0),
            last_upscale_target: Mutex::new(None),
        }
    }

    pub fn push_status(&self, status: CallResult<OperationState>) {
        self.operation_statuses.lock().unwrap().push_back(status);
    }
}

#[async_trait]
impl FreeIpaClient for FakeFreeIpa {
    async fn describe(&self, environment_crn: &str) -> CallResult<FreeIpaDescription> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        if self.missing.load(Ordering::SeqCst) {
            return Err(CollaboratorError::NotFound(environment_crn.to_string()));
        }
        if self.delete_calls.load(Ordering::SeqCst) > 0 {
            let remaining = self.polls_until_gone.load(Ordering::SeqCst);
            if remaining == 0 {
                return Err(CollaboratorError::NotFound(environment_crn.to_string()));
            }
            self.polls_until_gone.store(remaining - 1, Ordering::SeqCst);
        }
        let count = self.node_count.load(Ordering::SeqCst);
        Ok(FreeIpaDescription {
            status: self.status.lock().unwrap().clone(),
            availability: *self.availability.lock().unwrap(),
            instance_groups: vec![InstanceGroup {
                name: "master".to_string(),
                node_count: count,
            }],
        })
    }

    async fn upscale(&self, _environment_crn: &str, target: AvailabilityType) -> CallResult<String> {
        self.upscale_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_upscale_target.lock().unwrap() = Some(target);
        self.upscale_result.lock().unwrap().clone()
    }

    async fn operation_status(&self, operation_id: &str, _account_id: &str) -> CallResult<OperationStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .operation_statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(OperationState::Completed));
        next.map(|status| OperationStatus {
            operation_id: operation_id.to_string(),
            status,
            error: match status {
                OperationState::Failed => Some("instance creation failed".to_string()),
                _ => None,
            },
        })
    }

    async fn delete(&self, _environment_crn: &str, _forced: bool) -> CallResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.delete_result.lock().unwrap().clone()
    }
}

// ============================================================================
// Environments
// ============================================================================

pub struct FakeEnvironmentClient {
    /// Popped per describe call; the last entry repeats.
    pub statuses: Mutex<VecDeque<CallResult<EnvironmentStatus>>>,
    pub describe_calls: AtomicU32,
    /// Registry entry marked cancelled while a describe call is in flight.
    pub cancel_during_describe: Mutex<Option<(Arc<FlowRegistry>, ResourceId)>>,
}

impl FakeEnvironmentClient {
    pub fn new(statuses: Vec<CallResult<EnvironmentStatus>>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            describe_calls: AtomicU32::new(0),
            cancel_during_describe: Mutex::new(None),
        }
    }
}

#[async_trait]
impl EnvironmentClient for FakeEnvironmentClient {
    async fn describe(&self, environment_crn: &str) -> CallResult<EnvironmentDetails> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        if let Some((registry, resource_id)) = self.cancel_during_describe.lock().unwrap().as_ref() {
            registry.mark_cancelled(*resource_id);
        }
        let status = {
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.len() > 1 {
                statuses.pop_front()
            } else {
                statuses.front().cloned()
            }
        }
        .unwrap_or(Ok(EnvironmentStatus::Available))?;
        Ok(EnvironmentDetails {
            crn: environment_crn.to_string(),
            name: "dev-env".to_string(),
            status,
        })
    }
}

#[derive(Default)]
pub struct FakeResources {
    pub children: Mutex<Vec<String>>,
    pub datahubs: Mutex<HashSet<String>>,
    pub experiences: Mutex<Option<CallResult<usize>>>,
    pub datalake_crns: Mutex<HashSet<String>>,
    pub legacy_datalakes: Mutex<HashSet<String>>,
    pub delete_result: Mutex<Option<CollaboratorError>>,
    pub child_calls: AtomicU32,
    pub legacy_calls: AtomicU32,
    pub delete_calls: AtomicU32,
}

#[async_trait]
impl EnvironmentResources for FakeResources {
    async fn child_environment_names(&self, _environment: &EnvironmentView) -> CallResult<Vec<String>> {
        self.child_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.children.lock().unwrap().clone())
    }

    async fn attached_datahub_names(&self, _environment: &EnvironmentView) -> CallResult<HashSet<String>> {
        Ok(self.datahubs.lock().unwrap().clone())
    }

    async fn connected_experience_count(&self, _environment: &EnvironmentView) -> CallResult<usize> {
        self.experiences.lock().unwrap().clone().unwrap_or(Ok(0))
    }

    async fn attached_datalake_crns(&self, _environment: &EnvironmentView) -> CallResult<HashSet<String>> {
        Ok(self.datalake_crns.lock().unwrap().clone())
    }

    async fn legacy_datalake_names(&self, _environment: &EnvironmentView) -> CallResult<HashSet<String>> {
        self.legacy_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.legacy_datalakes.lock().unwrap().clone())
    }

    async fn delete_environment_resources(&self, _environment_crn: &str, _forced: bool) -> CallResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        match self.delete_result.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Datalakes disappear from the listing once deleted.
#[derive(Default)]
pub struct FakeDatalakes {
    pub datalakes: Mutex<Vec<DatalakeSummary>>,
    /// Datalake CRNs whose deletion is refused.
    pub refuse: Mutex<HashSet<String>>,
    pub list_calls: AtomicU32,
    pub deleted: Mutex<Vec<String>>,
}

impl FakeDatalakes {
    pub fn with(crns: &[&str]) -> Self {
        let fake = Self::default();
        *fake.datalakes.lock().unwrap() = crns
            .iter()
            .map(|crn| DatalakeSummary {
                crn: crn.to_string(),
                name: format!("dl-{}", crn),
            })
            .collect();
        fake
    }
}

#[async_trait]
impl DatalakeClient for FakeDatalakes {
    async fn list_datalakes(&self, _environment_crn: &str) -> CallResult<Vec<DatalakeSummary>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.datalakes.lock().unwrap().clone())
    }

    async fn delete_datalake(&self, datalake_crn: &str, _forced: bool) -> CallResult<()> {
        if self.refuse.lock().unwrap().contains(datalake_crn) {
            return Err(CollaboratorError::Rejected(format!(
                "Datalake {} is being repaired",
                datalake_crn
            )));
        }
        self.datalakes.lock().unwrap().retain(|d| d.crn != datalake_crn);
        self.deleted.lock().unwrap().push(datalake_crn.to_string());
        Ok(())
    }
}

// ============================================================================
// Diagnostics and telemetry
// ============================================================================

#[derive(Default)]
pub struct FakeDiagnostics {
    /// Operation name ("init", "collect", "cleanup") to error message.
    pub fail_on: Mutex<HashMap<&'static str, String>>,
    pub calls: Mutex<Vec<(&'static str, DiagnosticParameters)>>,
}

impl FakeDiagnostics {
    pub fn failing(operation: &'static str, message: &str) -> Self {
        let fake = Self::default();
        fake.fail_on
            .lock()
            .unwrap()
            .insert(operation, message.to_string());
        fake
    }

    pub fn operations(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().iter().map(|(op, _)| *op).collect()
    }

    fn call(&self, operation: &'static str, parameters: &DiagnosticParameters) -> CallResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push((operation, parameters.clone()));
        match self.fail_on.lock().unwrap().get(operation) {
            Some(message) => Err(CollaboratorError::Rejected(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DiagnosticsOperations for FakeDiagnostics {
    async fn init(&self, _stack_id: ResourceId, parameters: &DiagnosticParameters) -> CallResult<()> {
        self.call("init", parameters)
    }

    async fn collect(&self, _stack_id: ResourceId, parameters: &DiagnosticParameters) -> CallResult<()> {
        self.call("collect", parameters)
    }

    async fn cleanup(&self, _stack_id: ResourceId, parameters: &DiagnosticParameters) -> CallResult<()> {
        self.call("cleanup", parameters)
    }
}

#[derive(Default)]
pub struct FakeMachineUsers {
    pub calls: AtomicU32,
}

#[async_trait]
impl MachineUserService for FakeMachineUsers {
    async fn get_or_create_databus_credential(&self, _stack_id: ResourceId) -> CallResult<DatabusCredential> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(DatabusCredential {
            access_key: "dbus-access".to_string(),
            private_key: "dbus-private".to_string(),
        })
    }
}

pub fn node(hostname: &str, ip: &str, group: &str) -> Node {
    Node::new(hostname, ip, group)
}

/// Three nodes: two masters and one worker.
pub fn cluster_nodes() -> HashSet<Node> {
    HashSet::from([
        node("master1", "10.0.0.1", "master"),
        node("master2", "10.0.0.2", "master"),
        node("worker1", "10.0.1.1", "worker"),
    ])
}

pub struct FakeMetadata {
    pub nodes: HashSet<Node>,
}

#[async_trait]
impl OrchestratorMetadataProvider for FakeMetadata {
    async fn metadata(&self, stack_id: ResourceId) -> CallResult<OrchestratorMetadata> {
        Ok(OrchestratorMetadata {
            stack_id,
            nodes: self.nodes.clone(),
        })
    }
}

/// What the telemetry orchestrator was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryCall {
    Update {
        nodes: HashSet<Node>,
        versions: HashMap<String, String>,
    },
    Metering {
        nodes: HashSet<Node>,
        desired_date: String,
    },
}

#[derive(Default)]
pub struct FakeTelemetryOrchestrator {
    pub unresponsive: Mutex<HashSet<Node>>,
    pub fail_with: Mutex<Option<CollaboratorError>>,
    pub calls: Mutex<Vec<TelemetryCall>>,
}

impl FakeTelemetryOrchestrator {
    pub fn calls(&self) -> Vec<TelemetryCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TelemetryOrchestrator for FakeTelemetryOrchestrator {
    async fn update_telemetry_component(
        &self,
        _metadata: &OrchestratorMetadata,
        nodes: &HashSet<Node>,
        versions: &HashMap<String, String>,
    ) -> CallResult<()> {
        if let Some(e) = self.fail_with.lock().unwrap().clone() {
            return Err(e);
        }
        self.calls.lock().unwrap().push(TelemetryCall::Update {
            nodes: nodes.clone(),
            versions: versions.clone(),
        });
        Ok(())
    }

    async fn upgrade_metering(
        &self,
        _metadata: &OrchestratorMetadata,
        nodes: &HashSet<Node>,
        desired_date: &str,
    ) -> CallResult<()> {
        self.calls.lock().unwrap().push(TelemetryCall::Metering {
            nodes: nodes.clone(),
            desired_date: desired_date.to_string(),
        });
        Ok(())
    }

    async fn collect_unresponsive_nodes(
        &self,
        _metadata: &OrchestratorMetadata,
        _nodes: &HashSet<Node>,
    ) -> CallResult<HashSet<Node>> {
        Ok(self.unresponsive.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct FakeHostOrchestrator {
    pub calls: Mutex<Vec<(HashSet<Node>, Vec<String>)>>,
}

#[async_trait]
impl HostOrchestrator for FakeHostOrchestrator {
    async fn init_salt_config(
        &self,
        _metadata: &OrchestratorMetadata,
        nodes: &HashSet<Node>,
        components: &[String],
    ) -> CallResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push((nodes.clone(), components.to_vec()));
        Ok(())
    }
}
