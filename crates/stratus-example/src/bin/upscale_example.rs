// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Upscale Example - Runs the FreeIPA upscale flow end to end.
//!
//! This example shows:
//! - Loading polling configuration from the environment
//! - Waiting for the environment to become available before upscaling
//! - Building the upscale engine with its wait handler
//! - Following the flow through the audit sink
//! - Cancelling a second run while it waits on the operation
//!
//! The environment and FreeIPA services are simulated in-process: the
//! environment becomes available and an upscale operation completes after a
//! few status polls.
//!
//! Run with: cargo run -p stratus-example --bin upscale_example

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use stratus_core::config::Config;
use stratus_core::polling::PollingConfig;
use stratus_core::sink::InMemoryEventSink;
use stratus_core::{FlowRegistry, StartRequest};
use stratus_flows::CollaboratorError;
use stratus_flows::collaborators::{
    AvailabilityStatus, AvailabilityType, CallResult, EnvironmentClient, EnvironmentDetails,
    EnvironmentStatus, FreeIpaClient, FreeIpaDescription, InstanceGroup, OperationState,
    OperationStatus,
};
use stratus_flows::environment::{EnvironmentWaitService, WaitTarget};
use stratus_flows::freeipa::{FreeIpaService, UpscaleFlow, UpscalePayload};
use tracing::info;

/// Environment that walks through creation, one status per describe call.
struct SimulatedEnvironment {
    describes: AtomicU32,
}

#[async_trait]
impl EnvironmentClient for SimulatedEnvironment {
    async fn describe(&self, environment_crn: &str) -> CallResult<EnvironmentDetails> {
        let status = match self.describes.fetch_add(1, Ordering::SeqCst) {
            0 => EnvironmentStatus::NetworkCreationInProgress,
            1 => EnvironmentStatus::PublicKeyCreationInProgress,
            2 => EnvironmentStatus::FreeipaCreationInProgress,
            _ => EnvironmentStatus::Available,
        };
        Ok(EnvironmentDetails {
            crn: environment_crn.to_string(),
            name: "demo-env".to_string(),
            status,
        })
    }
}

/// FreeIPA whose operations finish after `polls_to_complete` status reads.
struct SimulatedFreeIpa {
    nodes: AtomicU64,
    polls_to_complete: u32,
    polls: AtomicU32,
}

#[async_trait]
impl FreeIpaClient for SimulatedFreeIpa {
    async fn describe(&self, _environment_crn: &str) -> CallResult<FreeIpaDescription> {
        Ok(FreeIpaDescription {
            status: "AVAILABLE".to_string(),
            availability: Some(AvailabilityStatus::Available),
            instance_groups: vec![InstanceGroup {
                name: "master".to_string(),
                node_count: self.nodes.load(Ordering::SeqCst),
            }],
        })
    }

    async fn upscale(&self, environment_crn: &str, target: AvailabilityType) -> CallResult<String> {
        info!(environment_crn, ?target, "Simulated FreeIPA accepted upscale");
        self.polls.store(0, Ordering::SeqCst);
        Ok(format!("op-{}", target.instance_count()))
    }

    async fn operation_status(&self, operation_id: &str, _account_id: &str) -> CallResult<OperationStatus> {
        let polls = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        let status = if polls >= self.polls_to_complete {
            OperationState::Completed
        } else {
            OperationState::Running
        };
        Ok(OperationStatus {
            operation_id: operation_id.to_string(),
            status,
            error: None,
        })
    }

    async fn delete(&self, environment_crn: &str, _forced: bool) -> CallResult<()> {
        Err(CollaboratorError::Rejected(format!(
            "deletion is not simulated for {}",
            environment_crn
        )))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("=== Upscale Example: FreeIPA upscale flow ===");

    let config = Config::from_env()?;
    info!(
        interval_secs = config.freeipa_polling.interval.as_secs(),
        timeout_secs = config.freeipa_polling.timeout.as_secs(),
        "Loaded FreeIPA polling configuration"
    );
    // Keep the configured timeouts but poll fast enough for a demo.
    let polling = PollingConfig {
        interval: Duration::from_millis(200),
        ..config.freeipa_polling
    };
    let environment_polling = PollingConfig {
        interval: Duration::from_millis(200),
        ..config.environment_polling
    };

    let freeipa = Arc::new(SimulatedFreeIpa {
        nodes: AtomicU64::new(1),
        polls_to_complete: 3,
        polls: AtomicU32::new(0),
    });
    let registry = Arc::new(FlowRegistry::new());
    let sink = Arc::new(InMemoryEventSink::new());
    let engine = Arc::new(
        UpscaleFlow::engine_builder(
            FreeIpaService::new(freeipa.clone()),
            polling,
            registry.clone(),
        )
        .sink(sink.clone())
        .build(),
    );
    let environments = EnvironmentWaitService::new(
        Arc::new(SimulatedEnvironment {
            describes: AtomicU32::new(0),
        }),
        registry,
        environment_polling,
    );

    // Step 1: wait until the environment is usable
    let environment_crn = "crn:cdp:environments:us-west-1:demo:environment:42";
    let environment = environments
        .wait_until_available(&WaitTarget {
            resource_id: 42,
            environment_crn: environment_crn.to_string(),
            environment_name: "demo-env".to_string(),
        })
        .await?;
    info!(status = ?environment.status, "Environment ready for upscale");

    // Step 2: upscale a non-HA FreeIPA to HA
    let flow_id = engine
        .start(StartRequest::new(
            42,
            environment_crn,
            UpscalePayload::new(environment_crn, "demo"),
        ))
        .await?;
    if let Some(snapshot) = engine.get(flow_id) {
        info!(flow_id = %flow_id, status = %snapshot.status, path = ?snapshot.path(), "Upscale finished");
    }

    for record in sink.records() {
        info!(
            selector = record.selector,
            from = record.from_state,
            to = record.to_state.unwrap_or("-"),
            operation_id = record.operation_id.as_deref().unwrap_or("-"),
            "Audit record"
        );
    }
    if let Some(record) = sink.records().first() {
        info!("First payload: {}", serde_json::to_string_pretty(&record.payload)?);
    }

    // Step 3: the FreeIPA is HA now, so a second run is skipped
    freeipa.nodes.store(3, Ordering::SeqCst);
    let flow_id = engine
        .start(StartRequest::new(
            42,
            environment_crn,
            UpscalePayload::new(environment_crn, "demo"),
        ))
        .await?;
    if let Some(snapshot) = engine.get(flow_id) {
        info!(path = ?snapshot.path(), "Second upscale skipped");
    }

    // Step 4: cancel a run while it waits for the operation
    freeipa.nodes.store(1, Ordering::SeqCst);
    let handle = engine.submit(StartRequest::new(
        43,
        environment_crn,
        UpscalePayload::new(environment_crn, "demo"),
    ))?;
    tokio::time::sleep(Duration::from_millis(250)).await;
    if let Some(snapshot) = engine.cancel(43).await {
        info!(state = ?snapshot.state, status = %snapshot.status, "Cancelled waiting upscale");
    }
    match handle.wait().await {
        Ok(snapshot) => info!(status = %snapshot.status, "Upscale completed before the cancel arrived"),
        Err(e) => info!(error = %e, code = e.error_code(), "Upscale run ended"),
    }

    info!("=== Upscale Example Complete ===");
    Ok(())
}
