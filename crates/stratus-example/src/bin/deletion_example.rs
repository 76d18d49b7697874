// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deletion Example - Validates and deletes environments.
//!
//! This example shows:
//! - A rejected deletion of an environment with attached Data Hubs
//! - A cascading deletion that removes datalakes and FreeIPA first
//! - Waiting on the submitted flow through its handle
//!
//! Datalakes, FreeIPA and environment resources are simulated in-process.
//!
//! Run with: cargo run -p stratus-example --bin deletion_example

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use stratus_core::config::Config;
use stratus_core::flow::FlowEngine;
use stratus_core::polling::PollingConfig;
use stratus_core::sink::InMemoryEventSink;
use stratus_flows::CollaboratorError;
use stratus_flows::collaborators::{
    AvailabilityStatus, AvailabilityType, CallResult, DatalakeClient, DatalakeSummary,
    EnvironmentResources, EnvironmentView, FreeIpaClient, FreeIpaDescription, OperationStatus,
};
use stratus_flows::environment::{CascadingDeleteFlow, EnvironmentDeletionService};
use tracing::{info, warn};

struct SimulatedDatalakes {
    datalakes: Mutex<Vec<DatalakeSummary>>,
}

#[async_trait]
impl DatalakeClient for SimulatedDatalakes {
    async fn list_datalakes(&self, _environment_crn: &str) -> CallResult<Vec<DatalakeSummary>> {
        Ok(self.datalakes.lock().map_err(|e| CollaboratorError::Transport(e.to_string()))?.clone())
    }

    async fn delete_datalake(&self, datalake_crn: &str, _forced: bool) -> CallResult<()> {
        info!(datalake_crn, "Simulated datalake deleted");
        self.datalakes
            .lock()
            .map_err(|e| CollaboratorError::Transport(e.to_string()))?
            .retain(|d| d.crn != datalake_crn);
        Ok(())
    }
}

struct SimulatedFreeIpa {
    deleted: AtomicBool,
}

#[async_trait]
impl FreeIpaClient for SimulatedFreeIpa {
    async fn describe(&self, environment_crn: &str) -> CallResult<FreeIpaDescription> {
        if self.deleted.load(Ordering::SeqCst) {
            return Err(CollaboratorError::NotFound(environment_crn.to_string()));
        }
        Ok(FreeIpaDescription {
            status: "AVAILABLE".to_string(),
            availability: Some(AvailabilityStatus::Available),
            instance_groups: Vec::new(),
        })
    }

    async fn upscale(&self, environment_crn: &str, _target: AvailabilityType) -> CallResult<String> {
        Err(CollaboratorError::Rejected(format!(
            "upscale is not simulated for {}",
            environment_crn
        )))
    }

    async fn operation_status(&self, operation_id: &str, _account_id: &str) -> CallResult<OperationStatus> {
        Err(CollaboratorError::NotFound(operation_id.to_string()))
    }

    async fn delete(&self, environment_crn: &str, _forced: bool) -> CallResult<()> {
        info!(environment_crn, "Simulated FreeIPA deleted");
        self.deleted.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Environment with one attached Data Hub and nothing else.
struct SimulatedResources;

#[async_trait]
impl EnvironmentResources for SimulatedResources {
    async fn child_environment_names(&self, _environment: &EnvironmentView) -> CallResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn attached_datahub_names(&self, _environment: &EnvironmentView) -> CallResult<HashSet<String>> {
        Ok(HashSet::from(["analytics-hub".to_string()]))
    }

    async fn connected_experience_count(&self, _environment: &EnvironmentView) -> CallResult<usize> {
        Ok(0)
    }

    async fn attached_datalake_crns(&self, _environment: &EnvironmentView) -> CallResult<HashSet<String>> {
        Ok(HashSet::new())
    }

    async fn legacy_datalake_names(&self, _environment: &EnvironmentView) -> CallResult<HashSet<String>> {
        Ok(HashSet::new())
    }

    async fn delete_environment_resources(&self, environment_crn: &str, _forced: bool) -> CallResult<()> {
        info!(environment_crn, "Simulated network and credentials deleted");
        Ok(())
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

    info!("=== Deletion Example: environment deletion ===");

    let config = Config::from_env()?;
    let polling = PollingConfig {
        interval: Duration::from_millis(200),
        ..config.deletion_polling
    };

    let environment = EnvironmentView {
        id: 7,
        name: "demo-env".to_string(),
        crn: "crn:cdp:environments:us-west-1:demo:environment:7".to_string(),
        account_id: "demo".to_string(),
    };
    let datalakes = Arc::new(SimulatedDatalakes {
        datalakes: Mutex::new(vec![DatalakeSummary {
            crn: "crn:cdp:datalake:us-west-1:demo:datalake:1".to_string(),
            name: "demo-dl".to_string(),
        }]),
    });
    let resources = Arc::new(SimulatedResources);
    let sink = Arc::new(InMemoryEventSink::new());
    let flow = CascadingDeleteFlow::new(
        datalakes,
        Arc::new(SimulatedFreeIpa {
            deleted: AtomicBool::new(false),
        }),
        resources.clone(),
        polling,
    );
    let engine = Arc::new(FlowEngine::builder(flow).sink(sink.clone()).build());
    let service = EnvironmentDeletionService::new(resources, engine.clone());
    let user_crn = "crn:altus:iam:us-west-1:demo:user:operator";

    // Step 1: a plain deletion is refused while a Data Hub is attached
    match service.delete(&environment, user_crn, false, false).await {
        Ok(_) => warn!("Deletion unexpectedly accepted"),
        Err(e) => info!(code = e.error_code(), error = %e, "Deletion rejected"),
    }

    // Step 2: a cascading deletion removes everything
    let handle = service.delete(&environment, user_crn, true, false).await?;
    info!(flow_id = %handle.flow_id, "Cascading deletion submitted");
    let snapshot = handle.wait().await?;
    info!(status = %snapshot.status, path = ?snapshot.path(), "Cascading deletion finished");

    for record in sink.records() {
        info!(
            selector = record.selector,
            from = record.from_state,
            to = record.to_state.unwrap_or("-"),
            "Audit record"
        );
    }

    info!("=== Deletion Example Complete ===");
    Ok(())
}
