// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Waiting for an environment to reach a usable status.

use std::sync::Arc;

use stratus_core::polling::{wait_until, AbortKind, AttemptResult, PollingConfig};
use stratus_core::{FlowRegistry, ResourceId};
use tracing::{debug, info};

use crate::collaborators::{EnvironmentClient, EnvironmentDetails, EnvironmentStatus};
use crate::error::{CollaboratorError, Result};

/// Environment a resource waits on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitTarget {
    /// Resource whose registry entry cancels the wait.
    pub resource_id: ResourceId,
    pub environment_crn: String,
    pub environment_name: String,
}

pub struct EnvironmentWaitService {
    client: Arc<dyn EnvironmentClient>,
    registry: Arc<FlowRegistry>,
    polling: PollingConfig,
}

impl EnvironmentWaitService {
    pub fn new(client: Arc<dyn EnvironmentClient>, registry: Arc<FlowRegistry>, polling: PollingConfig) -> Self {
        Self {
            client,
            registry,
            polling,
        }
    }

    /// Wait with the configured polling until the environment is available.
    pub async fn wait_until_available(&self, target: &WaitTarget) -> Result<EnvironmentDetails> {
        self.wait_and_get_environment(target, &self.polling, EnvironmentStatus::is_available)
            .await
    }

    /// Wait with the configured polling until the environment network exists.
    pub async fn wait_until_network_ready(&self, target: &WaitTarget) -> Result<EnvironmentDetails> {
        self.wait_and_get_environment(
            target,
            &self.polling,
            EnvironmentStatus::is_network_creation_finished,
        )
        .await
    }

    /// Poll the environment until `status_check` holds and return it.
    ///
    /// Gives up early when the environment failed, is stopped or is
    /// starting, and when the resource's flow is cancelled.
    pub async fn wait_and_get_environment<C>(
        &self,
        target: &WaitTarget,
        polling: &PollingConfig,
        status_check: C,
    ) -> Result<EnvironmentDetails>
    where
        C: Fn(&EnvironmentStatus) -> bool,
    {
        let resource_id = target.resource_id;
        let registry = self.registry.clone();
        let status_check = &status_check;

        let environment = wait_until(
            polling,
            || registry.is_cancelled(resource_id),
            || async move {
                debug!(
                    resource_id,
                    environment = %target.environment_name,
                    "Polling environment status"
                );
                let environment = self.client.describe(&target.environment_crn).await?;
                if self.registry.is_cancelled(resource_id) {
                    return Ok(AttemptResult::abort(
                        AbortKind::Rejected,
                        format!(
                            "Environment wait polling cancelled in inmemory store, id: {}",
                            resource_id
                        ),
                    ));
                }
                Ok::<_, CollaboratorError>(classify(target, environment, status_check))
            },
        )
        .await?;

        info!(
            resource_id,
            environment = %target.environment_name,
            status = ?environment.status,
            "Environment reached expected status"
        );
        Ok(environment)
    }
}

fn classify<C>(target: &WaitTarget, environment: EnvironmentDetails, status_check: &C) -> AttemptResult<EnvironmentDetails>
where
    C: Fn(&EnvironmentStatus) -> bool,
{
    let status = environment.status;
    let name = &target.environment_name;
    if status_check(&status) {
        AttemptResult::Finish(environment)
    } else if status.is_failed() {
        AttemptResult::abort(
            AbortKind::TargetFailed,
            format!("Environment creation failed: {}", name),
        )
    } else if status.is_stop_in_progress_or_stopped() {
        AttemptResult::abort(
            AbortKind::TargetStopped,
            format!("Environment is in stopped status: {}", name),
        )
    } else if status.is_start_in_progress() {
        AttemptResult::abort(
            AbortKind::TargetStarting,
            format!("The environment is starting. Please wait until finished: {}", name),
        )
    } else {
        AttemptResult::Continue
    }
}
