// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Validating and triggering environment deletion.

use std::collections::HashSet;
use std::sync::Arc;

use stratus_core::flow::{FlowEngine, FlowHandle, StartRequest};
use tracing::{debug, info};

use crate::collaborators::{EnvironmentResources, EnvironmentView};
use crate::error::{Result, ServiceError};

use super::cascading_delete::{CascadingDeleteFlow, DeletionState};

pub struct EnvironmentDeletionService {
    resources: Arc<dyn EnvironmentResources>,
    engine: Arc<FlowEngine<CascadingDeleteFlow>>,
}

impl EnvironmentDeletionService {
    pub fn new(resources: Arc<dyn EnvironmentResources>, engine: Arc<FlowEngine<CascadingDeleteFlow>>) -> Self {
        Self { resources, engine }
    }

    /// Validate the environment and submit its deletion flow.
    ///
    /// Child environments must be gone unless the deletion cascades. A
    /// non-cascading deletion also requires that no Data Hub, experience or
    /// Data Lake is attached.
    pub async fn delete(
        &self,
        environment: &EnvironmentView,
        user_crn: &str,
        cascading: bool,
        forced: bool,
    ) -> Result<FlowHandle<DeletionState>> {
        self.validate_deletion(environment, cascading).await?;
        if !cascading {
            self.check_is_environment_deletable(environment).await?;
        }

        debug!(environment = %environment.name, cascading, forced, "Deleting environment");
        let request = StartRequest {
            user_crn: Some(user_crn.to_string()),
            cascading,
            forced,
            ..StartRequest::new(environment.id, environment.crn.clone(), environment.clone())
        };
        Ok(self.engine.submit(request)?)
    }

    /// Delete each environment in turn, stopping at the first rejection.
    pub async fn delete_multiple(
        &self,
        environments: &[EnvironmentView],
        user_crn: &str,
        cascading: bool,
        forced: bool,
    ) -> Result<Vec<FlowHandle<DeletionState>>> {
        let mut handles = Vec::with_capacity(environments.len());
        for environment in environments {
            debug!(
                environment = %environment.name,
                crn = %environment.crn,
                "Starting to archive environment"
            );
            handles.push(self.delete(environment, user_crn, cascading, forced).await?);
        }
        Ok(handles)
    }

    async fn validate_deletion(&self, environment: &EnvironmentView, cascading: bool) -> Result<()> {
        if cascading {
            return Ok(());
        }
        let children = self.resources.child_environment_names(environment).await?;
        if !children.is_empty() {
            return Err(ServiceError::BadRequest(format!(
                "The following Environment(s) must be deleted before Environment deletion [{}]",
                children.join(", ")
            )));
        }
        Ok(())
    }

    async fn check_is_environment_deletable(&self, environment: &EnvironmentView) -> Result<()> {
        info!(environment = %environment.name, "Checking if environment is deletable");

        let datahubs = self.resources.attached_datahub_names(environment).await?;
        if !datahubs.is_empty() {
            return Err(ServiceError::BadRequest(format!(
                "The following Data Hub cluster(s) must be terminated before Environment deletion [{}]",
                joined(&datahubs)
            )));
        }

        let experiences = self
            .resources
            .connected_experience_count(environment)
            .await
            .map_err(|e| {
                info!(error = %e, "Checking the connected experiences failed");
                ServiceError::Unavailable(
                    "Unable to access all experience to check whether the environment have any connected one(s)!"
                        .to_string(),
                )
            })?;
        match experiences {
            0 => {}
            1 => {
                return Err(ServiceError::BadRequest(format!(
                    "The given environment [{}] has 1 connected experience. This must be terminated before Environment deletion.",
                    environment.name
                )));
            }
            n => {
                return Err(ServiceError::BadRequest(format!(
                    "The given environment [{}] has {} connected experiences. These must be terminated before Environment deletion.",
                    environment.name, n
                )));
            }
        }

        let mut datalakes = self.resources.attached_datalake_crns(environment).await?;
        // Clusters created through the internal API are only known to the legacy datalake API.
        if datalakes.is_empty() {
            datalakes = self.resources.legacy_datalake_names(environment).await?;
        }
        if !datalakes.is_empty() {
            return Err(ServiceError::BadRequest(format!(
                "The following Data Lake cluster(s) must be terminated before Environment deletion [{}]",
                joined(&datalakes)
            )));
        }
        Ok(())
    }
}

/// Sorted, comma separated names.
fn joined(names: &HashSet<String>) -> String {
    let mut names: Vec<&str> = names.iter().map(String::as_str).collect();
    names.sort_unstable();
    names.join(", ")
}
