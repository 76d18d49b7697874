// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Facade over the FreeIPA client used by flows and API checks.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::collaborators::{AvailabilityType, FreeIpaClient, FreeIpaDescription, OperationStatus};
use crate::error::{CollaboratorError, Result, ServiceError};

#[derive(Clone)]
pub struct FreeIpaService {
    client: Arc<dyn FreeIpaClient>,
}

impl FreeIpaService {
    pub fn new(client: Arc<dyn FreeIpaClient>) -> Self {
        Self { client }
    }

    /// Describe the environment's FreeIPA, `None` if it does not exist.
    pub async fn describe(&self, environment_crn: &str) -> Result<Option<FreeIpaDescription>> {
        match self.client.describe(environment_crn).await {
            Ok(description) => Ok(Some(description)),
            Err(CollaboratorError::NotFound(message)) => {
                error!(environment_crn, error = %message, "Could not find FreeIPA for environment");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fail unless the environment's FreeIPA is available.
    pub async fn check_freeipa_running(&self, environment_crn: &str) -> Result<()> {
        let description = self.describe(environment_crn).await?;
        match description {
            Some(FreeIpaDescription {
                availability: Some(availability),
                status,
                ..
            }) => {
                if availability.is_available() {
                    Ok(())
                } else {
                    let message = format!(
                        "Freeipa should be in Available state but currently is {}",
                        status
                    );
                    info!(environment_crn, "{}", message);
                    Err(ServiceError::BadRequest(message))
                }
            }
            _ => {
                let message = "Freeipa availability cannot be determined currently.";
                warn!(environment_crn, "{}", message);
                Err(ServiceError::Unavailable(message.to_string()))
            }
        }
    }

    /// Total number of FreeIPA instances across all instance groups.
    pub async fn node_count(&self, environment_crn: &str) -> Result<u64> {
        let description = self.describe(environment_crn).await?.ok_or_else(|| {
            ServiceError::NotFound(format!("FreeIPA not found for environment {}", environment_crn))
        })?;
        Ok(description.instance_groups.iter().map(|g| g.node_count).sum())
    }

    /// Start an upscale to `target`, returning the operation id.
    pub async fn upscale(
        &self,
        environment_crn: &str,
        target: AvailabilityType,
    ) -> std::result::Result<String, CollaboratorError> {
        self.client
            .upscale(environment_crn, target)
            .await
            .inspect_err(|e| info!(environment_crn, error = %e, "Cannot upscale FreeIPA"))
    }

    /// Status of a FreeIPA operation, `None` when it cannot be read.
    pub async fn operation_status(&self, operation_id: &str, account_id: &str) -> Option<OperationStatus> {
        match self.client.operation_status(operation_id, account_id).await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(operation_id, error = %e, "Cannot read FreeIPA operation status");
                None
            }
        }
    }
}
