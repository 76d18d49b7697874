// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Environment deletion flow.
//!
//! ```text
//! INIT ─▶ DATALAKES_DELETING ─▶ FREEIPA_DELETING ─▶ RESOURCES_DELETING ─▶ FINISHED ─▶ FINAL
//! ```
//!
//! Datalakes are deleted only by a cascading run; otherwise the deletion
//! service has already verified none are attached. Each deletion step
//! waits until the collaborator no longer reports the deleted entities. A
//! forced run logs and tolerates failing deletion calls and does not wait
//! for what it failed to delete.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use stratus_core::flow::{
    ActionContext, ActionError, ActionResult, FlowDefinition, FlowParameters, FlowState,
};
use stratus_core::polling::{wait_until, AttemptResult, PollingConfig};
use stratus_core::{Event, FailureType, Selector};
use tracing::{error, info, warn};

use crate::collaborators::{DatalakeClient, EnvironmentResources, EnvironmentView, FreeIpaClient};
use crate::error::CollaboratorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeletionState {
    Init,
    DatalakesDeleting,
    FreeIpaDeleting,
    ResourcesDeleting,
    Finished,
    Failed,
    Final,
}

impl FlowState for DeletionState {
    fn name(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::DatalakesDeleting => "DATALAKES_DELETING",
            Self::FreeIpaDeleting => "FREEIPA_DELETING",
            Self::ResourcesDeleting => "RESOURCES_DELETING",
            Self::Finished => "ENV_DELETE_FINISHED",
            Self::Failed => "ENV_DELETE_FAILED",
            Self::Final => "FINAL",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Final)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeletionEvent {
    Start,
    DatalakesDeleted,
    FreeIpaDeleted,
    ResourcesDeleted,
    Finalize,
    Failed,
    FailedHandled,
}

impl Selector for DeletionEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Start => "START_ENV_DELETE_EVENT",
            Self::DatalakesDeleted => "FINISH_DATALAKES_DELETE_EVENT",
            Self::FreeIpaDeleted => "FINISH_FREEIPA_DELETE_EVENT",
            Self::ResourcesDeleted => "FINISH_RESOURCES_DELETE_EVENT",
            Self::Finalize => "FINALIZE_ENV_DELETE_EVENT",
            Self::Failed => "FAILED_ENV_DELETE_EVENT",
            Self::FailedHandled => "HANDLED_FAILED_ENV_DELETE_EVENT",
        }
    }
}

pub type DeletionFlowEvent = Event<DeletionEvent, EnvironmentView>;

pub struct CascadingDeleteFlow {
    datalakes: Arc<dyn DatalakeClient>,
    freeipa: Arc<dyn FreeIpaClient>,
    resources: Arc<dyn EnvironmentResources>,
    polling: PollingConfig,
}

impl CascadingDeleteFlow {
    pub fn new(
        datalakes: Arc<dyn DatalakeClient>,
        freeipa: Arc<dyn FreeIpaClient>,
        resources: Arc<dyn EnvironmentResources>,
        polling: PollingConfig,
    ) -> Self {
        Self {
            datalakes,
            freeipa,
            resources,
            polling,
        }
    }

    async fn delete_datalakes(&self, ctx: &ActionContext, environment_crn: &str) -> Result<(), ActionError> {
        let forced = ctx.params.forced;
        let datalakes = self.datalakes.list_datalakes(environment_crn).await?;
        info!(
            resource_id = ctx.params.resource_id,
            count = datalakes.len(),
            "Deleting attached datalakes"
        );
        let mut deleting = HashSet::new();
        for datalake in datalakes {
            match self.datalakes.delete_datalake(&datalake.crn, forced).await {
                Ok(()) => {
                    deleting.insert(datalake.crn);
                }
                Err(e) => tolerate(forced, &datalake.name, e)?,
            }
        }
        if deleting.is_empty() {
            return Ok(());
        }

        let deleting = &deleting;
        wait_until(&self.polling, ctx.cancel_check(), || async move {
            let remaining = self.datalakes.list_datalakes(environment_crn).await?;
            let pending = remaining.iter().any(|d| deleting.contains(&d.crn));
            Ok::<_, CollaboratorError>(if pending {
                AttemptResult::Continue
            } else {
                AttemptResult::Finish(())
            })
        })
        .await?;
        Ok(())
    }

    async fn delete_freeipa(&self, ctx: &ActionContext, environment_crn: &str) -> Result<(), ActionError> {
        let forced = ctx.params.forced;
        match self.freeipa.delete(environment_crn, forced).await {
            Ok(()) => {}
            Err(CollaboratorError::NotFound(_)) => {
                info!(resource_id = ctx.params.resource_id, "FreeIPA already deleted");
                return Ok(());
            }
            Err(e) => {
                tolerate(forced, "FreeIPA", e)?;
                return Ok(());
            }
        }

        wait_until(&self.polling, ctx.cancel_check(), || async move {
            match self.freeipa.describe(environment_crn).await {
                Ok(_) => Ok(AttemptResult::Continue),
                Err(CollaboratorError::NotFound(_)) => Ok(AttemptResult::Finish(())),
                Err(e) => Err(e),
            }
        })
        .await?;
        Ok(())
    }
}

/// Swallow a deletion failure of a forced run.
fn tolerate(forced: bool, what: &str, error: CollaboratorError) -> Result<(), ActionError> {
    if forced {
        warn!(target_name = what, error = %error, "Deletion failed, continuing because the deletion is forced");
        Ok(())
    } else {
        Err(error.into())
    }
}

#[async_trait]
impl FlowDefinition for CascadingDeleteFlow {
    type State = DeletionState;
    type Selector = DeletionEvent;
    type Payload = EnvironmentView;

    fn flow_type(&self) -> &'static str {
        "environment-deletion"
    }

    fn initial_state(&self) -> DeletionState {
        DeletionState::Init
    }

    fn start_selector(&self) -> DeletionEvent {
        DeletionEvent::Start
    }

    fn failed_state(&self) -> DeletionState {
        DeletionState::Failed
    }

    fn transition(&self, from: DeletionState, selector: DeletionEvent) -> Option<DeletionState> {
        use DeletionEvent as E;
        use DeletionState as S;
        match (from, selector) {
            (S::Init, E::Start) => Some(S::DatalakesDeleting),
            (S::DatalakesDeleting, E::DatalakesDeleted) => Some(S::FreeIpaDeleting),
            (S::FreeIpaDeleting, E::FreeIpaDeleted) => Some(S::ResourcesDeleting),
            (S::ResourcesDeleting, E::ResourcesDeleted) => Some(S::Finished),
            (S::Finished, E::Finalize) => Some(S::Final),
            (
                S::Init | S::DatalakesDeleting | S::FreeIpaDeleting | S::ResourcesDeleting | S::Finished,
                E::Failed,
            ) => Some(S::Failed),
            (S::Failed, E::FailedHandled) => Some(S::Final),
            _ => None,
        }
    }

    async fn execute(
        &self,
        state: DeletionState,
        ctx: &ActionContext,
        event: &DeletionFlowEvent,
    ) -> ActionResult<DeletionEvent, EnvironmentView> {
        let environment_crn = event.resource_crn.as_str();
        let resource_id = ctx.params.resource_id;
        match state {
            DeletionState::Init | DeletionState::Final => Ok(None),
            DeletionState::DatalakesDeleting => {
                if ctx.params.cascading {
                    self.delete_datalakes(ctx, environment_crn).await?;
                } else {
                    info!(resource_id, "Not a cascading deletion, skipping datalakes");
                }
                Ok(Some(event.follow_up(DeletionEvent::DatalakesDeleted)))
            }
            DeletionState::FreeIpaDeleting => {
                self.delete_freeipa(ctx, environment_crn).await?;
                Ok(Some(event.follow_up(DeletionEvent::FreeIpaDeleted)))
            }
            DeletionState::ResourcesDeleting => {
                if let Err(e) = self
                    .resources
                    .delete_environment_resources(environment_crn, ctx.params.forced)
                    .await
                {
                    tolerate(ctx.params.forced, "environment resources", e)?;
                }
                Ok(Some(event.follow_up(DeletionEvent::ResourcesDeleted)))
            }
            DeletionState::Finished => {
                info!(resource_id, environment = %event.payload.name, "Environment deleted");
                Ok(Some(event.follow_up(DeletionEvent::Finalize)))
            }
            DeletionState::Failed => {
                error!(
                    resource_id,
                    environment = %event.payload.name,
                    failure = ?event.failure,
                    "Environment deletion failed"
                );
                Ok(Some(event.follow_up(DeletionEvent::FailedHandled)))
            }
        }
    }

    fn failure_event(
        &self,
        _state: DeletionState,
        event: &DeletionFlowEvent,
        _params: Option<&FlowParameters>,
        error: &ActionError,
    ) -> DeletionFlowEvent {
        Event::failure(
            event,
            DeletionEvent::Failed,
            error.failure_type(FailureType::DeletionFailure),
            error.to_string(),
        )
    }
}
