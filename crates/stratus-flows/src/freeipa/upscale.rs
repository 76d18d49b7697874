// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! FreeIPA upscale flow.
//!
//! ```text
//! INIT ──START──▶ START ──IN_PROGRESS──▶ IN_PROGRESS ──(wait)──SUCCESS──▶ FINISHED ──FINALIZED──▶ FINAL
//!                   │                                                        ▲
//!                   └──────────────────────SKIPPED───────────────────────────┘
//! any non-final ──FAILED──▶ FAILED ──FAILED_HANDLED──▶ FINAL
//! ```
//!
//! The start action upscales only when the environment runs fewer instances
//! than the target availability requires. The wait for the returned
//! operation is a handler on `WAIT_REQUEST`.

use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use stratus_core::dispatch::{EventHandler, HandlerEvent};
use stratus_core::flow::{
    ActionContext, ActionError, ActionResult, FlowDefinition, FlowEngine, FlowEngineBuilder,
    FlowParameters, FlowState,
};
use stratus_core::polling::{wait_until, AbortKind, AttemptResult, PollingConfig};
use stratus_core::{Event, FailureType, FlowRegistry, ResourceId, Selector};
use tracing::{debug, error, info};

use crate::collaborators::{AvailabilityType, OperationState};

use super::service::FreeIpaService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpscaleState {
    Init,
    Start,
    InProgress,
    Finished,
    Failed,
    Final,
}

impl FlowState for UpscaleState {
    fn name(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Start => "START",
            Self::InProgress => "IN_PROGRESS",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
            Self::Final => "FINAL",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Final)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpscaleEvent {
    Start,
    InProgress,
    Skipped,
    WaitRequest,
    Success,
    Failed,
    FailedHandled,
    Finalized,
}

impl Selector for UpscaleEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Start => "FREE_IPA_UPSCALE_START_EVENT",
            Self::InProgress => "FREE_IPA_UPSCALE_IN_PROGRESS_EVENT",
            Self::Skipped => "FREE_IPA_UPSCALE_SKIPPED_EVENT",
            Self::WaitRequest => "FREE_IPA_UPSCALE_WAIT_REQUEST",
            Self::Success => "FREE_IPA_UPSCALE_SUCCESS_EVENT",
            Self::Failed => "FREE_IPA_UPSCALE_FAILED_EVENT",
            Self::FailedHandled => "FREE_IPA_UPSCALE_FAILED_HANDLED_EVENT",
            Self::Finalized => "FREE_IPA_UPSCALE_FINALIZED_EVENT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpscalePayload {
    pub environment_crn: String,
    pub account_id: String,
    pub target: AvailabilityType,
}

impl UpscalePayload {
    pub fn new(environment_crn: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            environment_crn: environment_crn.into(),
            account_id: account_id.into(),
            target: AvailabilityType::Ha,
        }
    }

    pub fn with_target(self, target: AvailabilityType) -> Self {
        Self { target, ..self }
    }
}

pub type UpscaleFlowEvent = Event<UpscaleEvent, UpscalePayload>;

fn upscale_failure(event: &UpscaleFlowEvent, error: &ActionError) -> UpscaleFlowEvent {
    Event::failure(
        event,
        UpscaleEvent::Failed,
        error.failure_type(FailureType::ScaleFailure),
        error.to_string(),
    )
}

pub struct UpscaleFlow {
    freeipa: FreeIpaService,
}

impl UpscaleFlow {
    pub fn new(freeipa: FreeIpaService) -> Self {
        Self { freeipa }
    }

    /// Engine builder with the operation wait handler registered.
    pub fn engine_builder(
        freeipa: FreeIpaService,
        polling: PollingConfig,
        registry: Arc<FlowRegistry>,
    ) -> FlowEngineBuilder<UpscaleFlow> {
        let wait = UpscaleWaitHandler::new(freeipa.clone(), polling, registry.clone());
        FlowEngine::builder(UpscaleFlow::new(freeipa))
            .registry(registry)
            .handler(Arc::new(wait))
    }
}

#[async_trait]
impl FlowDefinition for UpscaleFlow {
    type State = UpscaleState;
    type Selector = UpscaleEvent;
    type Payload = UpscalePayload;

    fn flow_type(&self) -> &'static str {
        "freeipa-upscale"
    }

    fn initial_state(&self) -> UpscaleState {
        UpscaleState::Init
    }

    fn start_selector(&self) -> UpscaleEvent {
        UpscaleEvent::Start
    }

    fn failed_state(&self) -> UpscaleState {
        UpscaleState::Failed
    }

    fn transition(&self, from: UpscaleState, selector: UpscaleEvent) -> Option<UpscaleState> {
        use UpscaleEvent as E;
        use UpscaleState as S;
        match (from, selector) {
            (S::Init, E::Start) => Some(S::Start),
            (S::Start, E::InProgress) => Some(S::InProgress),
            (S::Start, E::Skipped) => Some(S::Finished),
            (S::InProgress, E::Success) => Some(S::Finished),
            (S::Finished, E::Finalized) => Some(S::Final),
            (S::Init | S::Start | S::InProgress | S::Finished, E::Failed) => Some(S::Failed),
            (S::Failed, E::FailedHandled) => Some(S::Final),
            _ => None,
        }
    }

    async fn execute(
        &self,
        state: UpscaleState,
        ctx: &ActionContext,
        event: &UpscaleFlowEvent,
    ) -> ActionResult<UpscaleEvent, UpscalePayload> {
        let resource_id = ctx.params.resource_id;
        match state {
            UpscaleState::Init | UpscaleState::Final => Ok(None),
            UpscaleState::Start => {
                let payload = &event.payload;
                let target = payload.target.instance_count();
                let current = self.freeipa.node_count(&payload.environment_crn).await?;
                if target > current {
                    info!(resource_id, current, target, "FreeIPA upscale started");
                    let operation_id = self
                        .freeipa
                        .upscale(&payload.environment_crn, payload.target)
                        .await?;
                    Ok(Some(
                        event
                            .follow_up(UpscaleEvent::InProgress)
                            .with_operation_id(operation_id),
                    ))
                } else {
                    info!(resource_id, current, "FreeIPA upscale skipped, already has enough instances");
                    Ok(Some(event.follow_up(UpscaleEvent::Skipped)))
                }
            }
            UpscaleState::InProgress => {
                debug!(resource_id, operation_id = ?event.operation_id, "FreeIPA upscale in progress");
                Ok(Some(event.follow_up(UpscaleEvent::WaitRequest)))
            }
            UpscaleState::Finished => {
                info!(resource_id, "FreeIPA upscale finalized");
                Ok(Some(event.follow_up(UpscaleEvent::Finalized)))
            }
            UpscaleState::Failed => {
                error!(resource_id, failure = ?event.failure, "FreeIPA failed to upscale");
                Ok(Some(event.follow_up(UpscaleEvent::FailedHandled)))
            }
        }
    }

    fn failure_event(
        &self,
        _state: UpscaleState,
        event: &UpscaleFlowEvent,
        _params: Option<&FlowParameters>,
        error: &ActionError,
    ) -> UpscaleFlowEvent {
        upscale_failure(event, error)
    }
}

/// Polls the upscale operation until FreeIPA reports it finished.
pub struct UpscaleWaitHandler {
    freeipa: FreeIpaService,
    polling: PollingConfig,
    registry: Arc<FlowRegistry>,
}

impl UpscaleWaitHandler {
    pub fn new(freeipa: FreeIpaService, polling: PollingConfig, registry: Arc<FlowRegistry>) -> Self {
        Self {
            freeipa,
            polling,
            registry,
        }
    }
}

#[async_trait]
impl EventHandler<UpscaleEvent, UpscalePayload> for UpscaleWaitHandler {
    fn selector(&self) -> UpscaleEvent {
        UpscaleEvent::WaitRequest
    }

    async fn accept(
        &self,
        event: HandlerEvent<'_, UpscaleEvent, UpscalePayload>,
    ) -> Result<UpscaleFlowEvent, ActionError> {
        let event = event.event;
        let operation_id = event
            .operation_id
            .clone()
            .ok_or_else(|| ActionError::failed("FreeIPA upscale has no operation id to wait for"))?;
        let account_id = event.payload.account_id.clone();
        let resource_id = event.resource_id;
        let registry = self.registry.clone();

        info!(resource_id, operation_id = %operation_id, "Waiting for FreeIPA upscale");
        wait_until(
            &self.polling,
            move || registry.is_cancelled(resource_id),
            || {
                let freeipa = self.freeipa.clone();
                let operation_id = operation_id.clone();
                let account_id = account_id.clone();
                async move {
                    let attempt = match freeipa.operation_status(&operation_id, &account_id).await {
                        Some(status) => match status.status {
                            OperationState::Completed => AttemptResult::Finish(()),
                            OperationState::Running => AttemptResult::Continue,
                            failed => AttemptResult::abort(
                                AbortKind::TargetFailed,
                                format!(
                                    "FreeIPA upscale operation {} ended with {}: {}",
                                    operation_id,
                                    failed,
                                    status.error.unwrap_or_default()
                                ),
                            ),
                        },
                        None => AttemptResult::Continue,
                    };
                    Ok::<_, Infallible>(attempt)
                }
            },
        )
        .await?;

        Ok(event.follow_up(UpscaleEvent::Success))
    }

    fn default_failure_event(
        &self,
        _resource_id: ResourceId,
        error: &ActionError,
        event: &UpscaleFlowEvent,
    ) -> UpscaleFlowEvent {
        upscale_failure(event, error)
    }
}
