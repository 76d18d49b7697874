// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Diagnostics collection flow.
//!
//! Each working state emits the selector of its handler; the handler does
//! the work and returns the start selector of the next state:
//!
//! ```text
//! INIT ─▶ INITIALIZING ─▶ UPGRADING ─▶ ENSURING_MACHINE_USER ─▶ COLLECTING ─▶ CLEANING_UP ─▶ FINISHED ─▶ FINAL
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use stratus_core::flow::{
    ActionContext, ActionError, ActionResult, FlowDefinition, FlowEngine, FlowEngineBuilder,
    FlowParameters, FlowState,
};
use stratus_core::{Event, FailureType, FlowRegistry, Selector};
use tracing::{error, info};

use crate::collaborators::{DiagnosticParameters, DiagnosticsOperations, MachineUserService};
use crate::telemetry::TelemetryUpgradeService;

use super::handlers::{
    diagnostics_failure, CleanupHandler, CollectHandler, EnsureMachineUserHandler, InitHandler,
    UpgradeTelemetryHandler,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticsState {
    Init,
    Initializing,
    Upgrading,
    EnsuringMachineUser,
    Collecting,
    CleaningUp,
    Finished,
    Failed,
    Final,
}

impl FlowState for DiagnosticsState {
    fn name(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Initializing => "DIAGNOSTICS_INIT",
            Self::Upgrading => "DIAGNOSTICS_UPGRADE",
            Self::EnsuringMachineUser => "DIAGNOSTICS_ENSURE_MACHINE_USER",
            Self::Collecting => "DIAGNOSTICS_COLLECTION",
            Self::CleaningUp => "DIAGNOSTICS_CLEANUP",
            Self::Finished => "DIAGNOSTICS_COLLECTION_FINISHED",
            Self::Failed => "DIAGNOSTICS_COLLECTION_FAILED",
            Self::Final => "FINAL",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Final)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticsEvent {
    StartInit,
    Init,
    StartUpgrade,
    Upgrade,
    StartEnsureMachineUser,
    EnsureMachineUser,
    StartCollection,
    Collect,
    StartCleanup,
    Cleanup,
    Finish,
    Finalize,
    Failed,
    FailedHandled,
}

impl Selector for DiagnosticsEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::StartInit => "START_DIAGNOSTICS_INIT_EVENT",
            Self::Init => "INIT_DIAGNOSTICS_EVENT",
            Self::StartUpgrade => "START_DIAGNOSTICS_UPGRADE_EVENT",
            Self::Upgrade => "UPGRADE_DIAGNOSTICS_EVENT",
            Self::StartEnsureMachineUser => "START_DIAGNOSTICS_ENSURE_MACHINE_USER_EVENT",
            Self::EnsureMachineUser => "ENSURE_MACHINE_USER_EVENT",
            Self::StartCollection => "START_DIAGNOSTICS_COLLECTION_EVENT",
            Self::Collect => "COLLECT_DIAGNOSTICS_EVENT",
            Self::StartCleanup => "START_DIAGNOSTICS_CLEANUP_EVENT",
            Self::Cleanup => "CLEANUP_DIAGNOSTICS_EVENT",
            Self::Finish => "FINISH_DIAGNOSTICS_COLLECTION_EVENT",
            Self::Finalize => "FINALIZE_DIAGNOSTICS_COLLECTION_EVENT",
            Self::Failed => "FAILED_DIAGNOSTICS_COLLECTION_EVENT",
            Self::FailedHandled => "HANDLED_FAILED_DIAGNOSTICS_COLLECTION_EVENT",
        }
    }
}

pub type DiagnosticsFlowEvent = Event<DiagnosticsEvent, DiagnosticParameters>;

pub struct DiagnosticsFlow;

impl DiagnosticsFlow {
    /// Engine builder with the whole handler chain registered.
    pub fn engine_builder(
        operations: Arc<dyn DiagnosticsOperations>,
        machine_users: Arc<dyn MachineUserService>,
        telemetry: Arc<TelemetryUpgradeService>,
        registry: Arc<FlowRegistry>,
    ) -> FlowEngineBuilder<DiagnosticsFlow> {
        FlowEngine::builder(DiagnosticsFlow)
            .registry(registry)
            .handler(Arc::new(InitHandler::new(operations.clone())))
            .handler(Arc::new(UpgradeTelemetryHandler::new(telemetry)))
            .handler(Arc::new(EnsureMachineUserHandler::new(machine_users)))
            .handler(Arc::new(CollectHandler::new(operations.clone())))
            .handler(Arc::new(CleanupHandler::new(operations)))
    }
}

#[async_trait]
impl FlowDefinition for DiagnosticsFlow {
    type State = DiagnosticsState;
    type Selector = DiagnosticsEvent;
    type Payload = DiagnosticParameters;

    fn flow_type(&self) -> &'static str {
        "diagnostics-collection"
    }

    fn initial_state(&self) -> DiagnosticsState {
        DiagnosticsState::Init
    }

    fn start_selector(&self) -> DiagnosticsEvent {
        DiagnosticsEvent::StartInit
    }

    fn failed_state(&self) -> DiagnosticsState {
        DiagnosticsState::Failed
    }

    fn transition(&self, from: DiagnosticsState, selector: DiagnosticsEvent) -> Option<DiagnosticsState> {
        use DiagnosticsEvent as E;
        use DiagnosticsState as S;
        match (from, selector) {
            (S::Init, E::StartInit) => Some(S::Initializing),
            (S::Initializing, E::StartUpgrade) => Some(S::Upgrading),
            (S::Upgrading, E::StartEnsureMachineUser) => Some(S::EnsuringMachineUser),
            (S::EnsuringMachineUser, E::StartCollection) => Some(S::Collecting),
            (S::Collecting, E::StartCleanup) => Some(S::CleaningUp),
            (S::CleaningUp, E::Finish) => Some(S::Finished),
            (S::Finished, E::Finalize) => Some(S::Final),
            (S::Failed, E::FailedHandled) => Some(S::Final),
            (S::Failed | S::Final, E::Failed) => None,
            (_, E::Failed) => Some(S::Failed),
            _ => None,
        }
    }

    async fn execute(
        &self,
        state: DiagnosticsState,
        ctx: &ActionContext,
        event: &DiagnosticsFlowEvent,
    ) -> ActionResult<DiagnosticsEvent, DiagnosticParameters> {
        let next = match state {
            DiagnosticsState::Init | DiagnosticsState::Final => return Ok(None),
            DiagnosticsState::Initializing => DiagnosticsEvent::Init,
            DiagnosticsState::Upgrading => DiagnosticsEvent::Upgrade,
            DiagnosticsState::EnsuringMachineUser => DiagnosticsEvent::EnsureMachineUser,
            DiagnosticsState::Collecting => DiagnosticsEvent::Collect,
            DiagnosticsState::CleaningUp => DiagnosticsEvent::Cleanup,
            DiagnosticsState::Finished => {
                info!(
                    resource_id = ctx.params.resource_id,
                    uuid = ?event.payload.uuid,
                    "Diagnostics collection finished"
                );
                DiagnosticsEvent::Finalize
            }
            DiagnosticsState::Failed => {
                error!(
                    resource_id = ctx.params.resource_id,
                    failure = ?event.failure,
                    "Diagnostics collection failed"
                );
                DiagnosticsEvent::FailedHandled
            }
        };
        Ok(Some(event.follow_up(next)))
    }

    fn failure_event(
        &self,
        _state: DiagnosticsState,
        event: &DiagnosticsFlowEvent,
        _params: Option<&FlowParameters>,
        error: &ActionError,
    ) -> DiagnosticsFlowEvent {
        diagnostics_failure(event, error, FailureType::Unset)
    }
}
