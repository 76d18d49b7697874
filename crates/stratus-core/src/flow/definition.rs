// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Flow definition contract.
//!
//! A flow type is a closed set of states, a closed set of selectors, an
//! exhaustive transition function and one action per state. Actions return
//! explicit results: `Ok(Some(event))` drives the next transition,
//! `Ok(None)` parks the flow until an external event arrives, and `Err`
//! is converted by [`FlowDefinition::failure_event`] into a failure event.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::event::{Event, FailureType, ResourceId, Selector};
use crate::polling::{AbortKind, PollError};
use crate::registry::FlowRegistry;

use super::FlowId;

/// One member of a flow type's state enumeration.
pub trait FlowState: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    /// Stable upper-snake name used in logs and audit records.
    fn name(&self) -> &'static str;

    /// Whether reaching this state ends the flow.
    fn is_terminal(&self) -> bool;
}

/// Immutable context of one flow run, handed to every action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowParameters {
    pub flow_id: FlowId,
    pub flow_type: &'static str,
    pub resource_id: ResourceId,
    pub resource_crn: String,
    /// Identity that triggered the flow.
    pub user_crn: Option<String>,
    /// Dependent resources are deleted along with the resource.
    pub cascading: bool,
    /// Collaborator failures during cleanup are tolerated.
    pub forced: bool,
}

/// What an action sees besides its event.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub params: FlowParameters,
    registry: Arc<FlowRegistry>,
}

impl ActionContext {
    pub fn new(params: FlowParameters, registry: Arc<FlowRegistry>) -> Self {
        Self { params, registry }
    }

    /// Whether a cancel request was recorded for this flow's resource.
    pub fn is_cancelled(&self) -> bool {
        self.registry.is_cancelled(self.params.resource_id)
    }

    /// Cancel check suitable for [`wait_until`](crate::polling::wait_until).
    pub fn cancel_check(&self) -> impl Fn() -> bool + Send + Sync + 'static {
        let registry = self.registry.clone();
        let resource_id = self.params.resource_id;
        move || registry.is_cancelled(resource_id)
    }

    pub fn registry(&self) -> &Arc<FlowRegistry> {
        &self.registry
    }
}

/// Failure raised by an action or handler.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ActionError {
    /// A collaborator call or a domain check failed.
    #[error("{0}")]
    Failed(String),

    /// A wait did not complete.
    #[error(transparent)]
    Poll(#[from] PollError),

    /// The action noticed a cancel request.
    #[error("flow cancelled")]
    Cancelled,
}

impl ActionError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Whether the flow should end as cancelled rather than failed.
    pub fn is_cancellation(&self) -> bool {
        match self {
            Self::Cancelled | Self::Poll(PollError::Cancelled) => true,
            Self::Poll(PollError::Aborted(reason)) => reason.kind == AbortKind::Rejected,
            _ => false,
        }
    }

    /// Failure tag for this error, `default` unless the error is a timeout.
    pub fn failure_type(&self, default: FailureType) -> FailureType {
        match self {
            Self::Poll(PollError::Timeout(_)) => FailureType::Timeout,
            _ => default,
        }
    }
}

/// Outcome of one action.
pub type ActionResult<S, P> = Result<Option<Event<S, P>>, ActionError>;

/// State machine of one flow type.
#[async_trait]
pub trait FlowDefinition: Send + Sync + 'static {
    type State: FlowState;
    type Selector: Selector;
    type Payload: Clone + Debug + Serialize + Send + Sync + 'static;

    /// Name used in logs, audit records and conflict errors.
    fn flow_type(&self) -> &'static str;

    /// State every new instance starts in.
    fn initial_state(&self) -> Self::State;

    /// Selector of the event that starts a new instance.
    fn start_selector(&self) -> Self::Selector;

    /// State whose entry marks the flow as failed.
    fn failed_state(&self) -> Self::State;

    /// Next state for `selector` in `from`, or `None` when the pair has no
    /// transition.
    fn transition(&self, from: Self::State, selector: Self::Selector) -> Option<Self::State>;

    /// Action bound to entering `state`.
    async fn execute(
        &self,
        state: Self::State,
        ctx: &ActionContext,
        event: &Event<Self::Selector, Self::Payload>,
    ) -> ActionResult<Self::Selector, Self::Payload>;

    /// Failure event for an error raised by the action of `state`.
    ///
    /// `params` is `None` when the failure happened before the flow context
    /// was built.
    fn failure_event(
        &self,
        state: Self::State,
        event: &Event<Self::Selector, Self::Payload>,
        params: Option<&FlowParameters>,
        error: &ActionError,
    ) -> Event<Self::Selector, Self::Payload>;
}
