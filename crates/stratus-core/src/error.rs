// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the flow engine.

use thiserror::Error;

use crate::event::ResourceId;
use crate::flow::{FlowId, FlowStatus};

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, FlowError>;

/// Errors returned by the flow engine to its callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum FlowError {
    /// The resource already has an active flow.
    #[error("Resource {resource_id} already has an active {flow_type} flow '{active_flow_id}'")]
    Conflict {
        resource_id: ResourceId,
        active_flow_id: FlowId,
        flow_type: &'static str,
    },

    /// No transition exists for the event in the current state.
    #[error("Illegal transition in flow '{flow_id}': no transition from {state} on {selector}")]
    IllegalTransition {
        flow_id: FlowId,
        state: &'static str,
        selector: &'static str,
    },

    /// Flow not found.
    #[error("Flow '{0}' not found")]
    FlowNotFound(FlowId),

    /// Flow already reached a terminal outcome.
    #[error("Flow '{flow_id}' already terminated with status {status}")]
    FlowTerminated { flow_id: FlowId, status: FlowStatus },

    /// The resource was cancelled; the flow ended with outcome `Cancelled`.
    #[error("Flow '{flow_id}' for resource {resource_id} was cancelled")]
    Cancelled {
        flow_id: FlowId,
        resource_id: ResourceId,
    },

    /// Running the flow's event chain failed outside of any action.
    #[error("Dispatch error: {0}")]
    Dispatch(String),
}

impl FlowError {
    /// Returns the error code string for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Conflict { .. } => "FLOW_CONFLICT",
            Self::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            Self::FlowNotFound(_) => "FLOW_NOT_FOUND",
            Self::FlowTerminated { .. } => "FLOW_TERMINATED",
            Self::Cancelled { .. } => "FLOW_CANCELLED",
            Self::Dispatch(_) => "DISPATCH_ERROR",
        }
    }
}
