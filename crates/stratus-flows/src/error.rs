// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for collaborator calls and the services built on them.

use stratus_core::flow::ActionError;
use stratus_core::polling::PollError;
use stratus_core::FlowError;
use thiserror::Error;

/// Failure of a call to an external collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum CollaboratorError {
    /// The call did not reach the collaborator or got no usable answer.
    #[error("transport error: {0}")]
    Transport(String),

    /// The addressed entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The collaborator refused the request.
    #[error("{0}")]
    Rejected(String),
}

impl CollaboratorError {
    /// Whether repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<CollaboratorError> for ActionError {
    fn from(err: CollaboratorError) -> Self {
        ActionError::Failed(err.to_string())
    }
}

/// Errors returned by the service facades.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ServiceError {
    /// The request is invalid for the current state of the resource.
    #[error("{0}")]
    BadRequest(String),

    /// A dependency cannot answer right now.
    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    NotFound(String),

    /// A node orchestration step could not run.
    #[error("{0}")]
    Orchestrator(String),

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error(transparent)]
    Poll(#[from] PollError),
}

impl ServiceError {
    /// Stable code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Unavailable(_) => "SERVICE_UNAVAILABLE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Orchestrator(_) => "ORCHESTRATOR_FAILED",
            Self::Flow(e) => e.error_code(),
            Self::Collaborator(_) => "COLLABORATOR_ERROR",
            Self::Poll(_) => "POLLING_FAILED",
        }
    }
}

impl From<ServiceError> for ActionError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Poll(e) => ActionError::Poll(e),
            other => ActionError::Failed(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
