// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Flow instance bookkeeping.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::event::{Failure, ResourceId};

use super::definition::{FlowParameters, FlowState};
use super::FlowId;

/// Lifecycle status of a flow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowStatus {
    /// Processing events or waiting for the next one.
    Running,
    /// Reached a terminal state without entering the failed state.
    Finished,
    /// Entered the failed state, or hit an illegal transition.
    Failed,
    /// Stopped after a cancel request.
    Cancelled,
}

impl FlowStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Returns the string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FlowInstance<St> {
    pub params: FlowParameters,
    pub state: St,
    pub status: FlowStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub failure: Option<Failure>,
    pub history: Vec<St>,
}

impl<St: FlowState> FlowInstance<St> {
    pub fn new(params: FlowParameters, initial: St) -> Self {
        Self {
            params,
            state: initial,
            status: FlowStatus::Running,
            created_at: Utc::now(),
            finished_at: None,
            failure: None,
            history: vec![initial],
        }
    }

    pub fn enter(&mut self, state: St) {
        self.state = state;
        self.history.push(state);
    }

    /// Mark the instance terminal. The first terminal status wins.
    pub fn finish(&mut self, status: FlowStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        self.finished_at = Some(Utc::now());
        true
    }

    pub fn snapshot(&self) -> FlowSnapshot<St> {
        FlowSnapshot {
            flow_id: self.params.flow_id,
            flow_type: self.params.flow_type,
            resource_id: self.params.resource_id,
            resource_crn: self.params.resource_crn.clone(),
            state: self.state,
            status: self.status,
            created_at: self.created_at,
            finished_at: self.finished_at,
            failure: self.failure.clone(),
            history: self.history.clone(),
        }
    }
}

/// Point-in-time view of a flow instance.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowSnapshot<St> {
    pub flow_id: FlowId,
    pub flow_type: &'static str,
    pub resource_id: ResourceId,
    pub resource_crn: String,
    /// Current (or final) state.
    pub state: St,
    pub status: FlowStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Cause recorded when the flow entered its failed state.
    pub failure: Option<Failure>,
    /// Every state entered, starting with the initial one.
    pub history: Vec<St>,
}

impl<St: FlowState> FlowSnapshot<St> {
    /// State names entered, in order.
    pub fn path(&self) -> Vec<&'static str> {
        self.history.iter().map(|s| s.name()).collect()
    }
}
