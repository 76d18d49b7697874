// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-resource execution lanes.
//!
//! Each resource with an active flow owns one lane: an async mutex that
//! serializes event processing for that resource, plus the id of the flow
//! occupying it. Each [`FlowRegistry`](crate::registry::FlowRegistry) owns
//! one set of lanes, so flows of different types built on the same registry
//! cannot overlap on one resource.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;

use crate::error::FlowError;
use crate::event::ResourceId;

use super::FlowId;

/// Lock serializing one resource's event processing.
pub type Lane = Arc<AsyncMutex<()>>;

#[derive(Debug)]
struct Occupant {
    flow_id: FlowId,
    flow_type: &'static str,
    lane: Lane,
}

/// Map of resource id to the lane of its active flow.
#[derive(Debug, Default)]
pub struct ExecutionLanes {
    occupied: Mutex<HashMap<ResourceId, Occupant>>,
}

impl ExecutionLanes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the resource for a new flow.
    ///
    /// Fails with [`FlowError::Conflict`] while another flow holds the lane.
    pub fn claim(
        &self,
        resource_id: ResourceId,
        flow_id: FlowId,
        flow_type: &'static str,
    ) -> Result<Lane, FlowError> {
        let mut occupied = self.occupied.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(occupant) = occupied.get(&resource_id) {
            return Err(FlowError::Conflict {
                resource_id,
                active_flow_id: occupant.flow_id,
                flow_type: occupant.flow_type,
            });
        }
        let lane = Lane::default();
        occupied.insert(
            resource_id,
            Occupant {
                flow_id,
                flow_type,
                lane: lane.clone(),
            },
        );
        Ok(lane)
    }

    /// Free the resource if `flow_id` still holds it.
    pub fn release(&self, resource_id: ResourceId, flow_id: FlowId) -> bool {
        let mut occupied = self.occupied.lock().unwrap_or_else(|e| e.into_inner());
        match occupied.get(&resource_id) {
            Some(occupant) if occupant.flow_id == flow_id => {
                occupied.remove(&resource_id);
                true
            }
            _ => false,
        }
    }

    /// Run `f` while `flow_id` is guaranteed to hold the resource.
    ///
    /// Returns `None` without calling `f` when another flow, or none, holds it.
    pub fn with_holder<R>(
        &self,
        resource_id: ResourceId,
        flow_id: FlowId,
        f: impl FnOnce() -> R,
    ) -> Option<R> {
        let occupied = self.occupied.lock().unwrap_or_else(|e| e.into_inner());
        match occupied.get(&resource_id) {
            Some(occupant) if occupant.flow_id == flow_id => Some(f()),
            _ => None,
        }
    }

    /// Lane of the flow currently holding the resource.
    pub fn lane(&self, resource_id: ResourceId) -> Option<(FlowId, Lane)> {
        let occupied = self.occupied.lock().unwrap_or_else(|e| e.into_inner());
        occupied
            .get(&resource_id)
            .map(|occupant| (occupant.flow_id, occupant.lane.clone()))
    }

    /// Flow currently holding the resource.
    pub fn active_flow(&self, resource_id: ResourceId) -> Option<FlowId> {
        self.lane(resource_id).map(|(flow_id, _)| flow_id)
    }

    /// Number of occupied lanes.
    pub fn len(&self) -> usize {
        self.occupied.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
