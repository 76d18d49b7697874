// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory flow registry.
//!
//! Tracks whether a flow for a given resource is running or has been
//! cancelled, so that long waits can observe cancellation. A resource with
//! no entry is idle (or its flow already finished).
//!
//! The registry is process-local by nature: it is never persisted and is
//! shared through an `Arc`. [`FlowRegistry::global()`] returns the
//! process-wide instance; tests and embedded engines usually create their own.
//!
//! The registry also owns the [`ExecutionLanes`] of its resources. Engines
//! built on the same registry therefore share one active flow per resource,
//! whatever their flow type.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::debug;

use crate::event::ResourceId;
use crate::flow::ExecutionLanes;

/// Status of a resource in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// A flow is driving the resource.
    Running,
    /// An external cancel request was received.
    Cancelled,
}

static GLOBAL_REGISTRY: OnceCell<Arc<FlowRegistry>> = OnceCell::new();

/// Concurrent map of resource id to [`RunStatus`].
#[derive(Debug, Default)]
pub struct FlowRegistry {
    entries: RwLock<HashMap<ResourceId, RunStatus>>,
    lanes: Arc<ExecutionLanes>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry.
    pub fn global() -> Arc<FlowRegistry> {
        GLOBAL_REGISTRY
            .get_or_init(|| Arc::new(FlowRegistry::new()))
            .clone()
    }

    /// Lanes of the resources tracked by this registry.
    pub fn lanes(&self) -> Arc<ExecutionLanes> {
        self.lanes.clone()
    }

    /// Record that a flow started for the resource.
    pub fn mark_running(&self, resource_id: ResourceId) {
        self.set(resource_id, RunStatus::Running);
    }

    /// Record an external cancel request for the resource.
    pub fn mark_cancelled(&self, resource_id: ResourceId) {
        self.set(resource_id, RunStatus::Cancelled);
    }

    fn set(&self, resource_id: ResourceId, status: RunStatus) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(resource_id, status);
        debug!(resource_id, status = ?status, "Flow registry updated");
    }

    /// Current status, or `None` when no flow is registered for the resource.
    pub fn get(&self, resource_id: ResourceId) -> Option<RunStatus> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(&resource_id).copied()
    }

    /// Whether a cancel request was recorded for the resource.
    pub fn is_cancelled(&self, resource_id: ResourceId) -> bool {
        self.get(resource_id) == Some(RunStatus::Cancelled)
    }

    /// Remove the entry once the flow reached a terminal outcome.
    pub fn clear(&self, resource_id: ResourceId) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.remove(&resource_id).is_some() {
            debug!(resource_id, "Flow registry entry cleared");
        }
    }

    /// Number of tracked resources.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
