// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Outbound audit surface.
//!
//! The engine emits exactly one [`AuditRecord`] per processed event: one per
//! state transition, and one per event consumed by a handler (with no
//! `to_state`). Sinks must not block; they run inside a resource's lane.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::event::{Failure, ResourceId};
use crate::flow::FlowId;

/// One audit entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub flow_id: FlowId,
    pub flow_type: &'static str,
    pub selector: &'static str,
    pub resource_id: ResourceId,
    pub resource_crn: String,
    pub operation_id: Option<String>,
    pub from_state: &'static str,
    /// `None` when the event was consumed by a handler.
    pub to_state: Option<&'static str>,
    pub failure: Option<Failure>,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Receiver of audit records.
pub trait EventSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct InMemoryEventSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records in emission order.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Records that carry a failure.
    pub fn failures(&self) -> Vec<AuditRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.failure.is_some())
            .collect()
    }

    /// Selector names in emission order, optionally restricted to one resource.
    pub fn selectors(&self, resource_id: Option<ResourceId>) -> Vec<&'static str> {
        self.records()
            .into_iter()
            .filter(|r| resource_id.is_none_or(|id| r.resource_id == id))
            .map(|r| r.selector)
            .collect()
    }
}

impl EventSink for InMemoryEventSink {
    fn record(&self, record: AuditRecord) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
    }
}

/// Logs each record as a JSON document through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, record: AuditRecord) {
        let json = match serde_json::to_string(&record) {
            Ok(json) => json,
            Err(e) => {
                warn!(flow_id = %record.flow_id, error = %e, "Failed to serialize audit record");
                return;
            }
        };
        if record.failure.is_some() {
            warn!(target: "stratus::audit", flow_id = %record.flow_id, record = %json, "Flow event");
        } else {
            info!(target: "stratus::audit", flow_id = %record.flow_id, record = %json, "Flow event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::FailureType;
    use uuid::Uuid;

    fn record(resource_id: ResourceId, selector: &'static str, failure: Option<Failure>) -> AuditRecord {
        AuditRecord {
            flow_id: Uuid::new_v4(),
            flow_type: "test",
            selector,
            resource_id,
            resource_crn: format!("crn:{}", resource_id),
            operation_id: None,
            from_state: "INIT",
            to_state: Some("START"),
            failure,
            payload: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_in_memory_sink_keeps_order() {
        let sink = InMemoryEventSink::new();
        sink.record(record(1, "START", None));
        sink.record(record(2, "START", None));
        sink.record(record(1, "FAILED", Some(Failure::new(FailureType::ScaleFailure, "x"))));

        assert_eq!(sink.selectors(None), vec!["START", "START", "FAILED"]);
        assert_eq!(sink.selectors(Some(1)), vec!["START", "FAILED"]);
        assert_eq!(sink.failures().len(), 1);
    }

    #[test]
    fn test_record_serializes() {
        let json = serde_json::to_value(record(3, "START", None)).unwrap();
        assert_eq!(json["selector"], "START");
        assert_eq!(json["resource_crn"], "crn:3");
        assert_eq!(json["to_state"], "START");
    }

    #[test]
    fn test_tracing_sink_does_not_panic() {
        TracingEventSink.record(record(1, "START", None));
        TracingEventSink.record(record(1, "FAILED", Some(Failure::new(FailureType::Unset, "y"))));
    }
}
