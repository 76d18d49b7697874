// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stratus Core - Flow Orchestration Engine
//!
//! This crate provides the engine that drives long-running, multi-step
//! operations against managed resources (clusters, identity services,
//! environments). Each operation is a flow: a finite state machine whose
//! actions call external collaborators and emit the next event.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Inbound triggers                                  │
//! │              (StartRequest, external events, cancel)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          FlowEngine<F>                                   │
//! │     per-resource lanes ─ transition table ─ failure event routing        │
//! └─────────────────────────────────────────────────────────────────────────┘
//!        │                     │                       │
//!        │ handlers            │ actions               │ audit
//!        ▼                     ▼                       ▼
//! ┌────────────────┐   ┌──────────────────────┐   ┌──────────────────┐
//! │ EventDispatcher│   │ Collaborators        │   │ EventSink        │
//! │ (selector map) │   │ (wait_until polling) │   │ (AuditRecord)    │
//! └────────────────┘   └──────────────────────┘   └──────────────────┘
//!                               │
//!                               ▼
//!                      ┌──────────────────────┐
//!                      │    FlowRegistry      │
//!                      │ (cancellation map)   │
//!                      └──────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! | Guarantee | Mechanism |
//! |-----------|-----------|
//! | One active flow per resource | [`flow::ExecutionLanes::claim`] rejects with `FlowError::Conflict` |
//! | Serialized execution per resource | one async mutex per occupied lane |
//! | No lost failures | failing actions and handlers yield a failure event before control returns |
//! | Illegal transitions surface | the flow fails once with `FlowError::IllegalTransition` |
//! | Cooperative cancellation | [`registry::FlowRegistry`] is checked before each event and each poll cycle |
//!
//! # Modules
//!
//! - [`event`]: events, selectors and failure tags
//! - [`flow`]: flow definitions and the engine
//! - [`dispatch`]: selector-routed handlers
//! - [`polling`]: the `wait_until` primitive
//! - [`registry`]: the cancellation store
//! - [`node_filter`]: target node selection
//! - [`sink`]: the audit surface
//! - [`config`]: environment-driven configuration

/// Configuration loaded from environment variables.
pub mod config;

/// Selector-routed event handlers.
pub mod dispatch;

/// Error types for engine operations.
pub mod error;

/// Events, selectors and failure tags.
pub mod event;

/// Flow definitions, instances and the engine.
pub mod flow;

/// Target node selection for multi-node operations.
pub mod node_filter;

/// The `wait_until` polling primitive.
pub mod polling;

/// In-memory cancellation store.
pub mod registry;

/// Audit records and sinks.
pub mod sink;

pub use error::{FlowError, Result};
pub use event::{Event, Failure, FailureType, ResourceId, Selector};
pub use flow::{FlowEngine, FlowId, FlowSnapshot, FlowStatus, StartRequest};
pub use registry::FlowRegistry;
