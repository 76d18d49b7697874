// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Flow state machine core.
//!
//! - [`definition`]: the contract a flow type implements
//! - [`engine`]: runs instances of a definition
//! - [`lanes`]: per-resource serialization, owned by the flow registry

pub mod definition;
pub mod engine;
mod instance;
pub mod lanes;

pub use definition::{
    ActionContext, ActionError, ActionResult, FlowDefinition, FlowParameters, FlowState,
};
pub use engine::{
    FlowEngine, FlowEngineBuilder, FlowHandle, StartRequest, DEFAULT_TERMINAL_RETENTION,
};
pub use instance::{FlowSnapshot, FlowStatus};
pub use lanes::ExecutionLanes;

/// Unique id of one flow run.
pub type FlowId = uuid::Uuid;
