// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Diagnostics collection: the flow and its handler chain.

pub mod flow;
pub mod handlers;

pub use flow::{DiagnosticsEvent, DiagnosticsFlow, DiagnosticsFlowEvent, DiagnosticsState};
pub use handlers::{
    CleanupHandler, CollectHandler, EnsureMachineUserHandler, InitHandler, UpgradeTelemetryHandler,
};
