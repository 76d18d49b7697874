// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stratus Flows - Flow Definitions and Collaborator Contracts
//!
//! This crate holds the concrete flows run by the stratus engine and the
//! services around them:
//!
//! | Flow | Definition | Failure tag |
//! |------|------------|-------------|
//! | FreeIPA upscale | [`freeipa::UpscaleFlow`] | `SCALE_FAILURE` |
//! | Diagnostics collection | [`diagnostics::DiagnosticsFlow`] | per handler |
//! | Environment deletion | [`environment::CascadingDeleteFlow`] | `DELETION_FAILURE` |
//!
//! Timed-out waits are tagged `TIMEOUT` in every flow.
//!
//! External systems are reached only through the traits in
//! [`collaborators`]; the services here ([`freeipa::FreeIpaService`],
//! [`environment::EnvironmentWaitService`],
//! [`environment::EnvironmentDeletionService`],
//! [`telemetry::TelemetryUpgradeService`]) add the checks and messages the
//! flows and API layers share.
//!
//! # Example
//!
//! ```rust,ignore
//! use stratus_flows::freeipa::{FreeIpaService, UpscaleFlow, UpscalePayload};
//!
//! let engine = UpscaleFlow::engine_builder(FreeIpaService::new(client), config.freeipa_polling, registry)
//!     .build();
//! engine.start(StartRequest::new(42, env_crn, UpscalePayload::new(env_crn, account_id))).await?;
//! ```

/// External service contracts and their data types.
pub mod collaborators;

/// Telemetry upgrade configuration.
pub mod config;

/// Diagnostics collection flow and handlers.
pub mod diagnostics;

/// Environment readiness waits and deletion.
pub mod environment;

/// Error types for collaborators and services.
pub mod error;

/// FreeIPA facade and upscale flow.
pub mod freeipa;

/// Telemetry component upgrades.
pub mod telemetry;

pub use error::{CollaboratorError, Result, ServiceError};
