// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Environment lifecycle: readiness waits and deletion.

pub mod cascading_delete;
pub mod deletion;
pub mod wait;

pub use cascading_delete::{CascadingDeleteFlow, DeletionEvent, DeletionFlowEvent, DeletionState};
pub use deletion::EnvironmentDeletionService;
pub use wait::{EnvironmentWaitService, WaitTarget};
