// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! FreeIPA service facade and the upscale flow.

pub mod service;
pub mod upscale;

pub use service::FreeIpaService;
pub use upscale::{UpscaleEvent, UpscaleFlow, UpscalePayload, UpscaleState, UpscaleWaitHandler};
