// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wait until an external asynchronous state change completes.
//!
//! [`wait_until`] repeatedly runs an attempt closure at a fixed interval.
//! Each cycle first consults the cancel check, then the attempt, which
//! decides whether to keep waiting ([`AttemptResult::Continue`]), succeed
//! with a value ([`AttemptResult::Finish`]) or give up early
//! ([`AttemptResult::Break`]). Elapsed time is measured from the first
//! attempt; once it reaches the configured timeout the wait fails with
//! [`PollError::Timeout`].
//!
//! ```ignore
//! let status = wait_until(&config, || registry.is_cancelled(id), || async {
//!     match client.status(id).await? {
//!         Status::Available => Ok(AttemptResult::Finish(Status::Available)),
//!         Status::Failed => Ok(AttemptResult::Break(AbortReason::new(AbortKind::TargetFailed, "failed"))),
//!         _ => Ok(AttemptResult::Continue),
//!     }
//! }).await?;
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Interval, timeout and error policy of one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    /// Pause between attempts.
    pub interval: Duration,
    /// Total duration measured from the first attempt.
    pub timeout: Duration,
    /// Abort on the first failed attempt instead of retrying next cycle.
    pub stop_on_error: bool,
}

impl PollingConfig {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            stop_on_error: false,
        }
    }

    /// Same interval and timeout with a different error policy.
    pub fn stopping_on_error(self, stop_on_error: bool) -> Self {
        Self {
            stop_on_error,
            ..self
        }
    }
}

/// Why a wait gave up before its target state was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AbortKind {
    /// The target reported a failed state.
    TargetFailed,
    /// The target is stopped or stopping.
    TargetStopped,
    /// The target is starting up and not yet usable.
    TargetStarting,
    /// The flow owning the wait was cancelled while an attempt was running.
    Rejected,
    /// An attempt raised and the policy is to stop on errors.
    AttemptError,
}

/// Kind and message of an early exit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortReason {
    pub kind: AbortKind,
    pub message: String,
}

impl AbortReason {
    pub fn new(kind: AbortKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Outcome of a single polling attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResult<T> {
    /// Not there yet; try again after the interval.
    Continue,
    /// Done; the wait returns this value.
    Finish(T),
    /// Give up early.
    Break(AbortReason),
}

impl<T> AttemptResult<T> {
    pub fn abort(kind: AbortKind, message: impl Into<String>) -> Self {
        Self::Break(AbortReason::new(kind, message))
    }
}

/// Wait failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum PollError {
    /// The deadline passed before the attempt finished.
    #[error("polling timed out after {0:?}")]
    Timeout(Duration),

    /// The cancel check fired before an attempt.
    #[error("polling cancelled")]
    Cancelled,

    /// An attempt gave up early.
    #[error("polling aborted: {0}")]
    Aborted(AbortReason),
}

/// Poll `attempt` until it finishes, breaks, the cancel check fires or the
/// timeout elapses.
///
/// An attempt that returns `Err` is logged and retried on the next cycle,
/// unless [`PollingConfig::stop_on_error`] is set, in which case the wait
/// aborts with [`AbortKind::AttemptError`].
pub async fn wait_until<T, E, C, A, Fut>(
    config: &PollingConfig,
    cancel_check: C,
    mut attempt: A,
) -> Result<T, PollError>
where
    E: fmt::Display,
    C: Fn() -> bool,
    A: FnMut() -> Fut,
    Fut: Future<Output = Result<AttemptResult<T>, E>>,
{
    let started = Instant::now();
    let mut attempts: u32 = 0;

    loop {
        if cancel_check() {
            debug!(attempts, "Polling cancelled before attempt");
            return Err(PollError::Cancelled);
        }

        attempts += 1;
        match attempt().await {
            Ok(AttemptResult::Continue) => {}
            Ok(AttemptResult::Finish(value)) => {
                debug!(attempts, elapsed_ms = started.elapsed().as_millis() as u64, "Polling finished");
                return Ok(value);
            }
            Ok(AttemptResult::Break(reason)) => {
                debug!(attempts, kind = ?reason.kind, reason = %reason, "Polling aborted by attempt");
                return Err(PollError::Aborted(reason));
            }
            Err(e) if config.stop_on_error => {
                warn!(attempts, error = %e, "Polling attempt failed, aborting");
                return Err(PollError::Aborted(AbortReason::new(
                    AbortKind::AttemptError,
                    e.to_string(),
                )));
            }
            Err(e) => {
                warn!(attempts, error = %e, "Polling attempt failed, retrying next cycle");
            }
        }

        let elapsed = started.elapsed();
        if elapsed >= config.timeout {
            warn!(attempts, timeout_secs = config.timeout.as_secs(), "Polling timed out");
            return Err(PollError::Timeout(config.timeout));
        }
        tokio::time::sleep(config.interval.min(config.timeout - elapsed)).await;
    }
}
