// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Domain events exchanged between flow actions, handlers and the engine.
//!
//! An [`Event`] is an immutable value: the selector that routes it, the
//! resource it concerns, an operation-specific payload and, for failure
//! events, a categorized [`Failure`]. Follow-up events are built as new
//! values (`Event::new`, [`Event::follow_up`], [`Event::failure`]) rather
//! than by mutating an existing one.

use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// Identifier of a managed resource (cluster, identity service, environment).
pub type ResourceId = i64;

/// Routing key of an event.
///
/// Each flow type declares a closed enumeration of selectors; the transition
/// table and the handler registry are keyed by it.
pub trait Selector: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Stable upper-snake name used in logs and audit records.
    fn name(&self) -> &'static str;
}

/// Categorized failure tag carried by failure events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureType {
    /// No specific category.
    Unset,
    /// Preparing the operation failed.
    InitializationFailure,
    /// Machine user / credential lookup failed.
    UmsResourceCheckFailure,
    /// Removing temporary artifacts failed.
    CleanupFailure,
    /// Upgrading an agent or component on the nodes failed.
    UpgradeFailure,
    /// Collecting data from the nodes failed.
    CollectionFailure,
    /// A scale call or the scale operation failed.
    ScaleFailure,
    /// Deleting a dependent resource failed.
    DeletionFailure,
    /// A wait on an external state change timed out.
    Timeout,
}

impl FailureType {
    /// Returns the string representation of the failure type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unset => "UNSET",
            Self::InitializationFailure => "INITIALIZATION_FAILURE",
            Self::UmsResourceCheckFailure => "UMS_RESOURCE_CHECK_FAILURE",
            Self::CleanupFailure => "CLEANUP_FAILURE",
            Self::UpgradeFailure => "UPGRADE_FAILURE",
            Self::CollectionFailure => "COLLECTION_FAILURE",
            Self::ScaleFailure => "SCALE_FAILURE",
            Self::DeletionFailure => "DELETION_FAILURE",
            Self::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostic part of a failure event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Category used by downstream notification.
    pub failure_type: FailureType,
    /// Human-readable cause.
    pub cause: String,
}

impl Failure {
    pub fn new(failure_type: FailureType, cause: impl Into<String>) -> Self {
        Self {
            failure_type,
            cause: cause.into(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.failure_type, self.cause)
    }
}

/// A routed domain event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event<S, P> {
    /// Names the transition or handler this event targets.
    pub selector: S,
    /// Internal identifier of the resource.
    pub resource_id: ResourceId,
    /// External-facing identifier of the resource.
    pub resource_crn: String,
    /// Operation-specific data.
    pub payload: P,
    /// Handle of an external asynchronous operation, when one is in flight.
    pub operation_id: Option<String>,
    /// Present only on failure events.
    pub failure: Option<Failure>,
}

impl<S: Selector, P: Clone> Event<S, P> {
    /// Create a plain event.
    pub fn new(
        selector: S,
        resource_id: ResourceId,
        resource_crn: impl Into<String>,
        payload: P,
    ) -> Self {
        Self {
            selector,
            resource_id,
            resource_crn: resource_crn.into(),
            payload,
            operation_id: None,
            failure: None,
        }
    }

    /// Build the next event of the same resource, keeping payload and
    /// operation id.
    pub fn follow_up(&self, selector: S) -> Self {
        Self {
            selector,
            resource_id: self.resource_id,
            resource_crn: self.resource_crn.clone(),
            payload: self.payload.clone(),
            operation_id: self.operation_id.clone(),
            failure: None,
        }
    }

    /// Build the next event of the same resource with a new payload.
    pub fn follow_up_with(&self, selector: S, payload: P) -> Self {
        Self {
            payload,
            ..self.follow_up(selector)
        }
    }

    /// Build a failure event that keeps the resource id and CRN of `source`.
    pub fn failure(
        source: &Self,
        selector: S,
        failure_type: FailureType,
        cause: impl Into<String>,
    ) -> Self {
        Self {
            failure: Some(Failure::new(failure_type, cause)),
            ..source.follow_up(selector)
        }
    }

    /// Return a copy of this event correlated with an external operation.
    pub fn with_operation_id(self, operation_id: impl Into<String>) -> Self {
        Self {
            operation_id: Some(operation_id.into()),
            ..self
        }
    }

    /// Whether this is a failure event.
    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum TestSelector {
        Start,
        Next,
        Failed,
    }

    impl Selector for TestSelector {
        fn name(&self) -> &'static str {
            match self {
                Self::Start => "START",
                Self::Next => "NEXT",
                Self::Failed => "FAILED",
            }
        }
    }

    #[test]
    fn test_follow_up_keeps_resource_and_operation() {
        let event = Event::new(TestSelector::Start, 7, "crn:env:7", 3u32).with_operation_id("op-1");
        let next = event.follow_up(TestSelector::Next);

        assert_eq!(next.selector, TestSelector::Next);
        assert_eq!(next.resource_id, 7);
        assert_eq!(next.resource_crn, "crn:env:7");
        assert_eq!(next.payload, 3);
        assert_eq!(next.operation_id.as_deref(), Some("op-1"));
        assert!(!next.is_failure());
        // The source is untouched.
        assert_eq!(event.selector, TestSelector::Start);
    }

    #[test]
    fn test_failure_event_carries_original_identity() {
        let event = Event::new(TestSelector::Next, 42, "crn:dl:42", ());
        let failed = Event::failure(
            &event,
            TestSelector::Failed,
            FailureType::CleanupFailure,
            "disk busy",
        );

        assert_eq!(failed.resource_id, 42);
        assert_eq!(failed.resource_crn, "crn:dl:42");
        let failure = failed.failure.expect("failure");
        assert_eq!(failure.failure_type, FailureType::CleanupFailure);
        assert_eq!(failure.cause, "disk busy");
    }

    #[test]
    fn test_follow_up_drops_failure() {
        let event = Event::new(TestSelector::Start, 1, "crn", ());
        let failed = Event::failure(&event, TestSelector::Failed, FailureType::Unset, "x");
        assert!(!failed.follow_up(TestSelector::Next).is_failure());
    }

    #[test]
    fn test_failure_type_display() {
        assert_eq!(FailureType::UmsResourceCheckFailure.to_string(), "UMS_RESOURCE_CHECK_FAILURE");
        assert_eq!(
            Failure::new(FailureType::Timeout, "env wait").to_string(),
            "[TIMEOUT] env wait"
        );
    }

    #[test]
    fn test_failure_type_serializes_upper_snake() {
        let json = serde_json::to_string(&FailureType::InitializationFailure).unwrap();
        assert_eq!(json, "\"INITIALIZATION_FAILURE\"");
    }
}
