// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Selector-routed delivery of events to handlers.
//!
//! Handlers own a selector and turn the event they accept into the next
//! event of the flow. When a handler fails, the dispatcher asks the handler
//! for its default failure event and delivers that in place of the output,
//! so a handler failure never drops an event. The dispatcher does not
//! retry; looping back is a property of the flow's transition table.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::event::{Event, ResourceId, Selector};
use crate::flow::{ActionError, FlowId};

/// Event handed to a handler, together with the flow it belongs to.
#[derive(Debug)]
pub struct HandlerEvent<'a, S, P> {
    /// Flow driving the event, when dispatched by an engine.
    pub flow_id: Option<FlowId>,
    pub event: &'a Event<S, P>,
}

/// A unit of work bound to one selector.
#[async_trait]
pub trait EventHandler<S: Selector, P: Send + Sync>: Send + Sync {
    /// Selector this handler consumes.
    fn selector(&self) -> S;

    /// Process the event and return the next event of the flow.
    async fn accept(&self, event: HandlerEvent<'_, S, P>) -> Result<Event<S, P>, ActionError>;

    /// Build the failure event published when [`accept`](Self::accept) fails.
    fn default_failure_event(
        &self,
        resource_id: ResourceId,
        error: &ActionError,
        event: &Event<S, P>,
    ) -> Event<S, P>;
}

/// Result of publishing one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery<S, P> {
    /// No handler is registered for the selector; the event is returned to
    /// the caller untouched.
    Unhandled(Event<S, P>),
    /// A handler accepted the event and produced the next one.
    Handled(Event<S, P>),
    /// The handler failed; carries the synthesized failure event.
    Failed(Event<S, P>),
    /// The handler observed a cancellation.
    Cancelled,
}

/// Registry of handlers keyed by selector.
pub struct EventDispatcher<S: Selector, P: Send + Sync> {
    handlers: RwLock<HashMap<S, Arc<dyn EventHandler<S, P>>>>,
}

impl<S: Selector, P: Send + Sync> Default for EventDispatcher<S, P> {
    fn default() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }
}

impl<S: Selector, P: Send + Sync> std::fmt::Debug for EventDispatcher<S, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        let mut selectors: Vec<&'static str> = handlers.keys().map(|s| s.name()).collect();
        selectors.sort_unstable();
        f.debug_struct("EventDispatcher")
            .field("selectors", &selectors)
            .finish()
    }
}

impl<S: Selector, P: Send + Sync> EventDispatcher<S, P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its selector, returning the handler it replaces.
    pub fn register(&self, handler: Arc<dyn EventHandler<S, P>>) -> Option<Arc<dyn EventHandler<S, P>>> {
        let selector = handler.selector();
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        let previous = handlers.insert(selector, handler);
        if previous.is_some() {
            warn!(selector = selector.name(), "Replacing registered event handler");
        }
        previous
    }

    /// Whether a handler is registered for the selector.
    pub fn handles(&self, selector: S) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&selector)
    }

    fn handler(&self, selector: S) -> Option<Arc<dyn EventHandler<S, P>>> {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&selector)
            .cloned()
    }

    /// Deliver one event to the handler registered for its selector.
    ///
    /// The failure event of a failing handler is built before this returns.
    pub async fn publish(&self, event: Event<S, P>, flow_id: Option<FlowId>) -> Delivery<S, P> {
        let Some(handler) = self.handler(event.selector) else {
            return Delivery::Unhandled(event);
        };

        debug!(
            selector = event.selector.name(),
            resource_id = event.resource_id,
            "Dispatching event to handler"
        );

        match handler.accept(HandlerEvent { flow_id, event: &event }).await {
            Ok(next) => Delivery::Handled(next),
            Err(e) if e.is_cancellation() => {
                debug!(selector = event.selector.name(), resource_id = event.resource_id, "Handler observed cancellation");
                Delivery::Cancelled
            }
            Err(e) => {
                let failure = handler.default_failure_event(event.resource_id, &e, &event);
                warn!(
                    selector = event.selector.name(),
                    resource_id = event.resource_id,
                    failure_selector = failure.selector.name(),
                    error = %e,
                    "Handler failed, publishing failure event"
                );
                Delivery::Failed(failure)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::FailureType;
    use crate::polling::PollError;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Sel {
        Cleanup,
        Finish,
        CleanupFailed,
        Other,
    }

    impl Selector for Sel {
        fn name(&self) -> &'static str {
            match self {
                Self::Cleanup => "CLEANUP",
                Self::Finish => "FINISH",
                Self::CleanupFailed => "CLEANUP_FAILED",
                Self::Other => "OTHER",
            }
        }
    }

    struct CleanupHandler {
        outcome: Result<(), ActionError>,
    }

    #[async_trait]
    impl EventHandler<Sel, String> for CleanupHandler {
        fn selector(&self) -> Sel {
            Sel::Cleanup
        }

        async fn accept(&self, event: HandlerEvent<'_, Sel, String>) -> Result<Event<Sel, String>, ActionError> {
            self.outcome.clone()?;
            Ok(event.event.follow_up(Sel::Finish))
        }

        fn default_failure_event(
            &self,
            _resource_id: ResourceId,
            error: &ActionError,
            event: &Event<Sel, String>,
        ) -> Event<Sel, String> {
            Event::failure(event, Sel::CleanupFailed, FailureType::CleanupFailure, error.to_string())
        }
    }

    fn event(selector: Sel) -> Event<Sel, String> {
        Event::new(selector, 11, "crn:stack:11", "payload".to_string())
    }

    #[tokio::test]
    async fn test_unhandled_event_is_returned() {
        let dispatcher: EventDispatcher<Sel, String> = EventDispatcher::new();
        let delivery = dispatcher.publish(event(Sel::Other), None).await;
        assert_eq!(delivery, Delivery::Unhandled(event(Sel::Other)));
    }

    #[tokio::test]
    async fn test_handler_output_is_delivered() {
        let dispatcher: EventDispatcher<Sel, String> = EventDispatcher::new();
        dispatcher.register(Arc::new(CleanupHandler { outcome: Ok(()) }));
        assert!(dispatcher.handles(Sel::Cleanup));

        match dispatcher.publish(event(Sel::Cleanup), None).await {
            Delivery::Handled(next) => {
                assert_eq!(next.selector, Sel::Finish);
                assert_eq!(next.payload, "payload");
            }
            other => panic!("Expected Handled, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_handler_failure_synthesizes_failure_event() {
        let dispatcher: EventDispatcher<Sel, String> = EventDispatcher::new();
        dispatcher.register(Arc::new(CleanupHandler {
            outcome: Err(ActionError::failed("bucket locked")),
        }));

        match dispatcher.publish(event(Sel::Cleanup), None).await {
            Delivery::Failed(failure) => {
                assert_eq!(failure.selector, Sel::CleanupFailed);
                assert_eq!(failure.resource_id, 11);
                assert_eq!(failure.resource_crn, "crn:stack:11");
                let failure = failure.failure.unwrap();
                assert_eq!(failure.failure_type, FailureType::CleanupFailure);
                assert_eq!(failure.cause, "bucket locked");
            }
            other => panic!("Expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_handler_cancellation_is_not_a_failure() {
        let dispatcher: EventDispatcher<Sel, String> = EventDispatcher::new();
        dispatcher.register(Arc::new(CleanupHandler {
            outcome: Err(ActionError::Poll(PollError::Cancelled)),
        }));

        let delivery = dispatcher.publish(event(Sel::Cleanup), None).await;
        assert_eq!(delivery, Delivery::Cancelled);
    }

    #[test]
    fn test_register_replaces() {
        let dispatcher: EventDispatcher<Sel, String> = EventDispatcher::new();
        assert!(dispatcher.register(Arc::new(CleanupHandler { outcome: Ok(()) })).is_none());
        assert!(dispatcher.register(Arc::new(CleanupHandler { outcome: Ok(()) })).is_some());
        assert_eq!(format!("{:?}", dispatcher), r#"EventDispatcher { selectors: ["CLEANUP"] }"#);
    }
}
