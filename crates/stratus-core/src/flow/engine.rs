// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Flow engine.
//!
//! [`FlowEngine`] runs instances of one [`FlowDefinition`]. Every event of a
//! resource is processed inside that resource's execution lane, so actions
//! of one resource never run concurrently while different resources
//! proceed in parallel.
//!
//! Processing one event:
//!
//! 1. If the registry reports the resource cancelled, the flow ends with
//!    status `Cancelled`.
//! 2. If a handler is registered for the selector, the handler consumes the
//!    event and its output (or its failure event) is processed next.
//! 3. Otherwise the definition's transition table picks the next state. A
//!    missing transition fails the flow with
//!    [`FlowError::IllegalTransition`].
//! 4. The action of the new state runs. Its follow-up event is processed
//!    next; a raised error is turned into the definition's failure event.
//!
//! Engines built on the same [`FlowRegistry`] share its execution lanes, so
//! at most one flow of any type is active per resource. Terminal instances
//! stay readable through [`FlowEngine::get`] until more than
//! [`DEFAULT_TERMINAL_RETENTION`] newer runs have ended.
//!
//! ```rust,ignore
//! let engine = FlowEngine::builder(UpscaleFlow::new(freeipa, config))
//!     .registry(registry)
//!     .handler(Arc::new(WaitHandler::new(...)))
//!     .build();
//!
//! let flow_id = engine.start(StartRequest::new(42, "crn:env:42", payload)).await?;
//! let snapshot = engine.get(flow_id);
//! ```

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::dispatch::{Delivery, EventDispatcher, EventHandler};
use crate::error::{FlowError, Result};
use crate::event::{Event, Failure, FailureType, ResourceId, Selector};
use crate::registry::FlowRegistry;
use crate::sink::{AuditRecord, EventSink, TracingEventSink};

use super::definition::{ActionContext, FlowDefinition, FlowParameters, FlowState};
use super::instance::{FlowInstance, FlowSnapshot, FlowStatus};
use super::lanes::ExecutionLanes;
use super::FlowId;

/// Number of terminal instances an engine keeps for [`FlowEngine::get`].
pub const DEFAULT_TERMINAL_RETENTION: usize = 256;

type FlowEvent<F> = Event<<F as FlowDefinition>::Selector, <F as FlowDefinition>::Payload>;

/// Trigger of a new flow run.
#[derive(Debug, Clone)]
pub struct StartRequest<P> {
    pub resource_id: ResourceId,
    pub resource_crn: String,
    pub user_crn: Option<String>,
    pub cascading: bool,
    pub forced: bool,
    pub payload: P,
}

impl<P> StartRequest<P> {
    pub fn new(resource_id: ResourceId, resource_crn: impl Into<String>, payload: P) -> Self {
        Self {
            resource_id,
            resource_crn: resource_crn.into(),
            user_crn: None,
            cascading: false,
            forced: false,
            payload,
        }
    }
}

/// Handle of a flow submitted to run in the background.
#[derive(Debug)]
pub struct FlowHandle<St> {
    pub flow_id: FlowId,
    task: JoinHandle<Result<FlowSnapshot<St>>>,
}

impl<St> FlowHandle<St> {
    /// Wait until the flow finishes or parks waiting for an external event.
    pub async fn wait(self) -> Result<FlowSnapshot<St>> {
        self.task
            .await
            .map_err(|e| FlowError::Dispatch(format!("flow task failed: {}", e)))?
    }
}

/// Builder for creating a [`FlowEngine`].
pub struct FlowEngineBuilder<F: FlowDefinition> {
    definition: F,
    registry: Option<Arc<FlowRegistry>>,
    sink: Option<Arc<dyn EventSink>>,
    handlers: Vec<Arc<dyn EventHandler<F::Selector, F::Payload>>>,
    terminal_retention: usize,
}

impl<F: FlowDefinition> fmt::Debug for FlowEngineBuilder<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowEngineBuilder")
            .field("flow_type", &self.definition.flow_type())
            .field("registry", &self.registry.as_ref().map(|_| "..."))
            .field("sink", &self.sink.as_ref().map(|_| "..."))
            .field("handlers", &self.handlers.len())
            .field("terminal_retention", &self.terminal_retention)
            .finish()
    }
}

impl<F: FlowDefinition> FlowEngineBuilder<F> {
    /// Cancellation registry. Defaults to [`FlowRegistry::global()`].
    ///
    /// The engine takes its execution lanes from the registry.
    pub fn registry(mut self, registry: Arc<FlowRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Terminal instances kept for [`FlowEngine::get`]. Defaults to
    /// [`DEFAULT_TERMINAL_RETENTION`].
    pub fn terminal_retention(mut self, count: usize) -> Self {
        self.terminal_retention = count;
        self
    }

    /// Audit sink. Defaults to [`TracingEventSink`].
    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn handler(mut self, handler: Arc<dyn EventHandler<F::Selector, F::Payload>>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn build(self) -> FlowEngine<F> {
        let dispatcher = EventDispatcher::new();
        for handler in self.handlers {
            dispatcher.register(handler);
        }
        let registry = self.registry.unwrap_or_else(FlowRegistry::global);
        FlowEngine {
            definition: Arc::new(self.definition),
            dispatcher,
            lanes: registry.lanes(),
            registry,
            sink: self.sink.unwrap_or_else(|| Arc::new(TracingEventSink)),
            instances: Mutex::new(HashMap::new()),
            retired: Mutex::new(VecDeque::new()),
            terminal_retention: self.terminal_retention,
        }
    }
}

/// Runs instances of one flow definition.
pub struct FlowEngine<F: FlowDefinition> {
    definition: Arc<F>,
    dispatcher: EventDispatcher<F::Selector, F::Payload>,
    registry: Arc<FlowRegistry>,
    lanes: Arc<ExecutionLanes>,
    sink: Arc<dyn EventSink>,
    instances: Mutex<HashMap<FlowId, FlowInstance<F::State>>>,
    /// Terminal flow ids, oldest first.
    retired: Mutex<VecDeque<FlowId>>,
    terminal_retention: usize,
}

impl<F: FlowDefinition> fmt::Debug for FlowEngine<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowEngine")
            .field("flow_type", &self.definition.flow_type())
            .field("dispatcher", &self.dispatcher)
            .field("active_lanes", &self.lanes.len())
            .finish()
    }
}

impl<F: FlowDefinition> FlowEngine<F> {
    pub fn builder(definition: F) -> FlowEngineBuilder<F> {
        FlowEngineBuilder {
            definition,
            registry: None,
            sink: None,
            handlers: Vec::new(),
            terminal_retention: DEFAULT_TERMINAL_RETENTION,
        }
    }

    pub fn definition(&self) -> &F {
        &self.definition
    }

    pub fn registry(&self) -> &Arc<FlowRegistry> {
        &self.registry
    }

    /// Register an additional event handler.
    pub fn register_handler(&self, handler: Arc<dyn EventHandler<F::Selector, F::Payload>>) {
        self.dispatcher.register(handler);
    }

    /// Start a flow and process its start event chain.
    ///
    /// Returns once the flow finishes or parks waiting for an external
    /// event. Fails with [`FlowError::Conflict`] if the resource already has
    /// an active flow.
    pub async fn start(&self, request: StartRequest<F::Payload>) -> Result<FlowId> {
        let resource_id = request.resource_id;
        let (flow_id, event) = self.open(request)?;
        self.run_opened(flow_id, resource_id, event).await?;
        Ok(flow_id)
    }

    /// Start a flow and process its start event chain on a background task.
    ///
    /// The resource is claimed before this returns, so a conflict is
    /// reported synchronously.
    pub fn submit(self: &Arc<Self>, request: StartRequest<F::Payload>) -> Result<FlowHandle<F::State>> {
        let resource_id = request.resource_id;
        let (flow_id, event) = self.open(request)?;
        let engine = self.clone();
        let task = tokio::spawn(async move { engine.run_opened(flow_id, resource_id, event).await });
        Ok(FlowHandle { flow_id, task })
    }

    /// Deliver an external event to a running flow.
    pub async fn dispatch(
        &self,
        flow_id: FlowId,
        event: FlowEvent<F>,
    ) -> Result<FlowSnapshot<F::State>> {
        let guard = self.lock_lane(flow_id).await?;
        self.run(flow_id, event, guard).await
    }

    /// Request cancellation of the flow running for `resource_id`.
    ///
    /// The registry is marked cancelled; waits inside the flow observe it on
    /// their next cycle. Once the lane is free, a flow still running is
    /// ended with status `Cancelled`. Returns `None` when this engine has no
    /// active flow for the resource.
    pub async fn cancel(&self, resource_id: ResourceId) -> Option<FlowSnapshot<F::State>> {
        let (flow_id, lane) = self.lanes.lane(resource_id)?;
        if !self.owns(flow_id) {
            return None;
        }

        info!(flow_id = %flow_id, resource_id, "Cancelling flow");
        self.lanes
            .with_holder(resource_id, flow_id, || self.registry.mark_cancelled(resource_id))?;

        let _guard = lane.lock_owned().await;
        let params = self.with_instance(flow_id, |instance| instance.params.clone())?;
        self.finish_cancelled(&params);
        self.get(flow_id)
    }

    /// Snapshot of a flow run by this engine.
    pub fn get(&self, flow_id: FlowId) -> Option<FlowSnapshot<F::State>> {
        self.with_instance(flow_id, |instance| instance.snapshot())
    }

    /// Flow currently holding the resource, of any type sharing these lanes.
    pub fn active_flow(&self, resource_id: ResourceId) -> Option<FlowId> {
        self.lanes.active_flow(resource_id)
    }

    fn owns(&self, flow_id: FlowId) -> bool {
        self.with_instance(flow_id, |_| ()).is_some()
    }

    fn with_instance<R>(
        &self,
        flow_id: FlowId,
        f: impl FnOnce(&mut FlowInstance<F::State>) -> R,
    ) -> Option<R> {
        let mut instances = self.instances.lock().unwrap_or_else(|e| e.into_inner());
        instances.get_mut(&flow_id).map(f)
    }

    /// Claim the resource and create the instance.
    fn open(&self, request: StartRequest<F::Payload>) -> Result<(FlowId, FlowEvent<F>)> {
        let flow_id = Uuid::new_v4();
        let flow_type = self.definition.flow_type();
        self.lanes.claim(request.resource_id, flow_id, flow_type)?;
        self.registry.mark_running(request.resource_id);

        let params = FlowParameters {
            flow_id,
            flow_type,
            resource_id: request.resource_id,
            resource_crn: request.resource_crn.clone(),
            user_crn: request.user_crn,
            cascading: request.cascading,
            forced: request.forced,
        };
        let instance = FlowInstance::new(params, self.definition.initial_state());
        self.instances
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(flow_id, instance);

        info!(
            flow_id = %flow_id,
            flow_type,
            resource_id = request.resource_id,
            "Flow started"
        );

        let event = Event::new(
            self.definition.start_selector(),
            request.resource_id,
            request.resource_crn,
            request.payload,
        );
        Ok((flow_id, event))
    }

    /// Process the start event of a freshly opened flow.
    ///
    /// A cancel request that ended the flow before it took its lane is
    /// reported as [`FlowError::Cancelled`].
    async fn run_opened(
        &self,
        flow_id: FlowId,
        resource_id: ResourceId,
        event: FlowEvent<F>,
    ) -> Result<FlowSnapshot<F::State>> {
        let outcome = match self.lock_lane(flow_id).await {
            Ok(guard) => self.run(flow_id, event, guard).await,
            Err(e) => Err(e),
        };
        outcome.map_err(|e| match e {
            FlowError::FlowTerminated {
                status: FlowStatus::Cancelled,
                ..
            } => FlowError::Cancelled {
                flow_id,
                resource_id,
            },
            e => e,
        })
    }

    /// Acquire the lane of a running flow.
    async fn lock_lane(&self, flow_id: FlowId) -> Result<OwnedMutexGuard<()>> {
        let (resource_id, status) = self
            .with_instance(flow_id, |instance| (instance.params.resource_id, instance.status))
            .ok_or(FlowError::FlowNotFound(flow_id))?;
        if status.is_terminal() {
            return Err(FlowError::FlowTerminated { flow_id, status });
        }

        let lane = match self.lanes.lane(resource_id) {
            Some((active, lane)) if active == flow_id => lane,
            _ => {
                return Err(FlowError::FlowTerminated {
                    flow_id,
                    status: self.status_of(flow_id),
                });
            }
        };
        Ok(lane.lock_owned().await)
    }

    fn status_of(&self, flow_id: FlowId) -> FlowStatus {
        self.with_instance(flow_id, |instance| instance.status)
            .unwrap_or(FlowStatus::Finished)
    }

    /// Process `event` and every follow-up event until the flow finishes or
    /// parks. Must be called with the flow's lane held.
    async fn run(
        &self,
        flow_id: FlowId,
        mut event: FlowEvent<F>,
        _guard: OwnedMutexGuard<()>,
    ) -> Result<FlowSnapshot<F::State>> {
        let (params, status) = self
            .with_instance(flow_id, |instance| (instance.params.clone(), instance.status))
            .ok_or(FlowError::FlowNotFound(flow_id))?;
        if status.is_terminal() {
            return Err(FlowError::FlowTerminated { flow_id, status });
        }
        let ctx = ActionContext::new(params.clone(), self.registry.clone());

        loop {
            if self.registry.is_cancelled(params.resource_id) {
                self.finish_cancelled(&params);
                return Err(FlowError::Cancelled {
                    flow_id,
                    resource_id: params.resource_id,
                });
            }

            let state = self.current_state(flow_id)?;

            if self.dispatcher.handles(event.selector) {
                self.record(&params, state, None, &event);
                match self.dispatcher.publish(event, Some(flow_id)).await {
                    Delivery::Handled(next) | Delivery::Failed(next) => {
                        event = next;
                        continue;
                    }
                    Delivery::Cancelled => {
                        self.finish_cancelled(&params);
                        return Err(FlowError::Cancelled {
                            flow_id,
                            resource_id: params.resource_id,
                        });
                    }
                    Delivery::Unhandled(unhandled) => event = unhandled,
                }
            }

            let Some(next) = self.definition.transition(state, event.selector) else {
                return Err(self.reject(&params, state, &event));
            };

            self.record(&params, state, Some(next), &event);
            self.enter(&params, state, next, &event);

            match self.definition.execute(next, &ctx, &event).await {
                Ok(Some(follow_up)) if !next.is_terminal() => event = follow_up,
                Ok(Some(follow_up)) => {
                    warn!(
                        flow_id = %flow_id,
                        state = next.name(),
                        selector = follow_up.selector.name(),
                        "Terminal state emitted an event, ignoring"
                    );
                    return self.complete(&params);
                }
                Ok(None) if next.is_terminal() => return self.complete(&params),
                Ok(None) => {
                    debug!(flow_id = %flow_id, state = next.name(), "Flow waiting for external event");
                    return self.get(flow_id).ok_or(FlowError::FlowNotFound(flow_id));
                }
                Err(e) if e.is_cancellation() => {
                    self.finish_cancelled(&params);
                    return Err(FlowError::Cancelled {
                        flow_id,
                        resource_id: params.resource_id,
                    });
                }
                Err(e) if next.is_terminal() => {
                    error!(
                        flow_id = %flow_id,
                        state = next.name(),
                        error = %e,
                        "Action of terminal state failed"
                    );
                    return self.complete(&params);
                }
                Err(e) => {
                    let failure = self.definition.failure_event(next, &event, Some(&params), &e);
                    warn!(
                        flow_id = %flow_id,
                        state = next.name(),
                        failure_selector = failure.selector.name(),
                        error = %e,
                        "Action failed, publishing failure event"
                    );
                    event = failure;
                }
            }
        }
    }

    fn current_state(&self, flow_id: FlowId) -> Result<F::State> {
        self.with_instance(flow_id, |instance| instance.state)
            .ok_or(FlowError::FlowNotFound(flow_id))
    }

    fn enter(&self, params: &FlowParameters, from: F::State, to: F::State, event: &FlowEvent<F>) {
        let failed_state = self.definition.failed_state();
        self.with_instance(params.flow_id, |instance| {
            instance.enter(to);
            if to == failed_state {
                instance.failure = Some(event.failure.clone().unwrap_or_else(|| {
                    Failure::new(
                        FailureType::Unset,
                        format!("{} entered on {}", to.name(), event.selector.name()),
                    )
                }));
            }
        });
        info!(
            flow_id = %params.flow_id,
            resource_id = params.resource_id,
            selector = event.selector.name(),
            from = from.name(),
            to = to.name(),
            "Flow transition"
        );
    }

    /// Fail the flow for an event with no transition.
    fn reject(&self, params: &FlowParameters, state: F::State, event: &FlowEvent<F>) -> FlowError {
        let failure = Failure::new(
            FailureType::Unset,
            format!("no transition from {} on {}", state.name(), event.selector.name()),
        );
        error!(
            flow_id = %params.flow_id,
            resource_id = params.resource_id,
            state = state.name(),
            selector = event.selector.name(),
            "Illegal transition"
        );

        let failed = self.with_instance(params.flow_id, |instance| {
            instance.failure = Some(failure.clone());
            instance.finish(FlowStatus::Failed)
        });
        if failed == Some(true) {
            self.sink.record(AuditRecord {
                failure: Some(failure),
                ..self.audit_record(params, state, None, event)
            });
            self.release(params);
            self.retire(params.flow_id);
        }

        FlowError::IllegalTransition {
            flow_id: params.flow_id,
            state: state.name(),
            selector: event.selector.name(),
        }
    }

    fn complete(&self, params: &FlowParameters) -> Result<FlowSnapshot<F::State>> {
        let finished = self.with_instance(params.flow_id, |instance| {
            let status = if instance.failure.is_some() {
                FlowStatus::Failed
            } else {
                FlowStatus::Finished
            };
            (instance.finish(status), instance.snapshot())
        });
        self.release(params);

        let (finished, snapshot) = finished.ok_or(FlowError::FlowNotFound(params.flow_id))?;
        if finished {
            self.retire(params.flow_id);
        }
        info!(
            flow_id = %params.flow_id,
            resource_id = params.resource_id,
            state = snapshot.state.name(),
            status = %snapshot.status,
            "Flow completed"
        );
        Ok(snapshot)
    }

    fn finish_cancelled(&self, params: &FlowParameters) {
        let cancelled = self.with_instance(params.flow_id, |instance| {
            instance.finish(FlowStatus::Cancelled)
        });
        self.release(params);
        if cancelled == Some(true) {
            info!(
                flow_id = %params.flow_id,
                resource_id = params.resource_id,
                "Flow cancelled"
            );
            self.retire(params.flow_id);
        }
    }

    /// Free the resource if this flow still holds it.
    ///
    /// Callers hold the flow's lane, so ownership cannot change between
    /// clearing the registry and releasing the lane.
    fn release(&self, params: &FlowParameters) {
        let cleared = self.lanes.with_holder(params.resource_id, params.flow_id, || {
            self.registry.clear(params.resource_id)
        });
        if cleared.is_none() {
            debug!(
                flow_id = %params.flow_id,
                resource_id = params.resource_id,
                "Resource already released"
            );
            return;
        }
        self.lanes.release(params.resource_id, params.flow_id);
    }

    /// Remember a terminal flow, evicting the oldest beyond the retention.
    fn retire(&self, flow_id: FlowId) {
        let evicted: Vec<FlowId> = {
            let mut retired = self.retired.lock().unwrap_or_else(|e| e.into_inner());
            retired.push_back(flow_id);
            let excess = retired.len().saturating_sub(self.terminal_retention);
            retired.drain(..excess).collect()
        };
        if evicted.is_empty() {
            return;
        }

        let mut instances = self.instances.lock().unwrap_or_else(|e| e.into_inner());
        for id in &evicted {
            instances.remove(id);
        }
        debug!(
            flow_type = self.definition.flow_type(),
            evicted = evicted.len(),
            retained = instances.len(),
            "Evicted terminal flow instances"
        );
    }

    fn record(
        &self,
        params: &FlowParameters,
        from: F::State,
        to: Option<F::State>,
        event: &FlowEvent<F>,
    ) {
        self.sink.record(self.audit_record(params, from, to, event));
    }

    fn audit_record(
        &self,
        params: &FlowParameters,
        from: F::State,
        to: Option<F::State>,
        event: &FlowEvent<F>,
    ) -> AuditRecord {
        AuditRecord {
            flow_id: params.flow_id,
            flow_type: params.flow_type,
            selector: event.selector.name(),
            resource_id: event.resource_id,
            resource_crn: event.resource_crn.clone(),
            operation_id: event.operation_id.clone(),
            from_state: from.name(),
            to_state: to.map(|s| s.name()),
            failure: event.failure.clone(),
            payload: serde_json::to_value(&event.payload).unwrap_or(serde_json::Value::Null),
            timestamp: Utc::now(),
        }
    }
}
