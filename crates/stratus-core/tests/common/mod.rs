// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for stratus-core engine tests.
//!
//! Provides a small "resize" flow driven by a scripted collaborator.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use stratus_core::dispatch::{EventHandler, HandlerEvent};
use stratus_core::flow::{
    ActionContext, ActionError, ActionResult, FlowDefinition, FlowEngine, FlowParameters,
    FlowState, DEFAULT_TERMINAL_RETENTION,
};
use stratus_core::polling::{wait_until, AttemptResult, PollingConfig};
use stratus_core::sink::InMemoryEventSink;
use stratus_core::{Event, FailureType, FlowRegistry, ResourceId, Selector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResizeState {
    Init,
    Resizing,
    Waiting,
    Resized,
    Failed,
    Final,
}

impl FlowState for ResizeState {
    fn name(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Resizing => "RESIZING",
            Self::Waiting => "WAITING",
            Self::Resized => "RESIZED",
            Self::Failed => "FAILED",
            Self::Final => "FINAL",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Final)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResizeEvent {
    Start,
    Wait,
    Check,
    Resized,
    Finalized,
    Failed,
    FailedHandled,
}

impl Selector for ResizeEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Start => "RESIZE_START",
            Self::Wait => "RESIZE_WAIT",
            Self::Check => "RESIZE_CHECK",
            Self::Resized => "RESIZE_FINISHED",
            Self::Finalized => "RESIZE_FINALIZED",
            Self::Failed => "RESIZE_FAILED",
            Self::FailedHandled => "RESIZE_FAILED_HANDLED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Mode {
    /// Emit `Resized` right after the resize call.
    Complete,
    /// Park until an external event arrives.
    Park,
    /// Poll the gate until it opens.
    Wait,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResizePayload {
    pub target: u32,
    pub mode: Mode,
}

pub type ResizeFlowEvent = Event<ResizeEvent, ResizePayload>;

/// Resize collaborator returning scripted results.
#[derive(Debug, Default)]
pub struct ScriptedResizer {
    results: Mutex<VecDeque<Result<String, String>>>,
    pub calls: AtomicU32,
}

impl ScriptedResizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, operation_id: &str) {
        self.results
            .lock()
            .unwrap()
            .push_back(Ok(operation_id.to_string()));
    }

    pub fn push_err(&self, message: &str) {
        self.results.lock().unwrap().push_back(Err(message.to_string()));
    }

    fn resize(&self) -> Result<String, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("op-default".to_string()))
    }
}

pub struct ResizeFlow {
    pub resizer: Arc<ScriptedResizer>,
    pub gate: Arc<AtomicBool>,
    pub polling: PollingConfig,
}

impl ResizeFlow {
    pub fn new(resizer: Arc<ScriptedResizer>, gate: Arc<AtomicBool>) -> Self {
        Self {
            resizer,
            gate,
            polling: PollingConfig::new(Duration::from_secs(1), Duration::from_secs(60)),
        }
    }
}

#[async_trait]
impl FlowDefinition for ResizeFlow {
    type State = ResizeState;
    type Selector = ResizeEvent;
    type Payload = ResizePayload;

    fn flow_type(&self) -> &'static str {
        "resize"
    }

    fn initial_state(&self) -> ResizeState {
        ResizeState::Init
    }

    fn start_selector(&self) -> ResizeEvent {
        ResizeEvent::Start
    }

    fn failed_state(&self) -> ResizeState {
        ResizeState::Failed
    }

    fn transition(&self, from: ResizeState, selector: ResizeEvent) -> Option<ResizeState> {
        use ResizeEvent as E;
        use ResizeState as S;
        match (from, selector) {
            (S::Init, E::Start) => Some(S::Resizing),
            (S::Resizing, E::Wait) => Some(S::Waiting),
            (S::Resizing | S::Waiting, E::Resized) => Some(S::Resized),
            (S::Resized, E::Finalized) => Some(S::Final),
            (S::Init | S::Resizing | S::Waiting | S::Resized, E::Failed) => Some(S::Failed),
            (S::Failed, E::FailedHandled) => Some(S::Final),
            _ => None,
        }
    }

    async fn execute(
        &self,
        state: ResizeState,
        ctx: &ActionContext,
        event: &ResizeFlowEvent,
    ) -> ActionResult<ResizeEvent, ResizePayload> {
        match state {
            ResizeState::Init | ResizeState::Final => Ok(None),
            ResizeState::Resizing => {
                let operation_id = self.resizer.resize().map_err(ActionError::Failed)?;
                let next = match event.payload.mode {
                    Mode::Complete => Some(event.follow_up(ResizeEvent::Resized)),
                    Mode::Wait => Some(event.follow_up(ResizeEvent::Wait)),
                    Mode::Park => None,
                };
                Ok(next.map(|e| e.with_operation_id(operation_id)))
            }
            ResizeState::Waiting => {
                let gate = self.gate.clone();
                wait_until(&self.polling, ctx.cancel_check(), || {
                    let open = gate.load(Ordering::SeqCst);
                    async move {
                        Ok::<_, ActionError>(if open {
                            AttemptResult::Finish(())
                        } else {
                            AttemptResult::Continue
                        })
                    }
                })
                .await?;
                Ok(Some(event.follow_up(ResizeEvent::Resized)))
            }
            ResizeState::Resized => Ok(Some(event.follow_up(ResizeEvent::Finalized))),
            ResizeState::Failed => Ok(Some(event.follow_up(ResizeEvent::FailedHandled))),
        }
    }

    fn failure_event(
        &self,
        _state: ResizeState,
        event: &ResizeFlowEvent,
        _params: Option<&FlowParameters>,
        error: &ActionError,
    ) -> ResizeFlowEvent {
        Event::failure(
            event,
            ResizeEvent::Failed,
            error.failure_type(FailureType::ScaleFailure),
            error.to_string(),
        )
    }
}

/// Handler for `Check` events: succeeds with `Resized` or fails.
pub struct CheckHandler {
    pub fail_with: Option<String>,
    pub seen_flow: Mutex<Option<uuid::Uuid>>,
}

impl CheckHandler {
    pub fn ok() -> Self {
        Self {
            fail_with: None,
            seen_flow: Mutex::new(None),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            seen_flow: Mutex::new(None),
        }
    }
}

#[async_trait]
impl EventHandler<ResizeEvent, ResizePayload> for CheckHandler {
    fn selector(&self) -> ResizeEvent {
        ResizeEvent::Check
    }

    async fn accept(
        &self,
        event: HandlerEvent<'_, ResizeEvent, ResizePayload>,
    ) -> Result<ResizeFlowEvent, ActionError> {
        *self.seen_flow.lock().unwrap() = event.flow_id;
        match &self.fail_with {
            Some(message) => Err(ActionError::failed(message.clone())),
            None => Ok(event.event.follow_up(ResizeEvent::Resized)),
        }
    }

    fn default_failure_event(
        &self,
        _resource_id: ResourceId,
        error: &ActionError,
        event: &ResizeFlowEvent,
    ) -> ResizeFlowEvent {
        Event::failure(
            event,
            ResizeEvent::Failed,
            FailureType::CollectionFailure,
            error.to_string(),
        )
    }
}

/// Engine plus the fakes behind it.
pub struct TestContext {
    pub engine: Arc<FlowEngine<ResizeFlow>>,
    pub resizer: Arc<ScriptedResizer>,
    pub gate: Arc<AtomicBool>,
    pub registry: Arc<FlowRegistry>,
    pub sink: Arc<InMemoryEventSink>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_registry(Arc::new(FlowRegistry::new()))
    }

    /// Context whose engine shares `registry`, and with it the lanes.
    pub fn with_registry(registry: Arc<FlowRegistry>) -> Self {
        Self::with_options(registry, DEFAULT_TERMINAL_RETENTION)
    }

    pub fn with_retention(terminal_retention: usize) -> Self {
        Self::with_options(Arc::new(FlowRegistry::new()), terminal_retention)
    }

    fn with_options(registry: Arc<FlowRegistry>, terminal_retention: usize) -> Self {
        init_tracing();
        let resizer = Arc::new(ScriptedResizer::new());
        let gate = Arc::new(AtomicBool::new(false));
        let sink = Arc::new(InMemoryEventSink::new());
        let engine = FlowEngine::builder(ResizeFlow::new(resizer.clone(), gate.clone()))
            .registry(registry.clone())
            .sink(sink.clone())
            .terminal_retention(terminal_retention)
            .build();

        Self {
            engine: Arc::new(engine),
            resizer,
            gate,
            registry,
            sink,
        }
    }
}

/// Route engine logs to the test writer; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn payload(mode: Mode) -> ResizePayload {
    ResizePayload { target: 3, mode }
}

pub fn crn(resource_id: ResourceId) -> String {
    format!("crn:cdp:environments:us-west-1:acme:cluster:{}", resource_id)
}
