//! Mock implementations for testing
//!
//! These mocks drive the engine without a model server or real tools.

use crate::config::ProtocolFlavor;
use crate::event::{Event, EventSink, SinkError};
use crate::llm::{LlmError, ModelClient, RoundResponse, ToolDefinition};
use crate::tools::{ToolContext, ToolError, ToolExecutor};
use crate::transcript::Transcript;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Mock Model Client
// ============================================================================

/// Returns queued responses in order and records every transcript it was sent
pub struct MockModelClient {
    flavor: ProtocolFlavor,
    responses: Mutex<VecDeque<Result<RoundResponse, LlmError>>>,
    requests: Mutex<Vec<Transcript>>,
    delay: Option<Duration>,
    /// Notified when a request starts
    pub request_started: Arc<Notify>,
}

impl MockModelClient {
    pub fn new(flavor: ProtocolFlavor) -> Self {
        Self {
            flavor,
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            delay: None,
            request_started: Arc::new(Notify::new()),
        }
    }

    /// Hold every request for `delay` (or until cancelled)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn queue_response(&self, response: RoundResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<Transcript> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn submit(
        &self,
        transcript: &Transcript,
        _tools: &[ToolDefinition],
        cancel: &CancellationToken,
    ) -> Result<RoundResponse, LlmError> {
        self.requests.lock().unwrap().push(transcript.clone());
        self.request_started.notify_one();

        if let Some(delay) = self.delay {
            tokio::select! {
                () = cancel.cancelled() => return Err(LlmError::cancelled()),
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }

    fn flavor(&self) -> ProtocolFlavor {
        self.flavor
    }
}

// ============================================================================
// Mock Tool Executor
// ============================================================================

enum MockTool {
    Output(Result<String, ToolError>),
    /// Blocks until cancelled or `Duration` elapses
    Delayed(Duration),
}

/// Tool executor with predefined outputs. Unregistered names fail with
/// `ToolError::UnknownTool`, like the real registry.
#[derive(Default)]
pub struct MockToolExecutor {
    tools: HashMap<String, MockTool>,
    definitions: Vec<ToolDefinition>,
    executions: Mutex<Vec<(String, String)>>,
    /// Notified when a delayed tool starts
    pub execution_started: Arc<Notify>,
}

impl MockToolExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(self, name: impl Into<String>, output: Result<String, ToolError>) -> Self {
        self.register(name.into(), MockTool::Output(output))
    }

    pub fn with_delayed_tool(self, name: impl Into<String>, delay: Duration) -> Self {
        self.register(name.into(), MockTool::Delayed(delay))
    }

    fn register(mut self, name: String, tool: MockTool) -> Self {
        self.definitions.push(ToolDefinition {
            name: name.clone(),
            description: format!("Mock {name}"),
            input_schema: serde_json::json!({ "type": "object", "properties": {} }),
        });
        self.tools.insert(name, tool);
        self
    }

    /// (name, raw arguments) of every call, in order
    pub fn recorded_executions(&self) -> Vec<(String, String)> {
        self.executions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolExecutor for MockToolExecutor {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.definitions.clone()
    }

    async fn execute(
        &self,
        name: &str,
        arguments: &str,
        ctx: &ToolContext,
    ) -> Result<String, ToolError> {
        self.executions
            .lock()
            .unwrap()
            .push((name.to_string(), arguments.to_string()));

        match self.tools.get(name) {
            None => Err(ToolError::UnknownTool(name.to_string())),
            Some(MockTool::Output(output)) => output.clone(),
            Some(MockTool::Delayed(delay)) => {
                self.execution_started.notify_one();
                tokio::select! {
                    () = ctx.cancel.cancelled() => Err(ToolError::Interrupted),
                    () = tokio::time::sleep(*delay) => Ok(format!("{name} finished")),
                }
            }
        }
    }
}

// ============================================================================
// Recording sink
// ============================================================================

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn on(&self, event: &Event) -> Result<(), SinkError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}
