//! Conversation engine
//!
//! Drives one user turn through as many model rounds as it takes to reach a
//! final answer. Each round's output is staged in a `RoundRecord` and
//! committed to the transcript when the round ends, or when it is cut short
//! by an interruption, so the transcript never holds a tool call without its
//! result.

mod state;

#[cfg(test)]
mod proptests;
#[cfg(test)]
pub(crate) mod testing;

pub use state::{TurnOutcome, TurnState};

use crate::config::AgentConfig;
use crate::event::{Event, EventSink, SinkSet};
use crate::llm::{self, LlmError, ModelClient, OutputItem, ToolCall};
use crate::tools::{ToolContext, ToolError, ToolExecutor, ToolRegistry};
use crate::transcript::{reconstruct_transcript, RoundRecord, Transcript};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

/// Fires the cancellation token of whichever turn is currently running.
///
/// Cloneable and usable from another task (a Ctrl-C handler) while the
/// agent itself is mutably borrowed by `ask`.
#[derive(Clone, Default)]
pub struct InterruptHandle {
    current: Arc<Mutex<Option<CancellationToken>>>,
}

impl InterruptHandle {
    /// Returns false when no turn was running
    pub fn interrupt(&self) -> bool {
        let guard = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn arm(&self, token: CancellationToken) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    fn disarm(&self) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

pub struct Agent {
    config: AgentConfig,
    client: Arc<dyn ModelClient>,
    tools: Arc<dyn ToolExecutor>,
    working_dir: PathBuf,
    transcript: Transcript,
    sinks: SinkSet,
    state: TurnState,
    interrupt: InterruptHandle,
}

impl Agent {
    pub fn new(
        config: AgentConfig,
        client: Arc<dyn ModelClient>,
        tools: Arc<dyn ToolExecutor>,
        working_dir: PathBuf,
    ) -> Self {
        let transcript = Transcript::new(client.flavor());
        Self {
            config,
            client,
            tools,
            working_dir,
            transcript,
            sinks: SinkSet::new(),
            state: TurnState::Idle,
            interrupt: InterruptHandle::default(),
        }
    }

    /// Agent with the HTTP client for `config.protocol` and the standard tools
    pub fn from_config(config: AgentConfig, working_dir: PathBuf) -> Result<Self, LlmError> {
        let client = llm::connect(&config)?;
        Ok(Self::new(
            config,
            client,
            Arc::new(ToolRegistry::standard()),
            working_dir,
        ))
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn add_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    /// Rebuild the transcript from a previously persisted event log
    pub fn restore(&mut self, events: &[Event]) {
        self.transcript = reconstruct_transcript(events, self.client.flavor());
        tracing::info!(
            events = events.len(),
            entries = self.transcript.len(),
            "Transcript restored"
        );
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Run one turn with a fresh cancellation token
    pub async fn ask(&mut self, text: &str) -> TurnOutcome {
        self.ask_with(text, CancellationToken::new()).await
    }

    /// Run one turn under `cancel`. The interrupt handle fires the same token.
    pub async fn ask_with(&mut self, text: &str, cancel: CancellationToken) -> TurnOutcome {
        self.interrupt.arm(cancel.clone());
        let outcome = self.run_turn(text, &cancel).await;
        self.interrupt.disarm();
        outcome
    }

    async fn run_turn(&mut self, text: &str, cancel: &CancellationToken) -> TurnOutcome {
        self.emit(Event::UserMessage {
            text: text.to_string(),
        })
        .await;
        self.transcript.push_user(text);
        self.emit(Event::AssistantStart).await;

        let definitions = self.tools.definitions();
        let max_rounds = self.config.max_rounds;

        for round in 1..=max_rounds {
            if cancel.is_cancelled() {
                return self.interrupted().await;
            }
            self.set_state(TurnState::AwaitingModel { round });

            let response = match self
                .client
                .submit(&self.transcript, &definitions, cancel)
                .await
            {
                Ok(response) => response,
                Err(e) if e.is_cancelled() || cancel.is_cancelled() => {
                    return self.interrupted().await;
                }
                Err(e) => return self.fail(e.message).await,
            };

            // Exactly one per round, zeroed when the server reports none;
            // replay splits rounds on it
            let usage = response.usage.unwrap_or_default();
            self.emit(Event::token_usage(&usage)).await;

            let mut record = RoundRecord::default();
            let mut final_text: Option<String> = None;
            let mut called_tools = false;

            for item in response.items {
                if cancel.is_cancelled() {
                    self.transcript.commit(record);
                    return self.interrupted().await;
                }

                match item {
                    OutputItem::Reasoning { text } => {
                        self.emit(Event::Thinking { text: text.clone() }).await;
                        record.reasoning(text);
                    }
                    OutputItem::Message { text } => {
                        self.emit(Event::AssistantMessage { text: text.clone() })
                            .await;
                        record.message(text.clone());
                        final_text = Some(match final_text {
                            Some(previous) => format!("{previous}\n{text}"),
                            None => text,
                        });
                    }
                    OutputItem::ToolCall(call) => {
                        if !called_tools {
                            self.set_state(TurnState::ExecutingTools { round });
                            called_tools = true;
                        }
                        match self.run_tool(&call, cancel).await {
                            Ok((output, is_error)) => record.exchange(call, output, is_error),
                            Err(Interrupted) => {
                                self.transcript.commit(record);
                                return self.interrupted().await;
                            }
                        }
                    }
                }
            }

            self.transcript.commit(record);

            if let Some(text) = final_text {
                self.set_state(TurnState::Done);
                return TurnOutcome::Completed(text);
            }
            if !called_tools {
                return self
                    .fail("Model returned an empty response".to_string())
                    .await;
            }
            tracing::debug!(round, "Round finished, continuing with tool results");
        }

        self.fail(format!(
            "Stopped after {max_rounds} rounds without a final answer"
        ))
        .await
    }

    /// Execute one call, emitting `tool_call` then `tool_result`.
    ///
    /// Returns the output and whether it is an error. Nothing is emitted for
    /// the result of a call that was interrupted.
    async fn run_tool(
        &self,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> Result<(String, bool), Interrupted> {
        self.emit(Event::ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            args: call.arguments.clone(),
        })
        .await;

        let ctx = ToolContext::new(cancel.clone(), self.working_dir.clone());
        let (output, is_error) = match self.tools.execute(&call.name, &call.arguments, &ctx).await
        {
            Ok(output) => (output, false),
            Err(ToolError::Interrupted) => return Err(Interrupted),
            Err(e) => {
                tracing::info!(tool = %call.name, tool_call_id = %call.id, error = %e, "Tool failed");
                (e.to_string(), true)
            }
        };

        self.emit(Event::ToolResult {
            id: call.id.clone(),
            result: output.clone(),
            is_error,
        })
        .await;
        Ok((output, is_error))
    }

    async fn interrupted(&mut self) -> TurnOutcome {
        tracing::info!(state = %self.state, "Turn interrupted");
        self.set_state(TurnState::Interrupted);
        self.emit(Event::Interrupted).await;
        TurnOutcome::Interrupted
    }

    async fn fail(&mut self, message: String) -> TurnOutcome {
        tracing::warn!(state = %self.state, error = %message, "Turn failed");
        self.set_state(TurnState::Failed);
        self.emit(Event::Error {
            message: message.clone(),
        })
        .await;
        TurnOutcome::Failed(message)
    }

    fn set_state(&mut self, next: TurnState) {
        if !self.state.can_transition_to(next) {
            tracing::warn!(from = %self.state, to = %next, "Unexpected turn state transition");
        }
        self.state = next;
    }

    async fn emit(&self, event: Event) {
        self.sinks.emit(&event).await;
    }
}

/// Marker for a tool call cut short by the turn's cancellation token
#[derive(Debug)]
struct Interrupted;
