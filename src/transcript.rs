//! Protocol-native conversation history
//!
//! The agent owns exactly one `Transcript`. Entries only ever get appended,
//! either as a user message or as a committed `RoundRecord`. Replaying a
//! persisted event log builds the same `RoundRecord`s and commits them the
//! same way, so a resumed transcript serializes identically to a live one.

use crate::config::ProtocolFlavor;
use crate::event::Event;
use crate::llm::{ChatMessage, ToolCall};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Transcript {
    Chat(Vec<ChatMessage>),
    /// Responses input items, already in their outbound wire form
    Responses(Vec<Value>),
}

impl Transcript {
    pub fn new(flavor: ProtocolFlavor) -> Self {
        match flavor {
            ProtocolFlavor::Chat => Transcript::Chat(Vec::new()),
            ProtocolFlavor::Responses => Transcript::Responses(Vec::new()),
        }
    }

    pub fn flavor(&self) -> ProtocolFlavor {
        match self {
            Transcript::Chat(_) => ProtocolFlavor::Chat,
            Transcript::Responses(_) => ProtocolFlavor::Responses,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Transcript::Chat(messages) => messages.len(),
            Transcript::Responses(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push_user(&mut self, text: &str) {
        match self {
            Transcript::Chat(messages) => messages.push(ChatMessage::user(text)),
            Transcript::Responses(items) => crate::llm::responses::push_user(items, text),
        }
    }

    /// Append everything a finished (or interrupted) round produced.
    ///
    /// Only answered tool calls ever reach a `RoundRecord`, so the transcript
    /// never carries a call without its result.
    pub fn commit(&mut self, round: RoundRecord) {
        if round.is_empty() {
            return;
        }
        match self {
            Transcript::Chat(messages) => crate::llm::chat::commit_round(messages, round),
            Transcript::Responses(items) => crate::llm::responses::commit_round(items, round),
        }
    }

    /// The array that goes on the wire as `messages` / `input`
    pub fn to_wire(&self) -> Value {
        match self {
            Transcript::Chat(messages) => {
                serde_json::to_value(messages).unwrap_or(Value::Array(Vec::new()))
            }
            Transcript::Responses(items) => Value::Array(items.clone()),
        }
    }
}

/// One round's output, staged until the round ends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundRecord {
    entries: Vec<RoundEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundEntry {
    Reasoning(String),
    Message(String),
    ToolExchange {
        call: ToolCall,
        output: String,
        is_error: bool,
    },
}

impl RoundRecord {
    pub fn reasoning(&mut self, text: impl Into<String>) {
        self.entries.push(RoundEntry::Reasoning(text.into()));
    }

    pub fn message(&mut self, text: impl Into<String>) {
        self.entries.push(RoundEntry::Message(text.into()));
    }

    pub fn exchange(&mut self, call: ToolCall, output: impl Into<String>, is_error: bool) {
        self.entries.push(RoundEntry::ToolExchange {
            call,
            output: output.into(),
            is_error,
        });
    }

    pub fn entries(&self) -> &[RoundEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<RoundEntry> {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Rebuild a transcript from a persisted event sequence.
///
/// The engine emits exactly one `token_usage` per model round, zeroed when
/// the server reported none, so it always marks a round boundary. Rounds
/// also close on `assistant_message`, `error`, `interrupted` and
/// `user_message`, and `thinking` starts a new reasoning block. Tool calls
/// are buffered until their result arrives; calls still unanswered when a
/// round closes were cut off by an interruption and are dropped.
pub fn reconstruct_transcript(events: &[Event], flavor: ProtocolFlavor) -> Transcript {
    let mut replay = Replay {
        transcript: Transcript::new(flavor),
        round: RoundRecord::default(),
        pending: Vec::new(),
    };

    for event in events {
        match event {
            Event::UserMessage { text } => {
                replay.flush();
                replay.transcript.push_user(text);
            }
            Event::AssistantStart
            | Event::TokenUsage { .. }
            | Event::Error { .. }
            | Event::Interrupted => replay.flush(),
            Event::Thinking { text } => {
                replay.flush();
                replay.round.reasoning(text.clone());
            }
            Event::ToolCall { id, name, args } => {
                replay.pending.push(ToolCall::new(id.clone(), name.clone(), args.clone()));
            }
            Event::ToolResult {
                id,
                result,
                is_error,
            } => {
                if let Some(pos) = replay.pending.iter().position(|c| &c.id == id) {
                    let call = replay.pending.remove(pos);
                    replay.round.exchange(call, result.clone(), *is_error);
                } else {
                    tracing::warn!(tool_call_id = %id, "Tool result without a matching call, skipping");
                }
            }
            Event::AssistantMessage { text } => {
                replay.round.message(text.clone());
                replay.flush();
            }
        }
    }
    replay.flush();
    replay.transcript
}

struct Replay {
    transcript: Transcript,
    round: RoundRecord,
    pending: Vec<ToolCall>,
}

impl Replay {
    fn flush(&mut self) {
        if !self.pending.is_empty() {
            tracing::debug!(count = self.pending.len(), "Dropping unanswered tool calls");
            self.pending.clear();
        }
        let round = std::mem::take(&mut self.round);
        self.transcript.commit(round);
    }
}
