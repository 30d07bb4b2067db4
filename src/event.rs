//! Conversation events and the sink contract
//!
//! Events are the canonical, protocol-agnostic record of a conversation.
//! Transcripts are derived from them; see `transcript::reconstruct_transcript`.

use crate::llm::Usage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Every observable occurrence in a turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    AssistantStart,
    Thinking {
        text: String,
    },
    ToolCall {
        id: String,
        name: String,
        args: String,
    },
    ToolResult {
        id: String,
        result: String,
        #[serde(rename = "isError")]
        is_error: bool,
    },
    AssistantMessage {
        text: String,
    },
    UserMessage {
        text: String,
    },
    Error {
        message: String,
    },
    Interrupted,
    TokenUsage {
        input: u64,
        output: u64,
        total: u64,
        #[serde(rename = "cacheRead")]
        cache_read: u64,
        #[serde(rename = "cacheWrite")]
        cache_write: u64,
    },
}

impl Event {
    pub fn token_usage(usage: &Usage) -> Self {
        let total = if usage.total_tokens == 0 {
            usage.input_tokens + usage.output_tokens
        } else {
            usage.total_tokens
        };
        Event::TokenUsage {
            input: usage.input_tokens,
            output: usage.output_tokens,
            total,
            cache_read: usage.cache_read_tokens,
            cache_write: usage.cache_write_tokens,
        }
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Event::AssistantStart => "assistant_start",
            Event::Thinking { .. } => "thinking",
            Event::ToolCall { .. } => "tool_call",
            Event::ToolResult { .. } => "tool_result",
            Event::AssistantMessage { .. } => "assistant_message",
            Event::UserMessage { .. } => "user_message",
            Event::Error { .. } => "error",
            Event::Interrupted => "interrupted",
            Event::TokenUsage { .. } => "token_usage",
        }
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}

/// Receiver of the event stream (display, structured output, persistence)
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn on(&self, event: &Event) -> Result<(), SinkError>;
}

/// Ordered broadcast to every registered sink.
///
/// A failing sink is logged and skipped; it never stops delivery to the
/// sinks after it.
#[derive(Clone, Default)]
pub struct SinkSet {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub async fn emit(&self, event: &Event) {
        for (index, sink) in self.sinks.iter().enumerate() {
            if let Err(e) = sink.on(event).await {
                tracing::warn!(sink = index, event = event.kind(), error = %e, "Event sink failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct FailingSink;

    #[async_trait]
    impl EventSink for FailingSink {
        async fn on(&self, _event: &Event) -> Result<(), SinkError> {
            Err(SinkError::Other("disk full".to_string()))
        }
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<Event>>);

    #[async_trait]
    impl EventSink for Collect {
        async fn on(&self, event: &Event) -> Result<(), SinkError> {
            self.0.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    #[test]
    fn test_wire_shape() {
        let event = Event::ToolResult {
            id: "c1".to_string(),
            result: "ok".to_string(),
            is_error: false,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "tool_result", "id": "c1", "result": "ok", "isError": false})
        );
        assert_eq!(
            serde_json::to_value(Event::Interrupted).unwrap(),
            json!({"type": "interrupted"})
        );

        let usage = Event::token_usage(&Usage {
            input_tokens: 10,
            output_tokens: 5,
            total_tokens: 0,
            cache_read_tokens: 3,
            cache_write_tokens: 0,
        });
        assert_eq!(
            serde_json::to_value(&usage).unwrap(),
            json!({"type": "token_usage", "input": 10, "output": 5, "total": 15, "cacheRead": 3, "cacheWrite": 0})
        );
    }

    #[test]
    fn test_every_variant_round_trips() {
        let events = vec![
            Event::AssistantStart,
            Event::Thinking { text: "t".into() },
            Event::ToolCall { id: "1".into(), name: "bash".into(), args: "{}".into() },
            Event::AssistantMessage { text: "a".into() },
            Event::UserMessage { text: "u".into() },
            Event::Error { message: "e".into() },
            Event::Interrupted,
        ];
        for event in events {
            let json = serde_json::to_string(&event).unwrap();
            let back: Event = serde_json::from_str(&json).unwrap();
            assert_eq!(back, event);
        }
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_block_later_sinks() {
        let collect = Arc::new(Collect::default());
        let mut sinks = SinkSet::new();
        sinks.push(Arc::new(FailingSink));
        sinks.push(collect.clone());

        sinks.emit(&Event::AssistantStart).await;
        sinks.emit(&Event::Interrupted).await;

        assert_eq!(
            *collect.0.lock().unwrap(),
            vec![Event::AssistantStart, Event::Interrupted]
        );
    }
}
