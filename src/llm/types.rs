//! Common types for model round-trips

use serde::{Deserialize, Serialize};

/// Tool definition advertised to the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// A function invocation requested by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded arguments, exactly as the model sent them
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// One typed item of a round's output, in the order the model produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputItem {
    Reasoning { text: String },
    Message { text: String },
    ToolCall(ToolCall),
}

/// Result of submitting the transcript for one round
#[derive(Debug, Clone, Default)]
pub struct RoundResponse {
    pub items: Vec<OutputItem>,
    pub usage: Option<Usage>,
}

impl RoundResponse {
    pub fn new(items: Vec<OutputItem>) -> Self {
        Self { items, usage: None }
    }

    #[must_use]
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Extract all tool calls from the response
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.items
            .iter()
            .filter_map(|item| match item {
                OutputItem::ToolCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    /// Get final text content from the response
    pub fn text(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .items
            .iter()
            .filter_map(|item| match item {
                OutputItem::Message { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(""))
        }
    }
}

/// Usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
}

impl Usage {
    pub fn is_zero(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0
    }
}
