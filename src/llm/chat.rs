//! Chat-completions protocol (`OpenAI`-compatible `chat/completions`)

use super::types::{OutputItem, RoundResponse, ToolCall, ToolDefinition, Usage};
use super::{endpoint_url, post_json, LlmError, ModelClient};
use crate::config::{AgentConfig, ProtocolFlavor};
use crate::transcript::{RoundEntry, RoundRecord, Transcript};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// One chat message, in exactly the shape it is sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn plain(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: &str) -> Self {
        Self::plain("system", content)
    }

    pub fn user(content: &str) -> Self {
        Self::plain("user", content)
    }

    pub fn assistant(content: &str) -> Self {
        Self::plain("assistant", content)
    }

    pub fn tool_result(tool_call_id: &str, content: String) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub kind: String,
    pub function: ChatFunctionCall,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatFunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

impl From<&ToolCall> for ChatToolCall {
    fn from(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            kind: function_type(),
            function: ChatFunctionCall {
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            },
        }
    }
}

/// Append a round: one assistant message carrying every answered call,
/// followed by the tool results in call order, then any final text.
/// Reasoning is not part of the chat transcript.
pub(crate) fn commit_round(messages: &mut Vec<ChatMessage>, round: RoundRecord) {
    let mut calls = Vec::new();
    let mut results = Vec::new();
    let mut texts = Vec::new();

    for entry in round.into_entries() {
        match entry {
            RoundEntry::Reasoning(_) => {}
            RoundEntry::Message(text) => texts.push(text),
            RoundEntry::ToolExchange {
                call,
                output,
                is_error,
            } => {
                let content = if is_error {
                    format!("Error: {output}")
                } else {
                    output
                };
                results.push(ChatMessage::tool_result(&call.id, content));
                calls.push(ChatToolCall::from(&call));
            }
        }
    }

    if !calls.is_empty() {
        messages.push(ChatMessage {
            role: "assistant".to_string(),
            content: None,
            tool_calls: Some(calls),
            tool_call_id: None,
        });
        messages.extend(results);
    }
    for text in texts {
        messages.push(ChatMessage::assistant(&text));
    }
}

/// Chat-completions client
pub struct ChatClient {
    http: Client,
    url: String,
    api_key: Option<String>,
    model: String,
    system_prompt: String,
    max_tokens: Option<u32>,
}

impl ChatClient {
    pub fn new(http: Client, config: &AgentConfig) -> Self {
        Self {
            http,
            url: endpoint_url(&config.base_url, "chat/completions"),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            max_tokens: config.max_output_tokens,
        }
    }

    fn translate_request(&self, messages: &[ChatMessage], tools: &[ToolDefinition]) -> ChatRequest {
        let mut all = Vec::with_capacity(messages.len() + 1);
        if !self.system_prompt.is_empty() {
            all.push(ChatMessage::system(&self.system_prompt));
        }
        all.extend_from_slice(messages);

        let tools: Vec<ChatTool> = tools
            .iter()
            .map(|t| ChatTool {
                r#type: function_type(),
                function: ChatFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.input_schema.clone(),
                },
            })
            .collect();

        ChatRequest {
            model: self.model.clone(),
            messages: all,
            tool_choice: if tools.is_empty() { None } else { Some("auto") },
            tools: if tools.is_empty() { None } else { Some(tools) },
            max_tokens: self.max_tokens,
            stream: false,
        }
    }
}

/// Map `choices[0].message` onto ordered output items.
///
/// A message carries either tool calls or final text; if a server sends both,
/// the tool calls win and the text is dropped.
pub(crate) fn normalize_response(resp: ChatResponse) -> Result<RoundResponse, LlmError> {
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::malformed("No choices in response"))?;
    let message = choice.message;

    let mut items = Vec::new();

    if let Some(reasoning) = message.reasoning_content.or(message.reasoning) {
        if !reasoning.is_empty() {
            items.push(OutputItem::Reasoning { text: reasoning });
        }
    }

    let tool_calls: Vec<ChatToolCall> = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .filter(|tc| !tc.function.name.is_empty())
        .collect();

    if tool_calls.is_empty() {
        if let Some(text) = message.content.filter(|t| !t.is_empty()) {
            items.push(OutputItem::Message { text });
        }
    } else {
        if message.content.as_deref().is_some_and(|t| !t.trim().is_empty()) {
            tracing::debug!("Dropping assistant text that accompanied tool calls");
        }
        for tc in tool_calls {
            let id = if tc.id.is_empty() {
                format!("call_{}", uuid::Uuid::new_v4().simple())
            } else {
                tc.id
            };
            items.push(OutputItem::ToolCall(ToolCall::new(
                id,
                tc.function.name,
                tc.function.arguments,
            )));
        }
    }

    let usage = resp.usage.map(|u| Usage {
        input_tokens: u.prompt_tokens,
        output_tokens: u.completion_tokens,
        total_tokens: u.total_tokens,
        cache_read_tokens: u.prompt_tokens_details.map_or(0, |d| d.cached_tokens),
        cache_write_tokens: 0,
    });

    Ok(RoundResponse { items, usage })
}

#[async_trait]
impl ModelClient for ChatClient {
    async fn submit(
        &self,
        transcript: &Transcript,
        tools: &[ToolDefinition],
        cancel: &CancellationToken,
    ) -> Result<RoundResponse, LlmError> {
        let Transcript::Chat(messages) = transcript else {
            return Err(LlmError::invalid_request(
                "chat client was handed a responses transcript",
            ));
        };

        let request = self.translate_request(messages, tools);
        let body = post_json(&self.http, &self.url, self.api_key.as_deref(), &request, cancel).await?;

        let response: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::malformed(format!("Failed to parse response: {e} - body: {body}"))
        })?;

        normalize_response(response)
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn flavor(&self) -> ProtocolFlavor {
        ProtocolFlavor::Chat
    }
}

// Chat-completions wire types

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ChatTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatTool {
    r#type: String,
    function: ChatFunction,
}

#[derive(Debug, Serialize)]
struct ChatFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ChatToolCall>>,
    /// vLLM reasoning parsers
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(clippy::struct_field_names)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
    #[serde(default)]
    prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct PromptTokensDetails {
    #[serde(default)]
    cached_tokens: u64,
}
