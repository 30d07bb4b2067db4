//! Structured-output protocol (`responses`)
//!
//! A round returns typed output items (reasoning, message, function call).
//! Message items are re-appended without their `type` field; servers reject
//! the next submission otherwise.

use super::types::{OutputItem, RoundResponse, ToolCall, ToolDefinition, Usage};
use super::{endpoint_url, post_json, LlmError, ModelClient};
use crate::config::{AgentConfig, ProtocolFlavor};
use crate::transcript::{RoundEntry, RoundRecord, Transcript};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Input item for the responses conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsesItem {
    Message {
        role: String,
        content: Vec<ContentPart>,
    },
    Reasoning {
        summary: Vec<ContentPart>,
        content: Vec<ContentPart>,
    },
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    FunctionCallOutput {
        call_id: String,
        output: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    InputText { text: String },
    OutputText { text: String },
    ReasoningText { text: String },
}

impl ResponsesItem {
    /// Wire form of this item as it goes back into `input[]`
    pub fn into_input(self) -> Value {
        let is_message = matches!(self, ResponsesItem::Message { .. });
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if is_message {
            strip_discriminator(&mut value);
        }
        value
    }
}

/// Remove the `type` discriminator from an item object
pub fn strip_discriminator(item: &mut Value) {
    if let Some(obj) = item.as_object_mut() {
        obj.remove("type");
    }
}

pub(crate) fn push_user(items: &mut Vec<Value>, text: &str) {
    items.push(
        ResponsesItem::Message {
            role: "user".to_string(),
            content: vec![ContentPart::InputText {
                text: text.to_string(),
            }],
        }
        .into_input(),
    );
}

/// Append a round item by item, in the order the model produced them
pub(crate) fn commit_round(items: &mut Vec<Value>, round: RoundRecord) {
    for entry in round.into_entries() {
        match entry {
            RoundEntry::Reasoning(text) => items.push(
                ResponsesItem::Reasoning {
                    summary: Vec::new(),
                    content: vec![ContentPart::ReasoningText { text }],
                }
                .into_input(),
            ),
            RoundEntry::Message(text) => items.push(
                ResponsesItem::Message {
                    role: "assistant".to_string(),
                    content: vec![ContentPart::OutputText { text }],
                }
                .into_input(),
            ),
            RoundEntry::ToolExchange {
                call,
                output,
                is_error,
            } => {
                let output = if is_error {
                    format!("Error: {output}")
                } else {
                    output
                };
                items.push(
                    ResponsesItem::FunctionCall {
                        call_id: call.id.clone(),
                        name: call.name,
                        arguments: call.arguments,
                    }
                    .into_input(),
                );
                items.push(
                    ResponsesItem::FunctionCallOutput {
                        call_id: call.id,
                        output,
                    }
                    .into_input(),
                );
            }
        }
    }
}

/// Responses client
pub struct ResponsesClient {
    http: Client,
    url: String,
    api_key: Option<String>,
    model: String,
    system_prompt: String,
    max_output_tokens: Option<u32>,
}

impl ResponsesClient {
    pub fn new(http: Client, config: &AgentConfig) -> Self {
        Self {
            http,
            url: endpoint_url(&config.base_url, "responses"),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            max_output_tokens: config.max_output_tokens,
        }
    }

    fn translate_request<'a>(
        &'a self,
        input: &'a [Value],
        tools: &[ToolDefinition],
    ) -> ResponsesRequest<'a> {
        let tools: Vec<ResponsesTool> = tools
            .iter()
            .map(|t| ResponsesTool {
                r#type: "function",
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.input_schema.clone(),
            })
            .collect();

        ResponsesRequest {
            model: &self.model,
            input,
            instructions: if self.system_prompt.is_empty() {
                None
            } else {
                Some(self.system_prompt.as_str())
            },
            tools: if tools.is_empty() { None } else { Some(tools) },
            max_output_tokens: self.max_output_tokens,
        }
    }
}

/// Map `output[]` onto ordered output items
pub(crate) fn normalize_response(resp: ResponsesResponse) -> Result<RoundResponse, LlmError> {
    if resp.status.as_deref() == Some("failed") {
        let message = resp
            .error
            .map_or_else(|| "response failed".to_string(), |e| e.message);
        return Err(LlmError::server_error(message));
    }

    let mut items = Vec::new();
    for output in resp.output {
        match output.kind.as_str() {
            "reasoning" => {
                let mut parts = collect_text(output.content.as_deref(), "reasoning_text");
                if parts.is_empty() {
                    parts = collect_text(output.summary.as_deref(), "summary_text");
                }
                if !parts.is_empty() {
                    items.push(OutputItem::Reasoning {
                        text: parts.join("\n"),
                    });
                }
            }
            "message" => {
                let text = collect_text(output.content.as_deref(), "output_text").join("");
                if !text.is_empty() {
                    items.push(OutputItem::Message { text });
                }
            }
            "function_call" => {
                let (Some(name), Some(call_id)) = (output.name, output.call_id.or(output.id)) else {
                    return Err(LlmError::malformed(
                        "function_call output item without name or call_id",
                    ));
                };
                items.push(OutputItem::ToolCall(ToolCall::new(
                    call_id,
                    name,
                    output.arguments.unwrap_or_default(),
                )));
            }
            other => {
                tracing::debug!(output_type = %other, "Ignoring unknown output type");
            }
        }
    }

    let usage = resp.usage.map(|u| Usage {
        input_tokens: u.input_tokens,
        output_tokens: u.output_tokens,
        total_tokens: u.total_tokens,
        cache_read_tokens: u.input_tokens_details.map_or(0, |d| d.cached_tokens),
        cache_write_tokens: 0,
    });

    Ok(RoundResponse { items, usage })
}

fn collect_text(parts: Option<&[OutputContent]>, kind: &str) -> Vec<String> {
    parts
        .unwrap_or_default()
        .iter()
        .filter(|p| p.kind == kind)
        .filter_map(|p| p.text.clone())
        .filter(|t| !t.is_empty())
        .collect()
}

#[async_trait]
impl ModelClient for ResponsesClient {
    async fn submit(
        &self,
        transcript: &Transcript,
        tools: &[ToolDefinition],
        cancel: &CancellationToken,
    ) -> Result<RoundResponse, LlmError> {
        let Transcript::Responses(input) = transcript else {
            return Err(LlmError::invalid_request(
                "responses client was handed a chat transcript",
            ));
        };

        let request = self.translate_request(input, tools);
        let body = post_json(&self.http, &self.url, self.api_key.as_deref(), &request, cancel).await?;

        let response: ResponsesResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::malformed(format!("Failed to parse response: {e} - body: {body}"))
        })?;

        normalize_response(response)
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn flavor(&self) -> ProtocolFlavor {
        ProtocolFlavor::Responses
    }
}

// Responses wire types

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: &'a [Value],
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ResponsesTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ResponsesTool {
    r#type: &'static str,
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponsesResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<ResponsesError>,
    output: Vec<ResponsesOutput>,
    #[serde(default)]
    usage: Option<ResponsesUsage>,
}

#[derive(Debug, Deserialize)]
struct ResponsesError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResponsesOutput {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    id: Option<String>,
    /// For message and reasoning outputs
    #[serde(default)]
    content: Option<Vec<OutputContent>>,
    #[serde(default)]
    summary: Option<Vec<OutputContent>>,
    /// For `function_call` outputs
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
    #[serde(default)]
    call_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OutputContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponsesUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
    #[serde(default)]
    input_tokens_details: Option<InputTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct InputTokensDetails {
    #[serde(default)]
    cached_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(body: Value) -> Result<RoundResponse, LlmError> {
        normalize_response(serde_json::from_value(body).unwrap())
    }

    #[test]
    fn test_output_items_keep_order() {
        let response = parse(json!({
            "status": "completed",
            "output": [
                {"type": "reasoning", "id": "rs_1", "summary": [], "content": [{"type": "reasoning_text", "text": "look first"}]},
                {"type": "function_call", "id": "fc_1", "call_id": "call_1", "name": "list", "arguments": "{\"path\":\".\"}"}
            ],
            "usage": {"input_tokens": 20, "output_tokens": 7, "total_tokens": 27, "input_tokens_details": {"cached_tokens": 5}}
        }))
        .unwrap();

        assert_eq!(
            response.items,
            vec![
                OutputItem::Reasoning { text: "look first".to_string() },
                OutputItem::ToolCall(ToolCall::new("call_1", "list", "{\"path\":\".\"}")),
            ]
        );
        let usage = response.usage.unwrap();
        assert_eq!(usage.cache_read_tokens, 5);
        assert_eq!(usage.total_tokens, 27);
    }

    #[test]
    fn test_reasoning_summary_fallback_and_message_text() {
        let response = parse(json!({
            "output": [
                {"type": "reasoning", "summary": [{"type": "summary_text", "text": "summary"}]},
                {"type": "message", "role": "assistant", "content": [{"type": "output_text", "text": "hello", "annotations": []}]}
            ]
        }))
        .unwrap();
        assert_eq!(
            response.items,
            vec![
                OutputItem::Reasoning { text: "summary".to_string() },
                OutputItem::Message { text: "hello".to_string() },
            ]
        );
    }

    #[test]
    fn test_function_call_without_name_is_malformed() {
        let err = parse(json!({"output": [{"type": "function_call", "call_id": "x"}]})).unwrap_err();
        assert_eq!(err.kind, crate::llm::LlmErrorKind::MalformedResponse);
    }

    #[test]
    fn test_failed_status_is_error() {
        let err = parse(json!({"status": "failed", "error": {"message": "boom"}, "output": []})).unwrap_err();
        assert_eq!(err.message, "boom");
    }

    #[test]
    fn test_message_items_lose_discriminator() {
        let mut items = Vec::new();
        push_user(&mut items, "hi");
        let mut round = RoundRecord::default();
        round.reasoning("r");
        round.exchange(ToolCall::new("c1", "read", "{}"), "body", false);
        round.message("answer");
        commit_round(&mut items, round);

        assert_eq!(items[0], json!({"role": "user", "content": [{"type": "input_text", "text": "hi"}]}));
        assert_eq!(items[1]["type"], "reasoning");
        assert_eq!(
            items[2],
            json!({"type": "function_call", "call_id": "c1", "name": "read", "arguments": "{}"})
        );
        assert_eq!(
            items[3],
            json!({"type": "function_call_output", "call_id": "c1", "output": "body"})
        );
        assert_eq!(
            items[4],
            json!({"role": "assistant", "content": [{"type": "output_text", "text": "answer"}]})
        );
    }

    #[test]
    fn test_request_shape() {
        let mut config = AgentConfig::new("http://pod/v1", "gpt-oss-20b", ProtocolFlavor::Responses);
        config.system_prompt = "sys".to_string();
        let client = ResponsesClient::new(Client::new(), &config);
        let input = vec![json!({"role": "user", "content": "x"})];
        let tools = vec![ToolDefinition {
            name: "bash".to_string(),
            description: "Run".to_string(),
            input_schema: json!({"type": "object"}),
        }];
        let value = serde_json::to_value(client.translate_request(&input, &tools)).unwrap();

        assert_eq!(value["instructions"], "sys");
        assert_eq!(value["input"][0]["role"], "user");
        assert_eq!(value["tools"][0], json!({"type": "function", "name": "bash", "description": "Run", "parameters": {"type": "object"}}));
        assert!(value.get("max_output_tokens").is_none());
    }
}
