//! Model endpoint abstraction
//!
//! One `ModelClient` per protocol flavor. The agent picks one when it is
//! constructed and never branches on the flavor again.

pub(crate) mod chat;
mod error;
pub(crate) mod responses;
mod types;

pub use chat::{ChatClient, ChatMessage, ChatToolCall};
pub use error::{LlmError, LlmErrorKind};
pub use responses::{strip_discriminator, ResponsesClient, ResponsesItem};
pub use types::*;

use crate::config::{AgentConfig, ProtocolFlavor};
use crate::transcript::Transcript;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Common interface for model endpoints
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Submit the transcript for one round.
    ///
    /// Must return `LlmErrorKind::Cancelled` promptly once `cancel` fires.
    async fn submit(
        &self,
        transcript: &Transcript,
        tools: &[ToolDefinition],
        cancel: &CancellationToken,
    ) -> Result<RoundResponse, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;

    fn flavor(&self) -> ProtocolFlavor;
}

#[async_trait]
impl<T: ModelClient + ?Sized> ModelClient for Arc<T> {
    async fn submit(
        &self,
        transcript: &Transcript,
        tools: &[ToolDefinition],
        cancel: &CancellationToken,
    ) -> Result<RoundResponse, LlmError> {
        (**self).submit(transcript, tools, cancel).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    fn flavor(&self) -> ProtocolFlavor {
        (**self).flavor()
    }
}

/// Build the client for the configured protocol flavor, wrapped in logging
pub fn connect(config: &AgentConfig) -> Result<Arc<dyn ModelClient>, LlmError> {
    let http = Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

    let inner: Arc<dyn ModelClient> = match config.protocol {
        ProtocolFlavor::Chat => Arc::new(ChatClient::new(http, config)),
        ProtocolFlavor::Responses => Arc::new(ResponsesClient::new(http, config)),
    };
    Ok(Arc::new(LoggingClient::new(inner)))
}

/// Send a JSON body and return the raw response text, racing the cancel token.
pub(crate) async fn post_json<B: serde::Serialize + Sync>(
    http: &Client,
    url: &str,
    api_key: Option<&str>,
    body: &B,
    cancel: &CancellationToken,
) -> Result<String, LlmError> {
    let mut request = http
        .post(url)
        .header("Content-Type", "application/json")
        .json(body);
    if let Some(key) = api_key {
        request = request.header("Authorization", format!("Bearer {key}"));
    }

    let exchange = async {
        let response = request
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(&e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;
        Ok::<_, LlmError>((status, body))
    };

    let (status, body) = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(LlmError::cancelled()),
        result = exchange => result?,
    };

    if !status.is_success() {
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map_or_else(|_| body.clone(), |e| e.error.message);
        return Err(LlmError::from_status(status.as_u16(), &message));
    }

    Ok(body)
}

#[derive(Debug, serde::Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, serde::Deserialize)]
struct ErrorBody {
    message: String,
}

/// Logging wrapper for model clients
pub struct LoggingClient {
    inner: Arc<dyn ModelClient>,
    model_id: String,
}

impl LoggingClient {
    pub fn new(inner: Arc<dyn ModelClient>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl ModelClient for LoggingClient {
    async fn submit(
        &self,
        transcript: &Transcript,
        tools: &[ToolDefinition],
        cancel: &CancellationToken,
    ) -> Result<RoundResponse, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.submit(transcript, tools, cancel).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                let usage = response.usage.unwrap_or_default();
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    items = response.items.len(),
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    "Model request completed"
                );
            }
            Err(e) if e.is_cancelled() => {
                tracing::info!(model = %self.model_id, duration_ms = %duration.as_millis(), "Model request cancelled");
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "Model request failed"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn flavor(&self) -> ProtocolFlavor {
        self.inner.flavor()
    }
}

/// Join a base URL and an endpoint path without doubling slashes
pub(crate) fn endpoint_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}
