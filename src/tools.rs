//! Local tools the model can call
//!
//! Tools are stateless singletons. Everything a call needs (working
//! directory, cancellation) arrives through `ToolContext`.

mod bash;
mod glob;
mod list;
mod read;
mod search;

pub use bash::BashTool;
pub use glob::GlobTool;
pub use list::ListTool;
pub use read::ReadTool;
pub use search::SearchTool;

use crate::llm::ToolDefinition;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

const MAX_OUTPUT_LENGTH: usize = 128 * 1024; // 128KB
const SNIP_SIZE: usize = 4 * 1024; // 4KB each end

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid input: {0}")]
    InvalidArguments(String),
    #[error("{0}")]
    Failed(String),
    #[error("[interrupted]")]
    Interrupted,
}

/// Per-call context
#[derive(Clone)]
pub struct ToolContext {
    /// Fires when the user interrupts the turn
    pub cancel: CancellationToken,

    /// Relative paths resolve against this
    pub working_dir: PathBuf,
}

impl ToolContext {
    pub fn new(cancel: CancellationToken, working_dir: PathBuf) -> Self {
        Self {
            cancel,
            working_dir,
        }
    }

    /// Resolve a model-supplied path against the working directory
    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }
}

/// Trait for tools that can be executed by the agent
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Tool description for LLM
    fn description(&self) -> String;

    /// JSON schema for tool input
    fn input_schema(&self) -> Value;

    /// Tools that spawn subprocesses must watch `ctx.cancel` and return
    /// `ToolError::Interrupted` once it fires.
    async fn run(&self, input: Value, ctx: &ToolContext) -> Result<String, ToolError>;
}

/// What the conversation engine needs from a tool layer
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Run tool `name` with the raw JSON argument string the model produced
    async fn execute(
        &self,
        name: &str,
        arguments: &str,
        ctx: &ToolContext,
    ) -> Result<String, ToolError>;
}

/// Collection of tools available to the agent
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { tools }
    }

    /// read, list, bash, glob, search
    pub fn standard() -> Self {
        Self::new(vec![
            Arc::new(ReadTool),
            Arc::new(ListTool),
            Arc::new(BashTool),
            Arc::new(GlobTool),
            Arc::new(SearchTool),
        ])
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    fn find(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    async fn execute(
        &self,
        name: &str,
        arguments: &str,
        ctx: &ToolContext,
    ) -> Result<String, ToolError> {
        let tool = self
            .find(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        // Some servers send "" for a call with no arguments
        let input: Value = if arguments.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(arguments)
                .map_err(|e| ToolError::InvalidArguments(format!("arguments are not JSON: {e}")))?
        };

        if ctx.cancel.is_cancelled() {
            return Err(ToolError::Interrupted);
        }

        let start = std::time::Instant::now();
        let result = tool.run(input, ctx).await;
        tracing::debug!(
            tool = name,
            duration_ms = %start.elapsed().as_millis(),
            ok = result.is_ok(),
            "Tool finished"
        );
        result
    }
}

/// Deserialize a tool's typed input
pub(crate) fn parse_input<T: DeserializeOwned>(input: Value) -> Result<T, ToolError> {
    serde_json::from_value(input).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Keep the head and tail of oversized output
pub(crate) fn truncate_output(output: &str) -> String {
    if output.len() <= MAX_OUTPUT_LENGTH {
        return output.to_string();
    }

    let mut head_end = SNIP_SIZE;
    while !output.is_char_boundary(head_end) {
        head_end -= 1;
    }
    let mut tail_start = output.len() - SNIP_SIZE;
    while !output.is_char_boundary(tail_start) {
        tail_start += 1;
    }
    let start = output.get(..head_end).unwrap_or_default();
    let end = output.get(tail_start..).unwrap_or_default();

    format!(
        "[output truncated in middle: got {} bytes, max is {} bytes]\n{}\n\n[snip]\n\n{}",
        output.len(),
        MAX_OUTPUT_LENGTH,
        start,
        end
    )
}
