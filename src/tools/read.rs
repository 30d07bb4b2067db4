//! File read tool

use super::{parse_input, truncate_output, Tool, ToolContext, ToolError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct ReadInput {
    path: String,
    /// 1-based first line
    #[serde(default)]
    offset: Option<usize>,
    #[serde(default)]
    limit: Option<usize>,
}

pub struct ReadTool;

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &'static str {
        "read"
    }

    fn description(&self) -> String {
        "Read the contents of a file. Relative paths resolve against the working directory. \
Use offset (1-based line number) and limit to read part of a large file."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["path"],
            "properties": {
                "path": {"type": "string", "description": "File to read"},
                "offset": {"type": "integer", "minimum": 1, "description": "First line to return (1-based)"},
                "limit": {"type": "integer", "minimum": 1, "description": "Maximum number of lines to return"}
            }
        })
    }

    async fn run(&self, input: Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let input: ReadInput = parse_input(input)?;
        let path = ctx.resolve(&input.path);

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|_| ToolError::Failed(format!("File not found: {}", input.path)))?;
        if metadata.is_dir() {
            return Err(ToolError::Failed(format!(
                "{} is a directory, use list instead",
                input.path
            )));
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| ToolError::Failed(format!("Failed to read {}: {e}", input.path)))?;
        let contents = String::from_utf8_lossy(&bytes);

        if input.offset.is_none() && input.limit.is_none() {
            return Ok(truncate_output(&contents));
        }

        let skip = input.offset.unwrap_or(1).saturating_sub(1);
        let lines: Vec<&str> = contents
            .lines()
            .skip(skip)
            .take(input.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(truncate_output(&lines.join("\n")))
    }
}
