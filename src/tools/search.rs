//! Text search tool
//!
//! Uses ripgrep when it is on PATH, `grep -rnE` otherwise. Both exit 1 when
//! nothing matched, which is a result, not a failure.

use super::{parse_input, truncate_output, Tool, ToolContext, ToolError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::process::{Output, Stdio};
use tokio::process::Command;

#[derive(Debug, Deserialize)]
struct SearchInput {
    pattern: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    glob: Option<String>,
    #[serde(default)]
    ignore_case: bool,
}

pub struct SearchTool;

impl SearchTool {
    fn command(input: &SearchInput) -> Command {
        let target = input.path.as_deref().unwrap_or(".");

        if let Ok(rg) = which::which("rg") {
            let mut cmd = Command::new(rg);
            cmd.args(["--line-number", "--with-filename", "--no-heading", "--color", "never"]);
            if input.ignore_case {
                cmd.arg("-i");
            }
            if let Some(glob) = &input.glob {
                cmd.args(["--glob", glob]);
            }
            cmd.args(["-e", &input.pattern]).arg(target);
            cmd
        } else {
            let mut cmd = Command::new("grep");
            cmd.args(["-rnE", "--binary-files=without-match"]);
            if input.ignore_case {
                cmd.arg("-i");
            }
            if let Some(glob) = &input.glob {
                cmd.arg(format!("--include={glob}"));
            }
            cmd.args(["-e", &input.pattern]).arg(target);
            cmd
        }
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &'static str {
        "search"
    }

    fn description(&self) -> String {
        "Search file contents for a regular expression. Returns matching lines as path:line:text. \
Use glob to restrict which files are searched (e.g. \"*.rs\")."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["pattern"],
            "properties": {
                "pattern": {"type": "string", "description": "Regular expression to search for"},
                "path": {"type": "string", "description": "File or directory to search (default: working directory)"},
                "glob": {"type": "string", "description": "Only search files matching this glob"},
                "ignore_case": {"type": "boolean", "description": "Case-insensitive search"}
            }
        })
    }

    async fn run(&self, input: Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let input: SearchInput = parse_input(input)?;
        if input.pattern.is_empty() {
            return Err(ToolError::InvalidArguments(
                "pattern cannot be empty".to_string(),
            ));
        }

        let mut cmd = Self::command(&input);
        cmd.current_dir(&ctx.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => return Err(ToolError::Interrupted),
            result = cmd.output() => result
                .map_err(|e| ToolError::Failed(format!("Failed to run search: {e}")))?,
        };

        summarize(&output)
    }
}

fn summarize(output: &Output) -> Result<String, ToolError> {
    // Exit code 1 = no matches (not an error)
    if output.status.code() == Some(1) {
        return Ok("No matches found".to_string());
    }
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if output.stdout.is_empty() {
            return Err(ToolError::Failed(format!("search failed: {}", stderr.trim())));
        }
        // Some paths were unreadable; the matches found elsewhere still count
        tracing::debug!(status = ?output.status.code(), error = %stderr.trim(), "Search finished with errors");
    }

    Ok(truncate_output(&String::from_utf8_lossy(&output.stdout)))
}
