//! Glob tool - find files by pattern
//!
//! Walks with `ignore` so `.gitignore`d trees (target/, `node_modules`/) stay out.

use super::{parse_input, Tool, ToolContext, ToolError};
use async_trait::async_trait;
use globset::GlobBuilder;
use ignore::WalkBuilder;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use tokio_util::sync::CancellationToken;

const MAX_RESULTS: usize = 1000;

#[derive(Debug, Deserialize)]
struct GlobInput {
    pattern: String,
    #[serde(default)]
    path: Option<String>,
}

pub struct GlobTool;

fn walk(
    root: &Path,
    pattern: &str,
    cancel: &CancellationToken,
) -> Result<(Vec<String>, bool), ToolError> {
    let matcher = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| ToolError::InvalidArguments(format!("Invalid glob pattern: {e}")))?
        .compile_matcher();

    let mut matches = Vec::new();
    let walker = WalkBuilder::new(root)
        .hidden(false)
        .filter_entry(|e| e.file_name() != ".git")
        .build();
    for entry in walker {
        if cancel.is_cancelled() {
            return Err(ToolError::Interrupted);
        }
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        if matcher.is_match(relative) {
            matches.push(relative.to_string_lossy().into_owned());
        }
    }
    // Sort before capping: the kept paths are the first in sorted order
    matches.sort();
    let truncated = matches.len() > MAX_RESULTS;
    matches.truncate(MAX_RESULTS);
    Ok((matches, truncated))
}

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &'static str {
        "glob"
    }

    fn description(&self) -> String {
        "Find files whose path matches a glob pattern such as \"**/*.rs\" or \"src/*.toml\". \
Paths are returned relative to the search directory. Files ignored by .gitignore are skipped."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["pattern"],
            "properties": {
                "pattern": {"type": "string", "description": "Glob pattern, matched against paths relative to `path`"},
                "path": {"type": "string", "description": "Directory to search (default: working directory)"}
            }
        })
    }

    async fn run(&self, input: Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let input: GlobInput = parse_input(input)?;
        let root = ctx.resolve(input.path.as_deref().unwrap_or("."));
        if !root.is_dir() {
            return Err(ToolError::Failed(format!(
                "Directory not found: {}",
                root.display()
            )));
        }

        let cancel = ctx.cancel.clone();
        let pattern = input.pattern;
        let (matches, truncated) =
            tokio::task::spawn_blocking(move || walk(&root, &pattern, &cancel))
                .await
                .map_err(|e| ToolError::Failed(format!("Glob task failed: {e}")))??;

        if matches.is_empty() {
            return Ok("No files found".to_string());
        }
        let mut out = matches.join("\n");
        if truncated {
            out.push_str(&format!("\n[results truncated at {MAX_RESULTS} files]"));
        }
        Ok(out)
    }
}
