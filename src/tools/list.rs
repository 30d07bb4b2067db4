//! Directory listing tool

use super::{parse_input, Tool, ToolContext, ToolError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct ListInput {
    #[serde(default = "current_dir")]
    path: String,
}

fn current_dir() -> String {
    ".".to_string()
}

pub struct ListTool;

#[async_trait]
impl Tool for ListTool {
    fn name(&self) -> &'static str {
        "list"
    }

    fn description(&self) -> String {
        "List the entries of a directory. Directories are shown with a trailing '/'.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Directory to list (default: working directory)"}
            }
        })
    }

    async fn run(&self, input: Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let input: ListInput = parse_input(input)?;
        let path = ctx.resolve(&input.path);

        let mut reader = tokio::fs::read_dir(&path)
            .await
            .map_err(|_| ToolError::Failed(format!("Directory not found: {}", input.path)))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| ToolError::Failed(format!("Failed to list {}: {e}", input.path)))?
        {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            // file_type does not follow symlinks; metadata does
            let is_dir = tokio::fs::metadata(entry.path())
                .await
                .is_ok_and(|m| m.is_dir());
            if is_dir {
                name.push('/');
            }
            entries.push(name);
        }

        if entries.is_empty() {
            return Ok("Directory is empty".to_string());
        }
        entries.sort();
        Ok(entries.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn ctx(dir: &TempDir) -> ToolContext {
        ToolContext::new(CancellationToken::new(), dir.path().to_path_buf())
    }

    #[tokio::test]
    async fn test_marks_directories() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "").unwrap();
        std::fs::write(dir.path().join("README.md"), "").unwrap();

        let out = ListTool.run(json!({"path": "."}), &ctx(&dir)).await.unwrap();
        assert_eq!(out, "Cargo.toml\nREADME.md\nsrc/");
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        let out = ListTool.run(json!({}), &ctx(&dir)).await.unwrap();
        assert_eq!(out, "Directory is empty");
    }

    #[tokio::test]
    async fn test_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let err = ListTool
            .run(json!({"path": "ghost"}), &ctx(&dir))
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::Failed("Directory not found: ghost".to_string()));
    }
}
