//! Terminal renderers for the event stream

use crate::event::{Event, EventSink, SinkError};
use async_trait::async_trait;
use std::io::Write;
use std::sync::{Mutex, PoisonError};

/// Lines of tool output shown before eliding the rest
const RESULT_PREVIEW_LINES: usize = 12;

/// Human-readable transcript on a terminal
pub struct ConsoleSink<W: Write + Send> {
    out: Mutex<W>,
}

impl ConsoleSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn render(event: &Event) -> Option<String> {
        let text = match event {
            Event::UserMessage { text } => format!("> {text}"),
            Event::AssistantStart => return None,
            Event::Thinking { text } => text
                .lines()
                .map(|line| format!("  · {line}"))
                .collect::<Vec<_>>()
                .join("\n"),
            Event::ToolCall { name, args, .. } => format!("→ {name} {args}"),
            Event::ToolResult {
                result, is_error, ..
            } => {
                let marker = if *is_error { "✗" } else { "←" };
                format!("{marker} {}", preview(result))
            }
            Event::AssistantMessage { text } => format!("\n{text}\n"),
            Event::Error { message } => format!("error: {message}"),
            Event::Interrupted => "[interrupted]".to_string(),
            Event::TokenUsage {
                input,
                output,
                cache_read,
                ..
            } => {
                if *cache_read > 0 {
                    format!("  [tokens: {input} in ({cache_read} cached), {output} out]")
                } else {
                    format!("  [tokens: {input} in, {output} out]")
                }
            }
        };
        Some(text)
    }
}

fn preview(result: &str) -> String {
    let total = result.lines().count();
    if total <= RESULT_PREVIEW_LINES {
        return result.trim_end().to_string();
    }
    let head: Vec<&str> = result.lines().take(RESULT_PREVIEW_LINES).collect();
    format!(
        "{}\n  … {} more lines",
        head.join("\n"),
        total - RESULT_PREVIEW_LINES
    )
}

#[async_trait]
impl<W: Write + Send> EventSink for ConsoleSink<W> {
    async fn on(&self, event: &Event) -> Result<(), SinkError> {
        let Some(text) = Self::render(event) else {
            return Ok(());
        };
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{text}")?;
        out.flush()?;
        Ok(())
    }
}

/// One JSON object per event, one per line
pub struct JsonLinesSink<W: Write + Send> {
    out: Mutex<W>,
}

impl JsonLinesSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    async fn on(&self, event: &Event) -> Result<(), SinkError> {
        let line = serde_json::to_string(event)?;
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{line}")?;
        out.flush()?;
        Ok(())
    }
}
