//! podagent - interactive agent REPL against a self-hosted model server

use podagent::event::EventSink;
use podagent::render::{ConsoleSink, JsonLinesSink};
use podagent::{config, Agent, AgentConfig, SessionStore, TurnOutcome};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout carries the rendered conversation
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "podagent=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cwd = std::env::current_dir()?;
    let store = SessionStore::new(config::state_dir()?);

    let renderer: Arc<dyn EventSink> = if flag("PODAGENT_JSON") {
        Arc::new(JsonLinesSink::stdout())
    } else {
        Arc::new(ConsoleSink::stdout())
    };

    let (config, history, log) = if flag("PODAGENT_CONTINUE") {
        let (data, log) = store.resume_latest(&cwd)?;
        tracing::info!(
            session_id = %data.id,
            events = data.events.len(),
            total_tokens = data.total_usage().total_tokens,
            "Continuing session"
        );
        // The header supplies everything but the credential
        let config = data.config.with_api_key(config::api_key_from_env());
        (config, data.events, log)
    } else {
        let config = AgentConfig::from_env()?;
        let log = store.start_session(&config, &cwd);
        (config, Vec::new(), log)
    };

    tracing::info!(
        model = %config.model,
        protocol = %config.protocol,
        base_url = %config.base_url,
        session = %log.path().display(),
        "Starting agent"
    );

    // Show the earlier conversation before accepting new input
    for event in &history {
        if let Err(e) = renderer.on(event).await {
            tracing::warn!(error = %e, "Failed to render history");
        }
    }

    let mut agent = Agent::from_config(config, cwd)?
        .with_sink(renderer)
        .with_sink(Arc::new(log));
    agent.restore(&history);

    let handle = agent.interrupt_handle();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if !handle.interrupt() {
                tracing::info!("Interrupt received while idle, exiting");
                std::process::exit(130);
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "/exit" | "/quit") {
            break;
        }
        match agent.ask(line).await {
            TurnOutcome::Completed(_) | TurnOutcome::Interrupted => {}
            TurnOutcome::Failed(message) => {
                tracing::warn!(error = %message, "Turn failed");
            }
        }
    }

    Ok(())
}

fn flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| matches!(v.as_str(), "1" | "true" | "yes"))
}
