//! Property-based tests for the conversation engine
//!
//! Random multi-round turns, optionally cut short mid-tool, checked for
//! call/result pairing and for replay producing the live transcript.

use super::testing::{MockModelClient, MockToolExecutor, RecordingSink};
use super::*;
use crate::config::ProtocolFlavor;
use crate::llm::{RoundResponse, Usage};
use crate::tools::ToolError;
use proptest::prelude::*;
use std::collections::HashSet;
use std::time::Duration;

// ============================================================================
// Generators
// ============================================================================

#[derive(Debug, Clone)]
enum CallKind {
    Ok,
    Error,
    Unknown,
    Slow,
}

#[derive(Debug, Clone)]
struct RoundPlan {
    reasoning: Option<String>,
    calls: Vec<CallKind>,
    reports_usage: bool,
}

fn arb_call_kind() -> impl Strategy<Value = CallKind> {
    prop_oneof![
        6 => Just(CallKind::Ok),
        2 => Just(CallKind::Error),
        1 => Just(CallKind::Unknown),
        1 => Just(CallKind::Slow),
    ]
}

fn arb_round() -> impl Strategy<Value = RoundPlan> {
    (
        proptest::option::of("[a-z ]{1,20}"),
        proptest::collection::vec(arb_call_kind(), 1..4),
        any::<bool>(),
    )
        .prop_map(|(reasoning, calls, reports_usage)| RoundPlan {
            reasoning,
            calls,
            reports_usage,
        })
}

fn arb_flavor() -> impl Strategy<Value = ProtocolFlavor> {
    prop_oneof![Just(ProtocolFlavor::Chat), Just(ProtocolFlavor::Responses)]
}

// ============================================================================
// Harness
// ============================================================================

fn usage() -> Usage {
    Usage {
        input_tokens: 10,
        output_tokens: 2,
        total_tokens: 12,
        ..Usage::default()
    }
}

fn build_response(round: usize, plan: &RoundPlan) -> RoundResponse {
    let mut items = Vec::new();
    if let Some(text) = &plan.reasoning {
        items.push(OutputItem::Reasoning { text: text.clone() });
    }
    for (i, kind) in plan.calls.iter().enumerate() {
        let name = match kind {
            CallKind::Ok => "ok",
            CallKind::Error => "broken",
            CallKind::Unknown => "missing",
            CallKind::Slow => "slow",
        };
        items.push(OutputItem::ToolCall(ToolCall::new(
            format!("call_{round}_{i}"),
            name,
            format!(r#"{{"n":{i}}}"#),
        )));
    }
    let response = RoundResponse::new(items);
    if plan.reports_usage {
        response.with_usage(usage())
    } else {
        response
    }
}

/// Run one turn and return (outcome, events, agent)
fn run_turn(flavor: ProtocolFlavor, rounds: &[RoundPlan]) -> (TurnOutcome, Vec<Event>, Agent) {
    let client = Arc::new(MockModelClient::new(flavor));
    for (index, plan) in rounds.iter().enumerate() {
        client.queue_response(build_response(index, plan));
    }
    client.queue_response(RoundResponse::new(vec![OutputItem::Message {
        text: "all done".to_string(),
    }]));

    let tools = Arc::new(
        MockToolExecutor::new()
            .with_tool("ok", Ok("fine".to_string()))
            .with_tool("broken", Err(ToolError::Failed("exit code 1".to_string())))
            .with_delayed_tool("slow", Duration::from_secs(60)),
    );
    let started = tools.execution_started.clone();
    let has_slow = rounds
        .iter()
        .any(|r| r.calls.iter().any(|c| matches!(c, CallKind::Slow)));

    let sink = Arc::new(RecordingSink::default());
    let config = AgentConfig::new("http://mock/v1", "mock-model", flavor);
    let mut agent =
        Agent::new(config, client, tools, std::env::temp_dir()).with_sink(sink.clone());
    let handle = agent.interrupt_handle();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    let outcome = runtime.block_on(async {
        let (outcome, ()) = tokio::join!(agent.ask("do the thing"), async {
            if has_slow {
                started.notified().await;
                handle.interrupt();
            }
        });
        outcome
    });

    (outcome, sink.events(), agent)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every tool_call gets exactly one tool_result with the same id, emitted
    /// before the next round starts, unless the turn was interrupted first.
    #[test]
    fn prop_tool_calls_paired(
        flavor in arb_flavor(),
        rounds in proptest::collection::vec(arb_round(), 0..5),
    ) {
        let (outcome, events, _agent) = run_turn(flavor, &rounds);

        let mut open: Vec<String> = Vec::new();
        let mut answered = HashSet::new();
        for event in &events {
            match event {
                Event::ToolCall { id, .. } => {
                    prop_assert!(open.is_empty(), "call {} started before {:?} finished", id, open);
                    open.push(id.clone());
                }
                Event::ToolResult { id, .. } => {
                    let popped = open.pop();
                    prop_assert_eq!(popped.as_ref(), Some(id));
                    prop_assert!(answered.insert(id.clone()), "duplicate result for {}", id);
                }
                Event::TokenUsage { .. } | Event::AssistantMessage { .. } => {
                    prop_assert!(open.is_empty());
                }
                _ => {}
            }
        }

        let interrupted = events.iter().filter(|e| **e == Event::Interrupted).count();
        match outcome {
            TurnOutcome::Interrupted => {
                prop_assert_eq!(interrupted, 1);
                prop_assert!(open.len() <= 1);
            }
            TurnOutcome::Completed(text) => {
                prop_assert_eq!(text, "all done");
                prop_assert_eq!(interrupted, 0);
                prop_assert!(open.is_empty());
            }
            TurnOutcome::Failed(message) => prop_assert!(false, "unexpected failure: {}", message),
        }
        let errors = events.iter().filter(|e| matches!(e, Event::Error { .. })).count();
        prop_assert_eq!(errors, 0, "unexpected error event");
    }

    /// Rebuilding from the event log gives the transcript the model would
    /// have seen next, byte for byte.
    #[test]
    fn prop_replay_matches_live_transcript(
        flavor in arb_flavor(),
        rounds in proptest::collection::vec(arb_round(), 0..5),
    ) {
        let (_outcome, events, agent) = run_turn(flavor, &rounds);

        let replayed = reconstruct_transcript(&events, flavor);
        prop_assert_eq!(replayed.to_wire(), agent.transcript().to_wire());

        // Session files go through JSON; replay from that form too
        let persisted: Vec<Event> = events
            .iter()
            .map(|e| serde_json::from_str(&serde_json::to_string(e).unwrap()).unwrap())
            .collect();
        prop_assert_eq!(
            reconstruct_transcript(&persisted, flavor).to_wire(),
            agent.transcript().to_wire()
        );
    }
}
