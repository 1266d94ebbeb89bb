//! Round-bounded tool loop against a scripted backend.

mod common;

use std::sync::Arc;

use futures::StreamExt;
use parley::agent_loop::{stream_with_tools, ToolLoopRequest};
use parley::error::ParleyError;
use parley::tools::{FnTool, ToolParameters, ToolSet};
use parley::types::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use common::{as_map, ScriptedBackend};

fn echo_args_tool() -> Arc<FnTool> {
    Arc::new(FnTool::new(
        "echo_args",
        "Echo the arguments back",
        ToolParameters::empty(),
        |args| async move { Ok(serde_json::Value::Object(args.raw().clone()).to_string()) },
    ))
}

fn failing_tool() -> Arc<FnTool> {
    Arc::new(FnTool::new(
        "explode",
        "Always fails",
        ToolParameters::empty(),
        |_args| async { Err(ParleyError::tool("explode", "boom")) },
    ))
}

fn request(tools: ToolSet) -> ToolLoopRequest {
    ToolLoopRequest::new(
        vec![ModelMessage::system("sys"), ModelMessage::human("hi")],
        tools,
    )
}

async fn run(
    backend: Arc<ScriptedBackend>,
    request: ToolLoopRequest,
) -> Vec<Result<LlmStreamEvent, ParleyError>> {
    stream_with_tools(backend, request).collect().await
}

fn ok_events(events: Vec<Result<LlmStreamEvent, ParleyError>>) -> Vec<LlmStreamEvent> {
    events
        .into_iter()
        .map(|e| e.expect("unexpected loop error"))
        .collect()
}

fn done_messages(events: &[LlmStreamEvent]) -> &[ModelMessage] {
    match events.last() {
        Some(LlmStreamEvent::Done { messages }) => messages,
        other => panic!("expected done last, got {other:?}"),
    }
}

#[tokio::test]
async fn text_only_response_yields_tokens_then_done() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.queue_text(&["Hel", "lo"]);

    let events = ok_events(run(backend.clone(), request(ToolSet::new())).await);

    assert_eq!(
        events[..2].to_vec(),
        vec![
            LlmStreamEvent::Token { text: "Hel".into() },
            LlmStreamEvent::Token { text: "lo".into() },
        ]
    );
    let messages = done_messages(&events);
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[2], ModelMessage::ai("Hello"));
    assert_eq!(backend.call_count(), 1);
    assert!(backend.requests()[0].tools.is_none());
}

#[tokio::test]
async fn fragments_with_same_id_are_merged_before_invocation() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.queue_chunks(vec![
        ModelChunk::tool_calls(vec![ToolCallFragment::new(
            "call-1",
            "echo_args",
            as_map(json!({"a": 1})),
        )]),
        ModelChunk::tool_calls(vec![ToolCallFragment::args_only(
            "call-1",
            as_map(json!({"b": 2})),
        )]),
    ]);
    backend.queue_text(&["done"]);

    let tools = ToolSet::new().with(echo_args_tool());
    let events = ok_events(run(backend.clone(), request(tools)).await);

    let ends: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            LlmStreamEvent::ToolEnd { result, call_id, .. } => Some((call_id.clone(), result.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(ends.len(), 1);
    assert_eq!(ends[0].0, "call-1");
    let merged: serde_json::Value = serde_json::from_str(&ends[0].1).unwrap();
    assert_eq!(merged, json!({"a": 1, "b": 2}));

    assert!(matches!(
        &events[0],
        LlmStreamEvent::ToolStart { name, call_id } if name == "echo_args" && call_id == "call-1"
    ));

    let requests = backend.requests();
    let second = &requests[1];
    assert!(second.has_tools());
    let tool_turn = second.messages.last().unwrap();
    assert_eq!(tool_turn.role, ModelRole::Tool);
    assert_eq!(tool_turn.tool_call_id.as_deref(), Some("call-1"));
}

#[tokio::test]
async fn failing_tool_becomes_error_result_and_loop_continues() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.queue_tool_call("call-1", "explode", json!({}));
    backend.queue_text(&["recovered"]);

    let tools = ToolSet::new().with(failing_tool());
    let events = ok_events(run(backend.clone(), request(tools)).await);

    let result = events
        .iter()
        .find_map(|e| match e {
            LlmStreamEvent::ToolEnd { result, .. } => Some(result.clone()),
            _ => None,
        })
        .unwrap();
    assert!(result.starts_with("Error: "), "got {result}");
    assert!(result.contains("boom"));
    assert_eq!(backend.call_count(), 2);
    assert_eq!(done_messages(&events).last().unwrap().content, "recovered");
}

#[tokio::test]
async fn round_bound_forces_final_call_without_tools() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.queue_tool_call("r1", "echo_args", json!({"n": 1}));
    backend.queue_tool_call("r2", "echo_args", json!({"n": 2}));
    // Tool calls in the final response are ignored.
    backend.queue_chunks(vec![
        ModelChunk::text("final"),
        ModelChunk::tool_calls(vec![ToolCallFragment::new("r3", "echo_args", Default::default())]),
    ]);

    let tools = ToolSet::new().with(echo_args_tool());
    let events = ok_events(run(backend.clone(), request(tools).with_max_tool_rounds(2)).await);

    let requests = backend.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests[0].has_tools());
    assert!(requests[1].has_tools());
    assert!(requests[2].tools.is_none());

    let starts = events
        .iter()
        .filter(|e| matches!(e, LlmStreamEvent::ToolStart { .. }))
        .count();
    assert_eq!(starts, 2);

    let last = done_messages(&events).last().unwrap();
    assert_eq!(last.role, ModelRole::Ai);
    assert_eq!(last.content, "final");
    assert!(last.tool_calls.is_empty());
}

#[tokio::test]
async fn unknown_tool_only_ends_after_one_call() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.queue_tool_call("x1", "missing", json!({}));

    let tools = ToolSet::new().with(echo_args_tool());
    let events = ok_events(run(backend.clone(), request(tools)).await);

    assert_eq!(backend.call_count(), 1);
    assert_eq!(events.len(), 2);
    assert!(matches!(
        &events[0],
        LlmStreamEvent::ToolStart { name, call_id } if name == "missing" && call_id == "x1"
    ));
    assert!(!events.iter().any(|e| matches!(e, LlmStreamEvent::ToolEnd { .. })));
    let messages = done_messages(&events);
    assert_eq!(messages.last().unwrap().tool_calls.len(), 1);
}

#[tokio::test]
async fn unknown_tool_next_to_known_one_gets_error_result_message() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.queue_chunks(vec![ModelChunk::tool_calls(vec![
        ToolCallFragment::new("k1", "echo_args", as_map(json!({"q": "x"}))),
        ToolCallFragment::new("u1", "missing", Default::default()),
    ])]);
    backend.queue_text(&["ok"]);

    let tools = ToolSet::new().with(echo_args_tool());
    let events = ok_events(run(backend.clone(), request(tools)).await);

    let starts: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            LlmStreamEvent::ToolStart { name, .. } => Some(name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(starts, ["echo_args", "missing"]);
    let ends: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            LlmStreamEvent::ToolEnd { name, .. } => Some(name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(ends, ["echo_args"]);

    let requests = backend.requests();
    let second = &requests[1];
    let unknown = second
        .messages
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("u1"))
        .unwrap();
    assert_eq!(unknown.content, "Error: unknown tool 'missing'");
}

#[tokio::test]
async fn cancelled_token_ends_stream_before_any_call() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.queue_text(&["never"]);
    let token = CancellationToken::new();
    token.cancel();

    let events = run(backend.clone(), request(ToolSet::new()).with_cancel(token)).await;

    assert!(events.is_empty());
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn backend_error_ends_stream_with_err() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.queue_failure("upstream down");

    let events = run(backend, request(ToolSet::new())).await;

    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        Err(ParleyError::Api { status: 500, message }) if message == "upstream down"
    ));
}
