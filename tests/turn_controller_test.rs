//! Turn controller integration tests
//!
//! Each test drives `Agent::run_turn` against a scripted backend and checks
//! what was appended to the transcript.

mod common;

use common::*;
use local_agent::{
    Agent, Error, Message, Observers, ToolRegistry, ToolResult, TurnEvent, TurnOutcome, tool,
};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn counting_tool(name: &str, counter: Arc<AtomicUsize>) -> local_agent::Tool {
    tool(name, "Counts invocations and echoes its arguments")
        .param("value", "string")
        .build(move |args| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"echo": args["value"]}))
            }
        })
}

fn start_transcript() -> Vec<Message> {
    vec![Message::system("You are a test assistant."), Message::user("hi")]
}

fn tool_content(message: &Message) -> Value {
    match message {
        Message::Tool { content, .. } => serde_json::from_str(content).unwrap(),
        other => panic!("expected tool message, got {other:?}"),
    }
}

fn tool_call_id(message: &Message) -> &str {
    match message {
        Message::Tool { tool_call_id, .. } => tool_call_id,
        other => panic!("expected tool message, got {other:?}"),
    }
}

/// Scenario: the model answers directly.
/// Expected: Complete(answer), exactly one assistant message appended.
#[tokio::test]
async fn test_turn_without_tool_calls_completes() {
    let backend = ScriptedBackend::new(vec![vec![
        reasoning("The user "),
        reasoning("said hi."),
        empty(),
        answer("Hello"),
        answer(" there!"),
    ]]);
    let agent = Agent::with_backend(options(ToolRegistry::new()), backend);
    let mut transcript = start_transcript();

    let outcome = agent.run_turn(&mut transcript).await.unwrap();

    assert_eq!(outcome, TurnOutcome::Complete("Hello there!".to_string()));
    assert_eq!(transcript.len(), 3);
    match &transcript[2] {
        Message::Assistant(msg) => {
            assert_eq!(msg.content.as_deref(), Some("Hello there!"));
            assert_eq!(msg.reasoning_content.as_deref(), Some("The user said hi."));
            assert!(msg.tool_calls.is_none());
        }
        other => panic!("expected assistant message, got {other:?}"),
    }
}

/// Scenario: two tool calls whose fragments interleave, index 1 first.
/// Expected: Incomplete, one assistant message, then tool messages in index order.
#[tokio::test]
async fn test_tool_calls_run_in_index_order() {
    let counter = Arc::new(AtomicUsize::new(0));
    let registry = ToolRegistry::new().with_tool(counting_tool("echo", counter.clone()));

    let backend = ScriptedBackend::new(vec![vec![
        reasoning("Two echoes."),
        call_start(1, "call_b", "echo"),
        call_start(0, "call_a", "echo"),
        call_args(1, r#"{"val"#),
        call_args(0, r#"{"value": "first"}"#),
        call_args(1, r#"ue": "second"}"#),
    ]]);
    let agent = Agent::with_backend(options(registry), backend);
    let mut transcript = start_transcript();

    let outcome = agent.run_turn(&mut transcript).await.unwrap();

    assert_eq!(outcome, TurnOutcome::Incomplete);
    assert_eq!(transcript.len(), 5);
    assert_eq!(counter.load(Ordering::SeqCst), 2);

    let Message::Assistant(assistant) = &transcript[2] else {
        panic!("expected assistant message");
    };
    let ids: Vec<&str> = assistant.tool_calls().iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["call_a", "call_b"]);
    assert_eq!(assistant.tool_calls()[1].arguments, r#"{"value": "second"}"#);

    assert_eq!(tool_call_id(&transcript[3]), "call_a");
    assert_eq!(tool_content(&transcript[3]), json!({"echo": "first"}));
    assert_eq!(tool_call_id(&transcript[4]), "call_b");
    assert_eq!(tool_content(&transcript[4]), json!({"echo": "second"}));
}

/// The assistant message for a tool-only response carries an explicit null content.
#[tokio::test]
async fn test_tool_only_message_serializes_null_content() {
    let backend = ScriptedBackend::new(vec![call(0, "call_1", "get_datetime", "{}")]);
    let agent = Agent::with_backend(options(ToolRegistry::new()), backend.clone());
    let mut transcript = start_transcript();

    agent.run_turn(&mut transcript).await.unwrap();

    let wire = serde_json::to_value(&transcript[2]).unwrap();
    assert_eq!(wire["role"], "assistant");
    assert!(wire.get("content").is_some());
    assert!(wire["content"].is_null());
    assert!(wire.get("reasoning_content").is_none());
    assert_eq!(wire["tool_calls"][0]["type"], "function");
    assert_eq!(wire["tool_calls"][0]["function"]["name"], "get_datetime");
}

/// Scenario: argument text is not valid JSON.
/// Expected: error tool message, tool never invoked, turn still incomplete.
#[tokio::test]
async fn test_invalid_arguments_skip_tool() {
    let counter = Arc::new(AtomicUsize::new(0));
    let registry = ToolRegistry::new().with_tool(counting_tool("echo", counter.clone()));

    let mut round = call(0, "call_bad", "echo", r#"{"value": "unterminated"#);
    round.extend(call(1, "call_good", "echo", r#"{"value": "ok"}"#));
    let backend = ScriptedBackend::new(vec![round]);
    let agent = Agent::with_backend(options(registry), backend);
    let mut transcript = start_transcript();

    let outcome = agent.run_turn(&mut transcript).await.unwrap();

    assert_eq!(outcome, TurnOutcome::Incomplete);
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    let error = tool_content(&transcript[3]);
    let text = error["error"].as_str().unwrap();
    assert!(text.starts_with("Invalid arguments JSON: "), "{text}");
    assert_eq!(tool_content(&transcript[4]), json!({"echo": "ok"}));
}

#[tokio::test]
async fn test_unknown_tool_is_reported() {
    let backend = ScriptedBackend::new(vec![call(0, "call_x", "launch_rockets", "{}")]);
    let agent = Agent::with_backend(options(ToolRegistry::new()), backend);
    let mut transcript = start_transcript();

    let outcome = agent.run_turn(&mut transcript).await.unwrap();

    assert_eq!(outcome, TurnOutcome::Incomplete);
    assert_eq!(
        tool_content(&transcript[3]),
        json!({"error": "Unknown function: launch_rockets"})
    );
}

/// Tool errors and panics become error payloads and later calls still run.
#[tokio::test]
async fn test_tool_failures_do_not_abort_turn() {
    let failing = tool("fail", "Always fails").build(|_| async move {
        Err(local_agent::Error::tool("disk on fire"))
    });
    let panicking = tool("explode", "Always panics").build(|_| async move {
        if true {
            panic!("kaboom");
        }
        Ok(json!({}))
    });
    let counter = Arc::new(AtomicUsize::new(0));
    let registry = ToolRegistry::new()
        .with_tool(failing)
        .with_tool(panicking)
        .with_tool(counting_tool("echo", counter.clone()));

    let mut round = call(0, "c0", "fail", "");
    round.extend(call(1, "c1", "explode", "{}"));
    round.extend(call(2, "c2", "echo", r#"{"value": "still here"}"#));
    let backend = ScriptedBackend::new(vec![round]);
    let agent = Agent::with_backend(options(registry), backend);
    let mut transcript = start_transcript();

    let outcome = agent.run_turn(&mut transcript).await.unwrap();

    assert_eq!(outcome, TurnOutcome::Incomplete);
    assert_eq!(tool_content(&transcript[3]), json!({"error": "disk on fire"}));
    let panic_text = tool_content(&transcript[4])["error"].as_str().unwrap().to_string();
    assert!(panic_text.contains("kaboom"), "{panic_text}");
    assert_eq!(tool_content(&transcript[5]), json!({"echo": "still here"}));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

/// The request carries the transcript, tool schemas and generation flags.
#[tokio::test]
async fn test_request_shape() {
    let counter = Arc::new(AtomicUsize::new(0));
    let registry = ToolRegistry::new().with_tool(counting_tool("echo", counter));
    let backend = ScriptedBackend::new(vec![vec![answer("ok")]]);
    let agent = Agent::with_backend(options(registry), backend.clone());
    let mut transcript = start_transcript();

    agent.run_turn(&mut transcript).await.unwrap();

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    let wire = serde_json::to_value(&requests[0]).unwrap();
    assert_eq!(wire["model"], "glm-test");
    assert_eq!(wire["stream"], true);
    assert_eq!(wire["tool_stream"], true);
    assert_eq!(wire["thinking"], json!({"type": "enabled"}));
    assert!(wire["temperature"].is_number());
    assert_eq!(wire["messages"].as_array().unwrap().len(), 2);
    assert_eq!(wire["messages"][0]["role"], "system");
    assert_eq!(wire["tools"][0]["function"]["name"], "echo");
}

/// A failed request leaves the transcript untouched.
#[tokio::test]
async fn test_backend_error_appends_nothing() {
    let backend = ScriptedBackend::new(vec![]);
    let agent = Agent::with_backend(options(ToolRegistry::new()), backend);
    let mut transcript = start_transcript();

    let err = agent.run_turn(&mut transcript).await.unwrap_err();

    assert!(matches!(err, Error::Api(_)));
    assert_eq!(transcript.len(), 2);
}

/// A stream that breaks halfway never produces a half-built assistant message.
#[tokio::test]
async fn test_stream_error_appends_nothing() {
    let backend = ScriptedBackend::with_items(vec![
        Ok(answer("partial")),
        Err(Error::stream("connection reset")),
        Ok(answer(" never seen")),
    ]);
    let agent = Agent::with_backend(options(ToolRegistry::new()), backend);
    let mut transcript = start_transcript();

    let err = agent.run_turn(&mut transcript).await.unwrap_err();

    assert!(matches!(err, Error::Stream(_)));
    assert_eq!(transcript.len(), 2);
}

/// Observers see deltas and tool activity in order.
#[tokio::test]
async fn test_events_emitted() {
    let counter = Arc::new(AtomicUsize::new(0));
    let registry = ToolRegistry::new().with_tool(counting_tool("echo", counter));
    let mut round = vec![reasoning("hmm"), answer("Let me check.")];
    round.extend(call(0, "c0", "echo", r#"{"value": "x"}"#));
    round.extend(call(1, "c1", "echo", "not json"));
    let backend = ScriptedBackend::new(vec![round]);

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let agent = Agent::with_backend(options(registry), backend)
        .with_observers(Observers::new().on_event(move |e| sink.lock().unwrap().push(e.clone())));
    let mut transcript = start_transcript();

    agent.run_turn(&mut transcript).await.unwrap();

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 5);
    assert_eq!(events[0], TurnEvent::ReasoningDelta("hmm".into()));
    assert_eq!(events[1], TurnEvent::AnswerDelta("Let me check.".into()));
    assert_eq!(
        events[2],
        TurnEvent::ToolCallStarted {
            id: "c0".into(),
            name: "echo".into(),
            arguments: json!({"value": "x"}),
        }
    );
    assert_eq!(
        events[3],
        TurnEvent::ToolCallFinished {
            id: "c0".into(),
            name: "echo".into(),
            result: ToolResult::Success(json!({"echo": "x"})),
        }
    );
    assert!(matches!(&events[4], TurnEvent::ToolArgumentsInvalid { id, .. } if id == "c1"));
}

/// Interrupting between tool calls answers the remaining calls and stops.
#[tokio::test]
async fn test_interrupt_between_tool_calls() {
    let counter = Arc::new(AtomicUsize::new(0));
    let registry = ToolRegistry::new().with_tool(counting_tool("echo", counter.clone()));
    let mut round = call(0, "c0", "echo", r#"{"value": "a"}"#);
    round.extend(call(1, "c1", "echo", r#"{"value": "b"}"#));
    let backend = ScriptedBackend::new(vec![round]);

    let agent = Agent::with_backend(options(registry), backend);
    let handle = agent.interrupt_handle();
    let agent = agent.with_observers(Observers::new().on_event(move |e| {
        if matches!(e, TurnEvent::ToolCallFinished { .. }) {
            handle.interrupt();
        }
    }));
    let mut transcript = start_transcript();

    let err = agent.run_turn(&mut transcript).await.unwrap_err();

    assert!(matches!(err, Error::Interrupted));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(transcript.len(), 5);
    assert_eq!(tool_content(&transcript[3]), json!({"echo": "a"}));
    assert_eq!(tool_call_id(&transcript[4]), "c1");
    assert!(tool_content(&transcript[4])["error"].is_string());
}

/// Interrupting while streaming drops the partial response.
#[tokio::test]
async fn test_interrupt_while_streaming() {
    let backend = ScriptedBackend::new(vec![vec![answer("a"), answer("b")]]);
    let agent = Agent::with_backend(options(ToolRegistry::new()), backend);
    agent.interrupt();
    let mut transcript = start_transcript();

    let err = agent.run_turn(&mut transcript).await.unwrap_err();

    assert!(matches!(err, Error::Interrupted));
    assert_eq!(transcript.len(), 2);
}

/// Interrupting a stream that has stopped sending ends the turn right away.
#[tokio::test]
async fn test_interrupt_stalled_stream() {
    let agent = Agent::with_backend(options(ToolRegistry::new()), StalledBackend::after(vec![answer("par")]));
    let handle = agent.interrupt_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.interrupt();
    });
    let mut transcript = start_transcript();

    let result = tokio::time::timeout(Duration::from_secs(5), agent.run_turn(&mut transcript))
        .await
        .expect("turn should stop once interrupted");

    assert!(matches!(result, Err(Error::Interrupted)));
    assert_eq!(transcript.len(), 2);
}

/// Interrupting while the backend has not answered at all.
#[tokio::test]
async fn test_interrupt_before_response() {
    let agent = Agent::with_backend(options(ToolRegistry::new()), StalledBackend::connecting());
    let handle = agent.interrupt_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.interrupt();
    });
    let mut transcript = start_transcript();

    let result = tokio::time::timeout(Duration::from_secs(5), agent.run_turn(&mut transcript))
        .await
        .expect("turn should stop once interrupted");

    assert!(matches!(result, Err(Error::Interrupted)));
    assert_eq!(transcript.len(), 2);
}

/// A slow tool is cancelled; it and every later call still get a tool message.
#[tokio::test]
async fn test_interrupt_running_tool() {
    let slow = tool("slow", "Sleeps for a long time").build(|_| async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(json!({"done": true}))
    });
    let counter = Arc::new(AtomicUsize::new(0));
    let registry = ToolRegistry::new()
        .with_tool(slow)
        .with_tool(counting_tool("echo", counter.clone()));
    let mut round = call(0, "c0", "slow", "{}");
    round.extend(call(1, "c1", "echo", r#"{"value": "b"}"#));

    let agent = Agent::with_backend(options(registry), ScriptedBackend::new(vec![round]));
    let handle = agent.interrupt_handle();
    let agent = agent.with_observers(Observers::new().on_event(move |e| {
        if matches!(e, TurnEvent::ToolCallStarted { .. }) {
            let handle = handle.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                handle.interrupt();
            });
        }
    }));
    let mut transcript = start_transcript();

    let result = tokio::time::timeout(Duration::from_secs(5), agent.run_turn(&mut transcript))
        .await
        .expect("turn should stop once interrupted");

    assert!(matches!(result, Err(Error::Interrupted)));
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert_eq!(transcript.len(), 5);
    assert_eq!(tool_call_id(&transcript[3]), "c0");
    assert_eq!(
        tool_content(&transcript[3]),
        json!({"error": "Interrupted by user while this tool was running"})
    );
    assert_eq!(tool_call_id(&transcript[4]), "c1");
    assert_eq!(
        tool_content(&transcript[4]),
        json!({"error": "Interrupted by user before this tool ran"})
    );
}

/// An interrupt that arrives during the last tool stops the loop before
/// another request goes out.
#[tokio::test]
async fn test_interrupt_during_last_tool_sends_no_request() {
    let counter = Arc::new(AtomicUsize::new(0));
    let registry = ToolRegistry::new().with_tool(counting_tool("echo", counter.clone()));
    let backend = ScriptedBackend::new(vec![
        call(0, "c0", "echo", r#"{"value": "a"}"#),
        vec![answer("should not be requested")],
    ]);

    let agent = Agent::with_backend(options(registry), backend.clone());
    let handle = agent.interrupt_handle();
    let agent = agent.with_observers(Observers::new().on_event(move |e| {
        if matches!(e, TurnEvent::ToolCallStarted { .. }) {
            handle.interrupt();
        }
    }));
    let mut transcript = agent.new_transcript();

    let err = agent.run(&mut transcript, "hi").await.unwrap_err();

    assert!(matches!(err, Error::Interrupted));
    assert_eq!(backend.requests().len(), 1);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(transcript.len(), 4);
    assert_eq!(tool_content(&transcript[3]), json!({"echo": "a"}));
}
