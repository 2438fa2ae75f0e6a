//! End-to-end tests of the agentic loop through the public API.
//!
//! A scripted provider stands in for the model; a recording executor stands
//! in for the application's tools where the tool bodies don't matter.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crm_tool_runtime::provider::mock::{MockLlmProvider, ScriptedTurn};
use crm_tool_runtime::tool::EchoTool;
use crm_tool_runtime::{
    authorize, register_crm_tools, Actor, AgenticLoop, AgenticLoopError, AuthError, ContentBlock,
    Conversation, ConversationEvent, Identity, InMemoryStore, Message, Role, StaticActorResolver,
    StopReason, StreamEvent, Termination, ToolAwareLlmProvider, ToolExecutor, ToolOutcome,
    ToolOutput, ToolRegistry,
};

/// Executor that records every call and replays queued outcomes.
#[derive(Default)]
struct RecordingExecutor {
    calls: Mutex<Vec<(String, Value)>>,
    outcomes: Mutex<VecDeque<ToolOutcome>>,
    cancel_on_call: Option<CancellationToken>,
}

impl RecordingExecutor {
    fn replying(outcomes: Vec<ToolOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            ..Default::default()
        }
    }

    fn cancelling(token: CancellationToken) -> Self {
        Self {
            cancel_on_call: Some(token),
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolExecutor for RecordingExecutor {
    async fn execute(&self, name: &str, input: Value, _actor: &Actor) -> ToolOutcome {
        self.calls.lock().unwrap().push((name.to_string(), input));
        if let Some(token) = &self.cancel_on_call {
            token.cancel();
        }
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ToolOutcome::succeeded(ToolOutput::new(json!({}))))
    }
}

fn actor() -> Actor {
    Actor::new("user-1", "tenant-1")
}

fn ask(text: &str) -> Conversation {
    Conversation::from_messages(vec![Message::user(text)])
}

fn loop_with(provider: &Arc<MockLlmProvider>, executor: &Arc<RecordingExecutor>) -> AgenticLoop {
    AgenticLoop::new(
        provider.clone() as Arc<dyn ToolAwareLlmProvider>,
        Arc::new(ToolRegistry::new()),
        executor.clone() as Arc<dyn ToolExecutor>,
    )
}

fn tool_results(message: &Message) -> Vec<(String, String, bool)> {
    message
        .content
        .iter()
        .filter_map(|b| match b {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => Some((tool_use_id.clone(), content.clone(), *is_error)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn lookup_scenario_returns_last_turn_text() {
    let provider = Arc::new(MockLlmProvider::new());
    provider.queue_turn(ScriptedTurn::tool_use("t1", "lookup", json!({"query": "acme"})));
    provider.queue_text("Found acme (123).");
    let executor = Arc::new(RecordingExecutor::replying(vec![ToolOutcome::succeeded(
        ToolOutput::new(json!({"id": "123"})),
    )]));

    let outcome = loop_with(&provider, &executor)
        .run_conversation(ask("find acme"), &actor())
        .await
        .unwrap();

    assert_eq!(outcome.text, "Found acme (123).");
    assert_eq!(outcome.termination, Termination::Completed(StopReason::EndTurn));
    let calls = executor.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "lookup");
    assert_eq!(calls[0].1["query"], "acme");

    let second = &provider.requests()[1];
    let results = tool_results(&second.messages[2]);
    assert_eq!(results.len(), 1);
    assert!(results[0].1.contains("\"123\""));
}

#[tokio::test]
async fn every_tool_use_gets_exactly_one_result() {
    let provider = Arc::new(MockLlmProvider::new());
    provider.queue_turn(
        ScriptedTurn::tool_use("a", "one", json!({}))
            .with_tool_use("b", "two", json!({"x": 1}))
            .with_tool_use("c", "three", json!({"y": [1, 2]})),
    );
    provider.queue_text("ok");
    let executor = Arc::new(RecordingExecutor::default());

    let outcome = loop_with(&provider, &executor)
        .run_conversation(ask("go"), &actor())
        .await
        .unwrap();

    let assistant = &outcome.messages[1];
    assert_eq!(assistant.role, Role::Assistant);
    assert_eq!(assistant.tool_calls().len(), 3);

    let results = tool_results(&outcome.messages[2]);
    let ids: Vec<&str> = results.iter().map(|r| r.0.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(outcome.messages[2].role, Role::User);
}

#[tokio::test]
async fn failed_tool_becomes_error_result_not_exception() {
    let provider = Arc::new(MockLlmProvider::new());
    provider.queue_turn(ScriptedTurn::tool_use("t1", "flaky", json!({})));
    provider.queue_text("That didn't work.");
    let executor = Arc::new(RecordingExecutor::replying(vec![ToolOutcome::failed("X")]));

    let outcome = loop_with(&provider, &executor)
        .run_conversation(ask("try"), &actor())
        .await
        .unwrap();

    let results = tool_results(&outcome.messages[2]);
    assert_eq!(results.len(), 1);
    let (_, content, is_error) = &results[0];
    assert!(is_error);
    let envelope: Value = serde_json::from_str(content).unwrap();
    assert_eq!(envelope["success"], false);
    assert_eq!(envelope["error"], "X");
}

#[tokio::test]
async fn endless_tool_requests_stop_after_five_rounds() {
    let provider = Arc::new(MockLlmProvider::new());
    provider.repeat_forever(
        ScriptedTurn::tool_use("again", "poll", json!({})).with_text_prefix("Still working. "),
    );
    let executor = Arc::new(RecordingExecutor::default());

    let outcome = loop_with(&provider, &executor)
        .run_conversation(ask("loop forever"), &actor())
        .await
        .unwrap();

    assert_eq!(outcome.termination, Termination::IterationCap);
    assert_eq!(outcome.tool_rounds, 5);
    assert_eq!(executor.calls().len(), 5);
    assert_eq!(provider.request_count(), 5);
    assert_eq!(outcome.text, "Still working. ".repeat(5));
}

#[tokio::test]
async fn endless_tool_requests_stop_after_five_rounds_streaming() {
    let provider = Arc::new(MockLlmProvider::new().with_fragment_size(2));
    provider.repeat_forever(ScriptedTurn::tool_use("again", "poll", json!({"n": 1})));
    let executor = Arc::new(RecordingExecutor::default());

    let stream = loop_with(&provider, &executor).stream_conversation(
        ask("loop forever"),
        actor(),
        CancellationToken::new(),
    );
    let outcome = stream.finish().await.unwrap();

    assert_eq!(outcome.termination, Termination::IterationCap);
    assert_eq!(outcome.tool_rounds, 5);
    assert_eq!(outcome.text, "");
    assert_eq!(executor.calls().len(), 5);
}

#[tokio::test]
async fn custom_ceiling_is_honoured() {
    let provider = Arc::new(MockLlmProvider::new());
    provider.repeat_forever(ScriptedTurn::tool_use("again", "poll", json!({})));
    let executor = Arc::new(RecordingExecutor::default());

    let outcome = loop_with(&provider, &executor)
        .with_max_tool_rounds(2)
        .run_conversation(ask("x"), &actor())
        .await
        .unwrap();
    assert_eq!(outcome.tool_rounds, 2);
    assert_eq!(executor.calls().len(), 2);
}

#[tokio::test]
async fn streaming_and_batched_produce_identical_text() {
    let script = [
        "Here is a summary of Acme: three open cards, one overdue follow-up.",
        "Ünïcödé text survives fragmenting 🎉 too.",
        "",
    ];
    for text in script {
        let batched_provider = Arc::new(MockLlmProvider::new());
        batched_provider.queue_text(text);
        let streamed_provider = Arc::new(MockLlmProvider::new().with_fragment_size(3));
        streamed_provider.queue_text(text);
        let executor = Arc::new(RecordingExecutor::default());

        let batched = loop_with(&batched_provider, &executor)
            .run_conversation(ask("summary"), &actor())
            .await
            .unwrap();

        let mut stream = loop_with(&streamed_provider, &executor).stream_conversation(
            ask("summary"),
            actor(),
            CancellationToken::new(),
        );
        let mut forwarded = String::new();
        while let Some(event) = stream.next().await {
            if let ConversationEvent::Text(fragment) = event {
                forwarded.push_str(&fragment);
            }
        }
        let streamed = stream.finish().await.unwrap();

        assert_eq!(batched.text, text);
        assert_eq!(streamed.text, batched.text);
        assert_eq!(forwarded, batched.text);
    }
}

#[tokio::test]
async fn cancellation_stops_remaining_tools_and_requests() {
    let provider = Arc::new(MockLlmProvider::new());
    provider.queue_turn(
        ScriptedTurn::tool_use("first", "slow", json!({}))
            .with_tool_use("second", "never", json!({})),
    );
    provider.queue_text("unreachable");
    let cancel = CancellationToken::new();
    let executor = Arc::new(RecordingExecutor::cancelling(cancel.clone()));

    let err = loop_with(&provider, &executor)
        .run_conversation_with_cancel(ask("go"), &actor(), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, AgenticLoopError::Cancelled));
    // The in-flight call ran to completion; nothing started afterwards.
    let calls = executor.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "slow");
    assert_eq!(provider.request_count(), 1);
}

#[tokio::test]
async fn dropped_receiver_cancels_the_conversation() {
    let provider = Arc::new(MockLlmProvider::new());
    provider.repeat_forever(ScriptedTurn::tool_use("again", "poll", json!({})).with_text_prefix("tick "));
    let executor = Arc::new(RecordingExecutor::default());
    let agentic_loop = loop_with(&provider, &executor);

    let (tx, mut rx) = tokio::sync::mpsc::channel(1);
    let task = tokio::spawn(async move {
        agentic_loop
            .stream_conversation_into(ask("go"), &actor(), &CancellationToken::new(), tx)
            .await
    });

    assert_eq!(rx.recv().await, Some(ConversationEvent::Text("tick ".to_string())));
    drop(rx);

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, AgenticLoopError::Cancelled));
    assert_eq!(executor.calls().len(), 1);
    assert_eq!(provider.request_count(), 1);
}

#[tokio::test]
async fn malformed_streamed_input_is_never_executed() {
    let provider = Arc::new(MockLlmProvider::new());
    provider.queue_events(vec![
        StreamEvent::TextDelta {
            text: "Let me check. ".to_string(),
        },
        StreamEvent::ToolCallStart {
            id: "t1".to_string(),
            name: "lookup".to_string(),
        },
        StreamEvent::ToolCallDelta {
            id: "t1".to_string(),
            partial_json: "{\"query\": \"ac".to_string(),
        },
        StreamEvent::ToolCallEnd {
            id: "t1".to_string(),
        },
        StreamEvent::MessageEnd {
            stop_reason: StopReason::ToolUse,
        },
    ]);
    provider.queue_text("I could not run that.");
    let executor = Arc::new(RecordingExecutor::default());

    let outcome = loop_with(&provider, &executor)
        .stream_conversation(ask("x"), actor(), CancellationToken::new())
        .finish()
        .await
        .unwrap();

    assert!(executor.calls().is_empty());
    let results = tool_results(&outcome.messages[2]);
    assert!(results[0].2);
    assert!(results[0].1.contains("invalid tool input"));
    assert_eq!(outcome.text, "Let me check. I could not run that.");
}

#[tokio::test]
async fn crm_tools_end_to_end_with_notices() {
    let store = Arc::new(InMemoryStore::new());
    let acme = store.add_client("tenant-1", "Acme Lending", None).await;
    let mut registry = ToolRegistry::new();
    register_crm_tools(&mut registry, store.clone()).unwrap();
    registry.register(EchoTool).unwrap();

    let provider = Arc::new(MockLlmProvider::new().with_fragment_size(5));
    provider.queue_turn(ScriptedTurn::tool_use("s1", "searchClients", json!({"query": "acme"})));
    provider.queue_turn(ScriptedTurn::tool_use(
        "c1",
        "createContact",
        json!({"clientId": acme.id.to_string(), "firstName": "Dana", "lastName": "Reyes"}),
    ));
    provider.queue_text("Added Dana Reyes to Acme Lending.");

    let agentic_loop = AgenticLoop::with_registry(
        provider.clone() as Arc<dyn ToolAwareLlmProvider>,
        Arc::new(registry),
    );
    let mut stream = agentic_loop.stream_conversation(
        ask("add Dana Reyes to Acme"),
        actor(),
        CancellationToken::new(),
    );
    let mut notices = Vec::new();
    while let Some(event) = stream.next().await {
        if let ConversationEvent::ToolNotice { tool, message } = event {
            notices.push((tool, message));
        }
    }
    let outcome = stream.finish().await.unwrap();

    assert_eq!(
        notices,
        vec![
            (
                "searchClients".to_string(),
                "Found 1 client(s) matching 'acme'".to_string()
            ),
            (
                "createContact".to_string(),
                "Created contact Dana Reyes for Acme Lending".to_string()
            ),
        ]
    );
    assert_eq!(outcome.text, "Added Dana Reyes to Acme Lending.");
    assert_eq!(outcome.tool_rounds, 2);
    let first_request = &provider.requests()[0];
    assert_eq!(first_request.tools.len(), 8);
}

#[tokio::test]
async fn unknown_tool_is_reported_to_the_model() {
    let provider = Arc::new(MockLlmProvider::new());
    provider.queue_turn(ScriptedTurn::tool_use("t1", "launchRocket", json!({})));
    provider.queue_text("I can't do that.");

    let agentic_loop = AgenticLoop::with_registry(
        provider.clone() as Arc<dyn ToolAwareLlmProvider>,
        Arc::new(ToolRegistry::new()),
    );
    let outcome = agentic_loop
        .run_conversation(ask("launch"), &actor())
        .await
        .unwrap();

    let results = tool_results(&outcome.messages[2]);
    assert!(results[0].2);
    assert!(results[0].1.contains("Unknown tool: launchRocket"));
}

#[tokio::test]
async fn unauthenticated_caller_never_reaches_the_model() {
    let resolver = StaticActorResolver::new().with_identity(
        "orphan",
        Identity {
            user_id: "u9".to_string(),
            email: None,
            tenant_id: None,
        },
    );

    let err = authorize(&resolver, "bogus").await.unwrap_err();
    assert!(matches!(err, AuthError::Unauthenticated));
    let err = authorize(&resolver, "orphan").await.unwrap_err();
    assert!(matches!(err, AuthError::NoTenant(_)));

    let loop_err: AgenticLoopError = err.into();
    assert!(matches!(loop_err, AgenticLoopError::Unauthorized(_)));
}
