use crate::accumulator::TurnAccumulator;
use crate::conversation::{ContentBlock, Message};
use crate::stream::{StopReason, StreamEvent};
use crate::tool::ToolDefinition;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send>>;

/// One request to the model provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    pub system_prompt: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A complete (non-streamed) model turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub stop_reason: StopReason,
    pub content: Vec<ContentBlock>,
}

/// Trait for LLM providers that support tool use, batched and streamed.
///
/// This trait lives in tool-runtime (not in crates/llm) because it's
/// defined by the consumer (the agentic loop), not the provider.
#[async_trait]
pub trait ToolAwareLlmProvider: Send + Sync {
    /// Stream a response from the LLM with tool definitions available.
    async fn stream_with_tools(&self, request: ModelRequest) -> Result<EventStream, LlmError>;

    /// Non-streaming turn. Defaults to draining `stream_with_tools`.
    async fn complete_with_tools(&self, request: ModelRequest) -> Result<ModelResponse, LlmError> {
        let stream = self.stream_with_tools(request).await?;
        collect_response(stream).await
    }

    /// Provider name for logging/debugging (e.g., "claude", "mock")
    fn provider_name(&self) -> &str;
}

/// Drain an event stream into a single response. Tool inputs must parse;
/// a provider that cannot deliver complete JSON has failed the call.
pub async fn collect_response(mut stream: EventStream) -> Result<ModelResponse, LlmError> {
    let mut acc = TurnAccumulator::new();
    while let Some(event) = stream.next().await {
        acc.apply(event?)?;
    }
    let turn = acc.finish()?;
    if let Some(bad) = turn.tool_calls.iter().find(|c| c.input.is_err()) {
        return Err(LlmError::InvalidResponse(format!(
            "tool_use '{}' carried unparseable input",
            bad.id
        )));
    }
    Ok(ModelResponse {
        stop_reason: turn.stop_reason,
        content: turn.message.content,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("Authentication failed")]
    AuthError,
    #[error("Stream error: {0}")]
    StreamError(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Scripted provider for testing the agentic loop without real API calls.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use futures::stream;
    use serde_json::Value;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// One scripted model turn, served as a response or as an event stream.
    #[derive(Debug, Clone)]
    pub struct ScriptedTurn {
        pub stop_reason: StopReason,
        pub content: Vec<ContentBlock>,
    }

    impl ScriptedTurn {
        pub fn text(text: &str) -> Self {
            Self {
                stop_reason: StopReason::EndTurn,
                content: vec![ContentBlock::text(text)],
            }
        }

        pub fn tool_use(id: &str, name: &str, input: Value) -> Self {
            Self {
                stop_reason: StopReason::ToolUse,
                content: vec![ContentBlock::ToolUse {
                    id: id.to_string(),
                    name: name.to_string(),
                    input,
                }],
            }
        }

        pub fn with_text_prefix(mut self, text: &str) -> Self {
            self.content.insert(0, ContentBlock::text(text));
            self
        }

        pub fn with_tool_use(mut self, id: &str, name: &str, input: Value) -> Self {
            self.content.push(ContentBlock::ToolUse {
                id: id.to_string(),
                name: name.to_string(),
                input,
            });
            self
        }
    }

    #[derive(Debug, Clone)]
    enum Script {
        Turn(ScriptedTurn),
        Events(Vec<StreamEvent>),
        Fail(String),
    }

    /// A mock provider that returns pre-configured turns in FIFO order.
    pub struct MockLlmProvider {
        script: Mutex<VecDeque<Script>>,
        repeat: Mutex<Option<ScriptedTurn>>,
        fragment_size: usize,
        requests: Mutex<Vec<ModelRequest>>,
    }

    impl MockLlmProvider {
        pub fn new() -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                repeat: Mutex::new(None),
                fragment_size: usize::MAX,
                requests: Mutex::new(Vec::new()),
            }
        }

        /// Split streamed text and tool JSON into fragments of `n` chars.
        pub fn with_fragment_size(mut self, n: usize) -> Self {
            self.fragment_size = n.max(1);
            self
        }

        /// Queue a turn that will be returned on the next call.
        pub fn queue_turn(&self, turn: ScriptedTurn) {
            self.script.lock().unwrap().push_back(Script::Turn(turn));
        }

        /// Queue a simple text response.
        pub fn queue_text(&self, text: &str) {
            self.queue_turn(ScriptedTurn::text(text));
        }

        /// Queue raw stream events (batched calls assemble them).
        pub fn queue_events(&self, events: Vec<StreamEvent>) {
            self.script.lock().unwrap().push_back(Script::Events(events));
        }

        /// Queue a provider failure.
        pub fn queue_failure(&self, message: &str) {
            self.script
                .lock()
                .unwrap()
                .push_back(Script::Fail(message.to_string()));
        }

        /// Serve `turn` forever once the queue is exhausted.
        pub fn repeat_forever(&self, turn: ScriptedTurn) {
            *self.repeat.lock().unwrap() = Some(turn);
        }

        /// Every request received so far.
        pub fn requests(&self) -> Vec<ModelRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn next_script(&self, request: ModelRequest) -> Script {
            self.requests.lock().unwrap().push(request);
            if let Some(script) = self.script.lock().unwrap().pop_front() {
                return script;
            }
            match self.repeat.lock().unwrap().clone() {
                Some(turn) => Script::Turn(turn),
                None => Script::Turn(ScriptedTurn {
                    stop_reason: StopReason::EndTurn,
                    content: Vec::new(),
                }),
            }
        }

        fn chunks(&self, s: &str) -> Vec<String> {
            let chars: Vec<char> = s.chars().collect();
            if chars.is_empty() {
                return Vec::new();
            }
            chars
                .chunks(self.fragment_size.min(chars.len()))
                .map(|c| c.iter().collect())
                .collect()
        }

        fn turn_to_events(&self, turn: &ScriptedTurn) -> Vec<StreamEvent> {
            let mut events = Vec::new();
            for block in &turn.content {
                match block {
                    ContentBlock::Text { text } => {
                        for text in self.chunks(text) {
                            events.push(StreamEvent::TextDelta { text });
                        }
                    }
                    ContentBlock::ToolUse { id, name, input } => {
                        events.push(StreamEvent::ToolCallStart {
                            id: id.clone(),
                            name: name.clone(),
                        });
                        for partial_json in self.chunks(&input.to_string()) {
                            events.push(StreamEvent::ToolCallDelta {
                                id: id.clone(),
                                partial_json,
                            });
                        }
                        events.push(StreamEvent::ToolCallEnd { id: id.clone() });
                    }
                    ContentBlock::ToolResult { .. } => {}
                }
            }
            events.push(StreamEvent::MessageEnd {
                stop_reason: turn.stop_reason,
            });
            events
        }
    }

    impl Default for MockLlmProvider {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl ToolAwareLlmProvider for MockLlmProvider {
        async fn stream_with_tools(&self, request: ModelRequest) -> Result<EventStream, LlmError> {
            let events = match self.next_script(request) {
                Script::Turn(turn) => self.turn_to_events(&turn),
                Script::Events(events) => events,
                Script::Fail(message) => return Err(LlmError::NetworkError(message)),
            };
            Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
        }

        async fn complete_with_tools(
            &self,
            request: ModelRequest,
        ) -> Result<ModelResponse, LlmError> {
            match self.next_script(request) {
                Script::Turn(turn) => Ok(ModelResponse {
                    stop_reason: turn.stop_reason,
                    content: turn.content,
                }),
                Script::Events(events) => {
                    collect_response(Box::pin(stream::iter(events.into_iter().map(Ok)))).await
                }
                Script::Fail(message) => Err(LlmError::NetworkError(message)),
            }
        }

        fn provider_name(&self) -> &str {
            "mock"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{MockLlmProvider, ScriptedTurn};
    use super::*;
    use serde_json::json;

    fn request() -> ModelRequest {
        ModelRequest {
            system_prompt: None,
            messages: vec![Message::user("hi")],
            tools: Vec::new(),
            temperature: 0.0,
            max_tokens: 100,
        }
    }

    #[tokio::test]
    async fn test_default_complete_collects_stream() {
        let provider = MockLlmProvider::new().with_fragment_size(3);
        provider.queue_turn(
            ScriptedTurn::tool_use("t1", "searchClients", json!({"query": "acme"}))
                .with_text_prefix("Let me look."),
        );

        let stream = provider.stream_with_tools(request()).await.unwrap();
        let response = collect_response(stream).await.unwrap();
        assert_eq!(response.stop_reason, StopReason::ToolUse);
        assert_eq!(response.content[0], ContentBlock::text("Let me look."));
        assert_eq!(
            response.content[1],
            ContentBlock::ToolUse {
                id: "t1".to_string(),
                name: "searchClients".to_string(),
                input: json!({"query": "acme"}),
            }
        );
    }

    #[tokio::test]
    async fn test_collect_rejects_unparseable_input() {
        let provider = MockLlmProvider::new();
        provider.queue_events(vec![
            StreamEvent::ToolCallStart {
                id: "t1".to_string(),
                name: "x".to_string(),
            },
            StreamEvent::ToolCallDelta {
                id: "t1".to_string(),
                partial_json: "{oops".to_string(),
            },
            StreamEvent::MessageEnd {
                stop_reason: StopReason::ToolUse,
            },
        ]);
        let err = provider.complete_with_tools(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_mock_records_requests_and_fails_on_demand() {
        let provider = MockLlmProvider::new();
        provider.queue_failure("connection reset");
        assert!(matches!(
            provider.complete_with_tools(request()).await,
            Err(LlmError::NetworkError(_))
        ));
        assert_eq!(provider.request_count(), 1);
        assert_eq!(provider.requests()[0].messages.len(), 1);
    }
}
