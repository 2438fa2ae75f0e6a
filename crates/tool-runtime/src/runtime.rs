use crate::accumulator::PendingToolCall;
use crate::actor::{Actor, AuthError};
use crate::conversation::{ContentBlock, Conversation, HistoryError, Message};
use crate::executor::{RegistryExecutor, ToolExecutor};
use crate::provider::{LlmError, ModelRequest, ToolAwareLlmProvider};
use crate::registry::ToolRegistry;
use crate::stream::StopReason;
use crate::tool::ToolOutcome;
use crm_core::config::{AgentConfig, ToolExecutionMode, DEFAULT_MAX_TOOL_ROUNDS};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Envelope error sent back when accumulated tool JSON does not parse.
pub const INVALID_TOOL_INPUT: &str = "invalid tool input";

/// The core agentic loop that orchestrates LLM ↔ Tool execution.
///
/// Flow: User → LLM → ToolCalls → Execute → Results → LLM → ... → Final Text
///
/// Cloning is cheap; clones share provider, registry and executor but no
/// per-request state.
#[derive(Clone)]
pub struct AgenticLoop {
    pub(crate) provider: Arc<dyn ToolAwareLlmProvider>,
    pub(crate) registry: Arc<ToolRegistry>,
    pub(crate) executor: Arc<dyn ToolExecutor>,
    pub(crate) max_tool_rounds: usize,
    pub(crate) execution_mode: ToolExecutionMode,
    temperature: f32,
    max_tokens: u32,
}

/// How a conversation request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The model stopped asking for tools.
    Completed(StopReason),
    /// The tool-round ceiling was reached while the model still wanted tools.
    IterationCap,
}

/// Final state of one conversation request.
#[derive(Debug, Clone)]
pub struct ConversationOutcome {
    /// All assistant text produced during the request, in order. May be empty.
    pub text: String,
    pub termination: Termination,
    /// Tool-executing rounds performed.
    pub tool_rounds: usize,
    /// History including every turn appended during the request.
    pub messages: Vec<Message>,
}

impl AgenticLoop {
    pub fn new(
        provider: Arc<dyn ToolAwareLlmProvider>,
        registry: Arc<ToolRegistry>,
        executor: Arc<dyn ToolExecutor>,
    ) -> Self {
        Self {
            provider,
            registry,
            executor,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            execution_mode: ToolExecutionMode::Sequential,
            temperature: 0.3,
            max_tokens: 1500,
        }
    }

    /// Loop whose executor dispatches straight to `registry`.
    pub fn with_registry(provider: Arc<dyn ToolAwareLlmProvider>, registry: Arc<ToolRegistry>) -> Self {
        let executor = Arc::new(RegistryExecutor::new(registry.clone()));
        Self::new(provider, registry, executor)
    }

    /// At least one round is always allowed.
    pub fn with_max_tool_rounds(mut self, max: usize) -> Self {
        self.max_tool_rounds = max.max(1);
        self
    }

    pub fn with_execution_mode(mut self, mode: ToolExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = temp;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = max;
        self
    }

    pub fn with_agent_config(self, config: &AgentConfig) -> Self {
        self.with_max_tool_rounds(config.max_tool_rounds)
            .with_execution_mode(config.tool_execution)
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run a conversation in batched mode until the model stops requesting
    /// tools or the tool-round ceiling is reached.
    pub async fn run_conversation(
        &self,
        conversation: Conversation,
        actor: &Actor,
    ) -> Result<ConversationOutcome, AgenticLoopError> {
        self.run_conversation_with_cancel(conversation, actor, &CancellationToken::new())
            .await
    }

    /// Batched mode, abandoned as soon as `cancel` fires. A tool call already
    /// running is allowed to finish; nothing is started afterwards.
    pub async fn run_conversation_with_cancel(
        &self,
        mut conversation: Conversation,
        actor: &Actor,
        cancel: &CancellationToken,
    ) -> Result<ConversationOutcome, AgenticLoopError> {
        let mut text = String::new();
        let mut tool_rounds = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(AgenticLoopError::Cancelled);
            }
            debug!(iteration = tool_rounds, "Starting agentic loop iteration");

            let request = self.request_for(&conversation);
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgenticLoopError::Cancelled),
                response = self.provider.complete_with_tools(request) => response?,
            };

            let assistant = Message::assistant(response.content);
            text.push_str(&assistant.text());

            if response.stop_reason == StopReason::Error {
                return Err(AgenticLoopError::ModelError(assistant.text()));
            }

            let calls = assistant.tool_calls();
            if response.stop_reason != StopReason::ToolUse || calls.is_empty() {
                info!(
                    iteration = tool_rounds,
                    stop_reason = %response.stop_reason,
                    "Agentic loop complete"
                );
                if !calls.is_empty() {
                    warn!(
                        count = calls.len(),
                        stop_reason = %response.stop_reason,
                        "Dropping tool calls from a turn that did not stop for tool use"
                    );
                }
                let content = without_tool_uses(assistant.content);
                if !content.is_empty() {
                    conversation.add_assistant_response(content);
                }
                return Ok(ConversationOutcome {
                    text,
                    termination: Termination::Completed(response.stop_reason),
                    tool_rounds,
                    messages: conversation.into_messages(),
                });
            }

            let pending: Vec<PendingToolCall> = calls
                .into_iter()
                .map(|c| PendingToolCall {
                    id: c.id,
                    name: c.name,
                    input: Ok(c.input),
                })
                .collect();

            info!(count = pending.len(), "Executing tool calls");
            let outcomes = self.execute_tool_calls(&pending, actor, cancel).await?;
            conversation.add_tool_round(assistant, tool_result_blocks(&pending, &outcomes))?;
            tool_rounds += 1;

            if tool_rounds >= self.max_tool_rounds {
                warn!(tool_rounds, "Tool round ceiling reached, ending conversation");
                return Ok(ConversationOutcome {
                    text,
                    termination: Termination::IterationCap,
                    tool_rounds,
                    messages: conversation.into_messages(),
                });
            }
        }
    }

    pub(crate) fn request_for(&self, conversation: &Conversation) -> ModelRequest {
        ModelRequest {
            system_prompt: conversation.system_prompt().map(String::from),
            messages: conversation.messages().to_vec(),
            tools: self.registry.describe(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    /// Execute every call of one turn. Returns one outcome per call, in call
    /// order, or `Cancelled` if cancellation was observed before a call started.
    pub(crate) async fn execute_tool_calls(
        &self,
        calls: &[PendingToolCall],
        actor: &Actor,
        cancel: &CancellationToken,
    ) -> Result<Vec<ToolOutcome>, AgenticLoopError> {
        match self.execution_mode {
            ToolExecutionMode::Sequential => {
                let mut outcomes = Vec::with_capacity(calls.len());
                for call in calls {
                    if cancel.is_cancelled() {
                        info!(tool = %call.name, "Cancelled before tool execution");
                        return Err(AgenticLoopError::Cancelled);
                    }
                    outcomes.push(self.execute_one(call, actor).await);
                }
                Ok(outcomes)
            }
            ToolExecutionMode::Concurrent => {
                if cancel.is_cancelled() {
                    return Err(AgenticLoopError::Cancelled);
                }
                let futures = calls.iter().map(|call| self.execute_one(call, actor));
                Ok(futures::future::join_all(futures).await)
            }
        }
    }

    async fn execute_one(&self, call: &PendingToolCall, actor: &Actor) -> ToolOutcome {
        let outcome = match &call.input {
            Ok(input) => {
                info!(
                    tool = %call.name,
                    tool_use_id = %call.id,
                    input = %preview(&input.to_string()),
                    "Executing tool"
                );
                self.executor.execute(&call.name, input.clone(), actor).await
            }
            Err(parse_error) => {
                warn!(tool = %call.name, tool_use_id = %call.id, error = %parse_error, "Unparseable tool input");
                ToolOutcome::failed(INVALID_TOOL_INPUT)
            }
        };
        info!(
            tool = %call.name,
            success = outcome.success,
            result = %preview(&outcome.to_content()),
            "Tool finished"
        );
        outcome
    }
}

/// Pair each call with its outcome as `tool_result` blocks.
pub(crate) fn tool_result_blocks(
    calls: &[PendingToolCall],
    outcomes: &[ToolOutcome],
) -> Vec<ContentBlock> {
    calls
        .iter()
        .zip(outcomes)
        .map(|(call, outcome)| ContentBlock::ToolResult {
            tool_use_id: call.id.clone(),
            content: outcome.to_content(),
            is_error: !outcome.success,
        })
        .collect()
}

/// Strip `tool_use` blocks from a turn whose calls will never be answered,
/// so the returned history stays valid for the next request.
fn without_tool_uses(content: Vec<ContentBlock>) -> Vec<ContentBlock> {
    content
        .into_iter()
        .filter(|block| !matches!(block, ContentBlock::ToolUse { .. }))
        .collect()
}

/// First 200 chars, for log lines.
pub(crate) fn preview(s: &str) -> String {
    const LIMIT: usize = 200;
    match s.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgenticLoopError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
    #[error("Protocol violation: {0}")]
    Protocol(#[from] HistoryError),
    #[error("Model ended the turn with an error: {0}")]
    ModelError(String),
    #[error(transparent)]
    Unauthorized(#[from] AuthError),
    #[error("Conversation cancelled")]
    Cancelled,
    #[error("Conversation task failed: {0}")]
    TaskFailed(String),
}
