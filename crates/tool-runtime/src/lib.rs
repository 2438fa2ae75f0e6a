pub mod accumulator;
pub mod actor;
pub mod conversation;
pub mod executor;
pub mod prompt;
pub mod provider;
pub mod registry;
pub mod runtime;
pub mod stream;
pub mod streaming;
pub mod tool;
pub mod tools;

pub use actor::{authorize, Actor, ActorResolver, AuthError, Identity, StaticActorResolver};
pub use conversation::{validate_tool_round, ContentBlock, Conversation, HistoryError, Message, Role};
pub use executor::{RegistryExecutor, ToolExecutor};
pub use prompt::SystemPrompt;
pub use provider::{EventStream, LlmError, ModelRequest, ModelResponse, ToolAwareLlmProvider};
pub use registry::{RegistryError, ToolRegistry};
pub use runtime::{AgenticLoop, AgenticLoopError, ConversationOutcome, Termination};
pub use stream::{StopReason, StreamEvent};
pub use streaming::{ConversationEvent, ConversationStream};
pub use tool::{Tool, ToolCall, ToolContext, ToolDefinition, ToolError, ToolOutcome, ToolOutput};
pub use tools::{register_crm_tools, CrmStore, InMemoryStore};
