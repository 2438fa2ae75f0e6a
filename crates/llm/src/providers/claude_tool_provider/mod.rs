//! Claude (Anthropic API) implementation of [`ToolAwareLlmProvider`].
//!
//! Supports batched and streaming tool use, translating between the Anthropic
//! Messages API format and the provider-agnostic [`StreamEvent`] / [`Message`] types.
//!
//! [`ToolAwareLlmProvider`]: crm_tool_runtime::ToolAwareLlmProvider
//! [`StreamEvent`]: crm_tool_runtime::StreamEvent
//! [`Message`]: crm_tool_runtime::Message

mod sse;
mod streaming;
mod translate;

pub use self::streaming::ClaudeToolProvider;
