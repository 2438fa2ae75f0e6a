use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::actor::Actor;

/// Describes a tool's interface for LLM consumption.
/// Maps to the Anthropic `tools` array entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name (e.g., "searchClients", "createCard")
    pub name: String,
    /// Human-readable description for the LLM
    pub description: String,
    /// JSON Schema describing the expected input
    pub input_schema: Value,
}

/// Represents an LLM requesting execution of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID for this invocation (used to match results)
    pub id: String,
    /// Tool name to execute
    pub name: String,
    /// JSON input arguments
    pub input: Value,
}

/// What a tool body hands back on success.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub data: Value,
    /// Short confirmation suitable for showing to the user.
    pub message: Option<String>,
}

impl ToolOutput {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Uniform result envelope returned by every tool execution.
///
/// This is what the model sees: the orchestrator serializes it verbatim as
/// the content of the matching `tool_result` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn succeeded(output: ToolOutput) -> Self {
        Self {
            success: true,
            data: Some(output.data),
            message: output.message,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: None,
            error: Some(error.into()),
        }
    }

    /// JSON text placed in the `tool_result` block.
    pub fn to_content(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"success":false,"error":"result serialization failed: {}"}}"#,
                e.to_string().replace('"', "'")
            )
        })
    }
}

/// Context passed to tool execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// The authenticated user on whose behalf the tool runs.
    pub actor: Actor,
}

/// The primary extension point: all tools implement this trait.
///
/// Tools are object-safe, Send + Sync, and async. Inputs arrive as raw JSON
/// and are deserialized into the tool's own parameter struct.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool's definition (name, description, JSON Schema).
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with the given JSON input.
    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolOutput, ToolError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
    #[error(transparent)]
    Store(#[from] crm_core::CrmError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ToolError {
    pub fn invalid_input(err: impl fmt::Display) -> Self {
        ToolError::InvalidInput(err.to_string())
    }
}

/// Deserialize a tool's raw JSON input into its typed parameters.
pub fn parse_input<T: serde::de::DeserializeOwned>(input: Value) -> Result<T, ToolError> {
    serde_json::from_value(input).map_err(ToolError::invalid_input)
}

/// Simple echo tool for testing purposes.
#[cfg(any(test, feature = "test-utils"))]
pub struct EchoTool;

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl Tool for EchoTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "echo".to_string(),
            description: "Echoes back the input message. For testing.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "message": {
                        "type": "string",
                        "description": "The message to echo back"
                    }
                },
                "required": ["message"]
            }),
        }
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolOutput, ToolError> {
        #[derive(Deserialize)]
        struct EchoInput {
            message: String,
        }
        let input: EchoInput = parse_input(input)?;
        Ok(ToolOutput::new(serde_json::json!({ "echo": input.message }))
            .with_message(format!("Echoed '{}'", input.message)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_context() -> ToolContext {
        ToolContext {
            actor: Actor::new("user-1", "tenant-1"),
        }
    }

    #[test]
    fn test_tool_definition_serialization() {
        let def = ToolDefinition {
            name: "test_tool".to_string(),
            description: "A test tool".to_string(),
            input_schema: serde_json::json!({"type": "object"}),
        };
        let json = serde_json::to_string(&def).unwrap();
        let roundtrip: ToolDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(roundtrip.name, "test_tool");
    }

    #[test]
    fn test_outcome_envelope_keeps_error_field() {
        let content = ToolOutcome::failed("X").to_content();
        let parsed: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["success"], false);
        assert_eq!(parsed["error"], "X");
        assert!(parsed.get("data").is_none());
    }

    #[test]
    fn test_outcome_envelope_success() {
        let outcome = ToolOutcome::succeeded(
            ToolOutput::new(serde_json::json!({"id": "123"})).with_message("Found it"),
        );
        let parsed: Value = serde_json::from_str(&outcome.to_content()).unwrap();
        assert_eq!(parsed["success"], true);
        assert_eq!(parsed["data"]["id"], "123");
        assert_eq!(parsed["message"], "Found it");
        assert!(parsed.get("error").is_none());
    }

    #[tokio::test]
    async fn test_echo_tool() {
        let tool = EchoTool;
        assert_eq!(tool.definition().name, "echo");

        let output = tool
            .execute(serde_json::json!({"message": "hello world"}), &test_context())
            .await
            .unwrap();
        assert_eq!(output.data["echo"], "hello world");
    }

    #[tokio::test]
    async fn test_echo_tool_rejects_wrong_shape() {
        let err = EchoTool
            .execute(serde_json::json!({"message": 42}), &test_context())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }
}
