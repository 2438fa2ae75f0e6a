//! Translation between provider-agnostic conversation types and the Claude API format.

use serde_json::{json, Value};

use crm_tool_runtime::{
    conversation::{ContentBlock, Message, Role},
    provider::{LlmError, ModelRequest, ModelResponse},
    stream::StopReason,
    tool::ToolDefinition,
};

/// Translate a [`ToolDefinition`] into the Claude API tool format.
pub(super) fn tool_definition_to_claude(tool: &ToolDefinition) -> Value {
    json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.input_schema,
    })
}

fn block_to_claude(block: &ContentBlock) -> Value {
    match block {
        ContentBlock::Text { text } => json!({"type": "text", "text": text}),
        ContentBlock::ToolUse { id, name, input } => json!({
            "type": "tool_use",
            "id": id,
            "name": name,
            "input": input,
        }),
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => json!({
            "type": "tool_result",
            "tool_use_id": tool_use_id,
            "content": content,
            "is_error": is_error,
        }),
    }
}

/// Translate a [`Message`] into a Claude API message object.
///
/// A user turn holding a single text block is sent as a plain string.
pub(super) fn message_to_claude(msg: &Message) -> Value {
    let role = match msg.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    if let (Role::User, [ContentBlock::Text { text }]) = (msg.role, msg.content.as_slice()) {
        return json!({"role": role, "content": text});
    }
    json!({
        "role": role,
        "content": msg.content.iter().map(block_to_claude).collect::<Vec<_>>(),
    })
}

/// Full `/v1/messages` request body.
pub(super) fn request_body(model: &str, request: &ModelRequest, stream: bool) -> Value {
    let mut body = json!({
        "model": model,
        "messages": request.messages.iter().map(message_to_claude).collect::<Vec<_>>(),
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
    });
    if stream {
        body["stream"] = json!(true);
    }
    if !request.tools.is_empty() {
        body["tools"] = json!(request
            .tools
            .iter()
            .map(tool_definition_to_claude)
            .collect::<Vec<_>>());
    }
    if let Some(system) = &request.system_prompt {
        body["system"] = json!(system);
    }
    body
}

/// Parse a non-streamed Messages API response.
pub(super) fn parse_response(body: &Value) -> Result<ModelResponse, LlmError> {
    let blocks = body["content"]
        .as_array()
        .ok_or_else(|| LlmError::InvalidResponse("response has no content array".to_string()))?;

    let mut content = Vec::with_capacity(blocks.len());
    for block in blocks {
        match block["type"].as_str() {
            Some("text") => content.push(ContentBlock::Text {
                text: block["text"].as_str().unwrap_or_default().to_string(),
            }),
            Some("tool_use") => {
                let id = block["id"].as_str().ok_or_else(|| {
                    LlmError::InvalidResponse("tool_use block without id".to_string())
                })?;
                content.push(ContentBlock::ToolUse {
                    id: id.to_string(),
                    name: block["name"].as_str().unwrap_or_default().to_string(),
                    input: match &block["input"] {
                        Value::Null => json!({}),
                        input => input.clone(),
                    },
                });
            }
            _ => {}
        }
    }

    Ok(ModelResponse {
        stop_reason: StopReason::from_api(body["stop_reason"].as_str()),
        content,
    })
}
