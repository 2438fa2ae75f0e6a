use crate::tool::ToolCall;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One block of message content, tagged the way the Messages API tags it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }
}

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::text(text)],
        }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    /// Concatenation of all text blocks, in order.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Tool-use blocks of this message, in emission order.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                }),
                _ => None,
            })
            .collect()
    }
}

/// Violations of the tool-use / tool-result pairing rule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    #[error("tool round must start with an assistant turn")]
    NotAssistantTurn,
    #[error("assistant turn requested no tools")]
    NoToolUse,
    #[error("tool result turn may only contain tool_result blocks")]
    UnexpectedBlock,
    #[error("missing tool_result for tool_use '{0}'")]
    MissingResult(String),
    #[error("duplicate tool_result for tool_use '{0}'")]
    DuplicateResult(String),
    #[error("tool_result references unknown tool_use '{0}'")]
    UnknownToolUse(String),
}

/// Append-only message history owned by one in-flight conversation.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    /// System prompt (sent alongside, never part of `messages`)
    system_prompt: Option<String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from caller-supplied prior turns.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn add_user_message(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
    }

    /// Append an assistant turn that ends the exchange (no tool results follow).
    pub fn add_assistant_response(&mut self, content: Vec<ContentBlock>) {
        self.messages.push(Message::assistant(content));
    }

    /// Append an assistant turn together with the user turn answering its
    /// tool calls. Nothing is appended unless every tool-use id is answered
    /// exactly once.
    pub fn add_tool_round(
        &mut self,
        assistant: Message,
        results: Vec<ContentBlock>,
    ) -> Result<(), HistoryError> {
        validate_tool_round(&assistant, &results)?;
        self.messages.push(assistant);
        self.messages.push(Message {
            role: Role::User,
            content: results,
        });
        Ok(())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Check that `results` answers every tool use of `assistant` exactly once.
/// Order is free; completeness is not.
pub fn validate_tool_round(
    assistant: &Message,
    results: &[ContentBlock],
) -> Result<(), HistoryError> {
    if assistant.role != Role::Assistant {
        return Err(HistoryError::NotAssistantTurn);
    }

    let requested: HashSet<&str> = assistant
        .content
        .iter()
        .filter_map(|b| match b {
            ContentBlock::ToolUse { id, .. } => Some(id.as_str()),
            _ => None,
        })
        .collect();
    if requested.is_empty() {
        return Err(HistoryError::NoToolUse);
    }

    let mut answered: HashSet<&str> = HashSet::with_capacity(results.len());
    for block in results {
        let ContentBlock::ToolResult { tool_use_id, .. } = block else {
            return Err(HistoryError::UnexpectedBlock);
        };
        if !requested.contains(tool_use_id.as_str()) {
            return Err(HistoryError::UnknownToolUse(tool_use_id.clone()));
        }
        if !answered.insert(tool_use_id.as_str()) {
            return Err(HistoryError::DuplicateResult(tool_use_id.clone()));
        }
    }

    // Report the first unanswered id in emission order.
    for block in &assistant.content {
        if let ContentBlock::ToolUse { id, .. } = block {
            if !answered.contains(id.as_str()) {
                return Err(HistoryError::MissingResult(id.clone()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_use(id: &str) -> ContentBlock {
        ContentBlock::ToolUse {
            id: id.to_string(),
            name: "searchClients".to_string(),
            input: serde_json::json!({"query": "acme"}),
        }
    }

    fn result(id: &str) -> ContentBlock {
        ContentBlock::ToolResult {
            tool_use_id: id.to_string(),
            content: r#"{"success":true}"#.to_string(),
            is_error: false,
        }
    }

    #[test]
    fn test_conversation_basic() {
        let mut conv = Conversation::new().with_system_prompt("be helpful");
        conv.add_user_message("Hello");
        conv.add_assistant_response(vec![ContentBlock::text("Hi there!")]);

        assert_eq!(conv.len(), 2);
        assert_eq!(conv.system_prompt(), Some("be helpful"));
        assert_eq!(conv.messages()[1].text(), "Hi there!");
    }

    #[test]
    fn test_tool_round_results_in_any_order() {
        let mut conv = Conversation::from_messages(vec![Message::user("find acme")]);
        let assistant = Message::assistant(vec![
            ContentBlock::text("Looking."),
            tool_use("t1"),
            tool_use("t2"),
        ]);
        conv.add_tool_round(assistant, vec![result("t2"), result("t1")])
            .unwrap();

        assert_eq!(conv.len(), 3);
        assert_eq!(conv.messages()[2].role, Role::User);
        assert_eq!(conv.messages()[1].tool_calls().len(), 2);
    }

    #[test]
    fn test_partial_result_set_is_rejected() {
        let mut conv = Conversation::new();
        let assistant = Message::assistant(vec![tool_use("t1"), tool_use("t2")]);
        let err = conv
            .add_tool_round(assistant, vec![result("t1")])
            .unwrap_err();
        assert_eq!(err, HistoryError::MissingResult("t2".to_string()));
        assert!(conv.is_empty());
    }

    #[test]
    fn test_duplicate_and_unknown_results_are_rejected() {
        let assistant = Message::assistant(vec![tool_use("t1")]);
        assert_eq!(
            validate_tool_round(&assistant, &[result("t1"), result("t1")]),
            Err(HistoryError::DuplicateResult("t1".to_string()))
        );
        assert_eq!(
            validate_tool_round(&assistant, &[result("t9")]),
            Err(HistoryError::UnknownToolUse("t9".to_string()))
        );
        assert_eq!(
            validate_tool_round(&assistant, &[result("t1"), ContentBlock::text("hi")]),
            Err(HistoryError::UnexpectedBlock)
        );
    }

    #[test]
    fn test_round_without_tool_use_is_rejected() {
        let assistant = Message::assistant(vec![ContentBlock::text("done")]);
        assert_eq!(
            validate_tool_round(&assistant, &[]),
            Err(HistoryError::NoToolUse)
        );
        assert_eq!(
            validate_tool_round(&Message::user("x"), &[]),
            Err(HistoryError::NotAssistantTurn)
        );
    }

    #[test]
    fn test_content_block_wire_format() {
        let json = serde_json::to_value(result("t1")).unwrap();
        assert_eq!(json["type"], "tool_result");
        assert_eq!(json["tool_use_id"], "t1");

        let msg: Message = serde_json::from_value(serde_json::json!({
            "role": "assistant",
            "content": [
                {"type": "text", "text": "a"},
                {"type": "tool_use", "id": "t1", "name": "x", "input": {}}
            ]
        }))
        .unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.tool_calls()[0].id, "t1");
    }
}
