//! Per-stream assembly of an assistant turn from incremental events.
//!
//! Text is handed straight back to the caller for forwarding. Tool input JSON
//! is only buffered here and parsed once the turn has stopped.

use std::collections::HashMap;

use serde_json::Value;
use tracing::trace;

use crate::conversation::{ContentBlock, Message};
use crate::provider::LlmError;
use crate::stream::{StopReason, StreamEvent};

/// Raw input fragments of one tool-use block.
#[derive(Debug, Clone)]
pub struct ToolCallAccumulator {
    pub id: String,
    pub name: String,
    partial_json: String,
}

impl ToolCallAccumulator {
    fn new(id: String, name: String) -> Self {
        Self {
            id,
            name,
            partial_json: String::new(),
        }
    }

    fn push(&mut self, fragment: &str) {
        self.partial_json.push_str(fragment);
    }

    /// Parse the buffered input. A block that received no fragments is an
    /// empty argument object.
    pub fn parse(&self) -> Result<Value, serde_json::Error> {
        if self.partial_json.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_str(&self.partial_json)
    }
}

#[derive(Debug)]
enum PendingBlock {
    Text(String),
    ToolUse(usize),
}

/// A tool call whose input may have failed to parse.
#[derive(Debug, Clone)]
pub struct PendingToolCall {
    pub id: String,
    pub name: String,
    pub input: Result<Value, String>,
}

/// A fully received assistant turn.
#[derive(Debug, Clone)]
pub struct AssembledTurn {
    pub stop_reason: StopReason,
    /// Assistant message as it goes into the history. Unparseable tool inputs
    /// are recorded as `{}`.
    pub message: Message,
    pub tool_calls: Vec<PendingToolCall>,
}

/// Assembles one streamed response. Lives for exactly one stream.
#[derive(Debug, Default)]
pub struct TurnAccumulator {
    blocks: Vec<PendingBlock>,
    tools: Vec<ToolCallAccumulator>,
    by_id: HashMap<String, usize>,
    stop_reason: Option<StopReason>,
}

impl TurnAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one event. Returns a text fragment that should be forwarded now.
    pub fn apply(&mut self, event: StreamEvent) -> Result<Option<String>, LlmError> {
        match event {
            StreamEvent::TextDelta { text } => {
                if text.is_empty() {
                    return Ok(None);
                }
                match self.blocks.last_mut() {
                    Some(PendingBlock::Text(buf)) => buf.push_str(&text),
                    _ => self.blocks.push(PendingBlock::Text(text.clone())),
                }
                Ok(Some(text))
            }
            StreamEvent::ToolCallStart { id, name } => {
                if self.by_id.contains_key(&id) {
                    return Err(LlmError::InvalidResponse(format!(
                        "tool_use block '{id}' started twice"
                    )));
                }
                let slot = self.tools.len();
                self.by_id.insert(id.clone(), slot);
                self.tools.push(ToolCallAccumulator::new(id, name));
                self.blocks.push(PendingBlock::ToolUse(slot));
                Ok(None)
            }
            StreamEvent::ToolCallDelta { id, partial_json } => {
                let slot = *self.by_id.get(&id).ok_or_else(|| {
                    LlmError::InvalidResponse(format!("input delta for undeclared tool_use '{id}'"))
                })?;
                trace!(tool_use_id = %id, bytes = partial_json.len(), "buffering tool input");
                self.tools[slot].push(&partial_json);
                Ok(None)
            }
            StreamEvent::ToolCallEnd { .. } => Ok(None),
            StreamEvent::MessageEnd { stop_reason } => {
                self.stop_reason = Some(stop_reason);
                Ok(None)
            }
            StreamEvent::Error { message } => Err(LlmError::StreamError(message)),
        }
    }

    /// Close the turn. Fails if the stream never reported a stop.
    pub fn finish(self) -> Result<AssembledTurn, LlmError> {
        let stop_reason = self.stop_reason.ok_or_else(|| {
            LlmError::StreamError("stream ended before message_stop".to_string())
        })?;

        let tool_calls: Vec<PendingToolCall> = self
            .tools
            .iter()
            .map(|acc| PendingToolCall {
                id: acc.id.clone(),
                name: acc.name.clone(),
                input: acc.parse().map_err(|e| e.to_string()),
            })
            .collect();

        let content = self
            .blocks
            .into_iter()
            .map(|block| match block {
                PendingBlock::Text(text) => ContentBlock::Text { text },
                PendingBlock::ToolUse(slot) => {
                    let call = &tool_calls[slot];
                    ContentBlock::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: call
                            .input
                            .clone()
                            .unwrap_or_else(|_| Value::Object(Default::default())),
                    }
                }
            })
            .collect();

        Ok(AssembledTurn {
            stop_reason,
            message: Message::assistant(content),
            tool_calls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn start(id: &str, name: &str) -> StreamEvent {
        StreamEvent::ToolCallStart {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    fn delta(id: &str, json: &str) -> StreamEvent {
        StreamEvent::ToolCallDelta {
            id: id.to_string(),
            partial_json: json.to_string(),
        }
    }

    fn end(stop_reason: StopReason) -> StreamEvent {
        StreamEvent::MessageEnd { stop_reason }
    }

    #[test]
    fn test_text_is_forwarded_and_merged() {
        let mut acc = TurnAccumulator::new();
        for part in ["Found ", "acme", "."] {
            let forwarded = acc
                .apply(StreamEvent::TextDelta {
                    text: part.to_string(),
                })
                .unwrap();
            assert_eq!(forwarded.as_deref(), Some(part));
        }
        acc.apply(end(StopReason::EndTurn)).unwrap();

        let turn = acc.finish().unwrap();
        assert_eq!(turn.message.content, vec![ContentBlock::text("Found acme.")]);
        assert!(turn.tool_calls.is_empty());
    }

    #[test]
    fn test_interleaved_tool_blocks_keyed_by_id() {
        let mut acc = TurnAccumulator::new();
        acc.apply(StreamEvent::TextDelta {
            text: "Checking.".to_string(),
        })
        .unwrap();
        acc.apply(start("t1", "searchClients")).unwrap();
        acc.apply(start("t2", "getAllCards")).unwrap();
        acc.apply(delta("t2", "{\"limit\":")).unwrap();
        acc.apply(delta("t1", "{\"query\":\"ac")).unwrap();
        acc.apply(delta("t2", "5}")).unwrap();
        acc.apply(delta("t1", "me\"}")).unwrap();
        acc.apply(end(StopReason::ToolUse)).unwrap();

        let turn = acc.finish().unwrap();
        assert_eq!(turn.tool_calls.len(), 2);
        assert_eq!(turn.tool_calls[0].input, Ok(json!({"query": "acme"})));
        assert_eq!(turn.tool_calls[1].input, Ok(json!({"limit": 5})));
        assert_eq!(turn.message.content.len(), 3);
        assert_eq!(turn.message.tool_calls()[0].name, "searchClients");
    }

    #[test]
    fn test_malformed_input_is_kept_as_error() {
        let mut acc = TurnAccumulator::new();
        acc.apply(start("t1", "createCard")).unwrap();
        acc.apply(delta("t1", "{\"title\": ")).unwrap();
        acc.apply(end(StopReason::ToolUse)).unwrap();

        let turn = acc.finish().unwrap();
        assert!(turn.tool_calls[0].input.is_err());
        assert_eq!(turn.message.tool_calls()[0].input, json!({}));
    }

    #[test]
    fn test_tool_without_fragments_gets_empty_object() {
        let mut acc = TurnAccumulator::new();
        acc.apply(start("t1", "getAllCards")).unwrap();
        acc.apply(end(StopReason::ToolUse)).unwrap();
        assert_eq!(acc.finish().unwrap().tool_calls[0].input, Ok(json!({})));
    }

    #[test]
    fn test_missing_stop_is_a_stream_error() {
        let mut acc = TurnAccumulator::new();
        acc.apply(start("t1", "getAllCards")).unwrap();
        assert!(matches!(acc.finish(), Err(LlmError::StreamError(_))));
    }

    #[test]
    fn test_undeclared_delta_and_error_event() {
        let mut acc = TurnAccumulator::new();
        assert!(matches!(
            acc.apply(delta("ghost", "{}")),
            Err(LlmError::InvalidResponse(_))
        ));
        assert!(matches!(
            acc.apply(StreamEvent::Error {
                message: "Overloaded".to_string()
            }),
            Err(LlmError::StreamError(m)) if m == "Overloaded"
        ));
    }

    #[test]
    fn test_fragment_boundary_invariance() {
        let payload = r#"{"query":"acme \"west\"","limit":10,"filters":{"active":true,"tags":["lender","amc"]},"note":"ünïcödé"}"#;
        let expected: Value = serde_json::from_str(payload).unwrap();

        let boundaries: Vec<usize> = (0..=payload.len())
            .filter(|i| payload.is_char_boundary(*i))
            .collect();
        for &split in &boundaries {
            let mut acc = TurnAccumulator::new();
            acc.apply(start("t1", "searchClients")).unwrap();
            acc.apply(delta("t1", &payload[..split])).unwrap();
            acc.apply(delta("t1", &payload[split..])).unwrap();
            acc.apply(end(StopReason::ToolUse)).unwrap();
            let turn = acc.finish().unwrap();
            assert_eq!(turn.tool_calls[0].input.as_ref().unwrap(), &expected, "split at {split}");
        }

        // One fragment per character.
        let mut acc = TurnAccumulator::new();
        acc.apply(start("t1", "searchClients")).unwrap();
        for ch in payload.chars() {
            acc.apply(delta("t1", &ch.to_string())).unwrap();
        }
        acc.apply(end(StopReason::ToolUse)).unwrap();
        assert_eq!(acc.finish().unwrap().tool_calls[0].input.as_ref().unwrap(), &expected);
    }
}
