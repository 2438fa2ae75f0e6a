//! SSE framing and Anthropic event mapping for the Claude streaming API.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{trace, warn};

use crm_tool_runtime::stream::{StopReason, StreamEvent};

/// One `event:` / `data:` frame of the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct SseFrame {
    pub event: String,
    pub data: String,
}

/// Splits raw response bytes into SSE frames.
///
/// Bytes are buffered until a full line is available, so a chunk boundary may
/// fall anywhere, including inside a multi-byte UTF-8 sequence.
#[derive(Debug, Default)]
pub(super) struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub(super) fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every frame it completed.
    pub(super) fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(frame) = self.feed_line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a trailing frame that was not followed by a blank line.
    pub(super) fn finish(&mut self) -> Option<SseFrame> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string();
            if let Some(frame) = self.feed_line(&line) {
                return Some(frame);
            }
        }
        self.dispatch()
    }

    fn feed_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        if self.event.is_none() && self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        let event = self.event.take().unwrap_or_else(|| "message".to_string());
        Some(SseFrame { event, data })
    }
}

#[derive(Debug, Clone)]
enum BlockKind {
    Text,
    ToolUse(String),
    Other,
}

/// Turns Anthropic stream events into provider-agnostic [`StreamEvent`]s.
///
/// Deltas and block stops only carry the content-block index; the mapper
/// remembers which tool-use id each index belongs to. One mapper per response.
#[derive(Debug, Default)]
pub(super) struct EventMapper {
    blocks: HashMap<u64, BlockKind>,
    stop_reason: Option<StopReason>,
}

impl EventMapper {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn map(&mut self, frame: &SseFrame) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        let parsed = || serde_json::from_str::<Value>(&frame.data).ok();

        match frame.event.as_str() {
            "content_block_start" => {
                let Some(parsed) = parsed() else { return events };
                let index = parsed["index"].as_u64().unwrap_or(0);
                let block = &parsed["content_block"];
                match block["type"].as_str() {
                    Some("text") => {
                        self.blocks.insert(index, BlockKind::Text);
                        if let Some(text) = block["text"].as_str().filter(|t| !t.is_empty()) {
                            events.push(StreamEvent::TextDelta {
                                text: text.to_string(),
                            });
                        }
                    }
                    Some("tool_use") => {
                        let id = block["id"].as_str().unwrap_or_default().to_string();
                        let name = block["name"].as_str().unwrap_or_default().to_string();
                        self.blocks.insert(index, BlockKind::ToolUse(id.clone()));
                        events.push(StreamEvent::ToolCallStart { id, name });
                    }
                    other => {
                        trace!(block_type = ?other, "ignoring content block");
                        self.blocks.insert(index, BlockKind::Other);
                    }
                }
            }
            "content_block_delta" => {
                let Some(parsed) = parsed() else { return events };
                let index = parsed["index"].as_u64().unwrap_or(0);
                let delta = &parsed["delta"];
                match delta["type"].as_str() {
                    Some("text_delta") => {
                        if let Some(text) = delta["text"].as_str() {
                            events.push(StreamEvent::TextDelta {
                                text: text.to_string(),
                            });
                        }
                    }
                    Some("input_json_delta") => {
                        let partial_json = delta["partial_json"].as_str().unwrap_or_default();
                        match self.blocks.get(&index) {
                            Some(BlockKind::ToolUse(id)) => events.push(StreamEvent::ToolCallDelta {
                                id: id.clone(),
                                partial_json: partial_json.to_string(),
                            }),
                            _ => warn!(index, "input_json_delta for a block that is not tool_use"),
                        }
                    }
                    _ => {}
                }
            }
            "content_block_stop" => {
                let Some(parsed) = parsed() else { return events };
                let index = parsed["index"].as_u64().unwrap_or(0);
                if let Some(BlockKind::ToolUse(id)) = self.blocks.get(&index) {
                    events.push(StreamEvent::ToolCallEnd { id: id.clone() });
                }
            }
            "message_delta" => {
                if let Some(parsed) = parsed() {
                    if let Some(reason) = parsed["delta"]["stop_reason"].as_str() {
                        self.stop_reason = Some(StopReason::from_api(Some(reason)));
                    }
                }
            }
            "message_stop" => {
                events.push(StreamEvent::MessageEnd {
                    stop_reason: self.stop_reason.unwrap_or(StopReason::EndTurn),
                });
            }
            "message_start" | "ping" => {}
            "error" => {
                let message = parsed()
                    .and_then(|v| v["error"]["message"].as_str().map(String::from))
                    .unwrap_or_else(|| frame.data.clone());
                events.push(StreamEvent::Error { message });
            }
            other => {
                trace!(event_type = other, "ignoring unknown SSE event type");
            }
        }

        events
    }
}
