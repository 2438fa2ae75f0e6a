//! [`ToolAwareLlmProvider`] trait implementation for the Claude Messages API.

use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, warn};

use crm_core::config::LlmConfig;
use crm_tool_runtime::{
    provider::{EventStream, LlmError, ModelRequest, ModelResponse, ToolAwareLlmProvider},
    stream::StreamEvent,
};

use super::sse::{EventMapper, SseDecoder};
use super::translate::{parse_response, request_body};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_RETRY_AFTER_SECS: u64 = 30;

/// Claude (Anthropic) provider with batched and streaming tool-use support.
///
/// Uses the Anthropic Messages API (`/v1/messages`). Streaming requests set
/// `stream: true` and emit incremental [`StreamEvent`]s for the agentic loop.
pub struct ClaudeToolProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl ClaudeToolProvider {
    /// Create a new Claude tool provider.
    ///
    /// # Arguments
    /// * `api_key` - Anthropic API key
    /// * `model` - Model name (e.g. `"claude-sonnet-4-5-20250929"`)
    /// * `base_url` - API base URL (e.g. `"https://api.anthropic.com"`)
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Build from the LLM section of the environment config.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .anthropic_api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| LlmError::Other(anyhow::anyhow!("ANTHROPIC_API_KEY not set")))?;
        Ok(Self::new(
            api_key,
            config.anthropic_model.clone(),
            config.anthropic_base_url.clone(),
        ))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, LlmError> {
        let url = format!("{}/v1/messages", self.base_url);
        debug!(model = %self.model, url = %url, "sending Claude request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            return Ok(response);
        }

        let retry_header = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body_text = response.text().await.unwrap_or_default();
        Err(status_error(status, retry_header, body_text))
    }
}

/// Map a non-2xx response to an [`LlmError`].
pub(super) fn status_error(status: u16, retry_after: Option<u64>, body: String) -> LlmError {
    match status {
        401 => LlmError::AuthError,
        429 => LlmError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        _ => {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(String::from))
                .unwrap_or(body);
            warn!(status, %message, "Claude API returned an error");
            LlmError::ApiError { status, message }
        }
    }
}

type ByteStream = Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>;

struct SseState<S> {
    bytes: S,
    decoder: SseDecoder,
    mapper: EventMapper,
    pending: VecDeque<StreamEvent>,
    done: bool,
}

/// Turn a byte stream into [`StreamEvent`]s, preserving order.
pub(super) fn events_from_bytes<S, E>(bytes: S) -> EventStream
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + Unpin + 'static,
    E: std::fmt::Display,
{
    let state = SseState {
        bytes,
        decoder: SseDecoder::new(),
        mapper: EventMapper::new(),
        pending: VecDeque::new(),
        done: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }
            if state.done {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    for frame in state.decoder.push(&chunk) {
                        let events = state.mapper.map(&frame);
                        state.pending.extend(events);
                    }
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(LlmError::StreamError(e.to_string())), state));
                }
                None => {
                    state.done = true;
                    if let Some(frame) = state.decoder.finish() {
                        let events = state.mapper.map(&frame);
                        state.pending.extend(events);
                    }
                }
            }
        }
    }))
}

#[async_trait]
impl ToolAwareLlmProvider for ClaudeToolProvider {
    async fn stream_with_tools(&self, request: ModelRequest) -> Result<EventStream, LlmError> {
        let body = request_body(&self.model, &request, true);
        let response = self.post(&body).await?;
        let bytes: ByteStream = Box::pin(response.bytes_stream());
        Ok(events_from_bytes(bytes))
    }

    async fn complete_with_tools(&self, request: ModelRequest) -> Result<ModelResponse, LlmError> {
        let body = request_body(&self.model, &request, false);
        let response = self.post(&body).await?;
        let json: Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        parse_response(&json)
    }

    fn provider_name(&self) -> &str {
        "claude"
    }
}
