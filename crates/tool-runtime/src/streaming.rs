//! Streaming driver: forwards text fragments as they arrive and resolves tool
//! calls once each turn has been fully received.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::accumulator::TurnAccumulator;
use crate::actor::Actor;
use crate::conversation::Conversation;
use crate::runtime::{
    tool_result_blocks, AgenticLoop, AgenticLoopError, ConversationOutcome, Termination,
};
use crate::stream::StopReason;

/// Shown when a successful tool returned no message of its own.
pub const DEFAULT_TOOL_NOTICE: &str = "Operation completed successfully";

const EVENT_BUFFER: usize = 64;

/// What the streaming driver pushes to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEvent {
    /// A piece of assistant text, in arrival order.
    Text(String),
    /// A tool finished successfully. Not part of the answer text.
    ToolNotice { tool: String, message: String },
}

impl AgenticLoop {
    /// Run a conversation in streaming mode, sending events to `events`.
    ///
    /// Dropping the receiving side counts as cancellation, as does `cancel`.
    pub async fn stream_conversation_into(
        &self,
        mut conversation: Conversation,
        actor: &Actor,
        cancel: &CancellationToken,
        events: mpsc::Sender<ConversationEvent>,
    ) -> Result<ConversationOutcome, AgenticLoopError> {
        let cancel = cancel.child_token();
        let watcher = {
            let cancel = cancel.clone();
            let events = events.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = events.closed() => {
                        debug!("Event receiver dropped, cancelling conversation");
                        cancel.cancel();
                    }
                    _ = cancel.cancelled() => {}
                }
            })
        };

        let result = self
            .drive_stream(&mut conversation, actor, &cancel, &events)
            .await;
        watcher.abort();

        let (text, termination, tool_rounds) = result?;
        Ok(ConversationOutcome {
            text,
            termination,
            tool_rounds,
            messages: conversation.into_messages(),
        })
    }

    /// Spawn a streaming conversation. Events are read from the returned
    /// handle, which also yields the final outcome.
    pub fn stream_conversation(
        &self,
        conversation: Conversation,
        actor: Actor,
        cancel: CancellationToken,
    ) -> ConversationStream {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let agentic_loop = self.clone();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            agentic_loop
                .stream_conversation_into(conversation, &actor, &task_cancel, tx)
                .await
        });
        ConversationStream {
            events: rx,
            task,
            cancel,
        }
    }

    async fn drive_stream(
        &self,
        conversation: &mut Conversation,
        actor: &Actor,
        cancel: &CancellationToken,
        events: &mpsc::Sender<ConversationEvent>,
    ) -> Result<(String, Termination, usize), AgenticLoopError> {
        let mut text = String::new();
        let mut tool_rounds = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(AgenticLoopError::Cancelled);
            }
            debug!(iteration = tool_rounds, "Starting streaming iteration");

            let request = self.request_for(conversation);
            let mut stream = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgenticLoopError::Cancelled),
                stream = self.provider.stream_with_tools(request) => stream?,
            };

            let mut acc = TurnAccumulator::new();
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(AgenticLoopError::Cancelled),
                    next = stream.next() => next,
                };
                let Some(event) = next else { break };
                let fragment = acc.apply(event?).inspect_err(|e| {
                    warn!(error = %e, "Stream failed mid-turn");
                })?;
                if let Some(fragment) = fragment {
                    text.push_str(&fragment);
                    emit(events, cancel, ConversationEvent::Text(fragment)).await?;
                }
            }

            let turn = acc.finish()?;
            if turn.stop_reason == StopReason::Error {
                return Err(AgenticLoopError::ModelError(turn.message.text()));
            }

            if turn.tool_calls.is_empty() {
                info!(
                    iteration = tool_rounds,
                    stop_reason = %turn.stop_reason,
                    "Streaming conversation complete"
                );
                conversation.add_assistant_response(turn.message.content);
                return Ok((text, Termination::Completed(turn.stop_reason), tool_rounds));
            }

            info!(count = turn.tool_calls.len(), "Executing streamed tool calls");
            let outcomes = self
                .execute_tool_calls(&turn.tool_calls, actor, cancel)
                .await?;

            for (call, outcome) in turn.tool_calls.iter().zip(&outcomes) {
                if !outcome.success {
                    continue;
                }
                let notice = ConversationEvent::ToolNotice {
                    tool: call.name.clone(),
                    message: outcome
                        .message
                        .clone()
                        .unwrap_or_else(|| DEFAULT_TOOL_NOTICE.to_string()),
                };
                emit(events, cancel, notice).await?;
            }

            let results = tool_result_blocks(&turn.tool_calls, &outcomes);
            conversation.add_tool_round(turn.message, results)?;
            tool_rounds += 1;

            if tool_rounds >= self.max_tool_rounds {
                warn!(tool_rounds, "Tool round ceiling reached, ending conversation");
                return Ok((text, Termination::IterationCap, tool_rounds));
            }
        }
    }
}

/// Send one event. A full buffer does not hold off cancellation.
async fn emit(
    events: &mpsc::Sender<ConversationEvent>,
    cancel: &CancellationToken,
    event: ConversationEvent,
) -> Result<(), AgenticLoopError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AgenticLoopError::Cancelled),
        sent = events.send(event) => sent.map_err(|_| AgenticLoopError::Cancelled),
    }
}

/// Handle to a spawned streaming conversation.
///
/// Yields [`ConversationEvent`]s as a [`Stream`]. Dropping it cancels the
/// conversation at its next suspension point.
pub struct ConversationStream {
    events: mpsc::Receiver<ConversationEvent>,
    task: JoinHandle<Result<ConversationOutcome, AgenticLoopError>>,
    cancel: CancellationToken,
}

impl ConversationStream {
    /// Receive the next event, or `None` once the conversation has ended.
    pub async fn next_event(&mut self) -> Option<ConversationEvent> {
        self.events.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Discard any unread events and wait for the final outcome.
    pub async fn finish(mut self) -> Result<ConversationOutcome, AgenticLoopError> {
        while self.events.recv().await.is_some() {}
        match (&mut self.task).await {
            Ok(result) => result,
            Err(e) => Err(AgenticLoopError::TaskFailed(e.to_string())),
        }
    }
}

impl Stream for ConversationStream {
    type Item = ConversationEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}
