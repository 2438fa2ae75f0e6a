//! One user request through the agentic loop, with Ctrl-C cancellation.

use std::io::Write;

use anyhow::Result;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crm_tool_runtime::{
    Actor, AgenticLoop, AgenticLoopError, Conversation, ConversationEvent, ConversationOutcome,
    Message, Termination,
};

/// Answer `history` (ending in the new user message). Returns `None` when the
/// user cancelled; the caller keeps its previous history in that case.
pub async fn run_turn(
    agentic_loop: &AgenticLoop,
    history: Vec<Message>,
    system_prompt: &str,
    actor: &Actor,
    stream: bool,
) -> Result<Option<ConversationOutcome>> {
    let conversation = Conversation::from_messages(history).with_system_prompt(system_prompt);
    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("Ctrl-C received, cancelling request");
                cancel.cancel();
            }
        }
    });

    let result = if stream {
        stream_turn(agentic_loop, conversation, actor, cancel).await
    } else {
        let outcome = agentic_loop
            .run_conversation_with_cancel(conversation, actor, &cancel)
            .await;
        if let Ok(outcome) = &outcome {
            println!("{}", outcome.text);
        }
        outcome
    };
    interrupt.abort();

    match result {
        Ok(outcome) => {
            if outcome.termination == Termination::IterationCap {
                eprintln!(
                    "[stopped after {} tool rounds without a final answer]",
                    outcome.tool_rounds
                );
            }
            Ok(Some(outcome))
        }
        Err(AgenticLoopError::Cancelled) => {
            eprintln!("\n[cancelled]");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

async fn stream_turn(
    agentic_loop: &AgenticLoop,
    conversation: Conversation,
    actor: &Actor,
    cancel: CancellationToken,
) -> Result<ConversationOutcome, AgenticLoopError> {
    let mut events = agentic_loop.stream_conversation(conversation, actor.clone(), cancel);
    let mut stdout = std::io::stdout();
    while let Some(event) = events.next().await {
        match event {
            ConversationEvent::Text(fragment) => {
                print!("{fragment}");
            }
            ConversationEvent::ToolNotice { message, .. } => {
                print!("\n✓ {message}\n\n");
            }
        }
        stdout.flush().ok();
    }
    println!();
    events.finish().await
}
