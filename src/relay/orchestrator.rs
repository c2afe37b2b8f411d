//! End-to-end driver for one streaming session.
//!
//! Owns the session lifecycle from the moment a client channel is attached:
//! announces the turn, builds the upstream request context, runs the chosen
//! source strategy, relays its events, persists the assistant reply exactly
//! once, and — regardless of how any of that went — closes the channel and
//! removes the session from the registry.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::models::message::ChatMessage;
use crate::relay::channel::{ClientChannel, CloseReason};
use crate::relay::event::StreamEvent;
use crate::relay::pacer::ResponsePacer;
use crate::relay::poller::UpstreamPoller;
use crate::relay::registry::{SessionContext, StreamMode, StreamSessionRegistry};
use crate::relay::{EventSource, MessageStore};
use crate::upstream::CompletionBackend;
use crate::{AppError, Result};

/// Merge one CONTENT payload into the accumulated buffer.
///
/// A snapshot extends the buffer seen so far and replaces it; anything else
/// is treated as a delta and appended. Both content conventions of the wire
/// protocol therefore accumulate to the full reply.
fn accumulate(buffer: &mut String, text: &str) {
    if text.len() >= buffer.len() && text.starts_with(buffer.as_str()) {
        buffer.clear();
        buffer.push_str(text);
    } else {
        buffer.push_str(text);
    }
}

/// Coordinator for streaming sessions.
///
/// One instance serves the whole process; each attached session runs
/// [`run`](Self::run) as its own task.
pub struct StreamOrchestrator {
    store: Arc<dyn MessageStore>,
    backend: Arc<dyn CompletionBackend>,
    registry: Arc<StreamSessionRegistry>,
    relay: RelayConfig,
    system_prompt: String,
}

impl StreamOrchestrator {
    /// Build the orchestrator over its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn MessageStore>,
        backend: Arc<dyn CompletionBackend>,
        registry: Arc<StreamSessionRegistry>,
        relay: RelayConfig,
        system_prompt: String,
    ) -> Self {
        Self {
            store,
            backend,
            registry,
            relay,
            system_prompt,
        }
    }

    /// Drive one attached session to its terminal state.
    ///
    /// Never returns an error: every failure inside the session is either
    /// delivered to the client as an ERROR event or logged, and the final
    /// cleanup (close the channel, remove the registry entry) runs on every
    /// path.
    pub async fn run(
        &self,
        session_id: &str,
        context: SessionContext,
        channel: ClientChannel,
        cancel: CancellationToken,
    ) {
        let outcome = self.drive(session_id, context, &channel, &cancel).await;
        match outcome {
            Ok(()) => channel.close(CloseReason::Completed),
            Err(AppError::ChannelClosed) => {
                // The peer is gone; there is nobody left to report to.
                debug!(session_id, "client disconnected before completion");
                channel.close(CloseReason::Completed);
            }
            Err(err) => {
                error!(session_id, %err, "stream session failed");
                channel.close(CloseReason::Error);
            }
        }
        self.registry.remove(session_id).await;
    }

    /// Steps 1–5 of the session lifecycle; cleanup stays in [`run`](Self::run).
    async fn drive(
        &self,
        session_id: &str,
        mut context: SessionContext,
        channel: &ClientChannel,
        cancel: &CancellationToken,
    ) -> Result<()> {
        channel.send(&StreamEvent::Start).await?;

        let history = match self
            .store
            .fetch_recent(context.conversation_id, self.relay.history_limit)
            .await
        {
            Ok(history) => history,
            Err(err) => {
                warn!(session_id, %err, "history fetch failed");
                return self.report(channel, format!("failed to load history: {err}")).await;
            }
        };

        let mut source = match self
            .open_source(session_id, &mut context, &history, cancel)
            .await
        {
            Ok(source) => source,
            Err(err) => {
                warn!(session_id, %err, "could not open event source");
                return self.report(channel, err.to_string()).await;
            }
        };

        let mut terminal_seen = false;
        while let Some(event) = source.next_event().await {
            match &event {
                StreamEvent::Content(text) => accumulate(&mut context.content, text),
                StreamEvent::End(text) if !text.is_empty() => {
                    context.content.clear();
                    context.content.push_str(text);
                }
                _ => {}
            }
            terminal_seen = event.is_terminal();

            if matches!(event, StreamEvent::End(_)) {
                // The reply is complete whether or not the client is still
                // listening; persist before reacting to a dead peer.
                let delivery = channel.send(&event).await;
                self.persist_reply(session_id, &context).await;
                delivery?;
                break;
            }
            channel.send(&event).await?;
            if terminal_seen {
                break;
            }
        }

        if !terminal_seen {
            // The source was cancelled under us; a still-connected client
            // gets one final ERROR so its stream never just goes quiet.
            let _ = channel
                .send(&StreamEvent::Error("stream cancelled".into()))
                .await;
            debug!(session_id, "session cancelled before terminal event");
        }
        Ok(())
    }

    /// Deliver a session-scoped failure to the client as an ERROR event.
    async fn report(&self, channel: &ClientChannel, message: String) -> Result<()> {
        channel.send(&StreamEvent::Error(message)).await
    }

    /// Build the event source for this turn's strategy.
    async fn open_source(
        &self,
        session_id: &str,
        context: &mut SessionContext,
        history: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<Box<dyn EventSource>> {
        match context.mode {
            StreamMode::Upstream => {
                let poller = UpstreamPoller::start(
                    Arc::clone(&self.backend),
                    &context.prompt,
                    history,
                    &self.system_prompt,
                    self.relay.poll_interval(),
                    self.relay.stream_budget(),
                    cancel.clone(),
                )
                .await?;
                context.upstream_id = Some(poller.correlation_id().to_owned());
                self.registry
                    .set_upstream_id(session_id, poller.correlation_id())
                    .await;
                Ok(Box::new(poller))
            }
            StreamMode::Paced => {
                let text = self
                    .backend
                    .complete(&context.prompt, history, &self.system_prompt)
                    .await?;
                Ok(Box::new(ResponsePacer::new(
                    text,
                    self.relay.pacer_delay(),
                    cancel.clone(),
                )))
            }
        }
    }

    /// Persist the assistant reply and bump the conversation.
    ///
    /// Failures here are logged only: the terminal event already reached (or
    /// raced past) the client and the stream is not amended retroactively.
    async fn persist_reply(&self, session_id: &str, context: &SessionContext) {
        match self
            .store
            .persist_assistant(
                context.conversation_id,
                context.user_message_id,
                &context.content,
            )
            .await
        {
            Ok(message) => {
                if let Err(err) = self.store.touch_conversation(context.conversation_id).await {
                    warn!(session_id, %err, "failed to touch conversation");
                }
                info!(
                    session_id,
                    message_id = message.id,
                    "assistant reply persisted"
                );
            }
            Err(err) => {
                error!(session_id, %err, "failed to persist assistant reply");
            }
        }
    }
}
