//! Polled relay of one live upstream stream.
//!
//! Owns one outbound streaming session against the AI backend: starts it,
//! then repeatedly fetches raw chunk payloads against the correlation id and
//! decodes them into stream events. The poll loop stops on the first
//! terminal record, on the wall-clock budget (synthesizing a timeout ERROR),
//! on any transport failure (synthesizing an ERROR), or on cooperative
//! cancellation (issuing a best-effort stop call upstream).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::models::message::ChatMessage;
use crate::relay::codec;
use crate::relay::event::StreamEvent;
use crate::relay::EventSource;
use crate::upstream::CompletionBackend;
use crate::Result;

/// Event source polling a live upstream stream.
pub struct UpstreamPoller {
    backend: Arc<dyn CompletionBackend>,
    correlation_id: String,
    poll_interval: Duration,
    deadline: Instant,
    budget: Duration,
    pending: VecDeque<StreamEvent>,
    cancel: CancellationToken,
    done: bool,
}

impl UpstreamPoller {
    /// Start the upstream stream and build a poller over it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UpstreamUnavailable` if the start-stream call
    /// fails.
    pub async fn start(
        backend: Arc<dyn CompletionBackend>,
        prompt: &str,
        history: &[ChatMessage],
        system_prompt: &str,
        poll_interval: Duration,
        budget: Duration,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let correlation_id = backend.start_stream(prompt, history, system_prompt).await?;
        debug!(%correlation_id, "upstream stream started");
        Ok(Self {
            backend,
            correlation_id,
            poll_interval,
            deadline: Instant::now() + budget,
            budget,
            pending: VecDeque::new(),
            cancel,
            done: false,
        })
    }

    /// Correlation id of the owned upstream stream.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Best-effort stop call after cooperative cancellation.
    async fn abandon(&self) {
        if let Err(err) = self.backend.stop_stream(&self.correlation_id).await {
            warn!(correlation_id = %self.correlation_id, %err, "upstream stop call failed");
        }
    }

    /// Take the next buffered event, marking the poller finished when it is
    /// terminal.
    fn pop_pending(&mut self) -> Option<StreamEvent> {
        let event = self.pending.pop_front()?;
        if event.is_terminal() {
            self.done = true;
            self.pending.clear();
        }
        Some(event)
    }
}

impl EventSource for UpstreamPoller {
    fn next_event(&mut self) -> BoxFuture<'_, Option<StreamEvent>> {
        Box::pin(async move {
            loop {
                if self.done {
                    return None;
                }
                if let Some(event) = self.pop_pending() {
                    return Some(event);
                }
                if self.cancel.is_cancelled() {
                    self.done = true;
                    self.abandon().await;
                    return None;
                }
                if Instant::now() >= self.deadline {
                    self.done = true;
                    return Some(StreamEvent::Error(format!(
                        "no terminal event from upstream within {}s",
                        self.budget.as_secs()
                    )));
                }

                let raw = match self.backend.fetch_chunk(&self.correlation_id).await {
                    Ok(raw) => raw,
                    Err(err) => {
                        self.done = true;
                        return Some(StreamEvent::Error(err.to_string()));
                    }
                };
                match codec::decode_payload(&raw) {
                    Ok(events) => {
                        // The orchestrator already announced the turn; a
                        // START record from upstream would duplicate it.
                        self.pending
                            .extend(events.into_iter().filter(|e| *e != StreamEvent::Start));
                    }
                    Err(err) => {
                        self.done = true;
                        return Some(StreamEvent::Error(err.to_string()));
                    }
                }

                if self.pending.is_empty() {
                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            self.done = true;
                            self.abandon().await;
                            return None;
                        }
                        () = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
            }
        })
    }
}
