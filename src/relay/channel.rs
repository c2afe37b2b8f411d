//! Client-facing push channel for one streaming session.
//!
//! Wraps the sending half of a buffered frame queue whose receiving half
//! feeds the client's SSE connection. Close hooks mirror the completion /
//! timeout / error callbacks of the HTTP layer: each fires at most once and
//! is expected to trigger registry cleanup. A watchdog force-closes the
//! channel if no completion happens within the idle timeout, so an attached
//! session can never outlive its budget silently.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::relay::codec;
use crate::relay::event::StreamEvent;
use crate::{AppError, Result};

/// One outbound SSE message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Initial handshake carrying the session id payload.
    Connect(String),
    /// One encoded stream event.
    Chunk(String),
    /// End-of-stream sentinel; the SSE adapter stops at this frame.
    Close,
}

/// Why a channel was closed; selects which hook fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The orchestrator finished the session (successfully or after a
    /// delivered ERROR event).
    Completed,
    /// The idle watchdog fired before completion.
    Timeout,
    /// The session tore down on an unexpected failure.
    Error,
}

/// At-most-once close hook.
type Hook = Box<dyn FnOnce() + Send>;

/// Hooks plus the watchdog handle, all consumed on close.
#[derive(Default)]
struct HookSet {
    on_completion: Option<Hook>,
    on_timeout: Option<Hook>,
    on_error: Option<Hook>,
    watchdog: Option<JoinHandle<()>>,
}

/// Shared mutable channel state; `None` once closed.
type HookCell = Arc<Mutex<Option<HookSet>>>;

fn close_channel(session_id: &str, tx: &mpsc::Sender<Frame>, hooks: &HookCell, reason: CloseReason) {
    let taken = hooks
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    let Some(mut set) = taken else {
        // Already closed; later callers are no-ops.
        return;
    };

    // Best effort: tell the SSE adapter to stop. If the buffer is full or
    // the receiver is gone the stream ends when the senders drop.
    let _ = tx.try_send(Frame::Close);

    if let Some(watchdog) = set.watchdog.take() {
        watchdog.abort();
    }

    let hook = match reason {
        CloseReason::Completed => set.on_completion.take(),
        CloseReason::Timeout => set.on_timeout.take(),
        CloseReason::Error => set.on_error.take(),
    };
    if let Some(hook) = hook {
        hook();
    }
    debug!(session_id, ?reason, "client channel closed");
}

/// Sending half of one client push connection.
///
/// Clones share the same underlying connection and close state, so the
/// registry can hold a reference while the orchestrator owns the primary.
#[derive(Clone)]
pub struct ClientChannel {
    session_id: String,
    tx: mpsc::Sender<Frame>,
    hooks: HookCell,
}

impl ClientChannel {
    /// Create a channel and the frame stream feeding the SSE response.
    ///
    /// The idle watchdog starts immediately: if the channel is not closed
    /// within `idle_timeout` the timeout hook fires.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        capacity: usize,
        idle_timeout: Duration,
    ) -> (Self, ReceiverStream<Frame>) {
        let session_id = session_id.into();
        let (tx, rx) = mpsc::channel(capacity);
        let hooks: HookCell = Arc::new(Mutex::new(Some(HookSet::default())));

        let watchdog = tokio::spawn({
            let session_id = session_id.clone();
            let tx = tx.clone();
            let hooks = Arc::clone(&hooks);
            async move {
                tokio::time::sleep(idle_timeout).await;
                debug!(session_id, "idle watchdog fired");
                close_channel(&session_id, &tx, &hooks, CloseReason::Timeout);
            }
        });
        if let Some(set) = hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            set.watchdog = Some(watchdog);
        }

        (
            Self {
                session_id,
                tx,
                hooks,
            },
            ReceiverStream::new(rx),
        )
    }

    /// Session this channel belongs to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Register the hook fired when the session completes.
    pub fn on_completion(&self, hook: impl FnOnce() + Send + 'static) {
        self.set_hook(|set| set.on_completion = Some(Box::new(hook)));
    }

    /// Register the hook fired when the idle watchdog closes the channel.
    pub fn on_timeout(&self, hook: impl FnOnce() + Send + 'static) {
        self.set_hook(|set| set.on_timeout = Some(Box::new(hook)));
    }

    /// Register the hook fired when the session tears down on failure.
    pub fn on_error(&self, hook: impl FnOnce() + Send + 'static) {
        self.set_hook(|set| set.on_error = Some(Box::new(hook)));
    }

    fn set_hook(&self, apply: impl FnOnce(&mut HookSet)) {
        if let Some(set) = self
            .hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            apply(set);
        }
    }

    /// Whether [`close`](Self::close) has already run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Push one encoded stream event to the client.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ChannelClosed` if the channel was closed or the
    /// peer disconnected; `AppError::Codec` if encoding fails.
    pub async fn send(&self, event: &StreamEvent) -> Result<()> {
        if self.is_closed() {
            return Err(AppError::ChannelClosed);
        }
        let data = codec::encode(event)?;
        self.tx
            .send(Frame::Chunk(data))
            .await
            .map_err(|_| AppError::ChannelClosed)
    }

    /// Push the initial `connect` handshake.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ChannelClosed` if the peer is already gone;
    /// `AppError::Codec` if encoding fails.
    pub async fn send_connect(&self) -> Result<()> {
        if self.is_closed() {
            return Err(AppError::ChannelClosed);
        }
        let data = codec::encode_connect(&self.session_id)?;
        self.tx
            .send(Frame::Connect(data))
            .await
            .map_err(|_| AppError::ChannelClosed)
    }

    /// Finalize the channel, firing the hook matching `reason`.
    ///
    /// Idempotent: only the first call has any effect, so the completion
    /// path, the watchdog, and explicit cancellation can all race on it
    /// safely.
    pub fn close(&self, reason: CloseReason) {
        close_channel(&self.session_id, &self.tx, &self.hooks, reason);
    }
}
