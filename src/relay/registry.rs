//! Streaming session registry.
//!
//! Single source of truth for "is this session still alive". Every live
//! session has exactly one entry mapping its id to the turn context, the
//! attached client channel (if any), and a cancellation token. Entries are
//! inserted when a turn starts, bound to a channel on attach, and removed
//! exactly once on terminal cleanup — `remove` is idempotent so the
//! completion path, the watchdog, and explicit cancellation can all race on
//! it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::relay::channel::{ClientChannel, CloseReason};
use crate::{AppError, Result};

/// How a session's reply should be produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// One blocking completion call, replayed token by token.
    Paced,
    /// Live upstream stream, polled and relayed.
    Upstream,
}

/// Lifecycle state of a session inside the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Turn started; no client channel bound yet.
    Created,
    /// Client channel bound; the orchestrator is (about to be) running.
    Attached,
}

/// Owning record for one chat turn.
///
/// Exclusively owned by the orchestrator once the session is attached; the
/// registry keeps a reference copy for lookup only and never writes the
/// accumulated content.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// User who initiated the turn.
    pub user_id: i64,
    /// Conversation the turn belongs to.
    pub conversation_id: i64,
    /// Id of the just-persisted USER message.
    pub user_message_id: i64,
    /// Text of the USER message, forwarded upstream as the prompt.
    pub prompt: String,
    /// Correlation id of the upstream stream; set once the upstream call is
    /// actually started.
    pub upstream_id: Option<String>,
    /// Assistant output accumulated so far.
    pub content: String,
    /// Reply production strategy for this turn.
    pub mode: StreamMode,
    /// Current lifecycle state.
    pub state: SessionState,
}

impl SessionContext {
    /// Context for a freshly started turn.
    #[must_use]
    pub fn new(
        user_id: i64,
        conversation_id: i64,
        user_message_id: i64,
        prompt: String,
        mode: StreamMode,
    ) -> Self {
        Self {
            user_id,
            conversation_id,
            user_message_id,
            prompt,
            upstream_id: None,
            content: String::new(),
            mode,
            state: SessionState::Created,
        }
    }
}

struct SessionEntry {
    context: SessionContext,
    channel: Option<ClientChannel>,
    cancel: CancellationToken,
    created_at: Instant,
}

/// Concurrent map from session id to live session state.
#[derive(Default)]
pub struct StreamSessionRegistry {
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl StreamSessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session, returning its id.
    pub async fn create(&self, context: SessionContext) -> String {
        let id = Uuid::new_v4().to_string();
        let entry = SessionEntry {
            context,
            channel: None,
            cancel: CancellationToken::new(),
            created_at: Instant::now(),
        };
        self.sessions.lock().await.insert(id.clone(), entry);
        debug!(session_id = %id, "session registered");
        id
    }

    /// Bind a client channel to an existing session.
    ///
    /// Returns the turn context (now owned by the caller's orchestrator) and
    /// the session's cancellation token.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionNotFound` if the id is unknown, expired, or
    /// already attached. This is a normal race (the client may connect before
    /// the turn was registered or after it was cleaned up); the caller
    /// reports it to the client as an ERROR event.
    pub async fn attach(
        &self,
        id: &str,
        channel: ClientChannel,
    ) -> Result<(SessionContext, CancellationToken)> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .get_mut(id)
            .ok_or_else(|| AppError::SessionNotFound(id.to_owned()))?;
        if entry.context.state != SessionState::Created {
            return Err(AppError::SessionNotFound(id.to_owned()));
        }
        entry.context.state = SessionState::Attached;
        entry.channel = Some(channel);
        debug!(session_id = %id, "client channel attached");
        Ok((entry.context.clone(), entry.cancel.clone()))
    }

    /// Non-mutating read of a session's context.
    pub async fn lookup(&self, id: &str) -> Option<SessionContext> {
        self.sessions
            .lock()
            .await
            .get(id)
            .map(|entry| entry.context.clone())
    }

    /// Record the upstream correlation id once the upstream call started.
    pub async fn set_upstream_id(&self, id: &str, upstream_id: &str) {
        if let Some(entry) = self.sessions.lock().await.get_mut(id) {
            entry.context.upstream_id = Some(upstream_id.to_owned());
        }
    }

    /// Remove a session, dropping its context and channel reference.
    ///
    /// Idempotent: removing an id that is already gone is a no-op.
    pub async fn remove(&self, id: &str) {
        if self.sessions.lock().await.remove(id).is_some() {
            debug!(session_id = %id, "session removed");
        }
    }

    /// Explicitly cancel a session: signal its orchestrator (and through it
    /// the upstream poller) and remove the entry.
    ///
    /// Returns whether the session was still live. Racing with natural
    /// completion is safe; both paths converge on the idempotent remove.
    pub async fn stop(&self, id: &str) -> bool {
        let entry = self.sessions.lock().await.remove(id);
        match entry {
            Some(entry) => {
                entry.cancel.cancel();
                if let Some(upstream_id) = entry.context.upstream_id.as_deref() {
                    debug!(session_id = %id, upstream_id, "session stopped");
                } else {
                    debug!(session_id = %id, "session stopped before upstream start");
                }
                true
            }
            None => false,
        }
    }

    /// Number of live sessions.
    pub async fn live_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Cancel every live session; used on server shutdown.
    ///
    /// Attached channels are closed so client streams end promptly instead
    /// of waiting out their idle timeout.
    pub async fn cancel_all(&self) {
        let mut sessions = self.sessions.lock().await;
        let count = sessions.len();
        for entry in sessions.values() {
            entry.cancel.cancel();
            if let Some(channel) = &entry.channel {
                channel.close(CloseReason::Error);
            }
        }
        sessions.clear();
        if count > 0 {
            info!(count, "cancelled all live sessions");
        }
    }

    /// Reap sessions that were created but never attached within the window.
    ///
    /// Returns the number of sessions removed.
    pub async fn sweep_unattached(&self, attach_window: Duration) -> usize {
        let mut sessions = self.sessions.lock().await;
        let now = Instant::now();
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, entry)| {
                entry.context.state == SessionState::Created
                    && now.duration_since(entry.created_at) >= attach_window
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            if let Some(entry) = sessions.remove(id) {
                entry.cancel.cancel();
                warn!(session_id = %id, "reaped session that was never attached");
            }
        }
        expired.len()
    }
}

/// Spawn the background reaper sweeping never-attached sessions.
///
/// Sweeps every `attach_window` until the token is cancelled.
pub fn spawn_reaper(
    registry: Arc<StreamSessionRegistry>,
    attach_window: Duration,
    ct: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = ct.cancelled() => break,
                () = tokio::time::sleep(attach_window) => {
                    let reaped = registry.sweep_unattached(attach_window).await;
                    if reaped > 0 {
                        debug!(reaped, "idle session sweep complete");
                    }
                }
            }
        }
    })
}
