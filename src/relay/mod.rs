//! Chat streaming relay.
//!
//! One relay session covers a single chat turn: a source strategy produces
//! [`StreamEvent`]s ([`UpstreamPoller`](poller::UpstreamPoller) against a live
//! upstream stream, or [`ResponsePacer`](pacer::ResponsePacer) over one
//! blocking completion), the [`StreamOrchestrator`](orchestrator::StreamOrchestrator)
//! relays them to the attached [`ClientChannel`](channel::ClientChannel), and
//! the [`StreamSessionRegistry`](registry::StreamSessionRegistry) tracks
//! liveness until terminal cleanup.

pub mod channel;
pub mod codec;
pub mod event;
pub mod orchestrator;
pub mod pacer;
pub mod poller;
pub mod registry;

use futures_util::future::BoxFuture;

use crate::models::message::ChatMessage;
use crate::Result;

use event::StreamEvent;

/// Narrow persistence interface the relay consumes.
///
/// The conversation/message CRUD suite lives outside this subsystem; the
/// orchestrator only reads recent history, writes the final assistant
/// message, and bumps the conversation's last-activity timestamp.
pub trait MessageStore: Send + Sync {
    /// The most recent `limit` messages of a conversation, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the read fails.
    fn fetch_recent(
        &self,
        conversation_id: i64,
        limit: u32,
    ) -> BoxFuture<'_, Result<Vec<ChatMessage>>>;

    /// Persist the assistant reply for a completed turn.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` or `AppError::Persistence` if the write fails.
    fn persist_assistant<'a>(
        &'a self,
        conversation_id: i64,
        parent_id: i64,
        content: &'a str,
    ) -> BoxFuture<'a, Result<ChatMessage>>;

    /// Bump the conversation's last-activity timestamp.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    fn touch_conversation(&self, conversation_id: i64) -> BoxFuture<'_, Result<()>>;
}

/// A source of stream events for one session.
///
/// Both streaming strategies implement this, so the orchestrator relays
/// events without knowing whether they come from a live upstream stream or a
/// paced local replay — and a future push-based upstream can slot in without
/// orchestrator changes.
pub trait EventSource: Send {
    /// Produce the next event, or `None` when the source is exhausted
    /// (terminal event already yielded, or the session was cancelled).
    fn next_event(&mut self) -> BoxFuture<'_, Option<StreamEvent>>;
}
