//! AI completion backend interface and HTTP client.

pub mod client;

use futures_util::future::BoxFuture;

use crate::models::message::ChatMessage;
use crate::Result;

/// Narrow interface to the AI completion backend.
///
/// Two calling conventions share one trait: a blocking completion for the
/// paced strategy, and a start/fetch/stop triple for the polled stream. The
/// `history` slice is forwarded as conversation context with every request.
pub trait CompletionBackend: Send + Sync {
    /// One blocking completion call; returns the full response text.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UpstreamUnavailable` if the backend cannot be
    /// reached or rejects the request.
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
        history: &'a [ChatMessage],
        system_prompt: &'a str,
    ) -> BoxFuture<'a, Result<String>>;

    /// Open an upstream stream; returns its correlation id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UpstreamUnavailable` if the stream cannot be
    /// opened.
    fn start_stream<'a>(
        &'a self,
        prompt: &'a str,
        history: &'a [ChatMessage],
        system_prompt: &'a str,
    ) -> BoxFuture<'a, Result<String>>;

    /// Fetch the next raw chunk payload for a stream.
    ///
    /// The payload is a text body of newline-delimited `data: ` records;
    /// zero records is a valid (quiet) fetch.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UpstreamUnavailable` on any transport failure.
    fn fetch_chunk<'a>(&'a self, correlation_id: &'a str) -> BoxFuture<'a, Result<String>>;

    /// Tear down an upstream stream.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UpstreamUnavailable` if the stop call fails; the
    /// callers treat this as best-effort.
    fn stop_stream<'a>(&'a self, correlation_id: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Whether the backend reports itself healthy.
    fn health(&self) -> BoxFuture<'_, bool>;
}
