//! Discrete events carried by a streaming session.

/// One event in a session's stream.
///
/// A well-formed session emits `Start`, zero or more `Content`, then exactly
/// one terminal event. `Content` and `End` text is cumulative or incremental
/// depending on the producing strategy; the wire protocol never mixes the two
/// conventions within one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The turn has started; no payload.
    Start,
    /// A slice of assistant output.
    Content(String),
    /// Successful completion, carrying the full response text.
    End(String),
    /// Failure, carrying a human-readable message. Terminal.
    Error(String),
}

impl StreamEvent {
    /// Whether this event ends the session's stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End(_) | Self::Error(_))
    }
}
