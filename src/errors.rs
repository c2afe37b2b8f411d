//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// Streaming session id is unknown or already expired.
    SessionNotFound(String),
    /// AI completion backend is unreachable or returned a failure.
    UpstreamUnavailable(String),
    /// No terminal event arrived within the streaming wall-clock budget.
    UpstreamTimeout(String),
    /// Wire payload could not be decoded into a stream event.
    Codec(String),
    /// Client push channel is closed; the peer disconnected.
    ChannelClosed,
    /// Assistant message could not be saved after the stream ended.
    Persistence(String),
    /// Bearer token failed validation.
    Auth(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// Caller is not authorized to perform the requested action.
    Unauthorized(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::SessionNotFound(id) => write!(f, "session not found: {id}"),
            Self::UpstreamUnavailable(msg) => write!(f, "upstream unavailable: {msg}"),
            Self::UpstreamTimeout(msg) => write!(f, "upstream timeout: {msg}"),
            Self::Codec(msg) => write!(f, "codec: {msg}"),
            Self::ChannelClosed => write!(f, "channel closed"),
            Self::Persistence(msg) => write!(f, "persistence: {msg}"),
            Self::Auth(msg) => write!(f, "auth: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::UpstreamTimeout(err.to_string())
        } else {
            Self::UpstreamUnavailable(err.to_string())
        }
    }
}
