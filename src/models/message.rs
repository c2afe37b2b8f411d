//! Chat message model.
//!
//! Messages form a forest inside a conversation: a reply may branch from any
//! prior message through `parent_id`, not only the immediately preceding one.
//! Every ASSISTANT message's parent is the USER message that triggered it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author role of a chat message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// Message written by the end user.
    User,
    /// Message produced by the AI assistant.
    Assistant,
}

impl MessageRole {
    /// Lowercase wire name used in upstream request payloads.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Parse the lowercase wire name stored in the database.
    ///
    /// # Errors
    ///
    /// Returns the raw string back if it names no known role.
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(other.to_owned()),
        }
    }
}

/// Chat message persisted in `SQLite`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ChatMessage {
    /// Unique record identifier.
    pub id: i64,
    /// Conversation this message belongs to.
    pub conversation_id: i64,
    /// Message this one replies to, if any.
    pub parent_id: Option<i64>,
    /// Author role.
    pub role: MessageRole,
    /// Message text.
    pub content: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}
