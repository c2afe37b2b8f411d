//! Conversation model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Conversation persisted in `SQLite`; owned by exactly one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Conversation {
    /// Unique record identifier.
    pub id: i64,
    /// Owning user id; immutable after creation.
    pub user_id: i64,
    /// Display title.
    pub title: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last activity timestamp; bumped after every completed turn.
    pub updated_at: DateTime<Utc>,
}
