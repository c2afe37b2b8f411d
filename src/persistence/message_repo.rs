//! Message repository.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::models::message::{ChatMessage, MessageRole};
use crate::{AppError, Result};

use super::db::Database;

/// Repository wrapper around `SQLite` for message records.
#[derive(Clone)]
pub struct MessageRepo {
    db: Database,
}

fn message_from_row(row: &SqliteRow) -> Result<ChatMessage> {
    let role_raw: String = row.try_get("role")?;
    let role = MessageRole::parse(&role_raw)
        .map_err(|raw| AppError::Db(format!("unknown message role '{raw}'")))?;
    Ok(ChatMessage {
        id: row.try_get("id")?,
        conversation_id: row.try_get("conversation_id")?,
        parent_id: row.try_get("parent_id")?,
        role,
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
    })
}

impl MessageRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a message and return the stored record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn insert(
        &self,
        conversation_id: i64,
        parent_id: Option<i64>,
        role: MessageRole,
        content: &str,
    ) -> Result<ChatMessage> {
        let created_at: DateTime<Utc> = Utc::now();
        let result = sqlx::query(
            "INSERT INTO messages (conversation_id, parent_id, role, content, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(conversation_id)
        .bind(parent_id)
        .bind(role.as_str())
        .bind(content)
        .bind(created_at)
        .execute(&self.db)
        .await?;

        Ok(ChatMessage {
            id: result.last_insert_rowid(),
            conversation_id,
            parent_id,
            role,
            content: content.to_owned(),
            created_at,
        })
    }

    /// Retrieve a message by identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<ChatMessage>> {
        let row = sqlx::query("SELECT * FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        row.as_ref().map(message_from_row).transpose()
    }

    /// The most recent messages of a conversation, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn recent_for_conversation(
        &self,
        conversation_id: i64,
        limit: u32,
    ) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE conversation_id = ?
             ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(conversation_id)
        .bind(i64::from(limit))
        .fetch_all(&self.db)
        .await?;
        rows.iter().map(message_from_row).collect()
    }
}
