//! Conversation repository.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::models::conversation::Conversation;
use crate::{AppError, Result};

use super::db::Database;

/// Repository wrapper around `SQLite` for conversation records.
#[derive(Clone)]
pub struct ConversationRepo {
    db: Database,
}

fn conversation_from_row(row: &SqliteRow) -> Result<Conversation> {
    Ok(Conversation {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl ConversationRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a new conversation owned by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn create(&self, user_id: i64, title: &str) -> Result<Conversation> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO conversations (user_id, title, created_at, updated_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(title)
        .bind(now)
        .bind(now)
        .execute(&self.db)
        .await?;

        Ok(Conversation {
            id: result.last_insert_rowid(),
            user_id,
            title: title.to_owned(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Fetch a conversation, verifying it belongs to `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if no conversation with that id is owned
    /// by the user, `AppError::Db` if the query fails.
    pub async fn get_owned(&self, id: i64, user_id: i64) -> Result<Conversation> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;
        match row {
            Some(ref row) => conversation_from_row(row),
            None => Err(AppError::NotFound(format!("conversation {id} not found"))),
        }
    }

    /// Bump the last-activity timestamp.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn touch(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}
