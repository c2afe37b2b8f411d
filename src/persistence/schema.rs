//! Database schema applied on connect.

use super::db::Database;
use crate::Result;

/// DDL statements, idempotent by construction.
const STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS conversations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        title TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        conversation_id INTEGER NOT NULL REFERENCES conversations(id),
        parent_id INTEGER,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_messages_conversation
        ON messages(conversation_id, created_at)",
];

/// Apply the schema to a freshly opened pool.
///
/// # Errors
///
/// Returns `AppError::Db` if any statement fails.
pub async fn apply(db: &Database) -> Result<()> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(db).await?;
    }
    Ok(())
}
