//! `SQLite`-backed implementation of the relay's persistence interface.

use futures_util::future::BoxFuture;

use crate::models::message::{ChatMessage, MessageRole};
use crate::relay::MessageStore;
use crate::Result;

use super::conversation_repo::ConversationRepo;
use super::db::Database;
use super::message_repo::MessageRepo;

/// Bundles the repositories behind the narrow relay-facing interface.
#[derive(Clone)]
pub struct RelayStore {
    messages: MessageRepo,
    conversations: ConversationRepo,
}

impl RelayStore {
    /// Build the store over a connected pool.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self {
            messages: MessageRepo::new(db.clone()),
            conversations: ConversationRepo::new(db),
        }
    }
}

impl MessageStore for RelayStore {
    fn fetch_recent(
        &self,
        conversation_id: i64,
        limit: u32,
    ) -> BoxFuture<'_, Result<Vec<ChatMessage>>> {
        Box::pin(async move {
            self.messages
                .recent_for_conversation(conversation_id, limit)
                .await
        })
    }

    fn persist_assistant<'a>(
        &'a self,
        conversation_id: i64,
        parent_id: i64,
        content: &'a str,
    ) -> BoxFuture<'a, Result<ChatMessage>> {
        Box::pin(async move {
            self.messages
                .insert(
                    conversation_id,
                    Some(parent_id),
                    MessageRole::Assistant,
                    content,
                )
                .await
        })
    }

    fn touch_conversation(&self, conversation_id: i64) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.conversations.touch(conversation_id).await })
    }
}
