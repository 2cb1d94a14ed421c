use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::models::{Chat, Message, Role};

/// Durable record of chats and their append-only message logs.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_message(
        &self,
        chat_id: Uuid,
        user_id: &str,
        role: Role,
        content: &str,
    ) -> Result<Message, PersistenceError>;

    /// Newest first, at most `limit` messages.
    async fn list_recent(
        &self,
        chat_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Message>, PersistenceError>;

    async fn create_chat(
        &self,
        user_id: &str,
        title: Option<&str>,
    ) -> Result<Chat, PersistenceError>;
    async fn list_chats(&self, user_id: &str) -> Result<Vec<Chat>, PersistenceError>;
    async fn get_chat(&self, chat_id: Uuid) -> Result<Chat, PersistenceError>;
    async fn delete_chat(&self, chat_id: Uuid) -> Result<(), PersistenceError>;

    /// Oldest first, unbounded.
    async fn list_messages(&self, chat_id: Uuid) -> Result<Vec<Message>, PersistenceError>;
    async fn get_message(&self, message_id: Uuid) -> Result<Message, PersistenceError>;
    async fn delete_message(&self, message_id: Uuid) -> Result<(), PersistenceError>;
}

/// Short-term memory: the last `limit` messages of a chat, oldest to newest.
pub async fn load_transcript(
    store: &dyn ConversationStore,
    chat_id: Uuid,
    limit: usize,
) -> Result<Vec<Message>, PersistenceError> {
    let mut messages = store.list_recent(chat_id, limit).await?;
    messages.reverse();
    Ok(messages)
}

pub struct PgConversationStore {
    pool: PgPool,
}

impl PgConversationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn create_message(
        &self,
        chat_id: Uuid,
        user_id: &str,
        role: Role,
        content: &str,
    ) -> Result<Message, PersistenceError> {
        Message::insert(&self.pool, chat_id, user_id, role, content).await
    }

    async fn list_recent(
        &self,
        chat_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Message>, PersistenceError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        Message::list_recent(&self.pool, chat_id, limit).await
    }

    async fn create_chat(
        &self,
        user_id: &str,
        title: Option<&str>,
    ) -> Result<Chat, PersistenceError> {
        Chat::insert(&self.pool, &Chat::new(user_id, title)).await
    }

    async fn list_chats(&self, user_id: &str) -> Result<Vec<Chat>, PersistenceError> {
        Chat::list_for_user(&self.pool, user_id).await
    }

    async fn get_chat(&self, chat_id: Uuid) -> Result<Chat, PersistenceError> {
        Chat::get_by_id(&self.pool, chat_id).await
    }

    async fn delete_chat(&self, chat_id: Uuid) -> Result<(), PersistenceError> {
        Chat::delete(&self.pool, chat_id).await
    }

    async fn list_messages(&self, chat_id: Uuid) -> Result<Vec<Message>, PersistenceError> {
        Message::list_for_chat(&self.pool, chat_id).await
    }

    async fn get_message(&self, message_id: Uuid) -> Result<Message, PersistenceError> {
        Message::get_by_id(&self.pool, message_id).await
    }

    async fn delete_message(&self, message_id: Uuid) -> Result<(), PersistenceError> {
        Message::delete(&self.pool, message_id).await
    }
}
