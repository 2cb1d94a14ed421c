use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{query, query_as, FromRow, PgPool, Type};
use tracing::debug;
use uuid::Uuid;

use crate::error::PersistenceError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "role_enum", rename_all = "lowercase")] // SQL value name
#[serde(rename_all = "lowercase")] // JSON value name
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub user_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Default for Message {
    fn default() -> Self {
        Message {
            id: Uuid::new_v4(),
            chat_id: Uuid::nil(),
            user_id: String::new(),
            role: Role::User,
            content: String::new(),
            created_at: Utc::now(),
        }
    }
}

impl Message {
    pub fn new(chat_id: Uuid, user_id: &str, role: Role, content: &str) -> Self {
        Message {
            chat_id,
            user_id: user_id.to_string(),
            role,
            content: content.to_string(),
            ..Default::default()
        }
    }

    /// Appends a message to its chat and bumps the chat's last activity.
    pub async fn insert(
        pool: &PgPool,
        chat_id: Uuid,
        user_id: &str,
        role: Role,
        content: &str,
    ) -> Result<Self, PersistenceError> {
        let message = Message::new(chat_id, user_id, role, content);

        let message = query_as::<_, Message>(
            r#"
            WITH inserted AS (
                INSERT INTO messages (id, chat_id, user_id, role, content, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id, chat_id, user_id, role, content, created_at
            ), touched AS (
                UPDATE chats SET last_activity = $6 WHERE id = $2
            )
            SELECT * FROM inserted
            "#,
        )
        .bind(message.id)
        .bind(message.chat_id)
        .bind(&message.user_id)
        .bind(message.role)
        .bind(&message.content)
        .bind(message.created_at)
        .fetch_one(pool)
        .await?;

        debug!("Message {} appended to chat {}", message.id, message.chat_id);
        Ok(message)
    }

    /// Newest first, bounded. `seq` breaks `created_at` ties by insertion order.
    pub async fn list_recent(
        pool: &PgPool,
        chat_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Self>, PersistenceError> {
        let messages = query_as::<_, Message>(
            r#"
            SELECT id, chat_id, user_id, role, content, created_at
            FROM messages
            WHERE chat_id = $1
            ORDER BY created_at DESC, seq DESC
            LIMIT $2
            "#,
        )
        .bind(chat_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(messages)
    }

    pub async fn list_for_chat(
        pool: &PgPool,
        chat_id: Uuid,
    ) -> Result<Vec<Self>, PersistenceError> {
        let messages = query_as::<_, Message>(
            r#"
            SELECT id, chat_id, user_id, role, content, created_at
            FROM messages
            WHERE chat_id = $1
            ORDER BY created_at ASC, seq ASC
            "#,
        )
        .bind(chat_id)
        .fetch_all(pool)
        .await?;

        Ok(messages)
    }

    pub async fn get_by_id(pool: &PgPool, message_id: Uuid) -> Result<Self, PersistenceError> {
        query_as::<_, Message>(
            r#"
            SELECT id, chat_id, user_id, role, content, created_at
            FROM messages
            WHERE id = $1
            "#,
        )
        .bind(message_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| PersistenceError::NotFound(format!("message {}", message_id)))
    }

    pub async fn delete(pool: &PgPool, message_id: Uuid) -> Result<(), PersistenceError> {
        let result = query("DELETE FROM messages WHERE id = $1")
            .bind(message_id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::NotFound(format!("message {}", message_id)));
        }
        debug!("Message deleted with id: {:?}", message_id);
        Ok(())
    }
}
