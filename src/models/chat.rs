use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{query, query_as, FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use crate::error::PersistenceError;

pub const DEFAULT_CHAT_TITLE: &str = "New Chat";

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub last_activity: DateTime<Utc>,
}

impl Default for Chat {
    fn default() -> Self {
        Chat {
            id: Uuid::new_v4(),
            user_id: String::new(),
            title: DEFAULT_CHAT_TITLE.to_string(),
            last_activity: Utc::now(),
        }
    }
}

impl Chat {
    pub fn new(user_id: &str, title: Option<&str>) -> Self {
        let title = title
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or(DEFAULT_CHAT_TITLE);
        Chat {
            user_id: user_id.to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub async fn insert(pool: &PgPool, chat: &Chat) -> Result<Self, PersistenceError> {
        let chat = query_as::<_, Chat>(
            r#"
            INSERT INTO chats (id, user_id, title, last_activity)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, title, last_activity
            "#,
        )
        .bind(chat.id)
        .bind(&chat.user_id)
        .bind(&chat.title)
        .bind(chat.last_activity)
        .fetch_one(pool)
        .await?;

        debug!("Chat created: {:?}", chat);
        Ok(chat)
    }

    pub async fn list_for_user(
        pool: &PgPool,
        user_id: &str,
    ) -> Result<Vec<Self>, PersistenceError> {
        let chats = query_as::<_, Chat>(
            r#"
            SELECT id, user_id, title, last_activity
            FROM chats
            WHERE user_id = $1
            ORDER BY last_activity DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(chats)
    }

    pub async fn get_by_id(pool: &PgPool, chat_id: Uuid) -> Result<Self, PersistenceError> {
        query_as::<_, Chat>(
            r#"
            SELECT id, user_id, title, last_activity
            FROM chats
            WHERE id = $1
            "#,
        )
        .bind(chat_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| PersistenceError::NotFound(format!("chat {}", chat_id)))
    }

    /// Hard delete. Messages go with it through the foreign key cascade.
    pub async fn delete(pool: &PgPool, chat_id: Uuid) -> Result<(), PersistenceError> {
        let result = query("DELETE FROM chats WHERE id = $1")
            .bind(chat_id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::NotFound(format!("chat {}", chat_id)));
        }
        debug!("Chat deleted with id: {:?}", chat_id);
        Ok(())
    }
}
