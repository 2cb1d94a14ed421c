use serde::{Deserialize, Serialize};
use sqlx::{query_as, FromRow, PgPool};

use crate::error::PersistenceError;

/// Owned by the identity subsystem. The gateway only reads it.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub display_name: String,
}

impl User {
    pub fn new(id: &str, email: &str, display_name: &str) -> Self {
        User {
            id: id.to_string(),
            email: email.to_string(),
            display_name: display_name.to_string(),
        }
    }

    pub async fn get_by_id(pool: &PgPool, id: &str) -> Result<Option<Self>, PersistenceError> {
        let user = query_as::<_, User>(
            r#"
            SELECT id, email, display_name
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }
}
