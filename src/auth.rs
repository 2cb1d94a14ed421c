use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{decode, DecodingKey, Validation};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, warn};

use crate::error::{AuthError, PersistenceError};
use crate::models::User;

const USER_CACHE_TTL: Duration = Duration::from_secs(300);
const USER_CACHE_CAPACITY: u64 = 10_000;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    // Tokens minted by the account service carry the user id as `id`.
    #[serde(alias = "id")]
    pub sub: String,
    pub exp: usize,
    #[serde(default)]
    pub iat: usize,
}

/// Resolves a presented credential to a known user.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<User, AuthError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>, PersistenceError>;
}

pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>, PersistenceError> {
        User::get_by_id(&self.pool, user_id).await
    }
}

/// HS256 token verification followed by a cached user lookup.
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    users: Arc<dyn UserDirectory>,
    user_cache: Cache<String, User>,
}

impl JwtVerifier {
    pub fn new(jwt_secret: &str, users: Arc<dyn UserDirectory>) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            users,
            user_cache: Cache::builder()
                .max_capacity(USER_CACHE_CAPACITY)
                .time_to_live(USER_CACHE_TTL)
                .build(),
        }
    }
}

#[async_trait]
impl IdentityVerifier for JwtVerifier {
    async fn verify(&self, credential: &str) -> Result<User, AuthError> {
        let token_data = decode::<Claims>(credential, &self.decoding_key, &Validation::default())
            .map_err(|e| {
                warn!("Invalid token: {:?}", e);
                AuthError::InvalidCredential(e)
            })?;
        let user_id = token_data.claims.sub;

        if let Some(user) = self.user_cache.get(&user_id).await {
            debug!("User {} resolved from cache", user_id);
            return Ok(user);
        }

        let user = self
            .users
            .find_user(&user_id)
            .await
            .map_err(|e| AuthError::Directory(e.to_string()))?
            .ok_or_else(|| {
                warn!("Auth failed: user not found for id {}", user_id);
                AuthError::UnknownUser(user_id.clone())
            })?;

        self.user_cache.insert(user_id, user.clone()).await;
        Ok(user)
    }
}
