use actix_web::{web, HttpRequest};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::IdentityVerifier;
use crate::error::AuthError;
use crate::models::User;

pub const TOKEN_COOKIE: &str = "token";

/// Identity attached to one live connection. Built once at handshake and
/// handed to every turn; never persisted.
#[derive(Debug, Clone)]
pub struct Session {
    pub connection_id: Uuid,
    pub user: User,
}

impl Session {
    pub fn new(user: User) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            user,
        }
    }
}

#[derive(Deserialize)]
struct HandshakeQuery {
    token: Option<String>,
}

pub fn cookie_token(req: &HttpRequest) -> Option<String> {
    req.cookie(TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

/// The `token` cookie wins over the `?token=` handshake parameter.
pub fn extract_credential(req: &HttpRequest) -> Option<String> {
    cookie_token(req).or_else(|| {
        web::Query::<HandshakeQuery>::from_query(req.query_string())
            .ok()
            .and_then(|query| query.into_inner().token)
            .filter(|token| !token.is_empty())
    })
}

pub async fn authenticate(
    verifier: &dyn IdentityVerifier,
    req: &HttpRequest,
) -> Result<Session, AuthError> {
    let credential = extract_credential(req).ok_or_else(|| {
        warn!("Socket auth failed: no token provided");
        AuthError::MissingCredential
    })?;

    let user = verifier.verify(&credential).await?;
    let session = Session::new(user);
    info!(
        connection_id = %session.connection_id,
        user_id = %session.user.id,
        "Connection authenticated"
    );
    Ok(session)
}
