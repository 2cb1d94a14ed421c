use std::sync::Arc;

use actix_web::{web, Error};
use tracing::error;

use crate::auth::IdentityVerifier;
use crate::error::PersistenceError;
use crate::middleware::auth::Authentication;

pub mod auth;
pub mod chat;
pub mod messages;

/// Mounts the authenticated REST surface under `/api`.
pub fn configure(cfg: &mut web::ServiceConfig, verifier: Arc<dyn IdentityVerifier>) {
    cfg.service(
        web::scope("/api/auth")
            .wrap(Authentication {
                verifier: verifier.clone(),
            })
            .service(auth::me),
    )
    .service(
        web::scope("/api/chat")
            .wrap(Authentication { verifier })
            .service(chat::create_chat)
            .service(chat::list_chats)
            .service(chat::list_messages)
            .service(messages::delete_message)
            .service(chat::delete_chat),
    );
}

fn persistence_error(e: PersistenceError) -> Error {
    match e {
        PersistenceError::NotFound(_) => actix_web::error::ErrorNotFound(e.to_string()),
        other => {
            error!("Persistence failure: {:?}", other);
            actix_web::error::ErrorInternalServerError(other.to_string())
        }
    }
}
