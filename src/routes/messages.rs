use actix_web::{delete, web, Error, HttpResponse};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::persistence_error;
use crate::middleware::auth::AuthenticatedUser;
use crate::AppState;

/// Allowed for the message's author and for the owner of its chat.
#[delete("/message/{message_id}")]
pub async fn delete_message(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    message_id: web::Path<Uuid>,
) -> Result<HttpResponse, Error> {
    let user_id = &authenticated_user.user.id;
    let message = app_state
        .conversations
        .get_message(message_id.into_inner())
        .await
        .map_err(persistence_error)?;

    if &message.user_id != user_id {
        let chat = app_state
            .conversations
            .get_chat(message.chat_id)
            .await
            .map_err(persistence_error)?;
        if &chat.user_id != user_id {
            warn!("User {} tried to delete message {}", user_id, message.id);
            return Err(actix_web::error::ErrorForbidden("Not your message"));
        }
    }

    app_state
        .conversations
        .delete_message(message.id)
        .await
        .map_err(persistence_error)?;
    info!("Message {} deleted", message.id);

    if let Err(e) = app_state.memory.delete_memory(&[message.id]).await {
        warn!("Memory of deleted message {} was not removed: {}", message.id, e);
    }
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MemoryEntry, MemoryFilter, Role};
    use crate::routes::configure;
    use crate::testing::{sign_token, test_app_state, TEST_EMBEDDING_DIM};
    use actix_web::http::{header::AUTHORIZATION, StatusCode};
    use actix_web::{test, App};

    #[actix_web::test]
    async fn author_or_chat_owner_may_delete() {
        let state = test_app_state();
        let chat = state.conversations.create_chat("alice", None).await.unwrap();
        let first = state
            .conversations
            .create_message(chat.id, "alice", Role::User, "one")
            .await
            .unwrap();
        let second = state
            .conversations
            .create_message(chat.id, "alice", Role::Model, "two")
            .await
            .unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(|cfg| configure(cfg, state.verifier.clone())),
        )
        .await;

        let req = test::TestRequest::delete()
            .uri(&format!("/api/chat/message/{}", first.id))
            .insert_header((AUTHORIZATION, format!("Bearer {}", sign_token("bob"))))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::delete()
            .uri(&format!("/api/chat/message/{}", first.id))
            .insert_header((AUTHORIZATION, format!("Bearer {}", sign_token("alice"))))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

        let remaining = state.conversations.list_messages(chat.id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, second.id);
    }

    #[actix_web::test]
    async fn deleted_message_is_no_longer_recalled() {
        let state = test_app_state();
        let chat = state.conversations.create_chat("alice", None).await.unwrap();
        let vector = vec![1.0; TEST_EMBEDDING_DIM];
        let mut ids = Vec::new();
        for text in ["mistyped secret", "harmless"] {
            let message = state
                .conversations
                .create_message(chat.id, "alice", Role::User, text)
                .await
                .unwrap();
            state
                .memory
                .create_memory(MemoryEntry::new(vector.clone(), message.id, chat.id, "alice", text))
                .await
                .unwrap();
            ids.push(message.id);
        }
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(|cfg| configure(cfg, state.verifier.clone())),
        )
        .await;

        let req = test::TestRequest::delete()
            .uri(&format!("/api/chat/message/{}", ids[0]))
            .insert_header((AUTHORIZATION, format!("Bearer {}", sign_token("alice"))))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

        let hits = state
            .memory
            .query_memory(&vector, 10, &MemoryFilter::for_user("alice"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].message_id, ids[1]);
    }

    #[actix_web::test]
    async fn unknown_message_is_not_found() {
        let state = test_app_state();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(|cfg| configure(cfg, state.verifier.clone())),
        )
        .await;

        let req = test::TestRequest::delete()
            .uri(&format!("/api/chat/message/{}", Uuid::new_v4()))
            .insert_header((AUTHORIZATION, format!("Bearer {}", sign_token("alice"))))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }
}
