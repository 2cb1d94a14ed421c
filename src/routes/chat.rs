use actix_web::{delete, get, post, web, Error, HttpResponse};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::persistence_error;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{Chat, Message, Role};
use crate::prompts::Prompts;
use crate::types::CreateChatRequest;
use crate::AppState;

/// Loads a chat and checks that `user_id` owns it.
async fn owned_chat(
    app_state: &AppState,
    chat_id: Uuid,
    user_id: &str,
) -> Result<Chat, Error> {
    let chat = app_state
        .conversations
        .get_chat(chat_id)
        .await
        .map_err(persistence_error)?;

    if chat.user_id != user_id {
        warn!("User {} tried to access chat {} owned by {}", user_id, chat_id, chat.user_id);
        return Err(actix_web::error::ErrorForbidden("Not your chat"));
    }
    Ok(chat)
}

#[post("")]
pub async fn create_chat(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    create_chat_request: Option<web::Json<CreateChatRequest>>,
) -> Result<HttpResponse, Error> {
    let user_id = &authenticated_user.user.id;
    let title = create_chat_request
        .as_ref()
        .and_then(|request| request.title.as_deref());

    let chat = app_state
        .conversations
        .create_chat(user_id, title)
        .await
        .map_err(persistence_error)?;
    info!("Chat {} created for user {}", chat.id, user_id);

    // The chat is usable without its greeting.
    if let Err(e) = app_state
        .conversations
        .create_message(chat.id, user_id, Role::Model, Prompts::WELCOME_MESSAGE)
        .await
    {
        warn!("Failed to store welcome message for chat {}: {}", chat.id, e);
    }

    Ok(HttpResponse::Created().json(chat))
}

#[get("")]
pub async fn list_chats(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
) -> Result<web::Json<Vec<Chat>>, Error> {
    let chats = app_state
        .conversations
        .list_chats(&authenticated_user.user.id)
        .await
        .map_err(persistence_error)?;
    Ok(web::Json(chats))
}

#[get("/messages/{chat_id}")]
pub async fn list_messages(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    chat_id: web::Path<Uuid>,
) -> Result<web::Json<Vec<Message>>, Error> {
    let chat = owned_chat(&app_state, chat_id.into_inner(), &authenticated_user.user.id).await?;
    let messages = app_state
        .conversations
        .list_messages(chat.id)
        .await
        .map_err(persistence_error)?;
    Ok(web::Json(messages))
}

#[delete("/{chat_id}")]
pub async fn delete_chat(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    chat_id: web::Path<Uuid>,
) -> Result<HttpResponse, Error> {
    let chat = owned_chat(&app_state, chat_id.into_inner(), &authenticated_user.user.id).await?;
    let message_ids = app_state
        .conversations
        .list_messages(chat.id)
        .await
        .map_err(persistence_error)?
        .into_iter()
        .map(|message| message.id)
        .collect::<Vec<_>>();

    app_state
        .conversations
        .delete_chat(chat.id)
        .await
        .map_err(persistence_error)?;
    info!("Chat {} deleted", chat.id);

    // The chat is gone either way; stale entries only cost recall quality.
    if let Err(e) = app_state.memory.delete_memory(&message_ids).await {
        warn!("Memories of deleted chat {} were not removed: {}", chat.id, e);
    }
    Ok(HttpResponse::NoContent().finish())
}
