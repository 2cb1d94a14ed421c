use thiserror::Error;
use uuid::Uuid;

/// Handshake rejection. Every variant surfaces to the client as `Unauthorized`.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no credential provided")]
    MissingCredential,
    #[error("invalid credential: {0}")]
    InvalidCredential(#[from] jsonwebtoken::errors::Error),
    #[error("no user found for id {0}")]
    UnknownUser(String),
    #[error("user lookup failed: {0}")]
    Directory(String),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0} not found")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("vector store unreachable: {0}")]
    Unreachable(String),
    #[error("malformed vector store entry: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("inference service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("inference service returned an unusable response: {0}")]
    InvalidResponse(String),
}

/// Failures that end a turn before any reply is emitted. Index failures
/// degrade retrieval instead, and generation failures still answer with the
/// fallback reply.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("user {user_id} does not own chat {chat_id}")]
    NotChatOwner { user_id: String, chat_id: Uuid },
}

/// Reported by the post-reply write task, never to the client.
#[derive(Debug, Error)]
pub enum BackgroundWriteError {
    #[error("model message was not persisted: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("model message was persisted but not indexed: {0}")]
    Index(String),
    #[error("write task did not complete: {0}")]
    Aborted(String),
}

/// Why a reply did not reach the client.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("connection closed")]
    Closed,
    #[error("outbound event could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}
