use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payload stored next to every vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetadata {
    pub chat_id: Uuid,
    pub user_id: String,
    pub text: String,
}

/// One entry per persisted message, user and model turns alike.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub vector: Vec<f32>,
    pub message_id: Uuid,
    pub metadata: MemoryMetadata,
}

impl MemoryEntry {
    pub fn new(
        vector: Vec<f32>,
        message_id: Uuid,
        chat_id: Uuid,
        user_id: &str,
        text: &str,
    ) -> Self {
        MemoryEntry {
            vector,
            message_id,
            metadata: MemoryMetadata {
                chat_id,
                user_id: user_id.to_string(),
                text: text.to_string(),
            },
        }
    }
}

/// Exact-match metadata filter. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryFilter {
    pub user_id: Option<String>,
    pub chat_id: Option<Uuid>,
}

impl MemoryFilter {
    pub fn for_user(user_id: &str) -> Self {
        MemoryFilter {
            user_id: Some(user_id.to_string()),
            chat_id: None,
        }
    }

    pub fn matches(&self, metadata: &MemoryMetadata) -> bool {
        self.user_id
            .as_deref()
            .map_or(true, |user_id| metadata.user_id == user_id)
            && self.chat_id.map_or(true, |chat_id| metadata.chat_id == chat_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryHit {
    pub message_id: Uuid,
    pub score: f32,
    pub metadata: MemoryMetadata,
}
