//! In-memory stand-ins for the external services, shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use uuid::Uuid;

use crate::auth::{Claims, JwtVerifier, UserDirectory};
use crate::config::AppConfig;
use crate::conversation::ConversationStore;
use crate::error::{EmitError, IndexError, InferenceError, PersistenceError};
use crate::gateway::{ReplySink, TurnPipeline};
use crate::memory::{LocalMemoryStore, VectorMemoryStore};
use crate::models::{Chat, MemoryEntry, MemoryFilter, MemoryHit, Message, Role, User};
use crate::oai::{ContentBlock, EmbeddingClient, GenerationClient};
use crate::types::Reply;
use crate::AppState;

pub const TEST_JWT_SECRET: &str = "test-secret";
pub const TEST_EMBEDDING_DIM: usize = 8;

pub fn sign_token(user_id: &str) -> String {
    let now = Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: user_id.to_string(),
        exp: now + 3600,
        iat: now,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: HashMap<String, User>,
}

impl InMemoryUserDirectory {
    pub fn with_users(users: Vec<User>) -> Self {
        Self {
            users: users.into_iter().map(|user| (user.id.clone(), user)).collect(),
        }
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>, PersistenceError> {
        Ok(self.users.get(user_id).cloned())
    }
}

#[derive(Default)]
struct Tables {
    chats: Vec<Chat>,
    // Insertion order doubles as the tie-break sequence.
    messages: Vec<Message>,
}

/// Mirrors the Postgres store: chat-scoped logs, cascade on chat delete,
/// `created_at` ordering with insertion order breaking ties.
#[derive(Default)]
pub struct InMemoryConversationStore {
    tables: Mutex<Tables>,
    frozen_at: Option<DateTime<Utc>>,
    failing: AtomicBool,
}

impl InMemoryConversationStore {
    /// Every message gets the same timestamp.
    pub fn with_frozen_clock() -> Self {
        Self {
            frozen_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn model_message_count(&self) -> usize {
        self.tables
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|message| message.role == Role::Model)
            .count()
    }

    fn now(&self, tables: &Tables) -> DateTime<Utc> {
        if let Some(frozen) = self.frozen_at {
            return frozen;
        }
        // Strictly increasing, so the default clock never produces ties.
        let latest = tables.messages.iter().map(|m| m.created_at).max();
        match latest {
            Some(latest) if latest >= Utc::now() => latest + Duration::microseconds(1),
            _ => Utc::now(),
        }
    }

    fn check_writable(&self) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(PersistenceError::Database(sqlx::Error::PoolTimedOut))
        } else {
            Ok(())
        }
    }

    fn sorted_messages(tables: &Tables, chat_id: Uuid) -> Vec<Message> {
        let mut messages: Vec<Message> = tables
            .messages
            .iter()
            .filter(|message| message.chat_id == chat_id)
            .cloned()
            .collect();
        messages.sort_by_key(|message| message.created_at);
        messages
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create_message(
        &self,
        chat_id: Uuid,
        user_id: &str,
        role: Role,
        content: &str,
    ) -> Result<Message, PersistenceError> {
        self.check_writable()?;
        let mut tables = self.tables.lock().unwrap();
        let created_at = self.now(&tables);

        let chat = tables
            .chats
            .iter_mut()
            .find(|chat| chat.id == chat_id)
            .ok_or_else(|| PersistenceError::NotFound(format!("chat {}", chat_id)))?;
        chat.last_activity = created_at;

        let message = Message {
            created_at,
            ..Message::new(chat_id, user_id, role, content)
        };
        tables.messages.push(message.clone());
        Ok(message)
    }

    async fn list_recent(
        &self,
        chat_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Message>, PersistenceError> {
        let tables = self.tables.lock().unwrap();
        let mut messages = Self::sorted_messages(&tables, chat_id);
        messages.reverse();
        messages.truncate(limit);
        Ok(messages)
    }

    async fn create_chat(
        &self,
        user_id: &str,
        title: Option<&str>,
    ) -> Result<Chat, PersistenceError> {
        self.check_writable()?;
        let chat = Chat::new(user_id, title);
        self.tables.lock().unwrap().chats.push(chat.clone());
        Ok(chat)
    }

    async fn list_chats(&self, user_id: &str) -> Result<Vec<Chat>, PersistenceError> {
        let tables = self.tables.lock().unwrap();
        let mut chats: Vec<Chat> = tables
            .chats
            .iter()
            .filter(|chat| chat.user_id == user_id)
            .cloned()
            .collect();
        chats.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(chats)
    }

    async fn get_chat(&self, chat_id: Uuid) -> Result<Chat, PersistenceError> {
        self.tables
            .lock()
            .unwrap()
            .chats
            .iter()
            .find(|chat| chat.id == chat_id)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(format!("chat {}", chat_id)))
    }

    async fn delete_chat(&self, chat_id: Uuid) -> Result<(), PersistenceError> {
        self.check_writable()?;
        let mut tables = self.tables.lock().unwrap();
        let before = tables.chats.len();
        tables.chats.retain(|chat| chat.id != chat_id);
        if tables.chats.len() == before {
            return Err(PersistenceError::NotFound(format!("chat {}", chat_id)));
        }
        tables.messages.retain(|message| message.chat_id != chat_id);
        Ok(())
    }

    async fn list_messages(&self, chat_id: Uuid) -> Result<Vec<Message>, PersistenceError> {
        let tables = self.tables.lock().unwrap();
        Ok(Self::sorted_messages(&tables, chat_id))
    }

    async fn get_message(&self, message_id: Uuid) -> Result<Message, PersistenceError> {
        self.tables
            .lock()
            .unwrap()
            .messages
            .iter()
            .find(|message| message.id == message_id)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(format!("message {}", message_id)))
    }

    async fn delete_message(&self, message_id: Uuid) -> Result<(), PersistenceError> {
        self.check_writable()?;
        let mut tables = self.tables.lock().unwrap();
        let before = tables.messages.len();
        tables.messages.retain(|message| message.id != message_id);
        if tables.messages.len() == before {
            return Err(PersistenceError::NotFound(format!("message {}", message_id)));
        }
        Ok(())
    }
}

/// Deterministic bag-of-bytes embedding.
#[derive(Default)]
pub struct ScriptedEmbedder {
    failing: bool,
}

impl ScriptedEmbedder {
    pub fn failing() -> Self {
        Self { failing: true }
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; TEST_EMBEDDING_DIM];
        vector[0] = 1.0;
        for byte in text.bytes() {
            vector[byte as usize % TEST_EMBEDDING_DIM] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingClient for ScriptedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        if self.failing {
            return Err(InferenceError::ServiceUnavailable("embedder offline".to_string()));
        }
        Ok(self.vector_for(text))
    }
}

/// Answers every prompt with the same text and records what it was sent.
pub struct ScriptedGenerator {
    reply: Option<String>,
    calls: Mutex<Vec<Vec<ContentBlock>>>,
}

impl ScriptedGenerator {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<ContentBlock>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationClient for ScriptedGenerator {
    async fn generate(&self, blocks: &[ContentBlock]) -> Result<String, InferenceError> {
        self.calls.lock().unwrap().push(blocks.to_vec());
        self.reply
            .clone()
            .ok_or_else(|| InferenceError::ServiceUnavailable("generator offline".to_string()))
    }
}

pub struct FailingMemoryStore;

#[async_trait]
impl VectorMemoryStore for FailingMemoryStore {
    async fn create_memory(&self, _entry: MemoryEntry) -> Result<(), IndexError> {
        Err(IndexError::Unreachable("connection refused".to_string()))
    }

    async fn query_memory(
        &self,
        _query_vector: &[f32],
        _limit: usize,
        _filter: &MemoryFilter,
    ) -> Result<Vec<MemoryHit>, IndexError> {
        Err(IndexError::Unreachable("connection refused".to_string()))
    }

    async fn delete_memory(&self, _message_ids: &[Uuid]) -> Result<(), IndexError> {
        Err(IndexError::Unreachable("connection refused".to_string()))
    }
}

/// Collects emitted replies, noting how many model messages were already
/// stored at each emission.
pub struct RecordingSink {
    conversations: Arc<InMemoryConversationStore>,
    closed: bool,
    unencodable: bool,
    pub replies: Vec<Reply>,
    pub model_messages_at_emit: Vec<usize>,
}

impl RecordingSink {
    pub fn watching(conversations: Arc<InMemoryConversationStore>) -> Self {
        Self {
            conversations,
            closed: false,
            unencodable: false,
            replies: Vec::new(),
            model_messages_at_emit: Vec::new(),
        }
    }

    pub fn closed(mut self) -> Self {
        self.closed = true;
        self
    }

    /// Fails every emission the way a frame that cannot be serialized does.
    pub fn unencodable(mut self) -> Self {
        self.unencodable = true;
        self
    }
}

#[async_trait]
impl ReplySink for RecordingSink {
    async fn emit(&mut self, reply: Reply) -> Result<(), EmitError> {
        if self.closed {
            return Err(EmitError::Closed);
        }
        if self.unencodable {
            let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
            return Err(EmitError::Encode(err));
        }
        self.model_messages_at_emit
            .push(self.conversations.model_message_count());
        self.replies.push(reply);
        Ok(())
    }
}

pub fn test_config() -> AppConfig {
    let values: HashMap<&str, String> = HashMap::from([
        ("DATABASE_URL", "postgres://localhost/recall_test".to_string()),
        ("JWT_SECRET", TEST_JWT_SECRET.to_string()),
        ("LLM_API_KEY", "sk-test".to_string()),
        ("EMBEDDING_DIM", TEST_EMBEDDING_DIM.to_string()),
    ]);
    AppConfig::from_lookup(|key| values.get(key).cloned()).unwrap()
}

/// Application state wired entirely to in-memory fakes, with users
/// `alice` and `bob`. Every turn is answered with "ok".
pub fn test_app_state() -> Arc<AppState> {
    test_app_state_with(ScriptedGenerator::replying("ok"))
}

pub fn test_app_state_with(generator: ScriptedGenerator) -> Arc<AppState> {
    let config = test_config();
    let conversations: Arc<dyn ConversationStore> =
        Arc::new(InMemoryConversationStore::default());
    let memory: Arc<dyn VectorMemoryStore> = Arc::new(LocalMemoryStore::new(TEST_EMBEDDING_DIM));
    let directory = InMemoryUserDirectory::with_users(vec![
        User::new("alice", "alice@example.com", "Alice"),
        User::new("bob", "bob@example.com", "Bob"),
    ]);

    let pipeline = TurnPipeline::new(
        conversations.clone(),
        memory.clone(),
        Arc::new(ScriptedEmbedder::default()),
        Arc::new(generator),
        &config.public_base_url,
    );

    Arc::new(AppState {
        conversations,
        memory,
        verifier: Arc::new(JwtVerifier::new(&config.jwt_secret, Arc::new(directory))),
        pipeline,
    })
}
