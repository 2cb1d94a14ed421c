use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::assemble_context;
use super::handshake::Session;
use crate::conversation::{load_transcript, ConversationStore};
use crate::error::{BackgroundWriteError, EmitError, InferenceError, TurnError};
use crate::memory::VectorMemoryStore;
use crate::models::{MemoryEntry, MemoryFilter, MemoryHit, Role};
use crate::oai::{EmbeddingClient, GenerationClient};
use crate::prompts::Prompts;
use crate::types::{Attachment, InboundEvent, Reply};

/// Short-term memory window.
pub const RECENT_MESSAGE_LIMIT: usize = 20;
/// Long-term memory hits per turn.
pub const LONG_TERM_HIT_LIMIT: usize = 3;

/// Both inbound turn variants, normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRequest {
    pub chat_id: Uuid,
    pub text: String,
    pub attachments: Vec<Attachment>,
}

impl TurnRequest {
    pub fn from_event(event: InboundEvent) -> Option<Self> {
        match event {
            InboundEvent::AiMessage(turn) => Some(TurnRequest {
                chat_id: turn.chat,
                text: turn.content,
                attachments: Vec::new(),
            }),
            InboundEvent::AiMessageWithFiles(turn) => Some(TurnRequest {
                chat_id: turn.chat,
                text: turn.text,
                attachments: turn.attachments,
            }),
            InboundEvent::Ping => None,
        }
    }
}

/// Text that gets persisted, embedded and shown to the model for one turn.
/// Attachments are described, never forwarded.
pub fn compose_content(text: &str, attachments: &[Attachment], public_base_url: &str) -> String {
    let attachment_lines = attachments
        .iter()
        .map(|attachment| {
            let url = if attachment.url.starts_with('/') {
                format!("{}{}", public_base_url.trim_end_matches('/'), attachment.url)
            } else {
                attachment.url.clone()
            };
            format!(
                "Attachment: {} ({}) - {}",
                attachment.name, attachment.content_type, url
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let combined = [text.trim(), attachment_lines.as_str()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    if combined.is_empty() {
        " ".to_string()
    } else {
        combined
    }
}

/// Where a turn's reply goes.
#[async_trait]
pub trait ReplySink: Send {
    async fn emit(&mut self, reply: Reply) -> Result<(), EmitError>;
}

/// The post-reply write of the model message and its memory entry.
/// Dropping it detaches the task; it still runs to completion.
pub struct BackgroundWrite(JoinHandle<Result<(), BackgroundWriteError>>);

impl BackgroundWrite {
    pub async fn finish(self) -> Result<(), BackgroundWriteError> {
        match self.0.await {
            Ok(result) => result,
            Err(e) => Err(BackgroundWriteError::Aborted(e.to_string())),
        }
    }
}

pub enum TurnOutcome {
    /// The model's reply went out; its persistence continues in the background.
    Replied(BackgroundWrite),
    /// Generation failed and the fallback reply went out instead.
    FellBack(InferenceError),
}

#[derive(Clone)]
pub struct TurnPipeline {
    conversations: Arc<dyn ConversationStore>,
    memory: Arc<dyn VectorMemoryStore>,
    embedder: Arc<dyn EmbeddingClient>,
    generator: Arc<dyn GenerationClient>,
    public_base_url: String,
}

impl TurnPipeline {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        memory: Arc<dyn VectorMemoryStore>,
        embedder: Arc<dyn EmbeddingClient>,
        generator: Arc<dyn GenerationClient>,
        public_base_url: &str,
    ) -> Self {
        Self {
            conversations,
            memory,
            embedder,
            generator,
            public_base_url: public_base_url.to_string(),
        }
    }

    /// Runs one turn to the point where its reply has been emitted.
    ///
    /// A persistence failure on the way in, or a chat the caller does not
    /// own, ends the turn with nothing stored or emitted. A generation
    /// failure emits [`Prompts::FALLBACK_REPLY`].
    /// Embedding and vector store failures only cost long-term context.
    pub async fn run(
        &self,
        session: &Session,
        turn: u64,
        request: TurnRequest,
        sink: &mut dyn ReplySink,
    ) -> Result<TurnOutcome, TurnError> {
        let span = info_span!(
            "turn",
            connection_id = %session.connection_id,
            chat_id = %request.chat_id,
            turn
        );
        self.run_turn(session, request, sink).instrument(span).await
    }

    async fn run_turn(
        &self,
        session: &Session,
        request: TurnRequest,
        sink: &mut dyn ReplySink,
    ) -> Result<TurnOutcome, TurnError> {
        let chat_id = request.chat_id;
        let user_id = session.user.id.as_str();
        let content = compose_content(&request.text, &request.attachments, &self.public_base_url);

        let chat = self.conversations.get_chat(chat_id).await.map_err(|e| {
            warn!(error = %e, "Chat could not be resolved, dropping turn");
            e
        })?;
        if chat.user_id != user_id {
            warn!(owner = %chat.user_id, "Turn addressed to another user's chat, dropping turn");
            return Err(TurnError::NotChatOwner {
                user_id: user_id.to_string(),
                chat_id,
            });
        }

        let (stored, vector) = tokio::join!(
            self.conversations
                .create_message(chat_id, user_id, Role::User, &content),
            self.embedder.embed(&content),
        );
        let stored = stored.map_err(|e| {
            error!(error = %e, "User message was not persisted, dropping turn");
            e
        })?;
        let vector = match vector {
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!(error = %e, "Embedding failed, answering without long-term memory");
                None
            }
        };

        if let Some(vector) = &vector {
            let entry = MemoryEntry::new(vector.clone(), stored.id, chat_id, user_id, &content);
            if let Err(e) = self.memory.create_memory(entry).await {
                warn!(error = %e, message_id = %stored.id, "User message was not indexed");
            }
        }

        let (hits, transcript) = tokio::join!(
            self.recall(vector.as_deref(), user_id, stored.id),
            load_transcript(self.conversations.as_ref(), chat_id, RECENT_MESSAGE_LIMIT),
        );
        let transcript = transcript.map_err(|e| {
            error!(error = %e, "Transcript could not be loaded, dropping turn");
            e
        })?;

        let blocks = assemble_context(&hits, &transcript);
        info!(
            long_term_hits = hits.len(),
            transcript_len = transcript.len(),
            "Invoking generation"
        );

        let reply = match self.generator.generate(&blocks).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(error = %e, "Generation failed, sending fallback reply");
                self.emit(sink, Reply {
                    content: Prompts::FALLBACK_REPLY.to_string(),
                    chat_id,
                })
                .await;
                return Ok(TurnOutcome::FellBack(e));
            }
        };

        self.emit(sink, Reply {
            content: reply.clone(),
            chat_id,
        })
        .await;

        Ok(TurnOutcome::Replied(self.spawn_reply_write(session, chat_id, reply)))
    }

    /// Long-term hits for this user. The message being answered is left
    /// out; it is already part of the transcript.
    async fn recall(
        &self,
        vector: Option<&[f32]>,
        user_id: &str,
        current: Uuid,
    ) -> Vec<MemoryHit> {
        let Some(vector) = vector else {
            return Vec::new();
        };

        match self
            .memory
            .query_memory(vector, LONG_TERM_HIT_LIMIT + 1, &MemoryFilter::for_user(user_id))
            .await
        {
            Ok(hits) => hits
                .into_iter()
                .filter(|hit| hit.message_id != current)
                .take(LONG_TERM_HIT_LIMIT)
                .collect(),
            Err(e) => {
                warn!(error = %e, "Memory query failed, answering without long-term memory");
                Vec::new()
            }
        }
    }

    async fn emit(&self, sink: &mut dyn ReplySink, reply: Reply) {
        match sink.emit(reply).await {
            Ok(()) => {}
            Err(EmitError::Closed) => {
                warn!("Connection closed before the reply could be delivered");
            }
            Err(e) => error!(error = %e, "Reply was not delivered"),
        }
    }

    fn spawn_reply_write(
        &self,
        session: &Session,
        chat_id: Uuid,
        reply: String,
    ) -> BackgroundWrite {
        let conversations = self.conversations.clone();
        let memory = self.memory.clone();
        let embedder = self.embedder.clone();
        let user_id = session.user.id.clone();
        let span = info_span!(
            "reply_write",
            connection_id = %session.connection_id,
            chat_id = %chat_id
        );

        let task = async move {
            let (stored, vector) = tokio::join!(
                conversations.create_message(chat_id, &user_id, Role::Model, &reply),
                embedder.embed(&reply),
            );
            let stored = stored?;
            debug!(message_id = %stored.id, "Model message persisted");

            let index_error = |e: &dyn std::fmt::Display| {
                BackgroundWriteError::Index(format!("message {}: {}", stored.id, e))
            };
            let vector = vector.map_err(|e| index_error(&e))?;
            memory
                .create_memory(MemoryEntry::new(vector, stored.id, chat_id, &user_id, &reply))
                .await
                .map_err(|e| index_error(&e))?;

            Ok::<(), BackgroundWriteError>(())
        };

        BackgroundWrite(tokio::spawn(task.instrument(span)))
    }
}
