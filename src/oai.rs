use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    CreateEmbeddingRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::error::InferenceError;
use crate::models::Role;

/// One role-tagged piece of a generation prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentBlock {
    pub role: Role,
    pub text: String,
}

impl ContentBlock {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError>;
}

#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(&self, blocks: &[ContentBlock]) -> Result<String, InferenceError>;
}

pub fn oai_client(app_config: &AppConfig) -> Client<OpenAIConfig> {
    Client::with_config(
        OpenAIConfig::new()
            .with_api_key(&app_config.llm_api_key)
            .with_api_base(&app_config.llm_api_base),
    )
}

fn classify(e: OpenAIError) -> InferenceError {
    match e {
        OpenAIError::JSONDeserialize(e) => InferenceError::InvalidResponse(e.to_string()),
        OpenAIError::InvalidArgument(msg) => InferenceError::InvalidResponse(msg),
        other => InferenceError::ServiceUnavailable(other.to_string()),
    }
}

pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(client: Client<OpenAIConfig>, app_config: &AppConfig) -> Self {
        Self {
            client,
            model: app_config.embedding_model.clone(),
        }
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(text)
            .build()
            .map_err(classify)?;

        let response = self.client.embeddings().create(request).await.map_err(classify)?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .filter(|embedding| !embedding.is_empty())
            .ok_or_else(|| InferenceError::InvalidResponse("no embedding returned".to_string()))?;

        debug!("Embedded {} chars into {} dimensions", text.len(), embedding.len());
        Ok(embedding)
    }
}

pub struct OpenAiGenerator {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(client: Client<OpenAIConfig>, app_config: &AppConfig) -> Self {
        Self {
            client,
            model: app_config.generation_model.clone(),
        }
    }
}

/// `model` turns go out as `assistant` messages.
fn to_request_message(block: &ContentBlock) -> Result<ChatCompletionRequestMessage, OpenAIError> {
    Ok(match block.role {
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(block.text.as_str())
            .build()?
            .into(),
        Role::Model => ChatCompletionRequestAssistantMessageArgs::default()
            .content(block.text.as_str())
            .build()?
            .into(),
    })
}

#[async_trait]
impl GenerationClient for OpenAiGenerator {
    async fn generate(&self, blocks: &[ContentBlock]) -> Result<String, InferenceError> {
        let messages = blocks
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>, _>>()
            .map_err(classify)?;

        let request = CreateChatCompletionRequestArgs::default()
            .max_tokens(2048u32)
            .model(&self.model)
            .messages(messages)
            .build()
            .map_err(classify)?;

        let response = self.client.chat().create(request).await.map_err(classify)?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| InferenceError::InvalidResponse("no choices returned".to_string()))?;

        if let Some(reason) = &choice.finish_reason {
            info!("Chat completion finished with reason: {:?}", reason);
        }

        choice
            .message
            .content
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| InferenceError::InvalidResponse("no content in response".to_string()))
    }
}
