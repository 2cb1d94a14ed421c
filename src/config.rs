use anyhow::anyhow;
use shuttle_runtime::SecretStore;

pub const DEFAULT_LLM_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_GENERATION_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_EMBEDDING_DIM: u64 = 1536;
pub const DEFAULT_QDRANT_COLLECTION: &str = "chat_memories";
pub const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_CLIENT_URL: &str = "http://localhost:5173";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub llm_api_key: String,
    pub llm_api_base: String,
    pub generation_model: String,
    pub embedding_model: String,
    pub embedding_dim: u64,
    pub qdrant_url: Option<String>,
    pub qdrant_collection: String,
    pub public_base_url: String,
    pub client_url: String,
}

impl AppConfig {
    pub fn new(secret_store: &SecretStore) -> Result<Self, anyhow::Error> {
        Self::from_lookup(|key| secret_store.get(key))
    }

    /// Builds the config from any key lookup. Required keys fail loudly,
    /// optional keys fall back to the defaults above.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| anyhow!("{} not found", key))
        };
        let optional = |key: &str, default: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET")?;
        let llm_api_key = required("LLM_API_KEY")?;

        let embedding_dim = match lookup("EMBEDDING_DIM") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|e| anyhow!("EMBEDDING_DIM is not a number: {}", e))?,
            None => DEFAULT_EMBEDDING_DIM,
        };

        Ok(AppConfig {
            database_url,
            jwt_secret,
            llm_api_key,
            llm_api_base: optional("LLM_API_BASE", DEFAULT_LLM_API_BASE),
            generation_model: optional("GENERATION_MODEL", DEFAULT_GENERATION_MODEL),
            embedding_model: optional("EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
            embedding_dim,
            qdrant_url: lookup("QDRANT_URL").filter(|value| !value.trim().is_empty()),
            qdrant_collection: optional("QDRANT_COLLECTION", DEFAULT_QDRANT_COLLECTION),
            public_base_url: optional("PUBLIC_BASE_URL", DEFAULT_PUBLIC_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            client_url: optional("CLIENT_URL", DEFAULT_CLIENT_URL),
        })
    }
}
