use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{get, web};
use anyhow::Context;
use shuttle_actix_web::ShuttleActixWeb;
use shuttle_runtime::SecretStore;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::auth::{IdentityVerifier, JwtVerifier, PgUserDirectory};
use crate::config::AppConfig;
use crate::conversation::{ConversationStore, PgConversationStore};
use crate::gateway::{chat_socket, TurnPipeline};
use crate::memory::{LocalMemoryStore, QdrantMemoryStore, VectorMemoryStore};
use crate::oai::{oai_client, OpenAiEmbedder, OpenAiGenerator};

mod auth;
mod config;
mod conversation;
mod error;
mod gateway;
mod memory;
mod middleware;
mod models;
mod oai;
mod prompts;
mod routes;
#[cfg(test)]
mod testing;
mod types;

pub struct AppState {
    pub conversations: Arc<dyn ConversationStore>,
    pub memory: Arc<dyn VectorMemoryStore>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub pipeline: TurnPipeline,
}

#[get("/health")]
async fn health() -> &'static str {
    "OK"
}

async fn memory_store(app_config: &AppConfig) -> anyhow::Result<Arc<dyn VectorMemoryStore>> {
    match &app_config.qdrant_url {
        Some(url) => {
            let store = QdrantMemoryStore::connect(
                url,
                &app_config.qdrant_collection,
                app_config.embedding_dim,
            )
            .await
            .context("failed to connect to Qdrant")?;
            info!("Using Qdrant collection {}", app_config.qdrant_collection);
            Ok(Arc::new(store))
        }
        None => {
            warn!(
                "QDRANT_URL not set, long-term memory is in-process and will not survive a restart"
            );
            let dimension = usize::try_from(app_config.embedding_dim)
                .context("EMBEDDING_DIM does not fit in memory")?;
            Ok(Arc::new(LocalMemoryStore::new(dimension)))
        }
    }
}

#[shuttle_runtime::main]
async fn main(
    #[shuttle_runtime::Secrets] secret_store: SecretStore,
) -> ShuttleActixWeb<impl FnOnce(&mut web::ServiceConfig) + Send + Clone + 'static> {
    let app_config = Arc::new(AppConfig::new(&secret_store)?);

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&app_config.database_url)
        .await
        .context("failed to connect to Postgres")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    let conversations: Arc<dyn ConversationStore> =
        Arc::new(PgConversationStore::new(pool.clone()));
    let memory = memory_store(&app_config).await?;
    let client = oai_client(&app_config);
    let pipeline = TurnPipeline::new(
        conversations.clone(),
        memory.clone(),
        Arc::new(OpenAiEmbedder::new(client.clone(), &app_config)),
        Arc::new(OpenAiGenerator::new(client, &app_config)),
        &app_config.public_base_url,
    );
    let verifier: Arc<dyn IdentityVerifier> = Arc::new(JwtVerifier::new(
        &app_config.jwt_secret,
        Arc::new(PgUserDirectory::new(pool)),
    ));

    let app_state = Arc::new(AppState {
        conversations,
        memory,
        verifier: verifier.clone(),
        pipeline,
    });

    let config = move |cfg: &mut web::ServiceConfig| {
        let cors = Cors::default()
            .allowed_origin(&app_config.client_url)
            .allow_any_method()
            .allow_any_header()
            .supports_credentials();

        cfg.app_data(web::Data::new(app_state)).service(
            web::scope("")
                .wrap(cors)
                .service(health)
                .service(chat_socket)
                .configure(|cfg| routes::configure(cfg, verifier)),
        );
    };

    Ok(config.into())
}
