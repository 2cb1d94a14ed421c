use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance,
    Filter, PointId, PointStruct, SearchPointsBuilder, UpsertPointsBuilder, Value,
    VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use tracing::{debug, info};
use uuid::Uuid;

use super::{rank, VectorMemoryStore};
use crate::error::IndexError;
use crate::models::{MemoryEntry, MemoryFilter, MemoryHit, MemoryMetadata};

const CHAT_ID: &str = "chat_id";
const USER_ID: &str = "user_id";
const TEXT: &str = "text";
const INSERTED_AT: &str = "inserted_at";

/// Largest search issued while resolving a tie at the cut.
const MAX_TIE_FETCH: u64 = 1024;

/// Long-term memory backed by a Qdrant collection. Point ids are message ids.
pub struct QdrantMemoryStore {
    client: Qdrant,
    collection: String,
}

impl QdrantMemoryStore {
    /// Connects and creates the collection when it is missing.
    pub async fn connect(url: &str, collection: &str, dimension: u64) -> Result<Self, IndexError> {
        debug!("Connecting to Qdrant at {}", url);

        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| {
                IndexError::Unreachable(format!("failed to create Qdrant client: {}", e))
            })?;

        let store = Self {
            client,
            collection: collection.to_string(),
        };
        store.ensure_collection(dimension).await?;
        Ok(store)
    }

    async fn ensure_collection(&self, dimension: u64) -> Result<(), IndexError> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| IndexError::Unreachable(e.to_string()))?;

        if exists {
            debug!("Collection {} already exists", self.collection);
            return Ok(());
        }

        info!("Creating collection: {}", self.collection);
        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(dimension, Distance::Cosine)),
            )
            .await
            .map_err(|e| IndexError::Unreachable(e.to_string()))?;

        Ok(())
    }

    /// One similarity search. Hits come back keyed by the insertion
    /// timestamp stored in their payload.
    async fn search(
        &self,
        query_vector: &[f32],
        limit: u64,
        filter: Option<Filter>,
        score_threshold: Option<f32>,
    ) -> Result<Vec<(i64, MemoryHit)>, IndexError> {
        let mut search = SearchPointsBuilder::new(&self.collection, query_vector.to_vec(), limit)
            .with_payload(true);
        if let Some(filter) = filter {
            search = search.filter(filter);
        }
        if let Some(threshold) = score_threshold {
            search = search.score_threshold(threshold);
        }

        let response = self
            .client
            .search_points(search)
            .await
            .map_err(|e| IndexError::Unreachable(format!("failed to search memories: {}", e)))?;

        let scored = response
            .result
            .into_iter()
            .filter_map(|point| {
                let message_id = point.id.and_then(uuid_from_point_id)?;
                let payload = point.payload;
                let chat_id =
                    get_string(&payload, CHAT_ID).and_then(|id| Uuid::parse_str(&id).ok())?;
                let metadata = MemoryMetadata {
                    chat_id,
                    user_id: get_string(&payload, USER_ID)?,
                    text: get_string(&payload, TEXT).unwrap_or_default(),
                };
                let inserted_at = payload
                    .get(INSERTED_AT)
                    .and_then(|v| v.as_integer())
                    .unwrap_or(i64::MAX);
                Some((
                    inserted_at,
                    MemoryHit {
                        message_id,
                        score: point.score,
                        metadata,
                    },
                ))
            })
            .collect();

        Ok(scored)
    }
}

#[async_trait]
impl VectorMemoryStore for QdrantMemoryStore {
    async fn create_memory(&self, entry: MemoryEntry) -> Result<(), IndexError> {
        if entry.vector.is_empty() {
            return Err(IndexError::Malformed("cannot index an empty vector".to_string()));
        }

        let payload: HashMap<String, Value> = [
            (CHAT_ID.to_string(), Value::from(entry.metadata.chat_id.to_string())),
            (USER_ID.to_string(), Value::from(entry.metadata.user_id.clone())),
            (TEXT.to_string(), Value::from(entry.metadata.text.clone())),
            (INSERTED_AT.to_string(), Value::from(Utc::now().timestamp_micros())),
        ]
        .into_iter()
        .collect();

        let point = PointStruct::new(entry.message_id.to_string(), entry.vector, payload);

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]).wait(true))
            .await
            .map_err(|e| IndexError::Unreachable(format!("failed to upsert memory: {}", e)))?;

        debug!("Memory for message {} stored", entry.message_id);
        Ok(())
    }

    async fn query_memory(
        &self,
        query_vector: &[f32],
        limit: usize,
        filter: &MemoryFilter,
    ) -> Result<Vec<MemoryHit>, IndexError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let filter = payload_filter(filter);

        let mut scored = self.search(query_vector, limit as u64, filter.clone(), None).await?;

        // Qdrant picks arbitrarily among points tied at the cut, so widen the
        // search to everything scoring at least the boundary before ranking.
        let scores = scored.iter().map(|(_, hit)| hit.score).collect::<Vec<_>>();
        if let Some(boundary) = tie_boundary(&scores, limit) {
            let mut fetch = (limit as u64).saturating_mul(2).min(MAX_TIE_FETCH);
            loop {
                scored = self
                    .search(query_vector, fetch, filter.clone(), Some(boundary))
                    .await?;
                if (scored.len() as u64) < fetch || fetch >= MAX_TIE_FETCH {
                    break;
                }
                fetch = fetch.saturating_mul(2).min(MAX_TIE_FETCH);
            }
        }

        let hits = rank(scored, limit);
        debug!("Found {} matching memories", hits.len());
        Ok(hits)
    }

    async fn delete_memory(&self, message_ids: &[Uuid]) -> Result<(), IndexError> {
        if message_ids.is_empty() {
            return Ok(());
        }

        let ids = message_ids.iter().map(|id| id.to_string()).collect::<Vec<_>>();

        self.client
            .delete_points(DeletePointsBuilder::new(&self.collection).points(ids).wait(true))
            .await
            .map_err(|e| IndexError::Unreachable(format!("failed to delete memories: {}", e)))?;

        debug!("Deleted memories for {} messages", message_ids.len());
        Ok(())
    }
}

fn payload_filter(filter: &MemoryFilter) -> Option<Filter> {
    let mut conditions = Vec::new();
    if let Some(user_id) = &filter.user_id {
        conditions.push(Condition::matches(USER_ID, user_id.clone()));
    }
    if let Some(chat_id) = filter.chat_id {
        conditions.push(Condition::matches(CHAT_ID, chat_id.to_string()));
    }

    if conditions.is_empty() {
        None
    } else {
        Some(Filter::must(conditions))
    }
}

/// The score at the cut when a search came back full. Unreturned points
/// may share it.
fn tie_boundary(scores: &[f32], limit: usize) -> Option<f32> {
    if limit == 0 || scores.len() < limit {
        return None;
    }
    scores.last().copied()
}

fn uuid_from_point_id(point_id: PointId) -> Option<Uuid> {
    match point_id.point_id_options? {
        PointIdOptions::Uuid(uuid_str) => Uuid::parse_str(&uuid_str).ok(),
        PointIdOptions::Num(_) => None,
    }
}

fn get_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
    payload
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}
