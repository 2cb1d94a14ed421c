use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{cosine_similarity, rank, VectorMemoryStore};
use crate::error::IndexError;
use crate::models::{MemoryEntry, MemoryFilter, MemoryHit};

/// In-process vector index, used when no Qdrant URL is configured.
/// Contents do not survive a restart.
pub struct LocalMemoryStore {
    dimension: usize,
    entries: RwLock<Vec<MemoryEntry>>,
}

impl LocalMemoryStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl VectorMemoryStore for LocalMemoryStore {
    async fn create_memory(&self, entry: MemoryEntry) -> Result<(), IndexError> {
        if entry.vector.len() != self.dimension {
            return Err(IndexError::Malformed(format!(
                "expected {} dimensions, got {}",
                self.dimension,
                entry.vector.len()
            )));
        }

        debug!(
            "Storing memory for message {} of user {}",
            entry.message_id, entry.metadata.user_id
        );
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn query_memory(
        &self,
        query_vector: &[f32],
        limit: usize,
        filter: &MemoryFilter,
    ) -> Result<Vec<MemoryHit>, IndexError> {
        let entries = self.entries.read().await;

        let scored = entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| filter.matches(&entry.metadata))
            .map(|(position, entry)| {
                (
                    position,
                    MemoryHit {
                        message_id: entry.message_id,
                        score: cosine_similarity(query_vector, &entry.vector),
                        metadata: entry.metadata.clone(),
                    },
                )
            })
            .collect::<Vec<_>>();

        let hits = rank(scored, limit);
        debug!("Found {} matching memories", hits.len());
        Ok(hits)
    }

    async fn delete_memory(&self, message_ids: &[Uuid]) -> Result<(), IndexError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|entry| !message_ids.contains(&entry.message_id));
        debug!("Deleted {} memories", before - entries.len());
        Ok(())
    }
}
