//! Long-term memory: one vector per persisted message, searched by cosine
//! similarity and scoped by exact-match metadata filters.

mod local;
mod qdrant;

pub use local::LocalMemoryStore;
pub use qdrant::QdrantMemoryStore;

use std::cmp::Ordering;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::IndexError;
use crate::models::{MemoryEntry, MemoryFilter, MemoryHit};

#[async_trait]
pub trait VectorMemoryStore: Send + Sync {
    async fn create_memory(&self, entry: MemoryEntry) -> Result<(), IndexError>;

    /// Up to `limit` entries matching `filter`, most similar first. Equal
    /// scores keep insertion order. No entries is `Ok(vec![])`.
    async fn query_memory(
        &self,
        query_vector: &[f32],
        limit: usize,
        filter: &MemoryFilter,
    ) -> Result<Vec<MemoryHit>, IndexError>;

    /// Drops the entries of the given messages. Unknown ids are ignored.
    async fn delete_memory(&self, message_ids: &[Uuid]) -> Result<(), IndexError>;
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

/// Sorts `(insertion_key, hit)` pairs by descending score, then ascending
/// insertion key, and keeps the first `limit`.
pub(crate) fn rank<K: Ord>(mut scored: Vec<(K, MemoryHit)>, limit: usize) -> Vec<MemoryHit> {
    scored.sort_by(|(key_a, a), (key_b, b)| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| key_a.cmp(key_b))
    });
    scored.truncate(limit);
    scored.into_iter().map(|(_, hit)| hit).collect()
}
