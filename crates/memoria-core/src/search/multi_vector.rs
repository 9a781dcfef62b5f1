//! Multi-vector strategy (§4.D): several independent
//! (vector-store, embedder, named-space) triples — e.g. a prose space and
//! a code space — each queried with its own embedding, emitted as one
//! fused stream. A memory hit in more than one space keeps its best score.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::adapters::{EmbeddingProvider, MemoryStorage, TaskType, VectorStore};
use crate::error::SearchError;
use crate::model::{QueryFilters, StrategyHit, StrategyKind};

use super::SearchStrategy;

/// One named embedding space participating in multi-vector retrieval.
pub struct MultiVectorSpace {
    pub name: String,
    pub vector_store: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn EmbeddingProvider>,
}

pub struct MultiVectorStrategy {
    spaces: Vec<MultiVectorSpace>,
    storage: Arc<dyn MemoryStorage>,
}

impl MultiVectorStrategy {
    pub fn new(spaces: Vec<MultiVectorSpace>, storage: Arc<dyn MemoryStorage>) -> Self {
        Self { spaces, storage }
    }
}

#[async_trait]
impl SearchStrategy for MultiVectorStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::MultiVector
    }

    async fn search(
        &self,
        tenant_id: &str,
        _project: &str,
        query_text: &str,
        filters: &QueryFilters,
        limit: usize,
    ) -> Result<Vec<StrategyHit>, SearchError> {
        let layer = filters.layers.as_ref().and_then(|l| l.first().copied());
        let mut best: HashMap<Uuid, f32> = HashMap::new();

        for space in &self.spaces {
            let embedding = space
                .embedder
                .embed_text(query_text, TaskType::SearchQuery)
                .await
                .map_err(|e| SearchError::Embedding(e.to_string()))?;
            let hits = space
                .vector_store
                .search_similar(&embedding, tenant_id, layer, Some(&space.name), limit, None)
                .await?;
            for (id, score) in hits {
                best.entry(id).and_modify(|s| *s = s.max(score)).or_insert(score);
            }
        }

        if best.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = best.keys().copied().collect();
        let records = self.storage.get_memories_batch(&ids, tenant_id).await?;
        let importance_of = |id: Uuid| records.iter().find(|r| r.id == id).map(|r| r.importance).unwrap_or(0.0);

        let mut results: Vec<StrategyHit> = best
            .into_iter()
            .map(|(memory_id, score)| StrategyHit {
                memory_id,
                score,
                importance: importance_of(memory_id),
            })
            .collect();
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        Ok(results)
    }
}
