//! Dense-vector strategy (§4.D): embed the query with the
//! "search_query" task-type hint and delegate to the vector store.

use std::sync::Arc;

use async_trait::async_trait;

use crate::adapters::{EmbeddingProvider, MemoryStorage, TaskType, VectorStore};
use crate::error::SearchError;
use crate::model::{QueryFilters, StrategyHit, StrategyKind};

use super::SearchStrategy;

pub struct DenseVectorStrategy {
    embedder: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    storage: Arc<dyn MemoryStorage>,
}

impl DenseVectorStrategy {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, vector_store: Arc<dyn VectorStore>, storage: Arc<dyn MemoryStorage>) -> Self {
        Self {
            embedder,
            vector_store,
            storage,
        }
    }
}

#[async_trait]
impl SearchStrategy for DenseVectorStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DenseVector
    }

    async fn search(
        &self,
        tenant_id: &str,
        _project: &str,
        query_text: &str,
        filters: &QueryFilters,
        limit: usize,
    ) -> Result<Vec<StrategyHit>, SearchError> {
        let embedding = self
            .embedder
            .embed_text(query_text, TaskType::SearchQuery)
            .await
            .map_err(|e| SearchError::Embedding(e.to_string()))?;

        let layer = filters.layers.as_ref().and_then(|l| l.first().copied());
        let hits = self
            .vector_store
            .search_similar(&embedding, tenant_id, layer, None, limit, None)
            .await?;

        let ids: Vec<_> = hits.iter().map(|(id, _)| *id).collect();
        let records = self.storage.get_memories_batch(&ids, tenant_id).await?;
        let importance_of = |id: uuid::Uuid| records.iter().find(|r| r.id == id).map(|r| r.importance).unwrap_or(0.0);

        Ok(hits
            .into_iter()
            .map(|(id, score)| StrategyHit {
                memory_id: id,
                score,
                importance: importance_of(id),
            })
            .collect())
    }
}
