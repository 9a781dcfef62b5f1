//! Sparse/keyword strategy (§4.D): delegates straight to the storage
//! adapter's full-text search (BM25-style scoring via SQLite FTS5).

use std::sync::Arc;

use async_trait::async_trait;

use crate::adapters::MemoryStorage;
use crate::error::SearchError;
use crate::model::{QueryFilters, StrategyHit, StrategyKind};

use super::SearchStrategy;

pub struct SparseStrategy {
    storage: Arc<dyn MemoryStorage>,
}

impl SparseStrategy {
    pub fn new(storage: Arc<dyn MemoryStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl SearchStrategy for SparseStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Sparse
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
        let hits = self
            .storage
            .search_memories(tenant_id, layer, query_text, limit, false)
            .await?;

        Ok(hits
            .into_iter()
            .map(|hit| StrategyHit {
                memory_id: hit.memory.id,
                score: hit.score,
                importance: hit.memory.importance,
            })
            .collect())
    }
}
