//! Reflective layer: insights, patterns, and summaries generated by the
//! reflection engine. Stored with a high default importance and a floor
//! below which decay (exempted at the worker level, enforced again here
//! as a belt-and-suspenders invariant) may never push them.

use uuid::Uuid;

use crate::adapters::storage::MemoryFilter;
use crate::adapters::MemoryStorage;
use crate::config::LayerConfig;
use crate::error::{EngineError, EngineResult};
use crate::model::{Layer, MemoryRecord};

use super::{layer_mismatch_err, LayerAdapters, MemoryLayer};

pub struct ReflectiveLayer {
    adapters: LayerAdapters,
    default_importance: f32,
    floor: f32,
}

impl ReflectiveLayer {
    pub fn new(adapters: LayerAdapters, config: &LayerConfig) -> Self {
        Self {
            adapters,
            default_importance: config.reflective_default_importance,
            floor: config.reflective_floor,
        }
    }

    /// Links this reflection to the memory identifiers that produced it.
    pub fn link_sources(record: &mut MemoryRecord, source_ids: &[Uuid]) {
        record.metadata.insert(
            "source_memory_ids".to_string(),
            serde_json::json!(source_ids.iter().map(Uuid::to_string).collect::<Vec<_>>()),
        );
    }
}

#[async_trait::async_trait]
impl MemoryLayer for ReflectiveLayer {
    fn layer_tag(&self) -> Layer {
        Layer::Reflective
    }

    async fn add(&self, mut record: MemoryRecord) -> EngineResult<Uuid> {
        if record.layer != Layer::Reflective {
            return Err(layer_mismatch_err(Layer::Reflective, record.layer));
        }
        if record.importance < self.default_importance {
            record.importance = self.default_importance;
        }
        record.validate().map_err(EngineError::validation)?;
        Ok(self.adapters.storage.store_memory(record).await?)
    }

    async fn get(&self, memory_id: Uuid, tenant_id: &str) -> EngineResult<Option<MemoryRecord>> {
        if let Some(mut record) = self.adapters.storage.get_memory(memory_id, tenant_id).await? {
            self.adapters.storage.touch_access(memory_id, tenant_id).await?;
            record.touch_access();
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }

    async fn search(&self, tenant_id: &str, query: &str, limit: usize) -> EngineResult<Vec<MemoryRecord>> {
        let hits = self
            .adapters
            .storage
            .search_memories(tenant_id, Some(Layer::Reflective), query, limit, false)
            .await?;
        Ok(hits.into_iter().map(|h| h.memory).collect())
    }

    async fn count(&self, tenant_id: &str) -> EngineResult<usize> {
        let filter = MemoryFilter {
            layer: Some(Layer::Reflective),
            ..Default::default()
        };
        Ok(self.adapters.storage.count_memories(tenant_id, &filter).await?)
    }

    /// Enforces the decay floor: any reflective item that slipped below
    /// it (e.g. from a manual `adjust_importance` call) is bumped back up
    /// rather than deleted — reflections never decay below the floor.
    async fn cleanup(&self, tenant_id: &str) -> EngineResult<usize> {
        let filter = MemoryFilter {
            layer: Some(Layer::Reflective),
            ..Default::default()
        };
        let all = self
            .adapters
            .storage
            .list_memories(tenant_id, &filter, usize::MAX, 0, "importance", false)
            .await?;
        let mut fixed = 0;
        for record in all {
            if record.importance < self.floor {
                let delta = self.floor - record.importance;
                self.adapters.storage.adjust_importance(record.id, tenant_id, delta).await?;
                fixed += 1;
            }
        }
        Ok(fixed)
    }
}
