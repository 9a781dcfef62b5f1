//! Long-term layer: the union of episodic (time-bound) and semantic
//! (decontextualized) memory. No automatic decay; a periodic sweep
//! deletes items whose importance has fallen below a low floor.
//! Supports upgrading an episodic item into an abstracted semantic one.

use uuid::Uuid;

use crate::adapters::storage::MemoryFilter;
use crate::adapters::MemoryStorage;
use crate::config::LayerConfig;
use crate::error::{EngineError, EngineResult};
use crate::model::{InfoClass, Layer, MemoryRecord};

use super::{LayerAdapters, MemoryLayer};

pub struct LongTermLayer {
    adapters: LayerAdapters,
    floor: f32,
}

impl LongTermLayer {
    pub fn new(adapters: LayerAdapters, config: &LayerConfig) -> Self {
        Self {
            adapters,
            floor: config.long_term_floor,
        }
    }

    fn is_long_term(layer: Layer) -> bool {
        matches!(layer, Layer::Episodic | Layer::Semantic)
    }

    /// Abstracts an episodic item into a new semantic item: a fresh
    /// record whose metadata links back to the episodic ancestor, with
    /// importance bumped by +0.1 (capped at 1.0). The episodic ancestor
    /// is left untouched.
    pub async fn upgrade_to_semantic(&self, episodic_id: Uuid, tenant_id: &str) -> EngineResult<Uuid> {
        let ancestor = self
            .adapters
            .storage
            .get_memory(episodic_id, tenant_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(episodic_id.to_string()))?;
        if ancestor.layer != Layer::Episodic {
            return Err(EngineError::validation("upgrade_to_semantic requires an episodic source record"));
        }

        let mut semantic = ancestor.clone();
        semantic.id = Uuid::new_v4();
        semantic.layer = Layer::Semantic;
        semantic.importance = (ancestor.importance + 0.1).min(1.0);
        semantic.version = 1;
        semantic.access_count = 0;
        semantic.usage_count = 0;
        let now = chrono::Utc::now();
        semantic.created_at = now;
        semantic.modified_at = now;
        semantic.last_accessed_at = now;
        semantic
            .metadata
            .insert("episodic_ancestor".to_string(), serde_json::json!(ancestor.id.to_string()));

        self.adapters.storage.store_memory(semantic.clone()).await?;
        Ok(semantic.id)
    }

    async fn sweep_layer(&self, tenant_id: &str, layer: Layer) -> EngineResult<usize> {
        Ok(self
            .adapters
            .storage
            .delete_memories_below_importance(tenant_id, layer, self.floor)
            .await?)
    }
}

#[async_trait::async_trait]
impl MemoryLayer for LongTermLayer {
    fn layer_tag(&self) -> Layer {
        Layer::Episodic
    }

    async fn add(&self, mut record: MemoryRecord) -> EngineResult<Uuid> {
        if !Self::is_long_term(record.layer) {
            return Err(EngineError::validation(format!(
                "long-term layer accepts episodic or semantic records, got {}",
                record.layer
            )));
        }
        if record.info_class == InfoClass::Restricted && record.layer == Layer::Episodic {
            return Err(EngineError::security_policy(
                "restricted information-class content is forbidden in the episodic layer",
            ));
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
        let mut episodic = self
            .adapters
            .storage
            .search_memories(tenant_id, Some(Layer::Episodic), query, limit, false)
            .await?;
        let semantic = self
            .adapters
            .storage
            .search_memories(tenant_id, Some(Layer::Semantic), query, limit, false)
            .await?;
        episodic.extend(semantic);
        episodic.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        episodic.truncate(limit);
        Ok(episodic.into_iter().map(|h| h.memory).collect())
    }

    async fn count(&self, tenant_id: &str) -> EngineResult<usize> {
        let episodic_filter = MemoryFilter {
            layer: Some(Layer::Episodic),
            ..Default::default()
        };
        let semantic_filter = MemoryFilter {
            layer: Some(Layer::Semantic),
            ..Default::default()
        };
        Ok(self.adapters.storage.count_memories(tenant_id, &episodic_filter).await?
            + self.adapters.storage.count_memories(tenant_id, &semantic_filter).await?)
    }

    async fn cleanup(&self, tenant_id: &str) -> EngineResult<usize> {
        Ok(self.sweep_layer(tenant_id, Layer::Episodic).await? + self.sweep_layer(tenant_id, Layer::Semantic).await?)
    }
}
