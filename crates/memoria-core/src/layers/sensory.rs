//! Sensory layer: capacity-bounded ring, short wall-clock retention.
//!
//! Sensory items are never directly searched (§3 lifecycles); `search`
//! always returns empty. Expired items are physically deleted during any
//! write or a periodic sweep; items crossing the importance threshold are
//! promoted (re-tagged, persisted durably) into the working layer.

use std::sync::Arc;
use uuid::Uuid;

use crate::adapters::{storage::MemoryFilter, MemoryStorage};
use crate::config::LayerConfig;
use crate::error::{EngineError, EngineResult};
use crate::model::{Layer, MemoryRecord};

use super::{layer_mismatch_err, LayerAdapters, MemoryLayer};

pub struct SensoryLayer {
    adapters: LayerAdapters,
    capacity: usize,
    retention_secs: u64,
    promotion_importance: f32,
}

impl SensoryLayer {
    pub fn new(adapters: LayerAdapters, config: &LayerConfig) -> Self {
        Self {
            adapters,
            capacity: config.sensory_capacity,
            retention_secs: config.sensory_retention_secs,
            promotion_importance: config.working_promotion_importance,
        }
    }

    /// Most recent N items for a tenant (reads never count as "search" —
    /// this is a plain recency-ordered recall, not the full-text path).
    pub async fn recent(&self, tenant_id: &str, n: usize) -> EngineResult<Vec<MemoryRecord>> {
        let filter = MemoryFilter {
            layer: Some(Layer::Sensory),
            ..Default::default()
        };
        Ok(self
            .adapters
            .storage
            .list_memories(tenant_id, &filter, n, 0, "created_at", true)
            .await?)
    }

    /// Enforces the ring's capacity bound by deleting the oldest items
    /// beyond `capacity`, and evicts anything past `retention_secs`.
    /// Items whose importance has crossed the promotion threshold are
    /// promoted to the working layer before being otherwise evicted.
    async fn sweep(&self, tenant_id: &str) -> EngineResult<usize> {
        self.adapters.storage.delete_expired_memories(tenant_id, Layer::Sensory).await?;

        let filter = MemoryFilter {
            layer: Some(Layer::Sensory),
            ..Default::default()
        };
        let all = self
            .adapters
            .storage
            .list_memories(tenant_id, &filter, usize::MAX, 0, "created_at", true)
            .await?;

        let mut affected = 0;
        let now = chrono::Utc::now();
        for record in &all {
            let age = now.signed_duration_since(record.created_at).num_seconds();
            if age >= self.retention_secs as i64 {
                if record.importance >= self.promotion_importance {
                    self.promote(record.clone(), tenant_id).await?;
                } else {
                    self.adapters.storage.delete_memory(record.id, tenant_id).await?;
                }
                affected += 1;
            }
        }

        if all.len() > self.capacity {
            let overflow = &all[self.capacity..];
            for record in overflow {
                if record.importance >= self.promotion_importance {
                    self.promote(record.clone(), tenant_id).await?;
                } else {
                    self.adapters.storage.delete_memory(record.id, tenant_id).await?;
                }
                affected += 1;
            }
        }

        Ok(affected)
    }

    async fn promote(&self, mut record: MemoryRecord, tenant_id: &str) -> EngineResult<()> {
        record.layer = Layer::Working;
        record.bump_version();
        self.adapters.storage.store_memory(record).await?;
        let _ = tenant_id;
        Ok(())
    }
}

#[async_trait::async_trait]
impl MemoryLayer for SensoryLayer {
    fn layer_tag(&self) -> Layer {
        Layer::Sensory
    }

    async fn add(&self, mut record: MemoryRecord) -> EngineResult<Uuid> {
        if record.layer != Layer::Sensory {
            return Err(layer_mismatch_err(Layer::Sensory, record.layer));
        }
        record.validate().map_err(EngineError::validation)?;
        if record.expires_at.is_none() {
            record.expires_at = Some(record.created_at + chrono::Duration::seconds(self.retention_secs as i64));
        }
        let tenant_id = record.tenant_id.clone();
        let id = self.adapters.storage.store_memory(record).await?;
        let _ = self.sweep(&tenant_id).await;
        Ok(id)
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

    async fn search(&self, _tenant_id: &str, _query: &str, _limit: usize) -> EngineResult<Vec<MemoryRecord>> {
        // Invariant (§3): sensory items are never directly searched.
        Ok(Vec::new())
    }

    async fn count(&self, tenant_id: &str) -> EngineResult<usize> {
        let filter = MemoryFilter {
            layer: Some(Layer::Sensory),
            ..Default::default()
        };
        Ok(self.adapters.storage.count_memories(tenant_id, &filter).await?)
    }

    async fn cleanup(&self, tenant_id: &str) -> EngineResult<usize> {
        self.sweep(tenant_id).await
    }
}
