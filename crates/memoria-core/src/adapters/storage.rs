//! Abstract storage interface
//!
//! All storage adapters (PostgreSQL, SQLite, in-memory) implement this
//! trait. Every operation takes a tenant identifier; a record existing
//! under a different tenant is reported as not-found, never leaked.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::model::{Layer, MemoryRecord};

/// Predicate set accepted by `list_memories`/`count_memories`.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    pub agent_id: Option<String>,
    pub layer: Option<Layer>,
    pub tags: Option<Vec<String>>,
    pub session_id: Option<String>,
    pub source: Option<String>,
    pub metadata_equals: Option<(String, serde_json::Value)>,
    pub min_importance: Option<f32>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub exclude_consolidated: bool,
}

/// A full-text search hit: the stored record and its textual match score.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub memory: MemoryRecord,
    pub score: f32,
}

#[async_trait]
pub trait MemoryStorage: Send + Sync {
    async fn store_memory(&self, record: MemoryRecord) -> StorageResult<Uuid>;

    async fn get_memory(&self, memory_id: Uuid, tenant_id: &str) -> StorageResult<Option<MemoryRecord>>;

    async fn get_memories_batch(&self, memory_ids: &[Uuid], tenant_id: &str) -> StorageResult<Vec<MemoryRecord>>;

    /// Partial update by field map; bumps `version`.
    async fn update_memory(
        &self,
        memory_id: Uuid,
        tenant_id: &str,
        updates: serde_json::Value,
    ) -> StorageResult<bool>;

    async fn delete_memory(&self, memory_id: Uuid, tenant_id: &str) -> StorageResult<bool>;

    async fn list_memories(
        &self,
        tenant_id: &str,
        filter: &MemoryFilter,
        limit: usize,
        offset: usize,
        order_by: &str,
        descending: bool,
    ) -> StorageResult<Vec<MemoryRecord>>;

    async fn count_memories(&self, tenant_id: &str, filter: &MemoryFilter) -> StorageResult<usize>;

    /// Substring/inverted-index full-text search over content.
    async fn search_memories(
        &self,
        tenant_id: &str,
        layer: Option<Layer>,
        query: &str,
        limit: usize,
        exact_phrase: bool,
    ) -> StorageResult<Vec<SearchHit>>;

    async fn delete_memories_with_metadata_filter(
        &self,
        tenant_id: &str,
        layer: Layer,
        metadata_key: &str,
        metadata_value: &serde_json::Value,
    ) -> StorageResult<usize>;

    async fn delete_memories_below_importance(
        &self,
        tenant_id: &str,
        layer: Layer,
        importance_threshold: f32,
    ) -> StorageResult<usize>;

    async fn delete_expired_memories(&self, tenant_id: &str, layer: Layer) -> StorageResult<usize>;

    /// Bumps `access_count`/`last_accessed_at`; does not bump `version`.
    async fn touch_access(&self, memory_id: Uuid, tenant_id: &str) -> StorageResult<bool>;

    async fn touch_access_batch(&self, memory_ids: &[Uuid], tenant_id: &str) -> StorageResult<bool>;

    /// Bumps `usage_count` only, independent of `touch_access` (§8 Open
    /// Question: the two counters are tracked separately, not in
    /// lockstep). Called wherever a memory is marked as having been
    /// *used* in a downstream context, as distinct from merely retrieved.
    async fn touch_usage_batch(&self, memory_ids: &[Uuid], tenant_id: &str) -> StorageResult<bool>;

    /// Additive importance adjustment, clamped to [0,1]. Returns the new value.
    async fn adjust_importance(&self, memory_id: Uuid, tenant_id: &str, delta: f32) -> StorageResult<f32>;

    /// Multiplicative, tenant-wide decay pass. Returns the number of
    /// records updated. Reflective memories are exempt by convention at
    /// the worker layer, not here — this call touches whatever the caller
    /// filters to.
    async fn decay_importance(
        &self,
        tenant_id: &str,
        layer: Layer,
        factor_fn: &(dyn Fn(&MemoryRecord) -> f32 + Send + Sync),
    ) -> StorageResult<usize>;

    async fn get_metric_aggregate(
        &self,
        tenant_id: &str,
        filter: &MemoryFilter,
        metric: &str,
        func: &str,
    ) -> StorageResult<f64>;

    async fn clear_tenant(&self, tenant_id: &str) -> StorageResult<usize>;
}
