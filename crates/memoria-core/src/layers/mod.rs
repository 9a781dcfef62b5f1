//! Memory layers (§4.C)
//!
//! Four façades over the storage+vector adapters, each pinned to a fixed
//! layer tag and its own lifecycle policy: sensory (ring buffer), working
//! (promotion + consolidation), long-term (episodic/semantic union, decay
//! floor sweep), reflective (insights, protected from decay).

mod long_term;
mod reflective;
mod sensory;
mod working;

pub use long_term::LongTermLayer;
pub use reflective::ReflectiveLayer;
pub use sensory::SensoryLayer;
pub use working::{ConsolidationOutcome, WorkingLayer};

use std::sync::Arc;
use uuid::Uuid;

use crate::adapters::{MemoryStorage, VectorStore};
use crate::error::{EngineError, EngineResult};
use crate::model::{Layer, MemoryRecord};

/// Shared adapter handles every layer façade is built from.
#[derive(Clone)]
pub struct LayerAdapters {
    pub storage: Arc<dyn MemoryStorage>,
    pub vector_store: Arc<dyn VectorStore>,
}

/// Behavior common to every layer façade.
#[async_trait::async_trait]
pub trait MemoryLayer: Send + Sync {
    fn layer_tag(&self) -> Layer;

    async fn add(&self, record: MemoryRecord) -> EngineResult<Uuid>;

    /// Fetches by id, bumping the access counter (storage invariant:
    /// `access_count`/`last_accessed_at` only increase).
    async fn get(&self, memory_id: Uuid, tenant_id: &str) -> EngineResult<Option<MemoryRecord>>;

    async fn search(&self, tenant_id: &str, query: &str, limit: usize) -> EngineResult<Vec<MemoryRecord>>;

    async fn count(&self, tenant_id: &str) -> EngineResult<usize>;

    /// Layer-specific maintenance sweep; returns the number of records
    /// affected (evicted, promoted, or deleted, depending on the layer).
    async fn cleanup(&self, tenant_id: &str) -> EngineResult<usize>;
}

pub(crate) fn layer_mismatch_err(expected: Layer, got: Layer) -> EngineError {
    EngineError::validation(format!("expected layer {expected}, record tagged {got}"))
}
