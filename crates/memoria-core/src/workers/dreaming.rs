//! Dreaming worker (§4.G): periodically samples a tenant/project's recent
//! important memories and runs them through the reflection engine,
//! producing consolidated insights without any live task outcome driving
//! it (the "offline" reflection pass, as opposed to the inline
//! post-action reflection the reflection engine also serves).
//!
//! Grounded in `original_source/apps/memory_api/services/dreaming_service.py`
//! (or its nearest equivalent maintenance worker): lookback window, the
//! importance gate, the sample cap, and — critically — the "skip if fewer
//! than 3 qualifying memories" invariant, preserved verbatim rather than
//! silently running on an undersized sample.

use std::sync::Arc;

use chrono::Utc;

use crate::adapters::{storage::MemoryFilter, MemoryStorage};
use crate::config::DreamingConfig;
use crate::error::WorkerError;
use crate::model::Layer;

use super::reflection::{Outcome, ReflectionContext, ReflectionEngine, ReflectionOutcome};

pub struct DreamingWorker {
    storage: Arc<dyn MemoryStorage>,
    reflection_engine: Arc<ReflectionEngine>,
    config: DreamingConfig,
}

impl DreamingWorker {
    pub fn new(storage: Arc<dyn MemoryStorage>, reflection_engine: Arc<ReflectionEngine>, config: DreamingConfig) -> Self {
        Self {
            storage,
            reflection_engine,
            config,
        }
    }

    /// Runs one dreaming pass for a tenant/project/agent. Returns `None`
    /// when fewer than `min_qualifying_memories` memories pass the
    /// importance+lookback gate — dreaming never runs on an undersized
    /// sample.
    pub async fn run(
        &self,
        tenant_id: &str,
        project: &str,
        agent_id: &str,
    ) -> Result<Option<ReflectionOutcome>, WorkerError> {
        if !self.config.enabled {
            return Err(WorkerError::Disabled);
        }

        let cutoff = Utc::now() - chrono::Duration::hours(self.config.lookback_hours);
        let filter = MemoryFilter {
            min_importance: Some(self.config.min_importance),
            created_after: Some(cutoff),
            ..Default::default()
        };

        let mut candidates = self
            .storage
            .list_memories(tenant_id, &filter, self.config.max_samples, 0, "importance", true)
            .await?;
        candidates.retain(|r| r.project == project && r.layer != Layer::Reflective);

        if candidates.len() < self.config.min_qualifying_memories {
            return Ok(None);
        }

        let events: Vec<String> = candidates.iter().map(|r| r.content.clone()).collect();
        let context = ReflectionContext {
            tenant_id: tenant_id.to_string(),
            project: project.to_string(),
            agent_id: agent_id.to_string(),
            outcome: Outcome::Partial,
            events,
            task_goal: "consolidate recent important experience into reusable insight".to_string(),
            error_info: None,
        };

        Ok(Some(self.reflection_engine.reflect(&context).await?))
    }
}
