//! Decay worker (§4.G): a daily, per-tenant multiplicative importance
//! decay pass. Reflective memories are exempt; tags and metadata are
//! left untouched.
//!
//! Grounded in
//! `original_source/apps/memory_api/services/importance_scoring.py`:
//! the same day-bucketed factor table, reproduced verbatim.

use std::sync::Arc;

use crate::adapters::MemoryStorage;
use crate::config::DecayConfig;
use crate::error::WorkerError;
use crate::model::{Layer, MemoryRecord};

const IMPORTANCE_FLOOR: f32 = 0.01;

/// `days_since_access > 30 → 1 − rate·(1+days/30)`; `< 7 → 1 − rate·0.5`;
/// otherwise `1 − rate`. The multiplier is never allowed to push the new
/// importance below [`IMPORTANCE_FLOOR`].
pub fn decay_factor(days_since_access: f64, base_rate: f32) -> f32 {
    if days_since_access > 30.0 {
        1.0 - base_rate * (1.0 + (days_since_access / 30.0) as f32)
    } else if days_since_access < 7.0 {
        1.0 - base_rate * 0.5
    } else {
        1.0 - base_rate
    }
}

pub fn decayed_importance(record: &MemoryRecord, now: chrono::DateTime<chrono::Utc>, base_rate: f32) -> f32 {
    let days = now.signed_duration_since(record.last_accessed_at).num_seconds() as f64 / 86_400.0;
    let factor = decay_factor(days.max(0.0), base_rate);
    (record.importance * factor).max(IMPORTANCE_FLOOR)
}

pub struct DecayWorker {
    storage: Arc<dyn MemoryStorage>,
    config: DecayConfig,
}

impl DecayWorker {
    pub fn new(storage: Arc<dyn MemoryStorage>, config: DecayConfig) -> Self {
        Self { storage, config }
    }

    /// Applies the decay factor to every non-reflective layer for a
    /// tenant. Returns the number of records touched. The storage
    /// adapter clamps the returned value to `[0.01, 1.0]` itself, so the
    /// factor callback here only needs to compute the raw product.
    pub async fn run_for_tenant(&self, tenant_id: &str) -> Result<usize, WorkerError> {
        let base_rate = self.config.base_decay_rate;
        let mut touched = 0;
        for layer in [Layer::Sensory, Layer::Working, Layer::Episodic, Layer::Semantic] {
            let factor_fn = move |record: &MemoryRecord| decayed_importance(record, chrono::Utc::now(), base_rate);
            touched += self.storage.decay_importance(tenant_id, layer, &factor_fn).await?;
        }
        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_memories_decay_faster() {
        let stale = decay_factor(45.0, 0.1);
        let fresh = decay_factor(3.0, 0.1);
        let mid = decay_factor(15.0, 0.1);
        assert!(stale < mid);
        assert!(mid < fresh);
    }

    #[test]
    fn decayed_importance_never_drops_below_floor() {
        let mut record = MemoryRecord::new("t", "p", "a", "hi", Layer::Working, "user");
        record.importance = 0.02;
        record.last_accessed_at = chrono::Utc::now() - chrono::Duration::days(400);
        let result = decayed_importance(&record, chrono::Utc::now(), 0.5);
        assert!(result >= IMPORTANCE_FLOOR);
    }
}
