//! Engine-wide configuration
//!
//! One `EngineConfig` holding every default named across the component
//! specs, plus the per-worker config structs. Deserializable so a caller
//! can load overrides from a file or environment without touching code.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration for an [`crate::engine::EngineFacade`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub layers: LayerConfig,
    pub scoring: ScoringConfig,
    pub search: SearchConfig,
    pub timeouts: TimeoutConfig,
    pub decay: DecayConfig,
    pub summarization: SummarizationConfig,
    pub dreaming: DreamingConfig,
    pub reflective_memory_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            layers: LayerConfig::default(),
            scoring: ScoringConfig::default(),
            search: SearchConfig::default(),
            timeouts: TimeoutConfig::default(),
            decay: DecayConfig::default(),
            summarization: SummarizationConfig::default(),
            dreaming: DreamingConfig::default(),
            reflective_memory_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
    pub sensory_capacity: usize,
    pub sensory_retention_secs: u64,
    pub working_capacity: usize,
    pub working_retention_secs: u64,
    pub working_promotion_importance: f32,
    pub working_promotion_usage_count: u32,
    pub long_term_floor: f32,
    pub reflective_default_importance: f32,
    pub reflective_floor: f32,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            sensory_capacity: 100,
            sensory_retention_secs: 30,
            working_capacity: 100,
            working_retention_secs: 60 * 60,
            working_promotion_importance: 0.6,
            working_promotion_usage_count: 3,
            long_term_floor: 0.1,
            reflective_default_importance: 0.6,
            reflective_floor: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub alpha_similarity: f32,
    pub beta_importance: f32,
    pub gamma_recency: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            alpha_similarity: 0.4,
            beta_importance: 0.3,
            gamma_recency: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Reciprocal Rank Fusion constant K.
    pub rrf_k: f32,
    pub default_top_k: usize,
    pub graph_traversal_depth: u32,
    pub max_concurrent_strategies: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            default_top_k: 10,
            graph_traversal_depth: 2,
            max_concurrent_strategies: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub embedding_ms: u64,
    pub llm_ms: u64,
    pub vector_search_ms: u64,
    pub storage_ms: u64,
    /// Top-level deadline for a whole `query` call (§5, §7.6). Bounds the
    /// fusion pipeline end to end, on top of (not instead of) the
    /// per-strategy deadlines below.
    pub query_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            embedding_ms: 5_000,
            llm_ms: 30_000,
            vector_search_ms: 2_000,
            storage_ms: 1_000,
            query_ms: 10_000,
        }
    }
}

impl TimeoutConfig {
    pub fn embedding(&self) -> Duration {
        Duration::from_millis(self.embedding_ms)
    }
    pub fn llm(&self) -> Duration {
        Duration::from_millis(self.llm_ms)
    }
    pub fn vector_search(&self) -> Duration {
        Duration::from_millis(self.vector_search_ms)
    }
    pub fn storage(&self) -> Duration {
        Duration::from_millis(self.storage_ms)
    }
    pub fn query(&self) -> Duration {
        Duration::from_millis(self.query_ms)
    }

    /// Deadline a search strategy's adapter call is budgeted against
    /// (§5): dense/multi-vector strategies bottom out in a vector-store
    /// similarity search, the rest bottom out in a storage or graph-store
    /// read, which share the storage budget since §5 names no separate
    /// graph-store deadline.
    pub fn for_strategy(&self, kind: crate::model::StrategyKind) -> Duration {
        use crate::model::StrategyKind::*;
        match kind {
            DenseVector | MultiVector => self.vector_search(),
            Sparse | Anchor | Graph => self.storage(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    pub base_decay_rate: f32,
    pub access_count_boost: bool,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            base_decay_rate: 0.01,
            access_count_boost: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizationConfig {
    pub enabled: bool,
    pub min_events: usize,
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_events: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DreamingConfig {
    pub enabled: bool,
    pub lookback_hours: i64,
    pub min_importance: f32,
    pub max_samples: usize,
    pub min_qualifying_memories: usize,
}

impl Default for DreamingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lookback_hours: 24,
            min_importance: 0.6,
            max_samples: 20,
            min_qualifying_memories: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StrategyKind;

    #[test]
    fn vector_backed_strategies_use_the_vector_search_deadline() {
        let timeouts = TimeoutConfig::default();
        assert_eq!(timeouts.for_strategy(StrategyKind::DenseVector), timeouts.vector_search());
        assert_eq!(timeouts.for_strategy(StrategyKind::MultiVector), timeouts.vector_search());
    }

    #[test]
    fn storage_backed_strategies_use_the_storage_deadline() {
        let timeouts = TimeoutConfig::default();
        assert_eq!(timeouts.for_strategy(StrategyKind::Sparse), timeouts.storage());
        assert_eq!(timeouts.for_strategy(StrategyKind::Anchor), timeouts.storage());
        assert_eq!(timeouts.for_strategy(StrategyKind::Graph), timeouts.storage());
    }
}
