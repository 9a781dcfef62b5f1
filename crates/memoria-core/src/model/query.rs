use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::record::{Layer, MemoryRecord, StrategyKind};

/// Optional narrowing applied uniformly across enabled strategies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryFilters {
    pub layers: Option<Vec<Layer>>,
    pub tags: Option<Vec<String>>,
    pub min_importance: Option<f32>,
    pub temporal_start: Option<DateTime<Utc>>,
    pub temporal_end: Option<DateTime<Utc>>,
    pub graph_depth: Option<u32>,
}

/// A query against the engine's hybrid search. See §3 "Query record".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub tenant_id: String,
    pub project: String,
    pub query_text: String,
    pub top_k: usize,
    pub enabled_strategies: Vec<StrategyKind>,
    pub manual_weights: Option<HashMap<StrategyKind, f32>>,
    pub filters: QueryFilters,
    pub conversation_history: Option<Vec<String>>,
    pub rerank_model_tag: Option<String>,
    pub enable_rerank: bool,
}

impl QueryRequest {
    pub fn new(tenant_id: impl Into<String>, project: impl Into<String>, query_text: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            project: project.into(),
            query_text: query_text.into(),
            top_k: 10,
            enabled_strategies: vec![
                StrategyKind::DenseVector,
                StrategyKind::Sparse,
                StrategyKind::Anchor,
            ],
            manual_weights: None,
            filters: QueryFilters::default(),
            conversation_history: None,
            rerank_model_tag: None,
            enable_rerank: false,
        }
    }

    /// Manual weights, when supplied, must sum to 1.0 ± epsilon.
    pub fn validate_weights(&self) -> Result<(), String> {
        if let Some(weights) = &self.manual_weights {
            let sum: f32 = weights.values().sum();
            if (sum - 1.0).abs() > 0.01 {
                return Err(format!("manual_weights must sum to ~1.0, got {sum}"));
            }
        }
        Ok(())
    }
}

/// Per-term score breakdown carried on every returned result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub final_score: f32,
    pub similarity_score: f32,
    pub importance_score: f32,
    pub recency_score: f32,
    pub effective_decay_rate: f32,
    pub age_seconds: f64,
}

/// One ranked query result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMemory {
    pub memory: MemoryRecord,
    pub rank: usize,
    pub score: ScoreBreakdown,
    pub matched_strategies: Vec<StrategyKind>,
}

/// Classified query intent (§4.E stage 1).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    FactualLookup,
    TemporalQuery,
    Exploratory,
    Conversational,
}

/// Output of the intent-analysis stage, recorded on the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub intent: QueryIntent,
    pub entities: Vec<String>,
    pub concepts: Vec<String>,
    pub temporal_markers: Vec<String>,
    pub recommended_weights: HashMap<StrategyKind, f32>,
}

/// Response returned from the engine's `query` operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub results: Vec<ScoredMemory>,
    pub total_results: usize,
    pub total_time_ms: u64,
    pub applied_weights: HashMap<StrategyKind, f32>,
    pub query_analysis: QueryAnalysis,
    pub per_strategy_counts: HashMap<StrategyKind, usize>,
    pub reranking_used: bool,
}

/// Identifier-carrying item used by graph traversal seeding and by
/// anchor/sparse strategies before they are joined back to full records.
#[derive(Debug, Clone, Copy)]
pub struct StrategyHit {
    pub memory_id: Uuid,
    pub score: f32,
    pub importance: f32,
}
