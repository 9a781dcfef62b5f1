//! Information-bottleneck context selector (§4.I): given a query
//! embedding, a candidate set, and a token budget, greedily selects the
//! subset maximizing `I(Z;Y) − β·I(Z;X)`.
//!
//! Grounded in
//! `original_source/apps/memory_api/core/information_bottleneck.py`:
//! same relevance/compression-cost approximations and the same adaptive-β
//! multiplier table, with one documented deviation (see DESIGN.md open
//! question 5) — the relevance term here is the literal
//! `0.8·cos + 0.2·importance`, not the original's nested double discount.

use serde::{Deserialize, Serialize};

use crate::model::Layer;

/// A candidate item for selection: the fields the bottleneck needs,
/// independent of where it came from (a memory record, a context
/// builder slot, etc).
#[derive(Debug, Clone)]
pub struct BottleneckCandidate {
    pub id: uuid::Uuid,
    pub embedding: Vec<f32>,
    pub tokens: usize,
    pub importance: f32,
    pub layer: Layer,
}

/// Caller-stated intent used to pick the base β before adaptive scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetPreference {
    Quality,
    Balanced,
    Efficiency,
}

impl BudgetPreference {
    pub fn base_beta(&self) -> f32 {
        match self {
            BudgetPreference::Quality => 0.5,
            BudgetPreference::Balanced => 1.0,
            BudgetPreference::Efficiency => 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SelectionReport {
    pub total_relevance: f32,
    pub total_compression_cost: f32,
    pub compression_ratio: f32,
    pub objective: f32,
    pub selected_count: usize,
    pub beta_used: f32,
}

#[derive(Debug, Clone)]
pub struct SelectionOutcome {
    pub selected_ids: Vec<uuid::Uuid>,
    pub report: SelectionReport,
}

fn cosine_similarity_unit(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    ((dot / (norm_a * norm_b) + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// `I(m;Y) ≈ 0.8·cos(embedding, query) + 0.2·importance`, both terms
/// already in `[0,1]`.
pub fn relevance(candidate: &BottleneckCandidate, query_embedding: &[f32]) -> f32 {
    0.8 * cosine_similarity_unit(&candidate.embedding, query_embedding) + 0.2 * candidate.importance.clamp(0.0, 1.0)
}

/// `I(m;X) ≈ (m.tokens / Σtokens) · layer_penalty`.
pub fn compression_cost(candidate: &BottleneckCandidate, total_tokens: usize) -> f32 {
    if total_tokens == 0 {
        return 0.0;
    }
    (candidate.tokens as f32 / total_tokens as f32) * candidate.layer.compression_penalty()
}

/// Adjusts `base_beta` for query complexity and remaining budget
/// fraction, per §4.I's adaptive rules. `remaining_budget_fraction` is
/// `remaining_tokens / total_budget`, in `[0,1]`.
pub fn adaptive_beta(base_beta: f32, query_complexity: f32, remaining_budget_fraction: f32) -> f32 {
    let mut beta = base_beta;
    if query_complexity > 0.7 {
        beta *= 0.7;
    } else if query_complexity < 0.3 {
        beta *= 1.3;
    }
    if remaining_budget_fraction < 0.2 {
        beta *= 1.5;
    } else if remaining_budget_fraction > 0.8 {
        beta *= 0.8;
    }
    beta
}

/// Sentinel used to exclude a candidate below the relevance threshold
/// from the greedy sort without removing it from the reported totals.
const EXCLUDED_OBJECTIVE: f32 = f32::NEG_INFINITY;

/// Greedily selects candidates under `token_budget`, per §4.I's
/// algorithm: compute per-item objective, exclude anything below
/// `min_relevance`, sort descending, append while the running token
/// total stays within budget.
pub fn select_context(
    candidates: &[BottleneckCandidate],
    query_embedding: &[f32],
    token_budget: usize,
    beta: f32,
    min_relevance: f32,
) -> SelectionOutcome {
    let total_tokens: usize = candidates.iter().map(|c| c.tokens).sum();

    let mut scored: Vec<(&BottleneckCandidate, f32, f32, f32)> = candidates
        .iter()
        .map(|c| {
            let rel = relevance(c, query_embedding);
            let cost = compression_cost(c, total_tokens);
            let objective = if rel < min_relevance {
                EXCLUDED_OBJECTIVE
            } else {
                rel - beta * cost
            };
            (c, rel, cost, objective)
        })
        .collect();

    scored.sort_by(|a, b| b.3.partial_cmp(&a.3).unwrap_or(std::cmp::Ordering::Equal));

    let mut selected_ids = Vec::new();
    let mut used_tokens = 0usize;
    let mut total_relevance = 0.0;
    let mut total_cost = 0.0;
    let mut objective_sum = 0.0;

    for (candidate, rel, cost, objective) in &scored {
        if *objective == EXCLUDED_OBJECTIVE {
            continue;
        }
        if used_tokens + candidate.tokens > token_budget {
            continue;
        }
        used_tokens += candidate.tokens;
        selected_ids.push(candidate.id);
        total_relevance += rel;
        total_cost += cost;
        objective_sum += objective;
    }

    let compression_ratio = if total_tokens == 0 {
        0.0
    } else {
        used_tokens as f32 / total_tokens as f32
    };

    let selected_count = selected_ids.len();
    SelectionOutcome {
        selected_ids,
        report: SelectionReport {
            total_relevance,
            total_compression_cost: total_cost,
            compression_ratio,
            objective: objective_sum,
            selected_count,
            beta_used: beta,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: uuid::Uuid, embedding: Vec<f32>, tokens: usize, importance: f32, layer: Layer) -> BottleneckCandidate {
        BottleneckCandidate {
            id,
            embedding,
            tokens,
            importance,
            layer,
        }
    }

    #[test]
    fn identical_embedding_scores_full_cosine_component() {
        let c = candidate(uuid::Uuid::new_v4(), vec![1.0, 0.0], 10, 0.5, Layer::Episodic);
        let rel = relevance(&c, &[1.0, 0.0]);
        assert!((rel - (0.8 * 1.0 + 0.2 * 0.5)).abs() < 1e-5);
    }

    #[test]
    fn greedy_selection_respects_budget() {
        let candidates = vec![
            candidate(uuid::Uuid::new_v4(), vec![1.0, 0.0], 50, 0.9, Layer::Episodic),
            candidate(uuid::Uuid::new_v4(), vec![1.0, 0.0], 50, 0.8, Layer::Episodic),
            candidate(uuid::Uuid::new_v4(), vec![0.0, 1.0], 50, 0.1, Layer::Working),
        ];
        let outcome = select_context(&candidates, &[1.0, 0.0], 80, 1.0, 0.0);
        assert!(outcome.selected_ids.len() <= 2);
    }

    #[test]
    fn low_relevance_items_are_excluded() {
        let candidates = vec![candidate(uuid::Uuid::new_v4(), vec![0.0, 1.0], 10, 0.0, Layer::Working)];
        let outcome = select_context(&candidates, &[1.0, 0.0], 1000, 1.0, 0.5);
        assert!(outcome.selected_ids.is_empty());
    }

    #[test]
    fn adaptive_beta_reduces_for_complex_queries() {
        let base = 1.0;
        let complex = adaptive_beta(base, 0.9, 0.5);
        let simple = adaptive_beta(base, 0.1, 0.5);
        assert!(complex < base);
        assert!(simple > base);
    }

    #[test]
    fn adaptive_beta_scales_with_remaining_budget() {
        let base = 1.0;
        let scarce = adaptive_beta(base, 0.5, 0.1);
        let abundant = adaptive_beta(base, 0.5, 0.9);
        assert!(scarce > base);
        assert!(abundant < base);
    }
}
