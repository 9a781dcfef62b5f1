//! Scenario F: token-budget-constrained context selection via the
//! information-bottleneck selector, including its `BudgetPreference` →
//! adaptive-β → greedy-selection pipeline.

use uuid::Uuid;

use memoria_core::model::Layer;
use memoria_core::{adaptive_beta, compression_cost, relevance, select_context, BottleneckCandidate, BudgetPreference};

fn candidate(embedding: Vec<f32>, tokens: usize, importance: f32, layer: Layer) -> BottleneckCandidate {
    BottleneckCandidate {
        id: Uuid::new_v4(),
        embedding,
        tokens,
        importance,
        layer,
    }
}

/// A highly relevant reflective note and a marginally relevant episodic
/// note compete for a tight budget; reflective's lower compression
/// penalty (0.5 vs 1.0) should let it win the selection even at equal
/// token cost and similar relevance.
#[test]
fn cheaper_layer_penalty_wins_under_tight_budget() {
    let query = vec![1.0, 0.0];
    let reflective = candidate(vec![0.95, 0.05], 100, 0.6, Layer::Reflective);
    let episodic = candidate(vec![0.95, 0.05], 100, 0.6, Layer::Episodic);
    let candidates = vec![reflective.clone(), episodic.clone()];

    let outcome = select_context(&candidates, &query, 100, 1.0, 0.0);
    assert_eq!(outcome.selected_ids, vec![reflective.id]);
}

/// `BudgetPreference::Quality` starts from the lowest β (0.5), so it
/// discounts compression cost the least... no, the opposite: a lower β
/// means the compression-cost penalty contributes less to the
/// objective, favoring inclusion over efficiency. Quality therefore
/// admits more lower-relevance-but-cheap items than Efficiency does at
/// the same budget.
#[test]
fn budget_preference_base_betas_are_ordered() {
    assert!(BudgetPreference::Quality.base_beta() < BudgetPreference::Balanced.base_beta());
    assert!(BudgetPreference::Balanced.base_beta() < BudgetPreference::Efficiency.base_beta());
}

/// Items below `min_relevance` are excluded from the objective entirely,
/// not merely down-ranked, so they never occupy budget even when ample
/// tokens remain.
#[test]
fn below_threshold_relevance_never_consumes_budget() {
    let query = vec![1.0, 0.0];
    let irrelevant = candidate(vec![0.0, 1.0], 10, 0.0, Layer::Working);
    let outcome = select_context(&[irrelevant], &query, 10_000, 1.0, 0.5);
    assert!(outcome.selected_ids.is_empty());
    assert_eq!(outcome.report.selected_count, 0);
}

/// The selector is greedy by objective, not by arrival order: a later,
/// cheaper-but-similarly-relevant candidate can displace an earlier one
/// for the remaining budget.
#[test]
fn selection_order_follows_objective_not_input_order() {
    let query = vec![1.0, 0.0];
    let expensive = candidate(vec![0.9, 0.1], 90, 0.5, Layer::Episodic);
    let cheap = candidate(vec![0.9, 0.1], 20, 0.5, Layer::Reflective);
    let candidates = vec![expensive, cheap.clone()];

    // Budget only fits one of the two.
    let outcome = select_context(&candidates, &query, 30, 1.0, 0.0);
    assert_eq!(outcome.selected_ids, vec![cheap.id]);
}

/// Relevance and compression-cost helpers stay within their documented
/// ranges for inputs already in [0,1] / unit vectors.
#[test]
fn relevance_and_cost_are_bounded() {
    let query = vec![0.6, 0.8];
    let c = candidate(vec![0.8, 0.6], 30, 0.9, Layer::Working);
    let rel = relevance(&c, &query);
    assert!((0.0..=1.0).contains(&rel));

    let cost = compression_cost(&c, 100);
    assert!(cost >= 0.0);
}

/// Full pipeline: pick a base β from a stated preference, adapt it for
/// query complexity and remaining budget, then feed it into selection —
/// never exceeding the token budget regardless of the resulting β.
#[test]
fn preference_to_selection_pipeline_respects_budget() {
    let query: Vec<f32> = (0..16).map(|i| (i as f32 * 0.3).sin()).collect();
    let candidates: Vec<BottleneckCandidate> = (0..12)
        .map(|i| {
            candidate(
                (0..16).map(|d| ((i + d) as f32 * 0.3).cos()).collect(),
                40 + (i % 3) * 30,
                (i % 5) as f32 / 4.0,
                [Layer::Working, Layer::Episodic, Layer::Semantic, Layer::Reflective][i % 4],
            )
        })
        .collect();

    let base_beta = BudgetPreference::Efficiency.base_beta();
    let beta = adaptive_beta(base_beta, 0.85, 0.15);
    let outcome = select_context(&candidates, &query, 300, beta, 0.1);

    let spent: usize = outcome
        .selected_ids
        .iter()
        .filter_map(|id| candidates.iter().find(|c| c.id == *id))
        .map(|c| c.tokens)
        .sum();
    assert!(spent <= 300);
    assert_eq!(outcome.report.beta_used, beta);
    assert_eq!(outcome.report.selected_count, outcome.selected_ids.len());
}
