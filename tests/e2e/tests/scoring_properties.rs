//! §8 invariants 5, 9, 10 and the scoring/adaptive-β round-trip laws,
//! exercised through the public `memoria_core` API only.

use chrono::{Duration, Utc};
use uuid::Uuid;

use memoria_core::model::{Layer, MemoryRecord};
use memoria_core::{
    adaptive_beta, compute_batch_scores, compute_memory_score, decayed_importance, score_record,
    select_context, BottleneckCandidate, BudgetPreference, ScoringWeights,
};

fn record(importance: f32, access_count: u64, last_accessed_days_ago: i64) -> MemoryRecord {
    let mut r = MemoryRecord::new("tenant-scoring", "default", "agent-1", "content", Layer::Semantic, "test");
    r.importance = importance;
    r.access_count = access_count;
    r.last_accessed_at = Utc::now() - Duration::days(last_accessed_days_ago);
    r
}

/// Invariant 5: for weights summing to 1.0 and inputs in [0,1], the
/// final score stays in [0,1], and batch scoring equals element-wise
/// single scoring.
#[test]
fn weighted_sum_stays_in_unit_range_and_batch_matches_single() {
    let weights = ScoringWeights::default();
    let now = Utc::now();
    let memories: Vec<MemoryRecord> = (0..20)
        .map(|i| record((i % 11) as f32 / 10.0, i as u64, (i % 40) as i64))
        .collect();
    let similarities: Vec<f32> = (0..20).map(|i| (i % 11) as f32 / 10.0).collect();

    let batch = compute_batch_scores(&memories, &similarities, now, weights, 0.05).expect("equal-length batch");
    assert_eq!(batch.len(), memories.len());

    for (i, batch_result) in batch.iter().enumerate() {
        assert!((0.0..=1.0).contains(&batch_result.final_score));
        let (single, _warnings) = score_record(&memories[i], similarities[i], now, weights, 0.05);
        assert_eq!(single.final_score, batch_result.final_score);
        assert_eq!(single.similarity, batch_result.similarity);
        assert_eq!(single.importance, batch_result.importance);
        assert_eq!(single.recency, batch_result.recency);
    }
}

#[test]
fn batch_scoring_rejects_length_mismatch() {
    let weights = ScoringWeights::default();
    let memories = vec![record(0.5, 1, 1)];
    let similarities = vec![0.1, 0.2];
    let err = compute_batch_scores(&memories, &similarities, Utc::now(), weights, 0.05).unwrap_err();
    match err {
        memoria_core::BatchScoreError::LengthMismatch { memories: m, similarities: s } => {
            assert_eq!(m, 1);
            assert_eq!(s, 2);
        }
    }
}

/// Future `last_accessed_at` (clock skew) clamps recency to 1.0 instead
/// of producing an out-of-range value from a negative age.
#[test]
fn clock_skew_clamps_recency_to_one() {
    let id = Uuid::new_v4();
    let (result, warnings) = compute_memory_score(id, 0.5, 0.5, 0, -120.0, ScoringWeights::default(), 0.05);
    assert_eq!(result.recency, 1.0);
    assert!(!warnings.messages.is_empty());
}

/// More frequent access slows the effective decay rate, so a
/// heavily-accessed memory stays more recent than a rarely-accessed one
/// at the same age.
#[test]
fn frequent_access_slows_decay() {
    let weights = ScoringWeights::default();
    let now = Utc::now();
    let rarely = record(0.5, 0, 30);
    let often = record(0.5, 200, 30);
    let (rarely_score, _) = score_record(&rarely, 0.0, now, weights, 0.05);
    let (often_score, _) = score_record(&often, 0.0, now, weights, 0.05);
    assert!(often_score.recency > rarely_score.recency);
    assert!(often_score.effective_decay_rate < rarely_score.effective_decay_rate);
}

/// Invariant 10: decay never pushes importance below the floor, no
/// matter how stale or how many repeated iterations are applied.
#[test]
fn decay_never_crosses_the_floor() {
    let mut r = record(0.9, 0, 0);
    r.last_accessed_at = Utc::now() - Duration::days(10_000);
    let mut importance = r.importance;
    for _ in 0..50 {
        r.importance = importance;
        importance = decayed_importance(&r, Utc::now(), 0.2);
        assert!(importance >= 0.01);
    }
}

/// Two consecutive adaptive-β computations with identical inputs return
/// identical values (round-trip law).
#[test]
fn adaptive_beta_is_deterministic() {
    let a = adaptive_beta(1.0, 0.8, 0.15);
    let b = adaptive_beta(1.0, 0.8, 0.15);
    assert_eq!(a, b);
}

#[test]
fn adaptive_beta_rules_compose() {
    let base = 1.0;
    let complex_low_budget = adaptive_beta(base, 0.9, 0.1);
    // complexity > 0.7 multiplies by 0.7, remaining < 0.2 multiplies by 1.5
    assert!((complex_low_budget - (base * 0.7 * 1.5)).abs() < 1e-5);

    let simple_high_budget = adaptive_beta(base, 0.1, 0.9);
    // complexity < 0.3 multiplies by 1.3, remaining > 0.8 multiplies by 0.8
    assert!((simple_high_budget - (base * 1.3 * 0.8)).abs() < 1e-5);
}

/// Invariant 9: the information-bottleneck selector never exceeds the
/// token budget, regardless of candidate count.
#[test]
fn selector_never_exceeds_token_budget() {
    let query_embedding: Vec<f32> = (0..32).map(|i| (i as f32).sin()).collect();
    let candidates: Vec<BottleneckCandidate> = (0..50)
        .map(|i| BottleneckCandidate {
            id: Uuid::new_v4(),
            embedding: (0..32).map(|d| ((i + d) as f32).cos()).collect(),
            tokens: 80 + (i % 5) * 20,
            importance: (i % 10) as f32 / 10.0,
            layer: Layer::Semantic,
        })
        .collect();

    let beta = BudgetPreference::Balanced.base_beta();
    let outcome = select_context(&candidates, &query_embedding, 500, beta, 0.0);
    let total: usize = outcome
        .selected_ids
        .iter()
        .filter_map(|id| candidates.iter().find(|c| c.id == *id))
        .map(|c| c.tokens)
        .sum();
    assert!(total <= 500);
}
