//! Scoring kernel (§4.B)
//!
//! Pure functions only — no adapter, no I/O. `final = α·similarity +
//! β·importance + γ·recency`, with an access-count-aware exponential decay
//! for the recency term. Kept free of `tracing`/adapter dependencies the
//! same way the teacher keeps its `fsrs` module a dependency-free math
//! block; callers that want to log the non-fatal warning conditions do so
//! at the call site using the `warnings` field below.

use uuid::Uuid;

use crate::config::ScoringConfig;
use crate::model::MemoryRecord;

/// Weights for the three-term kernel. `alpha + beta + gamma` should sum to
/// 1.0 within 0.01; values that don't are accepted (clamped nowhere) but
/// flagged via [`ScoreResult::warnings`].
#[derive(Debug, Clone, Copy)]
pub struct ScoringWeights {
    pub alpha: f32,
    pub beta: f32,
    pub gamma: f32,
    /// v3 extension: optional diversity penalty subtracted from `final`.
    /// `None` reproduces exact v2 behavior.
    pub diversity_penalty: Option<f32>,
}

impl From<ScoringConfig> for ScoringWeights {
    fn from(cfg: ScoringConfig) -> Self {
        Self {
            alpha: cfg.alpha_similarity,
            beta: cfg.beta_importance,
            gamma: cfg.gamma_recency,
            diversity_penalty: None,
        }
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            alpha: 0.4,
            beta: 0.3,
            gamma: 0.3,
            diversity_penalty: None,
        }
    }
}

impl ScoringWeights {
    /// v3 extension constructor: same shape, with a diversity term.
    pub fn v3(alpha: f32, beta: f32, gamma: f32, diversity_penalty: f32) -> Self {
        Self {
            alpha,
            beta,
            gamma,
            diversity_penalty: Some(diversity_penalty),
        }
    }

    fn weight_sum(&self) -> f32 {
        self.alpha + self.beta + self.gamma
    }
}

/// Full breakdown for a single scored memory.
#[derive(Debug, Clone, Copy)]
pub struct MemoryScoreResult {
    pub memory_id: Uuid,
    pub final_score: f32,
    pub similarity: f32,
    pub importance: f32,
    pub recency: f32,
    pub effective_decay_rate: f32,
    pub age_seconds: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ScoreWarnings {
    pub messages: Vec<String>,
}

impl ScoreWarnings {
    fn push(&mut self, msg: impl Into<String>) {
        self.messages.push(msg.into());
    }
}

/// `effective_decay = base_decay_rate / (1 + ln(1 + access_count))`.
pub fn effective_decay_rate(base_decay_rate: f32, access_count: u64) -> f32 {
    base_decay_rate / (1.0 + (1.0 + access_count as f32).ln())
}

/// `recency = exp(-effective_decay * age_days)`, clamped to [0,1]. A
/// `last_accessed_at` in the future (clock skew) is treated as `1.0`
/// (maximally recent) and recorded as a warning rather than silently
/// producing a value above 1.0 via a negative age.
fn recency_term(age_seconds: f64, base_decay_rate: f32, access_count: u64, warnings: &mut ScoreWarnings) -> (f32, f32) {
    if age_seconds < 0.0 {
        warnings.push("last_accessed_at is in the future (clock skew); recency clamped to 1.0");
        return (1.0, effective_decay_rate(base_decay_rate, access_count));
    }
    let decay = effective_decay_rate(base_decay_rate, access_count);
    let age_days = age_seconds / 86_400.0;
    let recency = (-(decay as f64) * age_days).exp() as f32;
    (recency.clamp(0.0, 1.0), decay)
}

/// Scores a single candidate. `age_seconds` is `now - last_accessed_at` in
/// seconds (may be negative under clock skew, see above).
pub fn compute_memory_score(
    memory_id: Uuid,
    similarity: f32,
    importance: f32,
    access_count: u64,
    age_seconds: f64,
    weights: ScoringWeights,
    base_decay_rate: f32,
) -> (MemoryScoreResult, ScoreWarnings) {
    let mut warnings = ScoreWarnings::default();
    if (weights.weight_sum() - 1.0).abs() > 0.01 {
        warnings.push(format!(
            "scoring weights sum to {:.3}, expected 1.0 ± 0.01",
            weights.weight_sum()
        ));
    }

    let (recency, effective_decay) = recency_term(age_seconds, base_decay_rate, access_count, &mut warnings);
    let similarity = similarity.clamp(0.0, 1.0);
    let importance = importance.clamp(0.0, 1.0);

    let mut final_score = weights.alpha * similarity + weights.beta * importance + weights.gamma * recency;
    if let Some(penalty) = weights.diversity_penalty {
        final_score = (final_score - penalty).max(0.0);
    }

    (
        MemoryScoreResult {
            memory_id,
            final_score: final_score.clamp(0.0, 1.0),
            similarity,
            importance,
            recency,
            effective_decay_rate: effective_decay,
            age_seconds,
        },
        warnings,
    )
}

/// Scores a memory record directly against `now`, deriving `age_seconds`
/// from `last_accessed_at`.
pub fn score_record(
    record: &MemoryRecord,
    similarity: f32,
    now: chrono::DateTime<chrono::Utc>,
    weights: ScoringWeights,
    base_decay_rate: f32,
) -> (MemoryScoreResult, ScoreWarnings) {
    let age_seconds = (now - record.last_accessed_at).num_milliseconds() as f64 / 1000.0;
    compute_memory_score(
        record.id,
        similarity,
        record.importance,
        record.access_count,
        age_seconds,
        weights,
        base_decay_rate,
    )
}

#[derive(Debug, Clone)]
pub enum BatchScoreError {
    LengthMismatch { memories: usize, similarities: usize },
}

impl std::fmt::Display for BatchScoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchScoreError::LengthMismatch { memories, similarities } => write!(
                f,
                "batch scoring requires equal-length arrays: {memories} memories vs {similarities} similarities"
            ),
        }
    }
}

impl std::error::Error for BatchScoreError {}

/// Batch form: parallel arrays of memories and similarity scores. Fails
/// with [`BatchScoreError::LengthMismatch`] if the lengths differ;
/// otherwise produces exactly the same results as calling
/// [`score_record`] element-wise.
pub fn compute_batch_scores(
    memories: &[MemoryRecord],
    similarities: &[f32],
    now: chrono::DateTime<chrono::Utc>,
    weights: ScoringWeights,
    base_decay_rate: f32,
) -> Result<Vec<MemoryScoreResult>, BatchScoreError> {
    if memories.len() != similarities.len() {
        return Err(BatchScoreError::LengthMismatch {
            memories: memories.len(),
            similarities: similarities.len(),
        });
    }
    Ok(memories
        .iter()
        .zip(similarities)
        .map(|(m, s)| score_record(m, *s, now, weights, base_decay_rate).0)
        .collect())
}

/// Ranking helper: sorts `(memory, score)` pairs by `final_score`
/// descending, preserving the score alongside each memory.
pub fn rank_memories_by_score(mut pairs: Vec<(MemoryRecord, MemoryScoreResult)>) -> Vec<(MemoryRecord, MemoryScoreResult)> {
    pairs.sort_by(|a, b| {
        b.1.final_score
            .partial_cmp(&a.1.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn weighted_sum_stays_in_unit_interval() {
        let (result, _) = compute_memory_score(
            Uuid::new_v4(),
            0.9,
            0.3,
            5,
            3600.0,
            ScoringWeights::default(),
            0.01,
        );
        assert!((0.0..=1.0).contains(&result.final_score));
    }

    #[test]
    fn batch_matches_single_item() {
        let mut m1 = MemoryRecord::new("t", "p", "a", "hello world", crate::model::Layer::Working, "user");
        m1.importance = 0.7;
        m1.access_count = 2;
        let now = Utc::now();
        let weights = ScoringWeights::default();
        let single = score_record(&m1, 0.5, now, weights, 0.01).0;
        let batch = compute_batch_scores(&[m1], &[0.5], now, weights, 0.01).unwrap();
        assert_eq!(batch.len(), 1);
        assert!((batch[0].final_score - single.final_score).abs() < 1e-6);
    }

    #[test]
    fn batch_length_mismatch_errors() {
        let m1 = MemoryRecord::new("t", "p", "a", "hello", crate::model::Layer::Working, "user");
        let err = compute_batch_scores(&[m1], &[0.1, 0.2], Utc::now(), ScoringWeights::default(), 0.01);
        assert!(matches!(err, Err(BatchScoreError::LengthMismatch { .. })));
    }

    #[test]
    fn future_last_accessed_is_clamped_to_full_recency() {
        let (result, warnings) = compute_memory_score(Uuid::new_v4(), 0.1, 0.1, 0, -10.0, ScoringWeights::default(), 0.01);
        assert_eq!(result.recency, 1.0);
        assert!(!warnings.messages.is_empty());
    }

    #[test]
    fn higher_access_count_decays_slower() {
        let slow = effective_decay_rate(0.01, 100);
        let fast = effective_decay_rate(0.01, 0);
        assert!(slow < fast);
    }

    #[test]
    fn unnormalized_weights_warn_but_still_compute() {
        let weights = ScoringWeights {
            alpha: 0.5,
            beta: 0.5,
            gamma: 0.5,
            diversity_penalty: None,
        };
        let (_, warnings) = compute_memory_score(Uuid::new_v4(), 0.5, 0.5, 1, 0.0, weights, 0.01);
        assert!(!warnings.messages.is_empty());
    }
}
