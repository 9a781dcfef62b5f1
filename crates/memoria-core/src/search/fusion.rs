//! Hybrid fusion pipeline (§4.E): intent analysis, concurrent per-strategy
//! execution, Reciprocal Rank Fusion, re-scoring through the kernel, an
//! optional LLM re-ranking pass, and post-processing.
//!
//! Grounded in `crates/vestige-core/src/search/hybrid.rs`: the same
//! `reciprocal_rank_fusion` shape (`sum_s w_s / (K + rank_s(m))`), kept and
//! generalized from the teacher's hardcoded keyword+semantic pair to an
//! arbitrary list of [`super::SearchStrategy`] producers.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::adapters::{LlmProvider, MemoryStorage};
use crate::config::{DecayConfig, ScoringConfig, SearchConfig, TimeoutConfig};
use crate::error::{EngineError, EngineResult};
use crate::model::{
    MemoryRecord, QueryAnalysis, QueryIntent, QueryRequest, QueryResponse, ScoreBreakdown,
    ScoredMemory, StrategyHit, StrategyKind,
};
use crate::scoring::{score_record, MemoryScoreResult, ScoringWeights};

use super::SearchStrategy;

/// A single strategy's failure, logged and converted to an empty result
/// stream rather than propagated — §4.E.2's isolation guarantee.
#[derive(Debug, Clone)]
pub struct StrategyError {
    pub strategy: StrategyKind,
    pub message: String,
}

impl std::fmt::Display for StrategyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "strategy {:?} failed: {}", self.strategy, self.message)
    }
}

impl std::error::Error for StrategyError {}

/// Words that mark a query as backward-looking; drives the temporal-query
/// intent classification and the recency weighting bump.
const TEMPORAL_WORDS: &[&str] = &[
    "yesterday", "today", "recently", "ago", "last week", "last month", "last night",
    "this morning", "earlier", "previously", "before",
];

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "what", "when", "where", "who", "why", "how",
    "did", "do", "does", "we", "i", "you", "it", "this", "that", "and", "or", "of", "to", "in",
    "on", "for", "with", "about", "me", "my", "our",
];

fn extract_temporal_markers(lower: &str) -> Vec<String> {
    let mut markers: Vec<String> = TEMPORAL_WORDS
        .iter()
        .filter(|w| lower.contains(*w))
        .map(|w| w.to_string())
        .collect();
    if let Ok(re) = regex::Regex::new(r"\b\d{4}-\d{2}-\d{2}\b") {
        for m in re.find_iter(lower) {
            markers.push(m.as_str().to_string());
        }
    }
    markers
}

fn extract_entities(query_text: &str) -> Vec<String> {
    query_text
        .split_whitespace()
        .enumerate()
        .filter(|(i, w)| *i > 0 && w.chars().next().is_some_and(|c| c.is_uppercase()))
        .map(|(_, w)| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

fn extract_concepts(lower: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut concepts = Vec::new();
    for word in lower.split_whitespace() {
        let cleaned: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
        if cleaned.len() <= 4 || STOPWORDS.contains(&cleaned.as_str()) {
            continue;
        }
        if seen.insert(cleaned.clone()) {
            concepts.push(cleaned);
        }
        if concepts.len() >= 5 {
            break;
        }
    }
    concepts
}

/// Stage 1 of §4.E: classify intent, pull out entities/concepts/temporal
/// markers, and recommend a per-strategy weight vector. Runs on lexical
/// heuristics alone — no LLM call, so it never blocks the query path on an
/// external provider.
fn analyze_intent(query_text: &str, conversation_history: Option<&[String]>) -> QueryAnalysis {
    let lower = query_text.to_lowercase();
    let word_count = query_text.split_whitespace().count();
    let has_question_mark = lower.contains('?');
    let starts_with_question_word = ["what", "how", "why", "when", "who", "where", "which"]
        .iter()
        .any(|w| lower.starts_with(w));

    let temporal_markers = extract_temporal_markers(&lower);
    let entities = extract_entities(query_text);
    let concepts = extract_concepts(&lower);

    let intent = if !temporal_markers.is_empty() {
        QueryIntent::TemporalQuery
    } else if (has_question_mark || starts_with_question_word) && word_count > 6 {
        QueryIntent::Exploratory
    } else if conversation_history.is_some_and(|h| !h.is_empty())
        && word_count <= 6
        && !has_question_mark
    {
        QueryIntent::Conversational
    } else {
        QueryIntent::FactualLookup
    };

    let mut weights: HashMap<StrategyKind, f32> = [
        StrategyKind::DenseVector,
        StrategyKind::MultiVector,
        StrategyKind::Sparse,
        StrategyKind::Anchor,
        StrategyKind::Graph,
    ]
    .into_iter()
    .map(|k| (k, k.default_weight()))
    .collect();

    match intent {
        QueryIntent::FactualLookup => {
            scale(&mut weights, StrategyKind::Sparse, 1.3);
            scale(&mut weights, StrategyKind::DenseVector, 0.8);
            scale(&mut weights, StrategyKind::Graph, 0.5);
            scale(&mut weights, StrategyKind::MultiVector, 0.8);
        }
        QueryIntent::TemporalQuery => {
            scale(&mut weights, StrategyKind::Sparse, 1.1);
            scale(&mut weights, StrategyKind::Graph, 0.6);
        }
        QueryIntent::Exploratory => {
            scale(&mut weights, StrategyKind::DenseVector, 1.3);
            scale(&mut weights, StrategyKind::Graph, 1.4);
            scale(&mut weights, StrategyKind::Sparse, 0.6);
        }
        QueryIntent::Conversational => {
            scale(&mut weights, StrategyKind::DenseVector, 1.1);
            scale(&mut weights, StrategyKind::Sparse, 0.8);
            scale(&mut weights, StrategyKind::Graph, 0.7);
        }
    }

    QueryAnalysis {
        intent,
        entities,
        concepts,
        temporal_markers,
        recommended_weights: weights,
    }
}

fn scale(weights: &mut HashMap<StrategyKind, f32>, kind: StrategyKind, factor: f32) {
    if let Some(w) = weights.get_mut(&kind) {
        *w *= factor;
    }
}

/// Ties the five [`SearchStrategy`] producers together into one ranked
/// [`QueryResponse`].
pub struct HybridSearchEngine {
    strategies: Vec<Arc<dyn SearchStrategy>>,
    storage: Arc<dyn MemoryStorage>,
    llm: Option<Arc<dyn LlmProvider>>,
    search_config: SearchConfig,
    scoring_config: ScoringConfig,
    decay_config: DecayConfig,
    timeout_config: TimeoutConfig,
}

impl HybridSearchEngine {
    pub fn new(
        strategies: Vec<Arc<dyn SearchStrategy>>,
        storage: Arc<dyn MemoryStorage>,
        llm: Option<Arc<dyn LlmProvider>>,
        search_config: SearchConfig,
        scoring_config: ScoringConfig,
        decay_config: DecayConfig,
    ) -> Self {
        Self::with_timeouts(
            strategies,
            storage,
            llm,
            search_config,
            scoring_config,
            decay_config,
            TimeoutConfig::default(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_timeouts(
        strategies: Vec<Arc<dyn SearchStrategy>>,
        storage: Arc<dyn MemoryStorage>,
        llm: Option<Arc<dyn LlmProvider>>,
        search_config: SearchConfig,
        scoring_config: ScoringConfig,
        decay_config: DecayConfig,
        timeout_config: TimeoutConfig,
    ) -> Self {
        Self {
            strategies,
            storage,
            llm,
            search_config,
            scoring_config,
            decay_config,
            timeout_config,
        }
    }

    pub async fn query(&self, request: &QueryRequest) -> EngineResult<QueryResponse> {
        // A token that is never cancelled: `query_cancellable` degrades to
        // the plain top-level-deadline behavior when the caller has no
        // explicit abort signal to offer.
        self.query_cancellable(request, &CancellationToken::new()).await
    }

    /// Same as [`Self::query`], but also races the fusion pipeline against
    /// an explicit abort signal (§5's "implicit cancellation signal
    /// (timeout or explicit abort)"). Whichever fires first — the
    /// top-level deadline or `token` — produces `EngineError::Cancelled`;
    /// storage mutations already committed by prior calls are unaffected,
    /// since cancellation here only ever aborts the in-flight query.
    pub async fn query_cancellable(
        &self,
        request: &QueryRequest,
        token: &CancellationToken,
    ) -> EngineResult<QueryResponse> {
        request
            .validate_weights()
            .map_err(EngineError::validation)?;

        tokio::select! {
            result = tokio::time::timeout(self.timeout_config.query(), self.query_inner(request)) => {
                match result {
                    Ok(inner) => inner,
                    Err(_) => Err(EngineError::Cancelled),
                }
            }
            _ = token.cancelled() => Err(EngineError::Cancelled),
        }
    }

    /// The fusion pipeline itself, run under the top-level deadline
    /// `query` wraps it in (§5, §7.6). Per-strategy failures are already
    /// absorbed as empty hit lists inside `run_strategies`; this deadline
    /// exists to bound the pipeline as a whole against a misbehaving
    /// storage adapter or reranker rather than any single call.
    async fn query_inner(&self, request: &QueryRequest) -> EngineResult<QueryResponse> {
        let started = Instant::now();
        let analysis = analyze_intent(&request.query_text, request.conversation_history.as_deref());
        let weights = request
            .manual_weights
            .clone()
            .unwrap_or_else(|| analysis.recommended_weights.clone());

        let (per_strategy_hits, per_strategy_counts) = self.run_strategies(request).await;

        let k = self.search_config.rrf_k;
        let mut fused: HashMap<Uuid, f32> = HashMap::new();
        let mut matched_by: HashMap<Uuid, Vec<StrategyKind>> = HashMap::new();
        for (kind, hits) in &per_strategy_hits {
            let weight = weights.get(kind).copied().unwrap_or_else(|| kind.default_weight());
            for (rank, hit) in hits.iter().enumerate() {
                let contribution = weight * (1.0 / (k + (rank + 1) as f32));
                *fused.entry(hit.memory_id).or_insert(0.0) += contribution;
                matched_by.entry(hit.memory_id).or_default().push(*kind);
            }
        }

        if fused.is_empty() {
            return Ok(QueryResponse {
                results: Vec::new(),
                total_results: 0,
                total_time_ms: started.elapsed().as_millis() as u64,
                applied_weights: weights,
                query_analysis: analysis,
                per_strategy_counts,
                reranking_used: false,
            });
        }

        let max_fused = fused.values().copied().fold(0.0f32, f32::max).max(f32::EPSILON);
        let ids: Vec<Uuid> = fused.keys().copied().collect();
        let records = self.storage.get_memories_batch(&ids, &request.tenant_id).await?;

        let now = chrono::Utc::now();
        let scoring_weights = ScoringWeights::from(self.scoring_config);
        let mut scored: Vec<(MemoryRecord, MemoryScoreResult, Vec<StrategyKind>)> = Vec::new();
        for record in records {
            if !passes_filters(&record, &request.filters) {
                continue;
            }
            let raw = fused.get(&record.id).copied().unwrap_or(0.0);
            let normalized = (raw / max_fused).clamp(0.0, 1.0);
            let (score, _warnings) = score_record(&record, normalized, now, scoring_weights, self.decay_config.base_decay_rate);
            let strategies = matched_by.get(&record.id).cloned().unwrap_or_default();
            scored.push((record, score, strategies));
        }

        scored.sort_by(|a, b| {
            b.1.final_score
                .partial_cmp(&a.1.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut reranking_used = false;
        if request.enable_rerank {
            if let Some(llm) = &self.llm {
                if let Some(reordered) = rerank(llm.as_ref(), &request.query_text, &scored, self.timeout_config.llm()).await {
                    scored = reordered;
                    reranking_used = true;
                }
            }
        }

        scored.truncate(request.top_k.max(1));

        let returned_ids: Vec<Uuid> = scored.iter().map(|(memory, _, _)| memory.id).collect();
        if !returned_ids.is_empty() {
            if let Err(err) = self.storage.touch_access_batch(&returned_ids, &request.tenant_id).await {
                tracing::warn!(error = %err, "touch_access_batch failed after query, results unaffected");
            }
        }

        // Being surfaced by a query is the "used in a downstream context"
        // signal working-layer promotion waits on (§4.C); other layers
        // don't gate on usage_count so there's no harm bumping it there
        // too, but only working items actually depend on it.
        let working_ids: Vec<Uuid> = scored
            .iter()
            .filter(|(memory, _, _)| memory.layer == crate::model::Layer::Working)
            .map(|(memory, _, _)| memory.id)
            .collect();
        if !working_ids.is_empty() {
            if let Err(err) = self.storage.touch_usage_batch(&working_ids, &request.tenant_id).await {
                tracing::warn!(error = %err, "touch_usage_batch failed after query, results unaffected");
            }
        }

        let results: Vec<ScoredMemory> = scored
            .into_iter()
            .enumerate()
            .map(|(i, (memory, score, strategies))| ScoredMemory {
                memory,
                rank: i + 1,
                score: ScoreBreakdown {
                    final_score: score.final_score,
                    similarity_score: score.similarity,
                    importance_score: score.importance,
                    recency_score: score.recency,
                    effective_decay_rate: score.effective_decay_rate,
                    age_seconds: score.age_seconds,
                },
                matched_strategies: strategies,
            })
            .collect();

        Ok(QueryResponse {
            total_results: results.len(),
            results,
            total_time_ms: started.elapsed().as_millis() as u64,
            applied_weights: weights,
            query_analysis: analysis,
            per_strategy_counts,
            reranking_used,
        })
    }

    /// Runs every enabled strategy concurrently, bounded by
    /// `max_concurrent_strategies`. A strategy that errors is logged and
    /// contributes an empty hit list; the query as a whole only fails if
    /// every strategy fails (an empty `fused` map upstream, not an error
    /// here — empty results are a valid, successful response).
    async fn run_strategies(
        &self,
        request: &QueryRequest,
    ) -> (HashMap<StrategyKind, Vec<StrategyHit>>, HashMap<StrategyKind, usize>) {
        let semaphore = Arc::new(Semaphore::new(self.search_config.max_concurrent_strategies.max(1)));
        let overfetch = request.top_k.max(1) * 3;

        let mut handles = Vec::new();
        for strategy in &self.strategies {
            if !request.enabled_strategies.contains(&strategy.kind()) {
                continue;
            }
            let strategy = Arc::clone(strategy);
            let tenant_id = request.tenant_id.clone();
            let project = request.project.clone();
            let query_text = request.query_text.clone();
            let filters = request.filters.clone();
            let sem = Arc::clone(&semaphore);
            let kind = strategy.kind();
            let deadline = self.timeout_config.for_strategy(kind);
            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                let outcome = match tokio::time::timeout(
                    deadline,
                    strategy.search(&tenant_id, &project, &query_text, &filters, overfetch),
                )
                .await
                {
                    Ok(result) => result.map_err(|e| StrategyError {
                        strategy: kind,
                        message: e.to_string(),
                    }),
                    Err(_) => Err(StrategyError {
                        strategy: kind,
                        message: "strategy adapter call exceeded its deadline".to_string(),
                    }),
                };
                (kind, outcome)
            }));
        }

        let mut hits_by_kind = HashMap::new();
        let mut counts_by_kind = HashMap::new();
        for handle in handles {
            match handle.await {
                Ok((kind, Ok(hits))) => {
                    counts_by_kind.insert(kind, hits.len());
                    hits_by_kind.insert(kind, hits);
                }
                Ok((kind, Err(err))) => {
                    tracing::warn!(strategy = ?kind, error = %err, "search strategy failed, treated as empty");
                    counts_by_kind.insert(kind, 0);
                }
                Err(join_err) => {
                    tracing::warn!(error = %join_err, "search strategy task panicked or was cancelled");
                }
            }
        }

        (hits_by_kind, counts_by_kind)
    }
}

fn passes_filters(record: &MemoryRecord, filters: &crate::model::QueryFilters) -> bool {
    if let Some(min_importance) = filters.min_importance {
        if record.importance < min_importance {
            return false;
        }
    }
    if let Some(start) = filters.temporal_start {
        if record.created_at < start {
            return false;
        }
    }
    if let Some(end) = filters.temporal_end {
        if record.created_at > end {
            return false;
        }
    }
    if let Some(layers) = &filters.layers {
        if !layers.contains(&record.layer) {
            return false;
        }
    }
    if let Some(tags) = &filters.tags {
        if !tags.iter().any(|t| record.tags.contains(t)) {
            return false;
        }
    }
    true
}

/// Stage 5 of §4.E: an optional LLM pass over the top of the fused ranking.
/// Falls back to the caller's existing order (by returning `None`) on any
/// provider failure or an unparseable response, per the error-handling
/// design's "re-ranker failures fall back to fused ordering" rule.
async fn rerank(
    llm: &dyn LlmProvider,
    query_text: &str,
    scored: &[(MemoryRecord, MemoryScoreResult, Vec<StrategyKind>)],
    llm_deadline: std::time::Duration,
) -> Option<Vec<(MemoryRecord, MemoryScoreResult, Vec<StrategyKind>)>> {
    let top_n = scored.len().min(10);
    if top_n == 0 {
        return None;
    }

    let mut prompt = format!(
        "Query: {query_text}\nReorder the following candidates from most to least relevant \
         to the query. Respond with only a comma-separated list of indices, best first.\n"
    );
    for (i, (memory, _, _)) in scored.iter().take(top_n).enumerate() {
        let snippet: String = memory.content.chars().take(200).collect();
        prompt.push_str(&format!("{i}: {snippet}\n"));
    }

    let response = tokio::time::timeout(llm_deadline, llm.generate(&prompt, None, 256, 0.0, &[]))
        .await
        .ok()?
        .ok()?;
    let indices: Vec<usize> = response
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<usize>().ok())
        .filter(|i| *i < top_n)
        .collect();
    if indices.is_empty() {
        return None;
    }

    let mut seen = HashSet::new();
    let mut reordered = Vec::with_capacity(scored.len());
    for i in indices {
        if seen.insert(i) {
            reordered.push(scored[i].clone());
        }
    }
    for (i, item) in scored.iter().enumerate() {
        if seen.insert(i) {
            reordered.push(item.clone());
        }
    }
    Some(reordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SqliteAdapter;
    use crate::model::QueryFilters;

    /// A strategy that never returns in time, used to exercise the
    /// per-strategy timeout wired in `run_strategies` (§5).
    struct SlowStrategy;

    #[async_trait::async_trait]
    impl SearchStrategy for SlowStrategy {
        fn kind(&self) -> StrategyKind {
            StrategyKind::Sparse
        }

        async fn search(
            &self,
            _tenant_id: &str,
            _project: &str,
            _query_text: &str,
            _filters: &QueryFilters,
            _limit: usize,
        ) -> Result<Vec<StrategyHit>, crate::error::SearchError> {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn strategy_exceeding_its_deadline_is_treated_as_empty_not_hung() {
        let storage = Arc::new(SqliteAdapter::open_in_memory().expect("in-memory sqlite"));
        let mut timeouts = crate::config::TimeoutConfig::default();
        timeouts.storage_ms = 20;
        let engine = HybridSearchEngine::with_timeouts(
            vec![Arc::new(SlowStrategy)],
            storage,
            None,
            SearchConfig::default(),
            ScoringConfig::default(),
            DecayConfig::default(),
            timeouts,
        );

        let request = QueryRequest::new("tenant-timeout", "default", "anything");
        let started = Instant::now();
        let response = engine.query(&request).await.expect("query still succeeds");

        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        assert_eq!(response.total_results, 0);
        assert_eq!(response.per_strategy_counts.get(&StrategyKind::Sparse).copied(), Some(0));
    }

    /// A strategy whose own deadline is generous but which still outlives
    /// the engine's top-level query deadline (§5, §7.6) surfaces as an
    /// explicit cancellation rather than a per-strategy empty result.
    #[tokio::test]
    async fn query_exceeding_the_top_level_deadline_is_cancelled() {
        let storage = Arc::new(SqliteAdapter::open_in_memory().expect("in-memory sqlite"));
        let mut timeouts = crate::config::TimeoutConfig::default();
        timeouts.storage_ms = 60_000;
        timeouts.query_ms = 20;
        let engine = HybridSearchEngine::with_timeouts(
            vec![Arc::new(SlowStrategy)],
            storage,
            None,
            SearchConfig::default(),
            ScoringConfig::default(),
            DecayConfig::default(),
            timeouts,
        );

        let request = QueryRequest::new("tenant-cancel", "default", "anything");
        let started = Instant::now();
        let err = engine.query(&request).await.expect_err("top-level deadline should elapse first");

        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        assert!(matches!(err, EngineError::Cancelled));
    }

    /// An explicit abort signal cancels the query even when every
    /// per-call deadline is generous enough to otherwise succeed (§5's
    /// "explicit abort" half of the cancellation contract).
    #[tokio::test]
    async fn explicit_cancellation_token_aborts_the_query() {
        let storage = Arc::new(SqliteAdapter::open_in_memory().expect("in-memory sqlite"));
        let engine = HybridSearchEngine::new(
            vec![Arc::new(SlowStrategy)],
            storage,
            None,
            SearchConfig::default(),
            ScoringConfig::default(),
            DecayConfig::default(),
        );

        let request = QueryRequest::new("tenant-abort", "default", "anything");
        let token = CancellationToken::new();
        token.cancel();

        let err = engine
            .query_cancellable(&request, &token)
            .await
            .expect_err("a pre-cancelled token should abort immediately");
        assert!(matches!(err, EngineError::Cancelled));
    }

    #[test]
    fn temporal_words_win_over_question_shape() {
        let analysis = analyze_intent("what happened yesterday during the incident review", None);
        assert_eq!(analysis.intent, QueryIntent::TemporalQuery);
        assert!(!analysis.temporal_markers.is_empty());
    }

    #[test]
    fn short_query_with_history_is_conversational() {
        let history = vec!["earlier turn".to_string()];
        let analysis = analyze_intent("sounds good thanks", Some(&history));
        assert_eq!(analysis.intent, QueryIntent::Conversational);
    }

    #[test]
    fn long_question_is_exploratory() {
        let analysis = analyze_intent(
            "how should we think about restructuring the onboarding flow for new hires?",
            None,
        );
        assert_eq!(analysis.intent, QueryIntent::Exploratory);
    }

    #[test]
    fn bare_lookup_falls_back_to_factual() {
        let analysis = analyze_intent("auth token refresh", None);
        assert_eq!(analysis.intent, QueryIntent::FactualLookup);
    }

    #[test]
    fn exploratory_weights_favor_graph_and_dense() {
        let analysis = analyze_intent(
            "how might we improve retention across the whole onboarding journey?",
            None,
        );
        let base_graph = StrategyKind::Graph.default_weight();
        let base_dense = StrategyKind::DenseVector.default_weight();
        assert!(analysis.recommended_weights[&StrategyKind::Graph] > base_graph);
        assert!(analysis.recommended_weights[&StrategyKind::DenseVector] > base_dense);
    }
}
