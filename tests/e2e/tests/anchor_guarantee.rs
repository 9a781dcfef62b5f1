//! Scenario A (anchor guarantee), Scenario B (fusion with filters), and
//! §8 invariants 6 and 7, driven end-to-end through `EngineFacade`.

use chrono::{Duration, Utc};

use memoria_core::{EngineConfig, EngineFacade, Layer, QueryRequest, StoreRequest};

fn engine() -> EngineFacade {
    EngineFacade::in_memory(EngineConfig::default()).expect("in-memory engine")
}

/// Scenario A: a query mentioning a specific ticket id retrieves the
/// memory that contains it in top-1, even though the rest of the query
/// text ("show me") carries no semantic weight toward it.
#[tokio::test]
async fn anchor_guarantee_surfaces_ticket_in_top_one() {
    let engine = engine();
    let id = engine
        .store(StoreRequest::new(
            "tenant-anchor",
            "default",
            "agent-1",
            "The deployment failed at 2026-01-03 due to bug #457 tracing to 0x4EF",
            "agent",
        ))
        .await
        .expect("store");

    // A few unrelated memories so top-1 isn't trivially the only record.
    for text in ["unrelated note about lunch", "the weather was nice today", "random observation"] {
        engine
            .store(StoreRequest::new("tenant-anchor", "default", "agent-1", text, "agent"))
            .await
            .expect("store filler");
    }

    let response = engine
        .query(QueryRequest::new("tenant-anchor", "default", "show me bug #457"))
        .await
        .expect("query");

    assert!(!response.results.is_empty());
    assert_eq!(response.results[0].memory.id, id);
}

/// §8 invariant 6: a query with no recognized anchor pattern contributes
/// nothing from the anchor strategy (observed here as per-strategy count
/// zero — the overall query can still succeed via other strategies).
#[tokio::test]
async fn no_anchor_pattern_yields_zero_anchor_hits() {
    let engine = engine();
    engine
        .store(StoreRequest::new("tenant-anchor", "default", "agent-1", "just a plain thought", "agent"))
        .await
        .expect("store");

    let response = engine
        .query(QueryRequest::new("tenant-anchor", "default", "what did we learn yesterday"))
        .await
        .expect("query");

    let anchor_count = response
        .per_strategy_counts
        .get(&memoria_core::StrategyKind::Anchor)
        .copied()
        .unwrap_or(0);
    assert_eq!(anchor_count, 0);
}

/// §8 invariant 7: a query containing a UUID retrieves the memory whose
/// content contains that UUID (case-insensitivity on the hex digits).
#[tokio::test]
async fn uuid_anchor_is_case_insensitive() {
    let engine = engine();
    let uuid_text = "4EB0C9D1-8F3A-4C2E-9B1A-6D2F1E0A9C3B";
    let id = engine
        .store(StoreRequest::new(
            "tenant-anchor",
            "default",
            "agent-1",
            format!("see {} for detail on the incident", uuid_text.to_lowercase()),
            "agent",
        ))
        .await
        .expect("store");

    let response = engine
        .query(QueryRequest::new("tenant-anchor", "default", format!("what about {uuid_text}")))
        .await
        .expect("query");

    assert!(response.results.iter().any(|r| r.memory.id == id));
}

/// Scenario B: three memories at different importance/age are filtered
/// by `min_importance`, and rank by the combination of importance and
/// recency among the survivors.
#[tokio::test]
async fn fusion_respects_min_importance_filter_and_orders_by_importance_and_recency() {
    let engine = engine();
    let now = Utc::now();

    let mut high = StoreRequest::new("tenant-fusion", "default", "agent-1", "the staging deploy failed with a timeout", "agent");
    high.importance = Some(0.9);
    high.layer = Some(Layer::Semantic);
    let high_id = engine.store(high).await.expect("store high");

    let mut mid = StoreRequest::new("tenant-fusion", "default", "agent-1", "the staging deploy had a warning", "agent");
    mid.importance = Some(0.5);
    mid.layer = Some(Layer::Semantic);
    let mid_id = engine.store(mid).await.expect("store mid");

    let mut low = StoreRequest::new("tenant-fusion", "default", "agent-1", "the staging deploy ran fine", "agent");
    low.importance = Some(0.2);
    low.layer = Some(Layer::Semantic);
    let low_id = engine.store(low).await.expect("store low");

    // Back-date created_at/last_accessed_at directly isn't exposed through
    // StoreRequest (the engine always timestamps "now"); instead verify
    // the documented ordering property using ages the kernel actually
    // observes via explicit score construction, matching what a caller
    // who *can* control timestamps (e.g. a migrated-in dataset) would see.
    let _ = (now, high_id, mid_id, low_id);

    let mut request = QueryRequest::new("tenant-fusion", "default", "staging deploy");
    request.filters.min_importance = Some(0.3);
    request.top_k = 10;
    let response = engine.query(request).await.expect("query");

    let returned_ids: Vec<_> = response.results.iter().map(|r| r.memory.id).collect();
    assert!(returned_ids.contains(&high_id));
    assert!(returned_ids.contains(&mid_id));
    assert!(!returned_ids.contains(&low_id));

    let high_rank = response.results.iter().find(|r| r.memory.id == high_id).unwrap().rank;
    let mid_rank = response.results.iter().find(|r| r.memory.id == mid_id).unwrap().rank;
    assert!(high_rank < mid_rank);
}

/// Same scenario, but driving the scoring kernel directly against
/// explicit ages so the recency/importance ordering from §8 Scenario B
/// is checked independent of the fusion pipeline's own ranking.
#[test]
fn scoring_kernel_orders_scenario_b_inputs_as_specified() {
    use memoria_core::model::{Layer, MemoryRecord};
    use memoria_core::{score_record, ScoringWeights};

    let weights = ScoringWeights::default();
    let now = Utc::now();

    let mut high = MemoryRecord::new("t", "p", "a", "high", Layer::Semantic, "test");
    high.importance = 0.9;
    high.last_accessed_at = now;

    let mut mid = MemoryRecord::new("t", "p", "a", "mid", Layer::Semantic, "test");
    mid.importance = 0.5;
    mid.last_accessed_at = now - Duration::days(10);

    let mut low = MemoryRecord::new("t", "p", "a", "low", Layer::Semantic, "test");
    low.importance = 0.2;
    low.last_accessed_at = now - Duration::days(30);

    let (high_score, _) = score_record(&high, 0.5, now, weights, 0.01);
    let (mid_score, _) = score_record(&mid, 0.5, now, weights, 0.01);
    let (low_score, _) = score_record(&low, 0.5, now, weights, 0.01);

    assert!(high_score.final_score > mid_score.final_score);
    assert!(mid_score.final_score > low_score.final_score);
}
