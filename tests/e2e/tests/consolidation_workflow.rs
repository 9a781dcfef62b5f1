//! Scenario D: ten working-layer memories in one session, all above the
//! promotion-importance threshold and "used" enough times to clear the
//! usage-count threshold, get folded into at least one long-term memory
//! whose metadata links back to every source id, and the sources are
//! marked consolidated.

use std::sync::Arc;

use memoria_core::adapters::{BruteForceVectorStore, FallbackEmbeddingProvider, FallbackLlmProvider, InMemoryCache, SqliteAdapter};
use memoria_core::{EngineConfig, EngineFacade, Layer, MemoryStorage, StoreRequest};

#[tokio::test]
async fn ten_similar_working_memories_consolidate_into_long_term() {
    let adapter = Arc::new(SqliteAdapter::open_in_memory().expect("sqlite in-memory"));
    let engine = EngineFacade::new(
        adapter.clone(),
        Arc::new(BruteForceVectorStore::default()),
        adapter.clone(),
        Arc::new(InMemoryCache::default()),
        Arc::new(FallbackEmbeddingProvider::default()),
        Arc::new(FallbackLlmProvider::new()),
        EngineConfig::default(),
    );

    let mut source_ids = Vec::with_capacity(10);
    for i in 0..10 {
        let mut request = StoreRequest::new(
            "tenant-consolidate",
            "default",
            "agent-1",
            format!("deploy pipeline incident report number {i} staging outage database timeout"),
            "agent",
        );
        request.layer = Some(Layer::Working);
        request.importance = Some(0.7);
        request.session_id = Some("session-1".to_string());
        let id = engine.store(request).await.expect("store working item");
        source_ids.push(id);
    }

    // Promotion requires usage_count >= working_promotion_usage_count
    // (default 3); mark every item used the minimum number of times via
    // the storage adapter's usage counter directly, mirroring how a
    // caller that repeatedly surfaces a memory through retrieval would
    // drive it through the MemoryStorage boundary this crate exposes.
    for _ in 0..3 {
        adapter
            .touch_usage_batch(&source_ids, "tenant-consolidate")
            .await
            .expect("touch_usage_batch");
    }

    let report = engine.consolidate("tenant-consolidate", "default").await.expect("consolidate");
    assert!(
        !report.working_consolidation.long_term_ids.is_empty(),
        "expected at least one long-term memory from consolidation"
    );
    assert_eq!(report.working_consolidation.consolidated_source_ids.len(), source_ids.len());

    let new_id = report.working_consolidation.long_term_ids[0];
    let new_record = adapter
        .get_memory(new_id, "tenant-consolidate")
        .await
        .expect("get_memory")
        .expect("long-term record exists");
    assert_eq!(new_record.layer, Layer::Episodic);

    let linked = new_record
        .metadata
        .get("consolidated_from")
        .and_then(|v| v.as_array())
        .expect("consolidated_from metadata is an array");
    let linked_ids: Vec<String> = linked.iter().filter_map(|v| v.as_str().map(String::from)).collect();
    for id in &source_ids {
        assert!(linked_ids.contains(&id.to_string()), "missing source id {id} in consolidated_from");
    }

    for id in &source_ids {
        let record = adapter
            .get_memory(*id, "tenant-consolidate")
            .await
            .expect("get_memory")
            .expect("source item still readable");
        assert!(record.is_consolidated, "source item {id} should be marked consolidated");
    }
}

#[tokio::test]
async fn consolidation_is_a_no_op_when_nothing_is_promotable() {
    let engine = EngineFacade::in_memory(EngineConfig::default()).expect("in-memory engine");
    let mut request = StoreRequest::new("tenant-empty", "default", "agent-1", "a low-importance working note", "agent");
    request.layer = Some(Layer::Working);
    request.importance = Some(0.2);
    engine.store(request).await.expect("store");

    let report = engine.consolidate("tenant-empty", "default").await.expect("consolidate");
    assert!(report.working_consolidation.long_term_ids.is_empty());
    assert!(report.working_consolidation.consolidated_source_ids.is_empty());
}
