//! Scenario E (decay) and the dreaming worker's undersized-sample skip
//! (§8 invariant 8), driven through the public `memoria_core` API.

use std::sync::Arc;

use chrono::{Duration, Utc};

use memoria_core::adapters::SqliteAdapter;
use memoria_core::model::{Layer, MemoryRecord};
use memoria_core::{DecayConfig, DecayWorker, EngineConfig, EngineFacade, MemoryStorage, StoreRequest};

#[tokio::test]
async fn decay_worker_lowers_importance_of_stale_non_reflective_memories() {
    let adapter = Arc::new(SqliteAdapter::open_in_memory().expect("sqlite in-memory"));
    let tenant = "tenant-decay";
    let now = Utc::now();

    let mut stale = MemoryRecord::new(tenant, "default", "agent-1", "an old working note", Layer::Working, "agent");
    stale.importance = 0.8;
    stale.last_accessed_at = now - Duration::days(60);
    let stale_id = adapter.store_memory(stale).await.expect("store stale");

    let mut reflective = MemoryRecord::new(tenant, "default", "agent-1", "a hard-won insight", Layer::Reflective, "agent");
    reflective.importance = 0.8;
    reflective.last_accessed_at = now - Duration::days(60);
    let reflective_id = adapter.store_memory(reflective).await.expect("store reflective");

    let worker = DecayWorker::new(adapter.clone(), DecayConfig::default());
    let touched = worker.run_for_tenant(tenant).await.expect("run_for_tenant");
    assert_eq!(touched, 1);

    let after_stale = adapter.get_memory(stale_id, tenant).await.expect("get_memory").unwrap();
    assert!(after_stale.importance < 0.8);

    let after_reflective = adapter.get_memory(reflective_id, tenant).await.expect("get_memory").unwrap();
    assert_eq!(after_reflective.importance, 0.8, "reflective layer is exempt from decay");
}

#[tokio::test]
async fn repeated_decay_passes_never_cross_the_floor() {
    let adapter = Arc::new(SqliteAdapter::open_in_memory().expect("sqlite in-memory"));
    let tenant = "tenant-decay-floor";

    let mut record = MemoryRecord::new(tenant, "default", "agent-1", "barely important note", Layer::Working, "agent");
    record.importance = 0.3;
    record.last_accessed_at = Utc::now() - Duration::days(400);
    let id = adapter.store_memory(record).await.expect("store");

    let worker = DecayWorker::new(adapter.clone(), DecayConfig { base_decay_rate: 0.9, ..DecayConfig::default() });
    for _ in 0..20 {
        worker.run_for_tenant(tenant).await.expect("run_for_tenant");
        let current = adapter.get_memory(id, tenant).await.expect("get_memory").unwrap();
        assert!(current.importance >= 0.01);
    }
}

/// §8 invariant 8: with fewer than `min_qualifying_memories` (default 3)
/// recent important memories, dreaming returns `None` rather than
/// running on an undersized sample.
#[tokio::test]
async fn dreaming_skips_with_fewer_than_three_qualifying_memories() {
    let engine = EngineFacade::in_memory(EngineConfig::default()).expect("in-memory engine");
    let tenant = "tenant-dream-sparse";

    for i in 0..2 {
        let mut request = StoreRequest::new(tenant, "default", "agent-1", format!("important recent event {i}"), "agent");
        request.importance = Some(0.9);
        engine.store(request).await.expect("store");
    }

    let outcome = engine.generate_reflections(tenant, "default", "agent-1").await.expect("generate_reflections");
    assert!(outcome.is_none());
}

/// With enough qualifying memories, dreaming produces a reflection
/// persisted into the reflective layer.
#[tokio::test]
async fn dreaming_produces_a_reflection_once_the_sample_is_large_enough() {
    let engine = EngineFacade::in_memory(EngineConfig::default()).expect("in-memory engine");
    let tenant = "tenant-dream-full";

    for i in 0..5 {
        let mut request = StoreRequest::new(tenant, "default", "agent-1", format!("important recent event {i}"), "agent");
        request.importance = Some(0.9);
        engine.store(request).await.expect("store");
    }

    let outcome = engine
        .generate_reflections(tenant, "default", "agent-1")
        .await
        .expect("generate_reflections")
        .expect("enough qualifying memories for a dreaming pass");

    let stats = engine.get_statistics(tenant, "default").await.expect("get_statistics");
    let reflective_count = stats
        .layer_counts
        .iter()
        .find(|c| c.layer == Layer::Reflective)
        .map(|c| c.count)
        .unwrap_or(0);
    assert!(reflective_count >= 1);
    let _ = outcome.reflection_id;
}

/// Low-importance memories never qualify for a dreaming pass, even in
/// abundance, because the gate filters on `min_importance` before
/// counting toward the sample-size threshold.
#[tokio::test]
async fn low_importance_memories_never_qualify_for_dreaming() {
    let engine = EngineFacade::in_memory(EngineConfig::default()).expect("in-memory engine");
    let tenant = "tenant-dream-unimportant";

    for i in 0..10 {
        let mut request = StoreRequest::new(tenant, "default", "agent-1", format!("trivial note {i}"), "agent");
        request.importance = Some(0.1);
        engine.store(request).await.expect("store");
    }

    let outcome = engine.generate_reflections(tenant, "default", "agent-1").await.expect("generate_reflections");
    assert!(outcome.is_none());
}
