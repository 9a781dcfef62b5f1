//! Scenario C: GDPR Article 17 cascading erasure, plus the nightly
//! retention sweep for expired episodic memories.

use std::sync::Arc;

use chrono::{Duration, Utc};

use memoria_core::adapters::SqliteAdapter;
use memoria_core::model::{Layer, MemoryRecord};
use memoria_core::retention::{DataClass, DeletionReason, RetentionService};
use memoria_core::MemoryStorage;

#[tokio::test]
async fn delete_user_data_cascades_across_every_layer() {
    let adapter = Arc::new(SqliteAdapter::open_in_memory().expect("sqlite in-memory"));
    let tenant = "tenant-erasure";
    let user = "user-42";

    for layer in [Layer::Working, Layer::Episodic, Layer::Semantic, Layer::Reflective] {
        let mut record = MemoryRecord::new(tenant, "default", "agent-1", "something this user said", layer, user);
        record.importance = 0.5;
        adapter.store_memory(record).await.expect("store");
    }

    // A memory from a different source must survive the erasure.
    let mut other = MemoryRecord::new(tenant, "default", "agent-1", "someone else's note", Layer::Episodic, "user-99");
    other.importance = 0.5;
    let other_id = adapter.store_memory(other).await.expect("store other");

    let service = RetentionService::new(adapter.clone());
    let audit = service.delete_user_data(tenant, user, "admin-1").await.expect("delete_user_data");

    assert_eq!(audit.deleted_count, 4);
    assert_eq!(audit.deletion_reason, DeletionReason::UserRequest);
    assert_eq!(audit.tenant_id, tenant);

    let filter = memoria_core::adapters::MemoryFilter::default();
    let remaining = adapter
        .list_memories(tenant, &filter, usize::MAX, 0, "created_at", false)
        .await
        .expect("list_memories");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, other_id);
}

#[tokio::test]
async fn delete_user_data_is_a_no_op_for_unknown_source() {
    let adapter = Arc::new(SqliteAdapter::open_in_memory().expect("sqlite in-memory"));
    let service = RetentionService::new(adapter.clone());
    let audit = service.delete_user_data("tenant-erasure", "nobody", "admin-1").await.expect("delete_user_data");
    assert_eq!(audit.deleted_count, 0);
}

#[tokio::test]
async fn sweep_expired_removes_only_episodic_past_cutoff() {
    let adapter = Arc::new(SqliteAdapter::open_in_memory().expect("sqlite in-memory"));
    let tenant = "tenant-retention";
    let now = Utc::now();

    let mut stale = MemoryRecord::new(tenant, "default", "agent-1", "old episodic memory", Layer::Episodic, "agent");
    stale.importance = 0.5;
    stale.created_at = now - Duration::days(400);
    let stale_id = adapter.store_memory(stale).await.expect("store stale");

    let mut fresh = MemoryRecord::new(tenant, "default", "agent-1", "recent episodic memory", Layer::Episodic, "agent");
    fresh.importance = 0.5;
    fresh.created_at = now - Duration::days(10);
    let fresh_id = adapter.store_memory(fresh).await.expect("store fresh");

    // Long-term (Semantic) data never expires under the default table even
    // when equally stale.
    let mut stale_semantic = MemoryRecord::new(tenant, "default", "agent-1", "old semantic fact", Layer::Semantic, "agent");
    stale_semantic.importance = 0.5;
    stale_semantic.created_at = now - Duration::days(4000);
    let stale_semantic_id = adapter.store_memory(stale_semantic).await.expect("store stale semantic");

    let service = RetentionService::new(adapter.clone());
    let policies = service.policies_for(None);
    let entries = service.sweep_expired(tenant, &policies, now).await.expect("sweep_expired");

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].data_class, DataClass::Episodic);
    assert_eq!(entries[0].deletion_reason, DeletionReason::RetentionPolicy);
    assert_eq!(entries[0].deleted_count, 1);

    assert!(adapter.get_memory(stale_id, tenant).await.expect("get_memory").is_none());
    assert!(adapter.get_memory(fresh_id, tenant).await.expect("get_memory").is_some());
    assert!(adapter.get_memory(stale_semantic_id, tenant).await.expect("get_memory").is_some());
}

#[tokio::test]
async fn episodic_override_shortens_the_sweep_window() {
    let adapter = Arc::new(SqliteAdapter::open_in_memory().expect("sqlite in-memory"));
    let tenant = "tenant-retention-override";
    let now = Utc::now();

    let mut record = MemoryRecord::new(tenant, "default", "agent-1", "a week-old episodic memory", Layer::Episodic, "agent");
    record.importance = 0.5;
    record.created_at = now - Duration::days(10);
    let id = adapter.store_memory(record).await.expect("store");

    let service = RetentionService::new(adapter.clone());
    let policies = service.policies_for(Some(5));
    let entries = service.sweep_expired(tenant, &policies, now).await.expect("sweep_expired");

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].deleted_count, 1);
    assert!(adapter.get_memory(id, tenant).await.expect("get_memory").is_none());
}
