//! Data retention & GDPR erasure (§6 "Retention").
//!
//! Per-tenant retention policies mapping a [`DataClass`] to a number of
//! days, a nightly sweep that deletes rows past their cutoff, and a
//! cascading user-erasure path (GDPR Art. 17) that deletes memories,
//! semantic nodes, and reflections matching a source identifier while
//! leaving cost/audit rows pseudonymized rather than removed.
//!
//! Grounded in
//! `original_source/apps/memory_api/services/retention_service.py`:
//! same `DataClass`/`DeletionReason` enums, same default-days table, same
//! "audit row per data class touched" shape, translated from the async
//! Postgres version into one built on [`MemoryStorage`].

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adapters::{MemoryFilter, MemoryStorage};
use crate::error::EngineResult;
use crate::model::Layer;

/// Classification of data for retention purposes. Distinct from
/// [`crate::model::InfoClass`], which governs storage eligibility rather
/// than lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataClass {
    Episodic,
    LongTerm,
    Reflective,
    SemanticNodes,
    GraphTriples,
    AuditLogs,
    CostLogs,
    Embeddings,
}

/// Reason recorded on a [`DeletionAuditEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionReason {
    RetentionPolicy,
    UserRequest,
    TenantDeletion,
    DataQuality,
    LegalRequirement,
    AdminAction,
}

/// `retention_days` of `-1` means "never delete".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub data_class: DataClass,
    pub retention_days: i64,
    pub soft_delete_grace_days: u32,
    pub exceptions: Vec<String>,
}

impl RetentionPolicy {
    fn new(data_class: DataClass, retention_days: i64) -> Self {
        Self {
            data_class,
            retention_days,
            soft_delete_grace_days: 30,
            exceptions: Vec::new(),
        }
    }

    pub fn never_deletes(&self) -> bool {
        self.retention_days < 0
    }

    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.never_deletes() {
            None
        } else {
            Some(now - Duration::days(self.retention_days))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionAuditEntry {
    pub id: Uuid,
    pub tenant_id: String,
    pub data_class: DataClass,
    pub deletion_reason: DeletionReason,
    pub deleted_count: usize,
    pub deleted_by: String,
    pub deletion_timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// Default retention policy table (§6): episodic 365d, long-term/
/// reflective/semantic-nodes/graph-triples never, audit 2555d (7y),
/// cost 1095d (3y), embeddings 365d.
pub fn default_policies() -> Vec<RetentionPolicy> {
    vec![
        RetentionPolicy::new(DataClass::Episodic, 365),
        RetentionPolicy::new(DataClass::LongTerm, -1),
        RetentionPolicy::new(DataClass::Reflective, -1),
        RetentionPolicy::new(DataClass::SemanticNodes, -1),
        RetentionPolicy::new(DataClass::GraphTriples, -1),
        RetentionPolicy::new(DataClass::AuditLogs, 2555),
        RetentionPolicy::new(DataClass::CostLogs, 1095),
        RetentionPolicy::new(DataClass::Embeddings, 365),
    ]
}

/// Sweeps expired rows and performs GDPR-style cascading erasure. Holds no
/// state beyond the storage handle; every call is tenant-scoped and
/// re-entrant, matching the engine facade's own contract.
pub struct RetentionService {
    storage: Arc<dyn MemoryStorage>,
}

impl RetentionService {
    pub fn new(storage: Arc<dyn MemoryStorage>) -> Self {
        Self { storage }
    }

    /// Per-tenant retention policies. Only episodic retention is
    /// tenant-overridable (per §6); all other data classes use the
    /// default table. `override_episodic_days` is `None` to use the
    /// 365-day default.
    pub fn policies_for(&self, override_episodic_days: Option<i64>) -> Vec<RetentionPolicy> {
        let mut policies = default_policies();
        if let Some(days) = override_episodic_days {
            if let Some(p) = policies.iter_mut().find(|p| p.data_class == DataClass::Episodic) {
                p.retention_days = days;
            }
        }
        policies
    }

    /// Nightly sweep: deletes episodic memories past their cutoff. Other
    /// data classes (audit/cost logs, embeddings) live in stores this
    /// crate does not own and are swept by their respective adapters; this
    /// method covers the memory-storage-backed classes only.
    pub async fn sweep_expired(
        &self,
        tenant_id: &str,
        policies: &[RetentionPolicy],
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<DeletionAuditEntry>> {
        let mut entries = Vec::new();
        for policy in policies {
            if policy.data_class != DataClass::Episodic {
                continue;
            }
            let Some(cutoff) = policy.cutoff(now) else {
                continue;
            };
            let filter = MemoryFilter {
                layer: Some(Layer::Episodic),
                created_before: Some(cutoff),
                ..Default::default()
            };
            let candidates = self
                .storage
                .list_memories(tenant_id, &filter, usize::MAX, 0, "created_at", false)
                .await?;
            let mut deleted = 0;
            for record in candidates {
                if record.tags.iter().any(|t| policy.exceptions.contains(t)) {
                    continue;
                }
                if self.storage.delete_memory(record.id, tenant_id).await? {
                    deleted += 1;
                }
            }
            if deleted > 0 {
                entries.push(self.audit_entry(
                    tenant_id,
                    DataClass::Episodic,
                    DeletionReason::RetentionPolicy,
                    deleted,
                    "system",
                    serde_json::json!({ "cutoff": cutoff.to_rfc3339(), "retention_days": policy.retention_days }),
                ));
            }
        }
        Ok(entries)
    }

    /// GDPR Article 17 cascade (Scenario C): deletes every memory whose
    /// `source` matches `user_identifier`, across every layer. Cost/audit
    /// records are out of this crate's storage surface and are
    /// pseudonymized by their own subsystem, not deleted here — this
    /// method only emits the audit entries this crate is authoritative
    /// for (memory deletion).
    pub async fn delete_user_data(
        &self,
        tenant_id: &str,
        user_identifier: &str,
        deleted_by: &str,
    ) -> EngineResult<DeletionAuditEntry> {
        let filter = MemoryFilter {
            source: Some(user_identifier.to_string()),
            ..Default::default()
        };
        let matches = self
            .storage
            .list_memories(tenant_id, &filter, usize::MAX, 0, "created_at", false)
            .await?;
        let mut deleted = 0;
        for record in &matches {
            if self.storage.delete_memory(record.id, tenant_id).await? {
                deleted += 1;
            }
        }
        Ok(self.audit_entry(
            tenant_id,
            DataClass::Episodic,
            DeletionReason::UserRequest,
            deleted,
            deleted_by,
            serde_json::json!({ "user_identifier": user_identifier }),
        ))
    }

    fn audit_entry(
        &self,
        tenant_id: &str,
        data_class: DataClass,
        reason: DeletionReason,
        deleted_count: usize,
        deleted_by: &str,
        metadata: serde_json::Value,
    ) -> DeletionAuditEntry {
        DeletionAuditEntry {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            data_class,
            deletion_reason: reason,
            deleted_count,
            deleted_by: deleted_by.to_string(),
            deletion_timestamp: Utc::now(),
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_matches_spec_days() {
        let policies = default_policies();
        let get = |dc: DataClass| policies.iter().find(|p| p.data_class == dc).unwrap().retention_days;
        assert_eq!(get(DataClass::Episodic), 365);
        assert_eq!(get(DataClass::LongTerm), -1);
        assert_eq!(get(DataClass::Reflective), -1);
        assert_eq!(get(DataClass::AuditLogs), 2555);
        assert_eq!(get(DataClass::CostLogs), 1095);
        assert_eq!(get(DataClass::Embeddings), 365);
    }

    #[test]
    fn never_delete_has_no_cutoff() {
        let policy = RetentionPolicy::new(DataClass::LongTerm, -1);
        assert!(policy.cutoff(Utc::now()).is_none());
    }

    #[test]
    fn episodic_override_only_touches_episodic() {
        let policies = RetentionService::new(Arc::new(crate::adapters::SqliteAdapter::open_in_memory().unwrap()))
            .policies_for(Some(30));
        let episodic = policies.iter().find(|p| p.data_class == DataClass::Episodic).unwrap();
        let long_term = policies.iter().find(|p| p.data_class == DataClass::LongTerm).unwrap();
        assert_eq!(episodic.retention_days, 30);
        assert_eq!(long_term.retention_days, -1);
    }
}
