//! Working layer: bounded, minute-scale retention, searchable.
//!
//! Promotion to long-term requires both `importance >= threshold` and
//! `usage_count >= threshold` inside the retention window (§4.C). A
//! separate consolidation pass groups semantically similar working items
//! into a single LLM-synthesized long-term item.

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::adapters::{storage::MemoryFilter, EmbeddingProvider, LlmProvider, MemoryStorage, TaskType, VectorStore, VectorPayload};
use crate::config::{LayerConfig, TimeoutConfig};
use crate::error::{EngineError, EngineResult};
use crate::model::{Layer, MemoryRecord, MemoryType};

use super::{layer_mismatch_err, LayerAdapters, MemoryLayer};

pub struct WorkingLayer {
    adapters: LayerAdapters,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmProvider>,
    capacity: usize,
    retention_secs: u64,
    promotion_importance: f32,
    promotion_usage_count: u32,
    embedding_deadline: Duration,
    llm_deadline: Duration,
}

/// Similarity threshold above which two working items are grouped into
/// the same consolidation cluster.
const CONSOLIDATION_SIMILARITY: f32 = 0.82;

#[derive(Debug, Clone, Default)]
pub struct ConsolidationOutcome {
    pub long_term_ids: Vec<Uuid>,
    pub consolidated_source_ids: Vec<Uuid>,
}

impl WorkingLayer {
    pub fn new(
        adapters: LayerAdapters,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
        config: &LayerConfig,
    ) -> Self {
        Self {
            adapters,
            embedder,
            llm,
            capacity: config.working_capacity,
            retention_secs: config.working_retention_secs,
            promotion_importance: config.working_promotion_importance,
            promotion_usage_count: config.working_promotion_usage_count,
            embedding_deadline: TimeoutConfig::default().embedding(),
            llm_deadline: TimeoutConfig::default().llm(),
        }
    }

    /// Same as [`Self::new`], but with adapter-call deadlines taken from
    /// an explicit [`TimeoutConfig`] rather than its default (§5).
    pub fn with_timeouts(
        adapters: LayerAdapters,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
        config: &LayerConfig,
        timeouts: &TimeoutConfig,
    ) -> Self {
        let mut layer = Self::new(adapters, embedder, llm, config);
        layer.embedding_deadline = timeouts.embedding();
        layer.llm_deadline = timeouts.llm();
        layer
    }

    /// Items eligible for promotion: importance and usage count both meet
    /// their thresholds, still inside the retention window.
    pub async fn promotable(&self, tenant_id: &str) -> EngineResult<Vec<MemoryRecord>> {
        let filter = MemoryFilter {
            layer: Some(Layer::Working),
            min_importance: Some(self.promotion_importance),
            exclude_consolidated: true,
            ..Default::default()
        };
        let candidates = self
            .adapters
            .storage
            .list_memories(tenant_id, &filter, usize::MAX, 0, "importance", true)
            .await?;
        let now = chrono::Utc::now();
        Ok(candidates
            .into_iter()
            .filter(|r| r.usage_count >= self.promotion_usage_count as u64)
            .filter(|r| now.signed_duration_since(r.created_at).num_seconds() <= self.retention_secs as i64)
            .collect())
    }

    /// Consolidates groups of semantically similar working items into new
    /// long-term records. Source items are marked consolidated in place
    /// (tombstoned, not deleted — they remain readable per §4.C).
    pub async fn consolidate(&self, tenant_id: &str) -> EngineResult<ConsolidationOutcome> {
        let candidates = self.promotable(tenant_id).await?;
        let mut outcome = ConsolidationOutcome::default();
        if candidates.is_empty() {
            return Ok(outcome);
        }

        let mut embeddings = Vec::with_capacity(candidates.len());
        for item in &candidates {
            embeddings.push(self.embed_with_deadline(&item.content).await?);
        }

        let mut clustered = vec![false; candidates.len()];
        for i in 0..candidates.len() {
            if clustered[i] {
                continue;
            }
            let mut cluster = vec![i];
            clustered[i] = true;
            for j in (i + 1)..candidates.len() {
                if clustered[j] {
                    continue;
                }
                if cosine(&embeddings[i], &embeddings[j]) >= CONSOLIDATION_SIMILARITY {
                    clustered[j] = true;
                    cluster.push(j);
                }
            }
            if cluster.len() < 2 {
                continue;
            }

            let members: Vec<&MemoryRecord> = cluster.iter().map(|&idx| &candidates[idx]).collect();
            let synthesized = self.synthesize(&members).await?;
            let avg_importance = members.iter().map(|m| m.importance).sum::<f32>() / members.len() as f32;

            let mut new_record = MemoryRecord::new(
                tenant_id,
                members[0].project.clone(),
                members[0].agent_id.clone(),
                synthesized,
                Layer::Episodic,
                "consolidation",
            );
            new_record.memory_type = MemoryType::Text;
            new_record.importance = (avg_importance + 0.2).min(1.0);
            new_record.session_id = members[0].session_id.clone();
            new_record.metadata.insert(
                "consolidated_from".to_string(),
                serde_json::json!(members.iter().map(|m| m.id.to_string()).collect::<Vec<_>>()),
            );

            let embedding = self.embed_with_deadline(&new_record.content).await?;
            let new_id = self.adapters.storage.store_memory(new_record).await?;
            self.adapters
                .vector_store
                .store_vector(new_id, tenant_id, Layer::Episodic, VectorPayload::Single(embedding))
                .await?;
            outcome.long_term_ids.push(new_id);

            for member in &members {
                self.adapters
                    .storage
                    .update_memory(
                        member.id,
                        tenant_id,
                        serde_json::json!({ "is_consolidated": true }),
                    )
                    .await?;
                outcome.consolidated_source_ids.push(member.id);
            }
        }

        Ok(outcome)
    }

    async fn synthesize(&self, members: &[&MemoryRecord]) -> EngineResult<String> {
        let joined = members
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n---\n");
        let prompt = format!(
            "Synthesize the following related observations into one concise consolidated memory:\n{joined}"
        );
        match tokio::time::timeout(self.llm_deadline, self.llm.generate(&prompt, None, 512, 0.2, &[])).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(EngineError::Timeout),
        }
    }

    async fn embed_with_deadline(&self, text: &str) -> EngineResult<Vec<f32>> {
        match tokio::time::timeout(self.embedding_deadline, self.embedder.embed_text(text, TaskType::SearchDocument)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(EngineError::Timeout),
        }
    }

    async fn sweep(&self, tenant_id: &str) -> EngineResult<usize> {
        let mut affected = self.adapters.storage.delete_expired_memories(tenant_id, Layer::Working).await?;

        let filter = MemoryFilter {
            layer: Some(Layer::Working),
            ..Default::default()
        };
        let count = self.adapters.storage.count_memories(tenant_id, &filter).await?;
        if count > self.capacity {
            let overflow = self
                .adapters
                .storage
                .list_memories(
                    tenant_id,
                    &filter,
                    count - self.capacity,
                    self.capacity,
                    "created_at",
                    true,
                )
                .await?;
            for record in overflow {
                self.adapters.storage.delete_memory(record.id, tenant_id).await?;
                affected += 1;
            }
        }
        Ok(affected)
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[async_trait::async_trait]
impl MemoryLayer for WorkingLayer {
    fn layer_tag(&self) -> Layer {
        Layer::Working
    }

    async fn add(&self, mut record: MemoryRecord) -> EngineResult<Uuid> {
        if record.layer != Layer::Working {
            return Err(layer_mismatch_err(Layer::Working, record.layer));
        }
        record.validate().map_err(EngineError::validation)?;
        if record.expires_at.is_none() {
            record.expires_at = Some(record.created_at + chrono::Duration::seconds(self.retention_secs as i64));
        }
        let tenant_id = record.tenant_id.clone();
        let id = self.adapters.storage.store_memory(record).await?;
        let _ = self.sweep(&tenant_id).await;
        Ok(id)
    }

    async fn get(&self, memory_id: Uuid, tenant_id: &str) -> EngineResult<Option<MemoryRecord>> {
        if let Some(mut record) = self.adapters.storage.get_memory(memory_id, tenant_id).await? {
            self.adapters.storage.touch_access(memory_id, tenant_id).await?;
            self.adapters.storage.touch_usage_batch(&[memory_id], tenant_id).await?;
            record.touch_access();
            record.mark_used();
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }

    async fn search(&self, tenant_id: &str, query: &str, limit: usize) -> EngineResult<Vec<MemoryRecord>> {
        let hits = self
            .adapters
            .storage
            .search_memories(tenant_id, Some(Layer::Working), query, limit, false)
            .await?;
        Ok(hits.into_iter().map(|h| h.memory).collect())
    }

    async fn count(&self, tenant_id: &str) -> EngineResult<usize> {
        let filter = MemoryFilter {
            layer: Some(Layer::Working),
            ..Default::default()
        };
        Ok(self.adapters.storage.count_memories(tenant_id, &filter).await?)
    }

    async fn cleanup(&self, tenant_id: &str) -> EngineResult<usize> {
        self.sweep(tenant_id).await
    }
}
