//! Engine facade (§4.F): the single entry point wiring every other
//! component into six operations (`store`, `query`, `consolidate`,
//! `generate_reflections`, `get_statistics`, `clear`), plus a Szubar-mode
//! supplement resolved from `original_source/tests/test_szubar_mode.py`.
//!
//! `EngineFacade` holds every adapter as an `Arc<dyn _>` and constructs the
//! layer façades, the hybrid search engine, and the reflection/dreaming
//! workers once at startup; none of the operations below hold ambient
//! state beyond that.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use crate::adapters::{
    CacheProvider, EmbeddingProvider, FallbackEmbeddingProvider, FallbackLlmProvider, GraphStore,
    InMemoryCache, LlmProvider, MemoryFilter, MemoryStorage, SqliteAdapter, TaskType, VectorPayload,
    VectorStore,
};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::governance::{apply_governance_tags, GovernancePattern};
use crate::layers::{
    ConsolidationOutcome, LayerAdapters, LongTermLayer, MemoryLayer, ReflectiveLayer, SensoryLayer,
    WorkingLayer,
};
use crate::model::{InfoClass, Layer, MemoryRecord, MemoryType, QueryRequest, QueryResponse, StrategyKind};
use crate::search::{
    AnchorStrategy, DenseVectorStrategy, GraphStrategy, HybridSearchEngine, MultiVectorStrategy,
    SearchStrategy, SparseStrategy,
};
use crate::workers::{DreamingWorker, Outcome, ReflectionContext, ReflectionEngine, ReflectionOutcome};

/// Layer above which an unspecified-layer store is routed directly into
/// long-term rather than working memory. Not named in `spec.md` — a
/// judgment call recorded in `DESIGN.md`, chosen to sit above the default
/// working-promotion-importance threshold so a single high-importance
/// write doesn't have to wait for a consolidation pass to reach long-term.
const DIRECT_LONG_TERM_IMPORTANCE: f32 = 0.8;

/// Input to [`EngineFacade::store`]. Only `tenant_id`/`project`/`agent_id`/
/// `content`/`source` are required; everything else defaults the way
/// `MemoryRecord::new` does.
#[derive(Debug, Clone)]
pub struct StoreRequest {
    pub tenant_id: String,
    pub project: String,
    pub agent_id: String,
    pub content: String,
    pub source: String,
    pub importance: Option<f32>,
    pub layer: Option<Layer>,
    pub tags: Option<Vec<String>>,
    pub session_id: Option<String>,
    pub memory_type: Option<MemoryType>,
    pub ttl_secs: Option<i64>,
    pub governance: Option<GovernancePattern>,
    pub info_class: Option<InfoClass>,
    pub metadata: Option<HashMap<String, serde_json::Value>>,
    pub extract_graph: bool,
}

impl StoreRequest {
    pub fn new(
        tenant_id: impl Into<String>,
        project: impl Into<String>,
        agent_id: impl Into<String>,
        content: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            project: project.into(),
            agent_id: agent_id.into(),
            content: content.into(),
            source: source.into(),
            importance: None,
            layer: None,
            tags: None,
            session_id: None,
            memory_type: None,
            ttl_secs: None,
            governance: None,
            info_class: None,
            metadata: None,
            extract_graph: false,
        }
    }
}

/// Szubar-mode weight source (§4.F supplement): "a pluggable
/// `WeightTuningProvider`, not a full tuning subsystem". Implementations
/// may be a bandit, an A/B assignment, or a static per-tenant override
/// table — the engine only needs a weight vector back.
#[async_trait]
pub trait WeightTuningProvider: Send + Sync {
    async fn get_current_weights(&self, tenant_id: &str) -> HashMap<StrategyKind, f32>;
}

/// Per-layer memory counts returned by [`EngineFacade::get_statistics`].
#[derive(Debug, Clone, Copy)]
pub struct LayerCount {
    pub layer: Layer,
    pub count: usize,
}

#[derive(Debug, Clone)]
pub struct EngineStatistics {
    pub tenant_id: String,
    pub project: String,
    pub layer_counts: Vec<LayerCount>,
    pub total_memories: usize,
    pub average_importance: f64,
    pub top_accessed: Vec<MemoryRecord>,
}

/// Outcome of a [`EngineFacade::consolidate`] pass.
#[derive(Debug, Clone, Default)]
pub struct ConsolidationReport {
    pub sensory_evicted_or_promoted: usize,
    pub working_consolidation: ConsolidationOutcome,
    pub reflections_generated: usize,
}

pub struct EngineFacade {
    storage: Arc<dyn MemoryStorage>,
    vector_store: Arc<dyn VectorStore>,
    graph_store: Arc<dyn GraphStore>,
    cache: Arc<dyn CacheProvider>,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmProvider>,

    sensory: SensoryLayer,
    working: WorkingLayer,
    long_term: LongTermLayer,
    reflective: Arc<ReflectiveLayer>,

    hybrid_search: Arc<HybridSearchEngine>,
    reflection_engine: Arc<ReflectionEngine>,
    dreaming: DreamingWorker,

    config: EngineConfig,

    szubar_mode: AtomicBool,
    tuning_provider: Mutex<Option<Arc<dyn WeightTuningProvider>>>,
}

impl EngineFacade {
    /// Wires every adapter into the layer façades, the hybrid search
    /// engine, and the reflection/dreaming workers.
    pub fn new(
        storage: Arc<dyn MemoryStorage>,
        vector_store: Arc<dyn VectorStore>,
        graph_store: Arc<dyn GraphStore>,
        cache: Arc<dyn CacheProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
        config: EngineConfig,
    ) -> Self {
        let adapters = LayerAdapters {
            storage: storage.clone(),
            vector_store: vector_store.clone(),
        };

        let sensory = SensoryLayer::new(adapters.clone(), &config.layers);
        let working =
            WorkingLayer::with_timeouts(adapters.clone(), embedder.clone(), llm.clone(), &config.layers, &config.timeouts);
        let long_term = LongTermLayer::new(adapters.clone(), &config.layers);
        let reflective = Arc::new(ReflectiveLayer::new(adapters.clone(), &config.layers));

        let strategies: Vec<Arc<dyn SearchStrategy>> = vec![
            Arc::new(DenseVectorStrategy::new(embedder.clone(), vector_store.clone(), storage.clone())),
            Arc::new(MultiVectorStrategy::new(Vec::new(), storage.clone())),
            Arc::new(SparseStrategy::new(storage.clone())),
            Arc::new(AnchorStrategy::new(storage.clone())),
            Arc::new(GraphStrategy::new(graph_store.clone(), storage.clone())),
        ];
        let hybrid_search = Arc::new(HybridSearchEngine::with_timeouts(
            strategies,
            storage.clone(),
            Some(llm.clone()),
            config.search,
            config.scoring,
            config.decay,
            config.timeouts,
        ));

        let reflection_engine = Arc::new(ReflectionEngine::with_timeout(
            llm.clone(),
            reflective.clone(),
            config.timeouts.llm(),
        ));
        let dreaming = DreamingWorker::new(storage.clone(), reflection_engine.clone(), config.dreaming);

        Self {
            storage,
            vector_store,
            graph_store,
            cache,
            embedder,
            llm,
            sensory,
            working,
            long_term,
            reflective,
            hybrid_search,
            reflection_engine,
            dreaming,
            config,
            szubar_mode: AtomicBool::new(false),
            tuning_provider: Mutex::new(None),
        }
    }

    /// Convenience constructor for tests and single-process deployments:
    /// an in-memory SQLite-backed store (doubling as the graph store),
    /// the brute-force vector store, an in-memory cache, and the
    /// dependency-free fallback embedding/LLM providers.
    pub fn in_memory(config: EngineConfig) -> EngineResult<Self> {
        let adapter = Arc::new(SqliteAdapter::open_in_memory()?);
        Ok(Self::new(
            adapter.clone(),
            Arc::new(crate::adapters::BruteForceVectorStore::default()),
            adapter,
            Arc::new(InMemoryCache::default()),
            Arc::new(FallbackEmbeddingProvider::default()),
            Arc::new(FallbackLlmProvider::new()),
            config,
        ))
    }

    /// Installs a Szubar-mode weight-tuning provider. Has no effect until
    /// [`Self::set_szubar_mode`] is also enabled.
    pub fn set_tuning_provider(&self, provider: Arc<dyn WeightTuningProvider>) {
        *self.tuning_provider.lock().unwrap_or_else(|e| e.into_inner()) = Some(provider);
    }

    pub fn set_szubar_mode(&self, enabled: bool) {
        self.szubar_mode.store(enabled, Ordering::SeqCst);
    }

    pub fn szubar_mode(&self) -> bool {
        self.szubar_mode.load(Ordering::SeqCst)
    }

    fn infer_layer(&self, importance: f32, info_class: InfoClass) -> Layer {
        if importance >= DIRECT_LONG_TERM_IMPORTANCE {
            // Restricted content may never land in the episodic layer
            // (§4.F's classification invariant); route it to semantic
            // instead of failing an auto-inferred write outright.
            if info_class == InfoClass::Restricted {
                Layer::Semantic
            } else {
                Layer::Episodic
            }
        } else if importance >= self.config.layers.working_promotion_importance {
            Layer::Working
        } else {
            Layer::Sensory
        }
    }

    /// §4.F: validates classification invariants, assigns a layer if
    /// unspecified, persists via the matching layer façade + vector
    /// store, optionally extracts graph triples, returns the new id.
    pub async fn store(&self, request: StoreRequest) -> EngineResult<Uuid> {
        if request.tenant_id.trim().is_empty() {
            return Err(EngineError::validation("tenant_id must not be empty"));
        }

        let info_class = request.info_class.unwrap_or_default();
        if let Some(layer) = request.layer {
            if info_class == InfoClass::Restricted && layer == Layer::Episodic {
                return Err(EngineError::security_policy(
                    "restricted information-class content is forbidden in the episodic layer",
                ));
            }
        }

        let importance = request.importance.unwrap_or(0.5).clamp(0.0, 1.0);
        let layer = request.layer.unwrap_or_else(|| self.infer_layer(importance, info_class));

        let mut record = MemoryRecord::new(
            &request.tenant_id,
            &request.project,
            &request.agent_id,
            &request.content,
            layer,
            &request.source,
        );
        record.importance = importance;
        record.info_class = info_class;
        if let Some(tags) = request.tags.clone() {
            record.tags = tags;
        }
        if let Some(session_id) = request.session_id.clone() {
            record.session_id = Some(session_id);
        }
        if let Some(memory_type) = request.memory_type {
            record.memory_type = memory_type;
        }
        if let Some(metadata) = request.metadata.clone() {
            record.metadata.extend(metadata);
        }
        if let Some(ttl) = request.ttl_secs {
            record.expires_at = Some(record.created_at + chrono::Duration::seconds(ttl));
        }

        if let Some(pattern) = &request.governance {
            record.tags = apply_governance_tags(&record.tags, pattern);
            if let GovernancePattern::FailureRecord { is_failure, failure_trace } = pattern {
                record.metadata.insert("is_failure".to_string(), serde_json::json!(is_failure));
                record.metadata.insert("failure_trace".to_string(), serde_json::json!(failure_trace));
            }
        }

        record.validate().map_err(EngineError::validation)?;

        let memory_id = match layer {
            Layer::Sensory => self.sensory.add(record.clone()).await?,
            Layer::Working => self.working.add(record.clone()).await?,
            Layer::Episodic | Layer::Semantic => self.long_term.add(record.clone()).await?,
            Layer::Reflective => self.reflective.add(record.clone()).await?,
        };

        let embed_result = tokio::time::timeout(
            self.config.timeouts.embedding(),
            self.embedder.embed_text(&request.content, TaskType::SearchDocument),
        )
        .await
        .unwrap_or_else(|_| Err(crate::error::StorageError::Init("embedding provider call exceeded its deadline".to_string())));

        match embed_result {
            Ok(embedding) => {
                if let Err(err) = self
                    .vector_store
                    .store_vector(memory_id, &request.tenant_id, layer, VectorPayload::Single(embedding))
                    .await
                {
                    tracing::warn!(%memory_id, error = %err, "vector store write failed after durable memory write");
                }
            }
            Err(err) => {
                tracing::warn!(%memory_id, error = %err, "embedding failed; memory stored without a vector");
            }
        }

        if request.extract_graph {
            self.extract_graph_triples(&record, memory_id).await;
        }

        Ok(memory_id)
    }

    /// Best-effort graph-triple extraction: asks the LLM provider for
    /// entities in the stored content, creates one node per entity plus a
    /// `mentions` edge from the memory's own node. Never fails the store
    /// call — a broken extraction is logged and dropped.
    async fn extract_graph_triples(&self, record: &MemoryRecord, memory_id: Uuid) {
        let entities = match self.llm.extract_entities(&record.content).await {
            Ok(entities) => entities,
            Err(err) => {
                tracing::warn!(%memory_id, error = %err, "graph triple extraction failed");
                return;
            }
        };
        if entities.is_empty() {
            return;
        }

        let mut memory_properties = HashMap::new();
        memory_properties.insert(
            "content_preview".to_string(),
            serde_json::json!(record.content.chars().take(80).collect::<String>()),
        );
        let memory_node = crate::model::GraphNode {
            id: memory_id,
            tenant_id: record.tenant_id.clone(),
            label: "memory".to_string(),
            properties: memory_properties,
        };
        if let Err(err) = self.graph_store.create_node(memory_node).await {
            tracing::warn!(%memory_id, error = %err, "failed to create memory graph node");
            return;
        }

        for entity in entities {
            let entity_id = Uuid::new_v4();
            let mut properties = HashMap::new();
            properties.insert("text".to_string(), serde_json::json!(entity.text));
            properties.insert("entity_type".to_string(), serde_json::json!(entity.entity_type));

            let entity_node = crate::model::GraphNode {
                id: entity_id,
                tenant_id: record.tenant_id.clone(),
                label: entity.entity_type.clone(),
                properties,
            };
            if let Err(err) = self.graph_store.create_node(entity_node).await {
                tracing::warn!(%memory_id, error = %err, "failed to create entity graph node");
                continue;
            }

            let edge = crate::model::GraphEdge {
                source_id: memory_id,
                target_id: entity_id,
                tenant_id: record.tenant_id.clone(),
                relation: "mentions".to_string(),
                weight: entity.confidence.clamp(0.0, 1.0),
                properties: HashMap::new(),
            };
            if let Err(err) = self.graph_store.create_edge(edge).await {
                tracing::warn!(%memory_id, error = %err, "failed to create mentions edge");
            }
        }
    }

    /// §4.F: delegates to hybrid search. Under Szubar mode, a request
    /// without explicit `manual_weights` is given the tuning provider's
    /// current per-tenant weights instead of the intent-derived defaults.
    /// Responses for requests with no `manual_weights` override are cached
    /// briefly, keyed by tenant (§5: "no... cache key may leak between
    /// tenants") plus project/query/top_k, since manual weights and
    /// Szubar-derived weights make a request non-idempotent across calls.
    pub async fn query(&self, mut request: QueryRequest) -> EngineResult<QueryResponse> {
        if request.tenant_id.trim().is_empty() {
            return Err(EngineError::validation("tenant_id must not be empty"));
        }
        if request.manual_weights.is_none() && self.szubar_mode() {
            let provider = self.tuning_provider.lock().unwrap_or_else(|e| e.into_inner()).clone();
            if let Some(provider) = provider {
                let weights = provider.get_current_weights(&request.tenant_id).await;
                if !weights.is_empty() {
                    request.manual_weights = Some(weights);
                }
            }
        }

        let cache_key = (request.manual_weights.is_none()).then(|| {
            format!(
                "query:{}:{}:{}:{}",
                request.tenant_id, request.project, request.query_text, request.top_k
            )
        });
        if let Some(key) = &cache_key {
            if let Ok(Some(cached)) = self.cache.get(key).await {
                if let Ok(response) = serde_json::from_value::<QueryResponse>(cached) {
                    return Ok(response);
                }
            }
        }

        let response = self.hybrid_search.query(&request).await?;

        if let Some(key) = &cache_key {
            if let Ok(value) = serde_json::to_value(&response) {
                let _ = self.cache.set(key, value, Some(std::time::Duration::from_secs(5))).await;
            }
        }

        Ok(response)
    }

    /// §4.F: best-effort pass — sensory→working (eviction/promotion
    /// sweep), working→long-term (consolidation), long-term→reflective
    /// (one dreaming pass, skipped rather than failing when the sample is
    /// too small).
    pub async fn consolidate(&self, tenant_id: &str, project: &str) -> EngineResult<ConsolidationReport> {
        let sensory_evicted_or_promoted = self.sensory.cleanup(tenant_id).await?;
        let working_consolidation = self.working.consolidate(tenant_id).await?;

        let reflections_generated = match self.dreaming.run(tenant_id, project, "system").await {
            Ok(Some(_)) => 1,
            Ok(None) => 0,
            Err(err) => {
                tracing::warn!(tenant_id, project, error = %err, "consolidate: dreaming pass failed");
                0
            }
        };

        Ok(ConsolidationReport {
            sensory_evicted_or_promoted,
            working_consolidation,
            reflections_generated,
        })
    }

    /// §4.F: delegates to the dreaming worker (§4.G). Returns `None` when
    /// the tenant/project doesn't have enough qualifying memories for a
    /// pass, matching the dreaming worker's own undersized-sample skip.
    pub async fn generate_reflections(
        &self,
        tenant_id: &str,
        project: &str,
        agent_id: &str,
    ) -> EngineResult<Option<ReflectionOutcome>> {
        Ok(self.dreaming.run(tenant_id, project, agent_id).await?)
    }

    /// Records an explicit success/failure/partial outcome through the
    /// reflection engine directly, bypassing the dreaming worker's
    /// lookback-window sampling. Used by callers that already know the
    /// outcome of a specific task (as opposed to dreaming's "reflect over
    /// whatever's been important recently").
    pub async fn reflect_on_outcome(
        &self,
        tenant_id: &str,
        project: &str,
        agent_id: &str,
        outcome: Outcome,
        events: Vec<String>,
        task_goal: String,
        error_info: Option<String>,
    ) -> EngineResult<ReflectionOutcome> {
        let context = ReflectionContext {
            tenant_id: tenant_id.to_string(),
            project: project.to_string(),
            agent_id: agent_id.to_string(),
            outcome,
            events,
            task_goal,
            error_info,
        };
        Ok(self.reflection_engine.reflect(&context).await?)
    }

    /// §4.F: counts per layer, average importance, top-accessed items.
    /// `MemoryFilter` has no project predicate, so this scans
    /// tenant+layer-scoped and filters by project in memory — the same
    /// pattern the dreaming worker uses for its own project scoping.
    pub async fn get_statistics(&self, tenant_id: &str, project: &str) -> EngineResult<EngineStatistics> {
        const ALL_LAYERS: [Layer; 5] = [
            Layer::Sensory,
            Layer::Working,
            Layer::Episodic,
            Layer::Semantic,
            Layer::Reflective,
        ];

        let mut layer_counts = Vec::with_capacity(ALL_LAYERS.len());
        let mut total_memories = 0;
        let mut all_in_project: Vec<MemoryRecord> = Vec::new();
        for layer in ALL_LAYERS {
            let filter = MemoryFilter { layer: Some(layer), ..Default::default() };
            let records = self
                .storage
                .list_memories(tenant_id, &filter, usize::MAX, 0, "created_at", true)
                .await?;
            let matching: Vec<MemoryRecord> = records.into_iter().filter(|r| r.project == project).collect();
            let count = matching.len();
            total_memories += count;
            layer_counts.push(LayerCount { layer, count });
            all_in_project.extend(matching);
        }

        let average_importance = if all_in_project.is_empty() {
            0.0
        } else {
            all_in_project.iter().map(|r| r.importance as f64).sum::<f64>() / all_in_project.len() as f64
        };

        all_in_project.sort_by(|a, b| b.access_count.cmp(&a.access_count));
        all_in_project.truncate(10);

        Ok(EngineStatistics {
            tenant_id: tenant_id.to_string(),
            project: project.to_string(),
            layer_counts,
            total_memories,
            average_importance,
            top_accessed: all_in_project,
        })
    }

    /// §4.F: delete every memory, vector, and graph fragment for a
    /// tenant. Vectors and graph nodes are enumerated and deleted per id
    /// first, since neither `VectorStore` nor `GraphStore` expose a
    /// tenant-wide clear the way `MemoryStorage::clear_tenant` does.
    pub async fn clear(&self, tenant_id: &str) -> EngineResult<usize> {
        let all = self
            .storage
            .list_memories(tenant_id, &MemoryFilter::default(), usize::MAX, 0, "created_at", true)
            .await?;
        for record in &all {
            if let Err(err) = self.vector_store.delete_vector(record.id, tenant_id).await {
                tracing::warn!(memory_id = %record.id, error = %err, "clear: vector delete failed");
            }
            if let Err(err) = self.graph_store.delete_node(record.id, tenant_id).await {
                tracing::warn!(memory_id = %record.id, error = %err, "clear: graph node delete failed");
            }
        }
        if let Err(err) = self.cache.clear(Some(&format!("query:{tenant_id}:"))).await {
            tracing::warn!(tenant_id, error = %err, "clear: cache clear failed");
        }
        Ok(self.storage.clear_tenant(tenant_id).await?)
    }

    /// Szubar-mode building block (§4.F): every `failure_trace` stored
    /// under `GovernancePattern::FailureRecord` for this tenant+agent.
    /// Callers compose the "DO NOT REPEAT THESE FAILURES" system-prompt
    /// header themselves — executing the agent's reasoning loop is
    /// explicitly out of scope for this crate.
    pub async fn failure_traces_for(&self, tenant_id: &str, agent_id: &str) -> EngineResult<Vec<String>> {
        let filter = MemoryFilter {
            agent_id: Some(agent_id.to_string()),
            ..Default::default()
        };
        let records = self
            .storage
            .list_memories(tenant_id, &filter, usize::MAX, 0, "created_at", true)
            .await?;

        Ok(records
            .into_iter()
            .filter_map(|r| match r.metadata.get("is_failure") {
                Some(serde_json::Value::Bool(true)) => r
                    .metadata
                    .get("failure_trace")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string()),
                _ => None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facade() -> EngineFacade {
        EngineFacade::in_memory(EngineConfig::default()).expect("in-memory engine")
    }

    #[tokio::test]
    async fn store_then_query_round_trips() {
        let engine = facade();
        let id = engine
            .store(StoreRequest::new("tenant-a", "default", "agent-1", "the deploy failed on staging last night", "agent"))
            .await
            .expect("store");

        let response = engine
            .query(QueryRequest::new("tenant-a", "default", "what failed on staging?"))
            .await
            .expect("query");
        assert!(response.results.iter().any(|r| r.memory.id == id));
    }

    #[tokio::test]
    async fn empty_tenant_id_is_rejected() {
        let engine = facade();
        let err = engine
            .store(StoreRequest::new("", "default", "agent-1", "content", "agent"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn restricted_episodic_layer_is_rejected() {
        let engine = facade();
        let mut request = StoreRequest::new("tenant-a", "default", "agent-1", "secret content", "agent");
        request.layer = Some(Layer::Episodic);
        request.info_class = Some(InfoClass::Restricted);
        let err = engine.store(request).await.unwrap_err();
        assert!(matches!(err, EngineError::SecurityPolicyViolation(_)));
    }

    #[tokio::test]
    async fn restricted_high_importance_infers_semantic_not_episodic() {
        let engine = facade();
        let mut request = StoreRequest::new("tenant-a", "default", "agent-1", "secret content", "agent");
        request.importance = Some(0.95);
        request.info_class = Some(InfoClass::Restricted);
        let id = engine.store(request).await.expect("store");
        let record = engine.storage.get_memory(id, "tenant-a").await.unwrap().unwrap();
        assert_eq!(record.layer, Layer::Semantic);
    }

    #[tokio::test]
    async fn low_importance_defaults_to_sensory() {
        let engine = facade();
        let mut request = StoreRequest::new("tenant-a", "default", "agent-1", "a passing observation", "agent");
        request.importance = Some(0.1);
        let id = engine.store(request).await.expect("store");
        let record = engine.storage.get_memory(id, "tenant-a").await.unwrap().unwrap();
        assert_eq!(record.layer, Layer::Sensory);
    }

    #[tokio::test]
    async fn failure_record_governance_is_queryable_via_failure_traces_for() {
        let engine = facade();
        let mut request = StoreRequest::new("tenant-a", "default", "agent-1", "attempted deploy, crashed on migration", "agent");
        request.governance = Some(GovernancePattern::FailureRecord {
            is_failure: true,
            failure_trace: "migration 0042 violated a not-null constraint".to_string(),
        });
        engine.store(request).await.expect("store");

        let traces = engine.failure_traces_for("tenant-a", "agent-1").await.expect("failure_traces_for");
        assert_eq!(traces, vec!["migration 0042 violated a not-null constraint".to_string()]);
    }

    #[tokio::test]
    async fn clear_removes_all_tenant_memories() {
        let engine = facade();
        engine
            .store(StoreRequest::new("tenant-a", "default", "agent-1", "first", "agent"))
            .await
            .unwrap();
        engine
            .store(StoreRequest::new("tenant-a", "default", "agent-1", "second", "agent"))
            .await
            .unwrap();

        let deleted = engine.clear("tenant-a").await.expect("clear");
        assert_eq!(deleted, 2);

        let stats = engine.get_statistics("tenant-a", "default").await.expect("get_statistics");
        assert_eq!(stats.total_memories, 0);
    }

    #[tokio::test]
    async fn get_statistics_scopes_by_project() {
        let engine = facade();
        engine
            .store(StoreRequest::new("tenant-a", "project-x", "agent-1", "in project x", "agent"))
            .await
            .unwrap();
        engine
            .store(StoreRequest::new("tenant-a", "project-y", "agent-1", "in project y", "agent"))
            .await
            .unwrap();

        let stats = engine.get_statistics("tenant-a", "project-x").await.expect("get_statistics");
        assert_eq!(stats.total_memories, 1);
    }

    struct StaticTuningProvider(HashMap<StrategyKind, f32>);

    #[async_trait]
    impl WeightTuningProvider for StaticTuningProvider {
        async fn get_current_weights(&self, _tenant_id: &str) -> HashMap<StrategyKind, f32> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn szubar_mode_uses_tuning_provider_when_weights_unset() {
        let engine = facade();
        engine
            .store(StoreRequest::new("tenant-a", "default", "agent-1", "the deploy failed on staging", "agent"))
            .await
            .unwrap();

        let mut weights = HashMap::new();
        weights.insert(StrategyKind::Sparse, 1.0);
        engine.set_tuning_provider(Arc::new(StaticTuningProvider(weights.clone())));
        engine.set_szubar_mode(true);
        assert!(engine.szubar_mode());

        let response = engine
            .query(QueryRequest::new("tenant-a", "default", "deploy staging"))
            .await
            .expect("query");
        assert_eq!(response.applied_weights, weights);
    }
}
