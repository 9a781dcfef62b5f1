//! # Memoria Core
//!
//! Agentic memory control plane for AI agents. A multi-tenant memory
//! engine layered on top of a pluggable storage/vector/graph/LLM adapter
//! boundary:
//!
//! - **Four-layer hierarchy**: sensory (seconds-scale ring buffer),
//!   working (promotion-gated, consolidates into long-term), long-term
//!   (episodic, upgradeable to semantic), reflective (insights and
//!   learned strategies, protected from decay).
//! - **Hybrid retrieval**: dense vector, sparse/keyword (FTS5), anchor
//!   (deterministic regex for IDs/tickets/errors), graph traversal, and
//!   multi-vector search, fused with Reciprocal Rank Fusion and re-scored
//!   with a three-term `α·similarity + β·importance + γ·recency` kernel.
//! - **Background maintenance**: importance decay, session summarization,
//!   and "dreaming" (reflective consolidation over recent outcomes), all
//!   sequenced per tenant by a scheduler that isolates per-tenant
//!   failures.
//! - **Context assembly**: builds the working-memory context (recent
//!   turns, re-scored long-term hits, top reflections, a rendered system
//!   prompt) handed to an agent's next turn, including an
//!   information-bottleneck selector for token-budgeted context packing.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use memoria_core::prelude::*;
//!
//! let engine = EngineFacade::in_memory(EngineConfig::default())?;
//!
//! let mut request = StoreRequest::new("tenant-a", "default", "agent-1", "the deploy failed on staging", "agent");
//! request.layer = Some(Layer::Working);
//! let id = engine.store(request).await?;
//!
//! let request = QueryRequest::new("tenant-a", "default", "what failed on staging?");
//! let response = engine.query(request).await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `bundled-sqlite` (default): vendored SQLite via `rusqlite/bundled`.
//! - `encryption`: SQLCipher-backed storage, mutually exclusive with
//!   `bundled-sqlite`.
//! - `embeddings` (default): local ONNX embedding inference via
//!   `fastembed`.
//! - `vector-search` (default): HNSW vector search via `usearch`.
//! - `metal`: Apple GPU acceleration for `fastembed`.
//! - `full`: `embeddings` + `vector-search`.

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod adapters;
pub mod bottleneck;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod governance;
pub mod layers;
pub mod model;
pub mod retention;
pub mod scoring;
pub mod search;
pub mod workers;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Configuration
pub use config::{
    DecayConfig, DreamingConfig, EngineConfig, LayerConfig, ScoringConfig, SearchConfig,
    SummarizationConfig, TimeoutConfig,
};

// Error taxonomy
pub use error::{EngineError, EngineResult, SearchError, StorageError, StorageResult, WorkerError};

// Data model
pub use model::{
    Direction, EmbeddingSlot, GraphEdge, GraphNode, InfoClass, Layer, MemoryRecord, MemoryType,
    Provenance, QueryAnalysis, QueryFilters, QueryIntent, QueryRequest, QueryResponse,
    ScoreBreakdown, ScoredMemory, StrategyHit, StrategyKind, SyncMetadata, TrustLevel,
};

// Adapter interfaces and default backends
pub use adapters::{
    sanitize_fts5_query, BruteForceVectorStore, CacheProvider, ChatMessage, EmbeddingProvider,
    ExtractedEntity, FallbackEmbeddingProvider, FallbackLlmProvider, GraphStore, InMemoryCache,
    LlmProvider, MemoryFilter, MemoryStorage, SearchHit, SqliteAdapter, TaskType, VectorPayload,
    VectorStore,
};

#[cfg(feature = "vector-search")]
pub use adapters::UsearchVectorStore;

// Memory layer façades
pub use layers::{
    ConsolidationOutcome, LayerAdapters, LongTermLayer, MemoryLayer, ReflectiveLayer, SensoryLayer,
    WorkingLayer,
};

// Search strategies and hybrid fusion
pub use search::{
    AnchorStrategy, DenseVectorStrategy, GraphStrategy, HybridSearchEngine, MultiVectorSpace,
    MultiVectorStrategy, SearchStrategy, SparseStrategy, StrategyError,
};

// Scoring kernel
pub use scoring::{
    compute_batch_scores, compute_memory_score, effective_decay_rate, rank_memories_by_score,
    score_record, BatchScoreError, MemoryScoreResult, ScoreWarnings, ScoringWeights,
};

// Background maintenance workers
pub use workers::{
    decay_factor, decayed_importance, DecayWorker, DreamingTarget, DreamingWorker,
    MaintenanceReport, MaintenanceScheduler, Outcome, ReflectionContext, ReflectionEngine,
    ReflectionOutcome, Sentiment, SessionSummary, StepReport, SummarizationWorker,
};

// Context builder
pub use context::{
    ContextBuilder, ContextConfig, ContextMode, ConversationMessage, ProfileItem,
    WorkingMemoryContext,
};

// Information-bottleneck selector
pub use bottleneck::{
    adaptive_beta, compression_cost, relevance, select_context, BottleneckCandidate,
    BudgetPreference, SelectionOutcome, SelectionReport,
};

// Governance tagging
pub use governance::{apply_governance_tags, governance_tags, CostMetrics, GovernancePattern};

// Retention & GDPR erasure
pub use retention::{
    default_policies, DataClass, DeletionAuditEntry, DeletionReason, RetentionPolicy,
    RetentionService,
};

// Engine facade
pub use engine::{
    ConsolidationReport, EngineFacade, EngineStatistics, LayerCount, StoreRequest,
    WeightTuningProvider,
};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding dimension used by [`adapters::FallbackEmbeddingProvider`]
/// when no `embeddings`-feature provider is configured.
pub const DEFAULT_FALLBACK_EMBEDDING_DIM: usize = 128;

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::{
        EngineConfig, EngineError, EngineFacade, EngineResult, Layer, MemoryRecord, QueryRequest,
        QueryResponse, ScoredMemory, StoreRequest,
    };

    pub use crate::{
        BottleneckCandidate, BudgetPreference, ContextBuilder, ContextConfig, GovernancePattern,
        HybridSearchEngine, MaintenanceScheduler, RetentionService, SqliteAdapter,
    };

    pub use std::sync::Arc;
}
