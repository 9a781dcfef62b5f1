//! Adapter interfaces
//!
//! Abstract contracts for memory storage, vector store, graph store,
//! cache, embedding, and LLM access (§4.A). Every subsystem above this
//! module consumes these traits, never a concrete backend directly —
//! the engine is constructed with `Arc<dyn Trait>` handles and no
//! subsystem holds ambient/thread-local state.

mod cache;
mod embedding;
mod graph;
mod llm;
mod sqlite_storage;
pub(crate) mod storage;
mod vector;

pub use cache::CacheProvider;
pub use embedding::{EmbeddingProvider, TaskType};
pub use graph::GraphStore;
pub use llm::{ChatMessage, ExtractedEntity, LlmProvider};
pub use sqlite_storage::{sanitize_fts5_query, SqliteAdapter};
pub use storage::{MemoryFilter, MemoryStorage, SearchHit};
pub use vector::{VectorPayload, VectorStore};

pub use cache::InMemoryCache;
pub use embedding::FallbackEmbeddingProvider;
pub use llm::FallbackLlmProvider;
pub use vector::BruteForceVectorStore;

#[cfg(feature = "vector-search")]
pub use vector::UsearchVectorStore;
