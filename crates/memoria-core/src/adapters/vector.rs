//! Abstract vector store interface
//!
//! Implementations can back onto USearch, sqlite-vec, Qdrant, or (as
//! provided here) a brute-force in-memory fallback for deployments without
//! the `vector-search` feature.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::StorageResult;
use crate::model::Layer;

/// Embedding payload: either a single default-space vector or several
/// named spaces (multi-vector retrieval).
#[derive(Debug, Clone)]
pub enum VectorPayload {
    Single(Vec<f32>),
    Named(HashMap<String, Vec<f32>>),
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn store_vector(
        &self,
        memory_id: Uuid,
        tenant_id: &str,
        layer: Layer,
        embedding: VectorPayload,
    ) -> StorageResult<bool>;

    async fn batch_store_vectors(
        &self,
        tenant_id: &str,
        vectors: Vec<(Uuid, Layer, VectorPayload)>,
    ) -> StorageResult<usize>;

    async fn update_vector(
        &self,
        memory_id: Uuid,
        tenant_id: &str,
        embedding: VectorPayload,
    ) -> StorageResult<bool>;

    async fn get_vector(&self, memory_id: Uuid, tenant_id: &str, space: Option<&str>) -> StorageResult<Option<Vec<f32>>>;

    async fn delete_vector(&self, memory_id: Uuid, tenant_id: &str) -> StorageResult<bool>;

    /// Cosine-similarity search; results are `(memory_id, score)` pairs in
    /// [0,1], sorted by score descending.
    async fn search_similar(
        &self,
        query_embedding: &[f32],
        tenant_id: &str,
        layer: Option<Layer>,
        space: Option<&str>,
        limit: usize,
        score_threshold: Option<f32>,
    ) -> StorageResult<Vec<(Uuid, f32)>>;

    /// §4.A: batch form of [`Self::search_similar`] — many query vectors
    /// against the same filter set in one call. Default implementation
    /// runs each query independently; implementations backed by a native
    /// batched index (USearch, Qdrant) may override this for a real
    /// throughput win.
    async fn batch_search_similar(
        &self,
        query_embeddings: &[Vec<f32>],
        tenant_id: &str,
        layer: Option<Layer>,
        space: Option<&str>,
        limit: usize,
        score_threshold: Option<f32>,
    ) -> StorageResult<Vec<Vec<(Uuid, f32)>>> {
        let mut out = Vec::with_capacity(query_embeddings.len());
        for query in query_embeddings {
            out.push(
                self.search_similar(query, tenant_id, layer, space, limit, score_threshold)
                    .await?,
            );
        }
        Ok(out)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let raw = dot / (norm_a * norm_b);
    ((raw + 1.0) / 2.0).clamp(0.0, 1.0)
}

struct StoredVector {
    tenant_id: String,
    layer: Layer,
    spaces: HashMap<String, Vec<f32>>,
}

/// Brute-force cosine similarity search. O(n) per query; adequate for
/// small tenants and as the default when the `vector-search` (USearch)
/// feature is compiled out.
#[derive(Default)]
pub struct BruteForceVectorStore {
    vectors: Mutex<HashMap<Uuid, StoredVector>>,
}

impl BruteForceVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn payload_to_spaces(payload: VectorPayload) -> HashMap<String, Vec<f32>> {
        match payload {
            VectorPayload::Single(v) => HashMap::from([("default".to_string(), v)]),
            VectorPayload::Named(map) => map,
        }
    }
}

#[async_trait]
impl VectorStore for BruteForceVectorStore {
    async fn store_vector(
        &self,
        memory_id: Uuid,
        tenant_id: &str,
        layer: Layer,
        embedding: VectorPayload,
    ) -> StorageResult<bool> {
        let mut guard = self.vectors.lock().unwrap();
        let spaces = Self::payload_to_spaces(embedding);
        guard.insert(
            memory_id,
            StoredVector {
                tenant_id: tenant_id.to_string(),
                layer,
                spaces,
            },
        );
        Ok(true)
    }

    async fn batch_store_vectors(
        &self,
        tenant_id: &str,
        vectors: Vec<(Uuid, Layer, VectorPayload)>,
    ) -> StorageResult<usize> {
        let mut guard = self.vectors.lock().unwrap();
        let mut count = 0;
        for (id, layer, payload) in vectors {
            guard.insert(
                id,
                StoredVector {
                    tenant_id: tenant_id.to_string(),
                    layer,
                    spaces: Self::payload_to_spaces(payload),
                },
            );
            count += 1;
        }
        Ok(count)
    }

    async fn update_vector(&self, memory_id: Uuid, tenant_id: &str, embedding: VectorPayload) -> StorageResult<bool> {
        let mut guard = self.vectors.lock().unwrap();
        let new_spaces = Self::payload_to_spaces(embedding);
        match guard.get_mut(&memory_id) {
            Some(existing) if existing.tenant_id == tenant_id => {
                existing.spaces.extend(new_spaces);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => {
                guard.insert(
                    memory_id,
                    StoredVector {
                        tenant_id: tenant_id.to_string(),
                        layer: Layer::Working,
                        spaces: new_spaces,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn get_vector(&self, memory_id: Uuid, tenant_id: &str, space: Option<&str>) -> StorageResult<Option<Vec<f32>>> {
        let guard = self.vectors.lock().unwrap();
        Ok(guard.get(&memory_id).and_then(|v| {
            if v.tenant_id != tenant_id {
                return None;
            }
            v.spaces.get(space.unwrap_or("default")).cloned()
        }))
    }

    async fn delete_vector(&self, memory_id: Uuid, tenant_id: &str) -> StorageResult<bool> {
        let mut guard = self.vectors.lock().unwrap();
        if let Some(v) = guard.get(&memory_id) {
            if v.tenant_id == tenant_id {
                guard.remove(&memory_id);
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn search_similar(
        &self,
        query_embedding: &[f32],
        tenant_id: &str,
        layer: Option<Layer>,
        space: Option<&str>,
        limit: usize,
        score_threshold: Option<f32>,
    ) -> StorageResult<Vec<(Uuid, f32)>> {
        let guard = self.vectors.lock().unwrap();
        let space_key = space.unwrap_or("default");
        let mut scored: Vec<(Uuid, f32)> = guard
            .iter()
            .filter(|(_, v)| v.tenant_id == tenant_id)
            .filter(|(_, v)| layer.is_none_or(|l| l == v.layer))
            .filter_map(|(id, v)| v.spaces.get(space_key).map(|e| (*id, cosine_similarity(query_embedding, e))))
            .filter(|(_, score)| score_threshold.is_none_or(|t| *score >= t))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }
}

#[cfg(feature = "vector-search")]
mod usearch_store {
    use super::*;
    use crate::error::StorageError;
    use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

    /// One HNSW index per (tenant, named space). `usearch` fixes dimensions
    /// at index creation, so invariant 3 (fixed dimension per named space
    /// per tenant) is enforced by recreating the index — losing whatever it
    /// held — the first time a vector of a different width arrives.
    struct TenantSpaceIndex {
        index: Index,
        dimensions: usize,
        id_to_memory: HashMap<u64, Uuid>,
        memory_to_id: HashMap<Uuid, u64>,
        layer: HashMap<Uuid, Layer>,
        // Kept alongside the HNSW index for exact retrieval: `usearch`'s own
        // getter round-trips through (possibly quantized) index storage,
        // which is fine for ranking but not guaranteed bit-exact.
        raw: HashMap<Uuid, Vec<f32>>,
        next_id: u64,
    }

    impl TenantSpaceIndex {
        fn new(dimensions: usize) -> StorageResult<Self> {
            let options = IndexOptions {
                dimensions,
                metric: MetricKind::Cos,
                quantization: ScalarKind::I8,
                connectivity: 16,
                expansion_add: 128,
                expansion_search: 64,
                multi: false,
            };
            let index = Index::new(&options)
                .map_err(|e| StorageError::Init(format!("usearch index creation failed: {e}")))?;
            index
                .reserve(64)
                .map_err(|e| StorageError::Init(format!("usearch reserve failed: {e}")))?;
            Ok(Self {
                index,
                dimensions,
                id_to_memory: HashMap::new(),
                memory_to_id: HashMap::new(),
                layer: HashMap::new(),
                raw: HashMap::new(),
                next_id: 0,
            })
        }

        fn reserve_if_needed(&self) -> StorageResult<()> {
            if self.index.size() >= self.index.capacity() {
                let new_capacity = std::cmp::max(self.index.capacity() * 2, 16);
                self.index
                    .reserve(new_capacity)
                    .map_err(|e| StorageError::Init(format!("usearch reserve failed: {e}")))?;
            }
            Ok(())
        }

        fn upsert(&mut self, memory_id: Uuid, layer: Layer, vector: &[f32]) -> StorageResult<()> {
            if let Some(&id) = self.memory_to_id.get(&memory_id) {
                let _ = self.index.remove(id);
                self.reserve_if_needed()?;
                self.index
                    .add(id, vector)
                    .map_err(|e| StorageError::Init(format!("usearch add failed: {e}")))?;
            } else {
                self.reserve_if_needed()?;
                let id = self.next_id;
                self.next_id += 1;
                self.index
                    .add(id, vector)
                    .map_err(|e| StorageError::Init(format!("usearch add failed: {e}")))?;
                self.memory_to_id.insert(memory_id, id);
                self.id_to_memory.insert(id, memory_id);
            }
            self.layer.insert(memory_id, layer);
            self.raw.insert(memory_id, vector.to_vec());
            Ok(())
        }

        fn remove(&mut self, memory_id: Uuid) -> bool {
            if let Some(id) = self.memory_to_id.remove(&memory_id) {
                self.id_to_memory.remove(&id);
                self.layer.remove(&memory_id);
                self.raw.remove(&memory_id);
                let _ = self.index.remove(id);
                true
            } else {
                false
            }
        }

        fn search(
            &self,
            query: &[f32],
            layer: Option<Layer>,
            limit: usize,
            score_threshold: Option<f32>,
        ) -> Vec<(Uuid, f32)> {
            if self.index.size() == 0 || query.len() != self.dimensions {
                return Vec::new();
            }
            // Layer filtering happens after the HNSW lookup (usearch has no
            // native predicate filter), so over-fetch to keep recall
            // reasonable for filtered queries.
            let fetch = if layer.is_some() { (limit * 4).max(limit) } else { limit };
            let Ok(results) = self.index.search(query, fetch) else {
                return Vec::new();
            };
            let mut out = Vec::with_capacity(results.keys.len());
            for (key, distance) in results.keys.iter().zip(results.distances.iter()) {
                let Some(&memory_id) = self.id_to_memory.get(key) else {
                    continue;
                };
                if let Some(l) = layer {
                    if self.layer.get(&memory_id) != Some(&l) {
                        continue;
                    }
                }
                // usearch's Cos metric reports `1 - cosine` as the distance.
                let score = (1.0 - distance).clamp(0.0, 1.0);
                if score_threshold.is_none_or(|t| score >= t) {
                    out.push((memory_id, score));
                }
                if out.len() >= limit {
                    break;
                }
            }
            out
        }
    }

    /// HNSW-backed [`VectorStore`] using USearch, one index per
    /// `(tenant_id, named space)` pair. Approximate nearest-neighbor search;
    /// adequate for the collection sizes a single tenant's working set
    /// reaches, trading the brute-force store's exactness for sub-linear
    /// query time as a tenant's memory count grows.
    #[derive(Default)]
    pub struct UsearchVectorStore {
        spaces: Mutex<HashMap<(String, String), TenantSpaceIndex>>,
        // memory_id -> (tenant_id, set of named spaces it was written into)
        owners: Mutex<HashMap<Uuid, (String, Vec<String>)>>,
    }

    impl UsearchVectorStore {
        pub fn new() -> Self {
            Self::default()
        }

        fn upsert_space(
            spaces: &mut HashMap<(String, String), TenantSpaceIndex>,
            tenant_id: &str,
            space: &str,
            memory_id: Uuid,
            layer: Layer,
            vector: &[f32],
        ) -> StorageResult<()> {
            let key = (tenant_id.to_string(), space.to_string());
            let needs_recreate = spaces
                .get(&key)
                .map(|idx| idx.dimensions != vector.len())
                .unwrap_or(false);
            if needs_recreate || !spaces.contains_key(&key) {
                spaces.insert(key.clone(), TenantSpaceIndex::new(vector.len())?);
            }
            spaces.get_mut(&key).expect("just inserted").upsert(memory_id, layer, vector)
        }
    }

    #[async_trait]
    impl VectorStore for UsearchVectorStore {
        async fn store_vector(
            &self,
            memory_id: Uuid,
            tenant_id: &str,
            layer: Layer,
            embedding: VectorPayload,
        ) -> StorageResult<bool> {
            let named = BruteForceVectorStore::payload_to_spaces(embedding);
            let mut spaces = self.spaces.lock().unwrap();
            let mut space_names = Vec::with_capacity(named.len());
            for (space, vector) in &named {
                Self::upsert_space(&mut spaces, tenant_id, space, memory_id, layer, vector)?;
                space_names.push(space.clone());
            }
            drop(spaces);
            self.owners
                .lock()
                .unwrap()
                .insert(memory_id, (tenant_id.to_string(), space_names));
            Ok(true)
        }

        async fn batch_store_vectors(
            &self,
            tenant_id: &str,
            vectors: Vec<(Uuid, Layer, VectorPayload)>,
        ) -> StorageResult<usize> {
            let mut count = 0;
            for (id, layer, payload) in vectors {
                self.store_vector(id, tenant_id, layer, payload).await?;
                count += 1;
            }
            Ok(count)
        }

        async fn update_vector(
            &self,
            memory_id: Uuid,
            tenant_id: &str,
            embedding: VectorPayload,
        ) -> StorageResult<bool> {
            let owned = self.owners.lock().unwrap().get(&memory_id).cloned();
            let layer = match owned {
                Some((ref owner_tenant, _)) if owner_tenant != tenant_id => return Ok(false),
                Some((_, ref owned_spaces)) => {
                    let spaces = self.spaces.lock().unwrap();
                    owned_spaces
                        .first()
                        .and_then(|s| spaces.get(&(tenant_id.to_string(), s.clone())))
                        .and_then(|idx| idx.layer.get(&memory_id).copied())
                        .unwrap_or(Layer::Working)
                }
                None => Layer::Working,
            };
            self.store_vector(memory_id, tenant_id, layer, embedding).await
        }

        async fn get_vector(
            &self,
            memory_id: Uuid,
            tenant_id: &str,
            space: Option<&str>,
        ) -> StorageResult<Option<Vec<f32>>> {
            let owners = self.owners.lock().unwrap();
            let Some((owner_tenant, owned_spaces)) = owners.get(&memory_id) else {
                return Ok(None);
            };
            if owner_tenant != tenant_id {
                return Ok(None);
            }
            let space_key = space.unwrap_or("default").to_string();
            if !owned_spaces.iter().any(|s| s == &space_key) {
                return Ok(None);
            }
            drop(owners);
            let spaces = self.spaces.lock().unwrap();
            let Some(idx) = spaces.get(&(tenant_id.to_string(), space_key)) else {
                return Ok(None);
            };
            Ok(idx.raw.get(&memory_id).cloned())
        }

        async fn delete_vector(&self, memory_id: Uuid, tenant_id: &str) -> StorageResult<bool> {
            let owned = {
                let mut owners = self.owners.lock().unwrap();
                match owners.remove(&memory_id) {
                    Some((owner_tenant, spaces)) if owner_tenant == tenant_id => Some(spaces),
                    Some(entry) => {
                        owners.insert(memory_id, entry);
                        None
                    }
                    None => None,
                }
            };
            let Some(owned_spaces) = owned else {
                return Ok(false);
            };
            let mut spaces = self.spaces.lock().unwrap();
            let mut removed = false;
            for space in owned_spaces {
                if let Some(idx) = spaces.get_mut(&(tenant_id.to_string(), space)) {
                    removed |= idx.remove(memory_id);
                }
            }
            Ok(removed)
        }

        async fn search_similar(
            &self,
            query_embedding: &[f32],
            tenant_id: &str,
            layer: Option<Layer>,
            space: Option<&str>,
            limit: usize,
            score_threshold: Option<f32>,
        ) -> StorageResult<Vec<(Uuid, f32)>> {
            let space_key = space.unwrap_or("default").to_string();
            let spaces = self.spaces.lock().unwrap();
            let Some(idx) = spaces.get(&(tenant_id.to_string(), space_key)) else {
                return Ok(Vec::new());
            };
            Ok(idx.search(query_embedding, layer, limit, score_threshold))
        }
    }
}

#[cfg(feature = "vector-search")]
pub use usearch_store::UsearchVectorStore;
