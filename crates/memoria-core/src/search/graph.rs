//! Graph-traversal strategy (§4.D): breadth-first expansion from seed
//! memory identifiers, bounded by depth, with a multi-path bonus for
//! neighbors reached more than once.
//!
//! The trait-level `search` call carries no explicit seed list (unlike
//! the engine-internal fusion pipeline, where a prior strategy's top hits
//! could be threaded through); this strategy sources its own seeds with a
//! lightweight keyword lookup over the query text, the same "bootstrap
//! seeds from the top of another producer" shape §4.D describes, then
//! walks the knowledge graph from there. Graph nodes are addressed by the
//! same identifier as the memory they were extracted from (§4.F store:
//! "optionally extracts graph triples"), so BFS over node ids doubles as
//! BFS over memory ids.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::adapters::{GraphStore, MemoryStorage};
use crate::error::SearchError;
use crate::model::{Direction, QueryFilters, StrategyHit, StrategyKind};

use super::SearchStrategy;

const SEED_COUNT: usize = 5;
const DEFAULT_DEPTH: u32 = 2;

pub struct GraphStrategy {
    graph_store: Arc<dyn GraphStore>,
    storage: Arc<dyn MemoryStorage>,
}

impl GraphStrategy {
    pub fn new(graph_store: Arc<dyn GraphStore>, storage: Arc<dyn MemoryStorage>) -> Self {
        Self { graph_store, storage }
    }

    /// Runs BFS from `seeds` up to `max_depth`. Each arrival at a node
    /// contributes `1/depth` to its accumulated score; nodes reached via
    /// multiple paths (or from multiple seeds) sum those contributions.
    async fn traverse(&self, tenant_id: &str, seeds: &[Uuid], max_depth: u32) -> Result<HashMap<Uuid, f32>, SearchError> {
        let mut scores: HashMap<Uuid, f32> = HashMap::new();
        let seed_set: HashSet<Uuid> = seeds.iter().copied().collect();
        let mut visited: HashSet<Uuid> = seed_set.clone();
        let mut frontier: VecDeque<(Uuid, u32)> = seeds.iter().map(|s| (*s, 0)).collect();

        while let Some((node, depth)) = frontier.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let neighbors = self
                .graph_store
                .get_neighbors(node, tenant_id, None, Direction::Both, 1)
                .await?;
            let next_depth = depth + 1;
            for neighbor in neighbors {
                if seed_set.contains(&neighbor) {
                    continue;
                }
                let bonus = 1.0 / next_depth as f32;
                *scores.entry(neighbor).or_insert(0.0) += bonus;
                if visited.insert(neighbor) {
                    frontier.push_back((neighbor, next_depth));
                }
            }
        }

        Ok(scores)
    }
}

#[async_trait]
impl SearchStrategy for GraphStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Graph
    }

    async fn search(
        &self,
        tenant_id: &str,
        _project: &str,
        query_text: &str,
        filters: &QueryFilters,
        limit: usize,
    ) -> Result<Vec<StrategyHit>, SearchError> {
        let layer = filters.layers.as_ref().and_then(|l| l.first().copied());
        let max_depth = filters.graph_depth.unwrap_or(DEFAULT_DEPTH);

        let seed_hits = self.storage.search_memories(tenant_id, layer, query_text, SEED_COUNT, false).await?;
        if seed_hits.is_empty() {
            return Ok(Vec::new());
        }
        let seeds: Vec<Uuid> = seed_hits.iter().map(|h| h.memory.id).collect();

        let scores = self.traverse(tenant_id, &seeds, max_depth).await?;
        if scores.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = scores.keys().copied().collect();
        let records = self.storage.get_memories_batch(&ids, tenant_id).await?;
        let importance_of = |id: Uuid| records.iter().find(|r| r.id == id).map(|r| r.importance).unwrap_or(0.0);

        let mut results: Vec<StrategyHit> = scores
            .into_iter()
            .map(|(memory_id, score)| StrategyHit {
                memory_id,
                score,
                importance: importance_of(memory_id),
            })
            .collect();
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        Ok(results)
    }
}
