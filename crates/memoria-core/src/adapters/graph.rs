//! Abstract knowledge-graph store interface

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StorageResult;
use crate::model::{Direction, GraphEdge, GraphNode};

#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn create_node(&self, node: GraphNode) -> StorageResult<bool>;

    async fn create_edge(&self, edge: GraphEdge) -> StorageResult<bool>;

    async fn get_neighbors(
        &self,
        node_id: Uuid,
        tenant_id: &str,
        relation: Option<&str>,
        direction: Direction,
        max_depth: u32,
    ) -> StorageResult<Vec<Uuid>>;

    /// Deleting a node cascades to its incident edges.
    async fn delete_node(&self, node_id: Uuid, tenant_id: &str) -> StorageResult<bool>;

    async fn delete_edge(&self, source_id: Uuid, target_id: Uuid, relation: &str, tenant_id: &str) -> StorageResult<bool>;

    async fn shortest_path(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        tenant_id: &str,
        max_depth: u32,
    ) -> StorageResult<Option<Vec<Uuid>>>;

    async fn get_subgraph(
        &self,
        node_ids: &[Uuid],
        tenant_id: &str,
        include_edges: bool,
    ) -> StorageResult<(Vec<GraphNode>, Vec<GraphEdge>)>;
}
