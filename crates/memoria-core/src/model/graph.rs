use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A node in the per-tenant knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: Uuid,
    pub tenant_id: String,
    pub label: String,
    pub properties: HashMap<String, serde_json::Value>,
}

/// A directed, weighted edge. Edges are tenant-scoped; deleting a node
/// cascades to its incident edges (enforced by the graph-store adapter).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub tenant_id: String,
    pub relation: String,
    pub weight: f32,
    pub properties: HashMap<String, serde_json::Value>,
}

impl GraphEdge {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.weight) {
            return Err(format!("edge weight {} out of [0,1]", self.weight));
        }
        Ok(())
    }
}

/// Direction filter for neighbor traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    Both,
}
