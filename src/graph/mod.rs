//! Topology graph model
//!
//! A topology is a user-drawn directed graph of devices, threshold
//! conditions (action nodes) and notification targets (email nodes).

pub mod node;

pub use node::{
    ActionNodeData, Attributes, DeviceNodeData, EmailNodeData, GraphEdge, GraphNode, NodeData,
    NumericAttr,
};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Decoded topology graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default, deserialize_with = "node::null_as_default")]
    pub nodes: Vec<GraphNode>,
    #[serde(default, deserialize_with = "node::null_as_default")]
    pub edges: Vec<GraphEdge>,
}

impl Graph {
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Index nodes by id. Later duplicates shadow earlier ones.
    pub fn node_index(&self) -> HashMap<&str, &GraphNode> {
        self.nodes.iter().map(|n| (n.id.as_str(), n)).collect()
    }

    /// Source of the first edge pointing at `id`
    pub fn first_source_of(&self, id: &str) -> Option<&str> {
        self.edges
            .iter()
            .find(|e| e.target == id)
            .map(|e| e.source.as_str())
    }

    /// Target of the first edge leaving `id`
    pub fn first_target_of(&self, id: &str) -> Option<&str> {
        self.edges
            .iter()
            .find(|e| e.source == id)
            .map(|e| e.target.as_str())
    }
}
