//! Immutable in-memory view of a conversation graph.

use crate::error::EngineError;
use chatflow_protocol::{Edge, GraphDefinition, Node, NodeKind};
use log::debug;

/// Read-only graph wrapper with the derived start node.
///
/// Graph edits happen in the external graph store and only take effect for
/// new machine instances; a live instance keeps this view for its lifetime.
#[derive(Debug, Clone)]
pub struct GraphModel {
    definition: GraphDefinition,
    start_node_id: String,
}

impl GraphModel {
    /// Build a model from an authored definition, deriving the start node.
    ///
    /// Start node preference: a node with kind `start`, else a node whose
    /// label contains "start" (case-insensitive), else the first node in
    /// declaration order. A graph without nodes is unusable.
    pub fn new(definition: GraphDefinition) -> Result<Self, EngineError> {
        let start = definition
            .nodes
            .iter()
            .find(|node| node.kind == NodeKind::Start)
            .or_else(|| {
                definition
                    .nodes
                    .iter()
                    .find(|node| node.data.label.to_lowercase().contains("start"))
            })
            .or_else(|| definition.nodes.first())
            .ok_or(EngineError::GraphHasNoNodes(definition.id))?;

        let start_node_id = start.id.clone();
        debug!(
            "built graph model (graph_id={}, nodes={}, start={})",
            definition.id,
            definition.nodes.len(),
            start_node_id
        );
        Ok(Self {
            definition,
            start_node_id,
        })
    }

    /// Graph identifier.
    pub fn id(&self) -> chatflow_protocol::GraphId {
        self.definition.id
    }

    /// Derived start node id.
    pub fn start_node_id(&self) -> &str {
        &self.start_node_id
    }

    /// Look up a node by id.
    pub fn find_node(&self, node_id: &str) -> Option<&Node> {
        self.definition.nodes.iter().find(|node| node.id == node_id)
    }

    /// Outgoing edges for a node, in graph declaration order.
    ///
    /// Dangling edges are tolerated: an edge whose source never existed
    /// simply never shows up for any real node.
    pub fn outgoing_edges(&self, node_id: &str) -> Vec<&Edge> {
        self.definition
            .edges
            .iter()
            .filter(|edge| edge.source == node_id)
            .collect()
    }

    /// True when the node has no outgoing edges.
    pub fn is_terminal(&self, node_id: &str) -> bool {
        !self
            .definition
            .edges
            .iter()
            .any(|edge| edge.source == node_id)
    }

    /// All nodes in declaration order.
    pub fn nodes(&self) -> &[Node] {
        &self.definition.nodes
    }

    /// Whether the node is the graph's start node, by id, kind, or label.
    pub fn is_start_node(&self, node: &Node) -> bool {
        node.id == self.start_node_id
            || node.kind == NodeKind::Start
            || node.data.label.to_lowercase().contains("start")
            || node.data.message_type == Some(chatflow_protocol::MessageKind::Start)
    }
}
