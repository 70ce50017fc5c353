//! Error types for the core engine.
//!
//! Unmatched input is not an error: it is an ordinary state-machine outcome.
//! Only graph-integrity and session-lifecycle problems surface here.

use chatflow_protocol::{GraphId, SessionId};
use thiserror::Error;

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Requested graph id does not resolve.
    #[error("graph not found: {0}")]
    GraphNotFound(GraphId),
    /// No graph is marked active for the owner.
    #[error("no active graph for owner: {0}")]
    NoActiveGraph(String),
    /// Graph has no nodes at all.
    #[error("graph has no nodes: {0}")]
    GraphHasNoNodes(GraphId),
    /// Session references a node no longer present in the graph.
    #[error("current node {node_id} missing from graph {graph_id}")]
    CurrentNodeMissing { graph_id: GraphId, node_id: String },
    /// Session id is unknown to the engine.
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),
    /// Session already reached its terminal state.
    #[error("session has ended: {0}")]
    SessionEnded(SessionId),
    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),
}
