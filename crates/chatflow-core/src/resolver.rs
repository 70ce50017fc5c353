//! Edge resolution: which node becomes current for an inbound message.
//!
//! Precedence is strict: current-node exact payload, then current-node
//! fuzzy content, then a whole-graph fallback search (start node first).
//! Resolution is a pure function of (graph, current node, input).

use crate::graph::GraphModel;
use crate::matcher::{MatchVia, match_node};
use chatflow_config::KeywordsConfig;
use log::debug;

/// Outcome of resolving one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Node the conversation moves to, when anything matched.
    pub next_node_id: Option<String>,
    /// Whether the message advanced the graph.
    pub matched: bool,
    /// How the winning node matched, for caller metadata.
    pub via: Option<MatchVia>,
}

impl Resolution {
    fn unmatched() -> Self {
        Self {
            next_node_id: None,
            matched: false,
            via: None,
        }
    }
}

/// Resolve the next node for `input` sent while sitting on `current_node_id`.
pub fn resolve(
    graph: &GraphModel,
    current_node_id: &str,
    input: &str,
    keywords: &KeywordsConfig,
) -> Resolution {
    let outgoing = graph.outgoing_edges(current_node_id);
    // A node without outgoing edges is structurally terminal, whatever the
    // input says.
    if outgoing.is_empty() {
        debug!("no outgoing edges (node_id={})", current_node_id);
        return Resolution::unmatched();
    }

    // Restart keywords jump home from anywhere, overriding any other match.
    let normalized = input.trim().to_lowercase();
    if !normalized.is_empty()
        && keywords.restart.iter().any(|kw| normalized.contains(kw))
    {
        debug!(
            "restart keyword detected, returning to start (start={})",
            graph.start_node_id()
        );
        return Resolution {
            next_node_id: Some(graph.start_node_id().to_string()),
            matched: true,
            via: Some(MatchVia::StartKeyword),
        };
    }

    // Try the current node first.
    if let Some(current) = graph.find_node(current_node_id)
        && let Some(via) = match_node(graph, current, input, keywords)
    {
        let edge = match &via {
            MatchVia::Payload { index, payload, .. } => outgoing
                .iter()
                .find(|edge| edge.source_handle.as_deref() == Some(payload))
                .or_else(|| index.and_then(|i| outgoing.get(i)))
                .unwrap_or(&outgoing[0]),
            // Containment and start-keyword hits carry no edge correlation.
            _ => &outgoing[0],
        };
        debug!(
            "current node matched (node_id={}, edge={}, target={})",
            current_node_id, edge.id, edge.target
        );
        return Resolution {
            next_node_id: Some(edge.target.clone()),
            matched: true,
            via: Some(via),
        };
    }

    // Whole-graph fallback: start node first, then declaration order,
    // never the current node itself.
    let start_first = graph
        .find_node(graph.start_node_id())
        .into_iter()
        .chain(graph.nodes().iter().filter(|node| {
            node.id != graph.start_node_id() && node.id != current_node_id
        }));
    for node in start_first {
        if node.id == current_node_id {
            continue;
        }
        if let Some(via) = match_node(graph, node, input, keywords) {
            debug!(
                "fallback match (from={}, node_id={})",
                current_node_id, node.id
            );
            return Resolution {
                next_node_id: Some(node.id.clone()),
                matched: true,
                via: Some(via),
            };
        }
    }

    debug!("no match anywhere in graph (from={})", current_node_id);
    Resolution::unmatched()
}
