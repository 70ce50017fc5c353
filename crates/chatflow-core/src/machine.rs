//! Per-session conversation state machine.
//!
//! A plain state enum plus a match-based transition function. `Processing`
//! and `Unmatched` are transient: their entry actions run inside the same
//! `handle` call and the machine settles into a resting state before
//! returning.

use crate::error::EngineError;
use crate::graph::GraphModel;
use crate::matcher::MatchVia;
use crate::resolver::resolve;
use chatflow_config::KeywordsConfig;
use chatflow_protocol::SessionId;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Machine states. `Ended` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    /// Idle, ready for the next user message.
    Waiting,
    /// Resolving an inbound message (transient).
    Processing,
    /// A matched node produced a response.
    Responding,
    /// The message did not advance the graph (transient).
    Unmatched,
    /// The conversation reached a node with nothing to say and nowhere to go.
    Ended,
}

/// Events the machine accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Inbound user message.
    UserMessage(String),
    /// Manual advance to a specific node, valid while responding.
    NextNode(String),
    /// Merge values into the session variable bag.
    SetVariables(Map<String, Value>),
    /// Reset the session back to the start node.
    Reset,
}

/// What a transition produced, for the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The message matched and the node has content to render.
    Responding {
        node_id: String,
        via: Option<MatchVia>,
    },
    /// The message did not match anywhere in the graph.
    Unmatched,
    /// The conversation reached its terminal state.
    Ended { node_id: String },
    /// Nothing to render; the machine is waiting for the next message.
    Waiting,
}

/// One entry in the in-memory conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub message: String,
    pub from_user: bool,
    pub timestamp: DateTime<Utc>,
}

/// Mutable per-session state, owned exclusively by one machine instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SessionContext {
    pub current_node_id: String,
    pub last_user_message: String,
    pub last_bot_response: String,
    pub variables: Map<String, Value>,
    pub conversation_history: Vec<Turn>,
    pub message_matched_graph: bool,
}

/// Finite state machine driving one session through a graph.
#[derive(Debug)]
pub struct ConversationMachine {
    session_id: SessionId,
    graph: Arc<GraphModel>,
    keywords: Arc<KeywordsConfig>,
    state: MachineState,
    context: SessionContext,
    last_activity: DateTime<Utc>,
}

impl ConversationMachine {
    /// Create a fresh machine sitting on the graph's start node.
    pub fn new(
        session_id: SessionId,
        graph: Arc<GraphModel>,
        keywords: Arc<KeywordsConfig>,
    ) -> Self {
        let context = SessionContext {
            current_node_id: graph.start_node_id().to_string(),
            ..SessionContext::default()
        };
        Self {
            session_id,
            graph,
            keywords,
            state: MachineState::Waiting,
            context,
            last_activity: Utc::now(),
        }
    }

    /// Seed a machine from persisted session state.
    ///
    /// Fails with `CurrentNodeMissing` when the stored node id no longer
    /// exists in the graph; a stale session is surfaced, not repaired.
    pub fn with_state(
        session_id: SessionId,
        graph: Arc<GraphModel>,
        keywords: Arc<KeywordsConfig>,
        current_node_id: String,
        variables: Map<String, Value>,
    ) -> Result<Self, EngineError> {
        if graph.find_node(&current_node_id).is_none() {
            return Err(EngineError::CurrentNodeMissing {
                graph_id: graph.id(),
                node_id: current_node_id,
            });
        }
        let mut machine = Self::new(session_id, graph, keywords);
        machine.context.current_node_id = current_node_id;
        machine.context.variables = variables;
        Ok(machine)
    }

    /// Session this machine belongs to.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Current resting state.
    pub fn state(&self) -> MachineState {
        self.state
    }

    /// Read-only view of the session context.
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Graph view this instance was built against. Graph edits in the store
    /// only reach machines created after the edit.
    pub fn graph(&self) -> &Arc<GraphModel> {
        &self.graph
    }

    /// Timestamp of the last handled event, for idle eviction.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    /// How long this machine has gone without handling an event.
    pub fn idle_for(&self) -> std::time::Duration {
        (Utc::now() - self.last_activity).to_std().unwrap_or_default()
    }

    /// Apply one event and settle into a resting state.
    pub fn handle(&mut self, event: Event) -> Result<Outcome, EngineError> {
        if self.state == MachineState::Ended {
            return Err(EngineError::SessionEnded(self.session_id));
        }
        self.last_activity = Utc::now();

        match event {
            Event::UserMessage(text) => Ok(self.process_message(text)),
            Event::NextNode(node_id) => {
                if self.state == MachineState::Responding {
                    debug!(
                        "manual advance (session_id={}, node_id={})",
                        self.session_id, node_id
                    );
                    self.context.current_node_id = node_id;
                    self.state = MachineState::Waiting;
                } else {
                    debug!(
                        "ignoring NextNode outside responding (session_id={})",
                        self.session_id
                    );
                }
                Ok(Outcome::Waiting)
            }
            Event::SetVariables(values) => {
                self.context.variables.extend(values);
                Ok(Outcome::Waiting)
            }
            Event::Reset => {
                self.context = SessionContext {
                    current_node_id: self.graph.start_node_id().to_string(),
                    ..SessionContext::default()
                };
                self.state = MachineState::Waiting;
                Ok(Outcome::Waiting)
            }
        }
    }

    /// USER_MESSAGE transition plus the `processing` entry action and guards.
    fn process_message(&mut self, text: String) -> Outcome {
        self.push_turn(text.clone(), true);
        self.context.last_user_message = text.clone();
        self.state = MachineState::Processing;

        // Resolve exactly once; both the node move and the matched flag come
        // from this single result.
        let resolution = resolve(
            &self.graph,
            &self.context.current_node_id,
            &text,
            &self.keywords,
        );
        if let Some(node_id) = &resolution.next_node_id {
            self.context.current_node_id = node_id.clone();
        }
        self.context.message_matched_graph = resolution.matched;

        let current = self.graph.find_node(&self.context.current_node_id);
        let has_content = current.is_some_and(|node| node.data.message.is_some());

        if resolution.matched && has_content {
            self.state = MachineState::Responding;
            let response = current
                .and_then(|node| node.data.message.clone())
                .unwrap_or_else(|| "No response available".to_string());
            self.context.last_bot_response = response.clone();
            self.push_turn(response, false);
            return Outcome::Responding {
                node_id: self.context.current_node_id.clone(),
                via: resolution.via,
            };
        }

        if !resolution.matched {
            self.state = MachineState::Unmatched;
            self.context.last_bot_response = text.clone();
            self.push_turn(text, false);
            // `unmatched` always auto-advances back to waiting.
            self.state = MachineState::Waiting;
            return Outcome::Unmatched;
        }

        if self.graph.is_terminal(&self.context.current_node_id) {
            self.state = MachineState::Ended;
            return Outcome::Ended {
                node_id: self.context.current_node_id.clone(),
            };
        }

        self.state = MachineState::Waiting;
        Outcome::Waiting
    }

    fn push_turn(&mut self, message: String, from_user: bool) {
        self.context.conversation_history.push(Turn {
            message,
            from_user,
            timestamp: Utc::now(),
        });
    }
}
