//! The engine: one inbound message in, one structured response out.
//!
//! Wires the stores, the per-session machines, and the response synthesizer
//! together. All session bookkeeping lives here; the machine itself never
//! touches storage.

use std::sync::Arc;
use std::time::Duration;

use chatflow_config::ChatflowConfig;
use chatflow_protocol::{
    GraphId, MessageType, ResponseMetadata, SessionId, StructuredResponse, TriggeredBy,
};
use chrono::Utc;
use log::{debug, info, warn};
use serde_json::json;

use crate::error::EngineError;
use crate::graph::GraphModel;
use crate::machine::{ConversationMachine, Event, MachineState, Outcome};
use crate::matcher::{MatchVia, PayloadSource, find_payload_click};
use crate::registry::SessionRegistry;
use crate::store::{GraphStore, MessageLog, MessageRecord, SessionRecord, SessionStore};
use crate::synthesizer::synthesize;

/// Conversation engine over pluggable storage.
pub struct ChatEngine {
    graphs: Arc<dyn GraphStore>,
    sessions: Arc<dyn SessionStore>,
    log: Arc<dyn MessageLog>,
    registry: SessionRegistry,
    config: ChatflowConfig,
}

impl ChatEngine {
    pub fn new(
        graphs: Arc<dyn GraphStore>,
        sessions: Arc<dyn SessionStore>,
        log: Arc<dyn MessageLog>,
        config: ChatflowConfig,
    ) -> Self {
        Self {
            graphs,
            sessions,
            log,
            registry: SessionRegistry::new(),
            config,
        }
    }

    /// Route one inbound message for a user and produce the reply.
    ///
    /// `graph_id` pins the conversation to a specific graph; without it the
    /// user's active graph is used. An ended session is never resumed; a new
    /// one is opened in its place.
    pub fn process_message(
        &self,
        user_key: &str,
        text: &str,
        graph_id: Option<GraphId>,
    ) -> Result<StructuredResponse, EngineError> {
        let session = self.resume_or_create_session(user_key, graph_id)?;
        let session_id = session.id;

        let machine = self.machine_for(&session)?;
        let machine = if machine.lock().state() == MachineState::Ended {
            // A stale instance survived past its session; rebuild from the
            // stored record.
            self.registry.remove(&session_id);
            self.machine_for(&session)?
        } else {
            machine
        };
        let mut machine = machine.lock();
        // The machine's own graph view keeps this turn consistent with the
        // view it was built against.
        let graph = Arc::clone(machine.graph());

        // Classify the inbound message before any transition runs, while the
        // session still sits on the node that rendered the clicked element.
        let inbound_node_id = session
            .current_node_id
            .clone()
            .unwrap_or_else(|| graph.start_node_id().to_string());
        let click = graph
            .find_node(&inbound_node_id)
            .and_then(|node| find_payload_click(node, text));
        let (inbound_kind, inbound_text, inbound_metadata) = match &click {
            Some((PayloadSource::Button, title)) => (
                "button",
                title.clone(),
                json!({
                    "nodeId": inbound_node_id,
                    "buttonPayload": text,
                    "buttonTitle": title,
                }),
            ),
            Some((PayloadSource::QuickReply, title)) => (
                "quick_reply",
                title.clone(),
                json!({
                    "nodeId": inbound_node_id,
                    "buttonPayload": text,
                    "buttonTitle": title,
                }),
            ),
            None => ("text", text.to_string(), json!({ "nodeId": inbound_node_id })),
        };
        self.log.append(&MessageRecord {
            session_id,
            user_key: user_key.to_string(),
            text: inbound_text,
            from_user: true,
            kind: inbound_kind.to_string(),
            metadata: inbound_metadata,
            created_at: Utc::now(),
        })?;

        let outcome = machine.handle(Event::UserMessage(text.to_string()))?;
        let (response, evict) =
            self.finish_turn(user_key, session, &graph, outcome, &machine, text)?;
        // The registry map lock is never taken while an instance guard is
        // held.
        drop(machine);
        if evict {
            self.registry.remove(&session_id);
        }
        Ok(response)
    }

    /// End a session explicitly. Returns false when the id is unknown.
    pub fn end_session(&self, session_id: SessionId) -> Result<bool, EngineError> {
        self.registry.remove(&session_id);
        Ok(self.sessions.end_session(session_id)?)
    }

    /// Put the user's latest session back on the start node.
    pub fn reset_session(&self, user_key: &str) -> Result<(), EngineError> {
        let Some(mut record) = self.sessions.find_latest(user_key)? else {
            debug!("nothing to reset (user_key={user_key})");
            return Ok(());
        };
        if let Some(machine) = self.registry.get(&record.id)
            && machine.lock().handle(Event::Reset).is_err()
        {
            // An ended instance cannot be reset in place; drop it so the
            // next message rebuilds from the cleared record.
            self.registry.remove(&record.id);
        }
        record.current_node_id = None;
        record.variables.clear();
        record.ended = false;
        self.sessions.save(&record)?;
        info!("reset session (session_id={}, user_key={user_key})", record.id);
        Ok(())
    }

    /// Drop machines idle past the configured TTL. No-op without a TTL.
    pub fn evict_idle(&self) -> usize {
        match self.config.sessions.idle_ttl_secs {
            Some(secs) => self.registry.evict_idle(Duration::from_secs(secs)),
            None => 0,
        }
    }

    /// Transcript for a session, oldest first.
    pub fn session_history(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<MessageRecord>, EngineError> {
        Ok(self.log.session_history(session_id)?)
    }

    fn resume_or_create_session(
        &self,
        user_key: &str,
        graph_id: Option<GraphId>,
    ) -> Result<SessionRecord, EngineError> {
        if let Some(record) = self.sessions.find_latest(user_key)?
            && !record.ended
            && graph_id.is_none_or(|id| id == record.graph_id)
        {
            return Ok(record);
        }

        let graph_id = match graph_id {
            Some(id) => id,
            None => self
                .graphs
                .active_graph_id(user_key)?
                .ok_or_else(|| EngineError::NoActiveGraph(user_key.to_string()))?,
        };
        let now = Utc::now();
        let record = SessionRecord {
            id: SessionId::new_v4(),
            user_key: user_key.to_string(),
            graph_id,
            current_node_id: None,
            variables: serde_json::Map::new(),
            ended: false,
            created_at: now,
            updated_at: now,
        };
        self.sessions.create(&record)?;
        Ok(record)
    }

    /// Build the graph fresh from the store. Each new machine gets the
    /// definition as it stands at creation time; edits made afterwards only
    /// reach instances built afterwards.
    fn load_graph(&self, graph_id: GraphId) -> Result<Arc<GraphModel>, EngineError> {
        let definition = self
            .graphs
            .graph(graph_id)?
            .ok_or(EngineError::GraphNotFound(graph_id))?;
        Ok(Arc::new(GraphModel::new(definition)?))
    }

    fn machine_for(
        &self,
        session: &SessionRecord,
    ) -> Result<Arc<parking_lot::Mutex<ConversationMachine>>, EngineError> {
        let keywords = Arc::new(self.config.keywords.clone());
        self.registry.get_or_create(session.id, || {
            let graph = self.load_graph(session.graph_id)?;
            match &session.current_node_id {
                Some(node_id) => ConversationMachine::with_state(
                    session.id,
                    graph,
                    keywords,
                    node_id.clone(),
                    session.variables.clone(),
                ),
                None => Ok(ConversationMachine::new(session.id, graph, keywords)),
            }
        })
    }

    /// Persist the turn and build the reply. The second value asks the
    /// caller to drop the session's machine from the registry once its guard
    /// is released.
    fn finish_turn(
        &self,
        user_key: &str,
        mut session: SessionRecord,
        graph: &Arc<GraphModel>,
        outcome: Outcome,
        machine: &ConversationMachine,
        text: &str,
    ) -> Result<(StructuredResponse, bool), EngineError> {
        match outcome {
            Outcome::Unmatched => {
                // Unmatched input never moves the session, so nothing is
                // saved. The reply echoes the input back off-graph.
                warn!(
                    "[UNMATCHED] {text} (session_id={}, user_key={user_key})",
                    session.id
                );
                let current_node_id = machine.context().current_node_id.clone();
                let response = StructuredResponse {
                    message_type: MessageType::Text,
                    message: Some(text.to_string()),
                    text: Some(text.to_string()),
                    attachment: None,
                    quick_replies: None,
                    buttons: None,
                    session_id: session.id,
                    workflow_ended: false,
                    in_workflow_msg: false,
                    original_message: Some(text.to_string()),
                    metadata: Some(ResponseMetadata {
                        node_id: Some(current_node_id.clone()),
                        node_type: Some("unmatched".to_string()),
                        triggered_by_button: None,
                    }),
                };
                self.log.append(&MessageRecord {
                    session_id: session.id,
                    user_key: user_key.to_string(),
                    text: format!("[UNMATCHED] {text}"),
                    from_user: false,
                    kind: "unmatched".to_string(),
                    metadata: json!({ "nodeId": current_node_id, "matched": false }),
                    created_at: Utc::now(),
                })?;
                Ok((response, false))
            }
            outcome => {
                let previous_node_id = session.current_node_id.clone();
                let (node_id, via) = match outcome {
                    Outcome::Responding { node_id, via } => (node_id, via),
                    Outcome::Ended { node_id } => (node_id, None),
                    Outcome::Waiting | Outcome::Unmatched => {
                        (machine.context().current_node_id.clone(), None)
                    }
                };
                let node = graph.find_node(&node_id).ok_or_else(|| {
                    EngineError::CurrentNodeMissing {
                        graph_id: graph.id(),
                        node_id: node_id.clone(),
                    }
                })?;

                let mut response = synthesize(node, session.id);
                response.workflow_ended = graph.is_terminal(&node_id);
                if let Some(MatchVia::Payload { payload, title, .. }) = via
                    && let Some(metadata) = response.metadata.as_mut()
                {
                    metadata.triggered_by_button = Some(TriggeredBy {
                        payload,
                        title,
                        from_node_id: previous_node_id,
                    });
                }

                session.current_node_id = Some(node_id.clone());
                session.variables = machine.context().variables.clone();
                session.ended = response.workflow_ended;
                self.sessions.save(&session)?;

                let logged_text = response
                    .text
                    .clone()
                    .or_else(|| node.data.message.clone())
                    .unwrap_or_default();
                let outbound_kind = match response.message_type {
                    MessageType::Text => "text",
                    MessageType::Attachment => "attachment",
                    MessageType::QuickReplies => "quick_replies",
                };
                self.log.append(&MessageRecord {
                    session_id: session.id,
                    user_key: user_key.to_string(),
                    text: logged_text,
                    from_user: false,
                    kind: outbound_kind.to_string(),
                    metadata: json!({
                        "nodeId": node_id,
                        "messageType": response.message_type,
                        "matched": true,
                    }),
                    created_at: Utc::now(),
                })?;

                let ended = response.workflow_ended;
                if ended {
                    debug!(
                        "conversation reached terminal node (session_id={}, node_id={node_id})",
                        session.id
                    );
                    self.sessions.end_session(session.id)?;
                }
                Ok((response, ended))
            }
        }
    }
}
