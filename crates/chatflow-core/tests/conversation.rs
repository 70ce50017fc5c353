//! End-to-end conversation routing tests over the in-memory stores.

use std::sync::Arc;

use chatflow_config::{ChatflowConfig, SessionsConfig};
use chatflow_core::{
    ChatEngine, EngineError, GraphStore, MemoryGraphStore, MemoryMessageLog, MemorySessionStore,
};
use chatflow_protocol::{GraphDefinition, GraphId, MessageType};
use pretty_assertions::assert_eq;
use uuid::Uuid;

fn shop_graph(graph_id: GraphId) -> GraphDefinition {
    serde_json::from_value(serde_json::json!({
        "id": graph_id,
        "name": "shop",
        "isActive": true,
        "nodes": [
            {
                "id": "n1",
                "type": "start",
                "data": {
                    "label": "Start",
                    "message": "Hi",
                    "buttons": [{ "title": "Shop", "payload": "SHOP" }]
                }
            },
            {
                "id": "n2",
                "type": "message",
                "data": { "label": "Shop", "message": "Welcome to shop" }
            }
        ],
        "edges": [
            { "id": "e1", "source": "n1", "target": "n2" }
        ]
    }))
    .expect("shop graph")
}

fn decision_graph(graph_id: GraphId) -> GraphDefinition {
    serde_json::from_value(serde_json::json!({
        "id": graph_id,
        "name": "decision",
        "isActive": true,
        "nodes": [
            {
                "id": "n1",
                "type": "start",
                "data": {
                    "label": "Start",
                    "message": "Hi",
                    "buttons": [{ "title": "Begin", "payload": "GO" }]
                }
            },
            {
                "id": "n2",
                "type": "message",
                "data": {
                    "label": "Decision",
                    "message": "Yes or no?",
                    "elements": [
                        { "type": "button", "title": "Yes", "payload": "Y" },
                        { "type": "button", "title": "No", "payload": "N" }
                    ]
                }
            },
            {
                "id": "n3",
                "type": "message",
                "data": { "label": "No branch", "message": "You said no" }
            },
            {
                "id": "n4",
                "type": "message",
                "data": { "label": "Yes branch", "message": "You said yes" }
            }
        ],
        "edges": [
            { "id": "e1", "source": "n1", "target": "n2" },
            { "id": "e2", "source": "n2", "target": "n3", "sourceHandle": "N" },
            { "id": "e3", "source": "n2", "target": "n4", "sourceHandle": "Y" }
        ]
    }))
    .expect("decision graph")
}

fn engine_with(definition: GraphDefinition) -> ChatEngine {
    let graphs = Arc::new(MemoryGraphStore::new());
    graphs.insert(definition);
    ChatEngine::new(
        graphs,
        Arc::new(MemorySessionStore::new()),
        Arc::new(MemoryMessageLog::new()),
        ChatflowConfig::default(),
    )
}

#[test]
fn button_click_walks_the_graph_and_ends_it() {
    let graph_id = Uuid::new_v4();
    let engine = engine_with(shop_graph(graph_id));

    let response = engine
        .process_message("psid-1", "SHOP", Some(graph_id))
        .expect("response");

    assert_eq!(response.message_type, MessageType::Text);
    assert_eq!(response.text.as_deref(), Some("Welcome to shop"));
    assert!(response.workflow_ended);
    assert!(response.in_workflow_msg);
    let metadata = response.metadata.expect("metadata");
    assert_eq!(metadata.node_id.as_deref(), Some("n2"));
    let triggered = metadata.triggered_by_button.expect("triggered");
    assert_eq!(triggered.payload, "SHOP");
    assert_eq!(triggered.title, "Shop");

    // The transcript records the click by its title, with the raw payload
    // kept in the metadata, and tags the reply with its real message type.
    let history = engine
        .session_history(response.session_id)
        .expect("history");
    assert_eq!(history.len(), 2);
    assert!(history[0].from_user);
    assert_eq!(history[0].kind, "button");
    assert_eq!(history[0].text, "Shop");
    assert_eq!(history[0].metadata["buttonPayload"], "SHOP");
    assert_eq!(history[0].metadata["buttonTitle"], "Shop");
    assert_eq!(history[0].metadata["nodeId"], "n1");
    assert!(!history[1].from_user);
    assert_eq!(history[1].kind, "text");
    assert_eq!(history[1].text, "Welcome to shop");
}

#[test]
fn ended_sessions_are_never_resumed() {
    let graph_id = Uuid::new_v4();
    let engine = engine_with(shop_graph(graph_id));

    let first = engine
        .process_message("psid-1", "SHOP", Some(graph_id))
        .expect("first");
    assert!(first.workflow_ended);

    let second = engine
        .process_message("psid-1", "SHOP", Some(graph_id))
        .expect("second");
    assert_ne!(first.session_id, second.session_id);
    assert_eq!(second.text.as_deref(), Some("Welcome to shop"));
}

#[test]
fn unmatched_input_echoes_without_advancing() {
    let graph_id = Uuid::new_v4();
    let engine = engine_with(shop_graph(graph_id));

    let response = engine
        .process_message("psid-1", "banana xyz", Some(graph_id))
        .expect("response");

    assert!(!response.in_workflow_msg);
    assert!(!response.workflow_ended);
    assert_eq!(response.text.as_deref(), Some("banana xyz"));
    assert_eq!(response.original_message.as_deref(), Some("banana xyz"));
    let metadata = response.metadata.clone().expect("metadata");
    assert_eq!(metadata.node_id.as_deref(), Some("n1"));
    assert_eq!(metadata.node_type.as_deref(), Some("unmatched"));
    assert_eq!(metadata.triggered_by_button, None);

    let history = engine
        .session_history(response.session_id)
        .expect("history");
    assert_eq!(history.len(), 2);
    assert!(history[0].from_user);
    assert_eq!(history[0].kind, "text");
    assert_eq!(history[1].kind, "unmatched");
    assert_eq!(history[1].text, "[UNMATCHED] banana xyz");

    // The session still sits on the start node; a real click works next.
    let next = engine
        .process_message("psid-1", "SHOP", Some(graph_id))
        .expect("next");
    assert_eq!(next.session_id, response.session_id);
    assert_eq!(next.text.as_deref(), Some("Welcome to shop"));
}

#[test]
fn source_handle_beats_edge_order() {
    let graph_id = Uuid::new_v4();
    let engine = engine_with(decision_graph(graph_id));

    let first = engine
        .process_message("psid-1", "GO", Some(graph_id))
        .expect("first");
    assert_eq!(
        first.metadata.as_ref().and_then(|m| m.node_id.as_deref()),
        Some("n2")
    );
    assert!(!first.workflow_ended);

    // "Y" is the first button ordinally, but its handle points past the
    // first declared edge.
    let second = engine
        .process_message("psid-1", "Y", Some(graph_id))
        .expect("second");
    assert_eq!(second.session_id, first.session_id);
    assert_eq!(second.text.as_deref(), Some("You said yes"));
    assert!(second.workflow_ended);
    let metadata = second.metadata.expect("metadata");
    assert_eq!(metadata.node_id.as_deref(), Some("n4"));
    let triggered = metadata.triggered_by_button.expect("triggered");
    assert_eq!(triggered.payload, "Y");
    assert_eq!(triggered.from_node_id.as_deref(), Some("n2"));
}

#[test]
fn restart_keyword_jumps_back_to_start() {
    let graph_id = Uuid::new_v4();
    let engine = engine_with(decision_graph(graph_id));

    engine
        .process_message("psid-1", "GO", Some(graph_id))
        .expect("advance");
    let response = engine
        .process_message("psid-1", "restart", Some(graph_id))
        .expect("restart");

    assert!(response.in_workflow_msg);
    assert_eq!(response.text.as_deref(), Some("Hi"));
    assert_eq!(
        response.metadata.and_then(|m| m.node_id),
        Some("n1".to_string())
    );
}

#[test]
fn reset_session_forgets_progress() {
    let graph_id = Uuid::new_v4();
    let engine = engine_with(decision_graph(graph_id));

    let advanced = engine
        .process_message("psid-1", "GO", Some(graph_id))
        .expect("advance");
    engine.reset_session("psid-1").expect("reset");

    // A greeting matches the start node again and takes its first edge.
    let response = engine
        .process_message("psid-1", "hello", Some(graph_id))
        .expect("greeting");
    assert_eq!(response.session_id, advanced.session_id);
    assert_eq!(response.text.as_deref(), Some("Yes or no?"));
    assert_eq!(
        response.metadata.and_then(|m| m.node_id),
        Some("n2".to_string())
    );
}

#[test]
fn active_graph_backs_sessions_without_an_explicit_id() {
    let graph_id = Uuid::new_v4();
    let graphs = Arc::new(MemoryGraphStore::new());
    graphs.insert(shop_graph(graph_id));
    graphs.set_active("psid-1", graph_id);
    let engine = ChatEngine::new(
        graphs,
        Arc::new(MemorySessionStore::new()),
        Arc::new(MemoryMessageLog::new()),
        ChatflowConfig::default(),
    );

    let response = engine
        .process_message("psid-1", "SHOP", None)
        .expect("response");
    assert_eq!(response.text.as_deref(), Some("Welcome to shop"));

    let err = engine
        .process_message("psid-2", "SHOP", None)
        .expect_err("no active graph");
    assert!(matches!(err, EngineError::NoActiveGraph(_)));
}

#[test]
fn unknown_graph_id_is_surfaced() {
    let engine = engine_with(shop_graph(Uuid::new_v4()));
    let err = engine
        .process_message("psid-1", "hello", Some(Uuid::new_v4()))
        .expect_err("unknown graph");
    assert!(matches!(err, EngineError::GraphNotFound(_)));
}

#[test]
fn end_session_is_explicit_and_idempotent() {
    let graph_id = Uuid::new_v4();
    let engine = engine_with(decision_graph(graph_id));

    let response = engine
        .process_message("psid-1", "GO", Some(graph_id))
        .expect("advance");
    assert!(engine.end_session(response.session_id).expect("end"));
    // Ending an already ended session is harmless.
    assert!(engine.end_session(response.session_id).expect("end again"));
    assert!(!engine.end_session(Uuid::new_v4()).expect("unknown id"));

    // The next message opens a fresh session back at the start node.
    let next = engine
        .process_message("psid-1", "GO", Some(graph_id))
        .expect("fresh");
    assert_ne!(next.session_id, response.session_id);
    assert_eq!(next.text.as_deref(), Some("Yes or no?"));
}

#[test]
fn graph_edits_take_effect_for_new_instances_only() {
    let graph_id = Uuid::new_v4();
    let graphs = Arc::new(MemoryGraphStore::new());
    graphs.insert(decision_graph(graph_id));
    let engine = ChatEngine::new(
        Arc::clone(&graphs) as Arc<dyn GraphStore>,
        Arc::new(MemorySessionStore::new()),
        Arc::new(MemoryMessageLog::new()),
        ChatflowConfig::default(),
    );

    let first = engine
        .process_message("psid-1", "GO", Some(graph_id))
        .expect("advance");
    assert_eq!(first.text.as_deref(), Some("Yes or no?"));

    // Edit the yes branch in the store while psid-1 is mid-conversation.
    let mut edited = decision_graph(graph_id);
    edited.nodes[3].data.message = Some("A resounding yes".to_string());
    graphs.insert(edited);

    // The in-flight instance keeps the definition it started with.
    let mid = engine
        .process_message("psid-1", "Y", Some(graph_id))
        .expect("in-flight");
    assert_eq!(mid.text.as_deref(), Some("You said yes"));
    assert!(mid.workflow_ended);

    // An instance built after the edit sees the new copy.
    engine
        .process_message("psid-2", "GO", Some(graph_id))
        .expect("fresh start");
    let fresh = engine
        .process_message("psid-2", "Y", Some(graph_id))
        .expect("fresh branch");
    assert_eq!(fresh.text.as_deref(), Some("A resounding yes"));
}

#[test]
fn eviction_sweeps_run_alongside_terminal_messages() {
    let graph_id = Uuid::new_v4();
    let graphs = Arc::new(MemoryGraphStore::new());
    graphs.insert(shop_graph(graph_id));
    // A zero TTL makes every sweep try to evict whatever it can see.
    let engine = Arc::new(ChatEngine::new(
        graphs,
        Arc::new(MemorySessionStore::new()),
        Arc::new(MemoryMessageLog::new()),
        ChatflowConfig::builder()
            .sessions(SessionsConfig {
                idle_ttl_secs: Some(0),
            })
            .build(),
    ));

    let sweeper = {
        let engine = Arc::clone(&engine);
        std::thread::spawn(move || {
            for _ in 0..500 {
                engine.evict_idle();
            }
        })
    };
    for round in 0..200 {
        let user_key = format!("psid-{round}");
        let response = engine
            .process_message(&user_key, "SHOP", Some(graph_id))
            .expect("response");
        assert!(response.workflow_ended);
    }
    sweeper.join().expect("sweeper thread");
}
