//! Storage seams for graphs, sessions, and the message log.
//!
//! The engine only talks to the traits here. In-memory implementations back
//! the tests and embedded callers; the JSONL message log gives a durable
//! append-only transcript per session.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chatflow_protocol::{GraphDefinition, GraphId, SessionId};
use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors returned by the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("session already exists: {0}")]
    SessionExists(SessionId),
}

/// Persisted session state.
///
/// `current_node_id` is the resume point; `None` means the session has not
/// advanced past creation yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub id: SessionId,
    /// Channel-scoped user identity (for Messenger, the PSID).
    pub user_key: String,
    pub graph_id: GraphId,
    pub current_node_id: Option<String>,
    pub variables: Map<String, Value>,
    pub ended: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One logged message, inbound or outbound.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageRecord {
    pub session_id: SessionId,
    pub user_key: String,
    pub text: String,
    pub from_user: bool,
    /// How the message arrived: `text`, `button`, or `quick_reply`.
    pub kind: String,
    /// Routing metadata (node id, template type) for audit queries.
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Read access to stored graph definitions.
pub trait GraphStore: Send + Sync {
    /// Load a graph definition by id.
    fn graph(&self, graph_id: GraphId) -> Result<Option<GraphDefinition>, StoreError>;
    /// The active graph for an owner, when one is marked active.
    fn active_graph_id(&self, owner: &str) -> Result<Option<GraphId>, StoreError>;
}

/// Durable session state.
pub trait SessionStore: Send + Sync {
    /// The most recently updated session for a user, ended or not.
    fn find_latest(&self, user_key: &str) -> Result<Option<SessionRecord>, StoreError>;
    /// Load a session by id.
    fn load(&self, session_id: SessionId) -> Result<Option<SessionRecord>, StoreError>;
    /// Persist a new session. Fails if the id is already taken.
    fn create(&self, record: &SessionRecord) -> Result<(), StoreError>;
    /// Overwrite an existing session's state.
    fn save(&self, record: &SessionRecord) -> Result<(), StoreError>;
    /// Mark a session ended. Returns false when the id is unknown.
    fn end_session(&self, session_id: SessionId) -> Result<bool, StoreError>;
}

/// Append-only message transcript.
pub trait MessageLog: Send + Sync {
    /// Append one message to the transcript.
    fn append(&self, record: &MessageRecord) -> Result<(), StoreError>;
    /// All logged messages for a session, oldest first.
    fn session_history(&self, session_id: SessionId) -> Result<Vec<MessageRecord>, StoreError>;
}

/// Graph store backed by a map, loaded up front by the caller.
#[derive(Default)]
pub struct MemoryGraphStore {
    graphs: RwLock<HashMap<GraphId, GraphDefinition>>,
    active: RwLock<HashMap<String, GraphId>>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, definition: GraphDefinition) {
        let graph_id = definition.id;
        if definition.is_active
            && let Some(owner) = &definition.owner
        {
            self.active.write().insert(owner.clone(), graph_id);
        }
        self.graphs.write().insert(graph_id, definition);
        debug!("stored graph definition (graph_id={graph_id})");
    }

    pub fn set_active(&self, owner: &str, graph_id: GraphId) {
        self.active.write().insert(owner.to_string(), graph_id);
    }
}

impl GraphStore for MemoryGraphStore {
    fn graph(&self, graph_id: GraphId) -> Result<Option<GraphDefinition>, StoreError> {
        Ok(self.graphs.read().get(&graph_id).cloned())
    }

    fn active_graph_id(&self, owner: &str) -> Result<Option<GraphId>, StoreError> {
        Ok(self.active.read().get(owner).copied())
    }
}

/// Session store backed by a map.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn find_latest(&self, user_key: &str) -> Result<Option<SessionRecord>, StoreError> {
        let sessions = self.sessions.read();
        Ok(sessions
            .values()
            .filter(|record| record.user_key == user_key)
            .max_by_key(|record| record.updated_at)
            .cloned())
    }

    fn load(&self, session_id: SessionId) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.sessions.read().get(&session_id).cloned())
    }

    fn create(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&record.id) {
            return Err(StoreError::SessionExists(record.id));
        }
        info!(
            "created session (session_id={}, user_key={}, graph_id={})",
            record.id, record.user_key, record.graph_id
        );
        sessions.insert(record.id, record.clone());
        Ok(())
    }

    fn save(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let mut updated = record.clone();
        updated.updated_at = Utc::now();
        self.sessions.write().insert(updated.id, updated);
        Ok(())
    }

    fn end_session(&self, session_id: SessionId) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write();
        match sessions.get_mut(&session_id) {
            Some(record) => {
                record.ended = true;
                record.updated_at = Utc::now();
                info!("ended session (session_id={session_id})");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Message log backed by a vector, oldest first.
#[derive(Default)]
pub struct MemoryMessageLog {
    messages: RwLock<Vec<MessageRecord>>,
}

impl MemoryMessageLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageLog for MemoryMessageLog {
    fn append(&self, record: &MessageRecord) -> Result<(), StoreError> {
        self.messages.write().push(record.clone());
        Ok(())
    }

    fn session_history(&self, session_id: SessionId) -> Result<Vec<MessageRecord>, StoreError> {
        Ok(self
            .messages
            .read()
            .iter()
            .filter(|record| record.session_id == session_id)
            .cloned()
            .collect())
    }
}

/// JSONL message log, one transcript file per session.
pub struct JsonlMessageLog {
    /// Root directory for transcript files.
    root: PathBuf,
    /// Serialize write access to transcript files.
    write_lock: Mutex<()>,
}

impl JsonlMessageLog {
    /// Create a JSONL log under the given root.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        info!("initialized JSONL message log (root={})", root.display());
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn transcript_path(&self, session_id: SessionId) -> PathBuf {
        self.root.join(format!("{session_id}.jsonl"))
    }
}

impl MessageLog for JsonlMessageLog {
    fn append(&self, record: &MessageRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let path = self.transcript_path(record.session_id);
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let line = serde_json::to_string(record)?;
        writeln!(file, "{line}")?;
        debug!(
            "appended transcript line (session_id={}, from_user={}, kind={})",
            record.session_id, record.from_user, record.kind
        );
        Ok(())
    }

    fn session_history(&self, session_id: SessionId) -> Result<Vec<MessageRecord>, StoreError> {
        let path = self.transcript_path(session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = OpenOptions::new().read(true).open(&path)?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn session(user_key: &str) -> SessionRecord {
        let now = Utc::now();
        SessionRecord {
            id: Uuid::new_v4(),
            user_key: user_key.to_string(),
            graph_id: Uuid::new_v4(),
            current_node_id: None,
            variables: Map::new(),
            ended: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn find_latest_picks_the_most_recent_session() {
        let store = MemorySessionStore::new();
        let mut older = session("psid-1");
        older.updated_at = Utc::now() - chrono::Duration::hours(1);
        let newer = session("psid-1");
        let other_user = session("psid-2");
        store.create(&older).expect("create older");
        store.create(&newer).expect("create newer");
        store.create(&other_user).expect("create other");

        let found = store.find_latest("psid-1").expect("find").expect("record");
        assert_eq!(found.id, newer.id);
    }

    #[test]
    fn create_rejects_duplicate_ids() {
        let store = MemorySessionStore::new();
        let record = session("psid-1");
        store.create(&record).expect("create");
        assert!(matches!(
            store.create(&record),
            Err(StoreError::SessionExists(id)) if id == record.id
        ));
    }

    #[test]
    fn end_session_marks_the_record_and_reports_unknown_ids() {
        let store = MemorySessionStore::new();
        let record = session("psid-1");
        store.create(&record).expect("create");

        assert!(store.end_session(record.id).expect("end"));
        let reloaded = store.load(record.id).expect("load").expect("record");
        assert!(reloaded.ended);

        assert!(!store.end_session(Uuid::new_v4()).expect("end unknown"));
    }

    #[test]
    fn jsonl_log_round_trips_a_transcript() {
        let temp = tempdir().expect("tempdir");
        let log = JsonlMessageLog::new(temp.path()).expect("log");
        let session_id = Uuid::new_v4();

        let inbound = MessageRecord {
            session_id,
            user_key: "psid-1".to_string(),
            text: "SHOP".to_string(),
            from_user: true,
            kind: "button".to_string(),
            metadata: serde_json::json!({ "nodeId": "n1" }),
            created_at: Utc::now(),
        };
        let outbound = MessageRecord {
            session_id,
            user_key: "psid-1".to_string(),
            text: "Welcome to shop".to_string(),
            from_user: false,
            kind: "text".to_string(),
            metadata: serde_json::json!({ "nodeId": "n2" }),
            created_at: Utc::now(),
        };
        log.append(&inbound).expect("append inbound");
        log.append(&outbound).expect("append outbound");

        let history = log.session_history(session_id).expect("history");
        assert_eq!(history, vec![inbound, outbound]);

        // Unknown sessions read back as an empty transcript.
        assert_eq!(log.session_history(Uuid::new_v4()).expect("empty"), vec![]);
    }
}
