//! In-memory registry of live conversation machines.
//!
//! One machine per session id. Lookups clone the `Arc`; callers lock the
//! machine themselves so two messages for the same session serialize while
//! unrelated sessions proceed concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chatflow_protocol::SessionId;
use log::{debug, info};
use parking_lot::{Mutex, RwLock};

use crate::error::EngineError;
use crate::machine::ConversationMachine;

#[derive(Default)]
pub struct SessionRegistry {
    machines: RwLock<HashMap<SessionId, Arc<Mutex<ConversationMachine>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the machine for a session, building one if absent.
    ///
    /// The build runs under the write lock, so two concurrent callers for
    /// the same new session observe exactly one machine.
    pub fn get_or_create<F>(
        &self,
        session_id: SessionId,
        build: F,
    ) -> Result<Arc<Mutex<ConversationMachine>>, EngineError>
    where
        F: FnOnce() -> Result<ConversationMachine, EngineError>,
    {
        if let Some(machine) = self.machines.read().get(&session_id) {
            return Ok(Arc::clone(machine));
        }

        let mut machines = self.machines.write();
        if let Some(machine) = machines.get(&session_id) {
            return Ok(Arc::clone(machine));
        }
        let machine = Arc::new(Mutex::new(build()?));
        machines.insert(session_id, Arc::clone(&machine));
        debug!("registered conversation machine (session_id={session_id})");
        Ok(machine)
    }

    pub fn get(&self, session_id: &SessionId) -> Option<Arc<Mutex<ConversationMachine>>> {
        self.machines.read().get(session_id).cloned()
    }

    /// Drop the machine for an ended session. Idempotent.
    pub fn remove(&self, session_id: &SessionId) {
        if self.machines.write().remove(session_id).is_some() {
            debug!("dropped conversation machine (session_id={session_id})");
        }
    }

    pub fn len(&self) -> usize {
        self.machines.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.read().is_empty()
    }

    /// Evict machines idle longer than `ttl` and return how many went.
    ///
    /// Machine mutexes are never taken while the map lock is held: callers
    /// processing a message hold a machine guard and may touch the map, so
    /// overlapping the two here would invert that order. The sweep works on
    /// a snapshot and skips machines that are busy mid-message.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let snapshot: Vec<(SessionId, Arc<Mutex<ConversationMachine>>)> = self
            .machines
            .read()
            .iter()
            .map(|(session_id, machine)| (*session_id, Arc::clone(machine)))
            .collect();

        let mut idle = Vec::new();
        for (session_id, machine) in snapshot {
            // A machine currently handling a message is not idle.
            if let Some(guard) = machine.try_lock()
                && guard.idle_for() >= ttl
            {
                idle.push(session_id);
            }
        }

        let mut machines = self.machines.write();
        let mut evicted = 0;
        for session_id in idle {
            if machines.remove(&session_id).is_some() {
                evicted += 1;
            }
        }
        drop(machines);
        if evicted > 0 {
            info!("evicted idle sessions (count={evicted}, ttl_secs={})", ttl.as_secs());
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatflow_config::KeywordsConfig;
    use chatflow_protocol::GraphDefinition;
    use uuid::Uuid;

    use crate::graph::GraphModel;

    fn machine_for(session_id: SessionId) -> ConversationMachine {
        let definition: GraphDefinition = serde_json::from_value(serde_json::json!({
            "id": Uuid::nil(),
            "name": "g",
            "nodes": [
                { "id": "n1", "type": "start", "data": { "label": "Start", "message": "Hi" } },
                { "id": "n2", "type": "message", "data": { "label": "End", "message": "Bye" } }
            ],
            "edges": [
                { "id": "e1", "source": "n1", "target": "n2" }
            ]
        }))
        .expect("definition");
        let graph = Arc::new(GraphModel::new(definition).expect("graph"));
        ConversationMachine::new(session_id, graph, Arc::new(KeywordsConfig::default()))
    }

    #[test]
    fn get_or_create_returns_the_same_machine() {
        let registry = SessionRegistry::new();
        let session_id = Uuid::new_v4();

        let first = registry
            .get_or_create(session_id, || Ok(machine_for(session_id)))
            .expect("create");
        let second = registry
            .get_or_create(session_id, || panic!("must not rebuild"))
            .expect("lookup");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn build_errors_leave_no_entry_behind() {
        let registry = SessionRegistry::new();
        let session_id = Uuid::new_v4();

        let result = registry.get_or_create(session_id, || {
            Err(EngineError::UnknownSession(session_id))
        });
        assert!(result.is_err());
        assert!(registry.is_empty());

        // A later attempt may still succeed.
        registry
            .get_or_create(session_id, || Ok(machine_for(session_id)))
            .expect("create after failure");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = SessionRegistry::new();
        let session_id = Uuid::new_v4();
        registry
            .get_or_create(session_id, || Ok(machine_for(session_id)))
            .expect("create");

        registry.remove(&session_id);
        registry.remove(&session_id);
        assert!(registry.is_empty());
    }

    #[test]
    fn evict_idle_skips_busy_machines() {
        let registry = SessionRegistry::new();
        let session_id = Uuid::new_v4();
        let machine = registry
            .get_or_create(session_id, || Ok(machine_for(session_id)))
            .expect("create");

        // Held guard marks the machine busy; the sweep must pass it over
        // rather than block on it.
        let guard = machine.lock();
        assert_eq!(registry.evict_idle(Duration::ZERO), 0);
        assert_eq!(registry.len(), 1);
        drop(guard);

        assert_eq!(registry.evict_idle(Duration::ZERO), 1);
    }

    #[test]
    fn evict_idle_spares_fresh_sessions() {
        let registry = SessionRegistry::new();
        let session_id = Uuid::new_v4();
        registry
            .get_or_create(session_id, || Ok(machine_for(session_id)))
            .expect("create");

        assert_eq!(registry.evict_idle(Duration::from_secs(3600)), 0);
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.evict_idle(Duration::ZERO), 1);
        assert!(registry.is_empty());
    }
}
