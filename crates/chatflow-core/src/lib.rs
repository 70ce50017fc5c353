//! Core routing engine for chatflow.
//!
//! This crate owns graph matching, edge resolution, the per-session
//! conversation state machine, response synthesis, and the session registry
//! used by the service layer.

pub mod engine;
pub mod error;
pub mod graph;
pub mod machine;
pub mod matcher;
pub mod registry;
pub mod resolver;
pub mod store;
pub mod synthesizer;

pub use engine::ChatEngine;
pub use error::EngineError;
pub use graph::GraphModel;
pub use machine::{ConversationMachine, Event, MachineState, Outcome, SessionContext, Turn};
pub use matcher::{MatchVia, PayloadSource, find_payload_click, match_node};
pub use registry::SessionRegistry;
pub use resolver::{Resolution, resolve};
pub use store::{
    GraphStore, JsonlMessageLog, MemoryGraphStore, MemoryMessageLog, MemorySessionStore,
    MessageLog, MessageRecord, SessionRecord, SessionStore, StoreError,
};
pub use synthesizer::synthesize;
