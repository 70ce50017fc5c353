//! Wire protocol types for chatflow graphs and channel responses.
//!
//! This crate owns the serde shapes shared between the graph editor, the
//! routing engine, and the channel adapter. It carries no behavior beyond
//! (de)serialization.

mod graph;
mod response;

pub use graph::{
    Button, CardButton, ButtonKind, Edge, Element, GraphDefinition, MessageKind, Node, NodeData,
    NodeKind, Position, QuickReply, ReceiptSummary,
};
pub use response::{
    Attachment, AttachmentKind, AttachmentPayload, MessageType, PostbackButton, ResponseMetadata,
    StructuredResponse, TemplateButton, TemplateElement, TemplateType, TriggeredBy, WireQuickReply,
    WireReceiptSummary,
};

use uuid::Uuid;

/// Unique identifier for a conversation graph.
pub type GraphId = Uuid;
/// Unique identifier for a chat session.
pub type SessionId = Uuid;
