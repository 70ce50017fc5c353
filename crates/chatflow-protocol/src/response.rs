//! Channel-ready structured response shape.
//!
//! Field names and nesting mirror the Messenger Send API payloads the
//! channel adapter forwards verbatim: top-level session fields are
//! camelCase, everything under `attachment.payload` is snake_case. Do not
//! rename fields here without coordinating a channel adapter change.

use crate::SessionId;
use serde::{Deserialize, Serialize};

/// Top-level discriminator for a structured response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Attachment,
    QuickReplies,
}

/// A channel-ready reply produced for one inbound message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StructuredResponse {
    /// Response discriminator.
    #[serde(rename = "messageType")]
    pub message_type: MessageType,
    /// Legacy mirror of `text`, kept for older channel adapters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Plain text body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Template or media attachment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    /// Quick reply chips.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_replies: Option<Vec<WireQuickReply>>,
    /// Legacy postback buttons attached to a plain text response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buttons: Option<Vec<PostbackButton>>,
    /// Session that produced this response.
    #[serde(rename = "sessionId")]
    pub session_id: SessionId,
    /// True when the session's node has no outgoing edges.
    #[serde(rename = "workflowEnded")]
    pub workflow_ended: bool,
    /// True when the inbound message advanced the graph.
    #[serde(rename = "inWorkFlowMsg")]
    pub in_workflow_msg: bool,
    /// Node message text (matched) or the raw user input (unmatched).
    #[serde(rename = "originalMessage", default, skip_serializing_if = "Option::is_none")]
    pub original_message: Option<String>,
    /// Routing metadata for the caller's message log.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
}

/// Attachment wrapper.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<AttachmentPayload>,
}

/// Attachment discriminator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Template,
    Image,
    Video,
    Audio,
    File,
}

/// Template discriminator under `attachment.payload`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TemplateType {
    Generic,
    Button,
    List,
    Receipt,
}

/// Everything the Send API nests under `attachment.payload`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AttachmentPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_type: Option<TemplateType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elements: Option<Vec<TemplateElement>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buttons: Option<Vec<TemplateButton>>,
    // Receipt template fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<WireReceiptSummary>,
    // Media attachment fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_reusable: Option<bool>,
}

/// Card, list row, or receipt line item inside a template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TemplateElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buttons: Option<Vec<TemplateButton>>,
    // Receipt line item fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

/// Button inside a template payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateButton {
    #[serde(rename = "type")]
    pub kind: crate::ButtonKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Receipt template cost summary on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct WireReceiptSummary {
    pub subtotal: f64,
    pub shipping_cost: f64,
    pub total_tax: f64,
    pub total_cost: f64,
}

/// Quick reply chip on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireQuickReply {
    /// Always `"text"` for graph-authored quick replies.
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Legacy postback button attached to a plain text response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostbackButton {
    pub title: String,
    pub payload: String,
    /// Always `"postback"`.
    #[serde(rename = "type")]
    pub kind: String,
}

/// Routing metadata echoed to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by_button: Option<TriggeredBy>,
}

/// The button or quick reply that triggered a transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TriggeredBy {
    pub payload: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_node_id: Option<String>,
}
