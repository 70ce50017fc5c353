//! Conversation-graph definition as authored in the graph editor.
//!
//! Nodes accumulated content shapes over time: a legacy button/quick-reply
//! pair of arrays, receipt-template fields, and the newer typed `elements`
//! list. Migration-era nodes can carry several shapes at once, so `NodeData`
//! keeps them as optional groups and leaves precedence to the response
//! synthesizer.

use crate::GraphId;
use serde::{Deserialize, Serialize};

/// A full conversation graph: nodes plus directed edges.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphDefinition {
    /// Graph identifier.
    pub id: GraphId,
    /// Human-friendly graph name.
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Nodes in declaration order.
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Edges in declaration order.
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Whether this graph is the owner's active graph.
    #[serde(default)]
    pub is_active: bool,
    /// Account that owns the graph.
    #[serde(default)]
    pub owner: Option<String>,
}

/// A single step in a conversation graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// Node identifier, unique within the graph.
    pub id: String,
    /// Node discriminator from the editor.
    #[serde(rename = "type", default)]
    pub kind: NodeKind,
    /// Editor canvas position.
    #[serde(default)]
    pub position: Option<Position>,
    /// Node content.
    pub data: NodeData,
}

/// A directed transition between two nodes.
///
/// `sourceHandle` ties the edge to a specific button or quick-reply payload
/// on the source node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    /// Edge identifier.
    pub id: String,
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Payload-correlation handle on the source node.
    #[serde(default)]
    pub source_handle: Option<String>,
    /// Editor-side target handle, unused by routing.
    #[serde(default)]
    pub target_handle: Option<String>,
    /// Editor edge type.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// Editor-assigned node discriminator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Entry node of the graph.
    Start,
    /// Ordinary message node.
    #[default]
    Message,
    /// Terminal node.
    End,
    /// Any other editor node type.
    #[serde(other)]
    Other,
}

/// Canvas coordinates, kept only so graphs round-trip.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Content attached to a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    /// Display label from the editor.
    #[serde(default)]
    pub label: String,
    /// Plain message text.
    #[serde(default)]
    pub message: Option<String>,
    /// Legacy template discriminator.
    #[serde(default)]
    pub message_type: Option<MessageKind>,
    /// Typed content elements (newer authoring model).
    #[serde(default)]
    pub elements: Vec<Element>,
    /// Legacy postback buttons.
    #[serde(default)]
    pub buttons: Vec<Button>,
    /// Legacy quick replies.
    #[serde(default)]
    pub quick_replies: Vec<QuickReply>,
    /// Legacy single-media attachment url.
    #[serde(default)]
    pub attachment_url: Option<String>,
    /// Receipt template: recipient name.
    #[serde(default)]
    pub recipient_name: Option<String>,
    /// Receipt template: order number.
    #[serde(default)]
    pub order_number: Option<String>,
    /// Receipt template: currency code.
    #[serde(default)]
    pub currency: Option<String>,
    /// Receipt template: payment method.
    #[serde(default)]
    pub payment_method: Option<String>,
    /// Receipt template: cost summary.
    #[serde(default)]
    pub summary: Option<ReceiptSummary>,
}

/// Legacy template discriminator carried in `messageType`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Start,
    Receipt,
    QuickReplies,
    ButtonTemplate,
    GenericTemplate,
    ListTemplate,
    ReceiptTemplate,
    Image,
    Video,
    File,
    /// Forward compatibility with editor additions.
    #[serde(other)]
    Unknown,
}

/// Typed content element; the closed set the synthesizer cascades over.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Element {
    /// Free text block.
    Text {
        #[serde(default)]
        content: Option<String>,
    },
    /// Image attachment.
    Image {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        image_url: Option<String>,
    },
    /// Video attachment.
    Video {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        file_url: Option<String>,
    },
    /// File attachment.
    File {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        file_url: Option<String>,
    },
    /// Postback / url button.
    Button {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        button_type: Option<ButtonKind>,
        #[serde(default)]
        payload: Option<String>,
        #[serde(default)]
        url: Option<String>,
    },
    /// Quick reply chip.
    QuickReply {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        quick_reply_payload: Option<String>,
        #[serde(default)]
        image_url: Option<String>,
    },
    /// Carousel card with its own buttons.
    GenericCard {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        subtitle: Option<String>,
        #[serde(default)]
        image_url: Option<String>,
        #[serde(default)]
        buttons: Vec<CardButton>,
    },
    /// List row; doubles as a receipt line item (quantity/price).
    ListItem {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        subtitle: Option<String>,
        #[serde(default)]
        image_url: Option<String>,
        #[serde(default)]
        quantity: Option<u32>,
        #[serde(default)]
        price: Option<f64>,
    },
}

/// Button kind for element buttons and card buttons.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ButtonKind {
    #[default]
    Postback,
    WebUrl,
    PhoneNumber,
}

/// Button nested inside a generic card.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CardButton {
    #[serde(rename = "type", default)]
    pub kind: ButtonKind,
    pub title: String,
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Legacy postback button.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Button {
    pub title: String,
    pub payload: String,
}

/// Legacy quick reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuickReply {
    pub title: String,
    pub payload: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Receipt template cost summary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptSummary {
    pub subtotal: f64,
    pub shipping_cost: f64,
    pub total_tax: f64,
    pub total_cost: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn node_parses_editor_json() {
        let raw = serde_json::json!({
            "id": "n1",
            "type": "start",
            "position": { "x": 10.0, "y": 20.0 },
            "data": {
                "label": "Start",
                "message": "Hi",
                "buttons": [{ "title": "Shop", "payload": "SHOP" }],
                "elements": [
                    { "id": "e1", "type": "text", "content": "Pick one" },
                    { "id": "e2", "type": "button", "title": "Yes", "payload": "Y", "buttonType": "postback" },
                    { "id": "e3", "type": "quick_reply", "title": "No", "quickReplyPayload": "N" }
                ]
            }
        });

        let node: Node = serde_json::from_value(raw).expect("node");
        assert_eq!(node.kind, NodeKind::Start);
        assert_eq!(node.data.buttons[0].payload, "SHOP");
        assert_eq!(
            node.data.elements[0],
            Element::Text {
                content: Some("Pick one".to_string())
            }
        );
        match &node.data.elements[2] {
            Element::QuickReply {
                quick_reply_payload,
                ..
            } => assert_eq!(quick_reply_payload.as_deref(), Some("N")),
            other => panic!("unexpected element: {other:?}"),
        }
    }

    #[test]
    fn unknown_node_kind_falls_back_to_other() {
        let node: Node = serde_json::from_value(serde_json::json!({
            "id": "n1",
            "type": "custom",
            "data": { "label": "X" }
        }))
        .expect("node");
        assert_eq!(node.kind, NodeKind::Other);
        assert_eq!(node.data.message, None);
    }
}
