//! Node matching: does an inbound message correlate to a node's content?
//!
//! All text comparisons are case-insensitive substring tests over the
//! trimmed, lower-cased input. Payloads are opaque tokens and compare by
//! exact, case-sensitive equality against the raw input.

use crate::graph::GraphModel;
use chatflow_config::KeywordsConfig;
use chatflow_protocol::{Element, MessageKind, Node};
use log::debug;

/// How a node matched the input; the resolver keys edge selection off this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchVia {
    /// Start-node greeting keyword shortcut.
    StartKeyword,
    /// Exact payload hit on a button or quick reply.
    Payload {
        source: PayloadSource,
        /// Ordinal among button-type siblings, when edge-index fallback
        /// applies. Quick replies and card buttons resolve handle-or-first.
        index: Option<usize>,
        payload: String,
        title: String,
    },
    /// Title/body/label containment; no payload correlation available.
    Content,
}

/// Which kind of interactive element carried the matched payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSource {
    Button,
    QuickReply,
}

/// Match a node against an inbound message.
///
/// Tiers are tried in fixed priority order, stopping at the first success:
/// start-keyword shortcut, legacy buttons, legacy quick replies, typed
/// elements, message body, label, receipt special case. Within the
/// button/quick-reply tiers an exact payload hit anywhere in the list beats
/// a title containment hit, so payload clicks always correlate to their
/// edge.
pub fn match_node(
    graph: &GraphModel,
    node: &Node,
    input: &str,
    keywords: &KeywordsConfig,
) -> Option<MatchVia> {
    let normalized = input.trim().to_lowercase();
    // An empty input would satisfy every containment test.
    if normalized.is_empty() {
        return None;
    }

    // 1. Start-node greeting shortcut.
    if graph.is_start_node(node)
        && keywords.start.iter().any(|kw| normalized.contains(kw))
    {
        debug!("matched start keywords (node_id={})", node.id);
        return Some(MatchVia::StartKeyword);
    }

    // 2. Legacy buttons: exact payload first, then title containment.
    for (index, button) in node.data.buttons.iter().enumerate() {
        if button.payload == input {
            debug!(
                "matched button payload (node_id={}, payload={})",
                node.id, button.payload
            );
            return Some(MatchVia::Payload {
                source: PayloadSource::Button,
                index: Some(index),
                payload: button.payload.clone(),
                title: button.title.clone(),
            });
        }
    }
    if node
        .data
        .buttons
        .iter()
        .any(|button| button.title.to_lowercase().contains(&normalized))
    {
        return Some(MatchVia::Content);
    }

    // 3. Legacy quick replies.
    for reply in &node.data.quick_replies {
        if reply.payload == input {
            debug!(
                "matched quick reply payload (node_id={}, payload={})",
                node.id, reply.payload
            );
            return Some(MatchVia::Payload {
                source: PayloadSource::QuickReply,
                index: None,
                payload: reply.payload.clone(),
                title: reply.title.clone(),
            });
        }
    }
    if node
        .data
        .quick_replies
        .iter()
        .any(|reply| reply.title.to_lowercase().contains(&normalized))
    {
        return Some(MatchVia::Content);
    }

    // 4. Typed elements.
    if let Some(via) = match_elements(node, input, &normalized) {
        debug!("matched element (node_id={})", node.id);
        return Some(via);
    }

    // 5. Node message body.
    if let Some(message) = &node.data.message
        && message.to_lowercase().contains(&normalized)
    {
        return Some(MatchVia::Content);
    }

    // 6. Node label.
    if node.data.label.to_lowercase().contains(&normalized) {
        return Some(MatchVia::Content);
    }

    // 7. Receipt special case.
    if is_receipt(node) {
        if keywords.receipt.iter().any(|kw| normalized.contains(kw)) {
            return Some(MatchVia::Content);
        }
        let recipient_hit = node
            .data
            .recipient_name
            .as_deref()
            .is_some_and(|name| name.to_lowercase().contains(&normalized));
        let order_hit = node
            .data
            .order_number
            .as_deref()
            .is_some_and(|number| number.to_lowercase().contains(&normalized));
        if recipient_hit || order_hit {
            return Some(MatchVia::Content);
        }
    }

    None
}

fn is_receipt(node: &Node) -> bool {
    matches!(
        node.data.message_type,
        Some(MessageKind::Receipt) | Some(MessageKind::ReceiptTemplate)
    )
}

fn match_elements(node: &Node, input: &str, normalized: &str) -> Option<MatchVia> {
    // Exact payload passes come first: button elements (indexed among their
    // button siblings), then quick replies, then card buttons.
    let mut button_ordinal = 0usize;
    for element in &node.data.elements {
        if let Element::Button { title, payload, .. } = element {
            if payload.as_deref() == Some(input) {
                return Some(MatchVia::Payload {
                    source: PayloadSource::Button,
                    index: Some(button_ordinal),
                    payload: input.to_string(),
                    title: title.clone().unwrap_or_default(),
                });
            }
            button_ordinal += 1;
        }
    }
    for element in &node.data.elements {
        if let Element::QuickReply {
            title,
            quick_reply_payload,
            ..
        } = element
            && quick_reply_payload.as_deref() == Some(input)
        {
            return Some(MatchVia::Payload {
                source: PayloadSource::QuickReply,
                index: None,
                payload: input.to_string(),
                title: title.clone().unwrap_or_default(),
            });
        }
    }
    for element in &node.data.elements {
        if let Element::GenericCard { buttons, .. } = element {
            for button in buttons {
                if button.payload.as_deref() == Some(input) {
                    return Some(MatchVia::Payload {
                        source: PayloadSource::Button,
                        index: None,
                        payload: input.to_string(),
                        title: button.title.clone(),
                    });
                }
            }
        }
    }

    // Containment pass, in element declaration order.
    for element in &node.data.elements {
        let hit = match element {
            Element::Button { title, .. } | Element::QuickReply { title, .. } => {
                contains(title.as_deref(), normalized)
            }
            Element::Text { content } => contains(content.as_deref(), normalized),
            Element::Image {
                title, image_url, ..
            } => contains(title.as_deref(), normalized) || contains(image_url.as_deref(), normalized),
            Element::Video { title, file_url } | Element::File { title, file_url } => {
                contains(title.as_deref(), normalized) || contains(file_url.as_deref(), normalized)
            }
            Element::GenericCard {
                title,
                subtitle,
                buttons,
                ..
            } => {
                contains(title.as_deref(), normalized)
                    || contains(subtitle.as_deref(), normalized)
                    || buttons
                        .iter()
                        .any(|button| button.title.to_lowercase().contains(normalized))
            }
            Element::ListItem {
                title, subtitle, ..
            } => contains(title.as_deref(), normalized) || contains(subtitle.as_deref(), normalized),
        };
        if hit {
            return Some(MatchVia::Content);
        }
    }

    None
}

fn contains(haystack: Option<&str>, normalized: &str) -> bool {
    haystack.is_some_and(|text| text.to_lowercase().contains(normalized))
}

/// Exact payload lookup on a node, used to classify inbound clicks before
/// the machine runs (button vs quick reply vs free text).
pub fn find_payload_click(node: &Node, input: &str) -> Option<(PayloadSource, String)> {
    for button in &node.data.buttons {
        if button.payload == input {
            return Some((PayloadSource::Button, button.title.clone()));
        }
    }
    for reply in &node.data.quick_replies {
        if reply.payload == input {
            return Some((PayloadSource::QuickReply, reply.title.clone()));
        }
    }
    for element in &node.data.elements {
        match element {
            Element::Button { title, payload, .. } if payload.as_deref() == Some(input) => {
                return Some((PayloadSource::Button, title.clone().unwrap_or_default()));
            }
            Element::QuickReply {
                title,
                quick_reply_payload,
                ..
            } if quick_reply_payload.as_deref() == Some(input) => {
                return Some((PayloadSource::QuickReply, title.clone().unwrap_or_default()));
            }
            Element::GenericCard { buttons, .. } => {
                if let Some(button) = buttons.iter().find(|b| b.payload.as_deref() == Some(input)) {
                    return Some((PayloadSource::Button, button.title.clone()));
                }
            }
            _ => {}
        }
    }
    None
}
