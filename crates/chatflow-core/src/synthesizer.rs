//! Response synthesis: node content to channel-ready structured response.
//!
//! A node can carry several content shapes at once (legacy template fields
//! next to typed elements); the cascade below is the single precedence
//! arbiter. Rule order matters: once a rule fires, later rules must not.

use chatflow_protocol::{
    Attachment, AttachmentKind, AttachmentPayload, Button, ButtonKind, CardButton, Element,
    MessageKind, MessageType, Node, PostbackButton, ResponseMetadata, SessionId,
    StructuredResponse, TemplateButton, TemplateElement, TemplateType, WireQuickReply,
    WireReceiptSummary,
};

const DEFAULT_CURRENCY: &str = "USD";

/// Synthesize the structured response for a node the conversation landed on.
///
/// `workflowEnded` and `triggeredByButton` are the caller's to fill in; the
/// synthesizer only knows the node.
pub fn synthesize(node: &Node, session_id: SessionId) -> StructuredResponse {
    let data = &node.data;
    let mut response = StructuredResponse {
        message_type: MessageType::Text,
        message: None,
        text: None,
        attachment: None,
        quick_replies: None,
        buttons: None,
        session_id,
        workflow_ended: false,
        in_workflow_msg: true,
        original_message: Some(data.message.clone().unwrap_or_default()),
        metadata: Some(ResponseMetadata {
            node_id: Some(node.id.clone()),
            node_type: Some(node_type_label(data.message_type)),
            triggered_by_button: None,
        }),
    };

    // 1. Legacy quick replies template.
    if data.message_type == Some(MessageKind::QuickReplies) && !data.quick_replies.is_empty() {
        response.message_type = MessageType::QuickReplies;
        response.text = Some(data.message.clone().unwrap_or_default());
        response.quick_replies = Some(
            data.quick_replies
                .iter()
                .map(|qr| WireQuickReply {
                    content_type: "text".to_string(),
                    title: Some(qr.title.clone()),
                    payload: Some(qr.payload.clone()),
                    image_url: qr.image_url.clone(),
                })
                .collect(),
        );
        return response;
    }

    // 2. Legacy button template.
    if data.message_type == Some(MessageKind::ButtonTemplate) && !data.buttons.is_empty() {
        response.message_type = MessageType::Attachment;
        response.attachment = Some(template_attachment(AttachmentPayload {
            template_type: Some(TemplateType::Button),
            text: Some(data.message.clone().unwrap_or_default()),
            buttons: Some(data.buttons.iter().map(legacy_button).collect()),
            ..AttachmentPayload::default()
        }));
        return response;
    }

    // 3. Legacy generic / list / receipt templates and single-media fields.
    if data.message_type == Some(MessageKind::GenericTemplate) && !data.elements.is_empty() {
        response.message_type = MessageType::Attachment;
        response.attachment = Some(template_attachment(AttachmentPayload {
            template_type: Some(TemplateType::Generic),
            elements: Some(data.elements.iter().map(card_fields).collect()),
            ..AttachmentPayload::default()
        }));
        return response;
    }

    if data.message_type == Some(MessageKind::ListTemplate) && !data.elements.is_empty() {
        response.message_type = MessageType::Attachment;
        response.attachment = Some(template_attachment(AttachmentPayload {
            template_type: Some(TemplateType::List),
            elements: Some(
                data.elements
                    .iter()
                    .map(|element| {
                        let mut fields = card_fields(element);
                        fields.buttons = None;
                        fields
                    })
                    .collect(),
            ),
            ..AttachmentPayload::default()
        }));
        return response;
    }

    if data.message_type == Some(MessageKind::ReceiptTemplate) {
        let currency = data
            .currency
            .clone()
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
        response.message_type = MessageType::Attachment;
        response.attachment = Some(template_attachment(AttachmentPayload {
            template_type: Some(TemplateType::Receipt),
            recipient_name: data.recipient_name.clone(),
            order_number: data.order_number.clone(),
            currency: Some(currency.clone()),
            payment_method: data.payment_method.clone(),
            summary: data.summary.map(|summary| WireReceiptSummary {
                subtotal: summary.subtotal,
                shipping_cost: summary.shipping_cost,
                total_tax: summary.total_tax,
                total_cost: summary.total_cost,
            }),
            elements: line_items(&data.elements, &currency),
            ..AttachmentPayload::default()
        }));
        return response;
    }

    if let Some(kind) = media_kind(data.message_type)
        && let Some(url) = &data.attachment_url
    {
        response.message_type = MessageType::Attachment;
        response.attachment = Some(media_attachment(kind, url.clone()));
        return response;
    }

    // 4. Typed elements, partitioned by category.
    if !data.elements.is_empty() {
        return synthesize_elements(node, response);
    }

    // 5. Fallback: plain text, with legacy buttons attached when present.
    let text = data
        .message
        .clone()
        .unwrap_or_else(|| "No message configured".to_string());
    response.text = Some(text.clone());
    response.message = Some(text);
    if !data.buttons.is_empty() {
        response.buttons = Some(
            data.buttons
                .iter()
                .map(|button| PostbackButton {
                    title: button.title.clone(),
                    payload: button.payload.clone(),
                    kind: "postback".to_string(),
                })
                .collect(),
        );
    }
    response
}

fn synthesize_elements(node: &Node, mut response: StructuredResponse) -> StructuredResponse {
    let data = &node.data;
    let texts: Vec<&Element> = partition(data, |e| matches!(e, Element::Text { .. }));
    let images: Vec<&Element> = partition(data, |e| matches!(e, Element::Image { .. }));
    let videos: Vec<&Element> = partition(data, |e| matches!(e, Element::Video { .. }));
    let files: Vec<&Element> = partition(data, |e| matches!(e, Element::File { .. }));
    let buttons: Vec<&Element> = partition(data, |e| matches!(e, Element::Button { .. }));
    let quick_replies: Vec<&Element> = partition(data, |e| matches!(e, Element::QuickReply { .. }));
    let cards: Vec<&Element> = partition(data, |e| matches!(e, Element::GenericCard { .. }));
    let list_items: Vec<&Element> = partition(data, |e| matches!(e, Element::ListItem { .. }));

    // 4a. Quick reply elements win outright.
    if !quick_replies.is_empty() {
        response.message_type = MessageType::QuickReplies;
        response.text = Some(combined_text(&texts, data.message.as_deref()));
        response.quick_replies = Some(
            quick_replies
                .iter()
                .filter_map(|element| match element {
                    Element::QuickReply {
                        title,
                        quick_reply_payload,
                        image_url,
                    } => Some(WireQuickReply {
                        content_type: "text".to_string(),
                        title: Some(title.clone().unwrap_or_default()),
                        payload: Some(quick_reply_payload.clone().unwrap_or_default()),
                        image_url: image_url.clone(),
                    }),
                    _ => None,
                })
                .collect(),
        );
        return response;
    }

    // 4b. Explicit generic cards.
    if !cards.is_empty() {
        response.message_type = MessageType::Attachment;
        response.attachment = Some(template_attachment(AttachmentPayload {
            template_type: Some(TemplateType::Generic),
            elements: Some(cards.iter().map(|card| card_fields(card)).collect()),
            ..AttachmentPayload::default()
        }));
        return response;
    }

    // 4c. Auto-merge: mixed free-form content becomes one generic card.
    let mixed_categories = [!texts.is_empty(), !images.is_empty(), !buttons.is_empty()]
        .into_iter()
        .filter(|present| *present)
        .count();
    if mixed_categories >= 2 {
        let combined = combined_text(&texts, data.message.as_deref());
        let title = if combined.is_empty() {
            "Message".to_string()
        } else {
            combined
        };
        let subtitle = (images.len() > 1).then(|| format!("+{} more images", images.len() - 1));
        let image_url = images.first().and_then(|element| match element {
            Element::Image { image_url, .. } => image_url.clone(),
            _ => None,
        });
        response.message_type = MessageType::Attachment;
        response.attachment = Some(template_attachment(AttachmentPayload {
            template_type: Some(TemplateType::Generic),
            elements: Some(vec![TemplateElement {
                title: Some(title),
                subtitle,
                image_url,
                buttons: Some(buttons.iter().filter_map(|e| element_button(e)).collect()),
                ..TemplateElement::default()
            }]),
            ..AttachmentPayload::default()
        }));
        return response;
    }

    // 4d. List items.
    if !list_items.is_empty() {
        response.message_type = MessageType::Attachment;
        response.attachment = Some(template_attachment(AttachmentPayload {
            template_type: Some(TemplateType::List),
            elements: Some(
                list_items
                    .iter()
                    .map(|item| {
                        let mut fields = card_fields(item);
                        fields.buttons = None;
                        fields
                    })
                    .collect(),
            ),
            ..AttachmentPayload::default()
        }));
        return response;
    }

    // 4e. Buttons alone become a button template.
    if !buttons.is_empty() {
        response.message_type = MessageType::Attachment;
        response.attachment = Some(template_attachment(AttachmentPayload {
            template_type: Some(TemplateType::Button),
            text: Some(combined_text(&texts, data.message.as_deref())),
            buttons: Some(buttons.iter().filter_map(|e| element_button(e)).collect()),
            ..AttachmentPayload::default()
        }));
        return response;
    }

    // 4f. Single-category media.
    for (elements, kind) in [
        (&images, AttachmentKind::Image),
        (&videos, AttachmentKind::Video),
        (&files, AttachmentKind::File),
    ] {
        if !elements.is_empty() && texts.is_empty() && buttons.is_empty() {
            let url = match elements[0] {
                Element::Image { image_url, .. } => image_url.clone(),
                Element::Video { file_url, .. } | Element::File { file_url, .. } => {
                    file_url.clone()
                }
                _ => None,
            };
            response.message_type = MessageType::Attachment;
            response.attachment = Some(media_attachment(kind, url.unwrap_or_default()));
            return response;
        }
    }

    // 4g. Only text elements.
    if !texts.is_empty() {
        response.text = Some(combined_text(&texts, None));
        return response;
    }

    // Nothing renderable in the element list; plain text fallback.
    let text = data
        .message
        .clone()
        .unwrap_or_else(|| "No message configured".to_string());
    response.text = Some(text.clone());
    response.message = Some(text);
    response
}

fn partition<'a>(data: &'a chatflow_protocol::NodeData, pred: fn(&Element) -> bool) -> Vec<&'a Element> {
    data.elements.iter().filter(|element| pred(element)).collect()
}

/// Newline-joined text element contents, falling back to the node message.
fn combined_text(texts: &[&Element], message: Option<&str>) -> String {
    let combined = texts
        .iter()
        .filter_map(|element| match element {
            Element::Text { content } => content.as_deref(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n");
    if combined.is_empty() {
        message.unwrap_or_default().to_string()
    } else {
        combined
    }
}

fn node_type_label(kind: Option<MessageKind>) -> String {
    let label = match kind {
        Some(MessageKind::Text) | None => "text",
        Some(MessageKind::Start) => "start",
        Some(MessageKind::Receipt) => "receipt",
        Some(MessageKind::QuickReplies) => "quick_replies",
        Some(MessageKind::ButtonTemplate) => "button_template",
        Some(MessageKind::GenericTemplate) => "generic_template",
        Some(MessageKind::ListTemplate) => "list_template",
        Some(MessageKind::ReceiptTemplate) => "receipt_template",
        Some(MessageKind::Image) => "image",
        Some(MessageKind::Video) => "video",
        Some(MessageKind::File) => "file",
        Some(MessageKind::Unknown) => "text",
    };
    label.to_string()
}

fn media_kind(kind: Option<MessageKind>) -> Option<AttachmentKind> {
    match kind {
        Some(MessageKind::Image) => Some(AttachmentKind::Image),
        Some(MessageKind::Video) => Some(AttachmentKind::Video),
        Some(MessageKind::File) => Some(AttachmentKind::File),
        _ => None,
    }
}

fn template_attachment(payload: AttachmentPayload) -> Attachment {
    Attachment {
        kind: AttachmentKind::Template,
        payload: Some(payload),
    }
}

fn media_attachment(kind: AttachmentKind, url: String) -> Attachment {
    Attachment {
        kind,
        payload: Some(AttachmentPayload {
            url: Some(url),
            is_reusable: Some(true),
            ..AttachmentPayload::default()
        }),
    }
}

fn legacy_button(button: &Button) -> TemplateButton {
    TemplateButton {
        kind: ButtonKind::Postback,
        title: button.title.clone(),
        payload: Some(button.payload.clone()),
        url: None,
    }
}

fn card_button(button: &CardButton) -> TemplateButton {
    TemplateButton {
        kind: button.kind,
        title: button.title.clone(),
        payload: (button.kind == ButtonKind::Postback)
            .then(|| button.payload.clone())
            .flatten(),
        url: (button.kind == ButtonKind::WebUrl)
            .then(|| button.url.clone())
            .flatten(),
    }
}

fn element_button(element: &Element) -> Option<TemplateButton> {
    match element {
        Element::Button {
            title,
            button_type,
            payload,
            url,
        } => {
            let kind = button_type.unwrap_or_default();
            Some(TemplateButton {
                kind,
                title: title.clone().unwrap_or_default(),
                payload: (kind == ButtonKind::Postback)
                    .then(|| payload.clone())
                    .flatten(),
                url: (kind == ButtonKind::WebUrl).then(|| url.clone()).flatten(),
            })
        }
        _ => None,
    }
}

/// Card-shaped fields an element contributes to a template.
fn card_fields(element: &Element) -> TemplateElement {
    match element {
        Element::GenericCard {
            title,
            subtitle,
            image_url,
            buttons,
        } => TemplateElement {
            title: title.clone(),
            subtitle: subtitle.clone(),
            image_url: image_url.clone(),
            buttons: (!buttons.is_empty())
                .then(|| buttons.iter().map(card_button).collect()),
            ..TemplateElement::default()
        },
        Element::ListItem {
            title,
            subtitle,
            image_url,
            ..
        } => TemplateElement {
            title: title.clone(),
            subtitle: subtitle.clone(),
            image_url: image_url.clone(),
            ..TemplateElement::default()
        },
        Element::Image { title, image_url } => TemplateElement {
            title: title.clone(),
            image_url: image_url.clone(),
            ..TemplateElement::default()
        },
        Element::Text { content } => TemplateElement {
            title: content.clone(),
            ..TemplateElement::default()
        },
        Element::Video { title, .. } | Element::File { title, .. } => TemplateElement {
            title: title.clone(),
            ..TemplateElement::default()
        },
        Element::Button { title, .. } | Element::QuickReply { title, .. } => TemplateElement {
            title: title.clone(),
            ..TemplateElement::default()
        },
    }
}

/// Receipt line items from the node's list_item elements.
fn line_items(elements: &[Element], currency: &str) -> Option<Vec<TemplateElement>> {
    let items: Vec<TemplateElement> = elements
        .iter()
        .filter_map(|element| match element {
            Element::ListItem {
                title,
                subtitle,
                quantity,
                price,
                ..
            } => Some(TemplateElement {
                title: title.clone(),
                subtitle: subtitle.clone(),
                quantity: Some(quantity.unwrap_or(1)),
                price: Some(price.unwrap_or(0.0)),
                currency: Some(currency.to_string()),
                ..TemplateElement::default()
            }),
            _ => None,
        })
        .collect();
    (!items.is_empty()).then_some(items)
}
