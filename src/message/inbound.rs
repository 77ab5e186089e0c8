//! Inbound normalization of engine payloads into webhook event bodies

use crate::engine::{InboundAck, InboundCall, InboundMessage};
use crate::types::DeliveryStatus;
use serde_json::{json, Value};

/// Engine message types delivered as `<type>Message`
const MEDIA_TYPES: [&str; 9] = [
    "audio", "video", "image", "sticker", "document", "contact", "vcard", "location", "ptt",
];

/// Content classification of an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Text,
    ListReply,
    TemplateButtonReply,
    Media,
    /// Engine-internal traffic, never forwarded
    Protocol,
    Other,
}

impl ContentKind {
    /// Classify an engine message type
    pub fn classify(message_type: &str) -> Self {
        let lowered = message_type.to_ascii_lowercase();
        match lowered.as_str() {
            "chat" => Self::Text,
            "list_response" => Self::ListReply,
            "template_button_reply" => Self::TemplateButtonReply,
            "protocol" => Self::Protocol,
            t if MEDIA_TYPES.contains(&t) => Self::Media,
            _ => Self::Other,
        }
    }
}

/// Normalize a message into a RECEIVED_MESSAGE body
///
/// Returns `None` for self-authored and protocol messages.
pub fn normalize_message(message: &InboundMessage) -> Option<Value> {
    if message.from_me {
        return None;
    }

    let kind = ContentKind::classify(&message.message_type);
    let content = message.content.clone().unwrap_or_default();

    let (message_type, payload) = match kind {
        ContentKind::Protocol => return None,
        ContentKind::Text | ContentKind::TemplateButtonReply => (
            "conversation".to_string(),
            json!({ "conversation": content }),
        ),
        ContentKind::ListReply => (
            "messageContextInfo".to_string(),
            json!({
                "listResponseMessage": message.list_response.clone().unwrap_or(Value::Null)
            }),
        ),
        ContentKind::Media => {
            let message_type = format!("{}Message", message.message_type);
            let mut payload = serde_json::Map::new();
            payload.insert(message_type.clone(), raw_payload(message));
            (message_type, Value::Object(payload))
        }
        ContentKind::Other => (message.message_type.clone(), raw_payload(message)),
    };

    Some(json!({
        "id": message.id,
        "messageType": message_type,
        "fromGroup": message.is_group,
        "pushName": message.push_name,
        "key": {
            "remoteJid": message.sender_id,
            "fromMe": message.from_me,
            "id": message.id,
        },
        "message": payload,
    }))
}

/// Body of a MESSAGE_DELIVERY_STATUS event
pub fn ack_body(ack: &InboundAck) -> Value {
    json!({
        "event": {
            "key": {
                "remoteJid": ack.remote,
                "fromMe": ack.from_me,
                "id": ack.id,
            },
            "update": {
                "status": DeliveryStatus::from_ack(ack.ack),
            },
        }
    })
}

/// Body of an INCOMING_CALL event
pub fn call_body(call: &InboundCall) -> Value {
    json!({
        "calls": [{
            "from": call.peer_jid,
            "id": call.id,
            "isVideo": call.is_video,
            "isGroup": call.is_group,
            "status": "terminate",
        }]
    })
}

/// Engine payload, falling back to the typed fields when none was kept
fn raw_payload(message: &InboundMessage) -> Value {
    if message.raw.is_null() {
        json!({
            "id": message.id,
            "type": message.message_type,
            "content": message.content,
            "from": message.sender_id,
        })
    } else {
        message.raw.clone()
    }
}
