//! Raw engine callback payloads
//!
//! Every callback an engine can fire is one variant of `EngineEvent`, so the
//! session state machine can match on them exhaustively.

use serde::{Deserialize, Serialize};

/// One callback fired by an engine handle
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A new pairing challenge (QR) was produced
    PairingChallenge {
        /// QR image, usually a `data:image/png;base64,` URL
        qr_code: String,
        /// Raw code encoded in the QR
        url_code: String,
        attempt: u32,
    },

    /// Initial load/sync progress
    LoadProgress { percent: u32, message: String },

    /// High-level session status transition
    StatusChange(EngineStatus),

    /// Low-level socket state transition
    LowLevelState(SocketState),

    InboundMessage(InboundMessage),

    InboundAck(InboundAck),

    InboundCall(InboundCall),
}

/// High-level session status reported by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineStatus {
    IsLogged,
    InChat,
    NotLogged,
    BrowserClose,
    QrReadSuccess,
    QrReadFail,
    AutoCloseCalled,
    DisconnectedMobile,
    ServerClose,
    DeleteToken,
    Other(String),
}

impl EngineStatus {
    /// Parse the engine's status string
    pub fn parse(status: &str) -> Self {
        match status {
            "isLogged" => Self::IsLogged,
            "inChat" => Self::InChat,
            "notLogged" => Self::NotLogged,
            "browserClose" => Self::BrowserClose,
            "qrReadSuccess" => Self::QrReadSuccess,
            "qrReadFail" => Self::QrReadFail,
            "autocloseCalled" => Self::AutoCloseCalled,
            "desconnectedMobile" => Self::DisconnectedMobile,
            "serverClose" => Self::ServerClose,
            "deleteToken" => Self::DeleteToken,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Low-level socket state reported by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketState {
    Conflict,
    Connected,
    Unpaired,
    UnpairedIdle,
    Other(String),
}

impl SocketState {
    pub fn parse(state: &str) -> Self {
        match state {
            "CONFLICT" => Self::Conflict,
            "CONNECTED" => Self::Connected,
            "UNPAIRED" => Self::Unpaired,
            "UNPAIRED_IDLE" => Self::UnpairedIdle,
            other => Self::Other(other.to_string()),
        }
    }
}

/// An inbound message as delivered by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub id: String,

    /// Engine message type (`chat`, `image`, `list_response`, `protocol`, ...)
    #[serde(rename = "type")]
    pub message_type: String,

    #[serde(default)]
    pub content: Option<String>,

    /// Sender id (`<number>@c.us`)
    pub sender_id: String,

    #[serde(default)]
    pub push_name: Option<String>,

    /// Authored by this instance's own account
    #[serde(default)]
    pub from_me: bool,

    #[serde(default)]
    pub is_group: bool,

    /// Selected row for list replies
    #[serde(default)]
    pub list_response: Option<serde_json::Value>,

    /// Complete engine payload
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// A delivery ack for a previously sent message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundAck {
    pub id: String,
    pub remote: String,
    pub from_me: bool,
    /// Engine ack level (0 = error ... 6 = deleted)
    pub ack: i32,
}

/// An incoming voice or video call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundCall {
    pub id: String,
    pub peer_jid: String,
    #[serde(default)]
    pub is_video: bool,
    #[serde(default)]
    pub is_group: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_status_parse() {
        assert_eq!(EngineStatus::parse("inChat"), EngineStatus::InChat);
        assert_eq!(EngineStatus::parse("autocloseCalled"), EngineStatus::AutoCloseCalled);
        assert_eq!(EngineStatus::parse("desconnectedMobile"), EngineStatus::DisconnectedMobile);
        assert_eq!(
            EngineStatus::parse("somethingNew"),
            EngineStatus::Other("somethingNew".to_string())
        );
    }

    #[test]
    fn test_socket_state_parse() {
        assert_eq!(SocketState::parse("CONFLICT"), SocketState::Conflict);
        assert_eq!(SocketState::parse("UNPAIRED_IDLE"), SocketState::UnpairedIdle);
        assert_eq!(SocketState::parse("OPENING"), SocketState::Other("OPENING".to_string()));
    }

    #[test]
    fn test_inbound_message_deserialize() {
        let msg: InboundMessage = serde_json::from_value(serde_json::json!({
            "id": "false_5511@c.us_ABC",
            "type": "chat",
            "content": "hello",
            "senderId": "5511@c.us",
            "pushName": "Ana"
        }))
        .unwrap();

        assert_eq!(msg.message_type, "chat");
        assert_eq!(msg.content.as_deref(), Some("hello"));
        assert!(!msg.from_me);
        assert!(msg.raw.is_null());
    }
}
