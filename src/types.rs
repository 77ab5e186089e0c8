//! Core instance types for the a3s-session system
//!
//! All types use camelCase JSON serialization for wire compatibility.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Messaging engine implementation backing an instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    /// Browser-driven engine with file token store
    #[default]
    Wppconnect,
}

impl EngineType {
    /// Directory name used under the session root
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wppconnect => "wppconnect",
        }
    }
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection status of an instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusType {
    #[default]
    Disconnected,
    Connecting,
    Synchronizing,
    Connected,
}

impl StatusType {
    /// Whether a live engine session is expected in this state
    pub fn is_live(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

/// Webhook event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Qrcode,
    Connection,
    ReceivedMessage,
    MessageDeliveryStatus,
    IncomingCall,
}

/// Delivery status reported by message acks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Error,
    Pending,
    ServerAck,
    DeliveryAck,
    Read,
    Played,
    Deleted,
}

impl DeliveryStatus {
    /// Map an engine ack level to a status; unknown levels yield `None`
    pub fn from_ack(level: i32) -> Option<Self> {
        match level {
            0 => Some(Self::Error),
            1 => Some(Self::Pending),
            2 => Some(Self::ServerAck),
            3 => Some(Self::DeliveryAck),
            4 => Some(Self::Read),
            5 => Some(Self::Played),
            6 => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// Presence states an instance can announce
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceType {
    Unavailable,
    Available,
    #[default]
    Composing,
    Recording,
    Paused,
}

/// State record for one instance
///
/// Owned by the `InstanceRegistry`; callers only ever see snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    /// Primary identity, immutable after creation
    pub instance_key: String,

    /// Webhook target; falls back to the process-wide default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    #[serde(default)]
    pub disable_webhook: bool,

    #[serde(default)]
    pub emit_acks: bool,

    #[serde(default)]
    pub engine_type: EngineType,

    #[serde(default)]
    pub status: StatusType,

    /// Latest pairing challenge as a data URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,

    /// Raw pairing code behind the latest challenge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_code: Option<String>,

    #[serde(default)]
    pub progress_sync: u32,

    #[serde(default)]
    pub max_sync_timeout: u32,

    #[serde(default)]
    pub connection_attempts: u32,

    #[serde(default)]
    pub connected: bool,

    #[serde(default)]
    pub lock_initial_sync: bool,

    #[serde(default)]
    pub new_login: bool,
}

impl ConnectionRecord {
    /// Create a fresh disconnected record with zeroed counters
    pub fn new(instance_key: impl Into<String>) -> Self {
        Self {
            instance_key: instance_key.into(),
            webhook_url: None,
            disable_webhook: false,
            emit_acks: false,
            engine_type: EngineType::default(),
            status: StatusType::Disconnected,
            qr_code: None,
            url_code: None,
            progress_sync: 0,
            max_sync_timeout: 0,
            connection_attempts: 0,
            connected: false,
            lock_initial_sync: false,
            new_login: true,
        }
    }

    /// Merge a partial update; fields absent from the patch are untouched
    pub fn apply(&mut self, patch: &InstancePatch) {
        if let Some(ref url) = patch.webhook_url {
            self.webhook_url = url.clone();
        }
        if let Some(v) = patch.disable_webhook {
            self.disable_webhook = v;
        }
        if let Some(v) = patch.emit_acks {
            self.emit_acks = v;
        }
        if let Some(v) = patch.engine_type {
            self.engine_type = v;
        }
        if let Some(v) = patch.status {
            self.status = v;
        }
        if let Some(ref qr) = patch.qr_code {
            self.qr_code = qr.clone();
        }
        if let Some(ref code) = patch.url_code {
            self.url_code = code.clone();
        }
        if let Some(v) = patch.progress_sync {
            self.progress_sync = v;
        }
        if let Some(v) = patch.max_sync_timeout {
            self.max_sync_timeout = v;
        }
        if let Some(v) = patch.connection_attempts {
            self.connection_attempts = v;
        }
        if let Some(v) = patch.connected {
            self.connected = v;
        }
        if let Some(v) = patch.lock_initial_sync {
            self.lock_initial_sync = v;
        }
        if let Some(v) = patch.new_login {
            self.new_login = v;
        }
    }

    /// Keep only configuration fields; everything else back to initial values
    pub fn reset_to_config(&mut self) {
        let mut fresh = Self::new(std::mem::take(&mut self.instance_key));
        fresh.webhook_url = self.webhook_url.take();
        fresh.disable_webhook = self.disable_webhook;
        fresh.emit_acks = self.emit_acks;
        fresh.engine_type = self.engine_type;
        fresh.new_login = self.new_login;
        *self = fresh;
    }
}

/// Partial update for a `ConnectionRecord`
///
/// `None` leaves the field untouched. Optional string fields use a nested
/// `Option` so that `Some(None)` clears them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstancePatch {
    pub webhook_url: Option<Option<String>>,
    pub disable_webhook: Option<bool>,
    pub emit_acks: Option<bool>,
    pub engine_type: Option<EngineType>,
    pub status: Option<StatusType>,
    pub qr_code: Option<Option<String>>,
    pub url_code: Option<Option<String>>,
    pub progress_sync: Option<u32>,
    pub max_sync_timeout: Option<u32>,
    pub connection_attempts: Option<u32>,
    pub connected: Option<bool>,
    pub lock_initial_sync: Option<bool>,
    pub new_login: Option<bool>,
}

impl InstancePatch {
    /// Whether applying this patch would change nothing
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn status(mut self, status: StatusType) -> Self {
        self.status = Some(status);
        self
    }

    pub fn webhook_url(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = Some(Some(url.into()));
        self
    }

    pub fn progress_sync(mut self, percent: u32) -> Self {
        self.progress_sync = Some(percent);
        self
    }

    pub fn connected(mut self, connected: bool) -> Self {
        self.connected = Some(connected);
        self
    }

    /// Clear the pairing artifacts
    pub fn clear_qr(mut self) -> Self {
        self.qr_code = Some(None);
        self.url_code = Some(None);
        self
    }
}

/// Request to start (or resume) an instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub instance_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_webhook: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emit_acks: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_type: Option<EngineType>,

    /// Whether this start stems from a new login (false for restored sessions)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_login: Option<bool>,
}

impl StartRequest {
    pub fn new(instance_key: impl Into<String>) -> Self {
        Self {
            instance_key: instance_key.into(),
            ..Default::default()
        }
    }

    pub fn with_webhook(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = Some(url.into());
        self
    }
}

/// Result of a `start` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new engine handle was created
    Started,
    /// A live session already exists; nothing was done
    AlreadyRunning,
    /// Another start for this key is still creating its handle
    InProgress,
}

/// Latest pairing challenge for an instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrCode {
    pub success: bool,
    pub message: String,
    pub qrcode: String,
}

/// Registration check result for a target id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredTarget {
    pub exists: bool,
    pub jid: String,
}

/// Canonical "sent message" returned by send operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMessage {
    /// Fully-qualified recipient id
    pub to: String,

    /// Engine-assigned message id
    pub message_id: String,

    pub status: DeliveryStatus,

    /// Normalized content that was sent
    pub message: serde_json::Value,
}
