//! Messaging engine capability, the core abstraction for engine backends
//!
//! An `Engine` creates one `EngineHandle` per instance. Handles push their
//! callbacks through `EngineCallbacks` onto the instance's processing queue
//! and accept lifecycle and send commands.

use crate::error::{Result, SessionError};
use crate::types::{EngineType, PresenceType};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub mod command;
pub mod event;
pub mod memory;

pub use command::{
    ButtonsCommand, EngineButton, LinkPreview, LinkPreviewMode, ListCommand, MediaCommand,
    RegistrationStatus, SendReceipt, TextCommand,
};
pub use event::{EngineEvent, EngineStatus, InboundAck, InboundCall, InboundMessage, SocketState};

/// Core trait for engine backends
///
/// Implementations own the transport-specific pairing, browser and
/// protocol details. The `SessionManager` selects one by `EngineType`.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Engine type this backend serves
    fn engine_type(&self) -> EngineType;

    /// Open a session for an instance
    ///
    /// Callbacks may fire before this returns (e.g., the first QR).
    async fn create(
        &self,
        options: EngineOptions,
        callbacks: EngineCallbacks,
    ) -> Result<Arc<dyn EngineHandle>>;
}

/// Live engine session for one instance
#[async_trait]
pub trait EngineHandle: Send + Sync {
    /// Release the session (browser, sockets); the only teardown path
    async fn close(&self) -> Result<()>;

    /// Unpair the device and end the session
    async fn logout(&self) -> Result<()>;

    async fn is_connected(&self) -> Result<bool>;

    /// Reclaim the session when another client took it over
    async fn take_over(&self) -> Result<()>;

    /// This instance's own account id, once paired
    async fn own_id(&self) -> Result<Option<String>>;

    async fn check_registered(&self, id: &str) -> Result<RegistrationStatus>;

    async fn send_text(&self, to: &str, command: &TextCommand) -> Result<SendReceipt>;

    async fn send_media(&self, to: &str, command: &MediaCommand) -> Result<SendReceipt>;

    async fn send_buttons(&self, to: &str, command: &ButtonsCommand) -> Result<SendReceipt>;

    async fn send_list(&self, to: &str, command: &ListCommand) -> Result<SendReceipt>;

    async fn subscribe_presence(&self, ids: &[String]) -> Result<()>;

    /// Ids of all chats known to the session
    async fn chat_ids(&self) -> Result<Vec<String>>;

    async fn update_presence(&self, to: &str, presence: PresenceType) -> Result<()>;
}

/// Options passed to `Engine::create`
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub instance_key: String,

    /// Per-instance directory for credentials and browser profile
    pub session_dir: PathBuf,

    /// Device name announced to the network
    pub device_name: Option<String>,

    /// Close the session when pairing is not completed within this interval
    pub auto_close: Duration,
}

/// Callback sink handed to an engine
///
/// Every callback becomes an `EngineEvent` on the instance's queue, so they
/// are processed strictly in arrival order. Sends never block; once the
/// instance's worker is gone, callbacks are silently dropped.
#[derive(Debug, Clone)]
pub struct EngineCallbacks {
    instance_key: Arc<str>,
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl EngineCallbacks {
    /// Create a callback sink and the receiving end of its queue
    pub fn channel(instance_key: &str) -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                instance_key: Arc::from(instance_key),
                tx,
            },
            rx,
        )
    }

    pub fn instance_key(&self) -> &str {
        &self.instance_key
    }

    /// Push a pre-built event
    pub fn emit(&self, event: EngineEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!(
                instance_key = %self.instance_key,
                "Session queue closed, dropping engine callback"
            );
        }
    }

    pub fn on_pairing_challenge(&self, qr_code: &str, url_code: &str, attempt: u32) {
        self.emit(EngineEvent::PairingChallenge {
            qr_code: qr_code.to_string(),
            url_code: url_code.to_string(),
            attempt,
        });
    }

    pub fn on_load_progress(&self, percent: u32, message: &str) {
        self.emit(EngineEvent::LoadProgress {
            percent,
            message: message.to_string(),
        });
    }

    pub fn on_status_change(&self, status: &str) {
        self.emit(EngineEvent::StatusChange(EngineStatus::parse(status)));
    }

    pub fn on_state_change(&self, state: &str) {
        self.emit(EngineEvent::LowLevelState(SocketState::parse(state)));
    }

    pub fn on_message(&self, message: InboundMessage) {
        self.emit(EngineEvent::InboundMessage(message));
    }

    pub fn on_ack(&self, ack: InboundAck) {
        self.emit(EngineEvent::InboundAck(ack));
    }

    pub fn on_incoming_call(&self, call: InboundCall) {
        self.emit(EngineEvent::InboundCall(call));
    }
}

/// Registry of engine backends keyed by `EngineType`
#[derive(Default)]
pub struct EngineFactory {
    engines: HashMap<EngineType, Arc<dyn Engine>>,
}

impl EngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend, replacing any previous one for the same type
    pub fn register(&mut self, engine: Arc<dyn Engine>) {
        self.engines.insert(engine.engine_type(), engine);
    }

    /// Builder-style `register`
    pub fn with(mut self, engine: Arc<dyn Engine>) -> Self {
        self.register(engine);
        self
    }

    /// Find the backend for an engine type
    pub fn get(&self, engine_type: EngineType) -> Result<Arc<dyn Engine>> {
        self.engines.get(&engine_type).cloned().ok_or_else(|| {
            SessionError::EngineUnavailable(format!("No engine registered for '{}'", engine_type))
        })
    }

    /// All registered engine types
    pub fn engine_types(&self) -> Vec<EngineType> {
        self.engines.keys().copied().collect()
    }
}
