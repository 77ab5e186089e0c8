//! In-memory engine for testing and single-process use
//!
//! `MemoryEngine` never touches a network. Each created `MemoryHandle`
//! records the commands it receives, and tests drive the session by firing
//! callbacks through `MemoryHandle::callbacks()`.

use super::{
    ButtonsCommand, Engine, EngineCallbacks, EngineHandle, EngineOptions, ListCommand,
    MediaCommand, RegistrationStatus, SendReceipt, TextCommand,
};
use crate::error::{Result, SessionError};
use crate::types::{EngineType, PresenceType};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// A command recorded by a `MemoryHandle`
#[derive(Debug, Clone, PartialEq)]
pub enum SentCommand {
    Text { to: String, command: TextCommand },
    Media { to: String, command: MediaCommand },
    Buttons { to: String, command: ButtonsCommand },
    List { to: String, command: ListCommand },
    SubscribePresence { ids: Vec<String> },
    Presence { to: String, presence: PresenceType },
}

#[derive(Default)]
struct EngineState {
    handles: Mutex<HashMap<String, Arc<MemoryHandle>>>,
    created: AtomicUsize,
    fail_create: AtomicBool,
    fail_logout: AtomicBool,
    unregistered: Mutex<HashSet<String>>,
}

/// In-memory engine
///
/// Cloning shares state, so a test can keep one clone for inspection and
/// hand another to the `EngineFactory`.
#[derive(Clone, Default)]
pub struct MemoryEngine {
    state: Arc<EngineState>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total handles created since construction
    pub fn created_count(&self) -> usize {
        self.state.created.load(Ordering::SeqCst)
    }

    /// Most recent handle created for an instance
    pub fn handle(&self, instance_key: &str) -> Option<Arc<MemoryHandle>> {
        lock(&self.state.handles).get(instance_key).cloned()
    }

    /// Make subsequent `create` calls fail
    pub fn set_fail_create(&self, fail: bool) {
        self.state.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Make `logout` fail on all handles
    pub fn set_fail_logout(&self, fail: bool) {
        self.state.fail_logout.store(fail, Ordering::SeqCst);
    }

    /// Report a target id as not registered on the network
    pub fn mark_unregistered(&self, id: impl Into<String>) {
        lock(&self.state.unregistered).insert(id.into());
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    fn engine_type(&self) -> EngineType {
        EngineType::Wppconnect
    }

    async fn create(
        &self,
        options: EngineOptions,
        callbacks: EngineCallbacks,
    ) -> Result<Arc<dyn EngineHandle>> {
        if self.state.fail_create.load(Ordering::SeqCst) {
            return Err(SessionError::EngineUnavailable(format!(
                "Failed to launch session for '{}'",
                options.instance_key
            )));
        }

        let handle = Arc::new(MemoryHandle {
            instance_key: options.instance_key.clone(),
            options,
            callbacks: Mutex::new(Some(callbacks)),
            engine: self.state.clone(),
            closed: AtomicBool::new(false),
            logged_out: AtomicBool::new(false),
            take_overs: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            chats: Mutex::new(Vec::new()),
        });

        self.state.created.fetch_add(1, Ordering::SeqCst);
        lock(&self.state.handles).insert(handle.instance_key.clone(), handle.clone());
        Ok(handle)
    }
}

/// Handle created by `MemoryEngine`
pub struct MemoryHandle {
    instance_key: String,
    options: EngineOptions,
    callbacks: Mutex<Option<EngineCallbacks>>,
    engine: Arc<EngineState>,
    closed: AtomicBool,
    logged_out: AtomicBool,
    take_overs: AtomicUsize,
    sent: Mutex<Vec<SentCommand>>,
    chats: Mutex<Vec<String>>,
}

impl MemoryHandle {
    /// Callback sink for simulating engine events; `None` once closed
    pub fn callbacks(&self) -> Option<EngineCallbacks> {
        lock(&self.callbacks).clone()
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_logged_out(&self) -> bool {
        self.logged_out.load(Ordering::SeqCst)
    }

    pub fn take_over_count(&self) -> usize {
        self.take_overs.load(Ordering::SeqCst)
    }

    /// Commands received so far
    pub fn sent(&self) -> Vec<SentCommand> {
        lock(&self.sent).clone()
    }

    /// Seed the chat list returned by `chat_ids`
    pub fn set_chats(&self, ids: Vec<String>) {
        *lock(&self.chats) = ids;
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(SessionError::EngineUnavailable(format!(
                "Session '{}' is closed",
                self.instance_key
            )));
        }
        Ok(())
    }

    fn record(&self, command: SentCommand) -> Result<SendReceipt> {
        self.ensure_open()?;
        let mut sent = lock(&self.sent);
        sent.push(command);
        Ok(SendReceipt {
            id: format!("true_{}_{}", self.instance_key, sent.len()),
            content: serde_json::Value::Null,
        })
    }
}

#[async_trait]
impl EngineHandle for MemoryHandle {
    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        // Dropping the sink ends the instance's callback queue
        lock(&self.callbacks).take();
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        if self.engine.fail_logout.load(Ordering::SeqCst) {
            return Err(SessionError::EngineUnavailable(format!(
                "Browser for '{}' is not responding",
                self.instance_key
            )));
        }
        self.logged_out.store(true, Ordering::SeqCst);
        self.close().await
    }

    async fn is_connected(&self) -> Result<bool> {
        Ok(!self.is_closed() && !self.is_logged_out())
    }

    async fn take_over(&self) -> Result<()> {
        self.ensure_open()?;
        self.take_overs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn own_id(&self) -> Result<Option<String>> {
        Ok(Some(format!("{}@c.us", self.instance_key)))
    }

    async fn check_registered(&self, id: &str) -> Result<RegistrationStatus> {
        self.ensure_open()?;
        let user = id.split('@').next().unwrap_or(id).to_string();
        let exists = !lock(&self.engine.unregistered).contains(&user);
        Ok(RegistrationStatus {
            exists,
            canonical_id: user,
        })
    }

    async fn send_text(&self, to: &str, command: &TextCommand) -> Result<SendReceipt> {
        self.record(SentCommand::Text {
            to: to.to_string(),
            command: command.clone(),
        })
    }

    async fn send_media(&self, to: &str, command: &MediaCommand) -> Result<SendReceipt> {
        self.record(SentCommand::Media {
            to: to.to_string(),
            command: command.clone(),
        })
    }

    async fn send_buttons(&self, to: &str, command: &ButtonsCommand) -> Result<SendReceipt> {
        self.record(SentCommand::Buttons {
            to: to.to_string(),
            command: command.clone(),
        })
    }

    async fn send_list(&self, to: &str, command: &ListCommand) -> Result<SendReceipt> {
        self.record(SentCommand::List {
            to: to.to_string(),
            command: command.clone(),
        })
    }

    async fn subscribe_presence(&self, ids: &[String]) -> Result<()> {
        self.record(SentCommand::SubscribePresence { ids: ids.to_vec() })
            .map(|_| ())
    }

    async fn chat_ids(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        Ok(lock(&self.chats).clone())
    }

    async fn update_presence(&self, to: &str, presence: PresenceType) -> Result<()> {
        self.record(SentCommand::Presence {
            to: to.to_string(),
            presence,
        })
        .map(|_| ())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
