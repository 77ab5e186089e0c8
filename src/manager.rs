//! SessionManager: connection lifecycle controller
//!
//! Provides the control surface over all instances: start, refresh, reset,
//! logout, delete and bulk cleanup, plus the send operations that resolve a
//! target through the registration check before calling the engine.

use crate::config::ManagerConfig;
use crate::engine::{EngineCallbacks, EngineFactory, EngineHandle, EngineOptions};
use crate::error::{Result, SessionError};
use crate::message::outbound::{
    self, ButtonMessage, LinkPreviewMessage, ListMessage, MediaMessage, PresenceUpdate,
    TextMessage,
};
use crate::message::{is_group_id, normalize_target_id};
use crate::registry::{InstanceRegistry, StartClaim};
use crate::session::{self, SessionContext};
use crate::storage::{validate_instance_key, SessionStorage};
use crate::types::{
    ConnectionRecord, EngineType, QrCode, RegisteredTarget, SentMessage, StartOutcome,
    StartRequest,
};
use crate::webhook::{HttpWebhookTransport, WebhookDispatcher, WebhookTransport};
use std::sync::Arc;

/// Lifecycle controller for every instance in the process
pub struct SessionManager {
    config: ManagerConfig,
    engines: EngineFactory,
    storage: SessionStorage,
    ctx: SessionContext,
}

impl SessionManager {
    /// Create a manager with an explicit webhook transport
    pub fn new(
        config: ManagerConfig,
        engines: EngineFactory,
        transport: Arc<dyn WebhookTransport>,
    ) -> Self {
        let storage = SessionStorage::new(config.session_root.clone());
        Self {
            config,
            engines,
            storage,
            ctx: SessionContext {
                registry: Arc::new(InstanceRegistry::new()),
                dispatcher: Arc::new(WebhookDispatcher::new(transport)),
            },
        }
    }

    /// Create a manager delivering webhooks over HTTP
    pub fn with_http_webhooks(config: ManagerConfig, engines: EngineFactory) -> Result<Self> {
        let transport = HttpWebhookTransport::new(config.webhook_timeout())?;
        Ok(Self::new(config, engines, Arc::new(transport)))
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<InstanceRegistry> {
        &self.ctx.registry
    }

    pub fn storage(&self) -> &SessionStorage {
        &self.storage
    }

    pub fn engines(&self) -> &EngineFactory {
        &self.engines
    }

    // ─── Lifecycle ──────────────────────────────────────────────────

    /// Start (or resume) an instance
    ///
    /// Creates the record when absent. A start against a live session or
    /// one that is still being created succeeds without side effects.
    pub async fn start(&self, request: StartRequest) -> Result<StartOutcome> {
        validate_instance_key(&request.instance_key)?;
        let key = request.instance_key.clone();

        let (record, created) = self.ctx.registry.insert_if_absent(self.new_record(&request));
        if created {
            tracing::info!(
                instance_key = %key,
                engine_type = %record.engine_type,
                "Instance registered"
            );
        }

        let engine = self.engines.get(record.engine_type)?;

        let (session, stale) = match self.ctx.registry.claim_start(&key) {
            StartClaim::Missing => return Err(SessionError::NotFound(key)),
            StartClaim::Live => {
                tracing::debug!(instance_key = %key, "Session already running");
                return Ok(StartOutcome::AlreadyRunning);
            }
            StartClaim::InFlight => {
                tracing::debug!(instance_key = %key, "Session start already in progress");
                return Ok(StartOutcome::InProgress);
            }
            StartClaim::Claimed { session, stale } => (session, stale),
        };

        if let Some(stale) = stale {
            tracing::info!(instance_key = %key, "Closing stale session before restart");
            if let Err(e) = stale.close().await {
                tracing::warn!(instance_key = %key, error = %e, "Failed to close stale session");
            }
        }

        let (callbacks, events) = EngineCallbacks::channel(&key);
        tokio::spawn(session::run(self.ctx.clone(), key.clone(), session, events));

        let options = EngineOptions {
            instance_key: key.clone(),
            session_dir: self.storage.session_dir(record.engine_type, &key),
            device_name: self.config.device_name.clone(),
            auto_close: self.config.auto_close(),
        };

        let handle = match engine.create(options, callbacks).await {
            Ok(handle) => handle,
            Err(e) => {
                self.ctx.registry.abort_start(&key, session);
                tracing::warn!(instance_key = %key, error = %e, "Failed to create engine session");
                return Err(SessionError::lifecycle("start", key, e));
            }
        };

        if !self.ctx.registry.complete_start(&key, session, handle.clone()) {
            // Reset, refreshed or removed while the engine was launching
            if let Err(e) = handle.close().await {
                tracing::warn!(instance_key = %key, error = %e, "Failed to close orphaned session");
            }
            return Err(SessionError::lifecycle(
                "start",
                key,
                "instance changed while the session was starting",
            ));
        }

        tracing::info!(instance_key = %key, session, "Instance started");
        Ok(StartOutcome::Started)
    }

    /// Tear down the engine session and start it again
    pub async fn refresh(&self, key: &str) -> Result<StartOutcome> {
        let record = self.teardown(key).await?;
        tokio::time::sleep(self.config.refresh_delay()).await;

        tracing::info!(instance_key = %key, "Restarting instance after refresh");
        self.restart(record)
            .await
            .map_err(|e| SessionError::lifecycle("refresh", key, e))
    }

    /// Tear down the session, wipe its stored credentials and start again
    pub async fn reset(&self, key: &str) -> Result<StartOutcome> {
        let record = self.teardown(key).await?;
        self.storage
            .remove(record.engine_type, key)
            .await
            .map_err(|e| SessionError::lifecycle("reset", key, e))?;
        tokio::time::sleep(self.config.reset_delay()).await;

        tracing::info!(instance_key = %key, "Restarting instance after reset");
        self.restart(record)
            .await
            .map_err(|e| SessionError::lifecycle("reset", key, e))
    }

    /// Unpair the device and remove the instance
    ///
    /// A failed engine logout keeps the record.
    pub async fn logout(&self, key: &str) -> Result<()> {
        if !self.ctx.registry.contains(key) {
            return Err(SessionError::NotFound(key.to_string()));
        }

        if let Some(handle) = self.ctx.registry.handle(key) {
            handle
                .logout()
                .await
                .map_err(|e| SessionError::lifecycle("logout", key, e))?;
        }

        self.ctx.registry.remove(key);
        tracing::info!(instance_key = %key, "Instance logged out");
        Ok(())
    }

    /// Remove an instance whatever state its engine is in
    ///
    /// Falls back to closing the session and wiping its directory when the
    /// logout fails or no session exists. Always succeeds for a known key.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let removed = self
            .ctx
            .registry
            .remove(key)
            .ok_or_else(|| SessionError::NotFound(key.to_string()))?;

        let logged_out = match removed.handle {
            Some(handle) => match handle.logout().await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(instance_key = %key, error = %e, "Logout failed, forcing close");
                    if let Err(e) = handle.close().await {
                        tracing::warn!(instance_key = %key, error = %e, "Failed to close session");
                    }
                    false
                }
            },
            None => false,
        };

        if !logged_out {
            if let Err(e) = self.storage.remove(removed.record.engine_type, key).await {
                tracing::warn!(instance_key = %key, error = %e, "Failed to remove session directory");
            }
        }

        tracing::info!(instance_key = %key, "Instance deleted");
        Ok(())
    }

    /// Remove every stored instance that is not connected
    ///
    /// Returns the keys whose directory was removed.
    pub async fn delete_offline_instances(&self, engine_type: EngineType) -> Result<Vec<String>> {
        let mut removed = Vec::new();

        for key in self.storage.list_keys(engine_type).await? {
            if self
                .ctx
                .registry
                .get(&key)
                .is_some_and(|record| record.connected)
            {
                continue;
            }

            if let Some(instance) = self.ctx.registry.remove(&key) {
                if let Some(handle) = instance.handle {
                    if let Err(e) = handle.close().await {
                        tracing::warn!(instance_key = %key, error = %e, "Failed to close session");
                    }
                }
            }

            match self.storage.remove(engine_type, &key).await {
                Ok(()) => removed.push(key),
                Err(e) => {
                    tracing::warn!(instance_key = %key, error = %e, "Failed to remove offline instance")
                }
            }
        }

        tracing::info!(
            engine_type = %engine_type,
            count = removed.len(),
            "Offline instances removed"
        );
        Ok(removed)
    }

    // ─── Queries ────────────────────────────────────────────────────

    /// Latest pairing challenge
    pub fn get_qr(&self, key: &str) -> Result<QrCode> {
        let record = self.get_instance(key)?;
        Ok(match record.qr_code {
            Some(qrcode) => QrCode {
                success: true,
                message: "QR code generated successfully".to_string(),
                qrcode,
            },
            None => QrCode {
                success: false,
                message: "Qrcode not found.".to_string(),
                qrcode: String::new(),
            },
        })
    }

    pub fn get_instance(&self, key: &str) -> Result<ConnectionRecord> {
        self.ctx
            .registry
            .get(key)
            .ok_or_else(|| SessionError::NotFound(key.to_string()))
    }

    /// Snapshots of all instances, ordered by key
    pub fn list_instances(&self) -> Vec<ConnectionRecord> {
        let mut records = self.ctx.registry.list();
        records.sort_by(|a, b| a.instance_key.cmp(&b.instance_key));
        records
    }

    /// Ask the engine whether the session is up
    pub async fn is_connected(&self, key: &str) -> Result<bool> {
        self.get_instance(key)?;
        match self.ctx.registry.handle(key) {
            Some(handle) => handle.is_connected().await,
            None => Ok(false),
        }
    }

    /// Resolve a target id on the network
    pub async fn is_registered(&self, key: &str, target: &str) -> Result<RegisteredTarget> {
        let handle = self.live_handle(key)?;
        resolve_target(handle.as_ref(), target).await
    }

    // ─── Sends ──────────────────────────────────────────────────────

    pub async fn send_text(&self, key: &str, message: &TextMessage) -> Result<SentMessage> {
        let handle = self.live_handle(key)?;
        let to = resolve_target(handle.as_ref(), &message.to).await?.jid;
        let receipt = handle.send_text(&to, &message.to_command()).await?;
        tracing::debug!(instance_key = %key, to = %to, message_id = %receipt.id, "Text sent");
        Ok(outbound::sent_message(&to, receipt, message.content()))
    }

    pub async fn send_link_preview(
        &self,
        key: &str,
        message: &LinkPreviewMessage,
    ) -> Result<SentMessage> {
        let handle = self.live_handle(key)?;
        let to = resolve_target(handle.as_ref(), &message.to).await?.jid;
        let receipt = handle.send_text(&to, &message.to_command()).await?;
        tracing::debug!(instance_key = %key, to = %to, message_id = %receipt.id, "Link preview sent");
        Ok(outbound::sent_message(&to, receipt, message.content()))
    }

    pub async fn send_media(&self, key: &str, message: &MediaMessage) -> Result<SentMessage> {
        let handle = self.live_handle(key)?;
        let to = resolve_target(handle.as_ref(), &message.to).await?.jid;
        let receipt = handle.send_media(&to, &message.to_command()).await?;
        tracing::debug!(instance_key = %key, to = %to, message_id = %receipt.id, "Media sent");
        Ok(outbound::sent_message(&to, receipt, message.content()))
    }

    pub async fn send_buttons(&self, key: &str, message: &ButtonMessage) -> Result<SentMessage> {
        let handle = self.live_handle(key)?;
        let to = resolve_target(handle.as_ref(), &message.to).await?.jid;
        let receipt = handle.send_buttons(&to, &message.to_command()).await?;
        tracing::debug!(instance_key = %key, to = %to, message_id = %receipt.id, "Buttons sent");
        Ok(outbound::sent_message(&to, receipt, message.content()))
    }

    pub async fn send_list(&self, key: &str, message: &ListMessage) -> Result<SentMessage> {
        let handle = self.live_handle(key)?;
        let to = resolve_target(handle.as_ref(), &message.to).await?.jid;
        let receipt = handle.send_list(&to, &message.to_command()).await?;
        tracing::debug!(instance_key = %key, to = %to, message_id = %receipt.id, "List sent");
        Ok(outbound::sent_message(&to, receipt, message.content()))
    }

    /// Subscribe to presence updates of the given targets
    ///
    /// Returns the resolved ids.
    pub async fn presence_subscribe(&self, key: &str, targets: &[String]) -> Result<Vec<String>> {
        let handle = self.live_handle(key)?;
        let mut ids = Vec::with_capacity(targets.len());
        for target in targets {
            ids.push(resolve_target(handle.as_ref(), target).await?.jid);
        }
        handle.subscribe_presence(&ids).await?;
        Ok(ids)
    }

    /// Subscribe to presence updates of every known chat
    pub async fn presence_subscribe_all(&self, key: &str) -> Result<Vec<String>> {
        let handle = self.live_handle(key)?;
        let ids = handle.chat_ids().await?;
        handle.subscribe_presence(&ids).await?;
        tracing::debug!(instance_key = %key, count = ids.len(), "Subscribed to all chats");
        Ok(ids)
    }

    pub async fn update_presence(&self, key: &str, update: &PresenceUpdate) -> Result<()> {
        let handle = self.live_handle(key)?;
        let to = resolve_target(handle.as_ref(), &update.to).await?.jid;
        handle.update_presence(&to, update.presence).await
    }

    // ─── Internals ──────────────────────────────────────────────────

    fn new_record(&self, request: &StartRequest) -> ConnectionRecord {
        let mut record = ConnectionRecord::new(request.instance_key.clone());
        record.webhook_url = request
            .webhook_url
            .clone()
            .or_else(|| self.config.webhook_url.clone());
        record.disable_webhook = request
            .disable_webhook
            .unwrap_or(self.config.disable_webhook);
        record.emit_acks = request.emit_acks.unwrap_or(self.config.emit_acks);
        record.engine_type = request.engine_type.unwrap_or_default();
        record.new_login = request.new_login.unwrap_or(true);
        record
    }

    /// Reset a record in place and close its session
    async fn teardown(&self, key: &str) -> Result<ConnectionRecord> {
        let (record, handle) = self
            .ctx
            .registry
            .reset(key)
            .ok_or_else(|| SessionError::NotFound(key.to_string()))?;

        if let Some(handle) = handle {
            if let Err(e) = handle.close().await {
                tracing::warn!(instance_key = %key, error = %e, "Failed to close session");
            }
        }
        Ok(record)
    }

    async fn restart(&self, record: ConnectionRecord) -> Result<StartOutcome> {
        if !self.ctx.registry.contains(&record.instance_key) {
            return Err(SessionError::NotFound(record.instance_key));
        }
        self.start(StartRequest {
            instance_key: record.instance_key,
            webhook_url: record.webhook_url,
            disable_webhook: Some(record.disable_webhook),
            emit_acks: Some(record.emit_acks),
            engine_type: Some(record.engine_type),
            new_login: Some(record.new_login),
        })
        .await
    }

    fn live_handle(&self, key: &str) -> Result<Arc<dyn EngineHandle>> {
        if !self.ctx.registry.contains(key) {
            return Err(SessionError::NotFound(key.to_string()));
        }
        self.ctx.registry.handle(key).ok_or_else(|| {
            SessionError::EngineUnavailable(format!("Instance '{}' has no active session", key))
        })
    }
}

/// Normalize a target and confirm it exists on the network
async fn resolve_target(handle: &dyn EngineHandle, target: &str) -> Result<RegisteredTarget> {
    let id = normalize_target_id(target);
    if is_group_id(&id) {
        return Ok(RegisteredTarget {
            exists: true,
            jid: id,
        });
    }

    let status = handle.check_registered(&id).await?;
    if !status.exists {
        return Err(SessionError::Unregistered(id));
    }
    Ok(RegisteredTarget {
        exists: true,
        jid: normalize_target_id(&status.canonical_id),
    })
}
