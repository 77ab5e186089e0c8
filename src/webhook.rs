//! Webhook delivery
//!
//! `WebhookTransport` is the delivery boundary (one POST attempt, no retry).
//! `WebhookDispatcher` decides whether an instance wants the event and fires
//! the delivery without awaiting it; failures are logged and dropped.

use crate::envelope::Envelope;
use crate::error::{Result, SessionError};
use crate::types::ConnectionRecord;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Delivers an envelope to a webhook URL
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn deliver(&self, url: &str, envelope: &Envelope) -> Result<()>;
}

/// JSON-over-HTTP transport backed by `reqwest`
pub struct HttpWebhookTransport {
    client: reqwest::Client,
}

impl HttpWebhookTransport {
    /// Build a transport with a per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SessionError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookTransport for HttpWebhookTransport {
    async fn deliver(&self, url: &str, envelope: &Envelope) -> Result<()> {
        let response = self
            .client
            .post(url)
            .json(envelope)
            .send()
            .await
            .map_err(|e| SessionError::Delivery {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::Delivery {
                url: url.to_string(),
                reason: format!("HTTP {}", status),
            });
        }

        Ok(())
    }
}

/// In-memory transport for testing
///
/// Records every delivered envelope; can be switched to fail.
#[derive(Default)]
pub struct MemoryWebhookTransport {
    deliveries: Mutex<Vec<(String, Envelope)>>,
    fail: std::sync::atomic::AtomicBool,
    notify: Notify,
}

impl MemoryWebhookTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every delivery fail
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// All recorded `(url, envelope)` pairs in completion order
    pub fn deliveries(&self) -> Vec<(String, Envelope)> {
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self) -> usize {
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Wait until at least `count` deliveries were recorded
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if self.count() >= count {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.count() >= count;
            }
        }
    }
}

#[async_trait]
impl WebhookTransport for MemoryWebhookTransport {
    async fn deliver(&self, url: &str, envelope: &Envelope) -> Result<()> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(SessionError::Delivery {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((url.to_string(), envelope.clone()));
        self.notify.notify_waiters();
        Ok(())
    }
}

/// Routes envelopes to an instance's webhook
pub struct WebhookDispatcher {
    transport: Arc<dyn WebhookTransport>,
}

impl WebhookDispatcher {
    pub fn new(transport: Arc<dyn WebhookTransport>) -> Self {
        Self { transport }
    }

    /// Fire a delivery for `record` without waiting for it
    ///
    /// Returns `None` when the instance has webhooks disabled or no URL.
    pub fn dispatch(&self, record: &ConnectionRecord, envelope: Envelope) -> Option<JoinHandle<()>> {
        if record.disable_webhook {
            tracing::debug!(
                instance_key = %record.instance_key,
                event_id = %envelope.event_id,
                "Webhook disabled, skipping event"
            );
            return None;
        }

        let Some(url) = record.webhook_url.clone() else {
            tracing::debug!(
                instance_key = %record.instance_key,
                event_id = %envelope.event_id,
                "No webhook URL configured, skipping event"
            );
            return None;
        };

        let transport = self.transport.clone();
        Some(tokio::spawn(async move {
            match transport.deliver(&url, &envelope).await {
                Ok(()) => tracing::debug!(
                    instance_key = %envelope.instance_key,
                    event_id = %envelope.event_id,
                    event_type = ?envelope.event_type,
                    "Webhook delivered"
                ),
                Err(e) => tracing::warn!(
                    instance_key = %envelope.instance_key,
                    event_id = %envelope.event_id,
                    event_type = ?envelope.event_type,
                    error = %e,
                    "Webhook delivery failed"
                ),
            }
        }))
    }
}
