//! Session state machine
//!
//! `transition` folds one engine callback into a record patch, an optional
//! webhook event and an optional engine side effect. It is pure: the same
//! record and event always produce the same `Transition`.
//!
//! `run` is the per-instance worker. It drains the instance's callback
//! queue in order, commits each patch atomically through the registry,
//! performs the side effect and then hands the envelope to the dispatcher.

use crate::engine::{EngineEvent, EngineStatus, SocketState};
use crate::envelope;
use crate::message::inbound;
use crate::registry::InstanceRegistry;
use crate::types::{ConnectionRecord, EventType, InstancePatch, StatusType};
use crate::webhook::WebhookDispatcher;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Prefix of canonical QR payloads
pub const QR_PREFIX: &str = "data:image/png;base64,";

/// Engine side effect requested by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Detach and close the engine handle
    ReleaseHandle,
    /// Reclaim the session from another client
    TakeOver,
}

/// Outcome of folding one engine event into a record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transition {
    pub patch: InstancePatch,
    pub emit: Option<(EventType, Value)>,
    pub effect: Option<Effect>,
}

impl Transition {
    fn none() -> Self {
        Self::default()
    }

    fn patch(patch: InstancePatch) -> Self {
        Self {
            patch,
            ..Default::default()
        }
    }

    fn emit(mut self, event_type: EventType, body: Value) -> Self {
        self.emit = Some((event_type, body));
        self
    }

    fn effect(mut self, effect: Effect) -> Self {
        self.effect = Some(effect);
        self
    }
}

/// Compute the transition for `event` applied to `record`
pub fn transition(record: &ConnectionRecord, event: &EngineEvent) -> Transition {
    match event {
        EngineEvent::PairingChallenge {
            qr_code,
            url_code,
            attempt,
        } => {
            let qr = canonical_qr(qr_code);
            let patch = InstancePatch {
                status: Some(StatusType::Connecting),
                qr_code: Some(Some(qr.clone())),
                url_code: Some(Some(url_code.clone())),
                connection_attempts: Some(*attempt),
                ..Default::default()
            };
            Transition::patch(patch).emit(
                EventType::Qrcode,
                json!({ "status": StatusType::Connecting, "qrcode": qr }),
            )
        }

        EngineEvent::LoadProgress { percent, .. } => Transition::patch(
            InstancePatch::default()
                .status(StatusType::Synchronizing)
                .progress_sync(*percent),
        )
        .emit(
            EventType::Connection,
            json!({
                "status": StatusType::Synchronizing,
                "progressSync": percent,
                "maxSyncTimeout": record.max_sync_timeout,
            }),
        ),

        EngineEvent::StatusChange(status) => status_transition(record, status),

        EngineEvent::LowLevelState(state) => match state {
            SocketState::Conflict => Transition::none().effect(Effect::TakeOver),
            SocketState::Unpaired | SocketState::UnpairedIdle => Transition::patch(
                InstancePatch::default()
                    .status(StatusType::Disconnected)
                    .connected(false)
                    .clear_qr(),
            )
            .emit(EventType::Connection, disconnected_body()),
            SocketState::Connected | SocketState::Other(_) => Transition::none(),
        },

        EngineEvent::InboundMessage(message) => match inbound::normalize_message(message) {
            Some(body) => Transition::none().emit(EventType::ReceivedMessage, body),
            None => Transition::none(),
        },

        EngineEvent::InboundAck(ack) => {
            if record.emit_acks {
                Transition::none().emit(EventType::MessageDeliveryStatus, inbound::ack_body(ack))
            } else {
                Transition::none()
            }
        }

        EngineEvent::InboundCall(call) => {
            Transition::none().emit(EventType::IncomingCall, inbound::call_body(call))
        }
    }
}

fn status_transition(record: &ConnectionRecord, status: &EngineStatus) -> Transition {
    match status {
        EngineStatus::AutoCloseCalled | EngineStatus::DisconnectedMobile => Transition::patch(
            InstancePatch::default()
                .status(StatusType::Disconnected)
                .connected(false),
        )
        .effect(Effect::ReleaseHandle),

        EngineStatus::BrowserClose | EngineStatus::QrReadFail | EngineStatus::ServerClose => {
            Transition::patch(
                InstancePatch::default()
                    .status(StatusType::Disconnected)
                    .connected(false),
            )
            .emit(EventType::Connection, disconnected_body())
        }

        EngineStatus::NotLogged => {
            let patch = if record.status == StatusType::Connected {
                InstancePatch::default()
                    .status(StatusType::Disconnected)
                    .connected(false)
            } else {
                InstancePatch::default().status(StatusType::Connecting)
            };
            let status = patch.status;
            Transition::patch(patch).emit(EventType::Connection, json!({ "status": status }))
        }

        EngineStatus::IsLogged | EngineStatus::QrReadSuccess => {
            Transition::patch(InstancePatch::default().status(StatusType::Synchronizing)).emit(
                EventType::Connection,
                json!({
                    "status": StatusType::Synchronizing,
                    "progressSync": record.progress_sync,
                }),
            )
        }

        EngineStatus::InChat => {
            let patch = InstancePatch {
                status: Some(StatusType::Connected),
                connected: Some(true),
                lock_initial_sync: Some(true),
                ..Default::default()
            };
            Transition::patch(patch).emit(
                EventType::Connection,
                json!({
                    "status": StatusType::Connected,
                    "progressSync": record.progress_sync,
                }),
            )
        }

        EngineStatus::DeleteToken | EngineStatus::Other(_) => Transition::none(),
    }
}

fn disconnected_body() -> Value {
    json!({ "status": StatusType::Disconnected })
}

/// Re-encode a QR payload as a PNG data URL
///
/// Undecodable payloads are passed through behind the prefix unchanged.
pub fn canonical_qr(qr: &str) -> String {
    let payload = match qr.strip_prefix("data:image/") {
        Some(rest) => rest
            .split_once(";base64,")
            .map(|(_, data)| data)
            .unwrap_or(rest),
        None => qr,
    };

    match STANDARD.decode(payload.trim()) {
        Ok(bytes) => format!("{}{}", QR_PREFIX, STANDARD.encode(bytes)),
        Err(_) => format!("{}{}", QR_PREFIX, payload),
    }
}

/// Shared dependencies of the per-instance workers
#[derive(Clone)]
pub struct SessionContext {
    pub registry: Arc<InstanceRegistry>,
    pub dispatcher: Arc<WebhookDispatcher>,
}

/// Drain one session's callback queue
///
/// Stops when the queue closes (handle released) or when the session is
/// superseded or its record removed.
pub async fn run(
    ctx: SessionContext,
    instance_key: String,
    session: u64,
    mut events: mpsc::UnboundedReceiver<EngineEvent>,
) {
    tracing::debug!(instance_key = %instance_key, session, "Session worker started");

    while let Some(event) = events.recv().await {
        let applied = ctx.registry.modify(&instance_key, session, |record| {
            let transition = transition(record, &event);
            record.apply(&transition.patch);
            (transition, record.clone())
        });

        let Some((transition, record)) = applied else {
            tracing::debug!(
                instance_key = %instance_key,
                session,
                "Session superseded, dropping late callbacks"
            );
            break;
        };

        if let Some(effect) = transition.effect {
            perform(&ctx, &instance_key, session, effect).await;
        }

        if let Some((event_type, mut body)) = transition.emit {
            if event_type == EventType::ReceivedMessage {
                attach_own_id(&ctx, &instance_key, session, &mut body).await;
            }
            let envelope = envelope::build(event_type, &instance_key, body);
            ctx.dispatcher.dispatch(&record, envelope);
        }
    }

    tracing::debug!(instance_key = %instance_key, session, "Session worker stopped");
}

async fn perform(ctx: &SessionContext, instance_key: &str, session: u64, effect: Effect) {
    match effect {
        Effect::ReleaseHandle => {
            let Some(handle) = ctx.registry.release_handle(instance_key, session) else {
                return;
            };
            tracing::info!(instance_key = %instance_key, "Engine closed the session, releasing handle");
            if let Err(e) = handle.close().await {
                tracing::warn!(instance_key = %instance_key, error = %e, "Failed to close handle");
            }
        }
        Effect::TakeOver => {
            let Some(handle) = ctx.registry.session_handle(instance_key, session) else {
                return;
            };
            tracing::info!(instance_key = %instance_key, "Session conflict, taking over");
            if let Err(e) = handle.take_over().await {
                tracing::warn!(instance_key = %instance_key, error = %e, "Failed to take over session");
            }
        }
    }
}

async fn attach_own_id(ctx: &SessionContext, instance_key: &str, session: u64, body: &mut Value) {
    let Some(handle) = ctx.registry.session_handle(instance_key, session) else {
        return;
    };
    match handle.own_id().await {
        Ok(Some(jid)) => {
            if let Value::Object(map) = body {
                map.insert("jid".to_string(), Value::String(jid));
            }
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(instance_key = %instance_key, error = %e, "Failed to resolve own id")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{InboundAck, InboundCall, InboundMessage};

    fn record() -> ConnectionRecord {
        let mut record = ConnectionRecord::new("tenant-a");
        record.webhook_url = Some("https://hook.test".into());
        record
    }

    fn status(s: &str) -> EngineEvent {
        EngineEvent::StatusChange(EngineStatus::parse(s))
    }

    fn emitted_status(t: &Transition) -> Value {
        t.emit.as_ref().unwrap().1["status"].clone()
    }

    #[test]
    fn test_pairing_challenge() {
        let t = transition(
            &record(),
            &EngineEvent::PairingChallenge {
                qr_code: "data:image/png;base64,aGVsbG8=".into(),
                url_code: "2@abc".into(),
                attempt: 2,
            },
        );
        assert_eq!(t.patch.status, Some(StatusType::Connecting));
        assert_eq!(t.patch.connection_attempts, Some(2));
        assert_eq!(t.patch.url_code, Some(Some("2@abc".into())));
        let (event_type, body) = t.emit.unwrap();
        assert_eq!(event_type, EventType::Qrcode);
        assert_eq!(body["status"], "CONNECTING");
        assert_eq!(body["qrcode"], "data:image/png;base64,aGVsbG8=");
    }

    #[test]
    fn test_load_progress() {
        let mut rec = record();
        rec.max_sync_timeout = 30;
        let t = transition(
            &rec,
            &EngineEvent::LoadProgress {
                percent: 40,
                message: "Loading".into(),
            },
        );
        assert_eq!(t.patch.status, Some(StatusType::Synchronizing));
        assert_eq!(t.patch.progress_sync, Some(40));
        let (event_type, body) = t.emit.unwrap();
        assert_eq!(event_type, EventType::Connection);
        assert_eq!(body["progressSync"], 40);
        assert_eq!(body["maxSyncTimeout"], 30);
    }

    #[test]
    fn test_in_chat_connects() {
        let mut rec = record();
        rec.progress_sync = 100;
        let t = transition(&rec, &status("inChat"));
        assert_eq!(t.patch.status, Some(StatusType::Connected));
        assert_eq!(t.patch.connected, Some(true));
        assert_eq!(t.patch.lock_initial_sync, Some(true));
        assert_eq!(emitted_status(&t), "CONNECTED");
        assert_eq!(t.emit.unwrap().1["progressSync"], 100);
    }

    #[test]
    fn test_logged_and_qr_success_synchronize() {
        for s in ["isLogged", "qrReadSuccess"] {
            let t = transition(&record(), &status(s));
            assert_eq!(t.patch.status, Some(StatusType::Synchronizing));
            assert_eq!(emitted_status(&t), "SYNCHRONIZING");
        }
    }

    #[test]
    fn test_not_logged_depends_on_previous_status() {
        let t = transition(&record(), &status("notLogged"));
        assert_eq!(t.patch.status, Some(StatusType::Connecting));
        assert_eq!(emitted_status(&t), "CONNECTING");

        let mut connected = record();
        connected.status = StatusType::Connected;
        let t = transition(&connected, &status("notLogged"));
        assert_eq!(t.patch.status, Some(StatusType::Disconnected));
        assert_eq!(t.patch.connected, Some(false));
        assert_eq!(emitted_status(&t), "DISCONNECTED");
    }

    #[test]
    fn test_close_statuses_emit_disconnected() {
        for s in ["browserClose", "qrReadFail", "serverClose"] {
            let t = transition(&record(), &status(s));
            assert_eq!(t.patch.status, Some(StatusType::Disconnected));
            assert_eq!(emitted_status(&t), "DISCONNECTED");
            assert!(t.effect.is_none());
        }
    }

    #[test]
    fn test_auto_close_releases_silently() {
        for s in ["autocloseCalled", "desconnectedMobile"] {
            let t = transition(&record(), &status(s));
            assert_eq!(t.patch.status, Some(StatusType::Disconnected));
            assert!(t.emit.is_none());
            assert_eq!(t.effect, Some(Effect::ReleaseHandle));
        }
    }

    #[test]
    fn test_ignored_statuses() {
        for s in ["deleteToken", "phoneNotConnected", ""] {
            assert_eq!(transition(&record(), &status(s)), Transition::default());
        }
    }

    #[test]
    fn test_low_level_states() {
        let conflict = transition(&record(), &EngineEvent::LowLevelState(SocketState::Conflict));
        assert!(conflict.patch.is_empty());
        assert!(conflict.emit.is_none());
        assert_eq!(conflict.effect, Some(Effect::TakeOver));

        let mut paired = record();
        paired.qr_code = Some("qr".into());
        for state in [SocketState::Unpaired, SocketState::UnpairedIdle] {
            let t = transition(&paired, &EngineEvent::LowLevelState(state));
            assert_eq!(t.patch.status, Some(StatusType::Disconnected));
            assert_eq!(t.patch.qr_code, Some(None));
            assert_eq!(t.patch.url_code, Some(None));
            assert_eq!(emitted_status(&t), "DISCONNECTED");
        }

        let other = transition(
            &record(),
            &EngineEvent::LowLevelState(SocketState::parse("OPENING")),
        );
        assert_eq!(other, Transition::default());
    }

    #[test]
    fn test_acks_gated_by_record() {
        let ack = EngineEvent::InboundAck(InboundAck {
            id: "m1".into(),
            remote: "5511@c.us".into(),
            from_me: true,
            ack: 4,
        });

        assert!(transition(&record(), &ack).emit.is_none());

        let mut with_acks = record();
        with_acks.emit_acks = true;
        let (event_type, body) = transition(&with_acks, &ack).emit.unwrap();
        assert_eq!(event_type, EventType::MessageDeliveryStatus);
        assert_eq!(body["event"]["update"]["status"], "READ");
    }

    #[test]
    fn test_inbound_message_and_call() {
        let message = EngineEvent::InboundMessage(InboundMessage {
            id: "m1".into(),
            message_type: "chat".into(),
            content: Some("hi".into()),
            sender_id: "5511@c.us".into(),
            push_name: None,
            from_me: false,
            is_group: false,
            list_response: None,
            raw: Value::Null,
        });
        let (event_type, body) = transition(&record(), &message).emit.unwrap();
        assert_eq!(event_type, EventType::ReceivedMessage);
        assert_eq!(body["message"]["conversation"], "hi");

        let call = EngineEvent::InboundCall(InboundCall {
            id: "c1".into(),
            peer_jid: "5511@c.us".into(),
            is_video: false,
            is_group: false,
        });
        let (event_type, _) = transition(&record(), &call).emit.unwrap();
        assert_eq!(event_type, EventType::IncomingCall);
    }

    fn fold(events: &[EngineEvent]) -> (ConnectionRecord, Vec<EventType>) {
        let mut rec = record();
        let mut emitted = Vec::new();
        for event in events {
            let t = transition(&rec, event);
            rec.apply(&t.patch);
            if let Some((event_type, _)) = t.emit {
                emitted.push(event_type);
            }
        }
        (rec, emitted)
    }

    #[test]
    fn test_callback_sequence_is_deterministic() {
        let events = [
            EngineEvent::PairingChallenge {
                qr_code: "aGVsbG8=".into(),
                url_code: "2@abc".into(),
                attempt: 1,
            },
            EngineEvent::LoadProgress {
                percent: 60,
                message: "Loading".into(),
            },
            status("isLogged"),
            status("inChat"),
            status("notLogged"),
        ];

        let (first, first_emitted) = fold(&events);
        let (second, second_emitted) = fold(&events);

        assert_eq!(
            first_emitted,
            vec![
                EventType::Qrcode,
                EventType::Connection,
                EventType::Connection,
                EventType::Connection,
                EventType::Connection,
            ]
        );
        assert_eq!(first_emitted, second_emitted);
        assert_eq!(first.status, StatusType::Disconnected);
        assert!(!first.connected);
        assert_eq!(first.progress_sync, 60);
        assert_eq!(second.status, first.status);
        assert_eq!(second.connected, first.connected);
    }

    #[test]
    fn test_canonical_qr() {
        assert_eq!(
            canonical_qr("data:image/jpeg;base64,aGVsbG8="),
            "data:image/png;base64,aGVsbG8="
        );
        assert_eq!(canonical_qr("aGVsbG8="), "data:image/png;base64,aGVsbG8=");
        assert_eq!(canonical_qr("not base64!"), "data:image/png;base64,not base64!");
    }

    mod worker {
        use super::*;
        use crate::engine::memory::MemoryEngine;
        use crate::engine::{Engine, EngineCallbacks, EngineOptions};
        use crate::registry::StartClaim;
        use crate::webhook::MemoryWebhookTransport;
        use std::time::Duration;

        async fn start(
            key: &str,
        ) -> (
            Arc<InstanceRegistry>,
            Arc<MemoryWebhookTransport>,
            EngineCallbacks,
            MemoryEngine,
        ) {
            let registry = Arc::new(InstanceRegistry::new());
            let transport = Arc::new(MemoryWebhookTransport::new());
            let ctx = SessionContext {
                registry: registry.clone(),
                dispatcher: Arc::new(WebhookDispatcher::new(transport.clone())),
            };
            registry.upsert(key, &InstancePatch::default().webhook_url("https://hook.test"));

            let StartClaim::Claimed { session, .. } = registry.claim_start(key) else {
                panic!("expected claim");
            };
            let (callbacks, rx) = EngineCallbacks::channel(key);
            tokio::spawn(run(ctx, key.to_string(), session, rx));

            let engine = MemoryEngine::new();
            let handle = engine
                .create(
                    EngineOptions {
                        instance_key: key.to_string(),
                        session_dir: std::env::temp_dir(),
                        device_name: None,
                        auto_close: Duration::from_secs(60),
                    },
                    callbacks.clone(),
                )
                .await
                .unwrap();
            registry.complete_start(key, session, handle);
            (registry, transport, callbacks, engine)
        }

        #[tokio::test]
        async fn test_events_delivered_in_order() {
            let (registry, transport, callbacks, _engine) = start("a").await;
            callbacks.on_pairing_challenge("aGVsbG8=", "2@abc", 1);
            callbacks.on_load_progress(50, "sync");
            callbacks.on_status_change("inChat");

            assert!(transport.wait_for(3, Duration::from_secs(2)).await);
            let record = registry.get("a").unwrap();
            assert_eq!(record.status, StatusType::Connected);
            assert!(record.connected);
            assert_eq!(record.progress_sync, 50);

            let types: Vec<EventType> = transport
                .deliveries()
                .iter()
                .map(|(_, e)| e.event_type)
                .collect();
            assert!(types.contains(&EventType::Qrcode));
            assert_eq!(
                types.iter().filter(|t| **t == EventType::Connection).count(),
                2
            );
        }

        #[tokio::test]
        async fn test_received_message_carries_own_id() {
            let (_registry, transport, callbacks, _engine) = start("a").await;
            callbacks.on_message(InboundMessage {
                id: "m1".into(),
                message_type: "chat".into(),
                content: Some("hi".into()),
                sender_id: "5511@c.us".into(),
                push_name: None,
                from_me: false,
                is_group: false,
                list_response: None,
                raw: Value::Null,
            });

            assert!(transport.wait_for(1, Duration::from_secs(2)).await);
            let (_, envelope) = transport.deliveries().remove(0);
            assert_eq!(envelope.get("jid").unwrap(), "a@c.us");
        }

        #[tokio::test]
        async fn test_conflict_takes_over() {
            let (_registry, _transport, callbacks, engine) = start("a").await;
            callbacks.on_state_change("CONFLICT");

            let handle = engine.handle("a").unwrap();
            for _ in 0..100 {
                if handle.take_over_count() == 1 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            assert_eq!(handle.take_over_count(), 1);
        }

        #[tokio::test]
        async fn test_auto_close_releases_handle() {
            let (registry, transport, callbacks, engine) = start("a").await;
            callbacks.on_status_change("autocloseCalled");

            let handle = engine.handle("a").unwrap();
            for _ in 0..100 {
                if handle.is_closed() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            assert!(handle.is_closed());
            assert!(registry.handle("a").is_none());
            assert_eq!(registry.get("a").unwrap().status, StatusType::Disconnected);
            assert_eq!(transport.count(), 0);
        }

        #[tokio::test]
        async fn test_removed_record_drops_late_callbacks() {
            let (registry, transport, callbacks, _engine) = start("a").await;
            registry.remove("a");
            callbacks.on_status_change("inChat");

            assert!(!transport.wait_for(1, Duration::from_millis(100)).await);
            assert!(registry.get("a").is_none());
        }
    }
}
