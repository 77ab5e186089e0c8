//! # a3s-session
//!
//! Multi-instance messaging session lifecycle and webhook relay for the A3S ecosystem.
//!
//! ## Overview
//!
//! `a3s-session` runs many independent messaging-engine sessions, one per
//! tenant "instance", behind a single control surface. Engine callbacks
//! (pairing QR, sync progress, status changes, inbound messages, acks and
//! calls) are folded into a per-instance `ConnectionRecord` and relayed to
//! the tenant's webhook as normalized envelopes.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use a3s_session::{EngineFactory, ManagerConfig, SessionManager, StartRequest};
//! use a3s_session::engine::memory::MemoryEngine;
//! use a3s_session::webhook::MemoryWebhookTransport;
//!
//! # async fn example() -> a3s_session::Result<()> {
//! let manager = SessionManager::new(
//!     ManagerConfig::default(),
//!     EngineFactory::new().with(Arc::new(MemoryEngine::new())),
//!     Arc::new(MemoryWebhookTransport::new()),
//! );
//!
//! manager
//!     .start(StartRequest::new("tenant-a").with_webhook("https://hooks.example.com/a"))
//!     .await?;
//!
//! let qr = manager.get_qr("tenant-a")?;
//! println!("QR ready: {}", qr.success);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **InstanceRegistry**: instance key to record map with per-key atomic merges
//! - **Engine** / **EngineHandle**: pluggable engine backends and live sessions
//! - **session**: pure state machine plus the ordered per-instance worker
//! - **WebhookDispatcher**: fire-and-forget delivery of `Envelope`s
//! - **SessionManager**: start, refresh, reset, logout, delete and sends
//! - **reconcile**: restart persisted sessions at startup

pub mod config;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod manager;
pub mod message;
pub mod reconcile;
pub mod registry;
pub mod session;
pub mod storage;
pub mod types;
pub mod webhook;

// Re-export core types
pub use config::ManagerConfig;
pub use engine::{Engine, EngineCallbacks, EngineEvent, EngineFactory, EngineHandle, EngineOptions};
pub use envelope::Envelope;
pub use error::{Result, SessionError};
pub use manager::SessionManager;
pub use reconcile::{reconcile, ReconcileReport};
pub use registry::InstanceRegistry;
pub use storage::SessionStorage;
pub use types::{
    ConnectionRecord, DeliveryStatus, EngineType, EventType, InstancePatch, PresenceType, QrCode,
    RegisteredTarget, SentMessage, StartOutcome, StartRequest, StatusType,
};
pub use webhook::{HttpWebhookTransport, WebhookDispatcher, WebhookTransport};
