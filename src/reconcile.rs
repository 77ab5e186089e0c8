//! Startup reconciliation
//!
//! Restarts every instance whose session directory survived a process
//! restart, so paired devices reconnect without a new QR.

use crate::manager::SessionManager;
use crate::types::{EngineType, StartRequest};
use futures::future::join_all;
use serde::Serialize;

/// What `reconcile` found and did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Keys found on disk, across all engine types
    pub discovered: Vec<String>,
    pub started: Vec<String>,
    /// Keys whose start failed, with the reason
    pub failed: Vec<(String, String)>,
}

/// Start all persisted instances of every registered engine type
///
/// Starts run concurrently; a failing key never prevents the others.
pub async fn reconcile(manager: &SessionManager) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    let mut engine_types = manager.engines().engine_types();
    engine_types.sort_by_key(|t| t.as_str());

    for engine_type in engine_types {
        let keys = match manager.storage().list_keys(engine_type).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(engine_type = %engine_type, error = %e, "Failed to scan session root");
                continue;
            }
        };
        if keys.is_empty() {
            continue;
        }

        tracing::info!(
            engine_type = %engine_type,
            count = keys.len(),
            "Restoring persisted sessions"
        );

        let starts = keys
            .iter()
            .map(|key| manager.start(restore_request(manager, engine_type, key)));
        let results = join_all(starts).await;

        for (key, result) in keys.into_iter().zip(results) {
            match result {
                Ok(outcome) => {
                    tracing::debug!(instance_key = %key, outcome = ?outcome, "Session restored");
                    report.started.push(key.clone());
                }
                Err(e) => {
                    tracing::warn!(instance_key = %key, error = %e, "Failed to restore session");
                    report.failed.push((key.clone(), e.to_string()));
                }
            }
            report.discovered.push(key);
        }
    }

    tracing::info!(
        discovered = report.discovered.len(),
        started = report.started.len(),
        failed = report.failed.len(),
        "Startup reconciliation finished"
    );
    report
}

fn restore_request(manager: &SessionManager, engine_type: EngineType, key: &str) -> StartRequest {
    let config = manager.config();
    StartRequest {
        instance_key: key.to_string(),
        webhook_url: config.webhook_url.clone(),
        disable_webhook: Some(config.disable_webhook),
        emit_acks: Some(config.emit_acks),
        engine_type: Some(engine_type),
        new_login: Some(false),
    }
}
