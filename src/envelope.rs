//! Canonical webhook event envelope
//!
//! Wraps engine-derived payloads into the vendor-neutral shape delivered
//! to tenant webhooks: `{eventId, instanceKey, eventType, timestamp, ...body}`.

use crate::types::EventType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Envelope fields that a body may not shadow
const RESERVED_KEYS: [&str; 4] = ["eventId", "instanceKey", "eventType", "timestamp"];

/// A single webhook event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Time-derived id with random suffix (`<unix millis>-<8 hex>`)
    pub event_id: String,

    pub instance_key: String,

    pub event_type: EventType,

    /// Capture time, not engine time
    pub timestamp: DateTime<Utc>,

    /// Type-specific fields, flattened into the top level on the wire
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl Envelope {
    /// Look up a body field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }
}

/// Build an envelope for an event body
///
/// Object bodies are flattened (reserved envelope keys are dropped);
/// any other JSON value is nested under `data`.
pub fn build(event_type: EventType, instance_key: &str, body: Value) -> Envelope {
    let body = match body {
        Value::Object(mut map) => {
            for key in RESERVED_KEYS {
                map.remove(key);
            }
            map
        }
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("data".to_string(), other);
            map
        }
    };

    let timestamp = Utc::now();
    Envelope {
        event_id: event_id(&timestamp),
        instance_key: instance_key.to_string(),
        event_type,
        timestamp,
        body,
    }
}

fn event_id(at: &DateTime<Utc>) -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", at.timestamp_millis(), &random[..8])
}
