//! Error types for a3s-session

use thiserror::Error;

/// Errors that can occur while managing instances
#[derive(Debug, Error)]
pub enum SessionError {
    /// Operation referenced an instance key absent from the registry
    #[error("Instance not found: {0}")]
    NotFound(String),

    /// Target id is not a valid contact or group on the messaging network
    #[error("Target not registered: {0}")]
    Unregistered(String),

    /// Engine handle missing or an engine call failed
    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Webhook POST failed or returned a non-2xx status
    #[error("Failed to deliver webhook to '{url}': {reason}")]
    Delivery {
        url: String,
        reason: String,
    },

    /// Lifecycle failure (start, refresh, reset, logout); a failed start is a server error
    #[error("Failed to {operation} instance '{instance_key}': {reason}")]
    Lifecycle {
        operation: &'static str,
        instance_key: String,
        reason: String,
    },

    /// Malformed request (e.g., invalid instance key)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure
    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// Anything unexpected
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Wrap any displayable failure as a lifecycle error
    pub fn lifecycle(
        operation: &'static str,
        instance_key: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::Lifecycle {
            operation,
            instance_key: instance_key.into(),
            reason: reason.to_string(),
        }
    }

    /// HTTP-style status code for the API layer
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Unregistered(_) => 403,
            // Engine launch failures are server-side
            Self::Lifecycle {
                operation: "start", ..
            } => 500,
            Self::Lifecycle { .. } | Self::InvalidRequest(_) => 400,
            Self::EngineUnavailable(_) => 503,
            Self::Delivery { .. } => 502,
            _ => 500,
        }
    }

    /// Whether the caller is at fault (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
