use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};

/// Process-wide settings for the session manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Root directory holding `<engine_type>/<instance_key>/` session data (default: instances)
    #[serde(default = "default_session_root")]
    pub session_root: PathBuf,

    /// Webhook used by instances started without their own URL
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Default for `disableWebhook` on new instances
    #[serde(default)]
    pub disable_webhook: bool,

    /// Default for `emitAcks` on new instances (default: true)
    #[serde(default = "default_true")]
    pub emit_acks: bool,

    /// Device name announced to the network by engines
    #[serde(default)]
    pub device_name: Option<String>,

    /// Pause between teardown and restart on refresh (default: 3000)
    #[serde(default = "default_refresh_delay_ms")]
    pub refresh_delay_ms: u64,

    /// Pause between teardown and restart on reset (default: 5000)
    #[serde(default = "default_reset_delay_ms")]
    pub reset_delay_ms: u64,

    /// Engine auto-close interval for unpaired sessions (default: 60000)
    #[serde(default = "default_auto_close_ms")]
    pub auto_close_ms: u64,

    /// Per-request webhook timeout (default: 10)
    #[serde(default = "default_webhook_timeout_secs")]
    pub webhook_timeout_secs: u64,
}

fn default_session_root() -> PathBuf {
    PathBuf::from("instances")
}

fn default_true() -> bool {
    true
}

fn default_refresh_delay_ms() -> u64 {
    3000
}

fn default_reset_delay_ms() -> u64 {
    5000
}

fn default_auto_close_ms() -> u64 {
    60_000
}

fn default_webhook_timeout_secs() -> u64 {
    10
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            session_root: default_session_root(),
            webhook_url: None,
            disable_webhook: false,
            emit_acks: default_true(),
            device_name: None,
            refresh_delay_ms: default_refresh_delay_ms(),
            reset_delay_ms: default_reset_delay_ms(),
            auto_close_ms: default_auto_close_ms(),
            webhook_timeout_secs: default_webhook_timeout_secs(),
        }
    }
}

impl ManagerConfig {
    /// Load configuration from a TOML file.
    /// Returns default config if the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            SessionError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: ManagerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn from_env(self) -> Self {
        self.apply_env(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an environment lookup.
    ///
    /// `WEBHOOK_BASE_URL`, `DISABLE_WEBHOOK`, `SEND_ACKS`, `BROWSER_CLIENT`
    /// and `SESSION_ROOT` are recognised. A boolean flag is true unless its
    /// value is `false`; unset variables keep the current value.
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup("WEBHOOK_BASE_URL").filter(|v| !v.is_empty()) {
            self.webhook_url = Some(url);
        }
        if let Some(flag) = lookup("DISABLE_WEBHOOK") {
            self.disable_webhook = env_flag(&flag);
        }
        if let Some(flag) = lookup("SEND_ACKS") {
            self.emit_acks = env_flag(&flag);
        }
        if let Some(name) = lookup("BROWSER_CLIENT").filter(|v| !v.is_empty()) {
            self.device_name = Some(name);
        }
        if let Some(root) = lookup("SESSION_ROOT").filter(|v| !v.is_empty()) {
            self.session_root = PathBuf::from(root);
        }
        self
    }

    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_delay_ms)
    }

    pub fn reset_delay(&self) -> Duration {
        Duration::from_millis(self.reset_delay_ms)
    }

    pub fn auto_close(&self) -> Duration {
        Duration::from_millis(self.auto_close_ms)
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs)
    }
}

fn env_flag(value: &str) -> bool {
    value.trim() != "false"
}
