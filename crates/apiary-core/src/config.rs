use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ApiaryError;

/// Top-level Apiary configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// General runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Runtime identity prefix, encoded into subscription names.
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

/// Remote platform API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token for the runtime's platform account.
    #[serde(default)]
    pub token: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: String::new(),
        }
    }
}

/// Which inbound transport delivers envelopes. Exactly one is active.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// HTTP endpoint the platform pushes subscription events to.
    #[default]
    Webhook,
    /// Persistent push socket.
    Socket,
}

/// Inbound transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub mode: TransportMode,
    /// Local bind port for the webhook endpoint.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL registered as the subscription target.
    #[serde(default)]
    pub public_url: String,
    /// Shared secret for envelope signatures. Empty disables verification.
    #[serde(default)]
    pub secret: String,
    /// Push socket URL (socket mode only).
    #[serde(default)]
    pub socket_url: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::default(),
            port: default_port(),
            public_url: String::new(),
            secret: String::new(),
            socket_url: String::new(),
        }
    }
}

/// Reconciliation loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_reconcile_interval")]
    pub interval_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_reconcile_interval(),
        }
    }
}

/// Per-bot scheduler sweep settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_repeater_poll")]
    pub repeater_poll_secs: u64,
    #[serde(default = "default_oneshot_poll")]
    pub oneshot_poll_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            repeater_poll_secs: default_repeater_poll(),
            oneshot_poll_secs: default_oneshot_poll(),
        }
    }
}

/// Persistence backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "memory" or "sqlite".
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            db_path: default_db_path(),
        }
    }
}

// --- Default value functions ---

fn default_name() -> String {
    "apiary".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_base_url() -> String {
    "https://api.example.com/v1".to_string()
}
fn default_port() -> u16 {
    3210
}
fn default_true() -> bool {
    true
}
fn default_reconcile_interval() -> u64 {
    30
}
fn default_repeater_poll() -> u64 {
    5
}
fn default_oneshot_poll() -> u64 {
    60
}
fn default_storage_backend() -> String {
    "memory".to_string()
}
fn default_db_path() -> String {
    "~/.apiary/apiary.db".to_string()
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Load configuration from a TOML file. A missing file yields defaults.
pub fn load(path: &str) -> Result<Config, ApiaryError> {
    let path = Path::new(path);
    if !path.exists() {
        tracing::info!("config file not found at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)
        .map_err(|e| ApiaryError::Config(format!("failed to parse {}: {e}", path.display())))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.runtime.name, "apiary");
        assert_eq!(cfg.reconcile.interval_secs, 30);
        assert_eq!(cfg.scheduler.repeater_poll_secs, 5);
        assert_eq!(cfg.scheduler.oneshot_poll_secs, 60);
        assert_eq!(cfg.transport.mode, TransportMode::Webhook);
        assert_eq!(cfg.storage.backend, "memory");
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml_str = r#"
            [runtime]
            name = "helper"

            [transport]
            mode = "socket"
            socket_url = "wss://push.example.com/feed"

            [reconcile]
            interval_secs = 10
        "#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.runtime.name, "helper");
        assert_eq!(cfg.transport.mode, TransportMode::Socket);
        assert_eq!(cfg.transport.socket_url, "wss://push.example.com/feed");
        assert_eq!(cfg.reconcile.interval_secs, 10);
        // Untouched sections keep their defaults.
        assert_eq!(cfg.scheduler.repeater_poll_secs, 5);
    }

    #[test]
    fn test_shellexpand_home() {
        std::env::set_var("HOME", "/home/apiary");
        assert_eq!(shellexpand("~/data.db"), "/home/apiary/data.db");
        assert_eq!(shellexpand("/abs/data.db"), "/abs/data.db");
    }
}
