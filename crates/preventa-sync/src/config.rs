//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     PREVENTA_SYNC_MODE=manual                                          │
//! │     PREVENTA_USER_ID=chofer-01                                         │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/preventa/sync.toml (Linux)                               │
//! │     ~/Library/Application Support/com.preventa.app/sync.toml (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     SyncMode::Auto, auto-generated device_id                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Telefono reparto 3"
//!
//! [user]
//! id = "chofer-01"
//! role = "chofer"
//!
//! [remote]
//! url = "wss://api.example.com/sync"
//! request_timeout_secs = 20
//!
//! [sync]
//! mode = "auto"  # auto | manual | offline
//! interval_secs = 300
//! probe_before_sync = true
//!
//! [database]
//! path = "/var/lib/preventa/preventa.db"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Sync Mode
// =============================================================================

/// When the device talks to the backend.
///
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                        Sync Mode Behavior                               │
/// │                                                                         │
/// │  AUTO (Default)     full sync every `interval_secs`, plus on demand    │
/// │  MANUAL             full sync only when triggered                      │
/// │  OFFLINE            never contacts the backend                         │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Periodic sync plus manual triggers.
    #[default]
    Auto,

    /// Sync only when asked.
    Manual,

    /// Sync disabled - local operations only.
    Offline,
}

impl SyncMode {
    /// Returns true if sync is enabled at all.
    pub fn is_sync_enabled(&self) -> bool {
        !matches!(self, SyncMode::Offline)
    }

    /// Returns true if the agent should sync on a timer.
    pub fn is_periodic(&self) -> bool {
        matches!(self, SyncMode::Auto)
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Auto => write!(f, "auto"),
            SyncMode::Manual => write!(f, "manual"),
            SyncMode::Offline => write!(f, "offline"),
        }
    }
}

impl std::str::FromStr for SyncMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(SyncMode::Auto),
            "manual" | "on_demand" => Ok(SyncMode::Manual),
            "offline" | "disabled" => Ok(SyncMode::Offline),
            other => Err(SyncError::InvalidConfig(format!(
                "Unknown sync mode: '{}'. Valid options: auto, manual, offline",
                other
            ))),
        }
    }
}

// =============================================================================
// Device Configuration
// =============================================================================

/// Configuration for this device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier (UUID v4).
    /// Auto-generated on first run if not provided.
    pub id: String,

    /// Human-readable device name.
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_name() -> String {
    "Preventa Device".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: Uuid::new_v4().to_string(),
            name: default_device_name(),
        }
    }
}

// =============================================================================
// User Configuration
// =============================================================================

/// What the signed-in user does in the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Sales rep capturing orders and collections.
    #[default]
    Preventista,

    /// Driver running delivery routes.
    Chofer,

    Admin,
}

impl UserRole {
    /// Returns true if route sheets should be downloaded for this user.
    pub fn runs_routes(&self) -> bool {
        matches!(self, UserRole::Chofer | UserRole::Admin)
    }
}

impl std::str::FromStr for UserRole {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "preventista" | "sales" => Ok(UserRole::Preventista),
            "chofer" | "driver" => Ok(UserRole::Chofer),
            "admin" => Ok(UserRole::Admin),
            other => Err(SyncError::InvalidConfig(format!("Unknown user role: '{}'", other))),
        }
    }
}

/// The user whose work this device carries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserConfig {
    /// Backend user id. Route sheets are downloaded for this user.
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub role: UserRole,
}

// =============================================================================
// Remote Settings
// =============================================================================

/// How to reach the remote backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// WebSocket URL of the backend.
    #[serde(default)]
    pub url: Option<String>,

    /// Connection timeout (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Time to wait for the answer to one request (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum reconnection attempts before giving up.
    /// Set to 0 for infinite retries.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff duration (milliseconds) for reconnection.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration (seconds) for reconnection.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Keepalive ping interval (seconds).
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
}

fn default_connect_timeout() -> u64 {
    10
}
fn default_request_timeout() -> u64 {
    20
}
fn default_max_retries() -> u32 {
    0 // Infinite
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    60
}
fn default_ping_interval() -> u64 {
    30
}

impl Default for RemoteSettings {
    fn default() -> Self {
        RemoteSettings {
            url: None,
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            ping_interval_secs: default_ping_interval(),
        }
    }
}

impl RemoteSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Sync behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Sync mode for this device.
    #[serde(default)]
    pub mode: SyncMode,

    /// Interval between automatic full syncs (seconds).
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Check that the backend answers before touching anything.
    #[serde(default = "default_true")]
    pub probe_before_sync: bool,
}

fn default_interval() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            mode: SyncMode::default(),
            interval_secs: default_interval(),
            probe_before_sync: true,
        }
    }
}

impl SyncSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

// =============================================================================
// Database Settings
// =============================================================================

/// Where the Local Store lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Defaults to the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Device-specific configuration.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Signed-in user.
    #[serde(default)]
    pub user: UserConfig,

    /// Remote backend connection.
    #[serde(default)]
    pub remote: RemoteSettings,

    /// Sync behavior settings.
    #[serde(default)]
    pub sync: SyncSettings,

    /// Local Store location.
    #[serde(default)]
    pub database: DatabaseSettings,
}

impl SyncConfig {
    /// Creates a new config with defaults and a generated device ID.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.device.id.is_empty() {
            return Err(SyncError::MissingDeviceId);
        }

        if let Some(ref url) = self.remote.url {
            let parsed = url::Url::parse(url)?;
            if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
                return Err(SyncError::InvalidUrl(format!(
                    "Remote URL must start with ws:// or wss://, got: {}",
                    url
                )));
            }
        }

        if self.sync.mode.is_periodic() && self.sync.interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "interval_secs must be greater than 0".into(),
            ));
        }

        if self.remote.request_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.user.id.as_deref().is_some_and(str::is_empty) {
            return Err(SyncError::InvalidConfig("user id must not be empty".into()));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Applies overrides from `lookup`, keyed by environment variable name.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup("PREVENTA_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Some(name) = lookup("PREVENTA_DEVICE_NAME") {
            self.device.name = name;
        }

        if let Some(user) = lookup("PREVENTA_USER_ID") {
            debug!(user_id = %user, "Overriding user from environment");
            self.user.id = Some(user);
        }

        if let Some(role) = lookup("PREVENTA_USER_ROLE") {
            match role.parse() {
                Ok(parsed) => self.user.role = parsed,
                Err(_) => warn!(role = %role, "Unknown user role in environment"),
            }
        }

        if let Some(mode) = lookup("PREVENTA_SYNC_MODE") {
            match mode.parse() {
                Ok(parsed) => {
                    debug!(mode = %mode, "Overriding sync mode from environment");
                    self.sync.mode = parsed;
                }
                Err(_) => warn!(mode = %mode, "Unknown sync mode in environment"),
            }
        }

        if let Some(interval) = lookup("PREVENTA_SYNC_INTERVAL_SECS") {
            if let Ok(secs) = interval.parse::<u64>() {
                self.sync.interval_secs = secs;
            }
        }

        if let Some(url) = lookup("PREVENTA_REMOTE_URL") {
            debug!(url = %url, "Overriding remote URL from environment");
            self.remote.url = Some(url);
        }

        if let Some(path) = lookup("PREVENTA_DB_PATH") {
            self.database.path = Some(PathBuf::from(path));
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "preventa", "app")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    /// Returns the default database file path.
    pub fn default_database_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "preventa", "app")
            .map(|dirs| dirs.data_dir().join("preventa.db"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the device ID.
    pub fn device_id(&self) -> &str {
        &self.device.id
    }

    /// Returns the configured user, if any.
    pub fn user_id(&self) -> Option<&str> {
        self.user.id.as_deref()
    }

    /// Returns the sync mode.
    pub fn mode(&self) -> SyncMode {
        self.sync.mode
    }

    /// Returns true if sync is enabled.
    pub fn is_sync_enabled(&self) -> bool {
        self.sync.mode.is_sync_enabled()
    }

    /// Returns the remote URL if configured.
    pub fn remote_url(&self) -> Option<&str> {
        self.remote.url.as_deref()
    }

    /// Configured database path, falling back to the platform data directory.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.database
            .path
            .clone()
            .or_else(Self::default_database_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_sync_mode_parsing() {
        assert_eq!("auto".parse::<SyncMode>().unwrap(), SyncMode::Auto);
        assert_eq!("manual".parse::<SyncMode>().unwrap(), SyncMode::Manual);
        assert_eq!("OFFLINE".parse::<SyncMode>().unwrap(), SyncMode::Offline);
        assert_eq!("disabled".parse::<SyncMode>().unwrap(), SyncMode::Offline);
        assert!("primary".parse::<SyncMode>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert!(!config.device.id.is_empty());
        assert_eq!(config.sync.mode, SyncMode::Auto);
        assert_eq!(config.sync.interval_secs, 300);
        assert!(config.sync.probe_before_sync);
        assert!(config.user_id().is_none());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();
        assert!(config.validate().is_ok());

        config.device.id = String::new();
        assert!(matches!(config.validate(), Err(SyncError::MissingDeviceId)));

        config.device.id = "test".to_string();
        config.remote.url = Some("http://invalid".to_string());
        assert!(config.validate().is_err());

        config.remote.url = Some("not a url".to_string());
        assert!(config.validate().is_err());

        config.remote.url = Some("ws://localhost:8080/sync".to_string());
        assert!(config.validate().is_ok());

        config.sync.interval_secs = 0;
        assert!(config.validate().is_err());

        config.sync.mode = SyncMode::Manual;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("PREVENTA_DEVICE_ID", "dev-9"),
            ("PREVENTA_USER_ID", "chofer-01"),
            ("PREVENTA_USER_ROLE", "driver"),
            ("PREVENTA_SYNC_MODE", "manual"),
            ("PREVENTA_SYNC_INTERVAL_SECS", "60"),
            ("PREVENTA_REMOTE_URL", "wss://api.example.com/sync"),
            ("PREVENTA_DB_PATH", "/tmp/preventa.db"),
        ]);

        let mut config = SyncConfig::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.device_id(), "dev-9");
        assert_eq!(config.user_id(), Some("chofer-01"));
        assert_eq!(config.user.role, UserRole::Chofer);
        assert_eq!(config.mode(), SyncMode::Manual);
        assert_eq!(config.sync.interval_secs, 60);
        assert_eq!(config.remote_url(), Some("wss://api.example.com/sync"));
        assert_eq!(config.database_path(), Some(PathBuf::from("/tmp/preventa.db")));
    }

    #[test]
    fn test_bad_override_keeps_previous_value() {
        let mut config = SyncConfig::default();
        config.apply_overrides(|name| match name {
            "PREVENTA_SYNC_MODE" => Some("sometimes".into()),
            "PREVENTA_SYNC_INTERVAL_SECS" => Some("soon".into()),
            _ => None,
        });
        assert_eq!(config.mode(), SyncMode::Auto);
        assert_eq!(config.sync.interval_secs, 300);
    }

    #[test]
    fn test_toml_round_trip() {
        let toml_str = r#"
            [device]
            id = "dev-1"

            [user]
            id = "chofer-01"
            role = "chofer"

            [remote]
            url = "ws://10.0.0.2:9000/sync"

            [sync]
            mode = "manual"
        "#;

        let config: SyncConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.device.name, "Preventa Device");
        assert!(config.user.role.runs_routes());
        assert_eq!(config.remote.request_timeout_secs, 20);
        assert_eq!(config.mode(), SyncMode::Manual);
        assert!(config.validate().is_ok());

        let written = toml::to_string_pretty(&config).unwrap();
        assert!(written.contains("[device]"));
        assert!(written.contains("[remote]"));
    }
}
