#![deny(unsafe_code)]

//! Configuration for yggctl.
//!
//! Two different things are configured here:
//!
//! - [`ControlConfig`]: yggctl's own settings (where the admin channel and
//!   the daemon config live, timeouts, bootstrap preferences), loaded from an
//!   optional TOML file plus environment overrides.
//! - [`ConfigDocument`]: the daemon's persisted configuration, which yggctl
//!   edits through the [`ConfigStore`].

/// Admin channel locations (`unix://`, `tcp://`).
pub mod endpoint;
/// The daemon's configuration document and its pure merge helpers.
pub mod document;
/// Atomic load/save of the configuration document.
pub mod store;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use document::{ALL_IPV6_ROUTE, ConfigDocument, TunnelRouting};
pub use endpoint::{AdminEndpoint, DEFAULT_ADMIN_ENDPOINT};
pub use store::{ConfigStore, StoreError};

/// Environment variable overriding the admin channel location.
pub const ENV_ADMIN_SOCKET: &str = "YGGDRASIL_SOCKET";

/// Environment variable overriding the daemon config file location.
pub const ENV_CONFIG_PATH: &str = "YGGDRASIL_CONFIG";

/// Errors that can occur while loading yggctl's own configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level yggctl configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// How to reach and manage the daemon.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Peer bootstrap preferences.
    #[serde(default)]
    pub bootstrap: BootstrapConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings describing the managed daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Admin channel location (`unix:///path`, `/path`, or `tcp://host:port`).
    #[serde(default = "default_admin_endpoint")]
    pub admin_endpoint: String,

    /// Path to the daemon's persisted configuration.
    #[serde(default = "default_config_path")]
    pub config_path: String,

    /// Process name used to find the daemon when signaling a reload.
    #[serde(default = "default_process_name")]
    pub process_name: String,

    /// Per-call admin RPC timeout in milliseconds.
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,

    /// Port advertised in invite URIs.
    #[serde(default = "default_peering_port")]
    pub peering_port: u16,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            admin_endpoint: default_admin_endpoint(),
            config_path: default_config_path(),
            process_name: default_process_name(),
            rpc_timeout_ms: default_rpc_timeout_ms(),
            peering_port: default_peering_port(),
        }
    }
}

fn default_admin_endpoint() -> String {
    DEFAULT_ADMIN_ENDPOINT.to_string()
}

fn default_config_path() -> String {
    "/etc/yggdrasil/yggdrasil.conf".to_string()
}

fn default_process_name() -> String {
    "yggdrasil".to_string()
}

fn default_rpc_timeout_ms() -> u64 {
    5_000
}

fn default_peering_port() -> u16 {
    9001
}

/// Peer bootstrap preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// How many peers a bootstrap run tries to add.
    #[serde(default = "default_target_count")]
    pub target_count: usize,

    /// Region tags preferred when picking public peers (case-insensitive).
    #[serde(default = "default_preferred_regions")]
    pub preferred_regions: Vec<String>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            target_count: default_target_count(),
            preferred_regions: default_preferred_regions(),
        }
    }
}

fn default_target_count() -> usize {
    3
}

/// North American and European region tags, both as country codes and as
/// the region names used by the public peer list.
pub fn default_preferred_regions() -> Vec<String> {
    [
        // North America
        "na",
        "north america",
        "us",
        "usa",
        "united states",
        "ca",
        "canada",
        "mx",
        "mexico",
        // Europe
        "eu",
        "europe",
        "de",
        "germany",
        "fr",
        "france",
        "gb",
        "uk",
        "united kingdom",
        "nl",
        "netherlands",
        "be",
        "belgium",
        "ch",
        "switzerland",
        "at",
        "austria",
        "se",
        "sweden",
        "no",
        "norway",
        "fi",
        "finland",
        "dk",
        "denmark",
        "pl",
        "poland",
        "cz",
        "czechia",
        "es",
        "spain",
        "it",
        "italy",
        "ie",
        "ireland",
        "pt",
        "portugal",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ControlConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: ControlConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `YGGDRASIL_SOCKET` / `YGGDRASIL_CONFIG` from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup, then re-validate.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup(ENV_ADMIN_SOCKET).filter(|v| !v.is_empty()) {
            tracing::debug!(%endpoint, "Admin endpoint overridden from environment");
            self.daemon.admin_endpoint = endpoint;
        }
        if let Some(path) = lookup(ENV_CONFIG_PATH).filter(|v| !v.is_empty()) {
            tracing::debug!(%path, "Config path overridden from environment");
            self.daemon.config_path = path;
        }
        self.validate()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.admin_endpoint()?;
        if self.daemon.config_path.is_empty() {
            return Err(ConfigError::Validation(
                "daemon.config_path must not be empty".to_string(),
            ));
        }
        if self.daemon.process_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "daemon.process_name must not be empty".to_string(),
            ));
        }
        if self.daemon.rpc_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "daemon.rpc_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.daemon.peering_port == 0 {
            return Err(ConfigError::Validation(
                "daemon.peering_port must be non-zero".to_string(),
            ));
        }
        if self.bootstrap.target_count == 0 {
            return Err(ConfigError::Validation(
                "bootstrap.target_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The parsed admin channel location.
    pub fn admin_endpoint(&self) -> Result<AdminEndpoint, ConfigError> {
        self.daemon
            .admin_endpoint
            .parse()
            .map_err(|e: endpoint::EndpointParseError| {
                ConfigError::Validation(format!("daemon.admin_endpoint: {e}"))
            })
    }

    /// Path to the daemon's configuration document.
    pub fn config_path(&self) -> PathBuf {
        PathBuf::from(&self.daemon.config_path)
    }

    /// Per-call RPC timeout.
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.daemon.rpc_timeout_ms)
    }
}
