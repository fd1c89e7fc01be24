//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load TOML configuration
//! files across all RCM applications.
//!
//! # Usage
//!
//! ```rust,no_run
//! use rcm_common::config::{ConfigLoader, NodeConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), rcm_common::config::ConfigError> {
//!     let config = NodeConfig::load(Path::new("node.toml"))?;
//!     config.validate()?;
//!     println!("Process: {}", config.shared.process_name);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Filter directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Common configuration fields shared across all RCM applications.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// process_name = "control-node-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Process name this node registers under.
    pub process_name: String,
}

/// Connection registry tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Seconds a pending connection may wait for confirmation before it
    /// is force-disconnected.
    #[serde(default = "RegistryConfig::default_confirm_timeout_s")]
    pub confirm_timeout_s: f64,

    /// Interval of the background timeout scan, in milliseconds.
    #[serde(default = "RegistryConfig::default_scan_interval_ms")]
    pub scan_interval_ms: u64,

    /// Depth of the bounded disconnect hand-off queue.
    #[serde(default = "RegistryConfig::default_disconnect_queue_depth")]
    pub disconnect_queue_depth: usize,
}

impl RegistryConfig {
    fn default_confirm_timeout_s() -> f64 {
        10.0
    }

    fn default_scan_interval_ms() -> u64 {
        1000
    }

    fn default_disconnect_queue_depth() -> usize {
        64
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            confirm_timeout_s: Self::default_confirm_timeout_s(),
            scan_interval_ms: Self::default_scan_interval_ms(),
            disconnect_queue_depth: Self::default_disconnect_queue_depth(),
        }
    }
}

/// Proxy layer tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Address the interface server listens on.
    #[serde(default = "ProxyConfig::default_listen_addr")]
    pub listen_addr: String,

    /// Liveness ping interval, in milliseconds.
    #[serde(default = "ProxyConfig::default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    /// How long a remote call waits for its result, in milliseconds.
    #[serde(default = "ProxyConfig::default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

impl ProxyConfig {
    fn default_listen_addr() -> String {
        "127.0.0.1:0".to_string()
    }

    fn default_ping_interval_ms() -> u64 {
        1000
    }

    fn default_call_timeout_ms() -> u64 {
        5000
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            ping_interval_ms: Self::default_ping_interval_ms(),
            call_timeout_ms: Self::default_call_timeout_ms(),
        }
    }
}

/// Top-level configuration for a node process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub shared: SharedConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub proxy: ProxyConfig,
}

impl NodeConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `process_name` is empty
    /// - `confirm_timeout_s` is not positive
    /// - `disconnect_queue_depth` is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shared.process_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "process_name cannot be empty".to_string(),
            ));
        }
        if !(self.registry.confirm_timeout_s > 0.0) {
            return Err(ConfigError::ValidationError(
                "confirm_timeout_s must be positive".to_string(),
            ));
        }
        if self.registry.disconnect_queue_depth == 0 {
            return Err(ConfigError::ValidationError(
                "disconnect_queue_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
