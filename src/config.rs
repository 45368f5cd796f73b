//! # Configuration Management
//!
//! Centralized configuration for the wire substrate.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-specific overrides via `from_env()`
//!
//! ## Process-wide Toggles
//! Deep validation of embedded documents is a single process-wide switch, not a
//! per-call option. [`WireConfig::apply`] publishes the configured value and
//! [`deep_validation`] reads it. A [`MessageCursor`](crate::protocol::cursor::MessageCursor)
//! samples the switch once, when it is created.

use crate::core::header::{Frame, HEADER_SIZE};
use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, Level};

/// Largest frame accepted by default (48 MB)
pub const MAX_FRAME_SIZE: usize = 48 * 1024 * 1024;

/// Largest document a client may send (16 MB)
pub const MAX_DOCUMENT_SIZE: usize = 16 * 1024 * 1024;

/// Whether embedded documents are structurally validated by default
pub const DEEP_VALIDATION: bool = false;

static DEEP_VALIDATION_ENABLED: AtomicBool = AtomicBool::new(DEEP_VALIDATION);

/// Switch structural validation of embedded documents on or off for the whole process.
pub fn set_deep_validation(enabled: bool) {
    DEEP_VALIDATION_ENABLED.store(enabled, Ordering::Relaxed);
}

/// Current value of the process-wide deep validation switch.
pub fn deep_validation() -> bool {
    DEEP_VALIDATION_ENABLED.load(Ordering::Relaxed)
}

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct WireConfig {
    /// Framing and parsing settings
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl WireConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(flag) = std::env::var("DBWIRE_DEEP_VALIDATION") {
            config.protocol.deep_validation = parse_bool(&flag).ok_or_else(|| {
                ProtocolError::ConfigError(format!("Invalid DBWIRE_DEEP_VALIDATION: {flag}"))
            })?;
        }

        if let Ok(size) = std::env::var("DBWIRE_MAX_FRAME_SIZE") {
            config.protocol.max_frame_size = size.parse::<usize>().map_err(|_| {
                ProtocolError::ConfigError(format!("Invalid DBWIRE_MAX_FRAME_SIZE: {size}"))
            })?;
        }

        if let Ok(level) = std::env::var("DBWIRE_LOG_LEVEL") {
            config.logging.log_level = level.parse::<Level>().map_err(|_| {
                ProtocolError::ConfigError(format!("Invalid DBWIRE_LOG_LEVEL: {level}"))
            })?;
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.protocol.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }

    /// Validate, then publish process-wide settings.
    pub fn apply(&self) -> Result<()> {
        self.validate_strict()?;
        set_deep_validation(self.protocol.deep_validation);
        info!(
            deep_validation = self.protocol.deep_validation,
            max_frame_size = self.protocol.max_frame_size,
            "Wire configuration applied"
        );
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Framing and parsing configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProtocolConfig {
    /// Walk embedded documents for structural well-formedness
    pub deep_validation: bool,

    /// Largest frame accepted, in bytes
    pub max_frame_size: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            deep_validation: DEEP_VALIDATION,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl ProtocolConfig {
    /// Validate protocol configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_frame_size < 1024 {
            errors.push(format!(
                "Max frame size too small: {} bytes (minimum: 1 KB)",
                self.max_frame_size
            ));
        } else if self.max_frame_size > MAX_FRAME_SIZE {
            errors.push(format!(
                "Max frame size too large: {} bytes (maximum: {MAX_FRAME_SIZE})",
                self.max_frame_size
            ));
        }

        if self.max_frame_size > i32::MAX as usize {
            errors.push("Max frame size must fit in a 32-bit length field".to_string());
        }

        errors
    }

    /// Validate `bytes` as a frame under this configuration's size ceiling.
    pub fn frame<'a>(&self, bytes: &'a [u8]) -> Result<Frame<'a>> {
        Frame::with_limit(bytes, self.max_frame_size.max(HEADER_SIZE))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("dbwire"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
