//! Structured logging setup.
//!
//! The library itself only emits `tracing` events. Binaries and tests that want to
//! see them call [`init_logging`] once at startup.

use crate::config::LoggingConfig;
use crate::error::{ProtocolError, Result};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber configured from `config`.
///
/// `RUST_LOG` takes precedence over the configured level. Fails with a
/// `ConfigError` if a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string().to_ascii_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed
        .map_err(|e| ProtocolError::ConfigError(format!("Failed to install subscriber: {e}")))?;

    debug!(app = %config.app_name, json = config.json_format, "Logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_install_is_rejected() {
        let config = LoggingConfig::default();
        // Another test may already have installed one; either way the second call fails.
        let _ = init_logging(&config);
        assert!(matches!(
            init_logging(&config),
            Err(ProtocolError::ConfigError(_))
        ));
    }
}
