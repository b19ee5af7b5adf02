//! Tracing Infrastructure
//!
//! Sets up `tracing-subscriber` once per process. The level comes from
//! [`LoggingConfig`]; `RUST_LOG` takes over when it is set, which allows
//! per-module filtering:
//!
//! ```text
//! RUST_LOG=cascade_bridge::bridge=debug cascade-bridge
//! ```

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;
use crate::error::{AppResult, BridgeError};

/// Output format for tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output with colors
    Pretty,
    /// JSON lines for log aggregation
    Json,
}

/// Parse a log level string (case-insensitive).
pub fn parse_log_level(level: &str) -> AppResult<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(BridgeError::Configuration(format!(
            "Invalid log level '{}'",
            other
        ))),
    }
}

/// Initialize the global subscriber from configuration.
///
/// Fails if a global subscriber is already installed.
pub fn init(config: &LoggingConfig) -> AppResult<()> {
    let level = parse_log_level(&config.level)?;
    let format = if config.json {
        OutputFormat::Json
    } else {
        OutputFormat::Pretty
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let layer = match format {
        OutputFormat::Pretty => fmt::layer().with_target(true).with_thread_names(true).boxed(),
        OutputFormat::Json => fmt::layer().json().with_current_span(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .map_err(|e| BridgeError::Configuration(format!("Failed to initialize tracing: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("DEBUG").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("warn").unwrap(), Level::WARN);
        assert!(parse_log_level("verbose").is_err());
    }
}
