//! Custom error types for the bridge.
//!
//! `BridgeError` is the single error type used by the library. It follows the
//! same pattern as the rest of the crate: `thiserror` derives the display
//! strings and `#[from]` conversions let `?` lift configuration and I/O errors
//! without ceremony.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment` while loading TOML files or
//!   environment overrides.
//! - **`Configuration`**: Semantic problems found by `Settings::validate`.
//! - **`Io`**: Socket and file errors.
//! - **`UnknownPv`** / **`ReadOnly`** / **`InvalidValue`**: Rejections raised by
//!   the process-variable server before a write reaches the driver.
//! - **`Protocol`**: Malformed requests on the TCP front-end.
//! - **`CompletionTimeout`** / **`ServerShutdown`**: Failures while waiting on
//!   the server task.
//!
//! Device errors are not part of this enum. The device proxy traits return
//! `anyhow::Result`, and the bridge logs those failures instead of surfacing
//! them to remote writers.

use thiserror::Error;

/// Convenience alias for results using the bridge error type.
pub type AppResult<T> = std::result::Result<T, BridgeError>;

#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown process variable: {0}")]
    UnknownPv(String),

    #[error("Process variable '{0}' is read-only")]
    ReadOnly(String),

    #[error("Invalid value for '{name}': {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("Malformed request: {0}")]
    Protocol(String),

    #[error("Timed out waiting for completion of '{0}'")]
    CompletionTimeout(String),

    #[error("Process variable server has shut down")]
    ServerShutdown,
}

impl BridgeError {
    pub(crate) fn invalid_value(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
