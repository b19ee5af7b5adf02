//! Configuration using Figment
//!
//! Settings are layered, lowest precedence first:
//! 1. built-in defaults
//! 2. an optional TOML file (`--config`)
//! 3. environment variables prefixed with `CASCADE_`, nested keys separated
//!    by `__`
//! 4. command-line flags (applied by the binary)
//!
//! ```text
//! CASCADE_POLL__INTERVAL_MS=250
//! CASCADE_SERVER__LISTEN=0.0.0.0:5064
//! CASCADE_LOGGING__LEVEL=debug
//! ```
//!
//! The process-variable prefix has its own rule: an explicit
//! `server.prefix` wins, otherwise `MYPVPREFIX` (the instrument-wide prefix)
//! is extended with `CASCADE:`, otherwise the LARMOR default is used.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::device::DevState;
use crate::error::{AppResult, BridgeError};

/// Prefix used when neither the configuration nor `MYPVPREFIX` provide one.
pub const DEFAULT_PREFIX: &str = "IN:LARMOR:CASCADE:";

/// Environment variable holding the instrument-wide PV prefix.
pub const INSTRUMENT_PREFIX_ENV: &str = "MYPVPREFIX";

/// Top-level settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Process-variable server settings.
    pub server: ServerConfig,
    /// Poll loop settings.
    pub poll: PollConfig,
    /// Simulated detector settings.
    pub detector: DetectorConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Process-variable server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Explicit PV prefix. Overrides `MYPVPREFIX` when set.
    pub prefix: Option<String>,
    /// TCP address the line protocol listens on.
    pub listen: SocketAddr,
    /// How long `PUTW` waits for an asynchronous completion.
    pub completion_timeout_ms: u64,
    /// Capacity of the write request queue.
    pub request_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            prefix: None,
            listen: SocketAddr::from(([127, 0, 0, 1], 5064)),
            completion_timeout_ms: 100_000,
            request_capacity: 64,
        }
    }
}

impl ServerConfig {
    /// `completion_timeout_ms` as a duration.
    pub fn completion_timeout(&self) -> Duration {
        Duration::from_millis(self.completion_timeout_ms)
    }
}

/// Poll loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Interval between device polls.
    pub interval_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { interval_ms: 100 }
    }
}

impl PollConfig {
    /// `interval_ms` as a duration.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Simulated detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Initial binning `[x, y]`.
    pub binning: [i64; 2],
    /// Initial number of time channels.
    pub time_channels: i64,
    /// Initial preselection.
    pub preselection: f64,
    /// Value buffer returned by the detector.
    pub value: Vec<u32>,
    /// Pin the reported state. Random when unset.
    pub state: Option<DevState>,
    /// Seed for the random state generator.
    pub seed: Option<u64>,
    /// Time taken to read out the value buffer.
    pub readout_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            binning: [1, 1],
            time_channels: 128,
            preselection: 10.0,
            value: vec![1, 2, 3],
            state: None,
            seed: None,
            readout_ms: 0,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Settings {
    /// Load settings from defaults, an optional TOML file and `CASCADE_`
    /// environment variables, then validate them.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if let Some(path) = path {
            if !path.exists() {
                return Err(BridgeError::Configuration(format!(
                    "configuration file {} does not exist",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }
        let settings: Settings = figment
            .merge(Env::prefixed("CASCADE_").split("__"))
            .extract()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings after loading or after CLI overrides.
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(BridgeError::Configuration(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        if self.poll.interval_ms == 0 {
            return Err(BridgeError::Configuration(
                "poll.interval_ms must be greater than zero".to_string(),
            ));
        }

        if self.server.completion_timeout_ms == 0 {
            return Err(BridgeError::Configuration(
                "server.completion_timeout_ms must be greater than zero".to_string(),
            ));
        }

        if self.server.request_capacity == 0 {
            return Err(BridgeError::Configuration(
                "server.request_capacity must be greater than zero".to_string(),
            ));
        }

        if let Some(prefix) = &self.server.prefix {
            if prefix.trim().is_empty() || prefix.chars().any(char::is_whitespace) {
                return Err(BridgeError::Configuration(format!(
                    "Invalid PV prefix '{}': must be non-empty and contain no whitespace",
                    prefix
                )));
            }
        }

        Ok(())
    }

    /// PV prefix to serve under, reading `MYPVPREFIX` from the environment.
    pub fn resolve_prefix(&self) -> String {
        resolve_prefix(
            self.server.prefix.as_deref(),
            std::env::var(INSTRUMENT_PREFIX_ENV).ok().as_deref(),
        )
    }
}

/// Pick the PV prefix from an explicit setting and the instrument prefix.
pub fn resolve_prefix(explicit: Option<&str>, instrument_prefix: Option<&str>) -> String {
    match (explicit, instrument_prefix) {
        (Some(prefix), _) => prefix.to_string(),
        (None, Some(instrument)) => format!("{}CASCADE:", instrument),
        (None, None) => DEFAULT_PREFIX.to_string(),
    }
}
