//! Device proxy seam.
//!
//! The bridge never talks to detector hardware itself. Everything it needs is
//! expressed by [`DeviceProxy`]: a handful of attributes (binning, time
//! channels, preselection, the raw value buffer), three commands and a
//! state/status query. Implementations decide how those reach the device.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod simulated;

pub use simulated::SimulatedDetector;

/// State reported by the device server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[allow(missing_docs)]
pub enum DevState {
    On,
    Off,
    Moving,
    Standby,
    Fault,
    Init,
    Alarm,
    Unknown,
}

impl DevState {
    /// Upper-case state name, as the device server prints it.
    pub fn as_str(&self) -> &'static str {
        match self {
            DevState::On => "ON",
            DevState::Off => "OFF",
            DevState::Moving => "MOVING",
            DevState::Standby => "STANDBY",
            DevState::Fault => "FAULT",
            DevState::Init => "INIT",
            DevState::Alarm => "ALARM",
            DevState::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for DevState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detector binning factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binning {
    /// Horizontal binning.
    pub x: i64,
    /// Vertical binning.
    pub y: i64,
}

impl Binning {
    /// Create a binning pair.
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Same pair with a new horizontal factor.
    pub fn with_x(self, x: i64) -> Self {
        Self { x, ..self }
    }

    /// Same pair with a new vertical factor.
    pub fn with_y(self, y: i64) -> Self {
        Self { y, ..self }
    }
}

impl Default for Binning {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

impl From<[i64; 2]> for Binning {
    fn from([x, y]: [i64; 2]) -> Self {
        Self::new(x, y)
    }
}

/// Remote handle on the detector's time-of-flight channel device.
///
/// All methods are async and may fail; the bridge logs failures and carries
/// on with the next poll.
#[async_trait]
pub trait DeviceProxy: Send + Sync {
    /// Current device state.
    async fn state(&self) -> Result<DevState>;

    /// Human-readable status line.
    async fn status(&self) -> Result<String>;

    /// Current binning pair.
    async fn binning(&self) -> Result<Binning>;

    /// Replace the binning pair.
    async fn set_binning(&self, binning: Binning) -> Result<()>;

    /// Number of time channels.
    async fn time_channels(&self) -> Result<i64>;

    /// Set the number of time channels.
    async fn set_time_channels(&self, channels: i64) -> Result<()>;

    /// Preselection threshold at which counting stops.
    async fn preselection(&self) -> Result<f64>;

    /// Set the preselection threshold.
    async fn set_preselection(&self, preselection: f64) -> Result<()>;

    /// Raw value buffer (histogram counts).
    async fn value(&self) -> Result<Vec<u32>>;

    /// Start counting.
    async fn start(&self) -> Result<()>;

    /// Stop counting.
    async fn stop(&self) -> Result<()>;

    /// Clear the accumulated data.
    async fn clear(&self) -> Result<()>;
}
