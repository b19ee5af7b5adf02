//! Simulated detector
//!
//! Stands in for the real time-of-flight channel device when no device server
//! is reachable. Attributes are kept in memory and commands are logged.
//!
//! By default the reported state and status are drawn at random from
//! ON / MOVING / FAULT on every query, which exercises every branch of the
//! state mapping. With a pinned state the detector behaves predictably:
//! `start()` moves it to MOVING and `stop()` back to ON.
//!
//! A call log and one-shot failure injection support tests.

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::info;

use crate::config::DetectorConfig;
use crate::device::{Binning, DevState, DeviceProxy};

const RANDOM_STATES: [DevState; 3] = [DevState::On, DevState::Moving, DevState::Fault];

#[derive(Debug, Clone)]
struct Attributes {
    binning: Binning,
    time_channels: i64,
    preselection: f64,
    value: Vec<u32>,
}

/// In-memory detector implementing [`DeviceProxy`].
pub struct SimulatedDetector {
    attributes: Mutex<Attributes>,
    pinned_state: Mutex<Option<DevState>>,
    rng: Mutex<StdRng>,
    call_log: Mutex<Vec<String>>,
    fail_next: AtomicBool,
    readout_delay: Duration,
}

impl Default for SimulatedDetector {
    fn default() -> Self {
        Self::from_config(&DetectorConfig::default())
    }
}

impl SimulatedDetector {
    /// Create a detector with default attributes and random state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detector from configuration.
    pub fn from_config(config: &DetectorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            attributes: Mutex::new(Attributes {
                binning: Binning::from(config.binning),
                time_channels: config.time_channels,
                preselection: config.preselection,
                value: config.value.clone(),
            }),
            pinned_state: Mutex::new(config.state),
            rng: Mutex::new(rng),
            call_log: Mutex::new(Vec::new()),
            fail_next: AtomicBool::new(false),
            readout_delay: Duration::from_millis(config.readout_ms),
        }
    }

    /// Pin the reported state instead of drawing it at random.
    pub fn with_state(self, state: DevState) -> Self {
        *self.pinned_state.lock() = Some(state);
        self
    }

    /// Replace the value buffer.
    pub fn with_value(self, value: Vec<u32>) -> Self {
        self.attributes.lock().value = value;
        self
    }

    /// Take `delay` to read out the value buffer.
    pub fn with_readout_delay(mut self, delay: Duration) -> Self {
        self.readout_delay = delay;
        self
    }

    /// Pin the reported state.
    pub fn set_state(&self, state: DevState) {
        *self.pinned_state.lock() = Some(state);
    }

    /// Make the next proxy call fail.
    pub fn inject_next_failure(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Calls made so far, oldest first.
    pub fn call_log(&self) -> Vec<String> {
        self.call_log.lock().clone()
    }

    fn record(&self, call: impl Into<String>) -> Result<()> {
        let call = call.into();
        self.call_log.lock().push(call.clone());
        if self.fail_next.swap(false, Ordering::SeqCst) {
            bail!("SimulatedDetector: injected failure in {}", call);
        }
        Ok(())
    }

    fn random_state(&self) -> DevState {
        let index = self.rng.lock().gen_range(0..RANDOM_STATES.len());
        RANDOM_STATES[index]
    }
}

#[async_trait]
impl DeviceProxy for SimulatedDetector {
    async fn state(&self) -> Result<DevState> {
        self.record("state")?;
        let pinned = *self.pinned_state.lock();
        Ok(pinned.unwrap_or_else(|| self.random_state()))
    }

    async fn status(&self) -> Result<String> {
        self.record("status")?;
        let pinned = *self.pinned_state.lock();
        // Random mode draws status independently of state.
        let state = pinned.unwrap_or_else(|| self.random_state());
        Ok(state.as_str().to_string())
    }

    async fn binning(&self) -> Result<Binning> {
        self.record("binning")?;
        Ok(self.attributes.lock().binning)
    }

    async fn set_binning(&self, binning: Binning) -> Result<()> {
        self.record(format!("set_binning: [{}, {}]", binning.x, binning.y))?;
        self.attributes.lock().binning = binning;
        Ok(())
    }

    async fn time_channels(&self) -> Result<i64> {
        self.record("time_channels")?;
        Ok(self.attributes.lock().time_channels)
    }

    async fn set_time_channels(&self, channels: i64) -> Result<()> {
        self.record(format!("set_time_channels: {}", channels))?;
        self.attributes.lock().time_channels = channels;
        Ok(())
    }

    async fn preselection(&self) -> Result<f64> {
        self.record("preselection")?;
        Ok(self.attributes.lock().preselection)
    }

    async fn set_preselection(&self, preselection: f64) -> Result<()> {
        self.record(format!("set_preselection: {}", preselection))?;
        self.attributes.lock().preselection = preselection;
        Ok(())
    }

    async fn value(&self) -> Result<Vec<u32>> {
        self.record("value")?;
        if !self.readout_delay.is_zero() {
            tokio::time::sleep(self.readout_delay).await;
        }
        Ok(self.attributes.lock().value.clone())
    }

    async fn start(&self) -> Result<()> {
        self.record("start")?;
        info!("SimulatedDetector: Start");
        if let Some(state) = self.pinned_state.lock().as_mut() {
            *state = DevState::Moving;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.record("stop")?;
        info!("SimulatedDetector: Stop");
        if let Some(state) = self.pinned_state.lock().as_mut() {
            *state = DevState::On;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.record("clear")?;
        info!("SimulatedDetector: Clear");
        Ok(())
    }
}
