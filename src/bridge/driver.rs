//! Cascade detector driver.
//!
//! Connects the PV server to a [`DeviceProxy`]:
//!
//! - [`Driver::write`] is the dispatch table for setpoints and triggers;
//! - [`CascadeDriver::poll_once`] refreshes every readback from the device
//!   and performs a pending save.
//!
//! Device errors never reach PV clients. They are logged and the write is
//! still echoed into the store.
//!
//! A save request sets the pending flag and registers its completion under
//! one lock. The poll cycle clears the flag and takes the registered waiters
//! under that same lock, so a save only ever completes requests made before
//! it read the filename and the value buffer. Requests arriving during a
//! save wait for the next cycle.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::bridge::database::{self, DetectorState};
use crate::bridge::save::save_buffer;
use crate::device::DeviceProxy;
use crate::pv::{PvStore, PvValue, Waiters};
use crate::server::{Driver, WriteStatus};

/// Bridge between the PV store and a detector proxy.
pub struct CascadeDriver {
    store: Arc<PvStore>,
    proxy: Arc<dyn DeviceProxy>,
    filename: Mutex<String>,
    save_pending: Mutex<bool>,
}

impl CascadeDriver {
    /// Create a driver publishing into `store`.
    pub fn new(store: Arc<PvStore>, proxy: Arc<dyn DeviceProxy>) -> Self {
        Self {
            store,
            proxy,
            filename: Mutex::new(String::new()),
            save_pending: Mutex::new(false),
        }
    }

    /// Store the driver publishes into.
    pub fn store(&self) -> &Arc<PvStore> {
        &self.store
    }

    /// Whether a save was requested and not yet performed.
    pub fn is_save_pending(&self) -> bool {
        *self.save_pending.lock()
    }

    /// Most recent `FILENAME:SP` value.
    pub fn filename(&self) -> String {
        self.filename.lock().clone()
    }

    /// Run one poll cycle: refresh readbacks, save if requested, post updates.
    pub async fn poll_once(&self) {
        self.refresh_readbacks().await;

        if let Some(waiters) = self.take_save_request() {
            self.save().await;
            let released = waiters.release();
            debug!(released, "Save completion signalled");
        }

        self.store.update_pvs();
    }

    async fn refresh_readbacks(&self) {
        match self.proxy.state().await {
            Ok(state) => {
                let state = DetectorState::from(state);
                self.publish(database::STATE, PvValue::Enum(state.index()));
            }
            Err(e) => warn!(error = %e, "Failed to read device state"),
        }

        match self.proxy.status().await {
            Ok(status) => self.publish(database::STATESTR, status),
            Err(e) => warn!(error = %e, "Failed to read device status"),
        }

        match self.proxy.preselection().await {
            Ok(preselection) => self.publish(database::PRESELECTION, preselection),
            Err(e) => warn!(error = %e, "Failed to read preselection"),
        }

        match self.proxy.binning().await {
            Ok(binning) => {
                self.publish(database::BINX, binning.x);
                self.publish(database::BINY, binning.y);
            }
            Err(e) => warn!(error = %e, "Failed to read binning"),
        }

        match self.proxy.time_channels().await {
            Ok(channels) => self.publish(database::TIMECHANS, channels),
            Err(e) => warn!(error = %e, "Failed to read time channels"),
        }

        let filename = self.filename();
        self.publish(database::FILENAME, filename);
    }

    fn take_save_request(&self) -> Option<Waiters> {
        let mut pending = self.save_pending.lock();
        if !std::mem::take(&mut *pending) {
            return None;
        }
        Some(self.store.take_completions(database::SAVEDATA_SP))
    }

    async fn save(&self) {
        let filename = self.filename();
        info!(filename = %filename, "Saving data");

        let result = async {
            let values = self.proxy.value().await?;
            save_buffer(&filename, &values).await?;
            anyhow::Ok(values.len())
        }
        .await;

        match result {
            Ok(words) => debug!(words, "Value buffer written"),
            Err(e) => error!(filename = %filename, error = %e, "Save failed"),
        }
        info!("Save complete");
    }

    fn publish(&self, reason: &str, value: impl Into<PvValue>) {
        if let Err(e) = self.store.set_param(reason, value) {
            warn!(reason, error = %e, "Failed to publish value");
        }
    }

    async fn dispatch(&self, reason: &str, value: &PvValue) -> anyhow::Result<WriteStatus> {
        match reason {
            database::BINX_SP => {
                if let Some(x) = value.as_i64() {
                    let binning = self.proxy.binning().await?;
                    self.proxy.set_binning(binning.with_x(x)).await?;
                }
            }
            database::BINY_SP => {
                if let Some(y) = value.as_i64() {
                    let binning = self.proxy.binning().await?;
                    self.proxy.set_binning(binning.with_y(y)).await?;
                }
            }
            database::TIMECHANS_SP => {
                if let Some(channels) = value.as_i64() {
                    self.proxy.set_time_channels(channels).await?;
                }
            }
            database::PRESELECTION_SP => {
                if let Some(preselection) = value.as_f64() {
                    self.proxy.set_preselection(preselection).await?;
                }
            }
            database::START_SP if value.is_trigger() => self.proxy.start().await?,
            database::STOP_SP if value.is_trigger() => self.proxy.stop().await?,
            database::CLEAR_SP if value.is_trigger() => self.proxy.clear().await?,
            database::SAVEDATA_SP if value.is_trigger() => {
                let mut pending = self.save_pending.lock();
                let completion = self.store.register_completion(database::SAVEDATA_SP)?;
                if std::mem::replace(&mut *pending, true) {
                    debug!("Save already pending");
                }
                return Ok(WriteStatus::Pending(completion));
            }
            database::FILENAME_SP => {
                *self.filename.lock() = value.as_text();
            }
            _ => debug!(reason, "No device action"),
        }
        Ok(WriteStatus::Done)
    }
}

#[async_trait]
impl Driver for CascadeDriver {
    async fn write(&self, reason: &str, value: PvValue) -> WriteStatus {
        let status = match self.dispatch(reason, &value).await {
            Ok(status) => status,
            Err(e) => {
                warn!(reason, value = %value, error = %e, "Device rejected write");
                WriteStatus::Done
            }
        };
        self.publish(reason, value);
        status
    }
}
