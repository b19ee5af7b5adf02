//! Process-variable bridge for the CASCADE neutron detector.
//!
//! The bridge publishes a detector's state, configuration and acquisition
//! controls as named process variables, refreshes them from a device proxy on
//! a timer and turns variable writes into device commands.
//!
//! - [`pv`]: typed variable store with monitors and asynchronous completions
//! - [`server`]: write dispatch task and the TCP line protocol
//! - [`device`]: the device proxy seam and a simulated detector
//! - [`bridge`]: the CASCADE variable database, driver and poll loop
//! - [`app`]: wiring everything together

pub mod app;
pub mod bridge;
pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod pv;
pub mod server;

pub use app::Bridge;
pub use error::{AppResult, BridgeError};
