//! Background poll loop.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::bridge::driver::CascadeDriver;

/// Call [`CascadeDriver::poll_once`] every `interval` until `shutdown` flips
/// to true.
///
/// A slow cycle delays the next one rather than triggering a burst.
pub async fn run(driver: Arc<CascadeDriver>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    info!(interval_ms = interval.as_millis() as u64, "Poll loop started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => driver.poll_once().await,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("Poll loop stopped");
}
