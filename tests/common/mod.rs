//! Shared helpers for integration tests.
#![allow(dead_code)]

use cascade_bridge::config::Settings;
use cascade_bridge::device::SimulatedDetector;
use cascade_bridge::Bridge;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

pub const PREFIX: &str = "TEST:CASCADE:";

/// Full name of a served variable.
pub fn pv(reason: &str) -> String {
    format!("{}{}", PREFIX, reason)
}

/// Settings for a fast-polling bridge on an ephemeral port.
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.server.prefix = Some(PREFIX.to_string());
    settings.server.listen = SocketAddr::from(([127, 0, 0, 1], 0));
    settings.server.completion_timeout_ms = 2_000;
    settings.poll.interval_ms = 10;
    settings
}

pub async fn start_bridge(detector: SimulatedDetector) -> (Bridge, Arc<SimulatedDetector>) {
    start_bridge_with(&test_settings(), detector).await
}

pub async fn start_bridge_with(
    settings: &Settings,
    detector: SimulatedDetector,
) -> (Bridge, Arc<SimulatedDetector>) {
    let detector = Arc::new(detector);
    let bridge = Bridge::start(settings, detector.clone())
        .await
        .expect("bridge should start");
    (bridge, detector)
}

/// Poll `condition` until it holds, failing the test after two seconds.
pub async fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
