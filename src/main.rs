//! `cascade-bridge` binary.

use anyhow::{Context, Result};
use clap::Parser;
use mimalloc::MiMalloc;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use cascade_bridge::config::Settings;
use cascade_bridge::device::SimulatedDetector;
use cascade_bridge::{logging, Bridge};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Serve a CASCADE detector as process variables.
#[derive(Parser, Debug)]
#[command(name = "cascade-bridge", version, about)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// PV prefix. Overrides the configuration and MYPVPREFIX.
    #[arg(long)]
    prefix: Option<String>,

    /// Address of the TCP line protocol.
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON logs.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn apply(self, settings: &mut Settings) {
        if let Some(prefix) = self.prefix {
            settings.server.prefix = Some(prefix);
        }
        if let Some(listen) = self.listen {
            settings.server.listen = listen;
        }
        if let Some(level) = self.log_level {
            settings.logging.level = level;
        }
        if self.json_logs {
            settings.logging.json = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply(&mut settings);
    settings.validate().context("Invalid configuration")?;

    logging::init(&settings.logging).context("Failed to initialize logging")?;

    let detector = Arc::new(SimulatedDetector::from_config(&settings.detector));
    let bridge = Bridge::start(&settings, detector)
        .await
        .context("Failed to start bridge")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Received Ctrl-C");

    bridge.shutdown().await;
    Ok(())
}
