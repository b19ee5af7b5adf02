//! Application wiring.
//!
//! [`Bridge::start`] builds the variable store, the driver and the server,
//! binds the TCP listener and spawns three tasks that share one shutdown
//! signal:
//!
//! - the PV server applying writes;
//! - the poll loop refreshing readbacks;
//! - the TCP front-end.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::bridge::{cascade_database, poll, CascadeDriver};
use crate::config::Settings;
use crate::device::DeviceProxy;
use crate::error::AppResult;
use crate::pv::PvStore;
use crate::server::{tcp, PvServer, ServerHandle};

/// A running bridge.
pub struct Bridge {
    handle: ServerHandle,
    driver: Arc<CascadeDriver>,
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Bridge {
    /// Start serving `proxy` with `settings`.
    ///
    /// Fails if the listen address cannot be bound.
    pub async fn start(settings: &Settings, proxy: Arc<dyn DeviceProxy>) -> AppResult<Self> {
        let prefix = settings.resolve_prefix();
        let store = Arc::new(PvStore::new(prefix.clone(), cascade_database()));
        let driver = Arc::new(CascadeDriver::new(Arc::clone(&store), proxy));

        let (server, handle) = PvServer::new(
            store,
            driver.clone(),
            settings.server.request_capacity,
            settings.server.completion_timeout(),
        );

        let listener = TcpListener::bind(settings.server.listen).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut tasks = Vec::with_capacity(3);
        tasks.push(tokio::spawn(server.run(shutdown_rx.clone())));
        tasks.push(tokio::spawn(poll::run(
            driver.clone(),
            settings.poll.interval(),
            shutdown_rx.clone(),
        )));
        let tcp_handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = tcp::serve(listener, tcp_handle, shutdown_rx).await {
                warn!(error = %e, "TCP front-end failed");
            }
        }));

        info!(%prefix, %local_addr, "Cascade bridge started");

        Ok(Self {
            handle,
            driver,
            local_addr,
            shutdown_tx,
            tasks,
        })
    }

    /// Client handle on the PV server.
    pub fn handle(&self) -> &ServerHandle {
        &self.handle
    }

    /// The driver, for inspecting bridge state.
    pub fn driver(&self) -> &Arc<CascadeDriver> {
        &self.driver
    }

    /// Address the TCP front-end is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signal every task to stop and wait for them.
    pub async fn shutdown(self) {
        info!("Shutting down cascade bridge");
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Bridge task ended abnormally");
            }
        }
        info!("Cascade bridge stopped");
    }
}
