//! Process-variable server.
//!
//! The server owns the write path. Every external write becomes a
//! [`WriteRequest`] on an mpsc queue, and a single task applies the requests
//! one at a time by calling [`Driver::write`]. Reads and monitors go straight
//! to the [`PvStore`] since they never mutate anything.
//!
//! ```text
//! TCP clients ──► ServerHandle ──mpsc──► PvServer::run ──► Driver::write
//!       ▲              │                                        │
//!       └── monitors ◄─┴──────────── PvStore ◄── set_param ─────┘
//! ```
//!
//! Variables declared `asyn` complete later. The driver answers such a write
//! with [`WriteStatus::Pending`] carrying a completion it registered with
//! [`PvStore::register_completion`], and the caller can await it until the
//! driver releases it.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::error::{AppResult, BridgeError};
use crate::pv::{PvStore, PvUpdate, PvValue};

pub mod protocol;
pub mod tcp;

/// Outcome of a dispatched write.
#[derive(Debug)]
pub enum WriteStatus {
    /// The write is complete.
    Done,
    /// The write completes when the driver releases this completion.
    Pending(oneshot::Receiver<()>),
}

impl WriteStatus {
    /// Whether the write is still waiting on the driver.
    pub fn is_pending(&self) -> bool {
        matches!(self, WriteStatus::Pending(_))
    }
}

/// Handler for writes arriving at the server.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Apply a write to `reason`. `value` is already coerced to the
    /// variable's native type.
    async fn write(&self, reason: &str, value: PvValue) -> WriteStatus;
}

/// A write waiting for the server task.
#[derive(Debug)]
pub struct WriteRequest {
    reason: String,
    value: PvValue,
    response: oneshot::Sender<AppResult<Completion>>,
}

/// Completion of an accepted write.
#[derive(Debug)]
pub struct Completion {
    reason: String,
    pending: Option<oneshot::Receiver<()>>,
}

impl Completion {
    /// Whether the write is still waiting on the driver.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Wait until the write completes or `timeout` elapses.
    pub async fn wait(self, timeout: Duration) -> AppResult<()> {
        let Some(pending) = self.pending else {
            return Ok(());
        };
        match tokio::time::timeout(timeout, pending).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(BridgeError::ServerShutdown),
            Err(_) => Err(BridgeError::CompletionTimeout(self.reason)),
        }
    }
}

/// Task applying writes to a [`Driver`].
pub struct PvServer {
    store: Arc<PvStore>,
    driver: Arc<dyn Driver>,
    requests: mpsc::Receiver<WriteRequest>,
}

impl PvServer {
    /// Create a server and the handle used to talk to it.
    pub fn new(
        store: Arc<PvStore>,
        driver: Arc<dyn Driver>,
        capacity: usize,
        completion_timeout: Duration,
    ) -> (Self, ServerHandle) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = ServerHandle {
            store: Arc::clone(&store),
            requests: tx,
            completion_timeout,
        };
        let server = Self {
            store,
            driver,
            requests: rx,
        };
        (server, handle)
    }

    /// Process write requests until `shutdown` flips to true or every handle
    /// is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(prefix = %self.store.prefix(), "PV server started");

        loop {
            tokio::select! {
                request = self.requests.recv() => {
                    let Some(request) = request else { break };
                    let result = self.apply(&request.reason, request.value).await;
                    let _ = request.response.send(result);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("PV server shutting down");
    }

    async fn apply(&self, reason: &str, value: PvValue) -> AppResult<Completion> {
        let definition = self
            .store
            .definition(reason)
            .ok_or_else(|| BridgeError::UnknownPv(reason.to_string()))?;

        debug!(reason, value = %value, "Dispatching write");
        let pending = match self.driver.write(reason, value).await {
            WriteStatus::Pending(completion) if definition.asyn => Some(completion),
            WriteStatus::Pending(_) => {
                warn!(reason, "Driver left a synchronous write pending");
                None
            }
            WriteStatus::Done => None,
        };

        Ok(Completion {
            reason: reason.to_string(),
            pending,
        })
    }
}

/// Cloneable client-side handle on a running [`PvServer`].
///
/// All names taken by the handle are full network names (prefix included).
#[derive(Clone)]
pub struct ServerHandle {
    store: Arc<PvStore>,
    requests: mpsc::Sender<WriteRequest>,
    completion_timeout: Duration,
}

impl ServerHandle {
    /// Store behind the server.
    pub fn store(&self) -> &Arc<PvStore> {
        &self.store
    }

    /// Default timeout for [`put_and_wait`](Self::put_and_wait).
    pub fn completion_timeout(&self) -> Duration {
        self.completion_timeout
    }

    /// Short name for `full_name`, or `UnknownPv`.
    pub fn resolve(&self, full_name: &str) -> AppResult<String> {
        self.store
            .reason_for(full_name)
            .map(str::to_string)
            .ok_or_else(|| BridgeError::UnknownPv(full_name.to_string()))
    }

    /// All served names, prefix included.
    pub fn names(&self) -> Vec<String> {
        self.store
            .names()
            .iter()
            .map(|reason| self.store.full_name(reason))
            .collect()
    }

    /// Current value of `full_name`.
    pub fn get(&self, full_name: &str) -> AppResult<PvValue> {
        let reason = self.resolve(full_name)?;
        self.store
            .get(&reason)
            .ok_or(BridgeError::UnknownPv(reason))
    }

    /// Definition of `full_name` as JSON.
    pub fn info(&self, full_name: &str) -> AppResult<serde_json::Value> {
        let reason = self.resolve(full_name)?;
        let definition = self
            .store
            .definition(&reason)
            .ok_or_else(|| BridgeError::UnknownPv(reason.clone()))?;
        serde_json::to_value(definition.as_ref())
            .map_err(|e| BridgeError::Protocol(format!("cannot encode definition: {}", e)))
    }

    /// Subscribe to posted updates of `full_name`.
    pub fn subscribe(&self, full_name: &str) -> AppResult<watch::Receiver<PvUpdate>> {
        let reason = self.resolve(full_name)?;
        self.store
            .subscribe(&reason)
            .ok_or(BridgeError::UnknownPv(reason))
    }

    /// Write `value` to `full_name`.
    ///
    /// Returns once the driver has accepted the write. Rejects unknown and
    /// read-only variables and values that do not fit the variable's type.
    pub async fn put(&self, full_name: &str, value: PvValue) -> AppResult<Completion> {
        let reason = self.resolve(full_name)?;
        let definition = self
            .store
            .definition(&reason)
            .ok_or_else(|| BridgeError::UnknownPv(reason.clone()))?;
        if !definition.writable {
            return Err(BridgeError::ReadOnly(full_name.to_string()));
        }
        let value = definition.coerce(&reason, value)?;

        let (tx, rx) = oneshot::channel();
        self.requests
            .send(WriteRequest {
                reason,
                value,
                response: tx,
            })
            .await
            .map_err(|_| BridgeError::ServerShutdown)?;
        rx.await.map_err(|_| BridgeError::ServerShutdown)?
    }

    /// Parse `text` for `full_name` and write it.
    pub async fn put_text(&self, full_name: &str, text: &str) -> AppResult<Completion> {
        self.put(full_name, PvValue::Str(text.to_string())).await
    }

    /// Write `value` and wait for its completion using the configured timeout.
    pub async fn put_and_wait(&self, full_name: &str, value: PvValue) -> AppResult<()> {
        self.put(full_name, value)
            .await?
            .wait(self.completion_timeout)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pv::PvDefinition;
    use parking_lot::Mutex;

    /// Records writes; completes `ASYNC:SP` only when told to.
    struct RecordingDriver {
        store: Arc<PvStore>,
        writes: Mutex<Vec<(String, PvValue)>>,
    }

    #[async_trait]
    impl Driver for RecordingDriver {
        async fn write(&self, reason: &str, value: PvValue) -> WriteStatus {
            self.writes.lock().push((reason.to_string(), value.clone()));
            let _ = self.store.set_param(reason, value);
            match reason {
                "ASYNC:SP" => match self.store.register_completion(reason) {
                    Ok(completion) => WriteStatus::Pending(completion),
                    Err(_) => WriteStatus::Done,
                },
                _ => WriteStatus::Done,
            }
        }
    }

    fn start() -> (Arc<RecordingDriver>, ServerHandle, watch::Sender<bool>) {
        let store = Arc::new(PvStore::new(
            "T:",
            vec![
                ("VAL", PvDefinition::int()),
                ("VAL:SP", PvDefinition::int().writable()),
                ("ASYNC:SP", PvDefinition::int().writable().asynchronous()),
            ],
        ));
        let driver = Arc::new(RecordingDriver {
            store: Arc::clone(&store),
            writes: Mutex::new(Vec::new()),
        });
        let (server, handle) =
            PvServer::new(store, driver.clone(), 8, Duration::from_millis(200));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(server.run(shutdown_rx));
        (driver, handle, shutdown_tx)
    }

    #[tokio::test]
    async fn test_put_dispatches_to_driver() {
        let (driver, handle, _shutdown) = start();
        let completion = handle.put_text("T:VAL:SP", "5").await.unwrap();
        assert!(!completion.is_pending());
        assert_eq!(
            driver.writes.lock().clone(),
            vec![("VAL:SP".to_string(), PvValue::Int(5))]
        );
        assert_eq!(handle.get("T:VAL:SP").unwrap(), PvValue::Int(5));
    }

    #[tokio::test]
    async fn test_put_rejects_read_only_and_unknown() {
        let (driver, handle, _shutdown) = start();
        assert!(matches!(
            handle.put("T:VAL", PvValue::Int(1)).await,
            Err(BridgeError::ReadOnly(_))
        ));
        assert!(matches!(
            handle.put("T:NOPE", PvValue::Int(1)).await,
            Err(BridgeError::UnknownPv(_))
        ));
        assert!(matches!(
            handle.put_text("T:VAL:SP", "many").await,
            Err(BridgeError::InvalidValue { .. })
        ));
        assert!(driver.writes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_async_write_waits_for_callback() {
        let (_driver, handle, _shutdown) = start();
        let completion = handle.put("T:ASYNC:SP", PvValue::Int(1)).await.unwrap();
        assert!(completion.is_pending());

        let store = Arc::clone(handle.store());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            store.take_completions("ASYNC:SP").release();
        });
        completion.wait(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_async_write_times_out_without_callback() {
        let (_driver, handle, _shutdown) = start();
        let result = handle.put_and_wait("T:ASYNC:SP", PvValue::Int(1)).await;
        assert!(matches!(result, Err(BridgeError::CompletionTimeout(_))));
    }

    #[tokio::test]
    async fn test_put_after_shutdown_fails() {
        let (_driver, handle, shutdown) = start();
        shutdown.send(true).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(
            handle.put("T:VAL:SP", PvValue::Int(1)).await,
            Err(BridgeError::ServerShutdown)
        ));
    }
}
