//! Published variable store.
//!
//! `PvStore` holds the current value of every process variable served by the
//! bridge. It mirrors the two-step publishing model of a channel-access
//! driver:
//!
//! 1. `set_param()` updates the stored value and marks it dirty when it
//!    changed;
//! 2. `update_pvs()` posts every dirty value to its monitor channel.
//!
//! Monitors use `tokio::sync::watch` so any number of subscribers can follow
//! a variable without the store tracking them. Asynchronous writes register
//! a one-shot completion. The driver later takes the registered waiters with
//! `take_completions()` and releases exactly that set once the work is done.
//!
//! Variables are keyed by their short name (the "reason", e.g. `BINX:SP`);
//! the server prefix is only applied at the network edge.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};

use crate::error::{AppResult, BridgeError};
use crate::pv::definition::PvDefinition;
use crate::pv::value::PvValue;

/// A posted value together with its update time.
#[derive(Debug, Clone, PartialEq)]
pub struct PvUpdate {
    /// Value at the time of posting.
    pub value: PvValue,
    /// When the value was last set.
    pub timestamp: DateTime<Utc>,
}

struct PvRecord {
    definition: Arc<PvDefinition>,
    value: PvValue,
    timestamp: DateTime<Utc>,
    dirty: bool,
    monitor: watch::Sender<PvUpdate>,
}

/// Thread-safe store of published process variables.
pub struct PvStore {
    prefix: String,
    records: RwLock<HashMap<String, PvRecord>>,
    completions: Mutex<HashMap<String, Vec<oneshot::Sender<()>>>>,
}

impl std::fmt::Debug for PvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PvStore")
            .field("prefix", &self.prefix)
            .field("variables", &self.records.read().len())
            .finish()
    }
}

impl PvStore {
    /// Create a store serving `definitions` under `prefix`.
    pub fn new<I, N>(prefix: impl Into<String>, definitions: I) -> Self
    where
        I: IntoIterator<Item = (N, PvDefinition)>,
        N: Into<String>,
    {
        let now = Utc::now();
        let records = definitions
            .into_iter()
            .map(|(name, definition)| {
                let value = definition.initial.clone();
                let (monitor, _) = watch::channel(PvUpdate {
                    value: value.clone(),
                    timestamp: now,
                });
                let record = PvRecord {
                    definition: Arc::new(definition),
                    value,
                    timestamp: now,
                    dirty: false,
                    monitor,
                };
                (name.into(), record)
            })
            .collect();

        Self {
            prefix: prefix.into(),
            records: RwLock::new(records),
            completions: Mutex::new(HashMap::new()),
        }
    }

    /// Name prefix applied on the network.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Full network name of `reason`.
    pub fn full_name(&self, reason: &str) -> String {
        format!("{}{}", self.prefix, reason)
    }

    /// Map a full network name back to the short name, if it is served here.
    pub fn reason_for<'a>(&self, full_name: &'a str) -> Option<&'a str> {
        full_name
            .strip_prefix(self.prefix.as_str())
            .filter(|reason| self.contains(reason))
    }

    /// Whether `reason` is served by this store.
    pub fn contains(&self, reason: &str) -> bool {
        self.records.read().contains_key(reason)
    }

    /// Short names of all variables, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.records.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Definition of `reason`.
    pub fn definition(&self, reason: &str) -> Option<Arc<PvDefinition>> {
        self.records
            .read()
            .get(reason)
            .map(|r| Arc::clone(&r.definition))
    }

    /// Current (possibly not yet posted) value of `reason`.
    pub fn get(&self, reason: &str) -> Option<PvValue> {
        self.records.read().get(reason).map(|r| r.value.clone())
    }

    /// Store a new value for `reason`.
    ///
    /// The value is coerced to the variable's native type. Returns whether the
    /// value changed; changed values are posted by the next `update_pvs()`.
    pub fn set_param(&self, reason: &str, value: impl Into<PvValue>) -> AppResult<bool> {
        let mut records = self.records.write();
        let record = records
            .get_mut(reason)
            .ok_or_else(|| BridgeError::UnknownPv(reason.to_string()))?;

        let value = record.definition.coerce(reason, value.into())?;
        record.timestamp = Utc::now();
        if record.value == value {
            return Ok(false);
        }
        record.value = value;
        record.dirty = true;
        Ok(true)
    }

    /// Post every changed value to its monitors. Returns the number posted.
    pub fn update_pvs(&self) -> usize {
        let mut records = self.records.write();
        let mut posted = 0;
        for record in records.values_mut().filter(|r| r.dirty) {
            record.dirty = false;
            record.monitor.send_replace(PvUpdate {
                value: record.value.clone(),
                timestamp: record.timestamp,
            });
            posted += 1;
        }
        posted
    }

    /// Subscribe to posted updates of `reason`.
    pub fn subscribe(&self, reason: &str) -> Option<watch::Receiver<PvUpdate>> {
        self.records.read().get(reason).map(|r| r.monitor.subscribe())
    }

    /// Register interest in the next completion of `reason`.
    pub fn register_completion(&self, reason: &str) -> AppResult<oneshot::Receiver<()>> {
        if !self.contains(reason) {
            return Err(BridgeError::UnknownPv(reason.to_string()));
        }
        let (tx, rx) = oneshot::channel();
        let mut completions = self.completions.lock();
        let waiters = completions.entry(reason.to_string()).or_default();
        waiters.retain(|w| !w.is_closed());
        waiters.push(tx);
        Ok(rx)
    }

    /// Take every live waiter registered on `reason`.
    ///
    /// Waiters registered afterwards belong to the next take.
    pub fn take_completions(&self, reason: &str) -> Waiters {
        let waiters = self.completions.lock().remove(reason).unwrap_or_default();
        Waiters(waiters.into_iter().filter(|w| !w.is_closed()).collect())
    }
}

/// Completion waiters taken from the store, released together.
#[derive(Debug, Default)]
pub struct Waiters(Vec<oneshot::Sender<()>>);

impl Waiters {
    /// Number of waiters in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Complete every waiter. Returns how many were still listening.
    pub fn release(self) -> usize {
        self.0
            .into_iter()
            .filter_map(|waiter| waiter.send(()).ok())
            .count()
    }
}
