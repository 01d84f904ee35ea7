//! Named concurrency gates bounding the expensive pipeline phases.
//!
//! A gate is a capacity-bounded admission primitive: a loader task
//! acquires a permit before entering a CPU/memory-intensive phase and the
//! permit is released on drop, so failures and cancellation can never
//! strand capacity. Gates live on the pipeline context, not in statics:
//! every pipeline instance (and every test) gets its own isolated set.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::GateConfig;

/// Gate guarding the general decode and transform phases.
pub const DECODE_GATE: &str = "decode";

/// Gate serializing access to non-reentrant auxiliary codecs (WebP).
pub const AUXILIARY_GATE: &str = "webp";

/// A named, capacity-bounded admission gate.
///
/// Permits are granted in FIFO order of request. Acquisition suspends the
/// calling task; it never blocks a worker thread.
#[derive(Debug)]
pub struct ConcurrencyGate {
    name: String,
    capacity: usize,
    semaphore: Arc<Semaphore>,
}

impl ConcurrencyGate {
    /// Create a gate with the given name and capacity (minimum 1).
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            name: name.into(),
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// The gate's name, used in config lookup and logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The gate's total permit capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of permits currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Acquire one permit, suspending until one is free.
    pub async fn acquire(&self) -> GatePermit {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            // The semaphore is owned by this gate and never closed.
            .expect("gate semaphore closed");
        tracing::trace!(gate = %self.name, "permit acquired");
        GatePermit {
            gate: self.name.clone(),
            _permit: permit,
        }
    }
}

/// One unit of admitted concurrency; released unconditionally on drop.
#[derive(Debug)]
pub struct GatePermit {
    gate: String,
    _permit: OwnedSemaphorePermit,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        tracing::trace!(gate = %self.gate, "permit released");
    }
}

/// Lazily-constructed set of named gates shared by all loader tasks of
/// one pipeline instance.
#[derive(Debug)]
pub struct GateSet {
    config: GateConfig,
    gates: Mutex<HashMap<String, Arc<ConcurrencyGate>>>,
}

impl GateSet {
    /// Create a gate set using the configured capacities.
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Get the gate with the given name, creating it on first use with
    /// the configured capacity (default 1 for unknown names).
    pub fn gate(&self, name: &str) -> Arc<ConcurrencyGate> {
        let mut gates = match self.gates.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        gates
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(ConcurrencyGate::new(name, self.config.capacity_for(name)))
            })
            .clone()
    }
}
