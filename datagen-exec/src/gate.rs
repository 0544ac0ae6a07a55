//! Execution gate: the run-wide bound on simultaneous remote executions.
//!
//! Callers acquire a [`GatePermit`] before launching an execution and hold it
//! until the execution has finished. The permit releases its slot when
//! dropped, so a failed or panicking execution cannot leak capacity.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Default number of simultaneous executions.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// The gate was closed; no further slots will be handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("execution gate closed")]
pub struct GateClosed;

/// Counting semaphore shared by every execution of a run.
///
/// Cloning shares the same slots.
#[derive(Debug, Clone)]
pub struct ExecutionGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// One held slot. Dropping it releases the slot.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl ExecutionGate {
    /// Create a gate with `capacity` slots (at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free slot.
    ///
    /// Fails only once the gate has been [closed](Self::close).
    pub async fn acquire(&self) -> Result<GatePermit, GateClosed> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| GateClosed)?;
        Ok(GatePermit { _permit: permit })
    }

    /// Take a free slot without waiting, if there is one.
    pub fn try_acquire(&self) -> Option<GatePermit> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| GatePermit { _permit: permit })
    }

    /// Stop handing out slots.
    ///
    /// Pending and future [`acquire`](Self::acquire) calls fail with
    /// [`GateClosed`]; permits already held stay valid until dropped.
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// True once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently held.
    pub fn in_flight(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }
}

impl Default for ExecutionGate {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}
