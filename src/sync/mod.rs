//! Bounded-wait gates for long-poll style operations.
//!
//! # Responsibilities
//! - Park any number of async waiters until they are released together
//! - Bound the number parked: past `capacity`, the oldest waiter is let go
//! - Group gates by name
//!
//! # Design Decisions
//! - Each waiter owns a `oneshot` receiver; releasing is sending on the sender
//! - Waiters that were dropped (client went away) are purged on the next operation
//! - The lock is never held across an await

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use tokio::sync::oneshot;

pub const DEFAULT_CAPACITY: usize = 16;

pub const DEFAULT_GROUP: &str = "default";

/// Why [`WaitGate::wait`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Released,
    /// Pushed out because more than `capacity` waiters were parked.
    Evicted,
}

struct Waiter {
    tx: oneshot::Sender<WaitOutcome>,
}

/// Parks async waiters until [`release_all`](WaitGate::release_all).
#[derive(Debug)]
pub struct WaitGate {
    capacity: usize,
    waiters: Mutex<VecDeque<Waiter>>,
}

impl std::fmt::Debug for Waiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waiter").field("closed", &self.tx.is_closed()).finish()
    }
}

impl Default for WaitGate {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl WaitGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            waiters: Mutex::new(VecDeque::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Wait until released or evicted.
    pub async fn wait(&self) -> WaitOutcome {
        let (tx, rx) = oneshot::channel();
        {
            let mut waiters = self.lock();
            waiters.retain(|waiter| !waiter.tx.is_closed());
            waiters.push_back(Waiter { tx });
            while waiters.len() > self.capacity {
                if let Some(oldest) = waiters.pop_front() {
                    let _ = oldest.tx.send(WaitOutcome::Evicted);
                }
            }
        }
        // The sender is only dropped when the gate itself is dropped.
        rx.await.unwrap_or(WaitOutcome::Released)
    }

    /// Wake every waiter. Returns how many were still waiting.
    pub fn release_all(&self) -> usize {
        let drained: Vec<Waiter> = self.lock().drain(..).collect();
        drained
            .into_iter()
            .map(|waiter| waiter.tx.send(WaitOutcome::Released).is_ok())
            .filter(|sent| *sent)
            .count()
    }

    /// Waiters currently parked.
    pub fn waiting(&self) -> usize {
        let mut waiters = self.lock();
        waiters.retain(|waiter| !waiter.tx.is_closed());
        waiters.len()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Waiter>> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Named [`WaitGate`]s, created on first use.
#[derive(Debug, Clone)]
pub struct SemaphoreGroup {
    gates: Arc<DashMap<String, Arc<WaitGate>>>,
    capacity: usize,
}

impl Default for SemaphoreGroup {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl SemaphoreGroup {
    /// Gates created by this group use `capacity`.
    pub fn new(capacity: usize) -> Self {
        Self {
            gates: Arc::new(DashMap::new()),
            capacity,
        }
    }

    /// The gate for `name`, created if missing.
    pub fn gate(&self, name: &str) -> Arc<WaitGate> {
        if let Some(gate) = self.gates.get(name) {
            return Arc::clone(gate.value());
        }
        let entry = self
            .gates
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(WaitGate::new(self.capacity)));
        Arc::clone(entry.value())
    }

    pub async fn wait(&self, name: &str) -> WaitOutcome {
        let gate = self.gate(name);
        gate.wait().await
    }

    /// Release the named gate. Unknown names release nothing.
    pub fn release_all(&self, name: &str) -> usize {
        let gate = self.gates.get(name).map(|gate| Arc::clone(gate.value()));
        gate.map_or(0, |gate| gate.release_all())
    }

    /// Release every gate and forget them.
    pub fn release_everything(&self) -> usize {
        let gates: Vec<Arc<WaitGate>> = self.gates.iter().map(|gate| Arc::clone(gate.value())).collect();
        self.gates.clear();
        gates.iter().map(|gate| gate.release_all()).sum()
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }
}
