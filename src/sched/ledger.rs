// src/sched/ledger.rs

//! Global thread/memory accounting for running tasks.
//!
//! The ledger is the only shared mutable state of the scheduler. Admission
//! takes resources out under the mutex and returns a [`LedgerPermit`];
//! dropping the permit puts them back and wakes the dispatcher through a
//! [`Notify`]. There is no polling.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;
use tracing::trace;

/// Ceilings the scheduler enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    pub max_parallel_tasks: usize,
    pub max_threads: u32,
    pub max_memory_gb: u32,
}

impl ResourceLimits {
    /// Whether a task with these demands could ever be admitted.
    pub fn admits(&self, threads: u32, memory_gb: u32) -> bool {
        threads <= self.max_threads && memory_gb <= self.max_memory_gb
    }
}

/// Point-in-time view of the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub available_threads: u32,
    pub available_memory_gb: u32,
    pub running: usize,
}

#[derive(Debug)]
pub struct ResourceLedger {
    limits: ResourceLimits,
    state: Mutex<LedgerSnapshot>,
    released: Notify,
}

impl ResourceLedger {
    pub fn new(limits: ResourceLimits) -> Arc<Self> {
        Arc::new(Self {
            limits,
            state: Mutex::new(LedgerSnapshot {
                available_threads: limits.max_threads,
                available_memory_gb: limits.max_memory_gb,
                running: 0,
            }),
            released: Notify::new(),
        })
    }

    pub fn limits(&self) -> ResourceLimits {
        self.limits
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        *self.lock()
    }

    /// Take `threads` and `memory_gb` if they are available and a worker
    /// slot is free.
    pub fn try_acquire(self: &Arc<Self>, threads: u32, memory_gb: u32) -> Option<LedgerPermit> {
        let mut state = self.lock();
        let fits = threads <= state.available_threads
            && memory_gb <= state.available_memory_gb
            && state.running < self.limits.max_parallel_tasks;
        if !fits {
            return None;
        }

        state.available_threads -= threads;
        state.available_memory_gb -= memory_gb;
        state.running += 1;
        trace!(
            threads,
            memory_gb,
            available_threads = state.available_threads,
            available_memory_gb = state.available_memory_gb,
            running = state.running,
            "resources acquired"
        );

        Some(LedgerPermit {
            ledger: Arc::clone(self),
            threads,
            memory_gb,
        })
    }

    /// Resolves after the next release. A release that happened since the
    /// last call is not lost.
    pub async fn released(&self) {
        self.released.notified().await;
    }

    fn release(&self, threads: u32, memory_gb: u32) {
        {
            let mut state = self.lock();
            state.available_threads += threads;
            state.available_memory_gb += memory_gb;
            state.running -= 1;
            trace!(
                threads,
                memory_gb,
                available_threads = state.available_threads,
                available_memory_gb = state.available_memory_gb,
                running = state.running,
                "resources released"
            );
        }
        self.released.notify_one();
    }

    fn lock(&self) -> MutexGuard<'_, LedgerSnapshot> {
        // A panic while holding the lock cannot leave the counters half
        // updated, so a poisoned guard is still consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Resources held by one running task; returned to the ledger on drop.
#[derive(Debug)]
pub struct LedgerPermit {
    ledger: Arc<ResourceLedger>,
    threads: u32,
    memory_gb: u32,
}

impl Drop for LedgerPermit {
    fn drop(&mut self) {
        self.ledger.release(self.threads, self.memory_gb);
    }
}
