//! Types for queue dispatchers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from starting or stopping dispatchers.
#[derive(Debug, Error)]
pub enum DispatcherError {
    #[error("dispatcher already running for queue {0}")]
    AlreadyRunning(i64),

    #[error("no dispatcher running for queue {0}")]
    NotRunning(i64),

    #[error("invalid queue id: {0}")]
    InvalidQueue(i64),

    /// The dispatcher task panicked or was aborted.
    #[error("dispatcher task failed: {0}")]
    Join(String),
}

/// Where a dispatcher is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatcherState {
    /// Waiting for the next tick.
    Idle,
    /// Reserving tickets until the queue is empty.
    Draining,
    /// Cancelled. Terminal.
    Stopped,
}

/// Counters returned when a dispatcher exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherStats {
    pub passes: u64,
    pub reserved: u64,
    pub store_errors: u64,
    /// Passes cut short because another connection held the write lock.
    pub contended: u64,
    pub delivery_gaps: u64,
}

impl DispatcherStats {
    /// Sum counters of several replicas.
    pub fn merge(mut self, other: DispatcherStats) -> Self {
        self.passes += other.passes;
        self.reserved += other.reserved;
        self.store_errors += other.store_errors;
        self.contended += other.contended;
        self.delivery_gaps += other.delivery_gaps;
        self
    }
}

/// Snapshot of the dispatchers serving one queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherStatus {
    pub queue_id: i64,
    pub replicas: usize,
    /// One entry per replica.
    pub states: Vec<DispatcherState>,
}
