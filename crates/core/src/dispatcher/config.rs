//! Dispatcher configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for queue dispatchers (`[dispatcher]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Start dispatchers for `queues` at boot.
    /// When disabled, dispatchers can still be started via API.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Queue ids to dispatch at boot.
    #[serde(default = "default_queues")]
    pub queues: Vec<i64>,

    /// How often an idle dispatcher looks for waiting tickets (milliseconds).
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Dispatcher tasks started per queue. Replicas compete through the
    /// store's reservation and never hand out the same ticket twice.
    #[serde(default = "default_replicas")]
    pub replicas_per_queue: usize,

    /// Reservations per pass before yielding to the next tick (0 = unlimited).
    #[serde(default)]
    pub max_batch_per_pass: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_queues() -> Vec<i64> {
    vec![1]
}

fn default_tick_interval() -> u64 {
    2000 // 2 seconds
}

fn default_replicas() -> usize {
    1
}

impl DispatcherConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Pass limit, `None` when unlimited.
    pub fn batch_limit(&self) -> Option<usize> {
        (self.max_batch_per_pass > 0).then_some(self.max_batch_per_pass)
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            queues: default_queues(),
            tick_interval_ms: default_tick_interval(),
            replicas_per_queue: default_replicas(),
            max_batch_per_pass: 0,
        }
    }
}
