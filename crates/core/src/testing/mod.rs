//! Testing utilities and mock implementations.
//!
//! Misbehaving stores, logs and sessions for exercising failure paths, plus
//! fixtures shared by unit and integration tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use queueline_core::testing::{seed_waiting, FailingEventLog, TestEvents};
//!
//! let events = TestEvents::new();
//! let ids = seed_waiting(store.as_ref(), 1, 3);
//!
//! // A publisher whose durable side always fails
//! let (publisher, _writer) =
//!     create_publish_system(Arc::new(FailingEventLog::new()), events.broadcaster, &config);
//! ```

mod mock_event_log;
mod mock_session;
mod mock_store;

use std::sync::Arc;

pub use fixtures::seed_waiting;
pub use mock_event_log::{FailingEventLog, SlowEventLog};
pub use mock_session::RecordingSession;
pub use mock_store::FailingTicketStore;

use crate::events::{SqliteEventLog, TopicBroadcaster};

/// An in-memory event log and a broadcaster, kept concrete so tests can
/// inspect both.
pub struct TestEvents {
    pub log: Arc<SqliteEventLog>,
    pub broadcaster: Arc<TopicBroadcaster>,
}

impl TestEvents {
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    pub fn with_capacity(broadcast_capacity: usize) -> Self {
        Self {
            log: Arc::new(SqliteEventLog::in_memory().expect("in-memory event log")),
            broadcaster: Arc::new(TopicBroadcaster::new(broadcast_capacity)),
        }
    }
}

impl Default for TestEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::config::{load_config_from_str, Config};
    use crate::ticket::{NewTicket, TicketStore};

    /// Create `count` waiting tickets on `queue_id`, returning their ids in
    /// creation order.
    pub fn seed_waiting(store: &dyn TicketStore, queue_id: i64, count: usize) -> Vec<i64> {
        (0..count)
            .map(|i| {
                store
                    .create(new_ticket(queue_id, &format!("customer-{}", i)))
                    .expect("seed ticket")
                    .id
            })
            .collect()
    }

    /// A ticket request with a five minute estimate.
    pub fn new_ticket(queue_id: i64, customer: &str) -> NewTicket {
        NewTicket::new(queue_id, customer).with_estimated_time(300)
    }

    /// Config with fast ticks, pointing at `db_path`.
    pub fn test_config(db_path: &str) -> Config {
        let toml = format!(
            r#"
[server]
host = "127.0.0.1"
port = 8080

[database]
path = "{}"

[dispatcher]
queues = [1]
tick_interval_ms = 25

[publisher]
append_timeout_ms = 1000
"#,
            db_path
        );
        load_config_from_str(&toml).expect("test config")
    }
}
