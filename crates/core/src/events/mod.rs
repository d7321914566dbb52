//! Queue events: a durable replayable log and an ephemeral broadcast.
//!
//! The two are separate capabilities. [`EventPublisher`] composes them but
//! never lets a failure on one side affect the other.

mod broadcast;
mod log;
mod publisher;
mod types;

pub use broadcast::{
    BroadcastError, Broadcaster, RecvError, Subscription, TopicBroadcaster, DEFAULT_CAPACITY,
};
pub use log::{EventLog, EventLogError, SqliteEventLog};
pub use publisher::{create_publish_system, DeliveryGap, EventPublisher, LogWriter, PublisherConfig};
pub use types::{
    created_event, created_notice, reserved_event, status_changed_event, worker_update_event,
    LoggedEvent, QueueEvent, StreamKeys, DEFAULT_STREAM_BASE, TICKET_CREATED, TICKET_RESERVED,
    TICKET_STATUS_CHANGED, WORKER_UPDATE,
};
