//! Event payloads, durable records and key naming.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::ticket::{Reservation, Ticket, TicketStatus};

/// Opaque event payload. The publisher never looks inside.
pub type QueueEvent = Map<String, Value>;

pub const TICKET_CREATED: &str = "ticket.created";
pub const TICKET_RESERVED: &str = "ticket.reserved";
pub const TICKET_STATUS_CHANGED: &str = "ticket.status_changed";
pub const WORKER_UPDATE: &str = "worker.update";

/// Default base name for durable logs.
pub const DEFAULT_STREAM_BASE: &str = "queue.stream";

/// One entry of a durable log, as read back for replay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggedEvent {
    pub key: String,
    /// Position within `key`, starting at 1.
    pub offset: u64,
    pub recorded_at: DateTime<Utc>,
    pub payload: QueueEvent,
}

/// Naming scheme for broadcast channels and durable logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamKeys {
    base: String,
}

impl StreamKeys {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Ephemeral channel observers of a queue subscribe to.
    pub fn broadcast(&self, queue_id: i64) -> String {
        format!("queue.{}.broadcast", queue_id)
    }

    /// Durable log of dispatch events for one queue.
    pub fn queue_log(&self, queue_id: i64) -> String {
        format!("{}.{}", self.base, queue_id)
    }

    /// Durable log of ticket creations across all queues.
    pub fn creation_log(&self) -> String {
        self.base.clone()
    }

    pub fn worker_updates(&self, queue_id: i64) -> String {
        format!("{}.worker.updates.{}", self.base, queue_id)
    }
}

impl Default for StreamKeys {
    fn default() -> Self {
        Self::new(DEFAULT_STREAM_BASE)
    }
}

pub(crate) fn timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn object(value: Value) -> QueueEvent {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Durable creation record.
pub fn created_event(ticket: &Ticket) -> QueueEvent {
    object(json!({
        "event": TICKET_CREATED,
        "ticket_id": ticket.id,
        "queue_id": ticket.queue_id,
        "created_at": timestamp(ticket.created_at),
    }))
}

/// Creation notice for live observers.
pub fn created_notice(ticket: &Ticket) -> QueueEvent {
    object(json!({
        "event": TICKET_CREATED,
        "ticket_id": ticket.id,
        "queue_id": ticket.queue_id,
    }))
}

/// Reservation record. `version` is the version the store committed.
pub fn reserved_event(reservation: &Reservation) -> QueueEvent {
    object(json!({
        "event": TICKET_RESERVED,
        "ticket_id": reservation.ticket.id,
        "queue_id": reservation.ticket.queue_id,
        "status": TicketStatus::Processing.as_str(),
        "version": reservation.new_version,
        "reserved_at": timestamp(reservation.reserved_at),
    }))
}

pub fn status_changed_event(
    ticket_id: i64,
    queue_id: i64,
    from: TicketStatus,
    to: TicketStatus,
    new_version: i64,
) -> QueueEvent {
    object(json!({
        "event": TICKET_STATUS_CHANGED,
        "ticket_id": ticket_id,
        "queue_id": queue_id,
        "from": from.as_str(),
        "status": to.as_str(),
        "version": new_version,
    }))
}

/// Fill in `event` and `queue_id` on a worker-supplied payload if missing.
pub fn worker_update_event(queue_id: i64, mut payload: QueueEvent) -> QueueEvent {
    payload
        .entry("event")
        .or_insert_with(|| Value::from(WORKER_UPDATE));
    payload
        .entry("queue_id")
        .or_insert_with(|| Value::from(queue_id));
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::INITIAL_VERSION;
    use chrono::TimeZone;

    fn sample_ticket() -> Ticket {
        let created = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        Ticket {
            id: 7,
            queue_id: 2,
            customer_name: "A".to_string(),
            priority: 1,
            estimated_time: 0,
            status: TicketStatus::Waiting,
            assigned_worker: None,
            version: INITIAL_VERSION,
            created_at: created,
            updated_at: created,
            completed_at: None,
        }
    }

    #[test]
    fn test_stream_keys() {
        let keys = StreamKeys::default();
        assert_eq!(keys.broadcast(3), "queue.3.broadcast");
        assert_eq!(keys.queue_log(3), "queue.stream.3");
        assert_eq!(keys.creation_log(), "queue.stream");
        assert_eq!(keys.worker_updates(3), "queue.stream.worker.updates.3");

        let custom = StreamKeys::new("line");
        assert_eq!(custom.queue_log(1), "line.1");
    }

    #[test]
    fn test_created_event_fields() {
        let event = created_event(&sample_ticket());
        assert_eq!(event["event"], TICKET_CREATED);
        assert_eq!(event["ticket_id"], 7);
        assert_eq!(event["queue_id"], 2);
        assert_eq!(event["created_at"], "2026-03-01T09:30:00.000000Z");

        let notice = created_notice(&sample_ticket());
        assert!(!notice.contains_key("created_at"));
    }

    #[test]
    fn test_reserved_event_uses_committed_version() {
        let ticket = sample_ticket();
        let reservation = Reservation {
            reserved_at: ticket.created_at,
            ticket,
            new_version: 2,
        };

        let event = reserved_event(&reservation);
        assert_eq!(event["event"], TICKET_RESERVED);
        assert_eq!(event["status"], "processing");
        assert_eq!(event["version"], 2);
        assert_eq!(event["reserved_at"], "2026-03-01T09:30:00.000000Z");
    }

    #[test]
    fn test_worker_update_keeps_caller_fields() {
        let mut payload = QueueEvent::new();
        payload.insert("event".to_string(), Value::from("eta.changed"));
        payload.insert("estimated_time".to_string(), Value::from(120));

        let event = worker_update_event(4, payload);
        assert_eq!(event["event"], "eta.changed");
        assert_eq!(event["queue_id"], 4);
        assert_eq!(event["estimated_time"], 120);

        let defaulted = worker_update_event(4, QueueEvent::new());
        assert_eq!(defaulted["event"], WORKER_UPDATE);
    }
}
