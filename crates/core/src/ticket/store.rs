//! Ticket storage trait and error type.

use thiserror::Error;

use super::{ArchiveOutcome, NewTicket, QueueStats, Reservation, StatusUpdate, Ticket, TicketStatus};

/// Error type for ticket operations.
///
/// "None available" and optimistic-lock conflicts are not errors; they are
/// reported through `Option<Reservation>` and [`StatusUpdate::Conflict`].
#[derive(Debug, Error)]
pub enum TicketError {
    /// Ticket not found.
    #[error("ticket not found: {0}")]
    NotFound(i64),

    /// The requested status change is never legal.
    #[error("cannot move ticket {ticket_id} from {from} to {to}")]
    InvalidTransition {
        ticket_id: i64,
        from: TicketStatus,
        to: TicketStatus,
    },

    /// Only done tickets move to history.
    #[error("ticket {ticket_id} is {status}; only done tickets can be archived")]
    NotArchivable { ticket_id: i64, status: TicketStatus },

    /// Caller-supplied data was rejected before reaching the store.
    #[error("invalid ticket: {0}")]
    Validation(String),

    /// Another connection held SQLite's write lock for longer than the
    /// reservation is willing to wait. Nothing was read or written.
    #[error("queue {0} is locked by another writer")]
    Contended(i64),

    /// Store unreachable, constraint violation, or transaction failure.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl From<rusqlite::Error> for TicketError {
    fn from(e: rusqlite::Error) -> Self {
        TicketError::Persistence(e.to_string())
    }
}

/// Trait for ticket storage backends.
///
/// Every method must be safe under an unbounded number of concurrent callers.
pub trait TicketStore: Send + Sync {
    /// Persist a new `waiting` ticket.
    fn create(&self, ticket: NewTicket) -> Result<Ticket, TicketError>;

    /// Get a ticket by ID.
    fn get(&self, id: i64) -> Result<Ticket, TicketError>;

    /// Tickets of one queue in a status, oldest first (ties broken by id).
    fn list_by_status(&self, queue_id: i64, status: TicketStatus)
        -> Result<Vec<Ticket>, TicketError>;

    /// Count tickets of one queue in a status.
    fn count_by_status(&self, queue_id: i64, status: TicketStatus) -> Result<i64, TicketError>;

    /// Atomically claim the oldest waiting ticket of a queue.
    ///
    /// Returns `Ok(None)` when nothing is waiting.
    fn reserve_next(&self, queue_id: i64) -> Result<Option<Reservation>, TicketError>;

    /// Conditionally move a ticket from `expected_old` to `new_status`.
    fn update_status(
        &self,
        id: i64,
        expected_old: TicketStatus,
        new_status: TicketStatus,
        expected_version: i64,
    ) -> Result<StatusUpdate, TicketError>;

    /// Move a done ticket into the history table.
    fn archive(&self, id: i64) -> Result<ArchiveOutcome, TicketError>;

    /// Put a processing ticket back in line.
    fn requeue(&self, id: i64, expected_version: i64) -> Result<StatusUpdate, TicketError> {
        self.update_status(
            id,
            TicketStatus::Processing,
            TicketStatus::Waiting,
            expected_version,
        )
    }

    /// Per-status counts for one queue.
    fn queue_stats(&self, queue_id: i64) -> Result<QueueStats, TicketError> {
        Ok(QueueStats {
            queue_id,
            waiting: self.count_by_status(queue_id, TicketStatus::Waiting)?,
            processing: self.count_by_status(queue_id, TicketStatus::Processing)?,
            done: self.count_by_status(queue_id, TicketStatus::Done)?,
        })
    }
}
