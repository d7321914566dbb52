//! Core ticket data types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version assigned to a ticket when it is created.
pub const INITIAL_VERSION: i64 = 1;

/// Priority assigned when the caller leaves it unset (or sends 0).
pub const DEFAULT_PRIORITY: i32 = 1;

/// Lifecycle status of a ticket.
///
/// `Waiting` tickets are eligible for reservation, `Processing` tickets are
/// owned by a downstream worker, `Done` is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Waiting,
    Processing,
    Done,
}

impl TicketStatus {
    /// The value stored in the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Waiting => "waiting",
            TicketStatus::Processing => "processing",
            TicketStatus::Done => "done",
        }
    }

    /// Whether this status admits no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TicketStatus::Done)
    }

    /// Whether `self -> to` is a legal conditional update.
    ///
    /// `Waiting -> Processing` is deliberately absent: it belongs to
    /// reservation, which claims rows under a transaction instead.
    pub fn can_update_to(&self, to: TicketStatus) -> bool {
        matches!(
            (self, to),
            (TicketStatus::Processing, TicketStatus::Waiting)
                | (TicketStatus::Processing, TicketStatus::Done)
        )
    }

    pub fn all() -> [TicketStatus; 3] {
        [
            TicketStatus::Waiting,
            TicketStatus::Processing,
            TicketStatus::Done,
        ]
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown ticket status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for TicketStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(TicketStatus::Waiting),
            "processing" => Ok(TicketStatus::Processing),
            "done" => Ok(TicketStatus::Done),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A unit of work waiting in a queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    pub id: i64,
    pub queue_id: i64,
    pub customer_name: String,
    pub priority: i32,
    /// Informational estimate in seconds.
    pub estimated_time: i64,
    pub status: TicketStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_worker: Option<String>,
    /// Optimistic concurrency token.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Request to create a new ticket.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTicket {
    pub queue_id: i64,
    pub customer_name: String,
    /// `None` or `Some(0)` means [`DEFAULT_PRIORITY`].
    pub priority: Option<i32>,
    pub estimated_time: i64,
    /// `None` means `Waiting`, the only status a ticket may be created in.
    pub status: Option<TicketStatus>,
}

impl NewTicket {
    pub fn new(queue_id: i64, customer_name: impl Into<String>) -> Self {
        Self {
            queue_id,
            customer_name: customer_name.into(),
            priority: None,
            estimated_time: 0,
            status: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_estimated_time(mut self, seconds: i64) -> Self {
        self.estimated_time = seconds;
        self
    }

    /// Priority after defaults are applied.
    pub fn effective_priority(&self) -> i32 {
        match self.priority {
            None | Some(0) => DEFAULT_PRIORITY,
            Some(p) => p,
        }
    }
}

/// A successful reservation.
///
/// `ticket` is the row exactly as it was before the transition (status
/// `Waiting`, pre-increment version); `new_version` is the version the store
/// committed.
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub ticket: Ticket,
    pub new_version: i64,
    pub reserved_at: DateTime<Utc>,
}

/// Outcome of a conditional status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    /// The row matched and now carries `new_version`.
    Applied { new_version: i64, queue_id: i64 },
    /// The row's status or version did not match; nothing was written.
    Conflict,
}

impl StatusUpdate {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StatusUpdate::Conflict)
    }
}

/// Outcome of archiving a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveOutcome {
    Archived,
    /// A previous attempt already moved the ticket to history.
    AlreadyArchived,
}

/// Ticket counts for one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queue_id: i64,
    pub waiting: i64,
    pub processing: i64,
    pub done: i64,
}
