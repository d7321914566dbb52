//! Tickets: the rows that wait in a queue and get reserved by dispatchers.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::{SqliteTicketStore, DEFAULT_BUSY_TIMEOUT};
pub use store::{TicketError, TicketStore};
pub use types::{
    ArchiveOutcome, NewTicket, QueueStats, Reservation, StatusUpdate, Ticket, TicketStatus,
    UnknownStatus, DEFAULT_PRIORITY, INITIAL_VERSION,
};
