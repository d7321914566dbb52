//! Ticket store that is always unreachable.

use crate::ticket::{
    ArchiveOutcome, NewTicket, Reservation, StatusUpdate, Ticket, TicketError, TicketStatus,
    TicketStore,
};

/// Every call fails with [`TicketError::Persistence`].
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingTicketStore;

fn unavailable<T>() -> Result<T, TicketError> {
    Err(TicketError::Persistence("mock store unavailable".to_string()))
}

impl TicketStore for FailingTicketStore {
    fn create(&self, _ticket: NewTicket) -> Result<Ticket, TicketError> {
        unavailable()
    }

    fn get(&self, _id: i64) -> Result<Ticket, TicketError> {
        unavailable()
    }

    fn list_by_status(
        &self,
        _queue_id: i64,
        _status: TicketStatus,
    ) -> Result<Vec<Ticket>, TicketError> {
        unavailable()
    }

    fn count_by_status(&self, _queue_id: i64, _status: TicketStatus) -> Result<i64, TicketError> {
        unavailable()
    }

    fn reserve_next(&self, _queue_id: i64) -> Result<Option<Reservation>, TicketError> {
        unavailable()
    }

    fn update_status(
        &self,
        _id: i64,
        _expected_old: TicketStatus,
        _new_status: TicketStatus,
        _expected_version: i64,
    ) -> Result<StatusUpdate, TicketError> {
        unavailable()
    }

    fn archive(&self, _id: i64) -> Result<ArchiveOutcome, TicketError> {
        unavailable()
    }
}
