//! Ticket operations that also publish events.
//!
//! The mutation result and the publish result are reported separately: a
//! ticket that was stored stays stored even when its event is lost.

use std::sync::Arc;

use tracing::{debug, info};

use crate::events::{
    created_event, created_notice, status_changed_event, DeliveryGap, EventPublisher,
};
use crate::metrics::{STATUS_UPDATES, TICKETS_ARCHIVED, TICKETS_CREATED};
use crate::ticket::{
    ArchiveOutcome, NewTicket, QueueStats, StatusUpdate, Ticket, TicketError, TicketStatus,
    TicketStore,
};

/// Result of creating a ticket.
#[derive(Debug)]
pub struct CreateOutcome {
    pub ticket: Ticket,
    /// Offset in the creation log, or why the append is missing.
    pub durable: Result<u64, DeliveryGap>,
    /// Live observers the creation notice reached.
    pub broadcast_receivers: usize,
}

/// Store access plus event publishing for the HTTP boundary.
#[derive(Clone)]
pub struct QueueService {
    store: Arc<dyn TicketStore>,
    publisher: EventPublisher,
}

impl QueueService {
    pub fn new(store: Arc<dyn TicketStore>, publisher: EventPublisher) -> Self {
        Self { store, publisher }
    }

    pub fn store(&self) -> &Arc<dyn TicketStore> {
        &self.store
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, TicketError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn TicketStore) -> Result<T, TicketError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| TicketError::Persistence(format!("store task failed: {}", e)))?
    }

    /// Persist a ticket, then record and announce its creation.
    pub async fn create_ticket(&self, request: NewTicket) -> Result<CreateOutcome, TicketError> {
        let ticket = self.blocking(move |store| store.create(request)).await?;
        TICKETS_CREATED
            .with_label_values(&[&ticket.queue_id.to_string()])
            .inc();
        info!(
            "Created ticket {} on queue {} for {}",
            ticket.id, ticket.queue_id, ticket.customer_name
        );

        let keys = self.publisher.keys();
        let durable = self
            .publisher
            .append_durable(&keys.creation_log(), &created_event(&ticket))
            .await;
        let broadcast_receivers = self
            .publisher
            .broadcast(&keys.broadcast(ticket.queue_id), &created_notice(&ticket));

        Ok(CreateOutcome {
            ticket,
            durable,
            broadcast_receivers,
        })
    }

    pub async fn get_ticket(&self, id: i64) -> Result<Ticket, TicketError> {
        self.blocking(move |store| store.get(id)).await
    }

    /// Waiting tickets of a queue, in dispatch order.
    pub async fn list_waiting(&self, queue_id: i64) -> Result<Vec<Ticket>, TicketError> {
        self.blocking(move |store| store.list_by_status(queue_id, TicketStatus::Waiting))
            .await
    }

    pub async fn queue_stats(&self, queue_id: i64) -> Result<QueueStats, TicketError> {
        self.blocking(move |store| store.queue_stats(queue_id)).await
    }

    /// Conditional status change; announces it when applied.
    pub async fn update_status(
        &self,
        id: i64,
        from: TicketStatus,
        to: TicketStatus,
        expected_version: i64,
    ) -> Result<StatusUpdate, TicketError> {
        let result = self
            .blocking(move |store| store.update_status(id, from, to, expected_version))
            .await;

        let label = match &result {
            Ok(StatusUpdate::Applied { .. }) => "applied",
            Ok(StatusUpdate::Conflict) => "conflict",
            Err(TicketError::InvalidTransition { .. }) | Err(TicketError::NotFound(_)) => {
                "rejected"
            }
            Err(_) => "error",
        };
        STATUS_UPDATES.with_label_values(&[label]).inc();

        let outcome = result?;
        match outcome {
            StatusUpdate::Applied {
                new_version,
                queue_id,
            } => {
                let keys = self.publisher.keys();
                let event = status_changed_event(id, queue_id, from, to, new_version);
                self.publisher.broadcast(&keys.broadcast(queue_id), &event);
                // Same ordered writer as reservations.
                if let Err(gap) = self.publisher.enqueue_durable(&keys.queue_log(queue_id), event)
                {
                    debug!(
                        "Status change of ticket {} to {} missing from queue {} log: {}",
                        id, to, queue_id, gap
                    );
                }
            }
            StatusUpdate::Conflict => {
                debug!(
                    "Status update on ticket {} not applied: not {} at version {}",
                    id, from, expected_version
                );
            }
        }

        Ok(outcome)
    }

    /// Put a processing ticket back in line.
    pub async fn requeue(&self, id: i64, expected_version: i64) -> Result<StatusUpdate, TicketError> {
        self.update_status(
            id,
            TicketStatus::Processing,
            TicketStatus::Waiting,
            expected_version,
        )
        .await
    }

    /// Mark a processing ticket done.
    pub async fn complete(&self, id: i64, expected_version: i64) -> Result<StatusUpdate, TicketError> {
        self.update_status(
            id,
            TicketStatus::Processing,
            TicketStatus::Done,
            expected_version,
        )
        .await
    }

    pub async fn archive(&self, id: i64) -> Result<ArchiveOutcome, TicketError> {
        let outcome = self.blocking(move |store| store.archive(id)).await?;
        if outcome == ArchiveOutcome::Archived {
            TICKETS_ARCHIVED.inc();
            info!("Archived ticket {}", id);
        }
        Ok(outcome)
    }
}
