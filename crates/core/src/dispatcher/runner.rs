//! Queue dispatcher: the claim loop for one queue.
//!
//! Each tick drains the queue: reserve, publish, repeat until the store has
//! nothing waiting. Publishing never blocks the loop and never undoes a
//! reservation.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::events::{reserved_event, EventPublisher};
use crate::metrics::{DRAIN_PASSES, RESERVATIONS, RESERVE_CONTENDED, RESERVE_ERRORS};
use crate::ticket::{Reservation, TicketError, TicketStore};

use super::config::DispatcherConfig;
use super::types::{DispatcherState, DispatcherStats};

/// Dispatcher bound to a single queue.
pub struct QueueDispatcher {
    queue_id: i64,
    store: Arc<dyn TicketStore>,
    publisher: EventPublisher,
    config: DispatcherConfig,
    state_tx: watch::Sender<DispatcherState>,
}

impl QueueDispatcher {
    pub fn new(
        queue_id: i64,
        store: Arc<dyn TicketStore>,
        publisher: EventPublisher,
        config: DispatcherConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(DispatcherState::Idle);
        Self {
            queue_id,
            store,
            publisher,
            config,
            state_tx,
        }
    }

    pub fn queue_id(&self) -> i64 {
        self.queue_id
    }

    /// Watch the dispatcher's state.
    pub fn state(&self) -> watch::Receiver<DispatcherState> {
        self.state_tx.subscribe()
    }

    /// Run until `cancel` flips to `true` (or its sender is dropped).
    ///
    /// The first pass starts immediately. Cancellation is observed between
    /// reservations, never inside one.
    pub async fn run(self, mut cancel: watch::Receiver<bool>) -> DispatcherStats {
        let mut stats = DispatcherStats::default();
        let mut ticker = tokio::time::interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Dispatcher for queue {} started (tick {}ms)",
            self.queue_id, self.config.tick_interval_ms
        );

        loop {
            if *cancel.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            self.drain(&cancel, &mut stats).await;
        }

        self.state_tx.send_replace(DispatcherState::Stopped);
        info!(
            "Dispatcher for queue {} stopped after {} passes, {} reserved",
            self.queue_id, stats.passes, stats.reserved
        );
        stats
    }

    /// Reserve until the queue is empty, the pass limit is hit, the store
    /// fails or is busy, or cancellation is requested.
    async fn drain(&self, cancel: &watch::Receiver<bool>, stats: &mut DispatcherStats) {
        let queue_label = self.queue_id.to_string();
        stats.passes += 1;
        DRAIN_PASSES.with_label_values(&[&queue_label]).inc();
        self.state_tx.send_replace(DispatcherState::Draining);

        let limit = self.config.batch_limit();
        let mut reserved_this_pass = 0usize;

        loop {
            if *cancel.borrow() {
                return;
            }
            if limit.is_some_and(|limit| reserved_this_pass >= limit) {
                debug!(
                    "Dispatcher for queue {} hit pass limit of {}",
                    self.queue_id, reserved_this_pass
                );
                break;
            }

            match self.reserve_next().await {
                Ok(Some(reservation)) => {
                    reserved_this_pass += 1;
                    stats.reserved += 1;
                    RESERVATIONS.with_label_values(&[&queue_label]).inc();
                    if !self.publish(&reservation) {
                        stats.delivery_gaps += 1;
                    }
                }
                Ok(None) => break,
                Err(TicketError::Contended(_)) => {
                    stats.contended += 1;
                    RESERVE_CONTENDED.with_label_values(&[&queue_label]).inc();
                    debug!(
                        "Queue {} write lock busy, retrying next tick",
                        self.queue_id
                    );
                    break;
                }
                Err(e) => {
                    stats.store_errors += 1;
                    RESERVE_ERRORS.with_label_values(&[&queue_label]).inc();
                    warn!(
                        "Reservation on queue {} failed, retrying next tick: {}",
                        self.queue_id, e
                    );
                    break;
                }
            }
        }

        self.state_tx.send_replace(DispatcherState::Idle);
    }

    async fn reserve_next(&self) -> Result<Option<Reservation>, TicketError> {
        let store = Arc::clone(&self.store);
        let queue_id = self.queue_id;
        tokio::task::spawn_blocking(move || store.reserve_next(queue_id))
            .await
            .map_err(|e| TicketError::Persistence(format!("reservation task failed: {}", e)))?
    }

    /// Hand the reservation to both channels. Returns `false` on a durable gap.
    fn publish(&self, reservation: &Reservation) -> bool {
        let keys = self.publisher.keys();
        let event = reserved_event(reservation);

        let receivers = self
            .publisher
            .broadcast(&keys.broadcast(self.queue_id), &event);
        debug!(
            "Reserved ticket {} on queue {} (version {}, {} live receivers)",
            reservation.ticket.id, self.queue_id, reservation.new_version, receivers
        );

        self.publisher
            .enqueue_durable(&keys.queue_log(self.queue_id), event)
            .is_ok()
    }
}
