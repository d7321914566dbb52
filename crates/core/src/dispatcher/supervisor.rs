//! Keeps track of running dispatchers by queue id.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::events::EventPublisher;
use crate::ticket::TicketStore;

use super::config::DispatcherConfig;
use super::runner::QueueDispatcher;
use super::types::{DispatcherError, DispatcherState, DispatcherStats, DispatcherStatus};

/// Handle to one spawned dispatcher task.
pub struct DispatcherHandle {
    queue_id: i64,
    cancel_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<DispatcherState>,
    join: JoinHandle<DispatcherStats>,
}

impl DispatcherHandle {
    /// Spawn `dispatcher` on the runtime.
    pub fn spawn(dispatcher: QueueDispatcher) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let queue_id = dispatcher.queue_id();
        let state_rx = dispatcher.state();
        let join = tokio::spawn(dispatcher.run(cancel_rx));
        Self {
            queue_id,
            cancel_tx,
            state_rx,
            join,
        }
    }

    pub fn queue_id(&self) -> i64 {
        self.queue_id
    }

    pub fn state(&self) -> DispatcherState {
        *self.state_rx.borrow()
    }

    /// Ask the dispatcher to stop after its current reservation.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    /// Cancel and wait for the task to finish.
    pub async fn stop(self) -> Result<DispatcherStats, DispatcherError> {
        self.cancel();
        self.join
            .await
            .map_err(|e| DispatcherError::Join(e.to_string()))
    }
}

/// Starts and stops dispatchers, keyed by queue id.
pub struct DispatcherSupervisor {
    store: Arc<dyn TicketStore>,
    publisher: EventPublisher,
    config: DispatcherConfig,
    dispatchers: RwLock<HashMap<i64, Vec<DispatcherHandle>>>,
}

impl DispatcherSupervisor {
    pub fn new(
        store: Arc<dyn TicketStore>,
        publisher: EventPublisher,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            config,
            dispatchers: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Start `replicas_per_queue` dispatchers for `queue_id`.
    pub async fn start(&self, queue_id: i64) -> Result<(), DispatcherError> {
        self.start_replicas(queue_id, self.config.replicas_per_queue)
            .await
    }

    /// Start `replicas` dispatchers competing on the same queue.
    pub async fn start_replicas(&self, queue_id: i64, replicas: usize) -> Result<(), DispatcherError> {
        if queue_id <= 0 {
            return Err(DispatcherError::InvalidQueue(queue_id));
        }

        let mut dispatchers = self.dispatchers.write().await;
        if dispatchers.contains_key(&queue_id) {
            return Err(DispatcherError::AlreadyRunning(queue_id));
        }

        let handles = (0..replicas.max(1))
            .map(|_| {
                DispatcherHandle::spawn(QueueDispatcher::new(
                    queue_id,
                    Arc::clone(&self.store),
                    self.publisher.clone(),
                    self.config.clone(),
                ))
            })
            .collect::<Vec<_>>();

        info!(
            "Started {} dispatcher(s) for queue {}",
            handles.len(),
            queue_id
        );
        dispatchers.insert(queue_id, handles);
        Ok(())
    }

    /// Stop every dispatcher of `queue_id` and wait for them.
    pub async fn stop(&self, queue_id: i64) -> Result<DispatcherStats, DispatcherError> {
        let handles = self
            .dispatchers
            .write()
            .await
            .remove(&queue_id)
            .ok_or(DispatcherError::NotRunning(queue_id))?;

        info!("Stopping dispatcher(s) for queue {}", queue_id);
        Self::stop_handles(queue_id, handles).await
    }

    /// Stop everything. Returns final counters per queue.
    pub async fn stop_all(&self) -> Vec<(i64, DispatcherStats)> {
        let drained: Vec<(i64, Vec<DispatcherHandle>)> =
            self.dispatchers.write().await.drain().collect();

        // cancel all first so queues wind down together
        for (_, handles) in &drained {
            for handle in handles {
                handle.cancel();
            }
        }

        let mut results = Vec::with_capacity(drained.len());
        for (queue_id, handles) in drained {
            match Self::stop_handles(queue_id, handles).await {
                Ok(stats) => results.push((queue_id, stats)),
                Err(e) => warn!("Dispatcher for queue {} ended badly: {}", queue_id, e),
            }
        }
        results.sort_by_key(|(queue_id, _)| *queue_id);
        results
    }

    async fn stop_handles(
        queue_id: i64,
        handles: Vec<DispatcherHandle>,
    ) -> Result<DispatcherStats, DispatcherError> {
        let mut total = DispatcherStats::default();
        let mut failure = None;
        for handle in handles {
            match handle.stop().await {
                Ok(stats) => total = total.merge(stats),
                Err(e) => failure = Some(e),
            }
        }
        info!(
            "Dispatcher(s) for queue {} stopped ({} reserved)",
            queue_id, total.reserved
        );
        match failure {
            Some(e) => Err(e),
            None => Ok(total),
        }
    }

    /// Queue ids with running dispatchers, ascending.
    pub async fn running_queues(&self) -> Vec<i64> {
        let mut queues: Vec<i64> = self.dispatchers.read().await.keys().copied().collect();
        queues.sort_unstable();
        queues
    }

    pub async fn is_running(&self, queue_id: i64) -> bool {
        self.dispatchers.read().await.contains_key(&queue_id)
    }

    /// Per-queue snapshot, ascending by queue id.
    pub async fn status(&self) -> Vec<DispatcherStatus> {
        let dispatchers = self.dispatchers.read().await;
        let mut status: Vec<DispatcherStatus> = dispatchers
            .iter()
            .map(|(queue_id, handles)| DispatcherStatus {
                queue_id: *queue_id,
                replicas: handles.len(),
                states: handles.iter().map(DispatcherHandle::state).collect(),
            })
            .collect();
        status.sort_by_key(|s| s.queue_id);
        status
    }
}
