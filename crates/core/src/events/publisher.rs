//! Event publisher: durable log plus ephemeral broadcast, kept apart.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::types::{worker_update_event, DEFAULT_STREAM_BASE};
use super::{
    BroadcastError, Broadcaster, EventLog, EventLogError, LoggedEvent, QueueEvent, StreamKeys,
    Subscription,
};
use crate::metrics::{BROADCASTS, DELIVERY_GAPS, DURABLE_APPENDS, DURABLE_APPEND_DURATION};

/// Publisher configuration (`[publisher]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Base name of the durable logs.
    pub stream_base: String,
    /// Upper bound for one durable append.
    pub append_timeout_ms: u64,
    /// Capacity of the ordered append queue in front of the log writer.
    pub writer_buffer: usize,
    /// Per-topic broadcast capacity.
    pub broadcast_capacity: usize,
}

impl PublisherConfig {
    pub fn append_timeout(&self) -> Duration {
        Duration::from_millis(self.append_timeout_ms)
    }

    pub fn stream_keys(&self) -> StreamKeys {
        StreamKeys::new(self.stream_base.clone())
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            stream_base: DEFAULT_STREAM_BASE.to_string(),
            append_timeout_ms: 2000,
            writer_buffer: 1024,
            broadcast_capacity: 256,
        }
    }
}

/// A durable append that did not happen, or was not confirmed in time.
///
/// A gap never undoes the ticket mutation that produced the event.
#[derive(Debug, Clone, Error)]
pub enum DeliveryGap {
    #[error("append to {key} not confirmed within {after_ms}ms")]
    Timeout { key: String, after_ms: u64 },

    #[error("append to {key} failed: {source}")]
    Log { key: String, source: EventLogError },

    #[error("append queue full, dropped event for {key}")]
    QueueFull { key: String },

    #[error("log writer stopped, dropped event for {key}")]
    Closed { key: String },

    #[error("append task failed: {0}")]
    Worker(String),
}

impl DeliveryGap {
    /// Metric label.
    pub fn reason(&self) -> &'static str {
        match self {
            DeliveryGap::Timeout { .. } => "timeout",
            DeliveryGap::Log { .. } => "log_error",
            DeliveryGap::QueueFull { .. } => "queue_full",
            DeliveryGap::Closed { .. } => "closed",
            DeliveryGap::Worker(_) => "worker",
        }
    }

    fn record(&self) {
        DELIVERY_GAPS.with_label_values(&[self.reason()]).inc();
        tracing::warn!("Durable delivery gap: {}", self);
    }
}

/// An append waiting for the log writer.
#[derive(Debug)]
struct PendingAppend {
    key: String,
    event: QueueEvent,
}

/// Handle for publishing queue events.
///
/// Cheap to clone. The log writer exits once every clone is dropped.
#[derive(Clone)]
pub struct EventPublisher {
    log: Arc<dyn EventLog>,
    broadcaster: Arc<dyn Broadcaster>,
    keys: StreamKeys,
    append_timeout: Duration,
    tx: mpsc::Sender<PendingAppend>,
}

impl EventPublisher {
    pub fn keys(&self) -> &StreamKeys {
        &self.keys
    }

    /// Append to the durable log and wait for the offset, bounded by the
    /// append timeout.
    pub async fn append_durable(&self, key: &str, event: &QueueEvent) -> Result<u64, DeliveryGap> {
        let task = spawn_append(Arc::clone(&self.log), key.to_string(), event.clone());
        let result = settle(key, task, self.append_timeout).await;
        result.map_err(|(gap, _)| {
            gap.record();
            gap
        })
    }

    /// Queue a durable append for the log writer without waiting.
    ///
    /// Appends queued through here land in the order they were queued.
    pub fn enqueue_durable(&self, key: &str, event: QueueEvent) -> Result<(), DeliveryGap> {
        let pending = PendingAppend {
            key: key.to_string(),
            event,
        };
        self.tx.try_send(pending).map_err(|e| {
            let gap = match e {
                mpsc::error::TrySendError::Full(p) => DeliveryGap::QueueFull { key: p.key },
                mpsc::error::TrySendError::Closed(p) => DeliveryGap::Closed { key: p.key },
            };
            gap.record();
            gap
        })
    }

    /// Fan `event` out to live subscribers of `key`.
    ///
    /// Returns how many subscribers it reached. Failures are swallowed.
    pub fn broadcast(&self, key: &str, event: &QueueEvent) -> usize {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                BROADCASTS.with_label_values(&["error"]).inc();
                tracing::debug!("Failed to serialize broadcast for {}: {}", key, e);
                return 0;
            }
        };

        match self.broadcaster.publish(key, payload) {
            Ok(n) => {
                BROADCASTS.with_label_values(&["delivered"]).inc();
                n
            }
            Err(BroadcastError::NoSubscribers(_)) => {
                BROADCASTS.with_label_values(&["no_subscribers"]).inc();
                tracing::debug!("No subscribers on {}", key);
                0
            }
        }
    }

    /// Record a worker-originated update for `queue_id` and relay it live.
    pub async fn publish_worker_update(
        &self,
        queue_id: i64,
        payload: QueueEvent,
    ) -> Result<u64, DeliveryGap> {
        let event = worker_update_event(queue_id, payload);
        let offset = self
            .append_durable(&self.keys.worker_updates(queue_id), &event)
            .await?;
        self.broadcast(&self.keys.broadcast(queue_id), &event);
        Ok(offset)
    }

    /// Read back a durable log from `after_offset`.
    pub async fn replay(
        &self,
        key: &str,
        after_offset: u64,
        limit: usize,
    ) -> Result<Vec<LoggedEvent>, EventLogError> {
        let log = Arc::clone(&self.log);
        let key = key.to_string();
        tokio::task::spawn_blocking(move || log.read_from(&key, after_offset, limit))
            .await
            .map_err(|e| EventLogError::Unavailable(e.to_string()))?
    }

    /// Subscribe to the live events of one queue.
    pub fn subscribe(&self, queue_id: i64) -> Subscription {
        self.broadcaster.subscribe(&self.keys.broadcast(queue_id))
    }

    pub fn subscriber_count(&self, queue_id: i64) -> usize {
        self.broadcaster
            .subscriber_count(&self.keys.broadcast(queue_id))
    }
}

fn spawn_append(
    log: Arc<dyn EventLog>,
    key: String,
    event: QueueEvent,
) -> JoinHandle<Result<u64, EventLogError>> {
    tokio::task::spawn_blocking(move || {
        let started = Instant::now();
        let result = log.append(&key, &event);
        DURABLE_APPEND_DURATION.observe(started.elapsed().as_secs_f64());
        if result.is_ok() {
            DURABLE_APPENDS.inc();
        }
        result
    })
}

/// Wait for an append task up to `timeout`.
///
/// On timeout the task is handed back so the caller can decide whether to
/// wait for it later.
async fn settle(
    key: &str,
    mut task: JoinHandle<Result<u64, EventLogError>>,
    timeout: Duration,
) -> Result<u64, (DeliveryGap, Option<JoinHandle<Result<u64, EventLogError>>>)> {
    match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(Ok(offset))) => Ok(offset),
        Ok(Ok(Err(source))) => Err((
            DeliveryGap::Log {
                key: key.to_string(),
                source,
            },
            None,
        )),
        Ok(Err(join)) => Err((DeliveryGap::Worker(join.to_string()), None)),
        Err(_) => Err((
            DeliveryGap::Timeout {
                key: key.to_string(),
                after_ms: timeout.as_millis() as u64,
            },
            Some(task),
        )),
    }
}

/// Background task draining queued appends into the log, one at a time.
pub struct LogWriter {
    rx: mpsc::Receiver<PendingAppend>,
    log: Arc<dyn EventLog>,
    append_timeout: Duration,
}

impl LogWriter {
    /// Run the writer until every publisher handle is dropped.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        tracing::info!("Log writer started");

        // A timed-out append may still land; it must finish before the next
        // one starts or the per-key order could flip.
        let mut straggler: Option<JoinHandle<Result<u64, EventLogError>>> = None;

        while let Some(pending) = self.rx.recv().await {
            if let Some(late) = straggler.take() {
                match late.await {
                    Ok(Ok(offset)) => {
                        tracing::debug!("Late append landed at offset {}", offset)
                    }
                    Ok(Err(e)) => tracing::debug!("Late append failed: {}", e),
                    Err(e) => tracing::debug!("Late append task failed: {}", e),
                }
            }

            let task = spawn_append(Arc::clone(&self.log), pending.key.clone(), pending.event);
            match settle(&pending.key, task, self.append_timeout).await {
                Ok(offset) => {
                    tracing::debug!("Appended to {} at offset {}", pending.key, offset)
                }
                Err((gap, late)) => {
                    gap.record();
                    straggler = late;
                }
            }
        }

        if let Some(late) = straggler {
            let _ = late.await;
        }

        tracing::info!("Log writer shutting down");
    }
}

/// Create a complete publish system
///
/// Returns:
/// - `EventPublisher` - clone this to share across tasks
/// - `LogWriter` - spawn this as a background task with `tokio::spawn(writer.run())`
pub fn create_publish_system(
    log: Arc<dyn EventLog>,
    broadcaster: Arc<dyn Broadcaster>,
    config: &PublisherConfig,
) -> (EventPublisher, LogWriter) {
    let (tx, rx) = mpsc::channel(config.writer_buffer.max(1));
    let publisher = EventPublisher {
        log: Arc::clone(&log),
        broadcaster,
        keys: config.stream_keys(),
        append_timeout: config.append_timeout(),
        tx,
    };
    let writer = LogWriter {
        rx,
        log,
        append_timeout: config.append_timeout(),
    };
    (publisher, writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{SqliteEventLog, TopicBroadcaster};
    use crate::testing::{FailingEventLog, SlowEventLog};
    use serde_json::Value;

    fn event(n: i64) -> QueueEvent {
        let mut event = QueueEvent::new();
        event.insert("n".to_string(), Value::from(n));
        event
    }

    fn config() -> PublisherConfig {
        PublisherConfig {
            append_timeout_ms: 200,
            writer_buffer: 16,
            ..Default::default()
        }
    }

    fn system(log: Arc<dyn EventLog>, config: &PublisherConfig) -> (EventPublisher, LogWriter) {
        create_publish_system(log, Arc::new(TopicBroadcaster::new(16)), config)
    }

    #[tokio::test]
    async fn test_append_durable_returns_offset() {
        let log = Arc::new(SqliteEventLog::in_memory().unwrap());
        let (publisher, _writer) = system(log.clone(), &config());

        assert_eq!(publisher.append_durable("k", &event(1)).await.unwrap(), 1);
        assert_eq!(publisher.append_durable("k", &event(2)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_append_durable_reports_log_failure() {
        let (publisher, _writer) = system(Arc::new(FailingEventLog::new()), &config());

        let gap = publisher.append_durable("k", &event(1)).await.unwrap_err();
        assert!(matches!(gap, DeliveryGap::Log { ref key, .. } if key == "k"));
        assert_eq!(gap.reason(), "log_error");
    }

    #[tokio::test]
    async fn test_append_durable_is_bounded_by_timeout() {
        let slow = Arc::new(SlowEventLog::new(Duration::from_millis(500)));
        let (publisher, _writer) = system(slow, &config());

        let started = Instant::now();
        let gap = publisher.append_durable("k", &event(1)).await.unwrap_err();

        assert!(matches!(gap, DeliveryGap::Timeout { after_ms: 200, .. }));
        assert!(started.elapsed() < Duration::from_millis(450));
    }

    #[tokio::test]
    async fn test_writer_preserves_enqueue_order() {
        let log = Arc::new(SqliteEventLog::in_memory().unwrap());
        let (publisher, writer) = system(log.clone(), &config());
        let writer_handle = tokio::spawn(writer.run());

        for n in 1..=10 {
            publisher.enqueue_durable("queue.stream.1", event(n)).unwrap();
        }
        drop(publisher);
        writer_handle.await.unwrap();

        let logged = log.read_from("queue.stream.1", 0, 100).unwrap();
        let ns: Vec<i64> = logged
            .iter()
            .map(|e| e.payload["n"].as_i64().unwrap())
            .collect();
        assert_eq!(ns, (1..=10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_enqueue_full_queue_is_a_gap() {
        let log = Arc::new(SqliteEventLog::in_memory().unwrap());
        let config = PublisherConfig {
            writer_buffer: 1,
            ..config()
        };
        // writer not running, so the queue never drains
        let (publisher, _writer) = system(log, &config);

        publisher.enqueue_durable("k", event(1)).unwrap();
        let gap = publisher.enqueue_durable("k", event(2)).unwrap_err();
        assert!(matches!(gap, DeliveryGap::QueueFull { .. }));
    }

    #[tokio::test]
    async fn test_enqueue_after_writer_stops_is_a_gap() {
        let log = Arc::new(SqliteEventLog::in_memory().unwrap());
        let (publisher, writer) = system(log, &config());
        drop(writer);

        let gap = publisher.enqueue_durable("k", event(1)).unwrap_err();
        assert!(matches!(gap, DeliveryGap::Closed { .. }));
    }

    #[tokio::test]
    async fn test_writer_survives_failing_log() {
        let (publisher, writer) = system(Arc::new(FailingEventLog::new()), &config());
        let writer_handle = tokio::spawn(writer.run());

        publisher.enqueue_durable("k", event(1)).unwrap();
        publisher.enqueue_durable("k", event(2)).unwrap();
        drop(publisher);

        let result = tokio::time::timeout(Duration::from_secs(2), writer_handle).await;
        assert!(result.is_ok(), "writer should exit after handles drop");
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_is_swallowed() {
        let log = Arc::new(SqliteEventLog::in_memory().unwrap());
        let (publisher, _writer) = system(log, &config());

        assert_eq!(publisher.broadcast("queue.1.broadcast", &event(1)), 0);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_queue_subscribers() {
        let log = Arc::new(SqliteEventLog::in_memory().unwrap());
        let (publisher, _writer) = system(log, &config());
        let mut sub = publisher.subscribe(1);

        let reached = publisher.broadcast(&publisher.keys().broadcast(1), &event(5));
        assert_eq!(reached, 1);

        let payload: QueueEvent = serde_json::from_str(&sub.recv().await.unwrap()).unwrap();
        assert_eq!(payload["n"], 5);
    }

    #[tokio::test]
    async fn test_publish_worker_update() {
        let log = Arc::new(SqliteEventLog::in_memory().unwrap());
        let (publisher, _writer) = system(log.clone(), &config());
        let mut sub = publisher.subscribe(3);

        let mut payload = QueueEvent::new();
        payload.insert("estimated_time".to_string(), Value::from(90));
        let offset = publisher.publish_worker_update(3, payload).await.unwrap();
        assert_eq!(offset, 1);

        let logged = log.read_from("queue.stream.worker.updates.3", 0, 10).unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].payload["estimated_time"], 90);

        let live: QueueEvent = serde_json::from_str(&sub.recv().await.unwrap()).unwrap();
        assert_eq!(live["event"], "worker.update");
    }

    #[tokio::test]
    async fn test_replay_reads_back_appends() {
        let log = Arc::new(SqliteEventLog::in_memory().unwrap());
        let (publisher, _writer) = system(log, &config());

        for n in 1..=3 {
            publisher.append_durable("k", &event(n)).await.unwrap();
        }

        let replayed = publisher.replay("k", 1, 10).await.unwrap();
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[0].offset, 2);
    }
}
