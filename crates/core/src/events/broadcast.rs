//! Ephemeral per-topic fanout.
//!
//! Subscribers that fall behind lose messages; nothing is buffered for them
//! beyond the channel capacity.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::RecvError;

/// Default number of in-flight messages per topic.
pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("no subscribers on {0}")]
    NoSubscribers(String),
}

/// Fire-and-forget publish/subscribe by topic.
pub trait Broadcaster: Send + Sync {
    /// Send `payload` to every current subscriber of `key`.
    ///
    /// Returns the number of subscribers reached. Never waits.
    fn publish(&self, key: &str, payload: String) -> Result<usize, BroadcastError>;

    fn subscribe(&self, key: &str) -> Subscription;

    /// Live subscriber count for `key`.
    fn subscriber_count(&self, key: &str) -> usize;
}

type Topics = Arc<RwLock<HashMap<String, broadcast::Sender<String>>>>;

/// Broadcaster backed by one tokio broadcast channel per topic.
#[derive(Clone)]
pub struct TopicBroadcaster {
    topics: Topics,
    capacity: usize,
}

impl TopicBroadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Number of topics with a live channel.
    pub fn topic_count(&self) -> usize {
        self.topics.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn prune(topics: &Topics, key: &str) {
        let mut topics = topics.write().unwrap_or_else(|e| e.into_inner());
        if topics
            .get(key)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            topics.remove(key);
        }
    }
}

impl Default for TopicBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Broadcaster for TopicBroadcaster {
    fn publish(&self, key: &str, payload: String) -> Result<usize, BroadcastError> {
        let topics = self.topics.read().unwrap_or_else(|e| e.into_inner());
        let sender = topics
            .get(key)
            .ok_or_else(|| BroadcastError::NoSubscribers(key.to_string()))?;
        sender
            .send(payload)
            .map_err(|_| BroadcastError::NoSubscribers(key.to_string()))
    }

    fn subscribe(&self, key: &str) -> Subscription {
        let rx = {
            let mut topics = self.topics.write().unwrap_or_else(|e| e.into_inner());
            topics
                .entry(key.to_string())
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe()
        };

        let topics = Arc::clone(&self.topics);
        let topic = key.to_string();
        Subscription::new(key, rx).on_close(move || Self::prune(&topics, &topic))
    }

    fn subscriber_count(&self, key: &str) -> usize {
        self.topics
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .map_or(0, |sender| sender.receiver_count())
    }
}

/// A live subscription to one topic.
///
/// Dropping it (or calling [`Subscription::unsubscribe`]) detaches it.
pub struct Subscription {
    key: String,
    rx: Option<broadcast::Receiver<String>>,
    on_close: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(key: impl Into<String>, rx: broadcast::Receiver<String>) -> Self {
        Self {
            key: key.into(),
            rx: Some(rx),
            on_close: None,
        }
    }

    /// Run `f` once the receiver has been released.
    pub fn on_close(mut self, f: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.on_close = Some(Box::new(f));
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Next payload. `Lagged(n)` means `n` messages were dropped for this
    /// subscriber; `Closed` means the topic is gone.
    pub async fn recv(&mut self) -> Result<String, RecvError> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => Err(RecvError::Closed),
        }
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        drop(self.rx.take());
        if let Some(on_close) = self.on_close.take() {
            on_close();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_only_topic_subscribers() {
        let broadcaster = TopicBroadcaster::new(16);
        let mut a = broadcaster.subscribe("queue.1.broadcast");
        let mut b = broadcaster.subscribe("queue.2.broadcast");

        let reached = broadcaster
            .publish("queue.1.broadcast", "hello".to_string())
            .unwrap();
        assert_eq!(reached, 1);

        assert_eq!(a.recv().await.unwrap(), "hello");
        assert!(b.rx.as_mut().unwrap().try_recv().is_err());
    }

    #[test]
    fn test_publish_without_subscribers_is_an_error() {
        let broadcaster = TopicBroadcaster::default();
        let err = broadcaster.publish("nobody", "x".to_string()).unwrap_err();
        assert_eq!(err, BroadcastError::NoSubscribers("nobody".to_string()));
    }

    #[test]
    fn test_unsubscribe_prunes_idle_topic() {
        let broadcaster = TopicBroadcaster::default();
        let first = broadcaster.subscribe("t");
        let second = broadcaster.subscribe("t");
        assert_eq!(broadcaster.subscriber_count("t"), 2);

        first.unsubscribe();
        assert_eq!(broadcaster.subscriber_count("t"), 1);
        assert_eq!(broadcaster.topic_count(), 1);

        drop(second);
        assert_eq!(broadcaster.subscriber_count("t"), 0);
        assert_eq!(broadcaster.topic_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags_instead_of_blocking() {
        let broadcaster = TopicBroadcaster::new(2);
        let mut slow = broadcaster.subscribe("t");

        for i in 0..10 {
            broadcaster.publish("t", i.to_string()).unwrap();
        }

        assert!(matches!(slow.recv().await, Err(RecvError::Lagged(8))));
        assert_eq!(slow.recv().await.unwrap(), "8");
        assert_eq!(slow.recv().await.unwrap(), "9");
    }

    #[test]
    fn test_recv_waits_for_publish() {
        let broadcaster = TopicBroadcaster::default();
        let mut sub = broadcaster.subscribe("t");

        let mut recv = tokio_test::task::spawn(sub.recv());
        tokio_test::assert_pending!(recv.poll());

        broadcaster.publish("t", "ready".to_string()).unwrap();
        assert!(recv.is_woken());
        let received = tokio_test::assert_ready!(recv.poll());
        assert_eq!(received.unwrap(), "ready");
    }
}
