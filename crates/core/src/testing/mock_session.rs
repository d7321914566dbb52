//! Notifier session that records what it was sent.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::notifier::{NotifierError, NotifierSession};

/// Records texts and pings instead of writing to a socket.
///
/// # Example
///
/// ```rust,ignore
/// let mut session = RecordingSession::new();
/// let sent = session.sent();
///
/// relay(&mut session, subscription, ping_interval, cancel_rx).await;
/// assert_eq!(sent.lock().unwrap().len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct RecordingSession {
    sent: Arc<Mutex<Vec<String>>>,
    pings: Arc<Mutex<u64>>,
    fail: bool,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session whose sends always fail, like a closed socket.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Shared view of the texts sent so far.
    pub fn sent(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.sent)
    }

    /// Shared ping counter.
    pub fn pings(&self) -> Arc<Mutex<u64>> {
        Arc::clone(&self.pings)
    }
}

#[async_trait]
impl NotifierSession for RecordingSession {
    async fn send_text(&mut self, text: String) -> Result<(), NotifierError> {
        if self.fail {
            return Err(NotifierError::Closed);
        }
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn send_ping(&mut self) -> Result<(), NotifierError> {
        if self.fail {
            return Err(NotifierError::Closed);
        }
        *self.pings.lock().unwrap() += 1;
        Ok(())
    }
}
