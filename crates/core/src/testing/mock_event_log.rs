//! Event logs that misbehave on purpose.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;

use crate::events::{EventLog, EventLogError, LoggedEvent, QueueEvent};

/// Event log whose every call fails.
#[derive(Debug, Default)]
pub struct FailingEventLog {
    message: String,
}

impl FailingEventLog {
    pub fn new() -> Self {
        Self::with_message("mock log unavailable")
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl EventLog for FailingEventLog {
    fn append(&self, _key: &str, _event: &QueueEvent) -> Result<u64, EventLogError> {
        Err(EventLogError::Database(self.message.clone()))
    }

    fn read_from(
        &self,
        _key: &str,
        _after_offset: u64,
        _limit: usize,
    ) -> Result<Vec<LoggedEvent>, EventLogError> {
        Err(EventLogError::Database(self.message.clone()))
    }

    fn latest_offset(&self, _key: &str) -> Result<u64, EventLogError> {
        Err(EventLogError::Database(self.message.clone()))
    }
}

/// In-memory event log that sleeps before every append.
///
/// Blocks the calling thread, like a stalled database would.
#[derive(Debug)]
pub struct SlowEventLog {
    delay: Duration,
    entries: Mutex<HashMap<String, Vec<LoggedEvent>>>,
}

impl SlowEventLog {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of appends that completed.
    pub fn appended(&self, key: &str) -> usize {
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .map_or(0, |entries| entries.len())
    }
}

impl EventLog for SlowEventLog {
    fn append(&self, key: &str, event: &QueueEvent) -> Result<u64, EventLogError> {
        std::thread::sleep(self.delay);

        let mut entries = self.entries.lock().unwrap();
        let log = entries.entry(key.to_string()).or_default();
        let offset = log.len() as u64 + 1;
        log.push(LoggedEvent {
            key: key.to_string(),
            offset,
            recorded_at: Utc::now(),
            payload: event.clone(),
        });
        Ok(offset)
    }

    fn read_from(
        &self,
        key: &str,
        after_offset: u64,
        limit: usize,
    ) -> Result<Vec<LoggedEvent>, EventLogError> {
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .get(key)
            .map(|log| {
                log.iter()
                    .filter(|e| e.offset > after_offset)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn latest_offset(&self, key: &str) -> Result<u64, EventLogError> {
        Ok(self.appended(key) as u64)
    }
}
