//! Durable, replayable append log.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, TransactionBehavior};
use thiserror::Error;

use super::types::timestamp;
use super::{LoggedEvent, QueueEvent};

#[derive(Debug, Clone, Error)]
pub enum EventLogError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The log could not be reached at all (blocking task lost, store shut).
    #[error("Event log unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for EventLogError {
    fn from(e: rusqlite::Error) -> Self {
        EventLogError::Database(e.to_string())
    }
}

/// Append-only log keyed by name.
///
/// Offsets start at 1 and increase by one per append within a key.
pub trait EventLog: Send + Sync {
    /// Append `event` to `key`, returning its offset.
    fn append(&self, key: &str, event: &QueueEvent) -> Result<u64, EventLogError>;

    /// Entries of `key` with offset greater than `after_offset`, oldest first.
    fn read_from(
        &self,
        key: &str,
        after_offset: u64,
        limit: usize,
    ) -> Result<Vec<LoggedEvent>, EventLogError>;

    /// Offset of the newest entry, 0 when the key is empty.
    fn latest_offset(&self, key: &str) -> Result<u64, EventLogError>;
}

/// SQLite-backed event log.
pub struct SqliteEventLog {
    conn: Mutex<Connection>,
}

impl SqliteEventLog {
    pub fn new(path: &Path, busy_timeout: Duration) -> Result<Self, EventLogError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        let _: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        Self::from_connection(conn)
    }

    /// Create an in-memory event log (useful for testing)
    pub fn in_memory() -> Result<Self, EventLogError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, EventLogError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS event_log (
                log_key TEXT NOT NULL,
                log_offset INTEGER NOT NULL,
                recorded_at TEXT NOT NULL,
                payload TEXT NOT NULL,
                PRIMARY KEY (log_key, log_offset)
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, EventLogError> {
        self.conn
            .lock()
            .map_err(|_| EventLogError::Unavailable("event log connection poisoned".to_string()))
    }

    fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<(String, i64, String, String)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
    }
}

impl EventLog for SqliteEventLog {
    fn append(&self, key: &str, event: &QueueEvent) -> Result<u64, EventLogError> {
        let payload = serde_json::to_string(event)
            .map_err(|e| EventLogError::Serialization(e.to_string()))?;

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let offset: i64 = tx.query_row(
            "SELECT COALESCE(MAX(log_offset), 0) + 1 FROM event_log WHERE log_key = ?1",
            params![key],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO event_log (log_key, log_offset, recorded_at, payload) VALUES (?1, ?2, ?3, ?4)",
            params![key, offset, timestamp(Utc::now()), payload],
        )?;
        tx.commit()?;

        Ok(offset as u64)
    }

    fn read_from(
        &self,
        key: &str,
        after_offset: u64,
        limit: usize,
    ) -> Result<Vec<LoggedEvent>, EventLogError> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT log_key, log_offset, recorded_at, payload FROM event_log WHERE log_key = ?1 AND log_offset > ?2 ORDER BY log_offset ASC LIMIT ?3",
        )?;
        // Offsets past i64::MAX cannot exist, so such a cursor reads nothing.
        let after = i64::try_from(after_offset).unwrap_or(i64::MAX);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(
                params![key, after, limit],
                Self::row_to_event,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(key, offset, recorded_at, payload)| {
                let recorded_at = DateTime::parse_from_rfc3339(&recorded_at)
                    .map_err(|e| EventLogError::Serialization(e.to_string()))?
                    .with_timezone(&Utc);
                let payload: QueueEvent = serde_json::from_str(&payload)
                    .map_err(|e| EventLogError::Serialization(e.to_string()))?;
                Ok(LoggedEvent {
                    key,
                    offset: offset as u64,
                    recorded_at,
                    payload,
                })
            })
            .collect()
    }

    fn latest_offset(&self, key: &str) -> Result<u64, EventLogError> {
        let conn = self.conn()?;
        let offset: i64 = conn.query_row(
            "SELECT COALESCE(MAX(log_offset), 0) FROM event_log WHERE log_key = ?1",
            params![key],
            |row| row.get(0),
        )?;
        Ok(offset as u64)
    }
}
