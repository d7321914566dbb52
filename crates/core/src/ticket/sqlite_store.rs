//! SQLite-backed ticket store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};

use super::{
    ArchiveOutcome, NewTicket, Reservation, StatusUpdate, Ticket, TicketError, TicketStatus,
    TicketStore, INITIAL_VERSION,
};

/// Busy timeout used when the caller does not pick one.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a reservation waits for another connection's write lock.
pub const DEFAULT_RESERVE_WAIT: Duration = Duration::from_millis(50);

/// How many waiting rows one reservation looks at before giving up.
///
/// Under `BEGIN IMMEDIATE` the first candidate always wins; the rest only
/// matter if a row changed between the select and the guarded update.
const CLAIM_CANDIDATES: i64 = 8;

const TICKET_COLUMNS: &str = "id, queue_id, customer_name, priority, estimated_time, status, \
     assigned_worker, version, created_at, updated_at, completed_at";

/// SQLite-backed ticket store.
///
/// One connection per store instance. Several instances may point at the same
/// database file (dispatcher replicas); they serialize on SQLite's write lock.
///
/// SQLite has no row locks to skip past, so a reservation that finds the
/// write lock taken waits only `reserve_wait` and then reports
/// [`TicketError::Contended`] instead of failing the caller's pass.
pub struct SqliteTicketStore {
    conn: Mutex<Connection>,
    busy_timeout: Duration,
    reserve_wait: Duration,
}

impl SqliteTicketStore {
    /// Open (or create) the database file with the default busy timeout.
    pub fn new(path: &Path) -> Result<Self, TicketError> {
        Self::with_busy_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open (or create) the database file, waiting up to `busy_timeout` for
    /// another connection's write lock.
    pub fn with_busy_timeout(path: &Path, busy_timeout: Duration) -> Result<Self, TicketError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!("Ticket store opened {:?} (journal_mode={})", path, mode);
        Self::from_connection(conn, busy_timeout)
    }

    /// Create an in-memory SQLite ticket store (useful for testing).
    pub fn in_memory() -> Result<Self, TicketError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, DEFAULT_BUSY_TIMEOUT)
    }

    /// Cap how long `reserve_next` waits for the write lock.
    pub fn with_reserve_wait(mut self, reserve_wait: Duration) -> Self {
        self.reserve_wait = reserve_wait;
        self
    }

    fn from_connection(conn: Connection, busy_timeout: Duration) -> Result<Self, TicketError> {
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            busy_timeout,
            reserve_wait: DEFAULT_RESERVE_WAIT,
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), TicketError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tickets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                queue_id INTEGER NOT NULL,
                customer_name TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 1,
                estimated_time INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'waiting'
                    CHECK (status IN ('waiting', 'processing', 'done')),
                assigned_worker TEXT,
                version INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_tickets_queue_status_created
                ON tickets(queue_id, status, created_at, id);

            CREATE TABLE IF NOT EXISTS ticket_history (
                id INTEGER PRIMARY KEY,
                queue_id INTEGER NOT NULL,
                customer_name TEXT NOT NULL,
                priority INTEGER NOT NULL,
                estimated_time INTEGER NOT NULL,
                status TEXT NOT NULL,
                assigned_worker TEXT,
                version INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT,
                archived_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_ticket_history_queue ON ticket_history(queue_id);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, TicketError> {
        self.conn
            .lock()
            .map_err(|_| TicketError::Persistence("ticket store connection poisoned".to_string()))
    }

    fn validate(ticket: &NewTicket) -> Result<(), TicketError> {
        if ticket.queue_id <= 0 {
            return Err(TicketError::Validation(format!(
                "queue_id must be positive, got {}",
                ticket.queue_id
            )));
        }
        if ticket.customer_name.trim().is_empty() {
            return Err(TicketError::Validation(
                "customer_name cannot be empty".to_string(),
            ));
        }
        if ticket.estimated_time < 0 {
            return Err(TicketError::Validation(
                "estimated_time cannot be negative".to_string(),
            ));
        }
        match ticket.status {
            None | Some(TicketStatus::Waiting) => Ok(()),
            Some(other) => Err(TicketError::Validation(format!(
                "tickets are created waiting, not {}",
                other
            ))),
        }
    }

    fn row_to_ticket(row: &rusqlite::Row) -> rusqlite::Result<Ticket> {
        let status_str: String = row.get(5)?;
        let status = status_str
            .parse::<TicketStatus>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;

        let completed_at = match row.get::<_, Option<String>>(10)? {
            Some(raw) => Some(parse_timestamp(10, &raw)?),
            None => None,
        };

        Ok(Ticket {
            id: row.get(0)?,
            queue_id: row.get(1)?,
            customer_name: row.get(2)?,
            priority: row.get(3)?,
            estimated_time: row.get(4)?,
            status,
            assigned_worker: row.get(6)?,
            version: row.get(7)?,
            created_at: parse_timestamp(8, &row.get::<_, String>(8)?)?,
            updated_at: parse_timestamp(9, &row.get::<_, String>(9)?)?,
            completed_at,
        })
    }

    fn ticket_exists(conn: &Connection, id: i64) -> Result<bool, TicketError> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM tickets WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

/// Current time truncated to what the store persists.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width RFC 3339 so that lexical order is chronological order.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

impl TicketStore for SqliteTicketStore {
    fn create(&self, ticket: NewTicket) -> Result<Ticket, TicketError> {
        Self::validate(&ticket)?;

        let conn = self.conn()?;
        let created_at = now();
        let ts = format_timestamp(created_at);
        let priority = ticket.effective_priority();

        conn.execute(
            "INSERT INTO tickets (queue_id, customer_name, priority, estimated_time, status, version, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                ticket.queue_id,
                ticket.customer_name,
                priority,
                ticket.estimated_time,
                TicketStatus::Waiting.as_str(),
                INITIAL_VERSION,
                ts,
            ],
        )?;

        Ok(Ticket {
            id: conn.last_insert_rowid(),
            queue_id: ticket.queue_id,
            customer_name: ticket.customer_name,
            priority,
            estimated_time: ticket.estimated_time,
            status: TicketStatus::Waiting,
            assigned_worker: None,
            version: INITIAL_VERSION,
            created_at,
            updated_at: created_at,
            completed_at: None,
        })
    }

    fn get(&self, id: i64) -> Result<Ticket, TicketError> {
        let conn = self.conn()?;

        conn.query_row(
            &format!("SELECT {} FROM tickets WHERE id = ?1", TICKET_COLUMNS),
            params![id],
            Self::row_to_ticket,
        )
        .optional()?
        .ok_or(TicketError::NotFound(id))
    }

    fn list_by_status(
        &self,
        queue_id: i64,
        status: TicketStatus,
    ) -> Result<Vec<Ticket>, TicketError> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tickets WHERE queue_id = ?1 AND status = ?2 ORDER BY created_at ASC, id ASC",
            TICKET_COLUMNS
        ))?;

        let tickets = stmt
            .query_map(params![queue_id, status.as_str()], Self::row_to_ticket)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(tickets)
    }

    fn count_by_status(&self, queue_id: i64, status: TicketStatus) -> Result<i64, TicketError> {
        let conn = self.conn()?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tickets WHERE queue_id = ?1 AND status = ?2",
            params![queue_id, status.as_str()],
            |row| row.get(0),
        )?;

        Ok(count)
    }

    fn reserve_next(&self, queue_id: i64) -> Result<Option<Reservation>, TicketError> {
        let mut conn = self.conn()?;

        // IMMEDIATE takes the write lock up front, so two connections can never
        // both read the same row as waiting and then both claim it. Only the
        // BEGIN waits on other writers; in WAL mode the rest never blocks.
        conn.busy_timeout(self.reserve_wait)?;
        let (begun, begin_err) = match conn.transaction_with_behavior(TransactionBehavior::Immediate) {
            Ok(tx) => (Some(tx), None),
            Err(e) => (None, Some(e)),
        };
        let tx = match begin_err {
            None => begun.expect("transaction begun when no error"),
            Some(e) => {
                drop(begun);
                conn.busy_timeout(self.busy_timeout)?;
                return Err(if is_busy(&e) {
                    TicketError::Contended(queue_id)
                } else {
                    e.into()
                });
            }
        };
        tx.busy_timeout(self.busy_timeout)?;

        let candidates = {
            let mut stmt = tx.prepare_cached(&format!(
                "SELECT {} FROM tickets WHERE queue_id = ?1 AND status = 'waiting' ORDER BY created_at ASC, id ASC LIMIT ?2",
                TICKET_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![queue_id, CLAIM_CANDIDATES], Self::row_to_ticket)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let reserved_at = now();
        let ts = format_timestamp(reserved_at);

        for ticket in candidates {
            let new_version: Option<i64> = tx
                .query_row(
                    "UPDATE tickets SET status = 'processing', updated_at = ?1, version = version + 1 WHERE id = ?2 AND status = 'waiting' AND version = ?3 RETURNING version",
                    params![ts, ticket.id, ticket.version],
                    |row| row.get(0),
                )
                .optional()?;

            // Claimed by someone else since the select; skip it.
            let Some(new_version) = new_version else {
                continue;
            };

            tx.commit()?;
            return Ok(Some(Reservation {
                ticket,
                new_version,
                reserved_at,
            }));
        }

        // Dropping the transaction rolls it back; nothing was written.
        Ok(None)
    }

    fn update_status(
        &self,
        id: i64,
        expected_old: TicketStatus,
        new_status: TicketStatus,
        expected_version: i64,
    ) -> Result<StatusUpdate, TicketError> {
        if !expected_old.can_update_to(new_status) {
            return Err(TicketError::InvalidTransition {
                ticket_id: id,
                from: expected_old,
                to: new_status,
            });
        }

        let conn = self.conn()?;
        let ts = format_timestamp(now());
        let completed_at = (new_status == TicketStatus::Done).then(|| ts.clone());

        let applied: Option<(i64, i64)> = conn
            .query_row(
                "UPDATE tickets SET status = ?1, updated_at = ?2, version = version + 1, completed_at = COALESCE(?3, completed_at) WHERE id = ?4 AND status = ?5 AND version = ?6 RETURNING version, queue_id",
                params![
                    new_status.as_str(),
                    ts,
                    completed_at,
                    id,
                    expected_old.as_str(),
                    expected_version,
                ],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match applied {
            Some((new_version, queue_id)) => Ok(StatusUpdate::Applied {
                new_version,
                queue_id,
            }),
            None if Self::ticket_exists(&conn, id)? => Ok(StatusUpdate::Conflict),
            None => Err(TicketError::NotFound(id)),
        }
    }

    fn archive(&self, id: i64) -> Result<ArchiveOutcome, TicketError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let status: Option<String> = tx
            .query_row(
                "SELECT status FROM tickets WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        let Some(status) = status else {
            let archived: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM ticket_history WHERE id = ?1)",
                params![id],
                |row| row.get(0),
            )?;
            return if archived {
                Ok(ArchiveOutcome::AlreadyArchived)
            } else {
                Err(TicketError::NotFound(id))
            };
        };

        let status = status
            .parse::<TicketStatus>()
            .map_err(|e| TicketError::Persistence(e.to_string()))?;
        if !status.is_terminal() {
            return Err(TicketError::NotArchivable {
                ticket_id: id,
                status,
            });
        }

        tx.execute(
            &format!(
                "INSERT OR IGNORE INTO ticket_history ({cols}, archived_at) SELECT {cols}, ?2 FROM tickets WHERE id = ?1",
                cols = TICKET_COLUMNS
            ),
            params![id, format_timestamp(now())],
        )?;
        tx.execute("DELETE FROM tickets WHERE id = ?1", params![id])?;
        tx.commit()?;

        Ok(ArchiveOutcome::Archived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> SqliteTicketStore {
        SqliteTicketStore::in_memory().unwrap()
    }

    fn create_test_request(customer: &str) -> NewTicket {
        NewTicket::new(1, customer).with_estimated_time(300)
    }

    #[test]
    fn test_create_ticket_defaults() {
        let store = create_test_store();

        let ticket = store.create(create_test_request("A")).unwrap();

        assert!(ticket.id > 0);
        assert_eq!(ticket.queue_id, 1);
        assert_eq!(ticket.customer_name, "A");
        assert_eq!(ticket.status, TicketStatus::Waiting);
        assert_eq!(ticket.priority, 1);
        assert_eq!(ticket.version, INITIAL_VERSION);
        assert_eq!(ticket.estimated_time, 300);
        assert!(ticket.completed_at.is_none());
        assert!(ticket.assigned_worker.is_none());
    }

    #[test]
    fn test_create_returns_what_get_reads() {
        let store = create_test_store();

        let created = store
            .create(create_test_request("B").with_priority(4))
            .unwrap();
        let fetched = store.get(created.id).unwrap();

        assert_eq!(fetched, created);
    }

    #[test]
    fn test_create_rejects_invalid_input() {
        let store = create_test_store();

        let blank = NewTicket::new(1, "   ");
        assert!(matches!(store.create(blank), Err(TicketError::Validation(_))));

        let negative = NewTicket::new(1, "A").with_estimated_time(-1);
        assert!(matches!(
            store.create(negative),
            Err(TicketError::Validation(_))
        ));

        let bad_queue = NewTicket::new(0, "A");
        assert!(matches!(
            store.create(bad_queue),
            Err(TicketError::Validation(_))
        ));

        let mut processing = NewTicket::new(1, "A");
        processing.status = Some(TicketStatus::Processing);
        assert!(matches!(
            store.create(processing),
            Err(TicketError::Validation(_))
        ));
    }

    #[test]
    fn test_create_accepts_explicit_waiting_status() {
        let store = create_test_store();
        let mut request = NewTicket::new(1, "A");
        request.status = Some(TicketStatus::Waiting);

        let ticket = store.create(request).unwrap();
        assert_eq!(ticket.status, TicketStatus::Waiting);
    }

    #[test]
    fn test_get_nonexistent_ticket() {
        let store = create_test_store();
        assert!(matches!(store.get(42), Err(TicketError::NotFound(42))));
    }

    #[test]
    fn test_list_by_status_is_fifo_and_scoped_to_queue() {
        let store = create_test_store();

        let first = store.create(NewTicket::new(1, "first")).unwrap();
        store.create(NewTicket::new(2, "other queue")).unwrap();
        let second = store.create(NewTicket::new(1, "second")).unwrap();
        let third = store
            .create(NewTicket::new(1, "third").with_priority(99))
            .unwrap();

        let waiting = store.list_by_status(1, TicketStatus::Waiting).unwrap();
        let ids: Vec<i64> = waiting.iter().map(|t| t.id).collect();

        // priority does not reorder the queue
        assert_eq!(ids, vec![first.id, second.id, third.id]);
    }

    #[test]
    fn test_list_by_status_breaks_ties_by_id() {
        let store = create_test_store();
        let ts = "2026-01-01T00:00:00.000000Z";

        {
            let conn = store.conn().unwrap();
            for name in ["x", "y", "z"] {
                conn.execute(
                    "INSERT INTO tickets (queue_id, customer_name, status, created_at, updated_at) VALUES (1, ?1, 'waiting', ?2, ?2)",
                    params![name, ts],
                )
                .unwrap();
            }
        }

        let waiting = store.list_by_status(1, TicketStatus::Waiting).unwrap();
        let names: Vec<&str> = waiting.iter().map(|t| t.customer_name.as_str()).collect();
        assert_eq!(names, vec!["x", "y", "z"]);

        let reserved = store.reserve_next(1).unwrap().unwrap();
        assert_eq!(reserved.ticket.customer_name, "x");
    }

    #[test]
    fn test_list_by_status_empty_is_ok() {
        let store = create_test_store();
        let tickets = store.list_by_status(9, TicketStatus::Waiting).unwrap();
        assert!(tickets.is_empty());
    }

    #[test]
    fn test_reserve_next_returns_pre_transition_ticket() {
        let store = create_test_store();
        let created = store.create(create_test_request("A")).unwrap();

        let reservation = store.reserve_next(1).unwrap().expect("ticket available");

        assert_eq!(reservation.ticket.id, created.id);
        assert_eq!(reservation.ticket.status, TicketStatus::Waiting);
        assert_eq!(reservation.ticket.version, created.version);
        assert_eq!(reservation.new_version, created.version + 1);

        let stored = store.get(created.id).unwrap();
        assert_eq!(stored.status, TicketStatus::Processing);
        assert_eq!(stored.version, created.version + 1);
        assert!(stored.updated_at >= created.updated_at);
    }

    #[test]
    fn test_reserve_next_empty_queue_mutates_nothing() {
        let store = create_test_store();
        let other = store.create(NewTicket::new(2, "elsewhere")).unwrap();

        assert!(store.reserve_next(1).unwrap().is_none());

        let untouched = store.get(other.id).unwrap();
        assert_eq!(untouched, other);
    }

    #[test]
    fn test_reserve_next_drains_in_fifo_order() {
        let store = create_test_store();
        let ids: Vec<i64> = (0..4)
            .map(|i| store.create(NewTicket::new(1, format!("c{}", i))).unwrap().id)
            .collect();

        let mut reserved = Vec::new();
        while let Some(reservation) = store.reserve_next(1).unwrap() {
            reserved.push(reservation.ticket.id);
        }

        assert_eq!(reserved, ids);
        assert_eq!(store.count_by_status(1, TicketStatus::Processing).unwrap(), 4);
        assert_eq!(store.count_by_status(1, TicketStatus::Waiting).unwrap(), 0);
    }

    #[test]
    fn test_update_status_applies_and_bumps_version() {
        let store = create_test_store();
        let ticket = store.create(create_test_request("A")).unwrap();
        let reservation = store.reserve_next(1).unwrap().unwrap();

        let outcome = store
            .update_status(
                ticket.id,
                TicketStatus::Processing,
                TicketStatus::Done,
                reservation.new_version,
            )
            .unwrap();

        assert_eq!(
            outcome,
            StatusUpdate::Applied {
                new_version: reservation.new_version + 1,
                queue_id: 1,
            }
        );

        let done = store.get(ticket.id).unwrap();
        assert_eq!(done.status, TicketStatus::Done);
        assert!(done.completed_at.is_some());
    }

    #[test]
    fn test_update_status_stale_version_conflicts() {
        let store = create_test_store();
        let ticket = store.create(create_test_request("A")).unwrap();
        let reservation = store.reserve_next(1).unwrap().unwrap();
        let v = reservation.ticket.version;

        // stored version is v + 1 after the reservation
        let outcome = store
            .update_status(ticket.id, TicketStatus::Processing, TicketStatus::Done, v)
            .unwrap();
        assert_eq!(outcome, StatusUpdate::Conflict);

        let stored = store.get(ticket.id).unwrap();
        assert_eq!(stored.status, TicketStatus::Processing);
        assert_eq!(stored.version, v + 1);
        assert!(stored.completed_at.is_none());
    }

    #[test]
    fn test_update_status_wrong_expected_status_conflicts() {
        let store = create_test_store();
        let ticket = store.create(create_test_request("A")).unwrap();

        // ticket is still waiting, so a processing -> done guard cannot match
        let outcome = store
            .update_status(
                ticket.id,
                TicketStatus::Processing,
                TicketStatus::Done,
                ticket.version,
            )
            .unwrap();

        assert!(outcome.is_conflict());
        assert_eq!(store.get(ticket.id).unwrap(), ticket);
    }

    #[test]
    fn test_update_status_rejects_illegal_transitions() {
        let store = create_test_store();
        let ticket = store.create(create_test_request("A")).unwrap();

        let result = store.update_status(
            ticket.id,
            TicketStatus::Waiting,
            TicketStatus::Processing,
            ticket.version,
        );
        assert!(matches!(result, Err(TicketError::InvalidTransition { .. })));

        let result = store.update_status(
            ticket.id,
            TicketStatus::Done,
            TicketStatus::Waiting,
            ticket.version,
        );
        assert!(matches!(result, Err(TicketError::InvalidTransition { .. })));
    }

    #[test]
    fn test_update_status_nonexistent_ticket() {
        let store = create_test_store();
        let result = store.update_status(7, TicketStatus::Processing, TicketStatus::Done, 2);
        assert!(matches!(result, Err(TicketError::NotFound(7))));
    }

    #[test]
    fn test_requeue_makes_ticket_reservable_again() {
        let store = create_test_store();
        let ticket = store.create(create_test_request("A")).unwrap();
        let first = store.reserve_next(1).unwrap().unwrap();

        let outcome = store.requeue(ticket.id, first.new_version).unwrap();
        assert_eq!(
            outcome,
            StatusUpdate::Applied {
                new_version: first.new_version + 1,
                queue_id: ticket.queue_id,
            }
        );

        let second = store.reserve_next(1).unwrap().unwrap();
        assert_eq!(second.ticket.id, ticket.id);
        assert_eq!(second.ticket.version, first.new_version + 1);
        assert_eq!(second.new_version, first.new_version + 2);
    }

    #[test]
    fn test_archive_requires_done() {
        let store = create_test_store();
        let ticket = store.create(create_test_request("A")).unwrap();

        let result = store.archive(ticket.id);
        assert!(matches!(
            result,
            Err(TicketError::NotArchivable {
                status: TicketStatus::Waiting,
                ..
            })
        ));
        assert!(store.get(ticket.id).is_ok());
    }

    #[test]
    fn test_archive_is_idempotent() {
        let store = create_test_store();
        let ticket = store.create(create_test_request("A")).unwrap();
        let reservation = store.reserve_next(1).unwrap().unwrap();
        store
            .update_status(
                ticket.id,
                TicketStatus::Processing,
                TicketStatus::Done,
                reservation.new_version,
            )
            .unwrap();

        assert_eq!(store.archive(ticket.id).unwrap(), ArchiveOutcome::Archived);
        assert!(matches!(
            store.get(ticket.id),
            Err(TicketError::NotFound(_))
        ));
        assert_eq!(
            store.archive(ticket.id).unwrap(),
            ArchiveOutcome::AlreadyArchived
        );

        let conn = store.conn().unwrap();
        let (status, version): (String, i64) = conn
            .query_row(
                "SELECT status, version FROM ticket_history WHERE id = ?1",
                params![ticket.id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(status, "done");
        assert_eq!(version, reservation.new_version + 1);
    }

    #[test]
    fn test_archive_unknown_ticket() {
        let store = create_test_store();
        assert!(matches!(store.archive(5), Err(TicketError::NotFound(5))));
    }

    #[test]
    fn test_ids_are_not_reused_after_archive() {
        let store = create_test_store();
        let ticket = store.create(create_test_request("A")).unwrap();
        let reservation = store.reserve_next(1).unwrap().unwrap();
        store
            .update_status(
                ticket.id,
                TicketStatus::Processing,
                TicketStatus::Done,
                reservation.new_version,
            )
            .unwrap();
        store.archive(ticket.id).unwrap();

        let next = store.create(create_test_request("B")).unwrap();
        assert!(next.id > ticket.id);
    }

    #[test]
    fn test_queue_stats() {
        let store = create_test_store();
        for i in 0..3 {
            store.create(NewTicket::new(1, format!("c{}", i))).unwrap();
        }
        store.create(NewTicket::new(2, "other")).unwrap();
        store.reserve_next(1).unwrap();

        let stats = store.queue_stats(1).unwrap();
        assert_eq!(stats.queue_id, 1);
        assert_eq!(stats.waiting, 2);
        assert_eq!(stats.processing, 1);
        assert_eq!(stats.done, 0);
    }

    #[test]
    fn test_file_based_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("tickets.db");

        let store = SqliteTicketStore::new(&db_path).unwrap();
        let ticket = store.create(create_test_request("A")).unwrap();

        assert!(db_path.exists());

        // A second store on the same file sees the same rows.
        let replica = SqliteTicketStore::new(&db_path).unwrap();
        assert_eq!(replica.get(ticket.id).unwrap().customer_name, "A");
    }

    #[test]
    fn test_reserve_next_reports_contention_instead_of_blocking() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("tickets.db");

        let seeder = SqliteTicketStore::new(&db_path).unwrap();
        for customer in ["A", "B", "C"] {
            seeder.create(create_test_request(customer)).unwrap();
        }

        // Another connection sits on the write lock.
        let holder = Connection::open(&db_path).unwrap();
        holder.execute_batch("BEGIN IMMEDIATE").unwrap();

        let store = SqliteTicketStore::with_busy_timeout(&db_path, Duration::from_secs(5))
            .unwrap()
            .with_reserve_wait(Duration::from_millis(20));
        let started = std::time::Instant::now();
        let result = store.reserve_next(1);

        assert!(matches!(result, Err(TicketError::Contended(1))));
        assert!(started.elapsed() < Duration::from_secs(2));

        // Plain reads are unaffected by the held lock.
        assert_eq!(store.count_by_status(1, TicketStatus::Waiting).unwrap(), 3);

        holder.execute_batch("COMMIT").unwrap();
        let reservation = store.reserve_next(1).unwrap().unwrap();
        assert_eq!(reservation.ticket.customer_name, "A");
    }
}
