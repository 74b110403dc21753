//! # Table Queue
//!
//! The storage abstraction over one logical queue: a fixed ring of
//! preallocated slot rows, claimed in place with single atomic
//! statements. Slots are only ever UPDATEd; the hot path never inserts or
//! deletes, so there is no row churn and no lock escalation.
//!
//! A handle keeps an in-memory cursor pair seeding the `seq >` scans so
//! repeated claims do not restart at the table head. Cursors are advisory:
//! the database row lock makes the actual allocation decision, which is why
//! multiple handles over the same logical queue are safe.

use crate::error::{translate_send_error, Result};
use crate::queue::backpressure::QueueFullHandling;
use crate::queue::row::{MessageReadResult, MessageRow};
use crate::queue::sql;
use sqlx::PgConnection;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Extra scans permitted when the forward scan ran off the end of the ring
/// before backpressure is consulted. Bounded explicitly; claims lost to
/// contention must not grow the stack or loop forever.
const MAX_WRAPAROUND_RESCANS: u8 = 2;

/// One logical queue backed by a slot-ring table.
pub struct TableQueue {
    name: String,
    qualified_table: String,
    receive_sql: String,
    send_sql: String,
    next_seq_sql: String,
    purge_sql: String,
    received_seq: AtomicI32,
    sent_seq: AtomicI32,
    queue_full: Arc<dyn QueueFullHandling>,
}

impl TableQueue {
    pub fn new(
        qualified_table: impl Into<String>,
        queue_name: impl Into<String>,
        queue_full: Arc<dyn QueueFullHandling>,
    ) -> Self {
        let qualified_table = qualified_table.into();
        Self {
            receive_sql: sql::for_table(sql::RECEIVE_TEXT, &qualified_table),
            send_sql: sql::for_table(sql::SEND_TEXT, &qualified_table),
            next_seq_sql: sql::for_table(sql::NEXT_SEQ_TEXT, &qualified_table),
            purge_sql: sql::for_table(sql::PURGE_TEXT, &qualified_table),
            name: queue_name.into(),
            qualified_table,
            received_seq: AtomicI32::new(-1),
            sent_seq: AtomicI32::new(-1),
            queue_full,
        }
    }

    /// Logical queue name, used for diagnostics and error-queue routing.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Claim the next occupied slot past the receive cursor. When the
    /// forward scan comes up empty the cursor is reset just below the
    /// lowest occupied seq and the scan retried once; a second miss means
    /// the queue is (observably) empty.
    pub async fn try_receive(&self, conn: &mut PgConnection) -> Result<MessageReadResult> {
        let mut rescans = 0u8;
        loop {
            let cursor = self.received_seq.load(Ordering::Relaxed);
            let row: Option<MessageRow> = sqlx::query_as(&self.receive_sql)
                .bind(cursor)
                .fetch_optional(&mut *conn)
                .await?;

            if let Some(row) = row {
                debug!(queue = %self.name, seq = row.seq, "claimed message");
                self.received_seq.store(row.seq, Ordering::Relaxed);
                return Ok(row.try_parse(&self.name));
            }

            if rescans >= 1 {
                return Ok(MessageReadResult::NoMessage);
            }
            match self.next_seq(conn, true).await? {
                Some(min_seq) => {
                    self.received_seq.store(min_seq - 1, Ordering::Relaxed);
                    rescans += 1;
                }
                None => return Ok(MessageReadResult::NoMessage),
            }
        }
    }

    /// Send a message into the next free slot past the send cursor.
    #[instrument(skip_all, fields(queue = %self.name, message_id = %message_id))]
    pub async fn send(
        &self,
        message_id: &str,
        headers: &HashMap<String, String>,
        body: &[u8],
        conn: &mut PgConnection,
    ) -> Result<()> {
        let headers_blob = MessageRow::serialize_headers(headers)?;
        let row = MessageRow::from_message(message_id, headers_blob, body);
        self.send_raw(&row, conn).await
    }

    /// Re-send an already-claimed poison row verbatim to this queue. Used
    /// by the receive path for dead-lettering; the raw bytes pass through
    /// untouched so nothing is ever silently dropped.
    pub async fn dead_letter(&self, poison: &MessageRow, conn: &mut PgConnection) -> Result<()> {
        self.send_raw(poison, conn).await
    }

    async fn send_raw(&self, row: &MessageRow, conn: &mut PgConnection) -> Result<()> {
        let mut rescans = 0u8;
        loop {
            let cursor = self.sent_seq.load(Ordering::Relaxed);
            let claimed: Option<(i32,)> = sqlx::query_as(&self.send_sql)
                .bind(cursor)
                .bind(row.message_id.as_deref())
                .bind(row.headers.as_deref())
                .bind(row.body.as_deref())
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| translate_send_error(e, &self.name, &self.qualified_table))?;

            if let Some((seq,)) = claimed {
                self.queue_full.on_queue_non_full();
                self.sent_seq.store(seq, Ordering::Relaxed);
                return Ok(());
            }

            // No free slot past the cursor: either the scan ran off the end
            // of the ring, or the queue is genuinely full.
            if rescans < MAX_WRAPAROUND_RESCANS {
                let min_free = self
                    .next_seq(conn, false)
                    .await
                    .map_err(|e| translate_send_error(e, &self.name, &self.qualified_table))?;
                if let Some(min_seq) = min_free {
                    self.sent_seq.store(min_seq - 1, Ordering::Relaxed);
                    rescans += 1;
                    continue;
                }
            }

            // Full (or pathological contention): let the strategy wait or
            // give up, then rescan from scratch.
            self.queue_full.handle_queue_full(&self.name).await?;
            rescans = 0;
        }
    }

    async fn next_seq(
        &self,
        conn: &mut PgConnection,
        has_message: bool,
    ) -> std::result::Result<Option<i32>, sqlx::Error> {
        let (min_seq,): (Option<i32>,) = sqlx::query_as(&self.next_seq_sql)
            .bind(has_message)
            .fetch_one(&mut *conn)
            .await?;
        Ok(min_seq)
    }

    /// Reset every occupied slot to empty; returns the number of purged
    /// messages. Startup-only.
    #[instrument(skip_all, fields(queue = %self.name))]
    pub async fn purge(&self, conn: &mut PgConnection) -> Result<u64> {
        let purged = sqlx::query(&self.purge_sql)
            .execute(&mut *conn)
            .await?
            .rows_affected();
        Ok(purged)
    }
}

impl fmt::Display for TableQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_table)
    }
}

impl fmt::Debug for TableQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableQueue")
            .field("name", &self.name)
            .field("table", &self.qualified_table)
            .field("received_seq", &self.received_seq.load(Ordering::Relaxed))
            .field("sent_seq", &self.sent_seq.load(Ordering::Relaxed))
            .finish()
    }
}
