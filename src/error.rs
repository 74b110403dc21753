//! # Transport Error Types
//!
//! Structured error handling for the table-based transport using thiserror.
//! Every failure class the queue engine surfaces has a typed variant;
//! application callback failures stay opaque (`anyhow::Error`) and travel
//! through the failure cache, not through this enum.

use thiserror::Error;

/// Postgres SQLSTATE for "relation does not exist".
const UNDEFINED_TABLE: &str = "42P01";

/// Postgres SQLSTATE for "deadlock detected".
const DEADLOCK_DETECTED: &str = "40P01";

/// Failures surfaced by the table-based transport.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("queue not found: {queue} (table {table})")]
    QueueNotFound {
        queue: String,
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to send message to {destination}")]
    SendFailed {
        destination: String,
        #[source]
        source: Box<TransportError>,
    },

    #[error("queue is full: {queue} (gave up after {attempts} attempts)")]
    QueueFullExhausted { queue: String, attempts: u32 },

    #[error("recovery failed for message {message_id}: {message}")]
    Recovery { message_id: String, message: String },

    #[error("message serialization error: {message}")]
    MessageSerialization { message: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl TransportError {
    /// Wrap a send-path failure with its destination table.
    pub fn send_failed(destination: impl Into<String>, source: TransportError) -> Self {
        Self::SendFailed {
            destination: destination.into(),
            source: Box::new(source),
        }
    }

    /// Create a queue-full exhaustion error.
    pub fn queue_full_exhausted(queue: impl Into<String>, attempts: u32) -> Self {
        Self::QueueFullExhausted {
            queue: queue.into(),
            attempts,
        }
    }

    /// Create a recovery (error-handling policy) failure.
    pub fn recovery(message_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Recovery {
            message_id: message_id.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// True when the underlying database error is a deadlock victim
    /// resolution. The pump logs these and retries without involving the
    /// circuit breakers.
    pub fn is_deadlock(&self) -> bool {
        match self {
            Self::Database(err) => has_sqlstate(err, DEADLOCK_DETECTED),
            Self::SendFailed { source, .. } => source.is_deadlock(),
            _ => false,
        }
    }
}

/// Translate a send-path database error: an undefined-table code means the
/// destination queue does not exist; everything else wraps as a send failure
/// carrying the destination table.
pub(crate) fn translate_send_error(err: sqlx::Error, queue: &str, table: &str) -> TransportError {
    if has_sqlstate(&err, UNDEFINED_TABLE) {
        return TransportError::QueueNotFound {
            queue: queue.to_string(),
            table: table.to_string(),
            source: err,
        };
    }
    TransportError::send_failed(table, TransportError::Database(err))
}

fn has_sqlstate(err: &sqlx::Error, state: &str) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(state))
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::MessageSerialization {
            message: err.to_string(),
        }
    }
}

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_failed_carries_destination() {
        let inner = TransportError::Database(sqlx::Error::PoolTimedOut);
        let err = TransportError::send_failed("\"dbo\".\"orders\"", inner);
        let display = format!("{err}");
        assert!(display.contains("failed to send message"));
        assert!(display.contains("orders"));
    }

    #[test]
    fn queue_full_display_includes_attempts() {
        let err = TransportError::queue_full_exhausted("orders", 20);
        let display = format!("{err}");
        assert!(display.contains("orders"));
        assert!(display.contains("20"));
    }

    #[test]
    fn serde_error_maps_to_serialization() {
        let json_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err: TransportError = json_err.into();
        assert!(matches!(err, TransportError::MessageSerialization { .. }));
    }

    #[test]
    fn non_database_errors_are_not_deadlocks() {
        let err = TransportError::queue_full_exhausted("orders", 3);
        assert!(!err.is_deadlock());
    }
}
