//! # Outbound Operations
//!
//! The dispatcher's input model: outgoing messages, their destination and
//! consistency requirement, and the explicit transaction context threaded
//! through the dispatch call chain. Context travels by parameter, never by
//! thread-local or ambient global.

use sqlx::PgConnection;
use std::collections::HashMap;
use uuid::Uuid;

/// A message to be sent.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub message_id: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl OutgoingMessage {
    /// New message with a generated transport id.
    pub fn new(headers: HashMap<String, String>, body: Vec<u8>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), headers, body)
    }

    pub fn with_id(
        message_id: impl Into<String>,
        headers: HashMap<String, String>,
        body: Vec<u8>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            headers,
            body,
        }
    }
}

/// Declared consistency requirement of an outbound operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchConsistency {
    /// May share the connection and transaction of the triggering receive.
    Default,
    /// Must commit in its own fresh transaction, independent of any
    /// ambient one.
    Isolated,
}

/// One outbound send to a logical destination.
#[derive(Debug, Clone)]
pub struct TransportOperation {
    pub message: OutgoingMessage,
    pub destination: String,
    pub consistency: DispatchConsistency,
}

impl TransportOperation {
    pub fn new(message: OutgoingMessage, destination: impl Into<String>) -> Self {
        Self {
            message,
            destination: destination.into(),
            consistency: DispatchConsistency::Default,
        }
    }

    pub fn isolated(message: OutgoingMessage, destination: impl Into<String>) -> Self {
        Self {
            message,
            destination: destination.into(),
            consistency: DispatchConsistency::Isolated,
        }
    }
}

/// Where a dispatch call is executing, passed explicitly by the caller.
pub enum TransactionContext<'a> {
    /// No transport transaction in scope; the dispatcher owns its
    /// connections entirely.
    None,
    /// An ambient transaction exists outside the transport's own
    /// connection; table-queue sends cannot enlist in it, so the
    /// dispatcher opens its own connection beside it.
    Ambient,
    /// Inside a receive transaction.
    Receive {
        connection: &'a mut PgConnection,
        /// The receive transaction is reserved for the receive itself;
        /// dispatches must not ride it.
        receive_only: bool,
    },
}
