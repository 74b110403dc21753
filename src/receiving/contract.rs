//! # Host Callback Contract
//!
//! The seam between the queue engine and the message-bus framework hosting
//! it. The host supplies a [`MessageHandler`]; the receive coordinator
//! invokes it per claimed message and treats it as opaque.

use crate::queue::Message;
use crate::sending::TransactionContext;
use async_trait::async_trait;
use sqlx::PgConnection;
use std::collections::HashMap;

/// Outcome of the host's error-handling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorHandleResult {
    /// The failure was taken care of (retried elsewhere, forwarded, dropped
    /// by policy); the message counts as resolved.
    Handled,
    /// The message should be redelivered.
    RetryRequired,
}

/// Context handed to `on_message`, scoped to the receive transaction.
pub struct MessageContext<'a> {
    message: &'a Message,
    connection: &'a mut PgConnection,
    receive_only: bool,
    abort_requested: bool,
}

impl<'a> MessageContext<'a> {
    pub(crate) fn new(
        message: &'a Message,
        connection: &'a mut PgConnection,
        receive_only: bool,
    ) -> Self {
        Self {
            message,
            connection,
            receive_only,
            abort_requested: false,
        }
    }

    pub fn transport_id(&self) -> &str {
        &self.message.transport_id
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.message.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.message.body
    }

    /// Abort processing without an error: the receive rolls back cleanly,
    /// no failure is recorded, and the message becomes visible again.
    pub fn abort_processing(&mut self) {
        self.abort_requested = true;
    }

    pub(crate) fn abort_requested(&self) -> bool {
        self.abort_requested
    }

    /// The dispatch context for sends made while processing this message.
    /// Default-consistency operations ride the receive transaction unless
    /// the transport runs in receive-only mode.
    pub fn transaction_context(&mut self) -> TransactionContext<'_> {
        TransactionContext::Receive {
            connection: &mut *self.connection,
            receive_only: self.receive_only,
        }
    }
}

/// Context handed to `on_error` when a message has a recorded failure.
pub struct ErrorContext<'a> {
    message: &'a Message,
    error: &'a anyhow::Error,
    attempts: u32,
    connection: &'a mut PgConnection,
    receive_only: bool,
}

impl<'a> ErrorContext<'a> {
    pub(crate) fn new(
        message: &'a Message,
        error: &'a anyhow::Error,
        attempts: u32,
        connection: &'a mut PgConnection,
        receive_only: bool,
    ) -> Self {
        Self {
            message,
            error,
            attempts,
            connection,
            receive_only,
        }
    }

    pub fn transport_id(&self) -> &str {
        &self.message.transport_id
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.message.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.message.body
    }

    /// The failure that put this message on the error path.
    pub fn error(&self) -> &anyhow::Error {
        self.error
    }

    /// Number of processing attempts so far, including the failed ones.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn transaction_context(&mut self) -> TransactionContext<'_> {
        TransactionContext::Receive {
            connection: &mut *self.connection,
            receive_only: self.receive_only,
        }
    }
}

/// Supplied by the hosting framework; all three callbacks are opaque to the
/// transport.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one message inside the receive transaction. An error rolls
    /// the receive back and records the failure for the next delivery.
    async fn on_message(&self, ctx: &mut MessageContext<'_>) -> anyhow::Result<()>;

    /// Decide what to do with a message that already failed locally.
    async fn on_error(&self, ctx: &mut ErrorContext<'_>) -> anyhow::Result<ErrorHandleResult>;

    /// Raised for failures the transport cannot recover from locally. The
    /// transport keeps running; stopping is the host's decision.
    fn on_critical_error(&self, reason: &str, error: &anyhow::Error);
}
