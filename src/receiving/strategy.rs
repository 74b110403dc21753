//! # Native Transaction Receive
//!
//! One claim→process→commit/rollback cycle against a single connection.
//! The claim and the application's work share one database transaction:
//! commit consumes the slot, rollback undoes the claim and the message
//! becomes immediately visible for redelivery.

use crate::config::IsolationLevel;
use crate::error::{Result, TransportError};
use crate::queue::{Message, MessageReadResult, TableQueue};
use crate::receiving::contract::{ErrorContext, ErrorHandleResult, MessageContext, MessageHandler};
use crate::receiving::failure_cache::{FailureCache, ProcessingFailure};
use sqlx::{Connection, PgConnection};
use std::sync::Arc;
use tracing::debug;

/// What a receive cycle observed, steering the pump's inner loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// A row was claimed and the cycle ran to completion (whether the
    /// message resolved or rolled back for redelivery).
    Received,
    /// Nothing claimable: the loop should release its connection and back
    /// off.
    QueueEmpty,
}

pub struct NativeTransactionReceiver {
    handler: Arc<dyn MessageHandler>,
    failure_cache: Arc<FailureCache>,
    isolation_level: IsolationLevel,
    receive_only: bool,
}

impl NativeTransactionReceiver {
    pub fn new(
        handler: Arc<dyn MessageHandler>,
        failure_cache: Arc<FailureCache>,
        isolation_level: IsolationLevel,
        receive_only: bool,
    ) -> Self {
        Self {
            handler,
            failure_cache,
            isolation_level,
            receive_only,
        }
    }

    /// Run one receive cycle. Claim-phase failures propagate to the caller;
    /// failures after a successful claim are recorded against the message
    /// and the cycle reports `Received`.
    pub async fn receive_message(
        &self,
        input_queue: &TableQueue,
        error_queue: &TableQueue,
        conn: &mut PgConnection,
    ) -> Result<ReceiveOutcome> {
        let mut tx = conn.begin().await?;
        sqlx::query(self.isolation_level.set_sql())
            .execute(&mut *tx)
            .await?;

        let message = match input_queue.try_receive(&mut tx).await? {
            MessageReadResult::NoMessage => {
                // Nothing claimed; the transaction has nothing to keep.
                return Ok(ReceiveOutcome::QueueEmpty);
            }
            MessageReadResult::Poison(row) => {
                error_queue.dead_letter(&row, &mut tx).await?;
                tx.commit().await?;
                return Ok(ReceiveOutcome::Received);
            }
            MessageReadResult::Success(message) => message,
        };

        let resolved = self.try_process(&message, &mut tx).await;
        let committed: Result<bool> = async {
            if resolved {
                tx.commit().await?;
                Ok(true)
            } else {
                tx.rollback().await?;
                Ok(false)
            }
        }
        .await;

        match committed {
            Ok(true) => self.failure_cache.clear(&message.transport_id),
            Ok(false) => {
                debug!(
                    message_id = %message.transport_id,
                    "receive rolled back, message visible for redelivery"
                );
            }
            Err(err) => {
                // The row was claimed; keep the failure local and let the
                // redelivery consult the error policy.
                self.failure_cache
                    .record(&message.transport_id, anyhow::Error::new(err));
            }
        }
        Ok(ReceiveOutcome::Received)
    }

    /// Decide whether the message is resolved. A recorded prior failure
    /// routes to the error policy directly, skipping the callback; a fresh
    /// message runs the callback, capturing any error for the next
    /// delivery.
    async fn try_process(&self, message: &Message, tx: &mut PgConnection) -> bool {
        if let Some(failure) = self.failure_cache.get(&message.transport_id) {
            return match self.handle_error(message, &failure, tx).await {
                ErrorHandleResult::Handled => true,
                ErrorHandleResult::RetryRequired => false,
            };
        }

        let mut ctx = MessageContext::new(message, tx, self.receive_only);
        match self.handler.on_message(&mut ctx).await {
            Ok(()) => !ctx.abort_requested(),
            Err(err) => {
                self.failure_cache.record(&message.transport_id, err);
                false
            }
        }
    }

    async fn handle_error(
        &self,
        message: &Message,
        failure: &ProcessingFailure,
        tx: &mut PgConnection,
    ) -> ErrorHandleResult {
        let mut ctx = ErrorContext::new(
            message,
            failure.error.as_ref(),
            failure.attempts,
            tx,
            self.receive_only,
        );
        match self.handler.on_error(&mut ctx).await {
            Ok(result) => result,
            Err(err) => {
                // The recovery path itself failed; that is fatal for the
                // host to judge, not something to retry here.
                let recovery =
                    TransportError::recovery(&message.transport_id, err.to_string());
                self.handler.on_critical_error(
                    &format!(
                        "Failed to execute recoverability actions for message `{}`",
                        message.transport_id
                    ),
                    &anyhow::Error::new(recovery),
                );
                ErrorHandleResult::RetryRequired
            }
        }
    }
}
