//! # Message Dispatcher
//!
//! Routes outbound operations to the correct connection and transaction.
//! Operations are partitioned by consistency requirement, deduplicated by
//! `(message id, resolved destination)` keeping the first occurrence, and
//! sent through the table-queue protocol.

use crate::address::{QueueAddress, QueueAddressTranslator};
use crate::error::Result;
use crate::queue::TableQueueFactory;
use crate::sending::operations::{DispatchConsistency, TransactionContext, TransportOperation};
use sqlx::{Connection, PgConnection, PgPool};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

pub struct MessageDispatcher {
    pool: PgPool,
    translator: Arc<dyn QueueAddressTranslator>,
    queues: Arc<TableQueueFactory>,
}

impl MessageDispatcher {
    pub fn new(
        pool: PgPool,
        translator: Arc<dyn QueueAddressTranslator>,
        queues: Arc<TableQueueFactory>,
    ) -> Self {
        Self {
            pool,
            translator,
            queues,
        }
    }

    /// Dispatch a batch of operations in the given transaction context.
    pub async fn dispatch(
        &self,
        operations: &[TransportOperation],
        context: TransactionContext<'_>,
    ) -> Result<()> {
        let isolated = deduplicate(
            self.translator.as_ref(),
            operations
                .iter()
                .filter(|op| op.consistency == DispatchConsistency::Isolated),
        );
        let default = deduplicate(
            self.translator.as_ref(),
            operations
                .iter()
                .filter(|op| op.consistency == DispatchConsistency::Default),
        );

        self.dispatch_isolated(&isolated).await?;
        self.dispatch_default(&default, context).await
    }

    /// Isolated operations always commit in their own fresh transaction on
    /// a new connection, regardless of what triggered them.
    async fn dispatch_isolated(&self, operations: &[ResolvedOperation<'_>]) -> Result<()> {
        if operations.is_empty() {
            return Ok(());
        }
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;
        self.send_all(operations, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn dispatch_default(
        &self,
        operations: &[ResolvedOperation<'_>],
        context: TransactionContext<'_>,
    ) -> Result<()> {
        if operations.is_empty() {
            return Ok(());
        }
        match context {
            TransactionContext::Receive {
                receive_only: true, ..
            } => self.dispatch_with_new_connection(operations).await,
            TransactionContext::Receive { connection, .. } => {
                self.send_all(operations, connection).await
            }
            TransactionContext::Ambient => {
                // Table-queue sends cannot enlist in an ambient transaction
                // without a real connection of their own.
                let mut conn = self.pool.acquire().await?;
                self.send_all(operations, &mut conn).await
            }
            TransactionContext::None => self.dispatch_with_new_connection(operations).await,
        }
    }

    async fn dispatch_with_new_connection(
        &self,
        operations: &[ResolvedOperation<'_>],
    ) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        if operations.len() == 1 {
            return self.send_all(operations, &mut conn).await;
        }
        // Multiple operations commit atomically or not at all.
        let mut tx = conn.begin().await?;
        self.send_all(operations, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn send_all(
        &self,
        operations: &[ResolvedOperation<'_>],
        conn: &mut PgConnection,
    ) -> Result<()> {
        for (address, operation) in operations {
            let queue = self.queues.get(&address.qualified_table(), &address.name);
            debug!(
                destination = %address.name,
                message_id = %operation.message.message_id,
                "dispatching message"
            );
            queue
                .send(
                    &operation.message.message_id,
                    &operation.message.headers,
                    &operation.message.body,
                    conn,
                )
                .await?;
        }
        Ok(())
    }
}

type ResolvedOperation<'a> = (QueueAddress, &'a TransportOperation);

/// Resolve destinations and drop duplicate `(message id, resolved
/// destination)` pairs, keeping the first occurrence in input order.
fn deduplicate<'a>(
    translator: &dyn QueueAddressTranslator,
    operations: impl Iterator<Item = &'a TransportOperation>,
) -> Vec<ResolvedOperation<'a>> {
    let mut seen = HashSet::new();
    let mut resolved = Vec::new();
    for operation in operations {
        let address = translator.translate(&operation.destination);
        let key = (
            operation.message.message_id.clone(),
            address.qualified_table(),
        );
        if seen.insert(key) {
            resolved.push((address, operation));
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::DelimitedAddressTranslator;
    use crate::sending::operations::OutgoingMessage;
    use std::collections::HashMap;

    fn operation(id: &str, destination: &str) -> TransportOperation {
        TransportOperation::new(
            OutgoingMessage::with_id(id, HashMap::new(), b"body".to_vec()),
            destination,
        )
    }

    #[test]
    fn duplicate_pairs_collapse_to_first_occurrence() {
        let translator = DelimitedAddressTranslator::default();
        let operations = vec![
            operation("m1", "orders"),
            operation("m1", "orders"),
            operation("m1", "billing"),
            operation("m2", "orders"),
            operation("m1", "orders"),
        ];
        let resolved = deduplicate(&translator, operations.iter());
        let keys: Vec<_> = resolved
            .iter()
            .map(|(address, op)| (op.message.message_id.as_str(), address.name.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![("m1", "orders"), ("m1", "billing"), ("m2", "orders")]
        );
    }

    #[test]
    fn same_table_via_different_spellings_deduplicates() {
        let translator = DelimitedAddressTranslator::new("public");
        let operations = vec![operation("m1", "orders"), operation("m1", "orders@public")];
        let resolved = deduplicate(&translator, operations.iter());
        assert_eq!(resolved.len(), 1);
    }

    #[test]
    fn distinct_ids_are_kept() {
        let translator = DelimitedAddressTranslator::default();
        let operations = vec![operation("m1", "orders"), operation("m2", "orders")];
        let resolved = deduplicate(&translator, operations.iter());
        assert_eq!(resolved.len(), 2);
    }
}
