//! # Queue Provisioning
//!
//! Idempotent create-if-absent for queue tables. Concurrent provisioners of
//! the same queue are serialized by an application-level advisory lock keyed
//! by the qualified table name; the table is created and preseeded with a
//! fixed number of empty slots in a single transaction. The engine never
//! grows the ring afterwards.

use crate::address::QueueAddress;
use crate::error::Result;
use crate::queue::sql;
use sqlx::PgPool;
use tracing::{info, instrument};

pub struct QueueProvisioner {
    pool: PgPool,
    slot_count: i32,
}

impl QueueProvisioner {
    pub fn new(pool: PgPool, slot_count: i32) -> Self {
        Self { pool, slot_count }
    }

    /// Create the queue's schema and ring table if absent, and seed any
    /// missing slots. Safe to call from any number of nodes at startup.
    #[instrument(skip(self), fields(queue = %address.name))]
    pub async fn create_queue(&self, address: &QueueAddress) -> Result<()> {
        let qualified = address.qualified_table();
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&qualified)
            .execute(&mut *tx)
            .await?;

        let create_schema = format!(
            "CREATE SCHEMA IF NOT EXISTS \"{}\"",
            address.schema.replace('"', "\"\"")
        );
        sqlx::query(&create_schema).execute(&mut *tx).await?;

        let create_table = sql::for_table(sql::CREATE_TABLE_TEXT, &qualified);
        sqlx::query(&create_table).execute(&mut *tx).await?;

        let seed = sql::for_table(sql::SEED_SLOTS_TEXT, &qualified);
        let seeded = sqlx::query(&seed)
            .bind(self.slot_count)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        if seeded > 0 {
            info!(
                queue = %address.name,
                table = %qualified,
                slots = seeded,
                "queue table provisioned"
            );
        }
        Ok(())
    }
}
