//! Shared helpers for database-backed integration tests.
//!
//! Tests require a PostgreSQL database reachable through
//! `TEST_DATABASE_URL` and skip themselves when it is not set.

use rowmq::address::{DelimitedAddressTranslator, QueueAddress, QueueAddressTranslator};
use rowmq::queue::QueueProvisioner;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

/// Connect to the test database, or `None` when no database is configured.
pub async fn test_pool() -> Option<PgPool> {
    let url = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            println!("skipping test - no TEST_DATABASE_URL provided");
            return None;
        }
    };
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .expect("failed to connect to test database");
    Some(pool)
}

/// A unique logical queue name per test run, so suites never collide.
pub fn unique_queue(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

/// Resolve a logical name with the default translator.
pub fn address_of(logical: &str) -> QueueAddress {
    DelimitedAddressTranslator::default().translate(logical)
}

/// Provision a ring table with the given capacity.
pub async fn provision(pool: &PgPool, logical: &str, slots: i32) -> QueueAddress {
    let address = address_of(logical);
    QueueProvisioner::new(pool.clone(), slots)
        .create_queue(&address)
        .await
        .expect("failed to provision queue table");
    address
}

/// Drop a provisioned queue table.
pub async fn drop_queue(pool: &PgPool, address: &QueueAddress) {
    let drop_sql = format!("DROP TABLE IF EXISTS {}", address.qualified_table());
    sqlx::query(&drop_sql)
        .execute(pool)
        .await
        .expect("failed to drop queue table");
}

/// Count occupied slots in a queue table.
pub async fn occupied_slots(pool: &PgPool, address: &QueueAddress) -> i64 {
    let count_sql = format!(
        "SELECT COUNT(*) FROM {} WHERE has_message",
        address.qualified_table()
    );
    let (count,): (i64,) = sqlx::query_as(&count_sql)
        .fetch_one(pool)
        .await
        .expect("failed to count occupied slots");
    count
}
