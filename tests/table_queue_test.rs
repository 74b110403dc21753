//! Integration tests for the slot-ring queue protocol: ordering, capacity
//! backpressure, poison dead-lettering, wraparound, and concurrent draining.

mod common;

use common::{drop_queue, occupied_slots, provision, test_pool, unique_queue};
use rowmq::queue::{MessageReadResult, NoDelayQueueFull, TableQueue, TableQueueFactory};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

fn queue_for(table: &str, name: &str) -> TableQueue {
    TableQueue::new(table, name, Arc::new(NoDelayQueueFull::new(3)))
}

fn headers(key: &str, value: &str) -> HashMap<String, String> {
    HashMap::from([(key.to_string(), value.to_string())])
}

#[tokio::test]
async fn messages_are_received_once_in_send_order() {
    let Some(pool) = test_pool().await else { return };
    let logical = unique_queue("ordering");
    let address = provision(&pool, &logical, 50).await;
    let queue = queue_for(&address.qualified_table(), &address.name);

    let mut conn = pool.acquire().await.unwrap();
    for i in 0..20 {
        queue
            .send(
                &format!("m{i}"),
                &headers("n", &i.to_string()),
                format!("body-{i}").as_bytes(),
                &mut conn,
            )
            .await
            .expect("send should succeed with free slots");
    }

    for i in 0..20 {
        match queue.try_receive(&mut conn).await.unwrap() {
            MessageReadResult::Success(message) => {
                assert_eq!(message.transport_id, format!("m{i}"));
                assert_eq!(message.headers["n"], i.to_string());
                assert_eq!(message.body, format!("body-{i}").into_bytes());
            }
            other => panic!("expected message {i}, got {other:?}"),
        }
    }

    assert!(matches!(
        queue.try_receive(&mut conn).await.unwrap(),
        MessageReadResult::NoMessage
    ));

    drop_queue(&pool, &address).await;
}

#[tokio::test]
async fn full_queue_exhausts_backpressure_then_recovers() {
    let Some(pool) = test_pool().await else { return };
    let logical = unique_queue("full");
    let address = provision(&pool, &logical, 4).await;
    let queue = queue_for(&address.qualified_table(), &address.name);

    let mut conn = pool.acquire().await.unwrap();
    for i in 0..4 {
        queue
            .send(&format!("m{i}"), &HashMap::new(), b"x", &mut conn)
            .await
            .unwrap();
    }

    let err = queue
        .send("overflow", &HashMap::new(), b"x", &mut conn)
        .await
        .expect_err("send into a full ring must exhaust the strategy");
    assert!(matches!(
        err,
        rowmq::TransportError::QueueFullExhausted { attempts: 3, .. }
    ));

    // Free one slot; the next send must succeed.
    assert!(matches!(
        queue.try_receive(&mut conn).await.unwrap(),
        MessageReadResult::Success(_)
    ));
    queue
        .send("after-space", &HashMap::new(), b"x", &mut conn)
        .await
        .expect("send succeeds once a slot is free");

    assert_eq!(occupied_slots(&pool, &address).await, 4);
    drop_queue(&pool, &address).await;
}

#[tokio::test]
async fn corrupt_headers_are_dead_lettered_intact() {
    let Some(pool) = test_pool().await else { return };
    let input_logical = unique_queue("poison_in");
    let error_logical = unique_queue("poison_err");
    let input_address = provision(&pool, &input_logical, 10).await;
    let error_address = provision(&pool, &error_logical, 10).await;
    let input = queue_for(&input_address.qualified_table(), &input_address.name);
    let errors = queue_for(&error_address.qualified_table(), &error_address.name);

    let mut conn = pool.acquire().await.unwrap();
    input
        .send("poisoned", &headers("k", "v"), b"poison-body", &mut conn)
        .await
        .unwrap();

    let corrupt_sql = format!(
        "UPDATE {} SET headers = '{{not json' WHERE has_message",
        input_address.qualified_table()
    );
    sqlx::query(&corrupt_sql).execute(&pool).await.unwrap();

    let row = match input.try_receive(&mut conn).await.unwrap() {
        MessageReadResult::Poison(row) => row,
        other => panic!("expected poison, got {other:?}"),
    };
    errors
        .dead_letter(&row, &mut conn)
        .await
        .expect("dead-letter must not drop the row");

    // The raw row lives on in the error queue with identical bytes.
    let stored_sql = format!(
        "SELECT message_id, headers, body FROM {} WHERE has_message",
        error_address.qualified_table()
    );
    let (message_id, stored_headers, body): (Option<String>, Option<String>, Option<Vec<u8>>) =
        sqlx::query_as(&stored_sql).fetch_one(&pool).await.unwrap();
    assert_eq!(message_id.as_deref(), Some("poisoned"));
    assert_eq!(stored_headers.as_deref(), Some("{not json"));
    assert_eq!(body.as_deref(), Some(&b"poison-body"[..]));

    // Nothing remains on the input queue, and the application never saw it.
    assert!(matches!(
        input.try_receive(&mut conn).await.unwrap(),
        MessageReadResult::NoMessage
    ));

    drop_queue(&pool, &input_address).await;
    drop_queue(&pool, &error_address).await;
}

#[tokio::test]
async fn scans_wrap_around_the_ring() {
    let Some(pool) = test_pool().await else { return };
    let logical = unique_queue("wrap");
    let address = provision(&pool, &logical, 3).await;
    let queue = queue_for(&address.qualified_table(), &address.name);

    let mut conn = pool.acquire().await.unwrap();
    // Far more cycles than slots: both cursors must wrap past the maximum
    // seq repeatedly without ever reporting a false empty/full.
    for cycle in 0..10 {
        let id = format!("cycle-{cycle}");
        queue.send(&id, &HashMap::new(), b"w", &mut conn).await.unwrap();
        match queue.try_receive(&mut conn).await.unwrap() {
            MessageReadResult::Success(message) => assert_eq!(message.transport_id, id),
            other => panic!("expected {id}, got {other:?}"),
        }
    }

    drop_queue(&pool, &address).await;
}

#[tokio::test]
async fn purge_resets_every_occupied_slot() {
    let Some(pool) = test_pool().await else { return };
    let logical = unique_queue("purge");
    let address = provision(&pool, &logical, 10).await;
    let queue = queue_for(&address.qualified_table(), &address.name);

    let mut conn = pool.acquire().await.unwrap();
    for i in 0..6 {
        queue
            .send(&format!("m{i}"), &HashMap::new(), b"x", &mut conn)
            .await
            .unwrap();
    }

    let purged = queue.purge(&mut conn).await.unwrap();
    assert_eq!(purged, 6);
    assert_eq!(occupied_slots(&pool, &address).await, 0);
    assert!(matches!(
        queue.try_receive(&mut conn).await.unwrap(),
        MessageReadResult::NoMessage
    ));

    drop_queue(&pool, &address).await;
}

#[tokio::test]
async fn missing_queue_table_reports_queue_not_found() {
    let Some(pool) = test_pool().await else { return };
    let queue = queue_for("\"public\".\"rowmq_no_such_table\"", "missing");

    let mut conn = pool.acquire().await.unwrap();
    let err = queue
        .send("m1", &HashMap::new(), b"x", &mut conn)
        .await
        .expect_err("sending to an absent table must fail");
    assert!(matches!(
        err,
        rowmq::TransportError::QueueNotFound { .. }
    ));
}

#[tokio::test]
async fn concurrent_receivers_drain_exactly_once() {
    let Some(pool) = test_pool().await else { return };
    let logical = unique_queue("drain");
    let address = provision(&pool, &logical, 300).await;

    const PRELOADED: usize = 120;
    {
        let loader = queue_for(&address.qualified_table(), &address.name);
        let mut conn = pool.acquire().await.unwrap();
        for i in 0..PRELOADED {
            loader
                .send(&format!("m{i}"), &HashMap::new(), b"x", &mut conn)
                .await
                .unwrap();
        }
    }

    let received = Arc::new(parking_lot::Mutex::new(Vec::<String>::new()));
    let mut workers = Vec::new();
    for _ in 0..4 {
        let pool = pool.clone();
        let table = address.qualified_table();
        let name = address.name.clone();
        let received = Arc::clone(&received);
        workers.push(tokio::spawn(async move {
            // Each worker gets its own registry, so cursors are
            // independent; the row lock arbitrates the claims.
            let factory = TableQueueFactory::new(Arc::new(NoDelayQueueFull::new(1)));
            let queue = factory.get(&table, &name);
            let mut conn = pool.acquire().await.unwrap();
            loop {
                match queue.try_receive(&mut conn).await.unwrap() {
                    MessageReadResult::Success(message) => {
                        received.lock().push(message.transport_id);
                    }
                    MessageReadResult::NoMessage => break,
                    MessageReadResult::Poison(row) => {
                        panic!("unexpected poison at seq {}", row.seq)
                    }
                }
            }
        }));
    }
    for worker in workers {
        worker.await.unwrap();
    }

    // A worker may observe an empty scan while the last rows are being
    // claimed; sweep any stragglers before asserting totals.
    {
        let sweeper = queue_for(&address.qualified_table(), &address.name);
        let mut conn = pool.acquire().await.unwrap();
        while let MessageReadResult::Success(message) =
            sweeper.try_receive(&mut conn).await.unwrap()
        {
            received.lock().push(message.transport_id);
        }
    }

    let received = received.lock();
    assert_eq!(received.len(), PRELOADED, "no losses");
    let unique: HashSet<&String> = received.iter().collect();
    assert_eq!(unique.len(), PRELOADED, "no duplicates");

    drop_queue(&pool, &address).await;
}
