//! # Table Queue Factory
//!
//! Memoizes queue handles per `(qualified table, logical name)` pair so the
//! operations of one receive loop or dispatch context share cursor state.
//! Sharing is deliberate: it serializes scan seeding per handle, while the
//! database row lock keeps allocation correct across factories.

use crate::queue::backpressure::QueueFullHandling;
use crate::queue::table_queue::TableQueue;
use dashmap::DashMap;
use std::sync::Arc;

pub struct TableQueueFactory {
    cache: DashMap<(String, String), Arc<TableQueue>>,
    queue_full: Arc<dyn QueueFullHandling>,
}

impl TableQueueFactory {
    pub fn new(queue_full: Arc<dyn QueueFullHandling>) -> Self {
        Self {
            cache: DashMap::new(),
            queue_full,
        }
    }

    /// Fetch or create the handle for a queue.
    pub fn get(&self, qualified_table: &str, queue_name: &str) -> Arc<TableQueue> {
        self.cache
            .entry((qualified_table.to_string(), queue_name.to_string()))
            .or_insert_with(|| {
                Arc::new(TableQueue::new(
                    qualified_table,
                    queue_name,
                    Arc::clone(&self.queue_full),
                ))
            })
            .clone()
    }
}
