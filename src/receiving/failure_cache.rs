//! # Failure Cache
//!
//! Bounded mapping from message id to the last processing failure. A
//! message that just failed locally is routed straight to the
//! error-handling policy on its next delivery instead of re-running the
//! application callback; entries disappear on eventual success and are
//! evicted least-recently-used once the cache is at capacity.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// The recorded outcome of the most recent failed processing attempt.
#[derive(Debug, Clone)]
pub struct ProcessingFailure {
    pub error: Arc<anyhow::Error>,
    pub attempts: u32,
}

/// Thread-safe bounded failure store shared by all receive loops.
pub struct FailureCache {
    entries: Mutex<LruCache<String, ProcessingFailure>>,
}

impl FailureCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Record a failure for a message, bumping its attempt count.
    pub fn record(&self, message_id: &str, error: anyhow::Error) {
        let mut entries = self.entries.lock();
        let attempts = entries
            .get(message_id)
            .map(|failure| failure.attempts)
            .unwrap_or(0)
            + 1;
        entries.push(
            message_id.to_string(),
            ProcessingFailure {
                error: Arc::new(error),
                attempts,
            },
        );
    }

    /// Look up the recorded failure for a message, marking it
    /// recently used.
    pub fn get(&self, message_id: &str) -> Option<ProcessingFailure> {
        self.entries.lock().get(message_id).cloned()
    }

    /// Drop the entry for a message after it finally succeeded.
    pub fn clear(&self, message_id: &str) {
        self.entries.lock().pop(message_id);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
