//! # Backpressure Strategies
//!
//! Pluggable handling for the two transient starvation conditions of a
//! slot-ring queue: no free slot on send (queue full) and no occupied slot
//! on receive (queue empty). Strategies are injected by construction; the
//! progressive-delay implementations are the production defaults, the
//! no-delay ones exist for tests.

use crate::config::{QueueEmptyConfig, QueueFullConfig};
use crate::error::{Result, TransportError};
use crate::shutdown::ShutdownSignal;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Invoked by a queue handle when a send finds no free slot, and after each
/// successful claim to reset the strategy's failure accounting.
#[async_trait]
pub trait QueueFullHandling: Send + Sync {
    /// Wait (or give up) before the send is retried. Returns
    /// `QueueFullExhausted` once the strategy's attempt ceiling is exceeded;
    /// the one backpressure path that escalates to an error.
    async fn handle_queue_full(&self, queue: &str) -> Result<()>;

    /// Called after a successful claim.
    fn on_queue_non_full(&self);
}

/// Invoked by a receive loop when the queue is observed empty, and after
/// each received message to reset the strategy's accounting.
#[async_trait]
pub trait QueueEmptyHandling: Send + Sync {
    /// Wait before the loop reopens a connection; interruptible by shutdown.
    async fn handle_queue_empty(&self, shutdown: &ShutdownSignal);

    /// Called after a message was received.
    fn on_queue_non_empty(&self);
}

/// Per-loop strategy construction, mirroring per-loop cursor state.
pub type QueueFullHandlingFactory = Arc<dyn Fn() -> Arc<dyn QueueFullHandling> + Send + Sync>;
pub type QueueEmptyHandlingFactory = Arc<dyn Fn() -> Box<dyn QueueEmptyHandling> + Send + Sync>;

/// Waits linearly longer per consecutive full observation, up to an attempt
/// ceiling.
pub struct ProgressiveDelayQueueFull {
    attempts: AtomicU32,
    max_attempts: u32,
    delay_step: Duration,
}

impl ProgressiveDelayQueueFull {
    pub fn new(config: &QueueFullConfig) -> Self {
        Self {
            attempts: AtomicU32::new(0),
            max_attempts: config.max_attempts,
            delay_step: config.delay_step(),
        }
    }
}

#[async_trait]
impl QueueFullHandling for ProgressiveDelayQueueFull {
    async fn handle_queue_full(&self, queue: &str) -> Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt > self.max_attempts {
            return Err(TransportError::queue_full_exhausted(
                queue,
                self.max_attempts,
            ));
        }
        debug!(queue, attempt, "queue full, delaying send");
        tokio::time::sleep(self.delay_step * attempt).await;
        Ok(())
    }

    fn on_queue_non_full(&self) {
        self.attempts.store(0, Ordering::SeqCst);
    }
}

/// Waits linearly longer per consecutive empty observation, capped at a
/// ceiling; the wait yields immediately on shutdown.
pub struct ProgressiveDelayQueueEmpty {
    consecutive_empty: AtomicU32,
    delay_step: Duration,
    max_delay: Duration,
}

impl ProgressiveDelayQueueEmpty {
    pub fn new(config: &QueueEmptyConfig) -> Self {
        Self {
            consecutive_empty: AtomicU32::new(0),
            delay_step: config.delay_step(),
            max_delay: config.max_delay(),
        }
    }

    fn delay_for(&self, consecutive: u32) -> Duration {
        std::cmp::min(self.max_delay, self.delay_step * consecutive)
    }
}

#[async_trait]
impl QueueEmptyHandling for ProgressiveDelayQueueEmpty {
    async fn handle_queue_empty(&self, shutdown: &ShutdownSignal) {
        let consecutive = self.consecutive_empty.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.delay_for(consecutive);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.cancelled() => {}
        }
    }

    fn on_queue_non_empty(&self) {
        self.consecutive_empty.store(0, Ordering::SeqCst);
    }
}

/// Test strategy: counts attempts against the ceiling without waiting.
pub struct NoDelayQueueFull {
    attempts: AtomicU32,
    max_attempts: u32,
}

impl NoDelayQueueFull {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts: AtomicU32::new(0),
            max_attempts,
        }
    }
}

#[async_trait]
impl QueueFullHandling for NoDelayQueueFull {
    async fn handle_queue_full(&self, queue: &str) -> Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt > self.max_attempts {
            return Err(TransportError::queue_full_exhausted(
                queue,
                self.max_attempts,
            ));
        }
        Ok(())
    }

    fn on_queue_non_full(&self) {
        self.attempts.store(0, Ordering::SeqCst);
    }
}

/// Test strategy: yields to the scheduler instead of sleeping.
pub struct NoDelayQueueEmpty;

#[async_trait]
impl QueueEmptyHandling for NoDelayQueueEmpty {
    async fn handle_queue_empty(&self, _shutdown: &ShutdownSignal) {
        tokio::task::yield_now().await;
    }

    fn on_queue_non_empty(&self) {}
}
