//! # Shutdown Signal
//!
//! Cooperative cancellation shared by the pump's receive loops and the
//! queue-empty backpressure waits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Clonable cancellation signal. `cancel` is sticky; waiters observe it
/// exactly once it has been raised, regardless of registration order.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal and wake all waiters.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolve once the signal has been raised.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before the re-check so a concurrent cancel cannot slip
            // between the flag read and the wait.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancelled_resolves_after_cancel() {
        let signal = ShutdownSignal::new();
        let waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!handle.is_finished());

        signal.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should wake")
            .expect("waiter task should not panic");
    }

    #[tokio::test]
    async fn cancel_before_wait_is_observed() {
        let signal = ShutdownSignal::new();
        signal.cancel();
        assert!(signal.is_cancelled());
        // Must not hang even though cancel happened first.
        tokio::time::timeout(Duration::from_secs(1), signal.cancelled())
            .await
            .expect("already-cancelled signal resolves immediately");
    }
}
