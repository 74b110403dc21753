//! # Repeated-Failure Circuit Breaker
//!
//! Failure-rate escalation primitive for the receive pump. Unlike a
//! fail-fast breaker, this one never rejects calls: it watches how long
//! failures have been going on and, once they persist past a configured
//! duration, raises a single critical signal to the host. The owner keeps
//! running; the host decides what to do about it.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Breaker lifecycle. Closed until the first failure, accumulating while
/// failures continue, triggered once they have persisted past the
/// threshold. Any success resets to closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed = 0,
    Accumulating = 1,
    Triggered = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Accumulating,
            _ => CircuitState::Triggered,
        }
    }
}

/// Raised exactly once per failure episode.
pub type TriggerAction = Box<dyn Fn(&str) + Send + Sync>;

pub struct RepeatedFailureCircuitBreaker {
    name: String,
    time_to_wait: Duration,
    /// Delay applied after recording a failure, keeping a broken loop from
    /// spinning hot against a dead database.
    throttle: Duration,
    state: AtomicU8,
    first_failure_at: parking_lot::Mutex<Option<Instant>>,
    on_trigger: TriggerAction,
}

impl RepeatedFailureCircuitBreaker {
    pub fn new(name: impl Into<String>, time_to_wait: Duration, on_trigger: TriggerAction) -> Self {
        Self {
            name: name.into(),
            time_to_wait,
            throttle: Duration::from_secs(1),
            state: AtomicU8::new(CircuitState::Closed as u8),
            first_failure_at: parking_lot::Mutex::new(None),
            on_trigger,
        }
    }

    /// Override the post-failure throttle (tests).
    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Record a success: the episode, if any, is over.
    pub fn success(&self) {
        let previous = self
            .state
            .swap(CircuitState::Closed as u8, Ordering::AcqRel);
        if previous != CircuitState::Closed as u8 {
            *self.first_failure_at.lock() = None;
            debug!(breaker = %self.name, "circuit breaker reset");
        }
    }

    /// Record a failure. Arms the breaker on the first failure of an
    /// episode; once failures have persisted past the threshold, raises
    /// the critical signal (once). Always applies the throttle delay.
    pub async fn failure(&self, error: &(dyn std::error::Error + Send + Sync + 'static)) {
        let elapsed = {
            let mut first = self.first_failure_at.lock();
            first.get_or_insert_with(Instant::now).elapsed()
        };

        let state = self.state();
        if state == CircuitState::Closed {
            self.state
                .store(CircuitState::Accumulating as u8, Ordering::Release);
            warn!(
                breaker = %self.name,
                time_to_wait_secs = self.time_to_wait.as_secs(),
                error = %error,
                "circuit breaker armed"
            );
        }

        if elapsed >= self.time_to_wait
            && self
                .state
                .swap(CircuitState::Triggered as u8, Ordering::AcqRel)
                != CircuitState::Triggered as u8
        {
            error!(
                breaker = %self.name,
                failing_for_secs = elapsed.as_secs(),
                error = %error,
                "circuit breaker triggered, raising critical error"
            );
            (self.on_trigger)(&error.to_string());
        }

        tokio::time::sleep(self.throttle).await;
    }
}

impl std::fmt::Debug for RepeatedFailureCircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepeatedFailureCircuitBreaker")
            .field("name", &self.name)
            .field("time_to_wait", &self.time_to_wait)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn io_error() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "db down")
    }

    fn counting_breaker(
        time_to_wait: Duration,
    ) -> (RepeatedFailureCircuitBreaker, Arc<AtomicUsize>) {
        let triggers = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&triggers);
        let breaker = RepeatedFailureCircuitBreaker::new(
            "test",
            time_to_wait,
            Box::new(move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .with_throttle(Duration::from_millis(1));
        (breaker, triggers)
    }

    #[tokio::test]
    async fn single_failure_arms_but_does_not_trigger() {
        let (breaker, triggers) = counting_breaker(Duration::from_secs(60));
        breaker.failure(&io_error()).await;
        assert_eq!(breaker.state(), CircuitState::Accumulating);
        assert_eq!(triggers.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn sustained_failures_trigger_once() {
        let (breaker, triggers) = counting_breaker(Duration::from_millis(20));
        breaker.failure(&io_error()).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        breaker.failure(&io_error()).await;
        breaker.failure(&io_error()).await;
        assert_eq!(breaker.state(), CircuitState::Triggered);
        assert_eq!(triggers.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn success_resets_the_episode() {
        let (breaker, triggers) = counting_breaker(Duration::from_millis(10));
        breaker.failure(&io_error()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        breaker.failure(&io_error()).await;
        assert_eq!(triggers.load(Ordering::SeqCst), 1);

        breaker.success();
        assert_eq!(breaker.state(), CircuitState::Closed);

        // A fresh episode may trigger again after the threshold.
        breaker.failure(&io_error()).await;
        assert_eq!(breaker.state(), CircuitState::Accumulating);
        tokio::time::sleep(Duration::from_millis(20)).await;
        breaker.failure(&io_error()).await;
        assert_eq!(triggers.load(Ordering::SeqCst), 2);
    }
}
