//! # Resilience
//!
//! Failure-escalation primitives shared by the receive pump: the breaker
//! watches for sustained inability to reach the database and raises the
//! host's critical channel, without stopping the component that owns it.

pub mod circuit_breaker;

pub use circuit_breaker::{CircuitState, RepeatedFailureCircuitBreaker, TriggerAction};
