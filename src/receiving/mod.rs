//! # Receiving
//!
//! The inbound half of the transport: the host callback contract, the
//! per-message transactional coordinator with its local failure cache, and
//! the concurrent receive pump.

pub mod contract;
pub mod failure_cache;
pub mod pump;
pub mod strategy;

pub use contract::{ErrorContext, ErrorHandleResult, MessageContext, MessageHandler};
pub use failure_cache::{FailureCache, ProcessingFailure};
pub use pump::{MessagePump, PumpSettings};
pub use strategy::{NativeTransactionReceiver, ReceiveOutcome};
