//! # Sending
//!
//! The outbound half of the transport: operation model and the dispatcher
//! reconciling isolated and piggy-backed sends.

pub mod dispatcher;
pub mod operations;

pub use dispatcher::MessageDispatcher;
pub use operations::{
    DispatchConsistency, OutgoingMessage, TransactionContext, TransportOperation,
};
