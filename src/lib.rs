#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # rowmq
//!
//! Durable, transactional message queue built on ordinary relational
//! tables, exposed through send/receive primitives for a hosting
//! message-bus framework.
//!
//! ## Overview
//!
//! Each logical queue is a fixed-capacity ring of preallocated slot rows.
//! Sending claims a free slot and fills it; receiving claims an occupied
//! slot and empties it. Both claims are single atomic statements under
//! row-level locks that skip rows locked by concurrent claimants
//! (`FOR UPDATE SKIP LOCKED`), so any number of senders and receivers
//! cooperate with no coordination beyond the database itself. Slots are
//! reused in place forever: the hot path never inserts or deletes rows.
//!
//! Receives run inside a native database transaction. A commit consumes
//! the message; a rollback undoes the claim and the message is immediately
//! visible for redelivery. A message that keeps failing locally is routed
//! to the host's error-handling policy through a bounded failure cache
//! instead of re-running application code, and a row whose metadata cannot
//! be reconstructed is dead-lettered to the error queue untouched, never
//! handed to the application.
//!
//! ## Module Organization
//!
//! - [`queue`] - slot-ring storage protocol, backpressure, provisioning
//! - [`receiving`] - host contract, transactional coordinator, pump
//! - [`sending`] - outbound operations and the dispatcher
//! - [`resilience`] - failure-duration circuit breaker
//! - [`address`] - logical name to table resolution
//! - [`config`] - transport configuration
//! - [`error`] - structured error handling
//! - [`shutdown`] - cooperative cancellation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rowmq::address::DelimitedAddressTranslator;
//! use rowmq::config::TransportConfig;
//! use rowmq::receiving::{MessagePump, PumpSettings};
//! use std::sync::Arc;
//!
//! # async fn example(
//! #     pool: sqlx::PgPool,
//! #     handler: Arc<dyn rowmq::receiving::MessageHandler>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let pump = MessagePump::new(
//!     pool,
//!     Arc::new(DelimitedAddressTranslator::default()),
//!     handler,
//!     TransportConfig::default(),
//!     PumpSettings {
//!         input_queue: "orders".to_string(),
//!         error_queue: "orders.errors".to_string(),
//!     },
//! );
//! pump.start().await?;
//! // ... run until shutdown ...
//! pump.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod config;
pub mod error;
pub mod logging;
pub mod queue;
pub mod receiving;
pub mod resilience;
pub mod sending;
pub mod shutdown;

pub use address::{DelimitedAddressTranslator, QueueAddress, QueueAddressTranslator};
pub use config::{IsolationLevel, QueueEmptyConfig, QueueFullConfig, TransportConfig};
pub use error::{Result, TransportError};
pub use queue::{
    Message, MessageReadResult, MessageRow, QueueProvisioner, TableQueue, TableQueueFactory,
};
pub use receiving::{
    ErrorContext, ErrorHandleResult, FailureCache, MessageContext, MessageHandler, MessagePump,
    NativeTransactionReceiver, PumpSettings, ReceiveOutcome,
};
pub use sending::{
    DispatchConsistency, MessageDispatcher, OutgoingMessage, TransactionContext,
    TransportOperation,
};
pub use shutdown::ShutdownSignal;
