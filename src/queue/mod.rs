//! # Queue Engine
//!
//! The table-based queue protocol: slot-ring storage, atomic claim on send
//! and receive with wraparound, poison dead-lettering, backpressure
//! strategies, handle memoization, and provisioning.

pub mod backpressure;
pub mod factory;
pub mod provision;
pub mod row;
pub mod sql;
pub mod table_queue;

pub use backpressure::{
    NoDelayQueueEmpty, NoDelayQueueFull, ProgressiveDelayQueueEmpty, ProgressiveDelayQueueFull,
    QueueEmptyHandling, QueueEmptyHandlingFactory, QueueFullHandling, QueueFullHandlingFactory,
};
pub use factory::TableQueueFactory;
pub use provision::QueueProvisioner;
pub use row::{Message, MessageReadResult, MessageRow};
pub use table_queue::TableQueue;
