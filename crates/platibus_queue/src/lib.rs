//! platibus_queue
//!
//! The durable message queue engine. A queue persists every enqueued
//! message, dispatches pending rows to its listener with a bounded number of
//! concurrent workers, retries non-acknowledged deliveries after a delay,
//! dead-letters rows whose attempts are exhausted, and re-dispatches
//! whatever was pending when the process stopped.
//!
//! Concurrency and usage notes:
//! - A queue is held behind `Arc` and shared freely; `enqueue` and `close`
//!   take `&self`.
//! - The listener is invoked outside any storage operation, so listeners may
//!   perform their own I/O (including enqueueing to other queues) without
//!   deadlocking the engine.
//! - Cancellation is not an error: closing a queue lets in-flight attempts
//!   finish or observe the token, and leaves unfinished rows pending for the
//!   next open.

pub mod engine;
pub mod error;
pub mod listener;
pub mod manager;
pub mod options;
pub mod store;

pub use engine::MessageQueue;
pub use error::QueueError;
pub use listener::{DeliveryContext, ListenerError, QueueListener};
pub use manager::QueueManager;
pub use options::QueueOptions;
pub use store::QueuedMessageRecord;

/// Name identifying one queue; each queue exclusively owns its row set.
pub type QueueName = String;
