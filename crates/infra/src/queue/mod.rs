//! Queue transport: named connections over in-memory queues.
//!
//! Durable backends plug in by implementing [`queuebatch_core::Queue`] and
//! registering the connection with the [`QueueManager`].

pub mod in_memory;
pub mod manager;

pub use in_memory::{InMemoryQueue, PushedTask};
pub use manager::QueueManager;
