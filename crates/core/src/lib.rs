//! `queuebatch-core`: building blocks shared by the batching layer.
//!
//! This crate holds **pure** primitives (no queue storage, no wiring): dispatch
//! options, the job and listener abstractions, the transport traits and the error
//! model.

pub mod error;
pub mod id;
pub mod job;
pub mod listener;
pub mod options;
pub mod queue;

pub use error::{DispatchError, DispatchResult, JobError, ListenerError, QueueError};
pub use id::{BatchId, TaskId};
pub use job::{BufferedJob, Job};
pub use listener::{
    Argument, Capability, HANDLE_METHOD, Listener, ListenerCall, ListenerDescriptor, ListenerType,
    TypeDescriptor, first_argument, resolve_options,
};
pub use options::{DispatchOptions, SYNC_CONNECTION};
pub use queue::{Dispatcher, Queue, QueueFactory, QueuedTask};
