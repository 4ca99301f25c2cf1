//! `queuebatch-infra`: the batching coordinator and the plumbing around it,
//! base dispatcher, in-memory queue connections, interceptors, queue worker,
//! configuration and per-request wiring.

pub mod batch;
pub mod bus;
pub mod config;
pub mod context;
pub mod interceptors;
pub mod middleware;
pub mod queue;
pub mod worker;

pub use batch::{BatchManager, BufferedItem, FlushReport, ItemBuffer, ProcessBatch, plan_chunks};
pub use bus::{QueueDispatcher, Transport};
pub use config::BatchConfig;
pub use context::BatchContext;
pub use interceptors::{BatchingDispatcher, BatchingListenerQueue, DirectListenerQueue};
pub use middleware::{BatchRequests, RequestScope};
pub use queue::{InMemoryQueue, PushedTask, QueueManager};
pub use worker::{QueueWorker, TaskOutcome, WorkerConfig, WorkerStats};
