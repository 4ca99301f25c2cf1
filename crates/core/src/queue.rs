//! Transport abstractions: the dispatcher jobs are handed to and the queue
//! connections tasks are pushed onto.
//!
//! The batching layer treats both as opaque sinks. It decides *when* and *how
//! grouped* work reaches them, never how they store or deliver it.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{DispatchResult, QueueError};
use crate::job::Job;
use crate::listener::ListenerCall;

/// Something a queue connection can hold.
#[derive(Debug)]
pub enum QueuedTask {
    /// A job to be executed by a worker.
    Job(Box<dyn Job>),
    /// A deferred listener invocation.
    Listener(ListenerCall),
}

impl QueuedTask {
    /// Name for logging: the job name or the listener type.
    pub fn name(&self) -> &str {
        match self {
            QueuedTask::Job(job) => job.name(),
            QueuedTask::Listener(call) => call.listener(),
        }
    }

    pub fn as_job(&self) -> Option<&(dyn Job + 'static)> {
        match self {
            QueuedTask::Job(job) => Some(job.as_ref()),
            QueuedTask::Listener(_) => None,
        }
    }

    pub fn as_listener_call(&self) -> Option<&ListenerCall> {
        match self {
            QueuedTask::Job(_) => None,
            QueuedTask::Listener(call) => Some(call),
        }
    }
}

/// A single queue connection.
///
/// `queue == None` targets the connection's default queue.
pub trait Queue: Send + Sync {
    fn push_on(&self, queue: Option<&str>, task: QueuedTask) -> Result<(), QueueError>;

    fn later_on(
        &self,
        queue: Option<&str>,
        delay: Duration,
        task: QueuedTask,
    ) -> Result<(), QueueError>;
}

/// Resolves queue connections by name (`None` = default connection).
pub trait QueueFactory: Send + Sync {
    fn connection(&self, name: Option<&str>) -> Result<Arc<dyn Queue>, QueueError>;
}

/// Hands jobs to the queue subsystem.
///
/// - `dispatch`: enqueue (fire-and-forget from the caller's perspective).
/// - `dispatch_sync`: run inline now, never enqueued and never buffered.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, job: Box<dyn Job>) -> DispatchResult<()>;

    fn dispatch_sync(&self, job: Box<dyn Job>) -> DispatchResult<()>;
}

impl<D> Dispatcher for Arc<D>
where
    D: Dispatcher + ?Sized,
{
    fn dispatch(&self, job: Box<dyn Job>) -> DispatchResult<()> {
        (**self).dispatch(job)
    }

    fn dispatch_sync(&self, job: Box<dyn Job>) -> DispatchResult<()> {
        (**self).dispatch_sync(job)
    }
}

impl<F> QueueFactory for Arc<F>
where
    F: QueueFactory + ?Sized,
{
    fn connection(&self, name: Option<&str>) -> Result<Arc<dyn Queue>, QueueError> {
        (**self).connection(name)
    }
}
