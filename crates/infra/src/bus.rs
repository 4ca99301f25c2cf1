//! Base dispatch path: the dispatcher and queue plumbing that batching sits in
//! front of.
//!
//! ## Routing
//!
//! ```text
//! Job
//!   ↓
//! should_queue() == false, or connection == "sync"  → run inline (Job::handle)
//!   ↓
//! connection(job.connection)
//!   ↓
//! delay?  → later_on(queue, delay, task)
//!         → push_on(queue, task)
//! ```
//!
//! Queued listener calls follow the same shape once their options are resolved
//! from the listener type's descriptor.
//!
//! This module owns no storage; it composes [`QueueFactory`] and [`ListenerRegistry`].

use std::sync::Arc;

use tracing::trace;

use queuebatch_core::{
    BufferedJob, DispatchError, DispatchOptions, DispatchResult, Dispatcher, Job, ListenerCall,
    Queue, QueueError, QueueFactory, QueuedTask, resolve_options,
};
use queuebatch_events::ListenerRegistry;

/// The dispatcher sitting directly on top of the queue connections.
///
/// It never buffers; batching is layered in front of it by
/// [`BatchingDispatcher`](crate::interceptors::BatchingDispatcher).
#[derive(Clone)]
pub struct QueueDispatcher {
    queues: Arc<dyn QueueFactory>,
}

impl QueueDispatcher {
    pub fn new(queues: Arc<dyn QueueFactory>) -> Self {
        Self { queues }
    }
}

impl Dispatcher for QueueDispatcher {
    fn dispatch(&self, job: Box<dyn Job>) -> DispatchResult<()> {
        if !job.should_queue() || job.options().is_sync() {
            trace!(job = job.name(), "running job inline");
            return run_inline(job);
        }

        let options = job.options().clone();
        push(self.queues.as_ref(), &options, QueuedTask::Job(job))
    }

    fn dispatch_sync(&self, job: Box<dyn Job>) -> DispatchResult<()> {
        run_inline(job)
    }
}

impl core::fmt::Debug for QueueDispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QueueDispatcher").finish_non_exhaustive()
    }
}

fn run_inline(mut job: Box<dyn Job>) -> DispatchResult<()> {
    match job.handle() {
        Some(result) => result,
        None => Err(DispatchError::NotInlineable(job.name())),
    }
}

fn push(
    queues: &dyn QueueFactory,
    options: &DispatchOptions,
    task: QueuedTask,
) -> DispatchResult<()> {
    let connection: Arc<dyn Queue> = queues.connection(options.connection.as_deref())?;
    let queue = options.queue.as_deref();

    let pushed: Result<(), QueueError> = match options.delay {
        Some(delay) => connection.later_on(queue, delay, task),
        None => connection.push_on(queue, task),
    };
    Ok(pushed?)
}

/// Everything flush and batch replay dispatch through: the underlying (never
/// batching) dispatcher, the queue connections and the listener registry.
#[derive(Clone)]
pub struct Transport {
    pub bus: Arc<dyn Dispatcher>,
    pub queues: Arc<dyn QueueFactory>,
    pub listeners: Arc<ListenerRegistry>,
}

impl Transport {
    pub fn new(
        bus: Arc<dyn Dispatcher>,
        queues: Arc<dyn QueueFactory>,
        listeners: Arc<ListenerRegistry>,
    ) -> Self {
        Self {
            bus,
            queues,
            listeners,
        }
    }

    /// Standard wiring: a [`QueueDispatcher`] over `queues`.
    pub fn over_queues(queues: Arc<dyn QueueFactory>, listeners: Arc<ListenerRegistry>) -> Self {
        let bus = Arc::new(QueueDispatcher::new(queues.clone()));
        Self::new(bus, queues, listeners)
    }

    /// Re-apply the job's buffered options and enqueue it.
    pub fn dispatch_job(&self, buffered: BufferedJob) -> DispatchResult<()> {
        self.bus.dispatch(buffered.into_job())
    }

    /// Execute a buffered job now: its own handler if it has one, otherwise
    /// through `dispatch_sync`.
    pub fn run_job(&self, buffered: BufferedJob) -> DispatchResult<()> {
        let mut job = buffered.into_job();
        match job.handle() {
            Some(result) => result,
            None => self.bus.dispatch_sync(job),
        }
    }

    /// Resolve the listener's connection, queue and delay and push the call.
    ///
    /// Only the listener's descriptor is consulted; no instance is built. Calls
    /// routed to the `sync` connection are invoked right away.
    pub fn queue_listener_call(&self, call: ListenerCall) -> DispatchResult<()> {
        let descriptor = self
            .listeners
            .descriptor(call.listener())
            .ok_or_else(|| DispatchError::UnknownListener(call.listener().to_string()))?;
        let options = resolve_options(descriptor.as_ref(), call.arguments());

        if options.is_sync() {
            return self.listeners.invoke(&call);
        }

        trace!(
            listener = call.listener(),
            connection = ?options.connection,
            queue = ?options.queue,
            delay = ?options.delay,
            "queueing listener call"
        );
        push(self.queues.as_ref(), &options, QueuedTask::Listener(call))
    }

    /// Build the listener and call its method with the original arguments.
    pub fn call_listener(&self, call: &ListenerCall) -> DispatchResult<()> {
        self.listeners.invoke(call)
    }
}

impl core::fmt::Debug for Transport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Transport")
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}
