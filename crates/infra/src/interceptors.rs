//! Interceptors that divert queueable work into the [`BatchManager`] while a
//! batching scope is open.

use std::sync::Arc;

use tracing::trace;

use queuebatch_core::{DispatchResult, Dispatcher, Job, ListenerCall};
use queuebatch_events::ListenerQueue;

use crate::batch::BatchManager;
use crate::bus::Transport;

/// Job dispatcher that buffers queueable jobs during a scope.
///
/// Jobs are buffered when they want a queue, batching is active and they are
/// not bound to the `sync` connection. Everything else, and every
/// `dispatch_sync`, goes straight to the inner dispatcher.
#[derive(Clone)]
pub struct BatchingDispatcher {
    manager: Arc<BatchManager>,
    inner: Arc<dyn Dispatcher>,
}

impl BatchingDispatcher {
    pub fn new(manager: Arc<BatchManager>, inner: Arc<dyn Dispatcher>) -> Self {
        Self { manager, inner }
    }

    /// Interceptor in front of the manager's own underlying dispatcher.
    pub fn over(manager: Arc<BatchManager>) -> Self {
        let inner = manager.transport().bus.clone();
        Self::new(manager, inner)
    }

    pub fn manager(&self) -> &Arc<BatchManager> {
        &self.manager
    }

    fn should_buffer(&self, job: &dyn Job) -> bool {
        job.should_queue() && !job.options().is_sync() && self.manager.is_batching()
    }
}

impl Dispatcher for BatchingDispatcher {
    fn dispatch(&self, job: Box<dyn Job>) -> DispatchResult<()> {
        if self.should_buffer(job.as_ref()) {
            self.manager.add_job(job);
            return Ok(());
        }
        self.inner.dispatch(job)
    }

    fn dispatch_sync(&self, job: Box<dyn Job>) -> DispatchResult<()> {
        self.inner.dispatch_sync(job)
    }
}

impl core::fmt::Debug for BatchingDispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BatchingDispatcher")
            .field("manager", &self.manager)
            .finish_non_exhaustive()
    }
}

/// Listener queue pushing calls straight to their resolved queue connection.
#[derive(Debug, Clone)]
pub struct DirectListenerQueue {
    transport: Transport,
}

impl DirectListenerQueue {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }
}

impl ListenerQueue for DirectListenerQueue {
    fn queue_listener(&self, call: ListenerCall) -> DispatchResult<()> {
        self.transport.queue_listener_call(call)
    }
}

/// Listener queue that buffers calls during a scope and otherwise pushes them
/// directly.
#[derive(Debug, Clone)]
pub struct BatchingListenerQueue {
    manager: Arc<BatchManager>,
    direct: DirectListenerQueue,
}

impl BatchingListenerQueue {
    pub fn new(manager: Arc<BatchManager>) -> Self {
        let direct = DirectListenerQueue::new(manager.transport().clone());
        Self { manager, direct }
    }
}

impl ListenerQueue for BatchingListenerQueue {
    fn queue_listener(&self, call: ListenerCall) -> DispatchResult<()> {
        if self.manager.is_batching() {
            self.manager.add_listener_call(call);
            return Ok(());
        }
        trace!(listener = call.listener(), "not batching, queueing listener directly");
        self.direct.queue_listener(call)
    }
}
