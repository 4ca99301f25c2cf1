//! Per-unit-of-work wiring.
//!
//! One [`BatchContext`] per request (or job, or command): a fresh
//! [`BatchManager`] plus the dispatcher and event dispatcher that feed it.
//! Nothing here is global; handing the context to call sites is what makes the
//! coordinator reachable from them.

use std::sync::Arc;

use tracing::trace;

use queuebatch_core::{DispatchError, DispatchOptions, Dispatcher};
use queuebatch_events::EventDispatcher;

use crate::batch::BatchManager;
use crate::bus::Transport;
use crate::config::BatchConfig;
use crate::interceptors::{BatchingDispatcher, BatchingListenerQueue, DirectListenerQueue};

#[derive(Clone)]
pub struct BatchContext {
    manager: Option<Arc<BatchManager>>,
    bus: Arc<dyn Dispatcher>,
    events: EventDispatcher,
}

impl BatchContext {
    /// Wire a context over `transport`. `events` provides the subscriptions;
    /// the returned context fires through a copy bound to this context.
    ///
    /// With batching disabled the context hands out the underlying dispatcher
    /// and a direct listener queue, and scopes are no-ops.
    pub fn new(config: &BatchConfig, transport: Transport, events: &EventDispatcher) -> Self {
        if !config.enabled {
            trace!("batching disabled, using direct dispatch");
            let direct = Arc::new(DirectListenerQueue::new(transport.clone()));
            return Self {
                manager: None,
                bus: transport.bus,
                events: events.with_queue(direct),
            };
        }

        let manager = BatchManager::arc(transport, config);
        let bus = Arc::new(BatchingDispatcher::over(manager.clone()));
        let listeners = Arc::new(BatchingListenerQueue::new(manager.clone()));

        Self {
            manager: Some(manager),
            bus,
            events: events.with_queue(listeners),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.manager.is_some()
    }

    /// The coordinator, when batching is enabled.
    pub fn manager(&self) -> Option<&Arc<BatchManager>> {
        self.manager.as_ref()
    }

    /// Dispatcher call sites should use for jobs.
    pub fn bus(&self) -> &Arc<dyn Dispatcher> {
        &self.bus
    }

    /// Event dispatcher call sites should fire through.
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Run `f` in a batching scope (plain call when batching is disabled).
    pub fn run<T, E, F>(&self, options: DispatchOptions, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<DispatchError>,
    {
        match &self.manager {
            Some(manager) => manager.run(options, f),
            None => f(),
        }
    }

    /// Run `f` with batching suspended.
    pub fn without_batching<T>(&self, f: impl FnOnce() -> T) -> T {
        match &self.manager {
            Some(manager) => manager.without_batching(f),
            None => f(),
        }
    }
}

impl core::fmt::Debug for BatchContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BatchContext")
            .field("manager", &self.manager)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}
