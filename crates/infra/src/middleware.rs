//! Request hooks: one top-level batching scope per request.
//!
//! The host calls [`BatchRequests::begin`] when a request starts and
//! [`RequestScope::terminate`] once the response has been sent. A scope that is
//! dropped without being terminated (early return, panic) still commits.

use std::sync::Arc;

use tracing::{debug, error};

use queuebatch_core::{DispatchOptions, DispatchResult};

use crate::batch::{BatchManager, FlushReport};
use crate::config::BatchConfig;
use crate::context::BatchContext;

#[derive(Debug, Clone)]
pub struct BatchRequests {
    active: bool,
    options: DispatchOptions,
}

impl BatchRequests {
    /// Active only when batching and the request hooks are both enabled.
    pub fn new(config: &BatchConfig) -> Self {
        Self {
            active: config.enabled && config.enable_middleware,
            options: DispatchOptions::default(),
        }
    }

    /// Options applied to the wrapper tasks of every request scope.
    pub fn with_options(mut self, options: DispatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Open the request's scope.
    pub fn begin(&self, context: &BatchContext) -> RequestScope {
        let manager = match (self.active, context.manager()) {
            (true, Some(manager)) => {
                manager.begin(self.options.clone());
                Some(manager.clone())
            }
            _ => None,
        };
        RequestScope { manager }
    }

    /// Open a scope and run the request handler. The caller terminates the
    /// returned scope after the response is out.
    pub fn handle<R>(&self, context: &BatchContext, next: impl FnOnce() -> R) -> (R, RequestScope) {
        let scope = self.begin(context);
        let response = next();
        (response, scope)
    }
}

/// An open request scope. Commits exactly once.
#[must_use = "dropping the scope commits it immediately"]
#[derive(Debug)]
pub struct RequestScope {
    manager: Option<Arc<BatchManager>>,
}

impl RequestScope {
    pub fn is_open(&self) -> bool {
        self.manager.is_some()
    }

    /// Close the scope, flushing everything buffered during the request.
    pub fn terminate(mut self) -> DispatchResult<Option<FlushReport>> {
        match self.manager.take() {
            Some(manager) => manager.commit(),
            None => Ok(None),
        }
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        let Some(manager) = self.manager.take() else {
            return;
        };
        debug!("request scope dropped without terminate, committing");
        if let Err(err) = manager.commit() {
            error!(error = %err, "request batch flush failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queuebatch_core::{Dispatcher, Job};
    use queuebatch_events::{EventDispatcher, ListenerRegistry};

    use crate::bus::Transport;
    use crate::interceptors::DirectListenerQueue;
    use crate::queue::{InMemoryQueue, QueueManager};

    #[derive(Debug, Default)]
    struct Welcome {
        options: DispatchOptions,
    }

    impl Job for Welcome {
        fn name(&self) -> &'static str {
            "welcome"
        }

        fn options(&self) -> &DispatchOptions {
            &self.options
        }

        fn options_mut(&mut self) -> &mut DispatchOptions {
            &mut self.options
        }
    }

    fn context(config: &BatchConfig) -> (BatchContext, Arc<InMemoryQueue>) {
        let (queues, queue) = QueueManager::in_memory("memory");
        let registry = ListenerRegistry::arc();
        let transport = Transport::over_queues(Arc::new(queues), registry.clone());
        let events = EventDispatcher::new(
            registry,
            Arc::new(DirectListenerQueue::new(transport.clone())),
        );
        (BatchContext::new(config, transport, &events), queue)
    }

    #[test]
    fn request_work_is_flushed_on_terminate() {
        let config = BatchConfig::default();
        let (ctx, queue) = context(&config);
        let hooks =
            BatchRequests::new(&config).with_options(DispatchOptions::new().on_queue("requests"));

        let (status, scope) = hooks.handle(&ctx, || {
            ctx.bus().dispatch(Box::new(Welcome::default())).unwrap();
            ctx.bus().dispatch(Box::new(Welcome::default())).unwrap();
            200
        });
        assert_eq!(status, 200);
        assert!(queue.is_empty());

        let report = scope.terminate().unwrap();
        assert_eq!(report, Some(FlushReport::Wrapped { tasks: 1, items: 2 }));
        queue.inspect(|tasks| assert_eq!(tasks[0].queue.as_deref(), Some("requests")));
    }

    #[test]
    fn dropped_scope_still_commits() {
        let config = BatchConfig::default();
        let (ctx, queue) = context(&config);
        let hooks = BatchRequests::new(&config);

        {
            let _scope = hooks.begin(&ctx);
            ctx.bus().dispatch(Box::new(Welcome::default())).unwrap();
            assert!(queue.is_empty());
        }

        assert_eq!(queue.len(), 1);
        assert_eq!(ctx.manager().unwrap().nesting_level(), 0);
    }

    #[test]
    fn disabled_hooks_open_no_scope() {
        let config = BatchConfig::default();
        let (ctx, queue) = context(&config);
        let hooks = BatchRequests::new(&BatchConfig {
            enable_middleware: false,
            ..config
        });

        let scope = hooks.begin(&ctx);
        assert!(!scope.is_open());
        ctx.bus().dispatch(Box::new(Welcome::default())).unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(scope.terminate().unwrap(), None);
    }
}
