//! Event dispatcher: fan an event out to its listeners.
//!
//! Inline listeners (closures and non-queued listener types) run immediately.
//! Queued listener types are turned into [`ListenerCall`]s and handed to a
//! [`ListenerQueue`], which is the seam a batching layer plugs into.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, trace};

use queuebatch_core::{
    Argument, DispatchError, DispatchResult, HANDLE_METHOD, ListenerCall, ListenerError,
    ListenerType,
};

use crate::event::Event;
use crate::registry::ListenerRegistry;

/// Receives queued listener calls produced while firing events.
pub trait ListenerQueue: Send + Sync {
    fn queue_listener(&self, call: ListenerCall) -> DispatchResult<()>;
}

impl<Q> ListenerQueue for Arc<Q>
where
    Q: ListenerQueue + ?Sized,
{
    fn queue_listener(&self, call: ListenerCall) -> DispatchResult<()> {
        (**self).queue_listener(call)
    }
}

type InlineHandler = Arc<dyn Fn(&Argument) -> Result<(), ListenerError> + Send + Sync>;

#[derive(Clone)]
enum Subscription {
    Inline(InlineHandler),
    Typed {
        listener: &'static str,
        method: String,
    },
}

type Subscriptions = HashMap<TypeId, Vec<Subscription>>;

/// Event dispatcher.
///
/// Subscriptions are shared between clones made with [`EventDispatcher::with_queue`],
/// so listeners are registered once while each unit of work can route queued
/// calls to its own [`ListenerQueue`].
#[derive(Clone)]
pub struct EventDispatcher {
    subscriptions: Arc<RwLock<Subscriptions>>,
    registry: Arc<ListenerRegistry>,
    queue: Arc<dyn ListenerQueue>,
}

impl EventDispatcher {
    pub fn new(registry: Arc<ListenerRegistry>, queue: Arc<dyn ListenerQueue>) -> Self {
        Self {
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            registry,
            queue,
        }
    }

    /// Same subscriptions, different destination for queued calls.
    pub fn with_queue(&self, queue: Arc<dyn ListenerQueue>) -> Self {
        Self {
            subscriptions: self.subscriptions.clone(),
            registry: self.registry.clone(),
            queue,
        }
    }

    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    /// Subscribe listener type `L` to events of type `E` (handler method `handle`).
    ///
    /// `L` must be registered in the [`ListenerRegistry`] before events fire.
    pub fn listen<E: Event, L: ListenerType>(&self) {
        self.listen_method::<E, L>(HANDLE_METHOD);
    }

    /// Subscribe listener type `L` to `E`, invoking `method` on it.
    pub fn listen_method<E: Event, L: ListenerType>(&self, method: impl Into<String>) {
        self.subscribe::<E>(Subscription::Typed {
            listener: L::NAME,
            method: method.into(),
        });
    }

    /// Subscribe a closure to `E`. Closures always run inline.
    pub fn listen_fn<E, F>(&self, handler: F)
    where
        E: Event,
        F: Fn(&E) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        let handler: InlineHandler = Arc::new(move |argument: &Argument| {
            match argument.downcast_ref::<E>() {
                Some(event) => handler(event),
                None => Ok(()),
            }
        });
        self.subscribe::<E>(Subscription::Inline(handler));
    }

    pub fn has_listeners<E: Event>(&self) -> bool {
        let subscriptions = self.subscriptions.read().unwrap_or_else(PoisonError::into_inner);
        subscriptions.get(&TypeId::of::<E>()).is_some_and(|s| !s.is_empty())
    }

    /// Fire `event` to every subscribed listener, in subscription order.
    ///
    /// Stops at the first listener error.
    pub fn fire<E: Event>(&self, event: E) -> DispatchResult<()> {
        let subscriptions = {
            let all = self.subscriptions.read().unwrap_or_else(PoisonError::into_inner);
            all.get(&TypeId::of::<E>()).cloned().unwrap_or_default()
        };

        let event_type = event.event_type();
        trace!(event = event_type, listeners = subscriptions.len(), "firing event");

        let argument: Argument = Arc::new(event);
        for subscription in subscriptions {
            match subscription {
                Subscription::Inline(handler) => handler(&argument)?,
                Subscription::Typed { listener, method } => {
                    self.deliver(event_type, listener, method, &argument)?
                }
            }
        }

        Ok(())
    }

    fn deliver(
        &self,
        event_type: &'static str,
        listener: &'static str,
        method: String,
        argument: &Argument,
    ) -> DispatchResult<()> {
        let descriptor = self
            .registry
            .descriptor(listener)
            .ok_or_else(|| DispatchError::UnknownListener(listener.to_string()))?;
        let instance = self
            .registry
            .make(listener)
            .ok_or_else(|| DispatchError::UnknownListener(listener.to_string()))?;

        // Each call owns its argument list.
        let arguments = vec![argument.clone()];

        if !descriptor.queued() {
            instance.call(&method, &arguments)?;
            return Ok(());
        }

        if !instance.should_queue(&arguments) {
            debug!(event = event_type, listener, "listener declined to queue");
            return Ok(());
        }

        self.queue
            .queue_listener(ListenerCall::new(listener, method, arguments))
    }

    fn subscribe<E: Event>(&self, subscription: Subscription) {
        let mut subscriptions = self.subscriptions.write().unwrap_or_else(PoisonError::into_inner);
        subscriptions
            .entry(TypeId::of::<E>())
            .or_default()
            .push(subscription);
    }
}

impl core::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let subscriptions = self.subscriptions.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("EventDispatcher")
            .field("event_types", &subscriptions.len())
            .field("registry", &self.registry)
            .finish()
    }
}
