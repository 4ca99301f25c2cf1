//! Listener registry: listener type name → metadata descriptor + factory.
//!
//! Queued listener calls only carry the listener's type name. Whoever executes or
//! routes them looks the type up here, either to read its queue metadata (no
//! construction) or to build an instance and invoke it.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use queuebatch_core::{
    DispatchError, DispatchResult, Listener, ListenerCall, ListenerDescriptor, ListenerType,
    TypeDescriptor,
};

type ListenerFactory = Arc<dyn Fn() -> Arc<dyn Listener> + Send + Sync>;

#[derive(Clone)]
struct Entry {
    descriptor: Arc<dyn ListenerDescriptor>,
    factory: ListenerFactory,
}

/// Known listener types.
#[derive(Default)]
pub struct ListenerRegistry {
    entries: RwLock<HashMap<&'static str, Entry>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register listener type `L`, built by `factory` whenever an instance is
    /// needed. Registering the same type again replaces the factory.
    pub fn register<L, F>(&self, factory: F)
    where
        L: ListenerType,
        F: Fn() -> L + Send + Sync + 'static,
    {
        let entry = Entry {
            descriptor: Arc::new(TypeDescriptor::<L>::new()),
            factory: Arc::new(move || Arc::new(factory()) as Arc<dyn Listener>),
        };

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.insert(L::NAME, entry).is_some() {
            debug!(listener = L::NAME, "listener factory replaced");
        }
    }

    /// Metadata-only view of a listener type. Never constructs the listener.
    pub fn descriptor(&self, name: &str) -> Option<Arc<dyn ListenerDescriptor>> {
        self.read_entry(name).map(|e| e.descriptor)
    }

    /// Build a fresh listener instance.
    pub fn make(&self, name: &str) -> Option<Arc<dyn Listener>> {
        self.read_entry(name).map(|e| (e.factory)())
    }

    /// Build the call's listener and invoke its method with the original arguments.
    pub fn invoke(&self, call: &ListenerCall) -> DispatchResult<()> {
        let listener = self
            .make(call.listener())
            .ok_or_else(|| DispatchError::UnknownListener(call.listener().to_string()))?;
        listener.call(call.method(), call.arguments())?;
        Ok(())
    }

    fn read_entry(&self, name: &str) -> Option<Entry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(name).cloned()
    }
}

impl core::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<_> = entries.keys().copied().collect();
        names.sort_unstable();
        f.debug_struct("ListenerRegistry").field("listeners", &names).finish()
    }
}
