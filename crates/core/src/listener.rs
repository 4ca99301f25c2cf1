//! Event listeners and queue-option resolution for queued listener calls.
//!
//! A listener type is described at two levels:
//!
//! - [`ListenerType`]: associated constants and functions only. Probing them needs
//!   no instance, so resolving where a queued call should go never runs listener
//!   construction.
//! - [`Listener`]: the constructed instance that actually handles an event.
//!
//! [`TypeDescriptor`] turns a `ListenerType` into an object-safe
//! [`ListenerDescriptor`] so registries can store descriptors of many types.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ListenerError;
use crate::options::DispatchOptions;

/// Handler method invoked when a registration does not name one.
pub const HANDLE_METHOD: &str = "handle";

/// One positional argument of a listener call (usually the event itself).
///
/// Arguments are immutable shared handles: every call gets its own vector, and
/// nothing reachable from an argument can be mutated by another call.
pub type Argument = Arc<dyn Any + Send + Sync>;

/// Borrow the first argument as a concrete event type.
pub fn first_argument<E: Any>(arguments: &[Argument]) -> Option<&E> {
    arguments.first()?.downcast_ref::<E>()
}

/// Outcome of probing an optional listener capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability<T> {
    /// The listener does not implement this capability.
    Absent,
    /// The listener implements it; the value may still be empty.
    Resolved(Option<T>),
}

impl<T> Capability<T> {
    /// Use the resolved value, or fall back when the capability is absent.
    pub fn or_else(self, fallback: impl FnOnce() -> Option<T>) -> Option<T> {
        match self {
            Capability::Absent => fallback(),
            Capability::Resolved(value) => value,
        }
    }
}

/// Type-level description of a listener.
///
/// The `CONNECTION`/`QUEUE`/`DELAY` constants are the static defaults. The
/// `via_connection`/`via_queue`/`with_delay` functions are optional capabilities:
/// when a listener overrides one, its answer wins over the constant, even when the
/// answer is `None`. The argument is the first call argument when there is one,
/// and `None` for the argument-less form.
pub trait ListenerType: Listener + 'static {
    const NAME: &'static str;

    /// Whether calls to this listener go through a queue at all.
    const QUEUED: bool = true;

    const CONNECTION: Option<&'static str> = None;
    const QUEUE: Option<&'static str> = None;
    const DELAY: Option<Duration> = None;

    fn via_connection(_event: Option<&Argument>) -> Capability<String> {
        Capability::Absent
    }

    fn via_queue(_event: Option<&Argument>) -> Capability<String> {
        Capability::Absent
    }

    fn with_delay(_event: Option<&Argument>) -> Capability<Duration> {
        Capability::Absent
    }
}

/// Object-safe view of a listener type's queue metadata.
pub trait ListenerDescriptor: Send + Sync {
    fn name(&self) -> &'static str;

    fn queued(&self) -> bool;

    fn resolve_connection(&self, event: Option<&Argument>) -> Option<String>;

    fn resolve_queue(&self, event: Option<&Argument>) -> Option<String>;

    fn resolve_delay(&self, event: Option<&Argument>) -> Option<Duration>;
}

/// [`ListenerDescriptor`] backed by a [`ListenerType`]'s associated items.
pub struct TypeDescriptor<L>(PhantomData<fn() -> L>);

impl<L> TypeDescriptor<L> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<L> Default for TypeDescriptor<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ListenerType> ListenerDescriptor for TypeDescriptor<L> {
    fn name(&self) -> &'static str {
        L::NAME
    }

    fn queued(&self) -> bool {
        L::QUEUED
    }

    fn resolve_connection(&self, event: Option<&Argument>) -> Option<String> {
        L::via_connection(event).or_else(|| L::CONNECTION.map(str::to_string))
    }

    fn resolve_queue(&self, event: Option<&Argument>) -> Option<String> {
        L::via_queue(event).or_else(|| L::QUEUE.map(str::to_string))
    }

    fn resolve_delay(&self, event: Option<&Argument>) -> Option<Duration> {
        L::with_delay(event).or_else(|| L::DELAY)
    }
}

/// Resolve connection, queue and delay for a queued call of `descriptor`.
///
/// Never fails: absent capabilities and empty answers both resolve to `None`.
pub fn resolve_options(
    descriptor: &dyn ListenerDescriptor,
    arguments: &[Argument],
) -> DispatchOptions {
    let event = arguments.first();
    DispatchOptions {
        connection: descriptor.resolve_connection(event),
        queue: descriptor.resolve_queue(event),
        delay: descriptor.resolve_delay(event),
    }
}

/// A constructed listener.
pub trait Listener: Send + Sync {
    /// Invoke handler `method` with the call's arguments.
    fn call(&self, method: &str, arguments: &[Argument]) -> Result<(), ListenerError>;

    /// Last-moment veto for queueing a call. Returning `false` drops the call.
    fn should_queue(&self, _arguments: &[Argument]) -> bool {
        true
    }
}

/// A deferred listener invocation: which listener, which method, which arguments.
#[derive(Clone)]
pub struct ListenerCall {
    listener: String,
    method: String,
    arguments: Vec<Argument>,
}

impl ListenerCall {
    pub fn new(
        listener: impl Into<String>,
        method: impl Into<String>,
        arguments: Vec<Argument>,
    ) -> Self {
        Self {
            listener: listener.into(),
            method: method.into(),
            arguments,
        }
    }

    pub fn listener(&self) -> &str {
        &self.listener
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }
}

impl core::fmt::Debug for ListenerCall {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ListenerCall")
            .field("listener", &self.listener)
            .field("method", &self.method)
            .field("arguments", &self.arguments.len())
            .finish()
    }
}
