//! `queuebatch-events`: events, listener registry and event dispatch.
//!
//! Queued listener calls never reach a queue directly from here: they are handed
//! to a [`ListenerQueue`], so a host can decide whether to enqueue them right away
//! or hold them back for a batch.

pub mod dispatcher;
pub mod event;
pub mod registry;

pub use dispatcher::{EventDispatcher, ListenerQueue};
pub use event::Event;
pub use registry::ListenerRegistry;
