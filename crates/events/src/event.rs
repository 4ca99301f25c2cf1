/// An event that listeners can subscribe to.
///
/// Events are **immutable** facts: once fired they are shared read-only with every
/// listener, inline or queued.
pub trait Event: core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "orders.placed").
    fn event_type(&self) -> &'static str;
}
