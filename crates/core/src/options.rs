//! Dispatch options: where and when a unit of work should reach the queue.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Name of the connection that executes work inline instead of enqueueing it.
pub const SYNC_CONNECTION: &str = "sync";

/// Target connection, queue name and delay for a dispatch.
///
/// Each field is independently optional; `None` means "use the transport default".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOptions {
    pub connection: Option<String>,
    pub queue: Option<String>,
    pub delay: Option<Duration>,
}

impl DispatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }

    pub fn on_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.connection.is_none() && self.queue.is_none() && self.delay.is_none()
    }

    /// Overwrite the fields that are set in `other`, leaving the rest untouched.
    ///
    /// `Some(Duration::ZERO)` counts as set: the zero delay is copied and the job
    /// goes through `later_on` rather than `push_on`.
    pub fn apply(&mut self, other: &DispatchOptions) {
        if let Some(connection) = &other.connection {
            self.connection = Some(connection.clone());
        }
        if let Some(queue) = &other.queue {
            self.queue = Some(queue.clone());
        }
        if let Some(delay) = other.delay {
            self.delay = Some(delay);
        }
    }

    /// True when the connection routes work inline.
    pub fn is_sync(&self) -> bool {
        self.connection.as_deref() == Some(SYNC_CONNECTION)
    }
}
