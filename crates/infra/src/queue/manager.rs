use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use queuebatch_core::{Queue, QueueError, QueueFactory};

use super::in_memory::InMemoryQueue;

/// Named queue connections with a default.
pub struct QueueManager {
    default: String,
    connections: RwLock<HashMap<String, Arc<dyn Queue>>>,
}

impl QueueManager {
    /// Manager whose default connection is `default` (no connections registered yet).
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            default: default.into(),
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Manager with one in-memory connection, also the default. Returns the queue
    /// so callers (tests, workers) can inspect or drain it.
    pub fn in_memory(name: impl Into<String>) -> (Self, Arc<InMemoryQueue>) {
        let name = name.into();
        let queue = Arc::new(InMemoryQueue::new(name.clone()));
        let manager = Self::new(name.clone());
        manager.add_connection(name, queue.clone());
        (manager, queue)
    }

    pub fn default_connection(&self) -> &str {
        &self.default
    }

    pub fn add_connection(&self, name: impl Into<String>, queue: Arc<dyn Queue>) {
        let name = name.into();
        debug!(connection = %name, "queue connection registered");
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, queue);
    }
}

impl QueueFactory for QueueManager {
    fn connection(&self, name: Option<&str>) -> Result<Arc<dyn Queue>, QueueError> {
        let name = name.unwrap_or(self.default_connection());
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| QueueError::UnknownConnection(name.to_string()))
    }
}

impl core::fmt::Debug for QueueManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let connections = self.connections.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<_> = connections.keys().cloned().collect();
        names.sort_unstable();
        f.debug_struct("QueueManager")
            .field("default", &self.default)
            .field("connections", &names)
            .finish()
    }
}
