//! Queue worker: executes tasks pushed onto an [`InMemoryQueue`].
//!
//! Jobs run through their own handler; queued listener calls are resolved
//! through the listener registry. A failed job is released back to the queue
//! while it has attempts left (`Job::max_tries`, one attempt by default).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use queuebatch_core::{DispatchError, DispatchResult, QueueError, QueuedTask};

use crate::bus::Transport;
use crate::queue::{InMemoryQueue, PushedTask};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Name for logging
    pub name: String,
    /// How long a released job stays invisible before the next attempt
    pub retry_after: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "queue-worker".to_string(),
            retry_after: Duration::ZERO,
        }
    }
}

impl WorkerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = retry_after;
        self
    }
}

/// Worker run statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub tasks_processed: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub tasks_released: u64,
}

/// Result of executing one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    /// Failed, put back on the queue for another attempt.
    Released(DispatchError),
    /// Failed with no attempts left.
    Failed(DispatchError),
}

pub struct QueueWorker {
    queue: Arc<InMemoryQueue>,
    transport: Transport,
    config: WorkerConfig,
    stats: WorkerStats,
}

impl QueueWorker {
    pub fn new(queue: Arc<InMemoryQueue>, transport: Transport) -> Self {
        Self::with_config(queue, transport, WorkerConfig::default())
    }

    pub fn with_config(
        queue: Arc<InMemoryQueue>,
        transport: Transport,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            transport,
            config,
            stats: WorkerStats::default(),
        }
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Execute the oldest ready task, if any.
    pub fn run_next(&mut self) -> Result<Option<TaskOutcome>, QueueError> {
        let Some(mut pushed) = self.queue.pop_ready(Utc::now())? else {
            return Ok(None);
        };

        debug!(
            worker = %self.config.name,
            connection = self.queue.connection(),
            task_id = %pushed.id,
            task = pushed.task.name(),
            attempt = pushed.attempts + 1,
            "executing task"
        );

        let outcome = match self.execute(&mut pushed) {
            Ok(()) => TaskOutcome::Succeeded,
            Err(error) if pushed.attempts + 1 < max_tries(&pushed) => {
                debug!(
                    worker = %self.config.name,
                    task_id = %pushed.id,
                    error = %error,
                    "task released"
                );
                self.queue.release(pushed, self.config.retry_after)?;
                TaskOutcome::Released(error)
            }
            Err(error) => {
                warn!(
                    worker = %self.config.name,
                    task_id = %pushed.id,
                    task = pushed.task.name(),
                    error = %error,
                    "task failed"
                );
                TaskOutcome::Failed(error)
            }
        };

        self.record(&outcome);
        Ok(Some(outcome))
    }

    /// Execute ready tasks until none are left, including tasks pushed while
    /// working (wrapper tasks enqueue their contents).
    pub fn work_until_empty(&mut self) -> Result<&WorkerStats, QueueError> {
        while self.run_next()?.is_some() {}
        info!(
            worker = %self.config.name,
            connection = self.queue.connection(),
            stats = ?self.stats,
            "queue drained"
        );
        Ok(&self.stats)
    }

    fn execute(&self, pushed: &mut PushedTask) -> DispatchResult<()> {
        match &mut pushed.task {
            QueuedTask::Job(job) => match job.handle() {
                Some(result) => result,
                None => Err(DispatchError::NotInlineable(job.name())),
            },
            QueuedTask::Listener(call) => self.transport.call_listener(call),
        }
    }

    fn record(&mut self, outcome: &TaskOutcome) {
        self.stats.tasks_processed += 1;
        match outcome {
            TaskOutcome::Succeeded => self.stats.tasks_succeeded += 1,
            TaskOutcome::Released(_) => self.stats.tasks_released += 1,
            TaskOutcome::Failed(_) => self.stats.tasks_failed += 1,
        }
    }
}

impl core::fmt::Debug for QueueWorker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QueueWorker")
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

fn max_tries(pushed: &PushedTask) -> u32 {
    match &pushed.task {
        QueuedTask::Job(job) => job.max_tries().unwrap_or(1).max(1),
        QueuedTask::Listener(_) => 1,
    }
}
