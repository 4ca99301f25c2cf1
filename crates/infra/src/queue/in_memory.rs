//! In-memory queue connection for tests/dev.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::trace;

use queuebatch_core::{Queue, QueueError, QueuedTask, TaskId};

/// A task sitting on a queue, with its routing and scheduling metadata.
#[derive(Debug)]
pub struct PushedTask {
    pub id: TaskId,
    /// Target queue (`None` = the connection's default queue).
    pub queue: Option<String>,
    /// Delay requested at push time, if any.
    pub delay: Option<Duration>,
    /// When the task becomes visible to workers.
    pub available_at: DateTime<Utc>,
    /// How many times a worker has already attempted it.
    pub attempts: u32,
    pub task: QueuedTask,
}

impl PushedTask {
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.available_at <= now
    }
}

/// In-memory FIFO queue connection.
///
/// - No IO
/// - Delayed tasks stay invisible to [`InMemoryQueue::pop_ready`] until due
/// - Inspection helpers for assertions
#[derive(Debug)]
pub struct InMemoryQueue {
    connection: String,
    tasks: Mutex<VecDeque<PushedTask>>,
}

impl InMemoryQueue {
    pub fn new(connection: impl Into<String>) -> Self {
        Self {
            connection: connection.into(),
            tasks: Mutex::new(VecDeque::new()),
        }
    }

    pub fn connection(&self) -> &str {
        &self.connection
    }

    pub fn len(&self) -> usize {
        self.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of pushed tasks with the given job or listener name.
    pub fn count_named(&self, name: &str) -> usize {
        self.inspect(|tasks| tasks.iter().filter(|t| t.task.name() == name).count())
    }

    /// Run `f` over the current contents, in push order.
    pub fn inspect<R>(&self, f: impl FnOnce(&[PushedTask]) -> R) -> R {
        let mut tasks = match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(tasks.make_contiguous())
    }

    /// Remove and return everything, in push order.
    pub fn drain(&self) -> Vec<PushedTask> {
        self.lock().map(|mut t| t.drain(..).collect()).unwrap_or_default()
    }

    /// Remove the oldest task that is due at `now`.
    pub fn pop_ready(&self, now: DateTime<Utc>) -> Result<Option<PushedTask>, QueueError> {
        let mut tasks = self.lock()?;
        let Some(index) = tasks.iter().position(|t| t.is_ready(now)) else {
            return Ok(None);
        };
        Ok(tasks.remove(index))
    }

    /// Put a task back after a failed attempt, visible again after `delay`.
    pub fn release(&self, mut task: PushedTask, delay: Duration) -> Result<(), QueueError> {
        task.attempts += 1;
        task.available_at = available_at(Some(delay));
        self.lock()?.push_back(task);
        Ok(())
    }

    fn push(
        &self,
        queue: Option<&str>,
        delay: Option<Duration>,
        task: QueuedTask,
    ) -> Result<(), QueueError> {
        let pushed = PushedTask {
            id: TaskId::new(),
            queue: queue.map(str::to_string),
            delay,
            available_at: available_at(delay),
            attempts: 0,
            task,
        };
        trace!(
            connection = %self.connection,
            queue = ?pushed.queue,
            delay = ?pushed.delay,
            task = pushed.task.name(),
            "task pushed"
        );
        self.lock()?.push_back(pushed);
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, VecDeque<PushedTask>>, QueueError> {
        self.tasks.lock().map_err(|_| QueueError::Poisoned)
    }
}

impl Queue for InMemoryQueue {
    fn push_on(&self, queue: Option<&str>, task: QueuedTask) -> Result<(), QueueError> {
        self.push(queue, None, task)
    }

    fn later_on(
        &self,
        queue: Option<&str>,
        delay: Duration,
        task: QueuedTask,
    ) -> Result<(), QueueError> {
        self.push(queue, Some(delay), task)
    }
}

/// Delays past chrono's range park the task at the latest representable time.
fn available_at(delay: Option<Duration>) -> DateTime<Utc> {
    let now = Utc::now();
    let Some(delay) = delay else {
        return now;
    };
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
