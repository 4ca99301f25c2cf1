//! Error model shared by the dispatch, queue and listener layers.

use thiserror::Error;

/// Result type used across the dispatch path.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Failure raised by a job's own handler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    /// The job ran and reported a failure.
    #[error("job failed: {0}")]
    Failed(String),
}

impl JobError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Failure raised while invoking a listener instance.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ListenerError {
    /// The listener does not expose the requested handler method.
    #[error("listener {listener} has no method `{method}`")]
    UnknownMethod {
        listener: &'static str,
        method: String,
    },

    /// The handler ran and reported a failure.
    #[error("listener failed: {0}")]
    Failed(String),
}

impl ListenerError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Failure raised by a queue connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// No connection is configured under this name.
    #[error("unknown queue connection: {0}")]
    UnknownConnection(String),

    /// The connection refused the push (broker down, backpressure).
    #[error("queue connection unavailable: {0}")]
    Unavailable(String),

    /// Internal lock poisoning.
    #[error("queue storage poisoned")]
    Poisoned,
}

/// Failure while handing work to the dispatch/queue subsystem.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    /// `dispatch_sync` was asked to run a job that has no inline handler.
    #[error("job {0} cannot run inline")]
    NotInlineable(&'static str),

    /// A queued listener call names a listener type nobody registered.
    #[error("listener not registered: {0}")]
    UnknownListener(String),
}
