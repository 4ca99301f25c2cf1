//! Dispatchable units of work.

use std::any::Any;

use crate::error::DispatchResult;
use crate::options::DispatchOptions;

/// Upcast helper so `dyn Job` values can be inspected by concrete type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A unit of work that can be dispatched to a queue.
///
/// A job owns its [`DispatchOptions`]; dispatchers read them to pick a
/// connection, queue and delay. Jobs are moved into the dispatcher, so a buffered
/// job is owned by the buffer until it is flushed.
pub trait Job: AsAny + Send + core::fmt::Debug {
    /// Stable name used for logging and routing.
    fn name(&self) -> &'static str;

    fn options(&self) -> &DispatchOptions;

    fn options_mut(&mut self) -> &mut DispatchOptions;

    /// Whether the job goes through a queue at all. Jobs returning `false` always
    /// run inline and are never buffered.
    fn should_queue(&self) -> bool {
        true
    }

    /// Attempt budget when a worker executes the job. `None` means one attempt.
    fn max_tries(&self) -> Option<u32> {
        None
    }

    /// Inline entry point. `None` means the job has no handler of its own and can
    /// only be executed by whatever consumes the queue.
    fn handle(&mut self) -> Option<DispatchResult<()>> {
        None
    }
}

impl dyn Job {
    pub fn is<T: Job>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Job>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// A job held back by the batch buffer, with the options it declared when it
/// was buffered.
#[derive(Debug)]
pub struct BufferedJob {
    job: Box<dyn Job>,
    options: DispatchOptions,
}

impl BufferedJob {
    /// Snapshot the job's current options.
    pub fn capture(job: Box<dyn Job>) -> Self {
        let options = job.options().clone();
        Self { job, options }
    }

    pub fn job(&self) -> &(dyn Job + 'static) {
        self.job.as_ref()
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// Re-apply the snapshot and hand the job back for dispatch.
    pub fn into_job(self) -> Box<dyn Job> {
        let mut job = self.job;
        job.options_mut().apply(&self.options);
        job
    }
}
