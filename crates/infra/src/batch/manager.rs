use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, trace, warn};

use queuebatch_core::{DispatchError, DispatchOptions, DispatchResult, Job, ListenerCall};

use crate::bus::Transport;
use crate::config::BatchConfig;

use super::buffer::{BufferedItem, ItemBuffer};
use super::flush::{FlushReport, into_chunks};
use super::process_batch::ProcessBatch;

#[derive(Debug, Default)]
struct ScopeState {
    nesting: usize,
    /// Options of the outermost scope, applied to wrapper tasks.
    options: Option<DispatchOptions>,
    buffer: ItemBuffer,
}

/// Batching coordinator for one unit of work.
///
/// While at least one scope is open (and batching is not suspended), the
/// interceptors hand queueable jobs and listener calls to [`BatchManager::add_job`]
/// and [`BatchManager::add_listener_call`] instead of the queue. When the
/// outermost scope commits, the buffer is flushed:
///
/// - nothing buffered → nothing dispatched
/// - one item → dispatched directly with its own options
/// - more → chunks of at most `max_batch_size` items, one [`ProcessBatch`] each
///
/// The state lock is never held while dispatching, so code running inside a
/// flush (inline jobs, listeners) can safely call back into the manager.
pub struct BatchManager {
    state: Mutex<ScopeState>,
    suspended: AtomicUsize,
    transport: Transport,
    max_batch_size: usize,
    synchronous: bool,
}

impl BatchManager {
    pub fn new(transport: Transport, config: &BatchConfig) -> Self {
        Self {
            state: Mutex::new(ScopeState::default()),
            suspended: AtomicUsize::new(0),
            transport,
            max_batch_size: config.effective_batch_size(),
            synchronous: config.synchronous_testing,
        }
    }

    pub fn arc(transport: Transport, config: &BatchConfig) -> Arc<Self> {
        Arc::new(Self::new(transport, config))
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Open a scope. Only the outermost scope's `options` are kept.
    pub fn begin(&self, options: DispatchOptions) {
        let mut state = self.lock();
        state.nesting += 1;
        if state.nesting == 1 {
            debug!(options = ?options, "batch scope opened");
            state.options = Some(options);
        } else {
            trace!(nesting = state.nesting, "nested batch scope opened");
        }
    }

    /// Close the innermost scope, flushing when it was the outermost one.
    ///
    /// Returns `Ok(None)` when nothing was flushed: a nested scope closed, or no
    /// scope was open at all (tolerated and ignored).
    pub fn commit(&self) -> DispatchResult<Option<FlushReport>> {
        let (buffer, options) = {
            let mut state = self.lock();
            if state.nesting == 0 {
                trace!("commit without an open batch scope ignored");
                return Ok(None);
            }

            state.nesting -= 1;
            if state.nesting > 0 {
                trace!(nesting = state.nesting, "nested batch scope committed");
                return Ok(None);
            }

            // Reset before dispatching: a failing flush still leaves the manager idle.
            (
                std::mem::take(&mut state.buffer),
                state.options.take().unwrap_or_default(),
            )
        };

        self.flush(buffer, options).map(Some)
    }

    /// True while a scope is open and batching is not suspended.
    pub fn is_batching(&self) -> bool {
        !self.is_suspended() && self.nesting_level() > 0
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst) > 0
    }

    pub fn nesting_level(&self) -> usize {
        self.lock().nesting
    }

    /// Number of items waiting for the outermost commit.
    pub fn buffered(&self) -> usize {
        self.lock().buffer.len()
    }

    /// Run `f` inside a scope. The scope is committed on every exit path,
    /// including a panic.
    ///
    /// An error from `f` is returned unchanged (a commit failure on top of it is
    /// only logged). If `f` succeeds, a commit failure is returned instead.
    pub fn run<T, E, F>(&self, options: DispatchOptions, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<DispatchError>,
    {
        self.begin(options);
        let mut guard = CommitOnUnwind {
            manager: self,
            armed: true,
        };
        let result = f();
        guard.armed = false;

        match (result, self.commit()) {
            (Ok(value), Ok(_)) => Ok(value),
            (Ok(_), Err(commit_error)) => Err(commit_error.into()),
            (Err(error), Ok(_)) => Err(error),
            (Err(error), Err(commit_error)) => {
                warn!(error = %commit_error, "batch flush failed after scope error");
                Err(error)
            }
        }
    }

    /// Run `f` with batching suspended, so dispatches inside it reach the
    /// transport directly. Calls nest; batching resumes when the outermost
    /// call returns or unwinds.
    pub fn without_batching<T>(&self, f: impl FnOnce() -> T) -> T {
        self.suspended.fetch_add(1, Ordering::SeqCst);
        let _resume = Resume(&self.suspended);
        f()
    }

    /// Buffer a job with a snapshot of its current options.
    pub fn add_job(&self, job: Box<dyn Job>) {
        trace!(job = job.name(), "job buffered");
        self.lock().buffer.add_job(job);
    }

    /// Buffer a queued listener call. Options are resolved at flush time.
    pub fn add_listener_call(&self, call: ListenerCall) {
        trace!(listener = call.listener(), "listener call buffered");
        self.lock().buffer.add_listener_call(call);
    }

    fn flush(
        &self,
        mut buffer: ItemBuffer,
        options: DispatchOptions,
    ) -> DispatchResult<FlushReport> {
        let (jobs, listeners) = (buffer.job_count(), buffer.listener_count());
        let mut items = buffer.drain();
        match items.len() {
            0 => Ok(FlushReport::Empty),
            1 => {
                let Some(item) = items.pop() else {
                    return Ok(FlushReport::Empty);
                };
                debug!(item = item.name(), jobs, listeners, "flushing single item directly");
                self.without_batching(|| match item {
                    BufferedItem::Job(buffered) => self.transport.dispatch_job(buffered),
                    BufferedItem::Listener(call) => self.transport.queue_listener_call(call),
                })?;
                Ok(FlushReport::Direct)
            }
            total => {
                let chunks = into_chunks(items, self.max_batch_size);
                let tasks = chunks.len();

                for chunk in chunks {
                    self.dispatch_wrapper(chunk, &options)?;
                }

                info!(
                    items = total,
                    jobs,
                    listeners,
                    tasks,
                    max_batch_size = self.max_batch_size,
                    synchronous = self.synchronous,
                    "batch flushed"
                );
                Ok(FlushReport::Wrapped { tasks, items: total })
            }
        }
    }

    fn dispatch_wrapper(
        &self,
        chunk: Vec<BufferedItem>,
        options: &DispatchOptions,
    ) -> DispatchResult<()> {
        let mut wrapper = ProcessBatch::new(chunk, self.transport.clone(), self.synchronous);
        debug!(batch_id = %wrapper.id(), items = wrapper.len(), "dispatching batch");

        if self.synchronous {
            return self.transport.bus.dispatch_sync(Box::new(wrapper));
        }

        wrapper.options_mut().apply(options);
        self.transport.bus.dispatch(Box::new(wrapper))
    }

    fn lock(&self) -> MutexGuard<'_, ScopeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl core::fmt::Debug for BatchManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.lock();
        f.debug_struct("BatchManager")
            .field("nesting", &state.nesting)
            .field("buffered", &state.buffer.len())
            .field("suspended", &self.suspended.load(Ordering::SeqCst))
            .field("max_batch_size", &self.max_batch_size)
            .field("synchronous", &self.synchronous)
            .finish()
    }
}

struct CommitOnUnwind<'a> {
    manager: &'a BatchManager,
    armed: bool,
}

impl Drop for CommitOnUnwind<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(error) = self.manager.commit() {
            warn!(error = %error, "batch flush failed while unwinding");
        }
    }
}

struct Resume<'a>(&'a AtomicUsize);

impl Drop for Resume<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
