//! Ordered buffer of deferred jobs and listener calls.

use queuebatch_core::{BufferedJob, Job, ListenerCall};

/// One deferred item, in the order it was intercepted.
#[derive(Debug)]
pub enum BufferedItem {
    Job(BufferedJob),
    Listener(ListenerCall),
}

impl BufferedItem {
    pub fn name(&self) -> &str {
        match self {
            BufferedItem::Job(buffered) => buffered.job().name(),
            BufferedItem::Listener(call) => call.listener(),
        }
    }

    pub fn is_job(&self) -> bool {
        matches!(self, BufferedItem::Job(_))
    }
}

/// Append-only while a scope is open; emptied by [`ItemBuffer::drain`].
#[derive(Debug, Default)]
pub struct ItemBuffer {
    items: Vec<BufferedItem>,
}

impl ItemBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a job together with a snapshot of the options it declares now.
    pub fn add_job(&mut self, job: Box<dyn Job>) {
        self.items.push(BufferedItem::Job(BufferedJob::capture(job)));
    }

    /// Buffer a listener call as is. Its options are resolved later, at flush
    /// or replay time.
    pub fn add_listener_call(&mut self, call: ListenerCall) {
        self.items.push(BufferedItem::Listener(call));
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn job_count(&self) -> usize {
        self.items.iter().filter(|item| item.is_job()).count()
    }

    pub fn listener_count(&self) -> usize {
        self.len() - self.job_count()
    }

    /// Take everything out, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<BufferedItem> {
        std::mem::take(&mut self.items)
    }
}
