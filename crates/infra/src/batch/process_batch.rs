//! The wrapper task that carries one chunk of buffered items.

use tracing::{debug, warn};

use queuebatch_core::{BatchId, DispatchOptions, DispatchResult, Job, ListenerCall};

use crate::bus::Transport;

use super::buffer::BufferedItem;

/// Wrapper job replaying a chunk of buffered jobs and listener calls.
///
/// In normal mode each job is re-dispatched with its buffered options and each
/// listener call is pushed to its resolved queue. In synchronous mode everything
/// runs inline, in buffer order. The wrapper itself gets exactly one attempt;
/// retrying individual items is up to those items once re-dispatched.
pub struct ProcessBatch {
    id: BatchId,
    items: Vec<BufferedItem>,
    options: DispatchOptions,
    transport: Transport,
    synchronous: bool,
}

impl ProcessBatch {
    pub const NAME: &'static str = "process_batch";

    pub fn new(items: Vec<BufferedItem>, transport: Transport, synchronous: bool) -> Self {
        Self {
            id: BatchId::new(),
            items,
            options: DispatchOptions::default(),
            transport,
            synchronous,
        }
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[BufferedItem] {
        &self.items
    }

    pub fn jobs(&self) -> impl Iterator<Item = &(dyn Job + 'static)> {
        self.items.iter().filter_map(|item| match item {
            BufferedItem::Job(buffered) => Some(buffered.job()),
            BufferedItem::Listener(_) => None,
        })
    }

    pub fn listener_calls(&self) -> impl Iterator<Item = &ListenerCall> {
        self.items.iter().filter_map(|item| match item {
            BufferedItem::Listener(call) => Some(call),
            BufferedItem::Job(_) => None,
        })
    }

    /// Replay every item. Stops at the first failure; items already replayed
    /// stay dispatched.
    fn replay(&mut self) -> DispatchResult<()> {
        let items = std::mem::take(&mut self.items);
        let total = items.len();
        debug!(
            batch_id = %self.id,
            items = total,
            synchronous = self.synchronous,
            "processing batch"
        );

        for (position, item) in items.into_iter().enumerate() {
            let name = item.name().to_string();
            let result = match (item, self.synchronous) {
                (BufferedItem::Job(buffered), true) => self.transport.run_job(buffered),
                (BufferedItem::Job(buffered), false) => self.transport.dispatch_job(buffered),
                (BufferedItem::Listener(call), true) => self.transport.call_listener(&call),
                (BufferedItem::Listener(call), false) => self.transport.queue_listener_call(call),
            };

            if let Err(error) = result {
                warn!(
                    batch_id = %self.id,
                    item = %name,
                    position,
                    remaining = total - position - 1,
                    error = %error,
                    "batch item failed"
                );
                return Err(error);
            }
        }

        Ok(())
    }
}

impl Job for ProcessBatch {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn options(&self) -> &DispatchOptions {
        &self.options
    }

    fn options_mut(&mut self) -> &mut DispatchOptions {
        &mut self.options
    }

    fn max_tries(&self) -> Option<u32> {
        Some(1)
    }

    fn handle(&mut self) -> Option<DispatchResult<()>> {
        Some(self.replay())
    }
}

impl core::fmt::Debug for ProcessBatch {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProcessBatch")
            .field("id", &self.id)
            .field("items", &self.items)
            .field("options", &self.options)
            .field("synchronous", &self.synchronous)
            .finish()
    }
}
