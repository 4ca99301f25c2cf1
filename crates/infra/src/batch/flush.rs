//! Flush planning: how a drained buffer is split into wrapper tasks.

use std::ops::Range;

use super::buffer::BufferedItem;

/// What a flush did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReport {
    /// Nothing was buffered.
    Empty,
    /// A single item was dispatched as is, without a wrapper.
    Direct,
    /// `items` buffered items went out in `tasks` wrapper tasks.
    Wrapped { tasks: usize, items: usize },
}

impl FlushReport {
    pub fn wrapper_tasks(&self) -> usize {
        match self {
            FlushReport::Wrapped { tasks, .. } => *tasks,
            _ => 0,
        }
    }
}

/// Consecutive index ranges covering `0..len`, each at most `max_batch_size`
/// long. A size of 0 is treated as 1.
pub fn plan_chunks(len: usize, max_batch_size: usize) -> Vec<Range<usize>> {
    let size = max_batch_size.max(1);
    (0..len)
        .step_by(size)
        .map(|start| start..(start + size).min(len))
        .collect()
}

/// Split `items` into owned chunks following [`plan_chunks`].
pub(crate) fn into_chunks(
    items: Vec<BufferedItem>,
    max_batch_size: usize,
) -> Vec<Vec<BufferedItem>> {
    let plan = plan_chunks(items.len(), max_batch_size);
    let mut items = items.into_iter();
    plan.into_iter()
        .map(|range| items.by_ref().take(range.len()).collect())
        .collect()
}
