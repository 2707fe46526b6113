//! Restores generation order for results that complete out of order.

use std::collections::BTreeMap;

/// Holds results keyed by sequence number and releases them strictly in
/// sequence, starting at 0.
///
/// Nothing here limits its size. The parallel stream keeps it bounded by
/// capping how far sampling may run ahead of the next sequence to release.
#[derive(Debug)]
pub(crate) struct ReorderBuffer<T> {
    next_seq: usize,
    pending: BTreeMap<usize, T>,
}

impl<T> ReorderBuffer<T> {
    pub(crate) fn new() -> Self {
        Self {
            next_seq: 0,
            pending: BTreeMap::new(),
        }
    }

    /// Stores `item` for sequence `seq`. Sequence numbers already released
    /// are ignored.
    pub(crate) fn insert(&mut self, seq: usize, item: T) {
        if seq >= self.next_seq {
            self.pending.insert(seq, item);
        }
    }

    /// Returns the next item in sequence if it has arrived.
    pub(crate) fn pop_next(&mut self) -> Option<T> {
        let item = self.pending.remove(&self.next_seq)?;
        self.next_seq += 1;
        Some(item)
    }

    /// Count of items released so far.
    pub(crate) fn released(&self) -> usize {
        self.next_seq
    }

    /// Items waiting for an earlier sequence number.
    pub(crate) fn waiting(&self) -> usize {
        self.pending.len()
    }
}
