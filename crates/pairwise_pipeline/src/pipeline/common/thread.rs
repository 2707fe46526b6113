//! Thread-local identity of loader workers.
//!
//! Each worker records its index when spawned so log lines can say which
//! worker handled an item.

use std::cell::Cell;

thread_local! {
    /// Index of the current loader worker (0 to num_workers-1).
    /// Stays `None` on threads that are not loader workers.
    pub static WORKER_ID: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Marks the current thread as loader worker `worker_id`.
pub(crate) fn set_worker_id(worker_id: usize) {
    WORKER_ID.with(|id| id.set(Some(worker_id)));
}

/// Index of the current loader worker, if the caller runs on one.
pub fn current_worker_id() -> Option<usize> {
    WORKER_ID.with(|id| id.get())
}
