//! Batch Scheduler
//!
//! A batch is a reentrant transaction that defers notification delivery.
//! Nested batches collapse into the outermost one. While the depth is above
//! zero, a signal that changes records the value it held when it first
//! changed and registers itself here once; when the outermost batch exits,
//! every registered signal delivers a single notification carrying
//! `(final, original)`.
//!
//! Signals flush in the order they first changed. Within a signal,
//! subscribers are notified in subscription order. A subscriber that writes
//! a signal still waiting in the same flush updates that signal's pending
//! notification instead of triggering a second one.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;

use super::signal::SignalId;

/// A signal with a change held back by an open batch.
pub(crate) trait PendingNotify {
    /// Deliver the held-back notification, if the value still differs from
    /// the one recorded at the start of the batch.
    fn flush_pending(&self);
}

pub(crate) struct BatchQueue {
    depth: Cell<usize>,
    pending: RefCell<IndexMap<SignalId, Rc<dyn PendingNotify>>>,
}

impl BatchQueue {
    pub fn new() -> Self {
        Self {
            depth: Cell::new(0),
            pending: RefCell::new(IndexMap::new()),
        }
    }

    pub fn is_active(&self) -> bool {
        self.depth.get() > 0
    }

    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn enter(&self) {
        self.depth.set(self.depth.get() + 1);
    }

    /// Leave one level. Returns `true` when the outermost batch closed.
    pub fn exit(&self) -> bool {
        let depth = self.depth.get();
        debug_assert!(depth > 0, "batch exit without matching enter");
        let depth = depth.saturating_sub(1);
        self.depth.set(depth);
        depth == 0
    }

    /// Register a changed signal. Later writes to the same signal within the
    /// batch keep the first registration.
    pub fn enqueue(&self, id: SignalId, signal: Rc<dyn PendingNotify>) {
        self.pending.borrow_mut().entry(id).or_insert(signal);
    }

    /// Deliver every held-back notification.
    ///
    /// A panicking subscriber does not stop delivery to the rest; the first
    /// panic is resumed once every signal has flushed.
    pub fn flush(&self) {
        let pending = std::mem::take(&mut *self.pending.borrow_mut());
        if pending.is_empty() {
            return;
        }

        trace!(signals = pending.len(), "flushing batch");

        let mut first_panic: Option<Box<dyn Any + Send>> = None;
        for (_, signal) in pending {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| signal.flush_pending())) {
                first_panic.get_or_insert(payload);
            }
        }

        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
    }
}
