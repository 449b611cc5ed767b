//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! we can register the current computation as a dependent.
//!
//! # Implementation
//!
//! Each [`Runtime`](super::Runtime) owns one stack of observer slots. Running
//! an effect pushes the effect; [`untrack`](super::Runtime::untrack) pushes an
//! empty slot, which hides every observer below it. Entries are popped by a
//! guard so the stack is restored on every exit path, including unwinding out
//! of a panicking user function.

use std::cell::RefCell;
use std::rc::Rc;

use super::effect::EffectInner;
use super::SubscriberId;

/// Stack of observer slots for one reactive graph.
pub(crate) struct ReactiveContext {
    stack: RefCell<Vec<Option<Rc<EffectInner>>>>,
}

impl ReactiveContext {
    pub fn new() -> Self {
        Self {
            stack: RefCell::new(Vec::new()),
        }
    }

    /// Push an observer slot. `None` suspends tracking.
    ///
    /// The slot is popped when the returned guard is dropped.
    pub fn enter(&self, observer: Option<Rc<EffectInner>>) -> ContextGuard<'_> {
        let id = observer.as_ref().map(|effect| effect.id());
        self.stack.borrow_mut().push(observer);
        ContextGuard { context: self, id }
    }

    /// The effect that a signal read should attribute itself to, if any.
    pub fn current(&self) -> Option<Rc<EffectInner>> {
        self.stack.borrow().last().cloned().flatten()
    }

    pub fn current_id(&self) -> Option<SubscriberId> {
        self.stack
            .borrow()
            .last()
            .and_then(|slot| slot.as_ref().map(|effect| effect.id()))
    }

    #[cfg(test)]
    pub fn depth(&self) -> usize {
        self.stack.borrow().len()
    }
}

/// Guard that pops the context when dropped.
pub(crate) struct ContextGuard<'a> {
    context: &'a ReactiveContext,
    id: Option<SubscriberId>,
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        let popped = self.context.stack.borrow_mut().pop();

        // Guards are strictly nested, so the top slot is always ours.
        if let Some(slot) = popped {
            debug_assert_eq!(
                slot.as_ref().map(|effect| effect.id()),
                self.id,
                "ReactiveContext mismatch"
            );
        }
    }
}
