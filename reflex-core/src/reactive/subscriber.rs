//! Subscriber types for the reactive system.
//!
//! A signal's subscriber set holds two kinds of entries: effects that read
//! the signal while tracking, and plain callbacks registered through
//! `subscribe`. Both are keyed by a [`SubscriberId`] so that re-registering
//! is a no-op and removal keeps the remaining entries in their original
//! order.

use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use super::effect::EffectInner;

/// Unique identifier for a subscriber.
///
/// Each effect and each subscription callback gets a unique ID when created.
/// This ID is used as the membership key in subscriber sets and avoids
/// duplicate subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// An entry in a signal's subscriber set.
///
/// This is the closed set of things a signal can notify; nothing is probed
/// structurally at runtime.
pub(crate) enum Subscriber<T> {
    /// An effect that read the signal during its last run. Held weakly: the
    /// runtime owns effects, not the signals they read.
    Effect(Weak<EffectInner>),

    /// A callback receiving `(new, old)`.
    Callback(Rc<dyn Fn(&T, &T)>),
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Effect(effect) => Self::Effect(Weak::clone(effect)),
            Self::Callback(callback) => Self::Callback(Rc::clone(callback)),
        }
    }
}

/// Anything that keeps a subscriber set.
///
/// Implemented by every signal regardless of its value type so effects and
/// subscription handles can detach without knowing `T`.
pub(crate) trait Source {
    /// Remove a subscriber. Removing an absent subscriber is a no-op.
    fn unsubscribe(&self, subscriber: SubscriberId);
}

/// Handle returned by `subscribe`.
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
#[derive(Clone)]
pub struct Subscription {
    id: SubscriberId,
    source: Weak<dyn Source>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriberId, source: Weak<dyn Source>) -> Self {
        Self { id, source }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Stop receiving notifications. Safe to call any number of times.
    ///
    /// A notification already being delivered still reaches this callback.
    pub fn unsubscribe(&self) {
        if let Some(source) = self.source.upgrade() {
            source.unsubscribe(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .finish()
    }
}
