//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (effect or computed),
//!    the signal registers that context as a subscriber.
//!
//! 2. When a signal is written, the new value is compared with the old one
//!    using the signal's equality function. Equal writes are dropped entirely.
//!
//! 3. A real change is delivered to a snapshot of the subscriber set, either
//!    immediately or, inside a batch, once the outermost batch closes.
//!
//! # Threading
//!
//! Signals are confined to the thread that created their runtime. They are
//! `!Send` and `!Sync`; a reactive graph is never shared between threads.

use std::any::Any;
use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::trace;

use super::batch::PendingNotify;
use super::runtime::RuntimeInner;
use super::subscriber::{Source, Subscriber, Subscription};
use super::SubscriberId;

/// Unique identifier for a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(u64);

impl SignalId {
    /// Generate a new unique signal ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SignalId {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) type EqualsFn<T> = Rc<dyn Fn(&T, &T) -> bool>;

/// Options accepted by [`Runtime::create_signal_with`](super::Runtime::create_signal_with).
pub struct SignalOptions<T> {
    pub(crate) equals: EqualsFn<T>,
}

impl<T: 'static> SignalOptions<T> {
    /// Use a custom equality predicate. A write for which `equals(old, new)`
    /// returns `true` is dropped without notifying anyone.
    pub fn with_equals<F>(equals: F) -> Self
    where
        F: Fn(&T, &T) -> bool + 'static,
    {
        Self {
            equals: Rc::new(equals),
        }
    }

    /// Treat every write as a change.
    pub fn always_notify() -> Self {
        Self::with_equals(|_, _| false)
    }
}

impl<T: PartialEq + 'static> Default for SignalOptions<T> {
    fn default() -> Self {
        Self::with_equals(|a: &T, b: &T| a == b)
    }
}

impl<T> Clone for SignalOptions<T> {
    fn clone(&self) -> Self {
        Self {
            equals: Rc::clone(&self.equals),
        }
    }
}

pub(crate) struct SignalInner<T> {
    id: SignalId,
    runtime: Weak<RuntimeInner>,
    value: RefCell<T>,
    equals: EqualsFn<T>,
    /// Ordered by first subscription; re-subscribing keeps the slot.
    subscribers: RefCell<IndexMap<SubscriberId, Subscriber<T>>>,
    /// Value held when this signal first changed inside the open batch.
    batch_original: RefCell<Option<T>>,
}

impl<T: Clone + 'static> SignalInner<T> {
    /// Register the running effect, if any, as a subscriber.
    fn track(self: &Rc<Self>) {
        let Some(runtime) = self.runtime.upgrade() else {
            return;
        };
        let Some(observer) = runtime.context.current() else {
            return;
        };
        if observer.is_disposed() {
            return;
        }

        self.subscribers
            .borrow_mut()
            .entry(observer.id())
            .or_insert_with(|| Subscriber::Effect(Rc::downgrade(&observer)));

        let source: Weak<dyn Source> = Rc::downgrade(self) as Weak<dyn Source>;
        observer.add_source(self.id, source);
    }

    fn write(self: &Rc<Self>, next: T) {
        let unchanged = (self.equals)(&*self.value.borrow(), &next);
        if unchanged {
            trace!(signal = ?self.id, "write skipped: value unchanged");
            return;
        }

        let old = std::mem::replace(&mut *self.value.borrow_mut(), next);
        trace!(signal = ?self.id, "signal written");

        let Some(runtime) = self.runtime.upgrade() else {
            self.notify(&old);
            return;
        };

        // A signal still waiting in a flush folds the write into that entry.
        let mut original = self.batch_original.borrow_mut();
        if original.is_some() {
            return;
        }
        if runtime.batch.is_active() {
            *original = Some(old);
            let pending: Rc<dyn PendingNotify> = Rc::clone(self) as Rc<dyn PendingNotify>;
            runtime.batch.enqueue(self.id, pending);
            return;
        }
        drop(original);
        self.notify(&old);
    }

    /// Deliver `(current, old)` to a snapshot of the subscriber set.
    fn notify(&self, old: &T) {
        let new = self.value.borrow().clone();
        let snapshot: SmallVec<[(SubscriberId, Subscriber<T>); 4]> = self
            .subscribers
            .borrow()
            .iter()
            .map(|(id, subscriber)| (*id, subscriber.clone()))
            .collect();

        let mut dead: SmallVec<[SubscriberId; 2]> = SmallVec::new();
        let mut first_panic: Option<Box<dyn Any + Send>> = None;

        for (id, subscriber) in snapshot {
            let outcome = match subscriber {
                Subscriber::Effect(effect) => match effect.upgrade() {
                    Some(effect) => panic::catch_unwind(AssertUnwindSafe(|| effect.notify())),
                    None => {
                        dead.push(id);
                        continue;
                    }
                },
                Subscriber::Callback(callback) => {
                    panic::catch_unwind(AssertUnwindSafe(|| callback(&new, old)))
                }
            };
            if let Err(payload) = outcome {
                first_panic.get_or_insert(payload);
            }
        }

        if !dead.is_empty() {
            let mut subscribers = self.subscribers.borrow_mut();
            for id in dead {
                subscribers.shift_remove(&id);
            }
        }

        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
    }
}

impl<T: 'static> Source for SignalInner<T> {
    fn unsubscribe(&self, subscriber: SubscriberId) {
        self.subscribers.borrow_mut().shift_remove(&subscriber);
    }
}

impl<T: Clone + 'static> PendingNotify for SignalInner<T> {
    fn flush_pending(&self) {
        let Some(original) = self.batch_original.borrow_mut().take() else {
            return;
        };

        let unchanged = (self.equals)(&original, &*self.value.borrow());
        if unchanged {
            trace!(signal = ?self.id, "batched writes cancelled out");
            return;
        }

        self.notify(&original);
    }
}

/// A reactive signal holding a value of type `T`.
///
/// Cloning a signal yields another handle to the same cell.
///
/// # Example
///
/// ```rust
/// use reflex_core::reactive::Runtime;
///
/// let runtime = Runtime::new();
/// let count = runtime.create_signal(0);
///
/// count.set(5);
/// count.update(|n| n + 1);
/// assert_eq!(count.get(), 6);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

impl<T: Clone + 'static> Signal<T> {
    pub(crate) fn new_in(runtime: Weak<RuntimeInner>, value: T, options: SignalOptions<T>) -> Self {
        Self {
            inner: Rc::new(SignalInner {
                id: SignalId::new(),
                runtime,
                value: RefCell::new(value),
                equals: options.equals,
                subscribers: RefCell::new(IndexMap::new()),
                batch_original: RefCell::new(None),
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> SignalId {
        self.inner.id
    }

    /// Get the current value.
    ///
    /// If called while an effect is running, this also registers that effect
    /// as a subscriber.
    pub fn get(&self) -> T {
        self.inner.track();
        self.inner.value.borrow().clone()
    }

    /// Get the current value without tracking dependencies.
    pub fn peek(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value, tracking like [`Signal::get`].
    ///
    /// Writing to this signal from inside `f` panics.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.track();
        f(&*self.inner.value.borrow())
    }

    /// Borrow the current value without tracking.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&*self.inner.value.borrow())
    }

    /// Set a new value and notify subscribers if it differs from the old one.
    pub fn set(&self, value: T) {
        self.inner.write(value);
    }

    /// Update the value using a function of the previous value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let next = {
            let current = self.inner.value.borrow();
            f(&*current)
        };
        self.inner.write(next);
    }

    /// Register a callback invoked with `(new, old)` on every change.
    ///
    /// A callback added while a notification is being delivered first fires
    /// on the next change.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T, &T) + 'static,
    {
        let id = SubscriberId::new();
        self.inner
            .subscribers
            .borrow_mut()
            .insert(id, Subscriber::Callback(Rc::new(callback)));

        let source: Weak<dyn Source> = Rc::downgrade(&self.inner) as Weak<dyn Source>;
        Subscription::new(id, source)
    }

    /// Get the number of subscribers, effects and callbacks alike.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
