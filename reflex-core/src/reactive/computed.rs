//! Computed Implementation
//!
//! A Computed is a read-only signal whose value is derived from other
//! signals.
//!
//! # How Computed Values Work
//!
//! 1. On creation, an internal effect runs the derive function and stores
//!    the result in an internal signal.
//!
//! 2. When a dependency changes, the internal effect re-runs immediately and
//!    writes the new result through the signal's equality check. A result
//!    equal to the previous one stops there; downstream effects are not
//!    notified.
//!
//! 3. Reading a computed returns the stored value. Reads never trigger a
//!    recomputation; the value is kept current by pushes, not pulled on
//!    demand.
//!
//! # Reentrancy
//!
//! The internal effect never re-enters itself. A derive function that reads
//! its own computed gets the previous value, untracked, and the attempt is
//! logged as [`ReactiveError::ReentrantRecomputation`].
//!
//! # Ownership
//!
//! Handles share one owner. When the last handle is dropped the internal
//! effect is disposed and stops recomputing. A computed read by another
//! computed or an effect stays alive through the handle captured there.

use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

use tracing::warn;

use super::effect::{Effect, EffectOptions};
use super::runtime::{Runtime, RuntimeInner};
use super::signal::{EqualsFn, Signal, SignalId, SignalOptions};
use super::subscriber::Subscription;
use crate::config::EffectScheduler;
use crate::error::ReactiveError;

/// Options accepted by [`Runtime::create_computed_with`](super::Runtime::create_computed_with).
pub struct ComputedOptions<T> {
    equals: EqualsFn<T>,
}

impl<T: 'static> ComputedOptions<T> {
    /// Use a custom equality predicate to decide whether a recomputed value
    /// propagates.
    pub fn with_equals<F>(equals: F) -> Self
    where
        F: Fn(&T, &T) -> bool + 'static,
    {
        Self {
            equals: Rc::new(equals),
        }
    }

    /// Propagate every recomputation, even when the result is unchanged.
    pub fn always_notify() -> Self {
        Self::with_equals(|_, _| false)
    }
}

impl<T: PartialEq + 'static> Default for ComputedOptions<T> {
    fn default() -> Self {
        Self::with_equals(|a: &T, b: &T| a == b)
    }
}

/// A derived value kept current by an internal effect.
///
/// # Example
///
/// ```rust
/// use reflex_core::reactive::Runtime;
///
/// let runtime = Runtime::new();
/// let a = runtime.create_signal(2);
/// let b = runtime.create_signal(3);
///
/// let (a2, b2) = (a.clone(), b.clone());
/// let sum = runtime.create_computed(move || a2.get() + b2.get());
/// assert_eq!(sum.get(), 5);
///
/// a.set(10);
/// assert_eq!(sum.get(), 13);
/// ```
pub struct Computed<T: 'static> {
    /// `None` only until the first run completes.
    signal: Signal<Option<T>>,
    owner: Rc<ComputedOwner>,
    runtime: Weak<RuntimeInner>,
}

/// Disposes the internal effect when the last [`Computed`] handle drops.
struct ComputedOwner {
    effect: Effect,
}

impl Drop for ComputedOwner {
    fn drop(&mut self) {
        self.effect.dispose();
    }
}

impl<T: Clone + 'static> Computed<T> {
    pub(crate) fn new_in<F>(runtime: &Runtime, options: ComputedOptions<T>, mut derive: F) -> Self
    where
        F: FnMut() -> T + 'static,
    {
        let equals = options.equals;
        let signal = runtime.create_signal_with(
            None,
            SignalOptions::with_equals(move |a: &Option<T>, b: &Option<T>| match (a, b) {
                (Some(a), Some(b)) => equals(a, b),
                _ => false,
            }),
        );

        let target = signal.clone();
        let effect = runtime.create_effect_with(
            EffectOptions::default().with_scheduler(EffectScheduler::Immediate),
            move |_| {
                let value = derive();
                target.set(Some(value));
            },
        );

        Self {
            signal,
            owner: Rc::new(ComputedOwner { effect }),
            runtime: runtime.downgrade(),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> SignalId {
        self.signal.id()
    }

    /// Get the current value, tracking like [`Signal::get`].
    pub fn get(&self) -> T {
        if self.is_own_observer() {
            let error = ReactiveError::ReentrantRecomputation {
                computed: self.id(),
            };
            warn!(%error, "computed read itself while recomputing; serving previous value");
            return self.peek();
        }
        self.signal.with(Self::initialized)
    }

    /// Get the current value without tracking.
    pub fn peek(&self) -> T {
        self.signal.with_untracked(Self::initialized)
    }

    /// Register a callback invoked with `(new, old)` whenever the derived
    /// value changes.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T, &T) + 'static,
    {
        self.signal.subscribe(move |new, old| {
            if let (Some(new), Some(old)) = (new, old) {
                callback(new, old);
            }
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.signal.subscriber_count()
    }

    /// Stop recomputing. The last value stays readable.
    pub fn dispose(&self) {
        self.owner.effect.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.owner.effect.is_disposed()
    }

    /// Get the number of times the derive function has run.
    pub fn run_count(&self) -> usize {
        self.owner.effect.run_count()
    }

    fn is_own_observer(&self) -> bool {
        self.runtime
            .upgrade()
            .and_then(|runtime| runtime.context.current_id())
            == Some(self.owner.effect.id())
    }

    fn initialized(value: &Option<T>) -> T {
        value
            .clone()
            .expect("computed value is stored by its first run")
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            signal: self.signal.clone(),
            owner: Rc::clone(&self.owner),
            runtime: Weak::clone(&self.runtime),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.id())
            .field("value", &self.peek())
            .field("run_count", &self.run_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[test]
    fn computed_derives_on_creation() {
        let runtime = Runtime::new();
        let computed = runtime.create_computed(|| 42);

        assert_eq!(computed.get(), 42);
        assert_eq!(computed.run_count(), 1);
    }

    #[test]
    fn computed_pushes_on_dependency_change() {
        let runtime = Runtime::new();
        let a = runtime.create_signal(2);
        let b = runtime.create_signal(3);
        let calls = Rc::new(Cell::new(0));

        let (a2, b2) = (a.clone(), b.clone());
        let calls_clone = Rc::clone(&calls);
        let sum = runtime.create_computed(move || {
            calls_clone.set(calls_clone.get() + 1);
            a2.get() + b2.get()
        });
        assert_eq!(sum.get(), 5);

        a.set(10);
        assert_eq!(calls.get(), 2);
        assert_eq!(sum.peek(), 13);
        assert_eq!(sum.get(), 13);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn unchanged_result_does_not_propagate() {
        let runtime = Runtime::new();
        let count = runtime.create_signal(1);
        let downstream_runs = Rc::new(Cell::new(0));

        let reader = count.clone();
        let is_even = runtime.create_computed(move || reader.get() % 2 == 0);

        let parity = is_even.clone();
        let runs = Rc::clone(&downstream_runs);
        runtime.create_effect(move |_| {
            parity.get();
            runs.set(runs.get() + 1);
        });

        count.set(3);
        assert_eq!(downstream_runs.get(), 1);

        count.set(4);
        assert_eq!(downstream_runs.get(), 2);
    }

    #[test]
    fn computed_chain_updates() {
        let runtime = Runtime::new();
        let base = runtime.create_signal(5);

        let reader = base.clone();
        let doubled = runtime.create_computed(move || reader.get() * 2);
        let upstream = doubled.clone();
        let plus_ten = runtime.create_computed(move || upstream.get() + 10);

        assert_eq!(plus_ten.get(), 20);

        base.set(10);
        assert_eq!(doubled.get(), 20);
        assert_eq!(plus_ten.get(), 30);
    }

    #[test]
    fn subscribe_receives_new_and_old() {
        let runtime = Runtime::new();
        let count = runtime.create_signal(1);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let reader = count.clone();
        let squared = runtime.create_computed(move || reader.get() * reader.get());

        let seen_clone = Rc::clone(&seen);
        squared.subscribe(move |new, old| seen_clone.borrow_mut().push((*new, *old)));

        count.set(3);
        assert_eq!(*seen.borrow(), vec![(9, 1)]);
    }

    #[test]
    fn custom_equality_suppresses_small_changes() {
        let runtime = Runtime::new();
        let raw = runtime.create_signal(1.0_f64);

        let reader = raw.clone();
        let smoothed = runtime.create_computed_with(
            ComputedOptions::with_equals(|a: &f64, b: &f64| (a - b).abs() < 0.5),
            move || reader.get(),
        );

        raw.set(1.2);
        assert_eq!(smoothed.get(), 1.0);

        raw.set(2.0);
        assert_eq!(smoothed.get(), 2.0);
    }

    #[test]
    fn self_read_serves_previous_value() {
        let runtime = Runtime::new();
        let source = runtime.create_signal(1);
        let slot: Rc<RefCell<Option<Computed<i32>>>> = Rc::new(RefCell::new(None));

        let reader = source.clone();
        let slot_clone = Rc::clone(&slot);
        let accumulated = runtime.create_computed(move || {
            let previous = slot_clone.borrow().as_ref().map_or(0, |own| own.get());
            reader.get() + previous
        });
        *slot.borrow_mut() = Some(accumulated.clone());

        assert_eq!(accumulated.get(), 1);

        source.set(2);
        assert_eq!(accumulated.get(), 3);
        assert_eq!(accumulated.run_count(), 2);

        source.set(3);
        assert_eq!(accumulated.get(), 6);
        assert_eq!(accumulated.run_count(), 3);
    }

    #[test]
    fn disposed_computed_keeps_last_value() {
        let runtime = Runtime::new();
        let count = runtime.create_signal(1);

        let reader = count.clone();
        let doubled = runtime.create_computed(move || reader.get() * 2);

        doubled.dispose();
        assert!(doubled.is_disposed());

        count.set(5);
        assert_eq!(doubled.get(), 2);
        assert_eq!(count.subscriber_count(), 0);
    }

    #[test]
    fn dropping_last_handle_disposes_computed() {
        let runtime = Runtime::new();
        let count = runtime.create_signal(0);
        let calls = Rc::new(Cell::new(0));

        {
            let reader = count.clone();
            let calls_clone = Rc::clone(&calls);
            let doubled = runtime.create_computed(move || {
                calls_clone.set(calls_clone.get() + 1);
                reader.get() * 2
            });
            let copy = doubled.clone();
            drop(doubled);

            // A remaining clone keeps it running.
            count.set(1);
            assert_eq!(copy.get(), 2);
            assert_eq!(calls.get(), 2);
        }

        count.set(2);
        count.set(3);
        assert_eq!(calls.get(), 2);
        assert_eq!(runtime.stats().live_effects, 0);
        assert_eq!(count.subscriber_count(), 0);
    }

    #[test]
    fn computed_captured_downstream_stays_alive() {
        let runtime = Runtime::new();
        let base = runtime.create_signal(1);

        let reader = base.clone();
        let doubled = runtime.create_computed(move || reader.get() * 2);
        let plus_one = runtime.create_computed(move || doubled.get() + 1);

        base.set(5);
        assert_eq!(plus_one.get(), 11);
        assert_eq!(runtime.stats().live_effects, 2);

        drop(plus_one);
        assert_eq!(runtime.stats().live_effects, 0);
    }

    #[test]
    fn computed_inside_batch_settles_after_flush() {
        let runtime = Runtime::new();
        let a = runtime.create_signal(1);
        let b = runtime.create_signal(1);
        let calls = Rc::new(Cell::new(0));

        let (a2, b2) = (a.clone(), b.clone());
        let calls_clone = Rc::clone(&calls);
        let sum = runtime.create_computed(move || {
            calls_clone.set(calls_clone.get() + 1);
            a2.get() + b2.get()
        });

        runtime.batch(|| {
            a.set(2);
            a.set(3);
            b.set(4);
            assert_eq!(sum.peek(), 2);
        });

        assert_eq!(sum.get(), 7);
        // One recomputation per changed dependency.
        assert_eq!(calls.get(), 3);
    }
}
