//! Integration Tests for Reactive System
//!
//! These tests verify that signals, computed values, effects, and batches
//! work together correctly.

use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use reflex_core::reactive::{EffectOptions, SignalOptions};
use reflex_core::{EffectScheduler, ReadSignal, ReactiveError, Runtime, Track};

fn counter() -> (Rc<Cell<usize>>, Rc<Cell<usize>>) {
    let count = Rc::new(Cell::new(0));
    (Rc::clone(&count), count)
}

fn bump(count: &Cell<usize>) {
    count.set(count.get() + 1);
}

#[derive(Debug, Clone)]
struct Tagged {
    key: u32,
    origin: &'static str,
}

/// Test that a write equal under the signal's policy is invisible.
#[test]
fn equal_write_keeps_old_value_and_stays_silent() {
    let runtime = Runtime::new();
    let signal = runtime.create_signal_with(
        Tagged { key: 1, origin: "first" },
        SignalOptions::with_equals(|a: &Tagged, b: &Tagged| a.key == b.key),
    );
    let (notifications, observed) = counter();
    signal.subscribe(move |_, _| bump(&notifications));

    signal.set(Tagged { key: 1, origin: "second" });

    assert_eq!(observed.get(), 0);
    assert_eq!(signal.peek().origin, "first");

    signal.set(Tagged { key: 2, origin: "third" });
    assert_eq!(observed.get(), 1);
    assert_eq!(signal.peek().origin, "third");
}

/// Test that repeated writes in a batch notify once with (last, before).
#[test]
fn batch_delivers_single_notification() {
    let runtime = Runtime::new();
    let signal = runtime.create_signal(0);
    let seen = Rc::new(RefCell::new(Vec::new()));

    let seen_clone = Rc::clone(&seen);
    signal.subscribe(move |new, old| seen_clone.borrow_mut().push((*new, *old)));

    runtime.batch(|| {
        for value in 1..=5 {
            signal.set(value);
        }
    });

    assert_eq!(*seen.borrow(), vec![(5, 0)]);
}

/// Test that nested batches behave like one flat batch.
#[test]
fn nested_batch_matches_flat_batch() {
    fn record(nested: bool) -> Vec<(&'static str, i32, i32)> {
        let runtime = Runtime::new();
        let a = runtime.create_signal(0);
        let b = runtime.create_signal(0);
        let log = Rc::new(RefCell::new(Vec::new()));

        let log_a = Rc::clone(&log);
        a.subscribe(move |new, old| log_a.borrow_mut().push(("a", *new, *old)));
        let log_b = Rc::clone(&log);
        b.subscribe(move |new, old| log_b.borrow_mut().push(("b", *new, *old)));

        runtime.batch(|| {
            a.set(1);
            if nested {
                runtime.batch(|| {
                    b.set(1);
                    a.set(2);
                });
                // Inner exit does not flush.
                assert!(log.borrow().is_empty());
            } else {
                b.set(1);
                a.set(2);
            }
            b.set(2);
        });

        let recorded = log.borrow().clone();
        recorded
    }

    let flat = record(false);
    assert_eq!(flat, vec![("a", 2, 0), ("b", 2, 0)]);
    assert_eq!(record(true), flat);
}

/// Test that an effect follows the branch it actually reads.
#[test]
fn effect_retracks_conditional_dependencies() {
    let runtime = Runtime::new();
    let a = runtime.create_signal(0);
    let b = runtime.create_signal(0);
    let c = runtime.create_signal(true);
    let (runs, observed) = counter();

    let (a2, b2, c2) = (a.clone(), b.clone(), c.clone());
    runtime.create_effect(move |_| {
        bump(&runs);
        if c2.get() {
            a2.get();
        } else {
            b2.get();
        }
    });
    assert_eq!(observed.get(), 1);

    // Only A is read while C is true.
    b.set(1);
    assert_eq!(observed.get(), 1);

    c.set(false);
    assert_eq!(observed.get(), 2);

    // A is no longer read.
    a.set(1);
    assert_eq!(observed.get(), 2);
    assert_eq!(a.subscriber_count(), 0);

    b.set(2);
    assert_eq!(observed.get(), 3);
}

/// Test cleanup ordering across re-runs and disposal.
#[test]
fn cleanup_runs_once_before_each_rerun() {
    let runtime = Runtime::new();
    let signal = runtime.create_signal(0);
    let log = Rc::new(RefCell::new(Vec::new()));

    let reader = signal.clone();
    let log_clone = Rc::clone(&log);
    let effect = runtime.create_effect(move |cx| {
        let value = reader.get();
        log_clone.borrow_mut().push(format!("run {value}"));
        let log = Rc::clone(&log_clone);
        cx.on_cleanup(move || log.borrow_mut().push(format!("cleanup {value}")));
    });

    signal.set(1);
    signal.set(2);
    effect.dispose();
    signal.set(3);
    effect.dispose();

    assert_eq!(
        *log.borrow(),
        vec!["run 0", "cleanup 0", "run 1", "cleanup 1", "run 2", "cleanup 2"]
    );
}

/// Test that a computed is current right after a write, with one recompute.
#[test]
fn computed_is_pushed_on_write() {
    let runtime = Runtime::new();
    let a = runtime.create_signal(2);
    let b = runtime.create_signal(3);
    let (derives, observed) = counter();

    let (a2, b2) = (a.clone(), b.clone());
    let sum = runtime.create_computed(move || {
        bump(&derives);
        a2.get() + b2.get()
    });
    assert_eq!(sum.get(), 5);
    assert_eq!(observed.get(), 1);

    a.set(10);
    assert_eq!(observed.get(), 2);
    assert_eq!(sum.get(), 13);
    assert_eq!(observed.get(), 2);
}

/// Test that a computed feeds effects like any other signal.
#[test]
fn effect_observes_computed() {
    let runtime = Runtime::new();
    let items = runtime.create_signal(vec![1, 2, 3]);
    let seen = Rc::new(RefCell::new(Vec::new()));

    let reader = items.clone();
    let total = runtime.create_computed(move || reader.with(|items| items.iter().sum::<i32>()));

    let total_reader = total.clone();
    let seen_clone = Rc::clone(&seen);
    runtime.create_effect(move |_| seen_clone.borrow_mut().push(total_reader.get()));

    items.update(|items| items.iter().map(|n| n * 2).collect());
    // Same sum, different list: the computed does not propagate.
    items.set(vec![12]);

    assert_eq!(*seen.borrow(), vec![6, 12]);
}

/// Test that disposing twice is harmless and final.
#[test]
fn disposal_is_idempotent() {
    let runtime = Runtime::new();
    let signal = runtime.create_signal(0);
    let (runs, observed) = counter();

    let reader = signal.clone();
    let effect = runtime.create_effect(move |_| {
        reader.get();
        bump(&runs);
    });

    effect.dispose();
    effect.dispose();
    signal.set(1);

    assert_eq!(observed.get(), 1);
    assert_eq!(runtime.stats().live_effects, 0);
    assert_eq!(
        effect.rerun(),
        Err(ReactiveError::UseAfterDispose { effect: effect.id() })
    );
}

/// Test that untracked reads do not subscribe the running effect.
#[test]
fn untrack_isolates_reads() {
    let runtime = Runtime::new();
    let signal = runtime.create_signal(0);
    let (runs, observed) = counter();

    let reader = signal.clone();
    runtime.create_effect(move |cx| {
        bump(&runs);
        cx.runtime().untrack(|| reader.get());
    });

    signal.set(1);
    assert_eq!(observed.get(), 1);
    assert_eq!(signal.subscriber_count(), 0);
}

/// Test that one panicking subscriber does not starve the others.
#[test]
fn panicking_subscriber_does_not_block_later_ones() {
    let runtime = Runtime::new();
    let signal = runtime.create_signal(0);
    let seen = Rc::new(RefCell::new(Vec::new()));

    signal.subscribe(|_, _| panic!("subscriber failed"));
    let seen_clone = Rc::clone(&seen);
    signal.subscribe(move |new, _| seen_clone.borrow_mut().push(*new));

    let result = panic::catch_unwind(AssertUnwindSafe(|| signal.set(1)));
    assert!(result.is_err());
    assert_eq!(*seen.borrow(), vec![1]);

    // The tracking stack is intact: a fresh effect still tracks.
    assert!(runtime.current_observer().is_none());
    let (runs, observed) = counter();
    let reader = signal.clone();
    runtime.create_effect(move |_| {
        reader.get();
        bump(&runs);
    });
    let _ = panic::catch_unwind(AssertUnwindSafe(|| signal.set(2)));
    assert_eq!(observed.get(), 2);
}

/// Test that a panicking batch flushes and then propagates.
#[test]
fn panicking_batch_flushes_then_propagates() {
    let runtime = Runtime::new();
    let signal = runtime.create_signal(0);
    let seen = Rc::new(RefCell::new(Vec::new()));

    let seen_clone = Rc::clone(&seen);
    signal.subscribe(move |new, old| seen_clone.borrow_mut().push((*new, *old)));

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        runtime.batch(|| {
            signal.set(1);
            signal.set(2);
            panic!("batch failed");
        });
    }));

    assert!(result.is_err());
    assert_eq!(*seen.borrow(), vec![(2, 0)]);
    assert_eq!(runtime.stats().batch_depth, 0);

    // Later writes are delivered immediately again.
    signal.set(3);
    assert_eq!(seen.borrow().last(), Some(&(3, 2)));
}

/// Test that nested effects are replaced when their parent re-runs.
#[test]
fn nested_effects_follow_parent() {
    let runtime = Runtime::new();
    let outer = runtime.create_signal(0);
    let inner = runtime.create_signal(0);
    let (inner_runs, observed) = counter();

    let (outer_reader, inner_reader) = (outer.clone(), inner.clone());
    let parent = runtime.create_effect(move |cx| {
        outer_reader.get();
        let reader = inner_reader.clone();
        let runs = Rc::clone(&inner_runs);
        cx.runtime().create_effect(move |_| {
            reader.get();
            bump(&runs);
        });
    });
    assert_eq!(runtime.stats().live_effects, 2);

    outer.set(1);
    outer.set(2);
    assert_eq!(runtime.stats().live_effects, 2);
    assert_eq!(inner.subscriber_count(), 1);

    inner.set(1);
    assert_eq!(observed.get(), 4);

    parent.dispose();
    assert_eq!(runtime.stats().live_effects, 0);
    assert_eq!(inner.subscriber_count(), 0);
}

/// Test that deferred effects coalesce notifications into one run.
#[test]
fn deferred_effect_runs_once_per_drain() {
    let runtime = Runtime::new();
    let a = runtime.create_signal(0);
    let b = runtime.create_signal(0);
    let seen = Rc::new(RefCell::new(Vec::new()));

    let (a2, b2) = (a.clone(), b.clone());
    let seen_clone = Rc::clone(&seen);
    runtime.create_effect_with(
        EffectOptions::default().with_scheduler(EffectScheduler::Deferred),
        move |_| seen_clone.borrow_mut().push(a2.get() + b2.get()),
    );

    a.set(1);
    b.set(2);
    a.set(3);
    assert_eq!(*seen.borrow(), vec![0]);

    assert_eq!(runtime.run_deferred(), 1);
    assert_eq!(*seen.borrow(), vec![0, 5]);
}

/// Test that read-only views reject writes to computed values.
#[test]
fn read_only_view_rejects_computed_writes() {
    let runtime = Runtime::new();
    let base = runtime.create_signal(1);
    let reader = base.clone();
    let doubled = runtime.create_computed(move || reader.get() * 2);

    let views: Vec<ReadSignal<i32>> = vec![base.clone().into(), doubled.clone().into()];
    assert!(views[0].try_set(4).is_ok());
    assert_eq!(
        views[1].try_set(4),
        Err(ReactiveError::WriteToReadonly { signal: doubled.id() })
    );

    let values: Vec<i32> = views.iter().map(|view| view.get()).collect();
    assert_eq!(values, vec![4, 8]);
}

/// Test that signals keep working as plain cells after the runtime is gone.
#[test]
fn signals_outlive_runtime() {
    let runtime = Runtime::new();
    let signal = runtime.create_signal(1);
    let (notifications, observed) = counter();
    signal.subscribe(move |_, _| bump(&notifications));

    drop(runtime);
    signal.set(2);

    assert_eq!(signal.get(), 2);
    assert_eq!(observed.get(), 1);
}
