//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, computed
//! values, and effects. It owns the tracking stack, the batch queue, the
//! deferred-effect queue, and every live effect.
//!
//! # How It Works
//!
//! 1. Signals, computed values, and effects are created through a runtime and
//!    keep a weak reference back to it.
//!
//! 2. When an effect runs, it is pushed onto the runtime's tracking stack, and
//!    every signal read during the run subscribes the effect.
//!
//! 3. When a signal's value changes, the signal notifies its subscribers:
//!    a. Immediately, if no batch is open
//!    b. Once per signal when the outermost batch closes, otherwise
//!    c. Deferred effects only enqueue themselves; [`Runtime::run_deferred`]
//!       drains the queue
//!
//! # Thread Safety
//!
//! A runtime and everything created through it belong to one thread. Create
//! one runtime per thread that needs a reactive graph.
//!
//! # Lifetime
//!
//! Dropping the last [`Runtime`] handle disposes every effect still alive,
//! running its cleanup. Signals outlive it as plain value cells.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, trace, warn};

use super::batch::BatchQueue;
use super::computed::{Computed, ComputedOptions};
use super::context::ReactiveContext;
use super::effect::{Effect, EffectContext, EffectInner, EffectOptions};
use super::signal::{Signal, SignalOptions};
use super::subscriber::SubscriberId;
use crate::config::RuntimeConfig;

pub(crate) struct RuntimeInner {
    pub(crate) config: RuntimeConfig,
    pub(crate) context: ReactiveContext,
    pub(crate) batch: BatchQueue,
    /// Every live effect, in creation order.
    effects: RefCell<IndexMap<SubscriberId, Rc<EffectInner>>>,
    /// Deferred effects waiting for [`Runtime::run_deferred`].
    deferred: RefCell<IndexSet<SubscriberId>>,
}

impl RuntimeInner {
    fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            context: ReactiveContext::new(),
            batch: BatchQueue::new(),
            effects: RefCell::new(IndexMap::new()),
            deferred: RefCell::new(IndexSet::new()),
        }
    }

    /// Queue a deferred effect. An effect already queued keeps its place.
    pub fn schedule_deferred(&self, id: SubscriberId) {
        if self.deferred.borrow_mut().insert(id) {
            trace!(effect = ?id, "effect deferred");
        }
    }

    /// Drop a disposed effect from the registry and the deferred queue.
    pub fn forget_effect(&self, id: SubscriberId) {
        let removed = self.effects.borrow_mut().shift_remove(&id);
        self.deferred.borrow_mut().shift_remove(&id);
        drop(removed);
    }
}

impl Drop for RuntimeInner {
    fn drop(&mut self) {
        let effects = mem::take(self.effects.get_mut());
        if !effects.is_empty() {
            debug!(effects = effects.len(), "runtime dropped; disposing effects");
        }
        for (_, effect) in effects {
            effect.dispose();
        }
    }
}

/// Snapshot of a runtime's bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RuntimeStats {
    /// Effects created and not yet disposed.
    pub live_effects: usize,
    /// Deferred effects waiting for [`Runtime::run_deferred`].
    pub pending_deferred: usize,
    /// Nesting depth of open batches.
    pub batch_depth: usize,
    /// Signals holding back a notification for the open batch.
    pub pending_batch_signals: usize,
}

/// Handle to a reactive graph.
///
/// Cheap to clone; all clones drive the same graph.
///
/// # Example
///
/// ```rust
/// use reflex_core::reactive::Runtime;
///
/// let runtime = Runtime::new();
/// let first = runtime.create_signal(String::from("Ada"));
/// let last = runtime.create_signal(String::from("Lovelace"));
///
/// let (f, l) = (first.clone(), last.clone());
/// let full = runtime.create_computed(move || format!("{} {}", f.get(), l.get()));
///
/// runtime.batch(|| {
///     first.set(String::from("Grace"));
///     last.set(String::from("Hopper"));
/// });
/// assert_eq!(full.get(), "Grace Hopper");
/// ```
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        debug!(?config, "runtime created");
        Self {
            inner: Rc::new(RuntimeInner::new(config)),
        }
    }

    pub(crate) fn from_inner(inner: Rc<RuntimeInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<RuntimeInner> {
        Rc::downgrade(&self.inner)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Create a signal that notifies when a write changes its value under
    /// `PartialEq`.
    pub fn create_signal<T>(&self, value: T) -> Signal<T>
    where
        T: Clone + PartialEq + 'static,
    {
        self.create_signal_with(value, SignalOptions::default())
    }

    pub fn create_signal_with<T>(&self, value: T, options: SignalOptions<T>) -> Signal<T>
    where
        T: Clone + 'static,
    {
        Signal::new_in(self.downgrade(), value, options)
    }

    /// Create an effect and run it once.
    ///
    /// If the first run panics, the effect is disposed and the panic resumes.
    pub fn create_effect<F>(&self, body: F) -> Effect
    where
        F: FnMut(&EffectContext<'_>) + 'static,
    {
        self.create_effect_with(EffectOptions::default(), body)
    }

    pub fn create_effect_with<F>(&self, options: EffectOptions, body: F) -> Effect
    where
        F: FnMut(&EffectContext<'_>) + 'static,
    {
        let scheduler = options
            .scheduler
            .unwrap_or(self.inner.config.default_scheduler);
        let effect = Rc::new(EffectInner::new(self.downgrade(), scheduler, body));

        self.inner
            .effects
            .borrow_mut()
            .insert(effect.id(), Rc::clone(&effect));

        if self.inner.config.own_nested_effects {
            if let Some(parent) = self.inner.context.current() {
                parent.adopt(&effect);
            }
        }

        debug!(effect = ?effect.id(), ?scheduler, "effect created");

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| effect.run())) {
            effect.dispose();
            panic::resume_unwind(payload);
        }

        Effect::from_inner(&effect)
    }

    /// Create a computed value using `PartialEq` to decide whether a
    /// recomputation propagates.
    pub fn create_computed<T, F>(&self, derive: F) -> Computed<T>
    where
        T: Clone + PartialEq + 'static,
        F: FnMut() -> T + 'static,
    {
        self.create_computed_with(ComputedOptions::default(), derive)
    }

    pub fn create_computed_with<T, F>(&self, options: ComputedOptions<T>, derive: F) -> Computed<T>
    where
        T: Clone + 'static,
        F: FnMut() -> T + 'static,
    {
        Computed::new_in(self, options, derive)
    }

    /// Run `f` with notifications held back until the outermost batch exits.
    ///
    /// Each signal changed inside the batch notifies once, with its final
    /// value and the value it had before the batch. If `f` panics, the held
    /// notifications are still delivered before the panic resumes.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let batch = &self.inner.batch;
        batch.enter();
        let result = panic::catch_unwind(AssertUnwindSafe(f));

        if batch.exit() {
            match &result {
                Ok(_) => batch.flush(),
                Err(_) => {
                    // The panic from `f` wins over one raised while flushing.
                    let _ = panic::catch_unwind(AssertUnwindSafe(|| batch.flush()));
                }
            }
        }

        match result {
            Ok(value) => value,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    /// Run `f` without tracking: signals read inside do not subscribe the
    /// running effect.
    pub fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        let _untracked = self.inner.context.enter(None);
        f()
    }

    /// The effect currently tracking reads, if any.
    pub fn current_observer(&self) -> Option<SubscriberId> {
        self.inner.context.current_id()
    }

    pub fn is_batching(&self) -> bool {
        self.inner.batch.is_active()
    }

    /// Run queued deferred effects until the queue is empty.
    ///
    /// Effects queued while draining run in a later pass. Draining stops after
    /// [`RuntimeConfig::max_deferred_passes`] passes; anything still queued
    /// then stays queued. Returns the number of effect runs.
    pub fn run_deferred(&self) -> usize {
        let mut runs = 0;
        let mut first_panic: Option<Box<dyn Any + Send>> = None;

        for _ in 0..self.inner.config.max_deferred_passes {
            let queued = mem::take(&mut *self.inner.deferred.borrow_mut());
            if queued.is_empty() {
                break;
            }

            trace!(effects = queued.len(), "running deferred effects");
            for id in queued {
                let effect = self.inner.effects.borrow().get(&id).cloned();
                let Some(effect) = effect else {
                    continue;
                };
                runs += 1;
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| effect.run())) {
                    first_panic.get_or_insert(payload);
                }
            }
        }

        let remaining = self.inner.deferred.borrow().len();
        if remaining > 0 {
            warn!(
                remaining,
                passes = self.inner.config.max_deferred_passes,
                "deferred effects still queued after pass limit"
            );
        }

        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
        runs
    }

    pub fn stats(&self) -> RuntimeStats {
        RuntimeStats {
            live_effects: self.inner.effects.borrow().len(),
            pending_deferred: self.inner.deferred.borrow().len(),
            batch_depth: self.inner.batch.depth(),
            pending_batch_signals: self.inner.batch.pending_len(),
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
