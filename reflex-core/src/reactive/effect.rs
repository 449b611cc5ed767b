//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect re-runs, either synchronously
//!    or through the runtime's deferred queue (see [`EffectScheduler`]).
//!
//! 3. Each run starts by disposing the child effects created by the previous
//!    run and invoking the previous cleanup. The function then runs with the
//!    effect as the active observer.
//!
//! 4. After the run, signals that were read last time but not this time are
//!    unsubscribed, so a branch that is no longer taken stops triggering the
//!    effect.
//!
//! # Cleanup
//!
//! The function can register a cleanup through [`EffectContext::on_cleanup`].
//! Only the latest registration is kept. It runs, untracked, before the next
//! run and when the effect is disposed, and never twice.
//!
//! # Ownership
//!
//! The [`Runtime`](super::Runtime) owns every effect until it is disposed.
//! The [`Effect`] handle is weak; dropping it leaves the effect running.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::runtime::{Runtime, RuntimeInner};
use super::signal::SignalId;
use super::subscriber::{Source, SubscriberId};
use crate::config::EffectScheduler;
use crate::error::{ReactiveError, ReactiveResult};

type EffectFn = Box<dyn FnMut(&EffectContext<'_>)>;
type CleanupFn = Box<dyn FnOnce()>;

/// Options accepted by [`Runtime::create_effect_with`](super::Runtime::create_effect_with).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EffectOptions {
    /// `None` uses the runtime's configured default.
    pub scheduler: Option<EffectScheduler>,
}

impl EffectOptions {
    pub fn with_scheduler(mut self, scheduler: EffectScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }
}

pub(crate) struct EffectInner {
    id: SubscriberId,
    runtime: Weak<RuntimeInner>,
    scheduler: EffectScheduler,
    body: RefCell<EffectFn>,
    cleanup: RefCell<Option<CleanupFn>>,
    /// Signals read during the current or last run.
    sources: RefCell<IndexMap<SignalId, Weak<dyn Source>>>,
    /// Effects created during the last run.
    children: RefCell<SmallVec<[Weak<EffectInner>; 2]>>,
    disposed: Cell<bool>,
    running: Cell<bool>,
    run_count: Cell<usize>,
}

impl EffectInner {
    pub fn new<F>(runtime: Weak<RuntimeInner>, scheduler: EffectScheduler, body: F) -> Self
    where
        F: FnMut(&EffectContext<'_>) + 'static,
    {
        Self {
            id: SubscriberId::new(),
            runtime,
            scheduler,
            body: RefCell::new(Box::new(body)),
            cleanup: RefCell::new(None),
            sources: RefCell::new(IndexMap::new()),
            children: RefCell::new(SmallVec::new()),
            disposed: Cell::new(false),
            running: Cell::new(false),
            run_count: Cell::new(0),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    pub fn add_source(&self, id: SignalId, source: Weak<dyn Source>) {
        self.sources.borrow_mut().entry(id).or_insert(source);
    }

    /// Take ownership of an effect created during this effect's run.
    pub fn adopt(&self, child: &Rc<EffectInner>) {
        if self.disposed.get() {
            child.dispose();
            return;
        }
        self.children.borrow_mut().push(Rc::downgrade(child));
    }

    /// React to a change in one of the sources.
    pub fn notify(self: &Rc<Self>) {
        if self.disposed.get() {
            return;
        }

        match self.scheduler {
            EffectScheduler::Immediate => self.run(),
            EffectScheduler::Deferred => {
                if let Some(runtime) = self.runtime.upgrade() {
                    runtime.schedule_deferred(self.id);
                }
            }
        }
    }

    /// Perform one run cycle.
    pub fn run(self: &Rc<Self>) {
        if self.disposed.get() {
            return;
        }
        if self.running.get() {
            trace!(effect = ?self.id, "notification suppressed: effect is already running");
            return;
        }
        let Some(runtime) = self.runtime.upgrade() else {
            return;
        };

        let _running = RunningFlag::raise(&self.running);
        self.dispose_children();
        self.run_cleanup(Some(&*runtime));

        let _reconcile = SourceReconciler::begin(self);
        {
            let _observer = runtime.context.enter(Some(Rc::clone(self)));
            let cx = EffectContext {
                effect: self,
                runtime: &runtime,
            };
            let mut body = self.body.borrow_mut();
            (*body)(&cx);
        }

        self.run_count.set(self.run_count.get() + 1);

        // Disposed from inside its own run after registering a cleanup.
        if self.disposed.get() {
            self.run_cleanup(Some(&*runtime));
        }
    }

    pub fn dispose(self: &Rc<Self>) {
        if self.disposed.replace(true) {
            return;
        }
        debug!(effect = ?self.id, "effect disposed");

        self.dispose_children();
        self.detach_all();

        let runtime = self.runtime.upgrade();
        if let Some(runtime) = &runtime {
            runtime.forget_effect(self.id);
        }
        self.run_cleanup(runtime.as_deref());
    }

    fn dispose_children(&self) {
        let children = mem::take(&mut *self.children.borrow_mut());
        for child in children {
            if let Some(child) = child.upgrade() {
                child.dispose();
            }
        }
    }

    fn detach_all(&self) {
        let sources = mem::take(&mut *self.sources.borrow_mut());
        for (_, source) in sources {
            if let Some(source) = source.upgrade() {
                source.unsubscribe(self.id);
            }
        }
    }

    fn run_cleanup(&self, runtime: Option<&RuntimeInner>) {
        let Some(cleanup) = self.cleanup.borrow_mut().take() else {
            return;
        };
        match runtime {
            Some(runtime) => {
                let _untracked = runtime.context.enter(None);
                cleanup();
            }
            None => cleanup(),
        }
    }

    pub fn run_count(&self) -> usize {
        self.run_count.get()
    }

    pub fn dependency_count(&self) -> usize {
        self.sources.borrow().len()
    }
}

/// Clears the running flag on every exit path.
struct RunningFlag<'a>(&'a Cell<bool>);

impl<'a> RunningFlag<'a> {
    fn raise(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Diffs the sources read by a run against those of the previous run.
///
/// On a normal exit, sources no longer read are unsubscribed. When the run
/// unwinds, the previous sources are kept alongside whatever was read before
/// the panic. When the effect was disposed during the run, everything is
/// detached.
struct SourceReconciler<'a> {
    effect: &'a EffectInner,
    previous: IndexMap<SignalId, Weak<dyn Source>>,
}

impl<'a> SourceReconciler<'a> {
    fn begin(effect: &'a EffectInner) -> Self {
        let previous = mem::take(&mut *effect.sources.borrow_mut());
        Self { effect, previous }
    }
}

impl Drop for SourceReconciler<'_> {
    fn drop(&mut self) {
        let previous = mem::take(&mut self.previous);

        if self.effect.disposed.get() {
            self.effect.detach_all();
            for (_, source) in previous {
                if let Some(source) = source.upgrade() {
                    source.unsubscribe(self.effect.id);
                }
            }
            return;
        }

        if std::thread::panicking() {
            let mut sources = self.effect.sources.borrow_mut();
            for (id, source) in previous {
                sources.entry(id).or_insert(source);
            }
            return;
        }

        let stale: SmallVec<[Weak<dyn Source>; 4]> = {
            let current = self.effect.sources.borrow();
            previous
                .into_iter()
                .filter(|(id, _)| !current.contains_key(id))
                .map(|(_, source)| source)
                .collect()
        };
        for source in stale {
            if let Some(source) = source.upgrade() {
                source.unsubscribe(self.effect.id);
            }
        }
    }
}

/// Passed to the effect function on every run.
pub struct EffectContext<'a> {
    effect: &'a Rc<EffectInner>,
    runtime: &'a Rc<RuntimeInner>,
}

impl EffectContext<'_> {
    pub fn id(&self) -> SubscriberId {
        self.effect.id
    }

    /// The runtime driving this run.
    ///
    /// Prefer this over capturing a [`Runtime`] in the effect closure: the
    /// runtime owns the effect, so a captured handle keeps the whole graph
    /// alive until the effect is disposed.
    pub fn runtime(&self) -> Runtime {
        Runtime::from_inner(Rc::clone(self.runtime))
    }

    /// Register the cleanup for this run, replacing any earlier registration.
    pub fn on_cleanup<F>(&self, cleanup: F)
    where
        F: FnOnce() + 'static,
    {
        *self.effect.cleanup.borrow_mut() = Some(Box::new(cleanup));
    }

    /// Number of runs completed before this one.
    pub fn run_count(&self) -> usize {
        self.effect.run_count()
    }

    pub fn is_first_run(&self) -> bool {
        self.effect.run_count() == 0
    }

    /// Dispose the running effect. The current run finishes normally.
    pub fn dispose(&self) {
        self.effect.dispose();
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// This is the dispose handle returned at creation. It is cheap to clone and
/// does not keep the effect alive.
///
/// # Example
///
/// ```rust
/// use reflex_core::reactive::Runtime;
///
/// let runtime = Runtime::new();
/// let count = runtime.create_signal(0);
///
/// let reader = count.clone();
/// let effect = runtime.create_effect(move |_| {
///     println!("Count is: {}", reader.get());
/// });
///
/// count.set(5); // Prints: "Count is: 5"
/// effect.dispose();
/// ```
#[derive(Clone)]
pub struct Effect {
    id: SubscriberId,
    inner: Weak<EffectInner>,
}

impl Effect {
    pub(crate) fn from_inner(inner: &Rc<EffectInner>) -> Self {
        Self {
            id: inner.id,
            inner: Rc::downgrade(inner),
        }
    }

    /// Get the subscriber ID for this effect.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Dispose of the effect.
    ///
    /// Runs the pending cleanup and removes the effect from every signal it
    /// subscribed to. Calling this again does nothing.
    pub fn dispose(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.dispose();
        }
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner
            .upgrade()
            .map_or(true, |inner| inner.is_disposed())
    }

    /// Run the effect now, outside of any notification.
    pub fn rerun(&self) -> ReactiveResult<()> {
        let inner = self
            .inner
            .upgrade()
            .filter(|inner| !inner.is_disposed())
            .ok_or(ReactiveError::UseAfterDispose { effect: self.id })?;

        if inner.runtime.upgrade().is_none() {
            return Err(ReactiveError::RuntimeDropped);
        }

        inner.run();
        Ok(())
    }

    /// Get the number of completed runs.
    pub fn run_count(&self) -> usize {
        self.inner.upgrade().map_or(0, |inner| inner.run_count())
    }

    /// Get the number of signals read during the last run.
    pub fn dependency_count(&self) -> usize {
        self.inner
            .upgrade()
            .map_or(0, |inner| inner.dependency_count())
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
