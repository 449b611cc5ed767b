//! Runtime Configuration
//!
//! Behavior that would otherwise be picked from ambient process state is
//! selected here by whoever constructs the [`Runtime`](crate::reactive::Runtime).
//!
//! # Example
//!
//! ```rust
//! use reflex_core::{EffectScheduler, RuntimeConfig};
//!
//! let config = RuntimeConfig::default()
//!     .with_default_scheduler(EffectScheduler::Deferred)
//!     .with_max_deferred_passes(16);
//!
//! assert_eq!(config.default_scheduler, EffectScheduler::Deferred);
//! ```

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How an effect reacts to a dependency notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum EffectScheduler {
    /// Re-run synchronously on every notification.
    #[default]
    Immediate,

    /// Queue a single run, coalescing every notification received until
    /// [`Runtime::run_deferred`](crate::reactive::Runtime::run_deferred) drains
    /// the queue.
    Deferred,
}

/// Configuration for a reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RuntimeConfig {
    /// Scheduler used by effects that do not pick one explicitly.
    pub default_scheduler: EffectScheduler,

    /// Upper bound on queue passes performed by a single `run_deferred` call.
    ///
    /// Deferred effects that keep re-queueing each other would otherwise
    /// never let the drain return.
    pub max_deferred_passes: usize,

    /// Dispose effects created inside another effect's run when the parent
    /// re-runs or is disposed.
    pub own_nested_effects: bool,
}

impl RuntimeConfig {
    pub fn with_default_scheduler(mut self, scheduler: EffectScheduler) -> Self {
        self.default_scheduler = scheduler;
        self
    }

    pub fn with_max_deferred_passes(mut self, passes: usize) -> Self {
        self.max_deferred_passes = passes;
        self
    }

    pub fn with_own_nested_effects(mut self, own: bool) -> Self {
        self.own_nested_effects = own;
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_scheduler: EffectScheduler::Immediate,
            max_deferred_passes: 100,
            own_nested_effects: true,
        }
    }
}
