//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computed values,
//! and effects, all owned by a [`Runtime`].
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! while an effect is running, the signal automatically registers that effect
//! as a subscriber. When the signal's value changes, every subscriber is
//! notified.
//!
//! ## Computed Values
//!
//! A Computed is a read-only signal derived from other signals. It recomputes
//! as soon as a dependency changes and only propagates when the result
//! differs from the previous one.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects are used to synchronize reactive state with
//! external systems, such as rendering or logging.
//!
//! ## Batches
//!
//! [`Runtime::batch`] groups writes so that each changed signal notifies once,
//! after the outermost batch closes.
//!
//! # Implementation Notes
//!
//! Dependencies are detected automatically through a tracking stack owned by
//! the runtime. When a signal is read, it checks the top of the stack and, if
//! an effect is there, the two are linked in both directions. Effects re-link
//! on every run, so dependencies always reflect the most recent run.

mod batch;
mod computed;
mod context;
mod effect;
mod runtime;
mod signal;
mod subscriber;
mod traits;

pub use computed::{Computed, ComputedOptions};
pub use effect::{Effect, EffectContext, EffectOptions};
pub use runtime::{Runtime, RuntimeStats};
pub use signal::{Signal, SignalId, SignalOptions};
pub use subscriber::{SubscriberId, Subscription};
pub use traits::{ReadSignal, Track};
