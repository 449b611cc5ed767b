//! Error types for the reactive core.
//!
//! Failures raised by user code (effect bodies, derive functions, subscriber
//! callbacks) are panics and propagate untouched to whoever triggered the
//! run. The variants here cover misuse of the primitives themselves.

use thiserror::Error;

use crate::reactive::{SignalId, SubscriberId};

/// Errors reported by the reactive primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A computed value was written to directly.
    #[error("cannot write to read-only signal {signal:?}")]
    WriteToReadonly { signal: SignalId },

    /// An operation that needs a live effect was invoked after disposal.
    #[error("effect {effect:?} has been disposed")]
    UseAfterDispose { effect: SubscriberId },

    /// A computed's derive function tried to recompute the same computed.
    #[error("computed {computed:?} re-entered its own recomputation")]
    ReentrantRecomputation { computed: SignalId },

    /// The runtime owning the primitive no longer exists.
    #[error("the owning runtime has been dropped")]
    RuntimeDropped,
}

/// Convenience alias used across the crate.
pub type ReactiveResult<T> = Result<T, ReactiveError>;
