//! Read access shared by signals and computed values.
//!
//! [`Track`] is the common read surface. It is sealed: the set of readable
//! primitives is closed, and code that needs to tell them apart matches on
//! [`ReadSignal`] instead of probing for capabilities.

use super::computed::Computed;
use super::signal::{Signal, SignalId};
use super::subscriber::Subscription;
use crate::error::{ReactiveError, ReactiveResult};

mod sealed {
    pub trait Sealed {}

    impl<T: 'static> Sealed for super::Signal<T> {}
    impl<T: 'static> Sealed for super::Computed<T> {}
    impl<T: 'static> Sealed for super::ReadSignal<T> {}
}

/// A reactive value that can be read and observed.
pub trait Track<T>: sealed::Sealed {
    fn id(&self) -> SignalId;

    /// Read the value, subscribing the running effect.
    fn get(&self) -> T;

    /// Read the value without subscribing.
    fn peek(&self) -> T;

    /// Register a callback invoked with `(new, old)` on every change.
    fn subscribe(&self, callback: Box<dyn Fn(&T, &T)>) -> Subscription;
}

impl<T: Clone + 'static> Track<T> for Signal<T> {
    fn id(&self) -> SignalId {
        Signal::id(self)
    }

    fn get(&self) -> T {
        Signal::get(self)
    }

    fn peek(&self) -> T {
        Signal::peek(self)
    }

    fn subscribe(&self, callback: Box<dyn Fn(&T, &T)>) -> Subscription {
        Signal::subscribe(self, callback)
    }
}

impl<T: Clone + 'static> Track<T> for Computed<T> {
    fn id(&self) -> SignalId {
        Computed::id(self)
    }

    fn get(&self) -> T {
        Computed::get(self)
    }

    fn peek(&self) -> T {
        Computed::peek(self)
    }

    fn subscribe(&self, callback: Box<dyn Fn(&T, &T)>) -> Subscription {
        Computed::subscribe(self, callback)
    }
}

/// Either kind of readable signal.
pub enum ReadSignal<T: 'static> {
    Signal(Signal<T>),
    Computed(Computed<T>),
}

impl<T: Clone + 'static> ReadSignal<T> {
    pub fn is_writable(&self) -> bool {
        matches!(self, Self::Signal(_))
    }

    /// Write through to the underlying signal.
    ///
    /// Fails with [`ReactiveError::WriteToReadonly`] for a computed value.
    pub fn try_set(&self, value: T) -> ReactiveResult<()> {
        match self {
            Self::Signal(signal) => {
                signal.set(value);
                Ok(())
            }
            Self::Computed(computed) => Err(ReactiveError::WriteToReadonly {
                signal: computed.id(),
            }),
        }
    }

    pub fn try_update<F>(&self, f: F) -> ReactiveResult<()>
    where
        F: FnOnce(&T) -> T,
    {
        match self {
            Self::Signal(signal) => {
                signal.update(f);
                Ok(())
            }
            Self::Computed(computed) => Err(ReactiveError::WriteToReadonly {
                signal: computed.id(),
            }),
        }
    }
}

impl<T: Clone + 'static> Track<T> for ReadSignal<T> {
    fn id(&self) -> SignalId {
        match self {
            Self::Signal(signal) => signal.id(),
            Self::Computed(computed) => computed.id(),
        }
    }

    fn get(&self) -> T {
        match self {
            Self::Signal(signal) => signal.get(),
            Self::Computed(computed) => computed.get(),
        }
    }

    fn peek(&self) -> T {
        match self {
            Self::Signal(signal) => signal.peek(),
            Self::Computed(computed) => computed.peek(),
        }
    }

    fn subscribe(&self, callback: Box<dyn Fn(&T, &T)>) -> Subscription {
        match self {
            Self::Signal(signal) => signal.subscribe(callback),
            Self::Computed(computed) => computed.subscribe(callback),
        }
    }
}

impl<T: 'static> Clone for ReadSignal<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Signal(signal) => Self::Signal(signal.clone()),
            Self::Computed(computed) => Self::Computed(computed.clone()),
        }
    }
}

impl<T: 'static> From<Signal<T>> for ReadSignal<T> {
    fn from(signal: Signal<T>) -> Self {
        Self::Signal(signal)
    }
}

impl<T: 'static> From<Computed<T>> for ReadSignal<T> {
    fn from(computed: Computed<T>) -> Self {
        Self::Computed(computed)
    }
}
