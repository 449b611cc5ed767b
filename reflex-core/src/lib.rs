//! Reflex Core
//!
//! This crate provides a fine-grained reactive state engine. It implements:
//!
//! - Reactive primitives (signals, computed values, effects)
//! - Automatic dependency tracking with per-run re-tracking
//! - Batched, coalesced change notification
//! - Immediate and deferred effect scheduling
//!
//! Every primitive belongs to a [`Runtime`]. A runtime is confined to the
//! thread that created it; nothing here is `Send`.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives and dependency tracking
//! - `config`: Runtime configuration
//! - `error`: Error types reported by the primitives
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use reflex_core::Runtime;
//!
//! let runtime = Runtime::new();
//!
//! // Create a signal
//! let count = runtime.create_signal(0);
//!
//! // Create a derived value
//! let reader = count.clone();
//! let doubled = runtime.create_computed(move || reader.get() * 2);
//!
//! // Create an effect
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let (reader, sink) = (count.clone(), Rc::clone(&log));
//! let derived = doubled.clone();
//! runtime.create_effect(move |_| {
//!     sink.borrow_mut().push(format!("Count: {}, Doubled: {}", reader.get(), derived.get()));
//! });
//!
//! // Update the signal
//! count.set(5);
//! assert_eq!(log.borrow().last().map(String::as_str), Some("Count: 5, Doubled: 10"));
//! ```

pub mod config;
pub mod error;
pub mod reactive;

pub use config::{EffectScheduler, RuntimeConfig};
pub use error::{ReactiveError, ReactiveResult};
pub use reactive::{Computed, Effect, ReadSignal, Runtime, Signal, Subscription, Track};
