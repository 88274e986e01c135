//! Reactive Primitives
//!
//! This module implements dependency tracking: dependencies, the tracking
//! stack, and the watchers that subscribe to them.
//!
//! # Concepts
//!
//! ## Dependencies
//!
//! A [`Dep`] stands for one reactive key or one observed container. Reading
//! the key while a watcher evaluates subscribes that watcher; writing the key
//! notifies every subscriber.
//!
//! ## Watchers
//!
//! A [`Watcher`] is a re-runnable computation: a render effect, a computed
//! cell, or an explicit watch with a callback. Each one has a creation-ordered
//! id that the scheduler uses to run enclosing computations first.
//!
//! ## Tracking Context
//!
//! The tracking stack names the watcher that is evaluating right now. Reads
//! made while the stack is empty (or suspended) create no dependency.
//!
//! # Implementation Notes
//!
//! The tracking stack is thread-local, the same approach taken by other
//! fine-grained reactive runtimes. The dependency graph itself uses
//! `parking_lot` locks and is never locked while user code runs.

pub mod context;
mod computed;
mod dep;
mod owner;
mod subscriber;
mod watcher;

pub use computed::Computed;
pub use context::{current_target, is_tracking, pop_target, push_target, untracked, ReactiveContext};
pub use dep::{Dep, DepId};
pub use owner::Owner;
pub use subscriber::{Subscriber, SubscriberId};
pub use watcher::{Callback, Getter, Hook, WatchSource, Watcher, WatcherOptions};
