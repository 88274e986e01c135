//! Trellis Core
//!
//! This crate provides the observer runtime for the Trellis reactive UI
//! framework: the part that decides which computations have to re-run when
//! component state changes. It implements:
//!
//! - Observable records and sequences with deep reactivity
//! - Dependency tracking with per-evaluation pruning of stale edges
//! - Watchers (render effects, computed cells, explicit watches)
//! - A batching scheduler with deterministic ordering and a loop guard
//!
//! Templates, virtual nodes and component lifecycles live elsewhere; they
//! hand this crate tracked functions and receive post-flush hooks.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: Dynamic values, records and sequences
//! - `observer`: Making containers reactive, explicit `set`/`del`
//! - `reactive`: Dependencies, the tracking stack, watchers
//! - `scheduler`: The flush queue and the tick boundary
//! - `config`, `diagnostics`, `error`: Ambient plumbing
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! use trellis_core::observer;
//! use trellis_core::reactive::Watcher;
//! use trellis_core::scheduler::tick;
//! use trellis_core::value::{Record, Value};
//!
//! let state = Record::from_iter([("a", 1), ("b", 2)]);
//! observer::observe(&Value::from(state.clone()));
//!
//! let runs = Arc::new(AtomicUsize::new(0));
//! let (s, r) = (state.clone(), runs.clone());
//! let sum = Watcher::effect(move || {
//!     r.fetch_add(1, Ordering::SeqCst);
//!     let a = s.get("a").as_f64().unwrap_or(0.0);
//!     let b = s.get("b").as_f64().unwrap_or(0.0);
//!     Ok(Value::from(a + b))
//! })
//! .unwrap();
//!
//! state.set("a", Value::from(2));
//! state.set("b", Value::from(3));
//! tick::run_until_idle().unwrap();
//!
//! // Both writes collapse into one re-run.
//! assert_eq!(runs.load(Ordering::SeqCst), 2);
//! assert_eq!(sum.value().as_f64(), Some(5.0));
//! ```

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod observer;
pub mod reactive;
pub mod scheduler;
pub mod value;

pub use error::{ReactiveError, Result};
pub use observer::{del, observe, set};
pub use reactive::{Computed, Watcher, WatcherOptions, WatchSource};
pub use value::{Key, Record, Sequence, Value};
