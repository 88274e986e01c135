//! Scheduling
//!
//! This module batches re-execution of invalidated watchers.
//!
//! # Overview
//!
//! Writes never re-run computations directly. A write notifies a dependency,
//! the dependency's watchers enqueue themselves, and the queue is flushed once
//! at the next tick boundary:
//!
//! - Any number of writes before the boundary collapse into one run per
//!   watcher, which sees only the final values.
//! - Within one flush, watchers run in ascending id order.
//! - Each flush is independent of the previous one; there is no ordering
//!   guarantee across flushes.
//!
//! # State Machine
//!
//! Idle -> Queuing (first enqueue, flush requested) -> Flushing (cursor
//! advances, queue may grow) -> Draining (owner hooks from a snapshot) -> Idle.
//!
//! The host drives the boundary with [`tick::run_tick`]. With
//! [`Config::async_flush`](crate::config::Config::async_flush) turned off,
//! enqueueing flushes on the spot instead.

mod queue;
pub mod tick;

pub use queue::{FlushReport, Scheduler};
