//! Subscriber types for the reactive system.
//!
//! A Subscriber represents any computation that depends on reactive values.
//! This includes render effects, computed cells and explicit watches.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::dep::Dep;

/// Unique identifier for a subscriber.
///
/// Ids are handed out from a monotonic counter at construction, so comparing
/// two ids tells which subscriber was created first. The scheduler relies on
/// this to run enclosing computations before the ones nested inside them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Take the next id from the process-wide counter.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A computation that can be notified when a dependency changes.
///
/// `Watcher` is the runtime's implementation; the trait is the seam that
/// dependencies and the tracking stack talk to.
pub trait Subscriber: Send + Sync {
    /// Creation-ordered id.
    fn id(&self) -> SubscriberId;

    /// Record that the current evaluation read `dep`.
    fn add_dep(&self, dep: &Arc<Dep>);

    /// One of the subscriber's dependencies changed.
    fn update(&self);
}
