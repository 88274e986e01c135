//! Dependency Implementation
//!
//! A `Dep` is the subject behind one reactive property or one observed
//! container. Subscribers that read it during evaluation are recorded here,
//! and a write notifies every one of them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::context;
use super::subscriber::{Subscriber, SubscriberId};
use crate::config;

/// Unique identifier for a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DepId(u64);

impl DepId {
    /// Generate a new unique dependency ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for DepId {
    fn default() -> Self {
        Self::new()
    }
}

/// A reactive dependency.
pub struct Dep {
    id: DepId,

    /// Current subscribers, in subscription order. Keyed by id so that a
    /// subscriber is present at most once.
    subscribers: Mutex<IndexMap<SubscriberId, Arc<dyn Subscriber>>>,
}

impl Dep {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: DepId::new(),
            subscribers: Mutex::new(IndexMap::new()),
        })
    }

    pub fn id(&self) -> DepId {
        self.id
    }

    /// Add a subscriber. Adding one that is already present does nothing.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) {
        self.subscribers
            .lock()
            .entry(subscriber.id())
            .or_insert(subscriber);
    }

    /// Remove a subscriber.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.lock().shift_remove(&id);
    }

    /// Register the active subscriber, if there is one.
    pub fn depend(self: &Arc<Self>) {
        if let Some(target) = context::current_target() {
            target.add_dep(self);
        }
    }

    /// Notify every subscriber that this dependency changed.
    pub fn notify(&self) {
        // Snapshot first: updates may subscribe or unsubscribe re-entrantly.
        let mut subscribers: Vec<Arc<dyn Subscriber>> =
            self.subscribers.lock().values().cloned().collect();

        if !config::async_flush() {
            // The scheduler does not sort when flushing synchronously.
            subscribers.sort_by_key(|s| s.id());
        }

        for subscriber in subscribers {
            subscriber.update();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn has_subscriber(&self, id: SubscriberId) -> bool {
        self.subscribers.lock().contains_key(&id)
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.id)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
