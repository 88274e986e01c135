//! Owners of subscribers.
//!
//! An owner is whatever constructed a watcher: usually a component instance
//! managed by the lifecycle layer. The runtime only needs a name for
//! diagnostics, its liveness, and two post-flush hooks.

/// External collaborator that owns watchers.
pub trait Owner: Send + Sync {
    /// Human-readable name used in diagnostics.
    fn name(&self) -> String;

    /// Whether the owner has been mounted.
    fn is_mounted(&self) -> bool {
        true
    }

    /// Whether the owner has been destroyed.
    fn is_destroyed(&self) -> bool {
        false
    }

    /// Called after a flush re-ran the owner's render watcher.
    fn updated(&self) {}

    /// Called after a flush for owners queued with
    /// [`Scheduler::queue_activated`](crate::scheduler::Scheduler::queue_activated).
    fn activated(&self) {}
}
