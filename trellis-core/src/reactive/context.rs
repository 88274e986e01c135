//! Reactive Context
//!
//! The reactive context tracks which subscriber is currently evaluating.
//! This enables automatic dependency tracking: when a reactive property is
//! read, the dependency behind it registers the current subscriber.
//!
//! # Implementation
//!
//! We use a thread-local stack. Entering an evaluation pushes the subscriber,
//! finishing it pops. Nested evaluations (a render reading a computed cell)
//! therefore restore the outer subscriber when the inner one completes.
//!
//! A `None` entry is legal: it suspends tracking for everything evaluated
//! above it, which is how deliberately untracked reads are expressed.

use std::cell::RefCell;
use std::sync::Arc;

use super::subscriber::{Subscriber, SubscriberId};

thread_local! {
    static TARGET_STACK: RefCell<Vec<Option<Arc<dyn Subscriber>>>> = RefCell::new(Vec::new());
}

/// Push a subscriber (or `None` to suspend tracking) onto the stack.
///
/// Prefer [`ReactiveContext::enter`]; this is exposed so an external
/// evaluation context can run code inside a subscriber's tracking scope.
pub fn push_target(target: Option<Arc<dyn Subscriber>>) {
    TARGET_STACK.with(|stack| stack.borrow_mut().push(target));
}

/// Pop the top of the stack, returning what was popped.
pub fn pop_target() -> Option<Option<Arc<dyn Subscriber>>> {
    TARGET_STACK.with(|stack| stack.borrow_mut().pop())
}

/// The subscriber currently evaluating, if any.
pub fn current_target() -> Option<Arc<dyn Subscriber>> {
    TARGET_STACK.with(|stack| stack.borrow().last().cloned().flatten())
}

/// Whether reads performed right now establish dependencies.
pub fn is_tracking() -> bool {
    TARGET_STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
}

/// Run `f` with tracking suspended.
pub fn untracked<T>(f: impl FnOnce() -> T) -> T {
    let _ctx = ReactiveContext::enter(None);
    f()
}

/// Guard that pops the context when dropped.
///
/// This ensures the stack is properly maintained even if the evaluation
/// panics or returns early with an error.
pub struct ReactiveContext {
    subscriber_id: Option<SubscriberId>,
}

impl ReactiveContext {
    /// Enter a tracking scope for `target`.
    ///
    /// The scope is exited when the returned guard is dropped.
    pub fn enter(target: Option<Arc<dyn Subscriber>>) -> Self {
        let subscriber_id = target.as_ref().map(|t| t.id());
        push_target(target);
        Self { subscriber_id }
    }

    /// Depth of the stack, counting suspended entries.
    pub fn depth() -> usize {
        TARGET_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = pop_target();

        // Verify we're popping the right context.
        // This helps catch bugs where contexts are mismatched.
        if let Some(entry) = popped {
            debug_assert_eq!(
                entry.map(|t| t.id()),
                self.subscriber_id,
                "ReactiveContext mismatch"
            );
        }
    }
}
