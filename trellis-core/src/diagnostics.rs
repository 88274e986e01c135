//! Diagnostics
//!
//! Warnings and caught errors flow through this channel. Hosts can install
//! their own handlers (for example to surface them in developer tooling);
//! otherwise they are emitted as `tracing` events.

use std::cell::RefCell;
use std::sync::Arc;

use crate::config;
use crate::error::ReactiveError;
use crate::reactive::Owner;

/// Receives a warning message and the name of the owner it concerns.
pub type WarnHandler = Arc<dyn Fn(&str, Option<&str>)>;

/// Receives a caught error, the owner name and where it was caught.
pub type ErrorHandler = Arc<dyn Fn(&ReactiveError, Option<&str>, &str)>;

#[derive(Default)]
struct Handlers {
    warn: Option<WarnHandler>,
    error: Option<ErrorHandler>,
}

thread_local! {
    static HANDLERS: RefCell<Handlers> = RefCell::new(Handlers::default());
}

/// Install a warning handler for the current execution context.
pub fn set_warn_handler(handler: impl Fn(&str, Option<&str>) + 'static) {
    HANDLERS.with(|h| h.borrow_mut().warn = Some(Arc::new(handler)));
}

/// Install an error handler for the current execution context.
pub fn set_error_handler(handler: impl Fn(&ReactiveError, Option<&str>, &str) + 'static) {
    HANDLERS.with(|h| h.borrow_mut().error = Some(Arc::new(handler)));
}

/// Remove both handlers.
pub fn clear_handlers() {
    HANDLERS.with(|h| *h.borrow_mut() = Handlers::default());
}

/// Emit a warning.
pub fn warn(message: &str, owner: Option<&dyn Owner>) {
    let name = owner.map(|o| o.name());
    // Clone the handler out so it may install handlers itself.
    let handler = HANDLERS.with(|h| h.borrow().warn.clone());
    match handler {
        Some(handler) => handler(message, name.as_deref()),
        None if !config::get().silent => {
            tracing::warn!(owner = name.as_deref().unwrap_or("<root>"), "{message}");
        }
        None => {}
    }
}

/// Report an error that was caught at a subscriber boundary.
pub fn report_error(err: &ReactiveError, owner: Option<&dyn Owner>, info: &str) {
    let name = owner.map(|o| o.name());
    let handler = HANDLERS.with(|h| h.borrow().error.clone());
    match handler {
        Some(handler) => handler(err, name.as_deref(), info),
        None => {
            tracing::error!(
                owner = name.as_deref().unwrap_or("<root>"),
                info,
                error = %err,
                "error caught by observer runtime"
            );
        }
    }
}
