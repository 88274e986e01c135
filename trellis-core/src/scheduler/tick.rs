//! Tick Boundary
//!
//! Deferred work is collected here and run when the host reaches its next
//! batching boundary, typically once per turn of its event loop. The
//! scheduler defers its flush this way, so every synchronous write made
//! before the boundary collapses into a single flush.

use std::cell::RefCell;
use std::future::Future;

use tokio::sync::oneshot;

use super::Scheduler;
use crate::diagnostics;
use crate::error::Result;

type Task = Box<dyn FnOnce() -> Result<()>>;

thread_local! {
    static TASKS: RefCell<Vec<Task>> = RefCell::new(Vec::new());
}

/// Run `task` at the next boundary.
pub fn next_tick(task: impl FnOnce() -> Result<()> + 'static) {
    TASKS.with(|tasks| tasks.borrow_mut().push(Box::new(task)));
}

/// A future that resolves once the next boundary has been processed.
///
/// Tasks queued before this call, including a pending flush, have run by
/// the time it resolves.
pub fn next_tick_future() -> impl Future<Output = ()> {
    let (tx, rx) = oneshot::channel();
    next_tick(move || {
        // The receiver may have been dropped; nobody is waiting then.
        let _ = tx.send(());
        Ok(())
    });
    async move {
        let _ = rx.await;
    }
}

/// Whether any task is waiting for the boundary.
pub fn has_pending() -> bool {
    TASKS.with(|tasks| !tasks.borrow().is_empty())
}

/// Process one boundary: run every task queued so far.
///
/// Tasks queued while these run wait for the next boundary. Every task runs
/// even if an earlier one fails; the first failure is returned and the rest
/// are reported. A render failure deferred by the scheduler is returned when
/// no task failed. Returns the number of tasks run.
pub fn run_tick() -> Result<usize> {
    let batch = TASKS.with(|tasks| std::mem::take(&mut *tasks.borrow_mut()));
    let count = batch.len();

    let mut first_err = None;
    for task in batch {
        if let Err(err) = task() {
            if first_err.is_none() {
                first_err = Some(err);
            } else {
                diagnostics::report_error(&err, None, "nextTick");
            }
        }
    }

    match first_err.or_else(Scheduler::take_deferred_error) {
        Some(err) => Err(err),
        None => Ok(count),
    }
}

/// Process boundaries until nothing is pending, then surface any deferred
/// render failure. Returns the number of tasks run.
pub fn run_until_idle() -> Result<usize> {
    let mut total = 0;
    while has_pending() {
        total += run_tick()?;
    }
    match Scheduler::take_deferred_error() {
        Some(err) => Err(err),
        None => Ok(total),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReactiveError;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn tasks_run_at_boundary_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            next_tick(move || {
                log.borrow_mut().push(i);
                Ok(())
            });
        }

        assert!(log.borrow().is_empty());
        assert!(has_pending());
        assert_eq!(run_tick().unwrap(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert!(!has_pending());
    }

    #[test]
    fn nested_tasks_wait_for_next_boundary() {
        let ran = Rc::new(Cell::new(false));
        let r = ran.clone();
        next_tick(move || {
            next_tick(move || {
                r.set(true);
                Ok(())
            });
            Ok(())
        });

        run_tick().unwrap();
        assert!(!ran.get());
        run_tick().unwrap();
        assert!(ran.get());
    }

    #[test]
    fn failure_does_not_skip_later_tasks() {
        let ran = Rc::new(Cell::new(false));
        let r = ran.clone();
        next_tick(|| Err(ReactiveError::msg("first")));
        next_tick(move || {
            r.set(true);
            Ok(())
        });

        let err = run_tick().unwrap_err();
        assert_eq!(err.to_string(), "first");
        assert!(ran.get());
    }

    #[tokio::test]
    async fn future_resolves_after_boundary() {
        let fut = next_tick_future();
        assert_eq!(run_until_idle().unwrap(), 1);
        fut.await;
    }
}
