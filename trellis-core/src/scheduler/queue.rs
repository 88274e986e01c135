//! Update Scheduler
//!
//! The scheduler collects invalidated watchers and runs each of them once
//! per flush.
//!
//! # Algorithm
//!
//! 1. `enqueue` adds a watcher unless it is already waiting in this cycle,
//!    and defers one flush to the next tick boundary.
//! 2. `flush` sorts the queue by watcher id. Ids grow in creation order and
//!    enclosing computations are always created before the ones nested inside
//!    them, so this runs parents before children and data before views.
//! 3. Running a watcher may enqueue more watchers. During a flush they are
//!    inserted in id order among the entries not yet run, never before the
//!    cursor.
//! 4. A watcher that keeps re-queueing itself is stopped by the loop guard,
//!    which aborts the flush.
//! 5. The state is reset, then owner hooks run from a snapshot of the queue.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::tick;
use crate::config;
use crate::diagnostics;
use crate::error::{ReactiveError, Result};
use crate::reactive::{Owner, SubscriberId, Watcher};

#[derive(Default)]
struct SchedulerState {
    queue: Vec<Arc<Watcher>>,
    activated: Vec<Arc<dyn Owner>>,
    /// Watchers queued and not yet run in this cycle.
    has: HashSet<SubscriberId>,
    /// Re-entrance count per watcher within the current flush.
    circular: HashMap<SubscriberId, usize>,
    /// A flush has been requested.
    waiting: bool,
    flushing: bool,
    index: usize,
}

thread_local! {
    static STATE: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());

    /// A render failure raised outside a batched flush, waiting to be
    /// returned from the next flush or tick.
    static DEFERRED: RefCell<Option<ReactiveError>> = const { RefCell::new(None) };
}

/// Outcome of one flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Watchers in the order they ran.
    pub ran: Vec<SubscriberId>,

    /// The watcher that tripped the loop guard, if the flush was aborted.
    pub aborted_by: Option<SubscriberId>,
}

/// The batching scheduler for the current execution context.
pub struct Scheduler;

impl Scheduler {
    /// Queue a watcher for the next flush.
    ///
    /// A watcher already waiting in this cycle is skipped. The first enqueue
    /// of a cycle requests exactly one flush.
    pub fn enqueue(watcher: &Arc<Watcher>) {
        let id = watcher.id();
        let request_flush = STATE.with(|state| {
            let mut state = state.borrow_mut();
            if !state.has.insert(id) {
                return false;
            }
            if !state.flushing {
                state.queue.push(watcher.clone());
            } else {
                // Already past its id: it runs right after the current one.
                let mut pos = state.queue.len();
                while pos > state.index + 1 && state.queue[pos - 1].id() > id {
                    pos -= 1;
                }
                state.queue.insert(pos, watcher.clone());
            }
            if state.waiting {
                return false;
            }
            state.waiting = true;
            true
        });

        if !request_flush {
            return;
        }
        if config::async_flush() {
            tick::next_tick(|| Scheduler::flush().map(|_| ()));
        } else if let Err(err) = Self::flush() {
            Self::defer_error(err);
        }
    }

    /// Hold a render failure that happened where no caller can receive it,
    /// such as inside a write. Only the first one is kept; later ones are
    /// reported.
    pub(crate) fn defer_error(err: ReactiveError) {
        let rejected = DEFERRED.with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.is_some() {
                return Some(err);
            }
            tracing::debug!(error = %err, "render failure deferred to next flush");
            *slot = Some(err);
            None
        });
        if let Some(err) = rejected {
            diagnostics::report_error(&err, None, "render");
        }
    }

    /// Take the deferred render failure, if any.
    pub fn take_deferred_error() -> Option<ReactiveError> {
        DEFERRED.with(|slot| slot.borrow_mut().take())
    }

    /// Queue an owner whose `activated` hook should run after the flush.
    pub fn queue_activated(owner: Arc<dyn Owner>) {
        STATE.with(|state| state.borrow_mut().activated.push(owner));
    }

    /// Run every queued watcher.
    ///
    /// A render-path failure stops the flush, resets the scheduler and is
    /// returned, as is one deferred from a sync watcher or a synchronous
    /// flush. Calling this while a flush is in progress does nothing.
    pub fn flush() -> Result<FlushReport> {
        let pending = STATE.with(|state| {
            let mut state = state.borrow_mut();
            if state.flushing {
                return None;
            }
            state.flushing = true;
            state.queue.sort_by_key(|w| w.id());
            Some(state.queue.len())
        });
        let Some(pending) = pending else {
            return Ok(FlushReport::default());
        };
        tracing::debug!(pending, "flushing scheduler queue");

        let max_update_count = config::get().max_update_count;
        let mut report = FlushReport::default();
        let mut fatal = None;
        let mut index = 0;

        // The queue may grow while it is being flushed.
        while let Some(watcher) = STATE.with(|state| {
            let mut state = state.borrow_mut();
            state.index = index;
            state.queue.get(index).cloned()
        }) {
            watcher.call_before();
            let id = watcher.id();
            STATE.with(|state| state.borrow_mut().has.remove(&id));

            report.ran.push(id);
            if let Err(err) = watcher.run() {
                fatal = Some(err);
                break;
            }

            let runaway = STATE.with(|state| {
                let mut state = state.borrow_mut();
                if !state.has.contains(&id) {
                    return false;
                }
                let count = state.circular.entry(id).or_insert(0);
                *count += 1;
                *count > max_update_count
            });
            if runaway {
                Self::warn_runaway(&watcher);
                report.aborted_by = Some(id);
                break;
            }
            index += 1;
        }

        // Snapshot before resetting so the next cycle starts clean.
        let (queue, activated) = STATE.with(|state| {
            let mut state = state.borrow_mut();
            let queue = std::mem::take(&mut state.queue);
            let activated = std::mem::take(&mut state.activated);
            *state = SchedulerState::default();
            (queue, activated)
        });

        if let Some(err) = fatal {
            tracing::debug!(error = %err, "flush aborted by render failure");
            return Err(err);
        }

        for owner in activated {
            owner.activated();
        }
        // Children were created after their parents; notify them first.
        for watcher in queue.iter().rev() {
            if !watcher.is_render() {
                continue;
            }
            if let Some(owner) = watcher.owner() {
                if owner.is_mounted() && !owner.is_destroyed() {
                    owner.updated();
                }
            }
        }

        tracing::debug!(ran = report.ran.len(), aborted = report.aborted_by.is_some(), "flush complete");
        match Self::take_deferred_error() {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    pub fn is_flushing() -> bool {
        STATE.with(|state| state.borrow().flushing)
    }

    /// Number of watchers in the queue, including ones already run in the
    /// current flush.
    pub fn pending() -> usize {
        STATE.with(|state| state.borrow().queue.len())
    }

    fn warn_runaway(watcher: &Watcher) {
        let location = if watcher.is_user() {
            format!("in watcher with expression \"{}\"", watcher.expression())
        } else {
            "in a component render function".to_string()
        };
        let err = ReactiveError::InfiniteLoop {
            subscriber: watcher.id(),
            location,
        };
        diagnostics::warn(&err.to_string(), watcher.owner().map(|o| o.as_ref()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::observer;
    use crate::reactive::{WatchSource, WatcherOptions};
    use crate::value::{Record, Value};
    use parking_lot::Mutex;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Arc<Mutex<Vec<String>>>;

    struct TestOwner {
        name: &'static str,
        mounted: bool,
        log: Log,
    }

    impl Owner for TestOwner {
        fn name(&self) -> String {
            self.name.to_string()
        }

        fn is_mounted(&self) -> bool {
            self.mounted
        }

        fn updated(&self) {
            self.log.lock().push(format!("updated {}", self.name));
        }

        fn activated(&self) {
            self.log.lock().push(format!("activated {}", self.name));
        }
    }

    fn state(pairs: Vec<(&str, Value)>) -> Record {
        let record: Record = pairs.into_iter().collect();
        observer::observe(&Value::from(record.clone()));
        record
    }

    /// A watcher that logs `label` every time it runs and reads `key`.
    fn logging(record: &Record, key: &'static str, label: &'static str, log: &Log) -> Arc<Watcher> {
        let (r, log) = (record.clone(), log.clone());
        Watcher::effect(move || {
            log.lock().push(label.to_string());
            Ok(r.get(key))
        })
        .unwrap()
    }

    fn render(record: &Record, owner: Arc<dyn Owner>) -> Arc<Watcher> {
        let r = record.clone();
        Watcher::new(
            Some(owner),
            WatchSource::getter(move || Ok(r.get("a"))),
            None,
            WatcherOptions {
                render: true,
                ..WatcherOptions::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn writes_in_one_tick_share_a_flush() {
        let log = Log::default();
        let record = state(vec![("a", Value::from(1)), ("b", Value::from(1))]);
        let (r, l) = (record.clone(), log.clone());
        let watcher = Watcher::effect(move || {
            let sum = r.get("a").as_f64().unwrap_or(0.0) + r.get("b").as_f64().unwrap_or(0.0);
            l.lock().push(format!("sum {sum}"));
            Ok(Value::from(sum))
        })
        .unwrap();

        record.set("a", Value::from(2));
        record.set("b", Value::from(3));
        record.set("a", Value::from(4));
        assert_eq!(Scheduler::pending(), 1);
        assert_eq!(tick::run_until_idle().unwrap(), 1);

        assert_eq!(*log.lock(), vec!["sum 2", "sum 7"]);
        assert_eq!(watcher.value().as_f64(), Some(7.0));
    }

    #[test]
    fn flush_runs_in_creation_order() {
        let log = Log::default();
        let record = state(vec![("p", Value::from(1)), ("c", Value::from(1))]);
        let parent = logging(&record, "p", "parent", &log);
        let child = logging(&record, "c", "child", &log);
        log.lock().clear();

        record.set("c", Value::from(2));
        record.set("p", Value::from(2));
        let report = Scheduler::flush().unwrap();

        assert_eq!(report.ran, vec![parent.id(), child.id()]);
        assert_eq!(*log.lock(), vec!["parent", "child"]);
    }

    #[test]
    fn watchers_enqueued_mid_flush_run_in_the_same_flush() {
        let log = Log::default();
        let record = state(vec![("x", Value::from(10)), ("y", Value::from(1))]);
        let reader = logging(&record, "x", "reader", &log);
        let r = record.clone();
        let writer = Watcher::effect(move || {
            let y = r.get("y").as_f64().unwrap_or(0.0);
            r.set("x", Value::from(y * 10.0));
            Ok(Value::from(y))
        })
        .unwrap();
        log.lock().clear();

        record.set("y", Value::from(2));
        let report = Scheduler::flush().unwrap();

        // The reader is older but was queued behind the cursor.
        assert_eq!(report.ran, vec![writer.id(), reader.id()]);
        assert_eq!(record.get("x").as_f64(), Some(20.0));
        tick::run_until_idle().unwrap();
        assert_eq!(*log.lock(), vec!["reader"]);
    }

    #[test]
    fn duplicate_notifications_run_once() {
        let log = Log::default();
        let record = state(vec![("a", Value::from(1))]);
        let _watcher = logging(&record, "a", "run", &log);

        for i in 2..6 {
            record.set("a", Value::from(i));
        }
        tick::run_until_idle().unwrap();
        assert_eq!(log.lock().len(), 2);
    }

    #[test]
    fn loop_guard_aborts_runaway_watcher() {
        config::update(|cfg| cfg.max_update_count = 3);
        let warnings = Rc::new(RefCell::new(Vec::new()));
        let sink = warnings.clone();
        diagnostics::set_warn_handler(move |msg, _| sink.borrow_mut().push(msg.to_string()));

        let record = state(vec![("n", Value::from(0))]);
        let r = record.clone();
        let watcher = Watcher::new(
            None,
            WatchSource::getter(move || {
                let n = r.get("n").as_f64().unwrap_or(0.0);
                r.set("n", Value::from(n + 1.0));
                Ok(Value::from(n))
            }),
            None,
            WatcherOptions {
                user: true,
                expression: Some("n".to_string()),
                ..WatcherOptions::default()
            },
        )
        .unwrap();

        let report = Scheduler::flush().unwrap();
        assert_eq!(report.aborted_by, Some(watcher.id()));
        assert_eq!(report.ran.len(), 4);
        assert!(warnings.borrow()[0].contains("infinite update loop in watcher with expression \"n\""));

        assert!(!Scheduler::is_flushing());
        assert_eq!(Scheduler::pending(), 0);

        watcher.teardown();
        diagnostics::clear_handlers();
        config::set(Config::default());
    }

    #[test]
    fn owner_hooks_run_after_flush() {
        let log = Log::default();
        let record = state(vec![("a", Value::from(1))]);
        let parent = TestOwner {
            name: "parent",
            mounted: true,
            log: log.clone(),
        };
        let child = TestOwner {
            name: "child",
            mounted: true,
            log: log.clone(),
        };
        let unmounted = TestOwner {
            name: "unmounted",
            mounted: false,
            log: log.clone(),
        };
        let _p = render(&record, Arc::new(parent));
        let _c = render(&record, Arc::new(child));
        let _u = render(&record, Arc::new(unmounted));

        Scheduler::queue_activated(Arc::new(TestOwner {
            name: "kept-alive",
            mounted: true,
            log: log.clone(),
        }));
        record.set("a", Value::from(2));
        tick::run_until_idle().unwrap();

        assert_eq!(
            *log.lock(),
            vec!["activated kept-alive", "updated child", "updated parent"]
        );
    }

    #[test]
    fn before_hook_runs_before_each_run() {
        let log = Log::default();
        let record = state(vec![("a", Value::from(1))]);
        let (r, l1, l2) = (record.clone(), log.clone(), log.clone());
        let _watcher = Watcher::new(
            None,
            WatchSource::getter(move || {
                l1.lock().push("run".to_string());
                Ok(r.get("a"))
            }),
            None,
            WatcherOptions {
                before: Some(Arc::new(move || {
                    // A nested flush request is ignored.
                    let nested = Scheduler::flush().map(|report| report.ran.len());
                    l2.lock().push(format!("before {}", nested.unwrap_or(usize::MAX)));
                })),
                ..WatcherOptions::default()
            },
        )
        .unwrap();

        record.set("a", Value::from(2));
        tick::run_until_idle().unwrap();
        assert_eq!(*log.lock(), vec!["run", "before 0", "run"]);
    }

    #[test]
    fn loop_guard_names_render_functions() {
        config::update(|cfg| cfg.max_update_count = 2);
        let warnings = Rc::new(RefCell::new(Vec::new()));
        let sink = warnings.clone();
        diagnostics::set_warn_handler(move |msg, _| sink.borrow_mut().push(msg.to_string()));

        let record = state(vec![("n", Value::from(0))]);
        let r = record.clone();
        let watcher = Watcher::effect(move || {
            let n = r.get("n").as_f64().unwrap_or(0.0);
            r.set("n", Value::from(n + 1.0));
            Ok(Value::from(n))
        })
        .unwrap();

        let report = Scheduler::flush().unwrap();
        assert_eq!(report.aborted_by, Some(watcher.id()));
        assert!(warnings.borrow()[0].contains("infinite update loop in a component render function"));

        watcher.teardown();
        diagnostics::clear_handlers();
        config::set(Config::default());
    }

    #[test]
    fn synchronous_flush_defers_render_failure() {
        config::update(|cfg| cfg.async_flush = false);
        let reported = Rc::new(RefCell::new(0));
        let sink = reported.clone();
        diagnostics::set_error_handler(move |_, _, _| *sink.borrow_mut() += 1);

        let record = state(vec![("fail", Value::from(false))]);
        let r = record.clone();
        let _render = Watcher::effect(move || match r.get("fail").as_bool() {
            Some(true) => Err(ReactiveError::msg("boom")),
            _ => Ok(Value::Null),
        })
        .unwrap();

        record.set("fail", Value::from(true));
        assert!(!Scheduler::is_flushing());

        let err = tick::run_until_idle().unwrap_err();
        assert!(matches!(err, ReactiveError::Render { .. }));
        assert_eq!(*reported.borrow(), 0);
        assert!(Scheduler::take_deferred_error().is_none());

        diagnostics::clear_handlers();
        config::set(Config::default());
    }

    #[test]
    fn sync_config_flushes_on_enqueue() {
        config::update(|cfg| cfg.async_flush = false);
        let log = Log::default();
        let record = state(vec![("a", Value::from(1))]);
        let _watcher = logging(&record, "a", "run", &log);

        record.set("a", Value::from(2));
        assert_eq!(log.lock().len(), 2);
        assert!(!tick::has_pending());

        config::set(Config::default());
    }

    #[test]
    fn render_failure_aborts_and_resets() {
        let log = Log::default();
        let record = state(vec![("a", Value::from(1)), ("fail", Value::from(false))]);
        let r = record.clone();
        let _broken = Watcher::effect(move || {
            let value = r.get("a");
            if r.get("fail").as_bool() == Some(true) {
                return Err(ReactiveError::msg("boom"));
            }
            Ok(value)
        })
        .unwrap();
        let _later = logging(&record, "a", "later", &log);
        log.lock().clear();

        record.set("fail", Value::from(true));
        record.set("a", Value::from(2));
        let err = tick::run_until_idle().unwrap_err();

        assert!(matches!(err, ReactiveError::Render { .. }));
        assert!(log.lock().is_empty());
        assert!(!Scheduler::is_flushing());
        assert_eq!(Scheduler::pending(), 0);

        // The next cycle starts clean.
        record.set("fail", Value::from(false));
        record.set("a", Value::from(3));
        tick::run_until_idle().unwrap();
        assert_eq!(*log.lock(), vec!["later"]);
    }
}
