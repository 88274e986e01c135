//! Computed Cells
//!
//! A computed cell is a lazy watcher. Invalidation only marks it dirty; the
//! value is recomputed the next time someone reads it. A subscriber that
//! reads the cell ends up depending on everything the cell depends on, so it
//! is invalidated together with the cell.

use std::fmt;
use std::sync::Arc;

use super::context;
use super::owner::Owner;
use super::watcher::{WatchSource, Watcher, WatcherOptions};
use crate::error::Result;
use crate::value::Value;

/// A cached derived value.
///
/// # Example
///
/// ```rust
/// use trellis_core::observer;
/// use trellis_core::reactive::Computed;
/// use trellis_core::value::{Record, Value};
///
/// let state = Record::from_iter([("count", 2)]);
/// observer::observe(&Value::from(state.clone()));
///
/// let s = state.clone();
/// let doubled = Computed::new(None, move || {
///     Ok(Value::from(s.get("count").as_f64().unwrap_or(0.0) * 2.0))
/// })
/// .unwrap();
///
/// assert_eq!(doubled.get().unwrap().as_f64(), Some(4.0));
/// state.set("count", Value::from(5));
/// assert_eq!(doubled.get().unwrap().as_f64(), Some(10.0));
/// ```
#[derive(Clone)]
pub struct Computed {
    watcher: Arc<Watcher>,
}

impl Computed {
    pub fn new<F>(owner: Option<Arc<dyn Owner>>, compute: F) -> Result<Self>
    where
        F: Fn() -> Result<Value> + Send + Sync + 'static,
    {
        let options = WatcherOptions {
            lazy: true,
            ..WatcherOptions::default()
        };
        let watcher = Watcher::new(owner, WatchSource::getter(compute), None, options)?;
        Ok(Self { watcher })
    }

    /// Current value, recomputed first if a dependency changed. After
    /// `teardown` the last value is returned as is.
    pub fn get(&self) -> Result<Value> {
        if !self.watcher.is_active() {
            return Ok(self.watcher.value());
        }
        if self.watcher.is_dirty() {
            self.watcher.refresh()?;
        }
        if context::is_tracking() {
            self.watcher.depend();
        }
        Ok(self.watcher.value())
    }

    pub fn is_dirty(&self) -> bool {
        self.watcher.is_dirty()
    }

    pub fn watcher(&self) -> &Arc<Watcher> {
        &self.watcher
    }

    pub fn teardown(&self) {
        self.watcher.teardown();
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.watcher.id())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer;
    use crate::value::Record;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn state() -> Record {
        let record = Record::from_iter([("count", 1)]);
        observer::observe(&Value::from(record.clone()));
        record
    }

    #[test]
    fn computes_lazily_and_caches() {
        let record = state();
        let calls = Arc::new(AtomicI32::new(0));
        let (r, c) = (record.clone(), calls.clone());

        let cell = Computed::new(None, move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(r.get("count"))
        })
        .unwrap();

        // Not computed yet
        assert!(cell.is_dirty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(cell.get().unwrap().as_f64(), Some(1.0));
        assert_eq!(cell.get().unwrap().as_f64(), Some(1.0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn write_marks_dirty_without_recomputing() {
        let record = state();
        let calls = Arc::new(AtomicI32::new(0));
        let (r, c) = (record.clone(), calls.clone());

        let cell = Computed::new(None, move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(r.get("count"))
        })
        .unwrap();
        cell.get().unwrap();

        record.set("count", Value::from(7));
        assert!(cell.is_dirty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(cell.get().unwrap().as_f64(), Some(7.0));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn reader_inherits_cell_dependencies() {
        let record = state();
        let r = record.clone();
        let cell = Computed::new(None, move || Ok(r.get("count"))).unwrap();

        let c = cell.clone();
        let reader = Watcher::effect(move || c.get()).unwrap();

        // The reader depends on `count` through the cell.
        assert_eq!(reader.dependency_count(), 1);
    }

    #[test]
    fn torn_down_cell_stays_detached() {
        let record = state();
        let r = record.clone();
        let cell = Computed::new(None, move || Ok(r.get("count"))).unwrap();
        cell.get().unwrap();

        record.set("count", Value::from(3));
        assert!(cell.is_dirty());
        cell.teardown();

        assert_eq!(cell.get().unwrap().as_f64(), Some(1.0));
        assert_eq!(cell.watcher().dependency_count(), 0);
        assert!(!cell.watcher().is_active());
    }

    #[test]
    fn render_path_failure_propagates() {
        let cell = Computed::new(None, || Err(crate::ReactiveError::msg("bad"))).unwrap();
        assert!(cell.get().is_err());
    }
}
