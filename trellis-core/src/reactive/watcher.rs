//! Watcher Implementation
//!
//! A Watcher is the runtime's subscriber: a re-runnable computation that
//! discovers its dependencies by evaluating a tracked function.
//!
//! # How Watchers Work
//!
//! 1. `evaluate` pushes the watcher onto the tracking stack and runs the
//!    tracked function. Every reactive read reports back through `add_dep`
//!    into the watcher's pending dependency set.
//!
//! 2. When evaluation finishes, dependencies from the previous run that were
//!    not read again are unsubscribed, and the pending set becomes the
//!    active set. A watcher therefore only reacts to what its latest run read.
//!
//! 3. When a dependency changes, `update` queues the watcher with the
//!    scheduler (or runs it on the spot when `sync`, or just marks it dirty
//!    when `lazy`).
//!
//! 4. `run` re-evaluates and calls the callback with the new and old values
//!    when the value changed.
//!
//! # Errors
//!
//! Failures in user watchers are reported through the diagnostics channel
//! and swallowed. Failures on the render path are returned to the caller.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::context::ReactiveContext;
use super::dep::{Dep, DepId};
use super::owner::Owner;
use super::subscriber::{Subscriber, SubscriberId};
use crate::diagnostics;
use crate::error::{ReactiveError, Result};
use crate::scheduler::Scheduler;
use crate::value::Value;

/// The tracked function a watcher evaluates.
pub type Getter = Arc<dyn Fn() -> Result<Value> + Send + Sync>;

/// Called with `(new, old)` when a run produced a changed value.
pub type Callback = Arc<dyn Fn(&Value, &Value) -> Result<()> + Send + Sync>;

/// Called right before the scheduler runs the watcher.
pub type Hook = Arc<dyn Fn() + Send + Sync>;

/// What a watcher evaluates.
#[derive(Clone)]
pub enum WatchSource {
    /// An arbitrary tracked function.
    Getter(Getter),

    /// A dot-delimited path read from a root value, such as `"user.name"`.
    Path { root: Value, path: String },
}

impl WatchSource {
    pub fn getter<F>(f: F) -> Self
    where
        F: Fn() -> Result<Value> + Send + Sync + 'static,
    {
        WatchSource::Getter(Arc::new(f))
    }

    pub fn path(root: Value, path: impl Into<String>) -> Self {
        WatchSource::Path {
            root,
            path: path.into(),
        }
    }
}

/// Construction options.
#[derive(Clone, Default)]
pub struct WatcherOptions {
    /// Do not evaluate at construction; `update` only marks the watcher dirty.
    pub lazy: bool,

    /// Run immediately on `update` instead of queueing.
    pub sync: bool,

    /// Authored by user code: failures are reported instead of propagated.
    pub user: bool,

    /// Track every nested key of the value and always fire the callback.
    pub deep: bool,

    /// The owner's render watcher: the owner gets its `updated` hook after
    /// a flush that ran it.
    pub render: bool,

    /// Run right before the scheduler runs this watcher.
    pub before: Option<Hook>,

    /// Description used in diagnostics. Paths describe themselves.
    pub expression: Option<String>,
}

#[derive(Default)]
struct WatcherState {
    value: Value,
    deps: IndexMap<DepId, Arc<Dep>>,
    new_deps: IndexMap<DepId, Arc<Dep>>,
    dirty: bool,
}

/// A re-runnable computation with creation-ordered id.
pub struct Watcher {
    id: SubscriberId,
    this: Weak<Watcher>,
    owner: Option<Arc<dyn Owner>>,
    expression: String,
    getter: Getter,
    callback: Option<Callback>,
    options: WatcherOptions,
    active: AtomicBool,
    state: Mutex<WatcherState>,
}

impl Watcher {
    /// Create a watcher.
    ///
    /// Unless `lazy`, the source is evaluated once right away to establish
    /// the initial dependencies and cached value. A failing render-path
    /// evaluation is returned as an error.
    pub fn new(
        owner: Option<Arc<dyn Owner>>,
        source: WatchSource,
        callback: Option<Callback>,
        options: WatcherOptions,
    ) -> Result<Arc<Self>> {
        let (getter, expression) = match source {
            WatchSource::Getter(getter) => {
                let expression = options.expression.clone().unwrap_or_default();
                (getter, expression)
            }
            WatchSource::Path { root, path } => {
                let getter = parse_path(root, &path).unwrap_or_else(|| {
                    diagnostics::warn(
                        &format!(
                            "Failed watching path: \"{path}\". Watcher only accepts simple \
                             dot-delimited paths. For full control, use a function instead."
                        ),
                        owner.as_deref(),
                    );
                    Arc::new(|| Ok(Value::Null))
                });
                (getter, path)
            }
        };

        let lazy = options.lazy;
        let watcher = Arc::new_cyclic(|this| Watcher {
            id: SubscriberId::new(),
            this: this.clone(),
            owner,
            expression,
            getter,
            callback,
            options,
            active: AtomicBool::new(true),
            state: Mutex::new(WatcherState {
                dirty: lazy,
                ..WatcherState::default()
            }),
        });

        if !lazy {
            match watcher.evaluate() {
                Ok(value) => watcher.state.lock().value = value,
                Err(err) => {
                    watcher.teardown();
                    return Err(err);
                }
            }
        }
        Ok(watcher)
    }

    /// Create a watcher over a plain closure with default options.
    pub fn effect<F>(f: F) -> Result<Arc<Self>>
    where
        F: Fn() -> Result<Value> + Send + Sync + 'static,
    {
        Self::new(None, WatchSource::getter(f), None, WatcherOptions::default())
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn owner(&self) -> Option<&Arc<dyn Owner>> {
        self.owner.as_ref()
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn is_user(&self) -> bool {
        self.options.user
    }

    pub fn is_render(&self) -> bool {
        self.options.render
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    /// The cached value from the latest evaluation.
    pub fn value(&self) -> Value {
        self.state.lock().value.clone()
    }

    pub fn dependency_count(&self) -> usize {
        self.state.lock().deps.len()
    }

    /// Evaluate the source and re-collect dependencies.
    ///
    /// A torn-down watcher returns its cached value and tracks nothing.
    pub fn evaluate(&self) -> Result<Value> {
        if !self.is_active() {
            return Ok(self.value());
        }
        let target = self
            .this
            .upgrade()
            .map(|this| this as Arc<dyn Subscriber>);
        let ctx = ReactiveContext::enter(target);

        let value = match (self.getter)() {
            Ok(value) => value,
            Err(err) if self.options.user => {
                diagnostics::report_error(
                    &err,
                    self.owner.as_deref(),
                    &format!("getter for watcher \"{}\"", self.expression),
                );
                Value::Null
            }
            Err(err) => {
                drop(ctx);
                self.cleanup_deps();
                return Err(self.render_error(err));
            }
        };

        if self.options.deep {
            traverse(&value);
        }
        drop(ctx);
        self.cleanup_deps();
        Ok(value)
    }

    /// Drop dependencies the latest evaluation did not read again and make
    /// the pending set the active one.
    pub fn cleanup_deps(&self) {
        let stale: Vec<Arc<Dep>> = {
            let mut state = self.state.lock();
            let new_deps = std::mem::take(&mut state.new_deps);
            let old_deps = std::mem::replace(&mut state.deps, new_deps);
            old_deps
                .into_iter()
                .filter(|(id, _)| !state.deps.contains_key(id))
                .map(|(_, dep)| dep)
                .collect()
        };
        for dep in stale {
            dep.unsubscribe(self.id);
        }
    }

    /// Re-evaluate and fire the callback if the value changed.
    ///
    /// Does nothing once torn down. Containers and `deep` watchers always
    /// count as changed, since their contents may have moved under the same
    /// identity.
    pub fn run(&self) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        let value = self.evaluate()?;

        let old = {
            let mut state = self.state.lock();
            let changed = !value.strict_equals(&state.value) || value.is_container() || self.options.deep;
            if !changed {
                return Ok(());
            }
            std::mem::replace(&mut state.value, value.clone())
        };

        if let Some(callback) = &self.callback {
            if let Err(err) = callback(&value, &old) {
                diagnostics::report_error(
                    &err,
                    self.owner.as_deref(),
                    &format!("callback for watcher \"{}\"", self.expression),
                );
            }
        }
        Ok(())
    }

    /// Recompute a lazy watcher's value and clear its dirty flag.
    pub fn refresh(&self) -> Result<()> {
        let value = self.evaluate()?;
        let mut state = self.state.lock();
        state.value = value;
        state.dirty = false;
        Ok(())
    }

    /// Register the current subscriber on all of this watcher's
    /// dependencies, so that it reacts to whatever this watcher reacts to.
    pub fn depend(&self) {
        let deps: Vec<Arc<Dep>> = self.state.lock().deps.values().cloned().collect();
        for dep in deps {
            dep.depend();
        }
    }

    /// Unsubscribe from every dependency and stop reacting. Idempotent.
    pub fn teardown(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        let deps: Vec<Arc<Dep>> = {
            let mut state = self.state.lock();
            state.new_deps.clear();
            std::mem::take(&mut state.deps).into_values().collect()
        };
        for dep in deps {
            dep.unsubscribe(self.id);
        }
        tracing::trace!(watcher = %self.id, "watcher torn down");
    }

    pub(crate) fn call_before(&self) {
        if let Some(before) = &self.options.before {
            before();
        }
    }

    fn render_error(&self, err: ReactiveError) -> ReactiveError {
        ReactiveError::Render {
            owner: self.owner_name(),
            expression: self.expression.clone(),
            source: Box::new(err),
        }
    }

    pub(crate) fn owner_name(&self) -> String {
        self.owner
            .as_ref()
            .map(|o| o.name())
            .unwrap_or_else(|| "<root>".to_string())
    }
}

impl Subscriber for Watcher {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn add_dep(&self, dep: &Arc<Dep>) {
        let subscribe = {
            let mut state = self.state.lock();
            if state.new_deps.contains_key(&dep.id()) {
                return;
            }
            state.new_deps.insert(dep.id(), dep.clone());
            !state.deps.contains_key(&dep.id())
        };
        if subscribe {
            if let Some(this) = self.this.upgrade() {
                dep.subscribe(this);
            }
        }
    }

    fn update(&self) {
        if self.options.lazy {
            self.state.lock().dirty = true;
        } else if self.options.sync {
            // User failures were already reported; what is left is fatal.
            if let Err(err) = self.run() {
                Scheduler::defer_error(err);
            }
        } else if let Some(this) = self.this.upgrade() {
            Scheduler::enqueue(&this);
        }
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.id)
            .field("expression", &self.expression)
            .field("active", &self.is_active())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

/// Build a getter for a dot-delimited path. Returns `None` when the path
/// contains anything besides word characters, `$` and dots.
fn parse_path(root: Value, path: &str) -> Option<Getter> {
    let valid = path
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '$' || c == '.');
    if !valid {
        return None;
    }
    let segments: Vec<String> = path.split('.').map(String::from).collect();

    Some(Arc::new(move || {
        let mut current = root.clone();
        for segment in &segments {
            current = match &current {
                Value::Record(record) => record.get(segment),
                Value::Sequence(seq) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| seq.get(i))
                    .unwrap_or_default(),
                _ => return Ok(Value::Null),
            };
        }
        Ok(current)
    }))
}

/// Read every nested reactive key of `value` so the current subscriber
/// depends on all of it.
fn traverse(value: &Value) {
    let mut seen = HashSet::new();
    traverse_inner(value, &mut seen);
}

fn traverse_inner(value: &Value, seen: &mut HashSet<DepId>) {
    match value {
        Value::Record(record) => {
            if record.is_frozen() {
                return;
            }
            if let Some(ob) = record.observer() {
                if !seen.insert(ob.dep().id()) {
                    return;
                }
            }
            for key in record.keys() {
                traverse_inner(&record.get(&key), seen);
            }
        }
        Value::Sequence(seq) => {
            if seq.is_frozen() {
                return;
            }
            if let Some(ob) = seq.observer() {
                if !seen.insert(ob.dep().id()) {
                    return;
                }
            }
            for item in seq.to_vec() {
                traverse_inner(&item, seen);
            }
        }
        _ => {}
    }
}
