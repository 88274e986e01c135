//! Observable Wrapper
//!
//! Observing a container attaches an [`Observer`] to it and makes it deeply
//! reactive:
//!
//! - every key of a record is converted into a reactive slot that owns its
//!   own dependency, and the key's value is observed in turn;
//! - every element of a sequence is observed, and the sequence's mutating
//!   operations start notifying the observer's dependency.
//!
//! The observer's own dependency stands for "the container itself changed":
//! keys were added or removed, or a sequence was reshaped. Reading a reactive
//! key subscribes to both the key and the value's container dependency.
//!
//! # Limitations
//!
//! Only keys that exist when a record is observed become reactive. Keys added
//! later must go through [`set`] and removed through [`del`]; plain
//! [`Record::set`] on a missing key and [`Record::remove`] are invisible.

use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::diagnostics;
use crate::reactive::Dep;
use crate::value::{Key, Property, ReactiveSlot, Record, Sequence, Slot, Value};

/// Attached once to every observed container.
pub struct Observer {
    dep: Arc<Dep>,

    /// Number of owners that use the container as their root data.
    root_count: AtomicUsize,
}

impl Observer {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            dep: Dep::new(),
            root_count: AtomicUsize::new(0),
        })
    }

    /// The container's own dependency.
    pub fn dep(&self) -> &Arc<Dep> {
        &self.dep
    }

    pub fn root_count(&self) -> usize {
        self.root_count.load(Ordering::SeqCst)
    }

    fn is_root(&self) -> bool {
        self.root_count() > 0
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("dep", &self.dep.id())
            .field("root_count", &self.root_count())
            .finish()
    }
}

thread_local! {
    static SHOULD_OBSERVE: Cell<bool> = const { Cell::new(true) };
}

/// Enable or disable creation of new observers.
///
/// Containers that are already observed keep their observer either way.
pub fn toggle_observing(value: bool) {
    SHOULD_OBSERVE.with(|flag| flag.set(value));
}

pub fn should_observe() -> bool {
    SHOULD_OBSERVE.with(Cell::get)
}

/// Observe a value.
///
/// Returns the existing observer when the container is already observed, a
/// new one when it is an extensible record or sequence, and `None` for
/// primitives, opaque handles and non-extensible containers.
pub fn observe(value: &Value) -> Option<Arc<Observer>> {
    match value {
        Value::Record(record) => observe_record(record),
        Value::Sequence(seq) => observe_sequence(seq),
        _ => None,
    }
}

/// Observe a value that an owner uses as its root data.
pub fn observe_root(value: &Value) -> Option<Arc<Observer>> {
    let ob = observe(value)?;
    ob.root_count.fetch_add(1, Ordering::SeqCst);
    Some(ob)
}

fn observe_record(record: &Record) -> Option<Arc<Observer>> {
    if let Some(ob) = record.observer() {
        return Some(ob);
    }
    if !should_observe() || !record.is_extensible() {
        return None;
    }
    let (ob, created) = record.attach_observer(Observer::new);
    if created {
        // Attached before walking so cycles find the observer.
        for key in record.keys() {
            define_reactive(record, &key, None, ReactiveOptions::default());
        }
    }
    Some(ob)
}

fn observe_sequence(seq: &Sequence) -> Option<Arc<Observer>> {
    if let Some(ob) = seq.observer() {
        return Some(ob);
    }
    if !should_observe() || !seq.is_extensible() {
        return None;
    }
    let (ob, created) = seq.attach_observer(Observer::new);
    if created {
        for item in seq.to_vec() {
            observe(&item);
        }
    }
    Some(ob)
}

/// Options for [`define_reactive`].
#[derive(Clone, Default)]
pub struct ReactiveOptions {
    /// Do not observe the key's value.
    pub shallow: bool,

    /// Called for every write that changes the value, before it lands.
    pub on_set: Option<Arc<dyn Fn() + Send + Sync>>,
}

/// Make one key of a record reactive.
///
/// An existing accessor pair is kept and called through. With `initial`
/// set, the key starts with that value; otherwise the current value is
/// used. Keys that are not configurable are left alone, as are keys that
/// are already reactive.
pub fn define_reactive(record: &Record, key: &str, initial: Option<Value>, options: ReactiveOptions) {
    enum Existing {
        Missing,
        Data(Value),
        Accessor(bool, bool),
    }

    let existing = record.with_properties(|props| match props.get(key) {
        None => Some(Existing::Missing),
        Some(prop) if !prop.configurable => None,
        Some(prop) => match &prop.slot {
            Slot::Reactive(_) => None,
            Slot::Data { value, .. } => Some(Existing::Data(value.clone())),
            Slot::Accessor { get, set } => Some(Existing::Accessor(get.is_some(), set.is_some())),
        },
    });
    let Some(existing) = existing else {
        return;
    };
    if matches!(existing, Existing::Missing) && !record.is_extensible() {
        return;
    }

    // A getter-only accessor keeps no backing value of its own.
    let value = match (initial, existing) {
        (Some(value), _) => value,
        (None, Existing::Data(value)) => value,
        (None, Existing::Accessor(has_get, has_set)) if !has_get || has_set => record.get(key),
        (None, _) => Value::Null,
    };
    let child = if options.shallow { None } else { observe(&value) };

    record.with_properties_mut(|props| {
        let (get, set) = match props.get(key).map(|prop| &prop.slot) {
            Some(Slot::Accessor { get, set }) => (get.clone(), set.clone()),
            Some(Slot::Reactive(_)) => return,
            _ => (None, None),
        };
        let slot = Slot::Reactive(ReactiveSlot {
            value,
            get,
            set,
            dep: Dep::new(),
            child,
            shallow: options.shallow,
            on_set: options.on_set,
        });
        match props.get_mut(key) {
            Some(prop) => prop.slot = slot,
            None => {
                props.insert(key.to_string(), Property { slot, configurable: true });
            }
        }
    });
}

/// Register the current subscriber on every observed element of a
/// sequence, recursing into nested sequences.
pub fn depend_sequence(seq: &Sequence) {
    for item in seq.to_vec() {
        let ob = match &item {
            Value::Record(record) => record.observer(),
            Value::Sequence(inner) => inner.observer(),
            _ => None,
        };
        if let Some(ob) = ob {
            ob.dep().depend();
        }
        if let Value::Sequence(inner) = &item {
            depend_sequence(inner);
        }
    }
}

/// Set a key so that subscribers see it, adding the key if needed.
///
/// - For a sequence and an index, the sequence is padded with `Null` up to
///   the index and the element is replaced through `splice`.
/// - An existing record key is written through its (reactive) setter.
/// - A new key on an observed record becomes reactive and the record's own
///   dependency is notified.
/// - Root data containers and opaque handles are refused with a warning.
///
/// Returns the value that was set.
pub fn set(target: &Value, key: impl Into<Key>, value: Value) -> Value {
    let key = key.into();
    match (target, &key) {
        (Value::Sequence(seq), Key::Index(index)) => {
            seq.pad_with_null(*index);
            seq.splice(*index, 1, vec![value.clone()]);
            value
        }
        (Value::Record(record), Key::Name(name)) => {
            if record.contains_key(name) {
                record.set(name, value.clone());
                return value;
            }
            let ob = record.observer();
            if ob.as_ref().is_some_and(|ob| ob.is_root()) {
                diagnostics::warn(
                    "Avoid adding reactive properties to root data at runtime - declare it upfront.",
                    None,
                );
                return value;
            }
            match ob {
                None => record.set(name, value.clone()),
                // No key can be added; nobody needs to hear about it.
                Some(_) if !record.is_extensible() => {}
                Some(ob) => {
                    define_reactive(record, name, Some(value.clone()), ReactiveOptions::default());
                    ob.dep().notify();
                }
            }
            value
        }
        (Value::Opaque(_), _) => {
            diagnostics::warn("Avoid adding reactive properties to a framework instance.", None);
            value
        }
        (Value::Record(_) | Value::Sequence(_), _) => {
            diagnostics::warn(&format!("Cannot set reactive property with key `{key}` on this container"), None);
            value
        }
        _ => {
            diagnostics::warn("Cannot set reactive property on a null or primitive value", None);
            value
        }
    }
}

/// Delete a key so that subscribers see it.
///
/// Sequence indices are removed through `splice`. Root data containers and
/// opaque handles are refused with a warning; missing keys do nothing.
pub fn del(target: &Value, key: impl Into<Key>) {
    let key = key.into();
    match (target, &key) {
        (Value::Sequence(seq), Key::Index(index)) => {
            seq.splice(*index, 1, Vec::new());
        }
        (Value::Record(record), Key::Name(name)) => {
            let ob = record.observer();
            if ob.as_ref().is_some_and(|ob| ob.is_root()) {
                diagnostics::warn("Avoid deleting properties on root data - just set it to null.", None);
                return;
            }
            if record.remove(name).is_none() {
                return;
            }
            if let Some(ob) = ob {
                ob.dep().notify();
            }
        }
        (Value::Opaque(_), _) => {
            diagnostics::warn("Avoid deleting properties on a framework instance.", None);
        }
        (Value::Record(_) | Value::Sequence(_), _) => {}
        _ => {
            diagnostics::warn("Cannot delete reactive property on a null or primitive value", None);
        }
    }
}
