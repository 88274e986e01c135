//! Keyed records.
//!
//! A record maps string keys to values, in insertion order. Each key lives in
//! a slot: plain data, a host-defined accessor pair, or (after observation)
//! a reactive slot that owns the key's dependency.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::Value;
use crate::observer::{self, Observer};
use crate::reactive::{context, Dep};

/// Host-defined getter for an accessor slot.
pub type AccessorGet = Arc<dyn Fn() -> Value + Send + Sync>;

/// Host-defined setter for an accessor slot.
pub type AccessorSet = Arc<dyn Fn(Value) + Send + Sync>;

/// Attributes of a slot defined through [`Record::define_property`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyFlags {
    /// The slot may be redefined or removed.
    pub configurable: bool,
    /// The slot's value may be replaced.
    pub writable: bool,
}

impl Default for PropertyFlags {
    fn default() -> Self {
        Self {
            configurable: true,
            writable: true,
        }
    }
}

pub(crate) enum Slot {
    Data { value: Value, writable: bool },
    Accessor { get: Option<AccessorGet>, set: Option<AccessorSet> },
    Reactive(ReactiveSlot),
}

/// A key that has been made reactive.
pub(crate) struct ReactiveSlot {
    /// Backing store, used when there is no host getter.
    pub(crate) value: Value,
    pub(crate) get: Option<AccessorGet>,
    pub(crate) set: Option<AccessorSet>,
    pub(crate) dep: Arc<Dep>,
    /// Observer of the current value, when it is a container.
    pub(crate) child: Option<Arc<Observer>>,
    pub(crate) shallow: bool,
    pub(crate) on_set: Option<Arc<dyn Fn() + Send + Sync>>,
}

pub(crate) struct Property {
    pub(crate) slot: Slot,
    pub(crate) configurable: bool,
}

impl Property {
    pub(crate) fn data(value: Value) -> Self {
        Self {
            slot: Slot::Data {
                value,
                writable: true,
            },
            configurable: true,
        }
    }
}

struct RecordInner {
    properties: RwLock<IndexMap<String, Property>>,
    extensible: AtomicBool,
    observer: OnceLock<Arc<Observer>>,
}

/// A keyed container handle. Clones share the same record.
#[derive(Clone)]
pub struct Record(Arc<RecordInner>);

enum Read {
    Getter(Option<AccessorGet>),
    Reactive {
        value: Value,
        get: Option<AccessorGet>,
        dep: Arc<Dep>,
        child: Option<Arc<Observer>>,
    },
}

enum Write {
    Insert,
    Store,
    Setter(AccessorSet),
    Reactive {
        old: Value,
        get: Option<AccessorGet>,
        set: Option<AccessorSet>,
        dep: Arc<Dep>,
        shallow: bool,
        on_set: Option<Arc<dyn Fn() + Send + Sync>>,
    },
    Ignore,
}

impl Record {
    pub fn new() -> Self {
        Self(Arc::new(RecordInner {
            properties: RwLock::new(IndexMap::new()),
            extensible: AtomicBool::new(true),
            observer: OnceLock::new(),
        }))
    }

    /// Read a key. Missing keys read as `Null`.
    ///
    /// Reading a reactive key while a subscriber is evaluating records the
    /// dependency, including the value's own container dependency and, for
    /// sequences, every nested element's.
    pub fn get(&self, key: &str) -> Value {
        let read = {
            let props = self.0.properties.read();
            let Some(prop) = props.get(key) else {
                return Value::Null;
            };
            match &prop.slot {
                Slot::Data { value, .. } => return value.clone(),
                Slot::Accessor { get, .. } => Read::Getter(get.clone()),
                Slot::Reactive(slot) => Read::Reactive {
                    value: slot.value.clone(),
                    get: slot.get.clone(),
                    dep: slot.dep.clone(),
                    child: slot.child.clone(),
                },
            }
        };

        match read {
            Read::Getter(get) => get.map(|g| g()).unwrap_or_default(),
            Read::Reactive {
                value,
                get,
                dep,
                child,
            } => {
                let value = match get {
                    Some(g) => g(),
                    None => value,
                };
                if context::is_tracking() {
                    dep.depend();
                    if let Some(child) = child {
                        child.dep().depend();
                        if let Value::Sequence(seq) = &value {
                            observer::depend_sequence(seq);
                        }
                    }
                }
                value
            }
        }
    }

    /// Write a key.
    ///
    /// Reactive keys notify their subscribers unless the new value is the
    /// same value as the old one. Keys that do not exist yet are inserted
    /// as plain data, which no subscriber can see; use
    /// [`observer::set`](crate::observer::set) to add a reactive key.
    pub fn set(&self, key: &str, value: Value) {
        let write = {
            let props = self.0.properties.read();
            match props.get(key) {
                None if self.is_extensible() => Write::Insert,
                None => Write::Ignore,
                Some(prop) => match &prop.slot {
                    Slot::Data { writable: true, .. } => Write::Store,
                    Slot::Data { .. } => Write::Ignore,
                    Slot::Accessor { set: Some(set), .. } => Write::Setter(set.clone()),
                    Slot::Accessor { .. } => Write::Ignore,
                    Slot::Reactive(slot) => Write::Reactive {
                        old: slot.value.clone(),
                        get: slot.get.clone(),
                        set: slot.set.clone(),
                        dep: slot.dep.clone(),
                        shallow: slot.shallow,
                        on_set: slot.on_set.clone(),
                    },
                },
            }
        };

        match write {
            Write::Ignore => {}
            Write::Insert => {
                self.0
                    .properties
                    .write()
                    .entry(key.to_string())
                    .or_insert_with(|| Property::data(value));
            }
            Write::Store => {
                if let Some(Property {
                    slot: Slot::Data { value: stored, .. },
                    ..
                }) = self.0.properties.write().get_mut(key)
                {
                    *stored = value;
                }
            }
            Write::Setter(set) => set(value),
            Write::Reactive {
                old,
                get,
                set,
                dep,
                shallow,
                on_set,
            } => {
                let old = match &get {
                    Some(g) => g(),
                    None => old,
                };
                if value.same_value(&old) {
                    return;
                }
                if let Some(on_set) = on_set {
                    on_set();
                }
                // Read-only accessor.
                if get.is_some() && set.is_none() {
                    return;
                }

                let child = if shallow { None } else { observer::observe(&value) };
                if let Some(set) = &set {
                    set(value.clone());
                }
                if let Some(Property {
                    slot: Slot::Reactive(slot),
                    ..
                }) = self.0.properties.write().get_mut(key)
                {
                    if set.is_none() {
                        slot.value = value;
                    }
                    slot.child = child;
                }
                dep.notify();
            }
        }
    }

    /// Remove a key without notifying anyone.
    ///
    /// Use [`observer::del`](crate::observer::del) to remove a key so that
    /// subscribers of the record see it.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut props = self.0.properties.write();
        if !props.get(key)?.configurable {
            return None;
        }
        props.shift_remove(key).map(|prop| match prop.slot {
            Slot::Data { value, .. } => value,
            Slot::Reactive(slot) => slot.value,
            Slot::Accessor { .. } => Value::Null,
        })
    }

    /// Define a key backed by a host getter and setter.
    ///
    /// Returns false if the key exists and is not configurable, or if the
    /// key is new and the record is not extensible.
    pub fn define_accessor(
        &self,
        key: &str,
        get: Option<AccessorGet>,
        set: Option<AccessorSet>,
    ) -> bool {
        self.define(key, Slot::Accessor { get, set }, true)
    }

    /// Define a data key with explicit attributes.
    pub fn define_property(&self, key: &str, value: Value, flags: PropertyFlags) -> bool {
        let slot = Slot::Data {
            value,
            writable: flags.writable,
        };
        self.define(key, slot, flags.configurable)
    }

    fn define(&self, key: &str, slot: Slot, configurable: bool) -> bool {
        let mut props = self.0.properties.write();
        match props.get_mut(key) {
            Some(prop) if !prop.configurable => false,
            Some(prop) => {
                prop.slot = slot;
                prop.configurable = configurable;
                true
            }
            None if !self.is_extensible() => false,
            None => {
                props.insert(key.to_string(), Property { slot, configurable });
                true
            }
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.properties.read().contains_key(key)
    }

    /// Keys in insertion order. Not tracked.
    pub fn keys(&self) -> Vec<String> {
        self.0.properties.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.properties.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forbid new keys. Existing keys stay writable.
    pub fn prevent_extensions(&self) {
        self.0.extensible.store(false, Ordering::SeqCst);
    }

    /// Forbid new keys, removal, redefinition and writes to data keys.
    pub fn freeze(&self) {
        self.prevent_extensions();
        for prop in self.0.properties.write().values_mut() {
            prop.configurable = false;
            if let Slot::Data { writable, .. } = &mut prop.slot {
                *writable = false;
            }
        }
    }

    pub fn is_extensible(&self) -> bool {
        self.0.extensible.load(Ordering::SeqCst)
    }

    pub fn is_frozen(&self) -> bool {
        !self.is_extensible()
            && self.0.properties.read().values().all(|prop| {
                !prop.configurable && !matches!(prop.slot, Slot::Data { writable: true, .. })
            })
    }

    /// The observer attached to this record, if it has been observed.
    pub fn observer(&self) -> Option<Arc<Observer>> {
        self.0.observer.get().cloned()
    }

    pub fn ptr_eq(&self, other: &Record) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Attach an observer, returning it and whether this call created it.
    pub(crate) fn attach_observer(&self, init: impl FnOnce() -> Arc<Observer>) -> (Arc<Observer>, bool) {
        let mut created = false;
        let observer = self.0.observer.get_or_init(|| {
            created = true;
            init()
        });
        (observer.clone(), created)
    }

    pub(crate) fn with_properties<R>(&self, f: impl FnOnce(&IndexMap<String, Property>) -> R) -> R {
        f(&self.0.properties.read())
    }

    pub(crate) fn with_properties_mut<R>(
        &self,
        f: impl FnOnce(&mut IndexMap<String, Property>) -> R,
    ) -> R {
        f(&mut self.0.properties.write())
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let record = Record::new();
        record.with_properties_mut(|props| {
            for (key, value) in iter {
                props.insert(key.into(), Property::data(value.into()));
            }
        });
        record
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("keys", &self.keys())
            .field("observed", &self.observer().is_some())
            .finish()
    }
}
