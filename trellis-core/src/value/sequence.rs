//! Ordered sequences.
//!
//! Element access by position cannot be intercepted, so a sequence only
//! reports changes made through its seven mutating operations: `push`,
//! `pop`, `shift`, `unshift`, `splice`, `sort` and `reverse`. Each one
//! applies the change, observes newly inserted elements and then notifies
//! the sequence's own dependency.
//!
//! `set_index` and `truncate` are deliberately unobserved. Use
//! [`observer::set`](crate::observer::set) or `splice` when subscribers
//! must see an element replaced.

use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use smallvec::SmallVec;

use super::Value;
use crate::observer::{self, Observer};

type Inserted = SmallVec<[Value; 4]>;

struct SequenceInner {
    items: RwLock<Vec<Value>>,
    extensible: AtomicBool,
    frozen: AtomicBool,
    observer: OnceLock<Arc<Observer>>,
}

/// An ordered container handle. Clones share the same sequence.
#[derive(Clone)]
pub struct Sequence(Arc<SequenceInner>);

impl Sequence {
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(Arc::new(SequenceInner {
            items: RwLock::new(items),
            extensible: AtomicBool::new(true),
            frozen: AtomicBool::new(false),
            observer: OnceLock::new(),
        }))
    }

    /// Element at `index`. Not tracked.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.items.read().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.0.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the elements. Not tracked.
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.items.read().clone()
    }

    /// Append one element. Returns the new length.
    pub fn push(&self, value: Value) -> usize {
        self.push_all(vec![value])
    }

    /// Append elements. Returns the new length.
    pub fn push_all(&self, values: Vec<Value>) -> usize {
        if !self.can_grow(values.len(), 0) {
            return self.len();
        }
        self.mutate(|items| {
            let inserted: Inserted = values.iter().cloned().collect();
            items.extend(values);
            (items.len(), inserted)
        })
        .unwrap_or_else(|| self.len())
    }

    /// Remove the last element.
    pub fn pop(&self) -> Option<Value> {
        self.mutate(|items| (items.pop(), Inserted::new())).flatten()
    }

    /// Remove the first element.
    pub fn shift(&self) -> Option<Value> {
        self.mutate(|items| {
            let first = (!items.is_empty()).then(|| items.remove(0));
            (first, Inserted::new())
        })
        .flatten()
    }

    /// Prepend elements, keeping their order. Returns the new length.
    pub fn unshift(&self, values: Vec<Value>) -> usize {
        if !self.can_grow(values.len(), 0) {
            return self.len();
        }
        self.mutate(|items| {
            let inserted: Inserted = values.iter().cloned().collect();
            items.splice(0..0, values);
            (items.len(), inserted)
        })
        .unwrap_or_else(|| self.len())
    }

    /// Remove `delete_count` elements starting at `start` and insert `values`
    /// in their place. Out-of-range arguments are clamped. Returns the
    /// removed elements.
    pub fn splice(&self, start: usize, delete_count: usize, values: Vec<Value>) -> Vec<Value> {
        let (start, delete_count) = {
            let len = self.len();
            let start = start.min(len);
            (start, delete_count.min(len - start))
        };
        if !self.can_grow(values.len(), delete_count) {
            return Vec::new();
        }
        self.mutate(|items| {
            let inserted: Inserted = values.iter().cloned().collect();
            let removed = items.splice(start..start + delete_count, values).collect();
            (removed, inserted)
        })
        .unwrap_or_default()
    }

    /// Sort with [`Value::total_cmp`].
    pub fn sort(&self) {
        self.sort_by(Value::total_cmp);
    }

    /// Sort with a comparator. The sort is stable.
    ///
    /// The comparator runs on a snapshot with no lock held, so it may read
    /// this sequence.
    pub fn sort_by<F>(&self, compare: F)
    where
        F: FnMut(&Value, &Value) -> CmpOrdering,
    {
        if self.is_frozen() {
            return;
        }
        let mut sorted = self.to_vec();
        sorted.sort_by(compare);
        self.mutate(|items| {
            *items = sorted;
            ((), Inserted::new())
        });
    }

    pub fn reverse(&self) {
        self.mutate(|items| {
            items.reverse();
            ((), Inserted::new())
        });
    }

    /// Overwrite an existing element in place. Subscribers are not notified.
    /// Returns false when `index` is out of range.
    pub fn set_index(&self, index: usize, value: Value) -> bool {
        if self.is_frozen() {
            return false;
        }
        match self.0.items.write().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Shorten the sequence. Subscribers are not notified.
    pub fn truncate(&self, len: usize) {
        if !self.is_frozen() {
            self.0.items.write().truncate(len);
        }
    }

    /// Forbid growth. Removal and reordering stay allowed.
    pub fn prevent_extensions(&self) {
        self.0.extensible.store(false, Ordering::SeqCst);
    }

    /// Forbid every mutation.
    pub fn freeze(&self) {
        self.prevent_extensions();
        self.0.frozen.store(true, Ordering::SeqCst);
    }

    pub fn is_extensible(&self) -> bool {
        self.0.extensible.load(Ordering::SeqCst)
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.load(Ordering::SeqCst)
    }

    /// The observer attached to this sequence, if it has been observed.
    pub fn observer(&self) -> Option<Arc<Observer>> {
        self.0.observer.get().cloned()
    }

    pub fn ptr_eq(&self, other: &Sequence) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn attach_observer(&self, init: impl FnOnce() -> Arc<Observer>) -> (Arc<Observer>, bool) {
        let mut created = false;
        let observer = self.0.observer.get_or_init(|| {
            created = true;
            init()
        });
        (observer.clone(), created)
    }

    /// Grow to at least `len` elements with `Null`, without notifying.
    pub(crate) fn pad_with_null(&self, len: usize) {
        if self.is_frozen() || !self.is_extensible() {
            return;
        }
        let mut items = self.0.items.write();
        if items.len() < len {
            items.resize(len, Value::Null);
        }
    }

    fn can_grow(&self, added: usize, removed: usize) -> bool {
        added <= removed || self.is_extensible()
    }

    /// Apply a mutation, then observe what it inserted and notify.
    /// Returns `None` without touching anything when frozen.
    ///
    /// `f` runs under the write lock and must not call back into user code.
    fn mutate<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> (R, Inserted)) -> Option<R> {
        if self.is_frozen() {
            return None;
        }
        let (result, inserted) = f(&mut self.0.items.write());
        if let Some(ob) = self.observer() {
            for value in &inserted {
                observer::observe(value);
            }
            ob.dep().notify();
        }
        Some(result)
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Into<Value>> FromIterator<V> for Sequence {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence")
            .field("len", &self.len())
            .field("observed", &self.observer().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(seq: &Sequence) -> Vec<f64> {
        seq.to_vec().iter().filter_map(Value::as_f64).collect()
    }

    #[test]
    fn push_pop_shift_unshift() {
        let seq = Sequence::from_iter([1, 2, 3]);

        assert_eq!(seq.push(Value::from(4)), 4);
        assert_eq!(seq.pop().and_then(|v| v.as_f64()), Some(4.0));
        assert_eq!(seq.shift().and_then(|v| v.as_f64()), Some(1.0));
        assert_eq!(seq.unshift(vec![Value::from(0), Value::from(1)]), 4);

        assert_eq!(numbers(&seq), vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn splice_clamps_and_returns_removed() {
        let seq = Sequence::from_iter([1, 2, 3]);

        let removed = seq.splice(1, 10, vec![Value::from(9)]);
        assert_eq!(removed.len(), 2);
        assert_eq!(numbers(&seq), vec![1.0, 9.0]);

        let removed = seq.splice(99, 1, vec![Value::from(7)]);
        assert!(removed.is_empty());
        assert_eq!(numbers(&seq), vec![1.0, 9.0, 7.0]);
    }

    #[test]
    fn comparator_may_read_the_sequence() {
        let seq = Sequence::from_iter([3, 1, 2]);
        let s = seq.clone();
        seq.sort_by(move |a, b| {
            assert_eq!(s.len(), 3);
            assert!(s.get(0).is_some());
            a.total_cmp(b)
        });
        assert_eq!(numbers(&seq), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn sort_and_reverse() {
        let seq = Sequence::from_iter([3, 1, 2]);
        seq.sort();
        assert_eq!(numbers(&seq), vec![1.0, 2.0, 3.0]);
        seq.reverse();
        assert_eq!(numbers(&seq), vec![3.0, 2.0, 1.0]);
    }

    #[test]
    fn frozen_sequence_ignores_mutation() {
        let seq = Sequence::from_iter([1]);
        seq.freeze();

        assert_eq!(seq.push(Value::from(2)), 1);
        assert!(seq.pop().is_none());
        assert!(!seq.set_index(0, Value::from(5)));
        assert_eq!(numbers(&seq), vec![1.0]);
    }

    #[test]
    fn non_extensible_sequence_can_shrink() {
        let seq = Sequence::from_iter([1, 2]);
        seq.prevent_extensions();

        assert_eq!(seq.push(Value::from(3)), 2);
        assert!(seq.pop().is_some());
        assert_eq!(numbers(&seq), vec![1.0]);
    }

    #[test]
    fn raw_index_writes() {
        let seq = Sequence::from_iter([1, 2]);
        assert!(seq.set_index(1, Value::from(5)));
        assert!(!seq.set_index(2, Value::from(6)));
        seq.truncate(1);
        assert_eq!(numbers(&seq), vec![1.0]);
    }
}
