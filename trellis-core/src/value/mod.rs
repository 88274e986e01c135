//! Dynamic Values
//!
//! Component state is made of plain data: primitives, keyed records and
//! sequences. Records and sequences are reference handles with identity;
//! cloning a `Value` clones the handle, not the contents.
//!
//! Reads and writes always go through [`Record`] and [`Sequence`] methods.
//! Once a container has been observed those methods are what make it
//! reactive; before that they behave like plain data access.

mod record;
mod sequence;

pub use record::{AccessorGet, AccessorSet, PropertyFlags, Record};
pub use sequence::Sequence;

pub(crate) use record::{Property, ReactiveSlot, Slot};

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// A host-owned handle that the runtime never makes reactive, such as a
/// component instance stored in state.
#[derive(Clone)]
pub struct Opaque(Arc<dyn Any + Send + Sync>);

impl Opaque {
    pub fn new<T: Any + Send + Sync>(inner: T) -> Self {
        Self(Arc::new(inner))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    pub fn ptr_eq(&self, other: &Opaque) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Opaque(..)")
    }
}

/// A dynamic value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Str(Arc<str>),
    Record(Record),
    Sequence(Sequence),
    Opaque(Opaque),
}

impl Value {
    /// Strict equality: identity for containers, value equality for
    /// primitives. `NaN` is not equal to itself.
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a.ptr_eq(b),
            (Value::Sequence(a), Value::Sequence(b)) => a.ptr_eq(b),
            (Value::Opaque(a), Value::Opaque(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Strict equality that also treats two `NaN`s as the same value.
    /// This is what decides whether a write is a change.
    pub fn same_value(&self, other: &Value) -> bool {
        self.strict_equals(other) || (self.is_nan() && other.is_nan())
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, Value::Number(n) if n.is_nan())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Records and sequences.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Record(_) | Value::Sequence(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&Sequence> {
        match self {
            Value::Sequence(s) => Some(s),
            _ => None,
        }
    }

    /// Default ordering used by [`Sequence::sort`].
    ///
    /// Values of different kinds order as null < bool < number < string <
    /// everything else; numbers use a total order so `NaN` sorts last.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Null => 0,
                Value::Bool(_) => 1,
                Value::Number(_) => 2,
                Value::Str(_) => 3,
                Value::Record(_) | Value::Sequence(_) | Value::Opaque(_) => 4,
            }
        }

        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            _ => rank(self).cmp(&rank(other)),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Value::Record(r)
    }
}

impl From<Sequence> for Value {
    fn from(s: Sequence) -> Self {
        Value::Sequence(s)
    }
}

impl From<Opaque> for Value {
    fn from(o: Opaque) -> Self {
        Value::Opaque(o)
    }
}

/// Address of a slot inside a container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Name(String),
    Index(usize),
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Name(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Name(s)
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => f.write_str(name),
            Key::Index(i) => write!(f, "{i}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_is_not_strictly_equal_but_is_the_same_value() {
        let nan = Value::from(f64::NAN);
        assert!(!nan.strict_equals(&nan));
        assert!(nan.same_value(&Value::from(f64::NAN)));
    }

    #[test]
    fn containers_compare_by_identity() {
        let a = Record::new();
        let b = Record::new();
        let va = Value::from(a.clone());

        assert!(va.strict_equals(&Value::from(a)));
        assert!(!va.strict_equals(&Value::from(b)));
    }

    #[test]
    fn strings_compare_by_content() {
        assert!(Value::from("x").strict_equals(&Value::from(String::from("x"))));
        assert!(!Value::from("x").strict_equals(&Value::from(1)));
    }

    #[test]
    fn total_cmp_orders_kinds() {
        let mut values = vec![Value::from("b"), Value::from(2), Value::Null, Value::from(1)];
        values.sort_by(Value::total_cmp);
        assert!(values[0].is_null());
        assert_eq!(values[1].as_f64(), Some(1.0));
        assert_eq!(values[2].as_f64(), Some(2.0));
        assert_eq!(values[3].as_str(), Some("b"));
    }
}
