use std::fmt::Display;

use crate::object::{Heap, ObjRef, Object};

#[derive(Debug, Clone, Copy)]
pub enum Value {
    Number(f64),
    Boolean(bool),
    Nil,
    Object(ObjRef),
}

/// Values of different types are never equal. Objects compare by identity,
/// which matches content equality because every string is interned.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    pub fn is_falsey(&self) -> bool {
        matches!(self, Value::Nil | Value::Boolean(false))
    }

    pub fn as_object(&self) -> Option<ObjRef> {
        match self {
            Value::Object(reference) => Some(*reference),
            _ => None,
        }
    }

    /// Renders the value the way `print` does. Strings need the heap.
    pub fn display<'h>(&self, heap: &'h Heap) -> ValueDisplay<'h> {
        ValueDisplay { value: *self, heap }
    }
}

pub struct ValueDisplay<'h> {
    value: Value,
    heap: &'h Heap,
}

impl Display for ValueDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.value {
            Value::Number(n) => write!(f, "{}", NumberDisplay(n)),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Nil => write!(f, "nil"),
            Value::Object(reference) => match self.heap.get(reference) {
                Object::String(string) => write!(f, "{}", string.as_str()),
            },
        }
    }
}

/// Shortest representation that reads back as the same number: integral
/// values print without a fractional part, non-finite values as `nan`,
/// `inf` and `-inf`.
struct NumberDisplay(f64);

impl Display for NumberDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let n = self.0;
        if n.is_nan() {
            write!(f, "nan")
        } else if n.is_infinite() {
            write!(f, "{}inf", if n < 0.0 { "-" } else { "" })
        } else {
            write!(f, "{n}")
        }
    }
}
