use std::fmt;

use crate::object::{Callable, Class, Function, Instance, Native};

#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    String(String),
    Native(Native),
    Function(Function),
    Class(Class),
    Instance(Instance),
}

impl Value {
    /// Only `nil` and `false` are falsy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Language-level `==`. Objects compare by identity, everything else by
    /// content, except that `nil` is never equal to anything, itself
    /// included.
    pub fn is_equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Native(a), Value::Native(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Class(a), Value::Class(b)) => a.ptr_eq(b),
            (Value::Instance(a), Value::Instance(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    pub fn as_callable(&self) -> Option<&dyn Callable> {
        match self {
            Value::Native(native) => Some(native),
            Value::Function(function) => Some(function),
            Value::Class(class) => Some(class),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(x) => write!(f, "{}", x),
            Value::Number(x) => fmt_number(*x, f),
            Value::String(x) => write!(f, "{}", x),
            Value::Native(native) => write!(f, "{}", native),
            Value::Function(function) => write!(f, "{}", function),
            Value::Class(class) => write!(f, "{}", class),
            Value::Instance(instance) => write!(f, "{}", instance),
        }
    }
}

/// Integral values print without a fractional part; infinities and NaN use
/// their long names.
fn fmt_number(x: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if x.is_nan() {
        write!(f, "NaN")
    } else if x.is_infinite() {
        write!(f, "{}Infinity", if x < 0.0 { "-" } else { "" })
    } else {
        write!(f, "{}", x)
    }
}
