//! Heap-independent host values.
//!
//! `eval` results and `Invoke` callback arguments cross the host boundary
//! as [`Object`]s: deep copies that own their data, so the caller never
//! touches heap slots or reference counts.

use std::fmt;

use crate::{
    heap::Heap,
    typeinfo::TypeInfo,
    value::{string_bytes, Value},
};

/// A runtime value converted for the host.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Void,
    Bool(bool),
    Byte(u8),
    Char(char),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Str(String),
    List(Vec<Object>),
    Tuple(Vec<Object>),
    /// An opaque function value (module and function index).
    Function { module: u32, function: u32 },
    Module,
}

impl Object {
    /// Deep-converts a machine value. Does not touch reference counts.
    #[must_use]
    pub fn from_value(value: &Value, heap: &Heap) -> Self {
        match value {
            Value::Void => Self::Void,
            Value::Bool(v) => Self::Bool(*v),
            Value::Byte(v) => Self::Byte(*v),
            Value::Char(v) => Self::Char(*v),
            Value::Int32(v) => Self::Int32(*v),
            Value::Int64(v) => Self::Int64(*v),
            Value::Float32(v) => Self::Float32(*v),
            Value::Float64(v) => Self::Float64(*v),
            Value::String(s) => Self::Str(String::from_utf8_lossy(string_bytes(s, heap)).into_owned()),
            Value::List(list) => {
                let elem_size = list.elem_type.size();
                let mut items = Vec::with_capacity(list.length as usize);
                if !list.slot.is_null() && elem_size > 0 {
                    let data = heap.data(list.slot);
                    for i in 0..list.length as usize {
                        let elem = Value::read(&list.elem_type, &data[i * elem_size..(i + 1) * elem_size]);
                        items.push(Self::from_value(&elem, heap));
                    }
                }
                Self::List(items)
            }
            Value::Tuple(items) => Self::Tuple(items.iter().map(|item| Self::from_value(item, heap)).collect()),
            Value::Closure(closure) => Self::Function {
                module: closure.function.module.0,
                function: closure.function.function,
            },
            Value::Module(_) => Self::Module,
        }
    }

    /// The static type this object corresponds to.
    #[must_use]
    pub fn type_info(&self) -> TypeInfo {
        match self {
            Self::Void => TypeInfo::Void,
            Self::Bool(_) => TypeInfo::Bool,
            Self::Byte(_) => TypeInfo::Byte,
            Self::Char(_) => TypeInfo::Char,
            Self::Int32(_) => TypeInfo::Int32,
            Self::Int64(_) => TypeInfo::Int64,
            Self::Float32(_) => TypeInfo::Float32,
            Self::Float64(_) => TypeInfo::Float64,
            Self::Str(_) => TypeInfo::String,
            Self::List(items) => TypeInfo::list_of(
                items
                    .first()
                    .map_or_else(TypeInfo::unknown, Object::type_info),
            ),
            Self::Tuple(items) => TypeInfo::tuple_of(items.iter().map(Object::type_info)),
            Self::Function { .. } => TypeInfo::function(crate::typeinfo::Signature::default()),
            Self::Module => TypeInfo::Module,
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => write!(f, "void"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Byte(v) => write!(f, "{v}b"),
            Self::Char(v) => write!(f, "'{v}'"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float32(v) => {
                let mut buffer = ryu::Buffer::new();
                write!(f, "{}", buffer.format(*v))
            }
            Self::Float64(v) => {
                let mut buffer = ryu::Buffer::new();
                write!(f, "{}", buffer.format(*v))
            }
            Self::Str(v) => write!(f, "{v:?}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Self::Function { module, function } => write!(f, "<function {module}:{function}>"),
            Self::Module => write!(f, "<module>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(Object::Int32(42).to_string(), "42");
        assert_eq!(Object::Bool(true).to_string(), "true");
        assert_eq!(Object::Float32(1.5).to_string(), "1.5");
        assert_eq!(Object::Str("a\"b".into()).to_string(), "\"a\\\"b\"");
        assert_eq!(
            Object::List(vec![Object::Int32(1), Object::Int32(2)]).to_string(),
            "[1, 2]"
        );
        assert_eq!(
            Object::Tuple(vec![Object::Int32(1), Object::Bool(false)]).to_string(),
            "(1, false)"
        );
        assert_eq!(Object::Void.to_string(), "void");
    }

    #[test]
    fn string_conversion_reads_heap() {
        let mut heap = Heap::new();
        let value = Value::string("hi", &mut heap);
        assert_eq!(Object::from_value(&value, &heap), Object::Str("hi".into()));
        value.decref(&mut heap);
    }
}
