//! Runtime value model.
//!
//! Plain scalars are held inline; String/List/Closure carry a heap slot id
//! plus a size/length/function-ref, and serialise to the stack as 16 bytes
//! with the slot id first. Tuples serialise as the concatenation of their
//! elements.
//!
//! `write` increfs every owned slot (one count per live stack copy); `read`
//! takes over the stack copy's count. A `Value` pulled off the stack must
//! therefore either be pushed back or explicitly `decref`ed when consumed.

use crate::{
    heap::{Heap, HeapId},
    module::{FnRef, ModuleId},
    typeinfo::{Signature, TypeInfo},
};

/// String value: UTF-8 bytes in a heap slot, length in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringV {
    pub slot: HeapId,
    pub size: u64,
}

/// List value: raw element bytes in a heap slot, element count and type.
#[derive(Debug, Clone, PartialEq)]
pub struct ListV {
    pub elem_type: TypeInfo,
    pub length: u64,
    pub slot: HeapId,
}

/// Closure value: function reference plus a slot of captured non-locals
/// (`HeapId::NULL` when the function captures nothing).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosureV {
    pub function: FnRef,
    pub slot: HeapId,
}

/// A polymorphic tagged runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Void,
    Bool(bool),
    Byte(u8),
    Char(char),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(StringV),
    List(ListV),
    Tuple(Vec<Value>),
    Closure(ClosureV),
    Module(ModuleId),
}

impl Value {
    /// Builds a String value by copying `text` into a fresh heap slot.
    pub fn string(text: &str, heap: &mut Heap) -> Self {
        let slot = if text.is_empty() {
            HeapId::NULL
        } else {
            heap.allocate(text.as_bytes().to_vec())
        };
        Self::String(StringV {
            slot,
            size: text.len() as u64,
        })
    }

    /// Builds a closure with no captured non-locals.
    #[must_use]
    pub fn plain_closure(function: FnRef) -> Self {
        Self::Closure(ClosureV {
            function,
            slot: HeapId::NULL,
        })
    }

    /// The static type of this value.
    ///
    /// Closures report an empty signature here; the machine and compiler
    /// always know the precise signature from the function table.
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
            Self::String(_) => TypeInfo::String,
            Self::List(list) => TypeInfo::list_of(list.elem_type.clone()),
            Self::Tuple(items) => TypeInfo::tuple_of(items.iter().map(Value::type_info)),
            Self::Closure(_) => TypeInfo::function(Signature::default()),
            Self::Module(_) => TypeInfo::Module,
        }
    }

    /// Size of the stack serialisation in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Self::Tuple(items) => items.iter().map(Value::size).sum(),
            other => other.type_info().size(),
        }
    }

    /// Serialises the value into `buf` (exactly `self.size()` bytes),
    /// incrementing the refcount of every owned heap slot.
    pub fn write(&self, buf: &mut [u8], heap: &mut Heap) {
        debug_assert_eq!(buf.len(), self.size());
        match self {
            Self::Void => buf[0] = 0,
            Self::Bool(v) => buf[0] = u8::from(*v),
            Self::Byte(v) => buf[0] = *v,
            Self::Char(v) => buf.copy_from_slice(&(*v as u32).to_le_bytes()),
            Self::Int32(v) => buf.copy_from_slice(&v.to_le_bytes()),
            Self::Int64(v) => buf.copy_from_slice(&v.to_le_bytes()),
            Self::Float32(v) => buf.copy_from_slice(&v.to_le_bytes()),
            Self::Float64(v) => buf.copy_from_slice(&v.to_le_bytes()),
            Self::String(s) => {
                buf[..8].copy_from_slice(&s.slot.to_stack_bytes());
                buf[8..].copy_from_slice(&s.size.to_le_bytes());
                heap.incref(s.slot);
            }
            Self::List(list) => {
                buf[..8].copy_from_slice(&list.slot.to_stack_bytes());
                buf[8..].copy_from_slice(&list.length.to_le_bytes());
                heap.incref(list.slot);
            }
            Self::Tuple(items) => {
                let mut pos = 0;
                for item in items {
                    let size = item.size();
                    item.write(&mut buf[pos..pos + size], heap);
                    pos += size;
                }
            }
            Self::Closure(closure) => {
                buf[..8].copy_from_slice(&closure.slot.to_stack_bytes());
                buf[8..].copy_from_slice(&closure.function.to_stack_bytes());
                heap.incref(closure.slot);
            }
            Self::Module(_) => {}
        }
    }

    /// Deserialises a value of type `ti` from `buf`, taking over the
    /// refcounts held by the byte copy.
    ///
    /// # Panics
    /// Panics on `Unknown` — every reachable value has a concrete type after
    /// the TypeResolver pass.
    #[must_use]
    pub fn read(ti: &TypeInfo, buf: &[u8]) -> Self {
        debug_assert_eq!(buf.len(), ti.size());
        match ti {
            TypeInfo::Unknown { .. } => panic!("cannot read value of unknown type"),
            TypeInfo::Void => Self::Void,
            TypeInfo::Bool => Self::Bool(buf[0] != 0),
            TypeInfo::Byte => Self::Byte(buf[0]),
            TypeInfo::Char => {
                let code = u32::from_le_bytes(buf.try_into().unwrap());
                Self::Char(char::from_u32(code).unwrap_or('\u{fffd}'))
            }
            TypeInfo::Int32 => Self::Int32(i32::from_le_bytes(buf.try_into().unwrap())),
            TypeInfo::Int64 => Self::Int64(i64::from_le_bytes(buf.try_into().unwrap())),
            TypeInfo::Float32 => Self::Float32(f32::from_le_bytes(buf.try_into().unwrap())),
            TypeInfo::Float64 => Self::Float64(f64::from_le_bytes(buf.try_into().unwrap())),
            TypeInfo::String => Self::String(StringV {
                slot: HeapId::from_stack_bytes(buf[..8].try_into().unwrap()),
                size: u64::from_le_bytes(buf[8..].try_into().unwrap()),
            }),
            TypeInfo::List(elem) => Self::List(ListV {
                elem_type: (**elem).clone(),
                length: u64::from_le_bytes(buf[8..].try_into().unwrap()),
                slot: HeapId::from_stack_bytes(buf[..8].try_into().unwrap()),
            }),
            TypeInfo::Tuple(subtypes) => {
                let mut items = Vec::with_capacity(subtypes.len());
                let mut pos = 0;
                for sub in subtypes {
                    let size = sub.size();
                    items.push(Self::read(sub, &buf[pos..pos + size]));
                    pos += size;
                }
                Self::Tuple(items)
            }
            TypeInfo::Function(_) => Self::Closure(ClosureV {
                slot: HeapId::from_stack_bytes(buf[..8].try_into().unwrap()),
                function: FnRef::from_stack_bytes(buf[8..].try_into().unwrap()),
            }),
            // module values have no byte representation; identity is lost
            TypeInfo::Module => Self::Module(ModuleId(0)),
        }
    }

    /// Increments the refcount of every owned heap slot.
    pub fn incref(&self, heap: &mut Heap) {
        match self {
            Self::String(s) => heap.incref(s.slot),
            Self::List(list) => heap.incref(list.slot),
            Self::Closure(closure) => heap.incref(closure.slot),
            Self::Tuple(items) => {
                for item in items {
                    item.incref(heap);
                }
            }
            _ => {}
        }
    }

    /// Decrements the refcount of every owned heap slot.
    pub fn decref(&self, heap: &mut Heap) {
        match self {
            Self::String(s) => {
                heap.decref(s.slot);
            }
            Self::List(list) => {
                heap.decref(list.slot);
            }
            Self::Closure(closure) => {
                heap.decref(closure.slot);
            }
            Self::Tuple(items) => {
                for item in items {
                    item.decref(heap);
                }
            }
            _ => {}
        }
    }

    /// Deep copy: heap payloads are duplicated into fresh slots with
    /// refcount 1, so the copy's lifetime is independent of the original.
    /// Used by `LoadStatic` and when copying statics across modules.
    #[must_use]
    pub fn make_copy(&self, heap: &mut Heap) -> Self {
        match self {
            Self::String(s) => {
                let slot = copy_slot(s.slot, heap);
                Self::String(StringV { slot, size: s.size })
            }
            Self::List(list) => {
                let slot = copy_slot(list.slot, heap);
                Self::List(ListV {
                    elem_type: list.elem_type.clone(),
                    length: list.length,
                    slot,
                })
            }
            Self::Closure(closure) => {
                let slot = copy_slot(closure.slot, heap);
                Self::Closure(ClosureV {
                    function: closure.function,
                    slot,
                })
            }
            Self::Tuple(items) => Self::Tuple(items.iter().map(|item| item.make_copy(heap)).collect()),
            other => other.clone(),
        }
    }

    /// Content equality, used for interning static values. Strings compare
    /// by bytes; slot-carrying values otherwise compare by identity.
    #[must_use]
    pub fn content_eq(&self, other: &Self, heap: &Heap) -> bool {
        match (self, other) {
            (Self::String(a), Self::String(b)) => string_bytes(a, heap) == string_bytes(b, heap),
            (Self::Tuple(a), Self::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.content_eq(y, heap))
            }
            (a, b) => a == b,
        }
    }

    /// The UTF-8 content of a String value.
    ///
    /// # Panics
    /// Panics when the value is not a String.
    #[must_use]
    pub fn string_content(&self, heap: &Heap) -> String {
        match self {
            Self::String(s) => String::from_utf8_lossy(string_bytes(s, heap)).into_owned(),
            other => panic!("string_content on {other:?}"),
        }
    }
}

/// Raw bytes of a string value (empty for the null slot).
#[must_use]
pub fn string_bytes<'h>(s: &StringV, heap: &'h Heap) -> &'h [u8] {
    if s.slot.is_null() {
        &[]
    } else {
        &heap.data(s.slot)[..s.size as usize]
    }
}

fn copy_slot(slot: HeapId, heap: &mut Heap) -> HeapId {
    if slot.is_null() {
        HeapId::NULL
    } else {
        let data = heap.data(slot).to_vec();
        heap.allocate(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_write_read_roundtrip() {
        let mut heap = Heap::new();
        for value in [
            Value::Void,
            Value::Bool(true),
            Value::Byte(7),
            Value::Char('x'),
            Value::Int32(-5),
            Value::Int64(1 << 40),
            Value::Float32(1.5),
            Value::Float64(-2.25),
        ] {
            let mut buf = vec![0u8; value.size()];
            value.write(&mut buf, &mut heap);
            assert_eq!(Value::read(&value.type_info(), &buf), value);
        }
    }

    #[test]
    fn string_write_increfs_and_read_takes_over() {
        let mut heap = Heap::new();
        let value = Value::string("hello", &mut heap);
        let Value::String(s) = &value else { unreachable!() };
        assert_eq!(heap.refcount(s.slot), 1);

        let mut buf = vec![0u8; 16];
        value.write(&mut buf, &mut heap);
        assert_eq!(heap.refcount(s.slot), 2);

        let copy = Value::read(&TypeInfo::String, &buf);
        assert_eq!(copy.string_content(&heap), "hello");
        copy.decref(&mut heap);
        value.decref(&mut heap);
        assert!(!heap.is_live(s.slot));
    }

    #[test]
    fn tuple_layout_is_flat() {
        let mut heap = Heap::new();
        let value = Value::Tuple(vec![Value::Int32(1), Value::Byte(2)]);
        assert_eq!(value.size(), 5);
        let mut buf = vec![0u8; 5];
        value.write(&mut buf, &mut heap);
        assert_eq!(&buf, &[1, 0, 0, 0, 2]);
    }

    #[test]
    fn make_copy_is_independent() {
        let mut heap = Heap::new();
        let value = Value::string("abc", &mut heap);
        let copy = value.make_copy(&mut heap);
        assert!(value.content_eq(&copy, &heap));
        value.decref(&mut heap);
        assert_eq!(copy.string_content(&heap), "abc");
        copy.decref(&mut heap);
    }
}
