//! Static type model: primitive tags, composite types and function
//! signatures.
//!
//! `TypeInfo` equality intentionally treats `Unknown` as matching any other
//! type — that is what lets partially inferred signatures match call
//! arguments during overload resolution.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use strum::Display;

/// Closed set of primitive type tags recognised by the type system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum Type {
    Unknown,
    Void,
    Bool,
    Byte,
    Char,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
    List,
    Tuple,
    Function,
    Module,
}

/// A fully or partially known type.
///
/// `Unknown { var }` carries a generic-variable id used during inference;
/// `var == 0` is a plain unresolved type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TypeInfo {
    Unknown { var: u8 },
    Void,
    Bool,
    Byte,
    Char,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
    List(Box<TypeInfo>),
    Tuple(SmallVec<[Box<TypeInfo>; 2]>),
    Function(Box<Signature>),
    Module,
}

impl Default for TypeInfo {
    fn default() -> Self {
        Self::Unknown { var: 0 }
    }
}

impl TypeInfo {
    #[must_use]
    pub fn unknown() -> Self {
        Self::Unknown { var: 0 }
    }

    #[must_use]
    pub fn list_of(elem: TypeInfo) -> Self {
        Self::List(Box::new(elem))
    }

    #[must_use]
    pub fn tuple_of(subtypes: impl IntoIterator<Item = TypeInfo>) -> Self {
        Self::Tuple(subtypes.into_iter().map(Box::new).collect())
    }

    #[must_use]
    pub fn function(signature: Signature) -> Self {
        Self::Function(Box::new(signature))
    }

    /// The primitive tag of this type.
    #[must_use]
    pub fn type_tag(&self) -> Type {
        match self {
            Self::Unknown { .. } => Type::Unknown,
            Self::Void => Type::Void,
            Self::Bool => Type::Bool,
            Self::Byte => Type::Byte,
            Self::Char => Type::Char,
            Self::Int32 => Type::Int32,
            Self::Int64 => Type::Int64,
            Self::Float32 => Type::Float32,
            Self::Float64 => Type::Float64,
            Self::String => Type::String,
            Self::List(_) => Type::List,
            Self::Tuple(_) => Type::Tuple,
            Self::Function(_) => Type::Function,
            Self::Module => Type::Module,
        }
    }

    /// Size in stack bytes.
    ///
    /// String/List/Function serialise as an 8-byte slot id (or function ref)
    /// plus an 8-byte size/length/slot field.
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Self::Unknown { .. } => 0,
            Self::Void | Self::Bool | Self::Byte => 1,
            Self::Char | Self::Int32 | Self::Float32 => 4,
            Self::Int64 | Self::Float64 => 8,
            Self::String | Self::List(_) | Self::Function(_) => 16,
            Self::Tuple(subtypes) => subtypes.iter().map(|sub| sub.size()).sum(),
            Self::Module => 0,
        }
    }

    /// Calls `cb` with the byte offset of every heap-slot id the stack
    /// serialisation of this type contains.
    pub fn for_each_heap_slot(&self, cb: &mut dyn FnMut(usize)) {
        match self {
            // slot id is the first 8 bytes for all three container layouts
            Self::String | Self::List(_) | Self::Function(_) => cb(0),
            Self::Tuple(subtypes) => {
                let mut pos = 0;
                for sub in subtypes {
                    sub.for_each_heap_slot(&mut |offset| cb(pos + offset));
                    pos += sub.size();
                }
            }
            _ => {}
        }
    }

    /// True when the stack serialisation contains at least one heap slot.
    #[must_use]
    pub fn has_heap_slot(&self) -> bool {
        let mut found = false;
        self.for_each_heap_slot(&mut |_| found = true);
        found
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown { .. })
    }

    #[must_use]
    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Function(_))
    }

    /// The generic variable id, 0 when not a generic unknown.
    #[must_use]
    pub fn generic_var(&self) -> u8 {
        match self {
            Self::Unknown { var } => *var,
            _ => 0,
        }
    }

    /// Signature of a Function type.
    ///
    /// # Panics
    /// Panics when the type is not `Function`.
    #[must_use]
    pub fn signature(&self) -> &Signature {
        match self {
            Self::Function(sig) => sig,
            other => panic!("TypeInfo::signature on non-function type {other}"),
        }
    }

    /// Element type of a List.
    ///
    /// # Panics
    /// Panics when the type is not `List`.
    #[must_use]
    pub fn elem_type(&self) -> &TypeInfo {
        match self {
            Self::List(elem) => elem,
            other => panic!("TypeInfo::elem_type on non-list type {other}"),
        }
    }

    /// Tuple subtypes.
    ///
    /// # Panics
    /// Panics when the type is not `Tuple`.
    #[must_use]
    pub fn subtypes(&self) -> &[Box<TypeInfo>] {
        match self {
            Self::Tuple(subtypes) => subtypes,
            other => panic!("TypeInfo::subtypes on non-tuple type {other}"),
        }
    }

    /// Substitutes generic variable `var` (non-zero) with `ti`, recursively.
    pub fn replace_var(&mut self, var: u8, ti: &TypeInfo) {
        if var == 0 {
            return;
        }
        match self {
            Self::Unknown { var: v } if *v == var => *self = ti.clone(),
            Self::Function(sig) => {
                for prm in &mut sig.params {
                    prm.replace_var(var, ti);
                }
                sig.return_type.replace_var(var, ti);
            }
            Self::List(elem) => elem.replace_var(var, ti),
            Self::Tuple(subtypes) => {
                for sub in subtypes {
                    sub.replace_var(var, ti);
                }
            }
            _ => {}
        }
    }
}

impl PartialEq for TypeInfo {
    /// `Unknown` matches any type; composite types compare structurally.
    fn eq(&self, rhs: &Self) -> bool {
        if self.is_unknown() || rhs.is_unknown() {
            return true;
        }
        match (self, rhs) {
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Tuple(a), Self::Tuple(b)) => a == b,
            (Self::Function(a), Self::Function(b)) => a == b,
            _ => self.type_tag() == rhs.type_tag(),
        }
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown { .. } => write!(f, "?"),
            Self::List(elem) => write!(f, "[{elem}]"),
            Self::Tuple(subtypes) => {
                write!(f, "(")?;
                for (i, ti) in subtypes.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{ti}")?;
                }
                write!(f, ")")
            }
            Self::Function(sig) => write!(f, "{sig}"),
            other => write!(f, "{}", other.type_tag()),
        }
    }
}

/// Function signature: captured non-locals, partially applied values,
/// parameters and return type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Signature {
    pub nonlocals: Vec<TypeInfo>,
    pub partial: Vec<TypeInfo>,
    pub params: SmallVec<[TypeInfo; 4]>,
    pub return_type: TypeInfo,
}

impl PartialEq for Signature {
    /// Captures are part of the closure value, not of its type: equality
    /// considers parameters and return type only.
    fn eq(&self, rhs: &Self) -> bool {
        self.params == rhs.params && self.return_type == rhs.return_type
    }
}

impl Signature {
    #[must_use]
    pub fn new(params: impl IntoIterator<Item = TypeInfo>, return_type: TypeInfo) -> Self {
        Self {
            nonlocals: Vec::new(),
            partial: Vec::new(),
            params: params.into_iter().collect(),
            return_type,
        }
    }

    pub fn add_nonlocal(&mut self, ti: TypeInfo) {
        self.nonlocals.push(ti);
    }

    pub fn add_parameter(&mut self, ti: TypeInfo) {
        self.params.push(ti);
    }

    /// Byte size of all parameters.
    #[must_use]
    pub fn raw_size_of_params(&self) -> usize {
        self.params.iter().map(TypeInfo::size).sum()
    }

    /// Byte size of all non-locals (the closure prefix of the frame).
    #[must_use]
    pub fn raw_size_of_nonlocals(&self) -> usize {
        self.nonlocals.iter().map(TypeInfo::size).sum()
    }

    /// Byte offset of parameter `idx` within the parameter region.
    #[must_use]
    pub fn parameter_offset(&self, idx: usize) -> usize {
        self.params[..idx].iter().map(TypeInfo::size).sum()
    }

    /// Byte offset and type of non-local `idx`.
    #[must_use]
    pub fn nonlocal_offset_and_type(&self, idx: usize) -> (usize, &TypeInfo) {
        let offset = self.nonlocals[..idx].iter().map(TypeInfo::size).sum();
        (offset, &self.nonlocals[idx])
    }

    /// True when any parameter is still an unknown (generic) type.
    #[must_use]
    pub fn is_generic(&self) -> bool {
        self.params.iter().any(TypeInfo::is_unknown)
    }
}

impl fmt::Display for Signature {
    /// Renders `| P1 P2 | -> R`, or just `R` for nullary signatures — the
    /// format used in FunctionNotFound candidate listings.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.params.is_empty() {
            write!(f, "| ")?;
            for param in &self.params {
                write!(f, "{param} ")?;
            }
            write!(f, "| -> ")?;
        }
        write!(f, "{}", self.return_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(TypeInfo::Void.size(), 1);
        assert_eq!(TypeInfo::Bool.size(), 1);
        assert_eq!(TypeInfo::Char.size(), 4);
        assert_eq!(TypeInfo::Int64.size(), 8);
        assert_eq!(TypeInfo::String.size(), 16);
        assert_eq!(TypeInfo::tuple_of([TypeInfo::Int32, TypeInfo::String]).size(), 20);
    }

    #[test]
    fn unknown_matches_any() {
        assert_eq!(TypeInfo::unknown(), TypeInfo::Int32);
        assert_eq!(TypeInfo::String, TypeInfo::unknown());
        assert_ne!(TypeInfo::Int32, TypeInfo::Int64);
    }

    #[test]
    fn heap_slot_offsets() {
        let ti = TypeInfo::tuple_of([TypeInfo::Int32, TypeInfo::String, TypeInfo::Byte, TypeInfo::String]);
        let mut offsets = Vec::new();
        ti.for_each_heap_slot(&mut |ofs| offsets.push(ofs));
        assert_eq!(offsets, vec![4, 21]);
    }

    #[test]
    fn signature_display() {
        let sig = Signature::new([TypeInfo::Int32, TypeInfo::Int32], TypeInfo::Bool);
        assert_eq!(sig.to_string(), "| Int32 Int32 | -> Bool");
        let nullary = Signature::new([], TypeInfo::Int32);
        assert_eq!(nullary.to_string(), "Int32");
    }

    #[test]
    fn replace_var_substitutes_recursively() {
        let mut ti = TypeInfo::list_of(TypeInfo::Unknown { var: 1 });
        ti.replace_var(1, &TypeInfo::Int32);
        assert_eq!(ti.elem_type().type_tag(), Type::Int32);
    }
}
