//! fen — a small statically-typed functional scripting language.
//!
//! Source text is parsed into an AST, lowered through a fixed pipeline of
//! semantic passes (symbol resolution, non-local capture resolution, type
//! inference, optional constant folding) into a linear bytecode, and
//! executed by a stack-based virtual machine with a reference-counted
//! heap.
//!
//! ```
//! use fen::{Interpreter, Object};
//!
//! let mut interp = Interpreter::new();
//! assert_eq!(interp.eval("1 + 2").unwrap(), Object::Int32(3));
//! ```

mod ast;
mod builtin;
mod bytecode;
mod error;
mod fold;
mod heap;
mod module;
mod object;
mod parse;
mod resolve;
mod run;
mod stack;
mod symtab;
mod trace;
mod typecheck;
mod typeinfo;
mod value;

pub use crate::{
    bytecode::{Code, Machine, Opcode},
    error::{ErrorKind, ErrorLocation, ScriptError, ScriptResult},
    heap::{Heap, HeapId, HeapStats},
    module::{FnRef, Function, Module, ModuleId, ModuleManager},
    object::Object,
    parse::{SourceInfo, SourceText},
    run::{Interpreter, Script},
    stack::Stack,
    symtab::{Symbol, SymbolKind, SymbolRef, SymbolTable, SymbolTables, TableId},
    trace::{NoopTracer, RecordingTracer, StderrTracer, TraceEvent, VmTracer},
    typeinfo::{Signature, Type, TypeInfo},
    value::Value,
};
