//! Bytecode: opcode set, code buffers, the emitter and the machine.
//!
//! - `op` — opcode definitions, partitioned by argument arity
//! - `code` — the append-only code buffer with patching helpers
//! - `compiler` — AST to bytecode emitter
//! - `vm` — the stack machine executing the bytecode

pub use code::Code;
pub use compiler::compile;
pub use op::Opcode;
pub use vm::{InvokeCallback, Machine};

mod code;
mod compiler;
mod op;
mod vm;
