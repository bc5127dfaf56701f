//! AST to bytecode emitter.
//!
//! A post-order walk over a resolved, type-checked block, appending opcodes
//! to the owning function's code. Literals become interned module statics;
//! references compile by symbol kind; calls push arguments in reverse so
//! the first argument ends up on top; returns emit the refcount epilogue
//! and drop the frame's bytes.

use super::{code::Code, op::Opcode};
use crate::{
    ast::{Block, ConstValue, Expression, FunctionExpr, Statement},
    error::{ErrorKind, ScriptResult},
    heap::Heap,
    module::{ModuleId, ModuleManager},
    symtab::{Index, SymbolKind, SymbolRef, TableId, NO_INDEX},
    typeinfo::TypeInfo,
    value::Value,
};

/// Compiles a resolved block into `fn_idx`'s code, then any specialisation
/// bodies the type resolver left pending.
pub fn compile(
    manager: &mut ModuleManager,
    module_id: ModuleId,
    heap: &mut Heap,
    fn_idx: Index,
    block: &Block,
) -> ScriptResult<()> {
    let mut compiler = Compiler {
        manager,
        module_id,
        heap,
    };
    compiler.compile_block(fn_idx, block)?;
    loop {
        let mut pending = Vec::new();
        let module = compiler.manager.get_mut(module_id);
        for idx in 0..module.num_functions() {
            if let Some(body) = module.function_mut(idx as Index).take_pending_body() {
                pending.push((idx as Index, body));
            }
        }
        if pending.is_empty() {
            break;
        }
        for (idx, body) in pending {
            compiler.compile_block(idx, &body)?;
        }
    }
    Ok(())
}

struct Compiler<'a> {
    manager: &'a mut ModuleManager,
    module_id: ModuleId,
    heap: &'a mut Heap,
}

impl Compiler<'_> {
    fn compile_block(&mut self, fn_idx: Index, block: &Block) -> ScriptResult<()> {
        for stmt in &block.statements {
            match stmt {
                Statement::Definition(def) => {
                    let sym_ref = def.variable.identifier.symbol.expect("resolved definition");
                    if self.symbol_kind(sym_ref) == SymbolKind::Function {
                        // converted to a plain function: nothing lands on
                        // the stack, only the nested body gets compiled
                        if let Expression::Function(func) = &def.expression {
                            self.compile_nested_function(func)?;
                        }
                    } else {
                        // local value stays on the stack
                        self.emit_expr(fn_idx, &def.expression)?;
                    }
                }
                Statement::Invocation(inv) => {
                    self.emit_expr(fn_idx, &inv.expression)?;
                    let type_idx = inv.type_index.expect("type registered for invocation");
                    self.code(fn_idx, |code| {
                        code.add_opcode1(Opcode::Invoke, arg8(type_idx as usize)?);
                        Ok(())
                    })?;
                }
                Statement::Return(ret) => {
                    self.emit_expr(fn_idx, &ret.expression)?;
                    self.emit_return(fn_idx, ret.unwrap_execs)?;
                }
            }
        }
        Ok(())
    }

    fn emit_expr(&mut self, fn_idx: Index, expr: &Expression) -> ScriptResult<()> {
        match expr {
            Expression::Integer(lit) => self.emit_static(fn_idx, Value::Int32(lit.value)),
            Expression::Float(lit) => self.emit_static(fn_idx, Value::Float32(lit.value)),
            Expression::Char(lit) => self.emit_static(fn_idx, Value::Char(lit.value)),
            Expression::StringLit(lit) => {
                let value = Value::string(&lit.value, self.heap);
                self.emit_static(fn_idx, value)
            }
            Expression::Literal(lit) => {
                let value = const_value(&lit.value, self.heap);
                self.emit_static(fn_idx, value)
            }
            Expression::Tuple(tuple) => {
                // reverse emission puts the first item on top
                for item in tuple.items.iter().rev() {
                    self.emit_expr(fn_idx, item)?;
                }
                Ok(())
            }
            Expression::List(list) => {
                for item in list.items.iter().rev() {
                    self.emit_expr(fn_idx, item)?;
                }
                let elem_size = list.elem_size.expect("list element size recorded");
                let count = list.items.len();
                self.code(fn_idx, |code| {
                    code.add_opcode2(Opcode::MakeList, arg8(count)?, arg8(elem_size)?);
                    Ok(())
                })
            }
            Expression::Reference(reference) => {
                let sym_ref = reference.identifier.symbol.expect("resolved reference");
                self.emit_symbol(fn_idx, sym_ref)?;
                // a parameterless function value evaluates when referenced
                if let Some(ty) = self.value_symbol_type(fn_idx, sym_ref) {
                    self.emit_nullary_unwrap(fn_idx, &ty)?;
                }
                Ok(())
            }
            Expression::Call(call) => {
                for arg in call.args.iter().rev() {
                    self.emit_expr(fn_idx, arg)?;
                }
                if let Expression::Reference(reference) = &call.callable {
                    let sym_ref = reference.identifier.symbol.expect("resolved callable");
                    self.emit_symbol(fn_idx, sym_ref)?;
                    self.emit_call_execute(fn_idx, sym_ref)?;
                } else {
                    // callable is a function-typed value
                    self.emit_expr(fn_idx, &call.callable)?;
                    self.code(fn_idx, |code| {
                        code.add_opcode(Opcode::Execute);
                        Ok(())
                    })?;
                }
                self.emit_execs(fn_idx, call.wrapped_execs)
            }
            Expression::OpCall(opcall) => {
                for arg in opcall.args.iter().rev() {
                    self.emit_expr(fn_idx, arg)?;
                }
                let identifier = opcall.identifier.as_ref().expect("op call rewritten");
                let sym_ref = identifier.symbol.expect("resolved operator function");
                self.emit_symbol(fn_idx, sym_ref)?;
                self.emit_call_execute(fn_idx, sym_ref)
            }
            Expression::Condition(cond) => {
                self.emit_expr(fn_idx, &cond.cond)?;
                let jump_to_else = self.code(fn_idx, |code| {
                    code.add_opcode1(Opcode::JumpIfNot, 0);
                    Ok(code.this_instruction_address())
                })?;
                self.emit_expr(fn_idx, &cond.then_expr)?;
                let jump_to_end = self.code(fn_idx, |code| {
                    code.add_opcode1(Opcode::Jump, 0);
                    let pos = code.this_instruction_address();
                    patch_jump(code, jump_to_else)?;
                    Ok(pos)
                })?;
                self.emit_expr(fn_idx, &cond.else_expr)?;
                self.code(fn_idx, |code| patch_jump(code, jump_to_end))
            }
            Expression::Function(func) => {
                self.compile_nested_function(func)?;
                self.emit_closure(fn_idx, func)
            }
        }
    }

    /// Compiles a nested function literal's body (once) — and, through it,
    /// any literals inside. Generic originals stay uncompiled; their
    /// specialisations carry pending bodies instead.
    fn compile_nested_function(&mut self, func: &FunctionExpr) -> ScriptResult<()> {
        let child_idx = func.index.expect("registered function literal");
        let child = self.manager.get(self.module_id).function(child_idx);
        if child.is_generic() || !child.code().is_empty() {
            return Ok(());
        }
        self.compile_block(child_idx, &func.body)
    }

    /// Emits the closure (or plain function) value for a literal.
    fn emit_closure(&mut self, fn_idx: Index, func: &FunctionExpr) -> ScriptResult<()> {
        let child_idx = func.index.expect("registered function literal");
        let child_table = self.manager.get(self.module_id).function(child_idx).symtab();
        let captures = self
            .manager
            .get(self.module_id)
            .symtabs()
            .table(child_table)
            .count_nonlocals();
        if captures == 0 {
            return self.code(fn_idx, |code| {
                code.add_opcode1(Opcode::LoadFunction, arg8(child_idx as usize)?);
                Ok(())
            });
        }
        // push each captured value: find the matching symbol here by name
        let capture_names: Vec<String> = self
            .manager
            .get(self.module_id)
            .symtabs()
            .table(child_table)
            .symbols()
            .iter()
            .filter(|sym| sym.kind() == SymbolKind::Nonlocal)
            .map(|sym| sym.name().to_owned())
            .collect();
        let own_table = self.manager.get(self.module_id).function(fn_idx).symtab();
        for name in capture_names {
            let idx = self
                .manager
                .get(self.module_id)
                .symtabs()
                .table(own_table)
                .find_by_name(&name)
                .ok_or_else(|| ErrorKind::UndefinedName { name: name.clone() })?;
            let sym_ref = SymbolRef {
                module: self.module_id,
                table: own_table,
                index: idx,
            };
            self.emit_symbol(fn_idx, sym_ref)?;
        }
        self.code(fn_idx, |code| {
            code.add_opcode1(Opcode::MakeClosure, arg8(child_idx as usize)?);
            Ok(())
        })
    }

    /// Emits the value or call a symbol denotes.
    fn emit_symbol(&mut self, fn_idx: Index, sym_ref: SymbolRef) -> ScriptResult<()> {
        let sym = self.symbol_clone(sym_ref);
        match sym.kind() {
            SymbolKind::Module => self.code(fn_idx, |code| {
                code.add_opcode1(Opcode::LoadModule, arg8(sym.index() as usize)?);
                Ok(())
            }),
            SymbolKind::Nonlocal => {
                let (offset, ti) = {
                    let function = self.manager.get(self.module_id).function(fn_idx);
                    let (offset, ti) = function.nonlocal_offset_and_type(sym.index());
                    (offset, ti.clone())
                };
                self.emit_copy_with_increfs(fn_idx, Opcode::CopyArgument, offset, &ti)
            }
            SymbolKind::Parameter => {
                let (offset, ti) = {
                    let function = self.manager.get(self.module_id).function(fn_idx);
                    let offset = function.parameter_offset(sym.index()) + function.raw_size_of_nonlocals();
                    (offset, function.parameter(sym.index()).clone())
                };
                self.emit_copy_with_increfs(fn_idx, Opcode::CopyArgument, offset, &ti)
            }
            SymbolKind::Value => {
                if self.is_module_level(sym_ref) {
                    // a static; cross-module statics are copied in first
                    let static_idx = if sym_ref.module == self.module_id {
                        sym.index()
                    } else {
                        let value = self
                            .manager
                            .get(sym_ref.module)
                            .value(sym.index())
                            .make_copy(self.heap);
                        self.manager.get_mut(self.module_id).add_value(value, self.heap)
                    };
                    self.code(fn_idx, |code| {
                        code.add_opcode1(Opcode::LoadStatic, arg8(static_idx as usize)?);
                        Ok(())
                    })
                } else {
                    let (offset, ti) = {
                        let function = self.manager.get(self.module_id).function(fn_idx);
                        (function.value_offset(sym.index()), function.value(sym.index()).clone())
                    };
                    self.emit_copy_with_increfs(fn_idx, Opcode::CopyVariable, offset, &ti)
                }
            }
            SymbolKind::Function => {
                let (target_module, target_idx) = self.resolve_function_symbol(sym_ref)?;
                if target_module == self.module_id {
                    self.code(fn_idx, |code| {
                        code.add_opcode1(Opcode::Call0, arg8(target_idx as usize)?);
                        Ok(())
                    })
                } else {
                    let import_idx = self
                        .manager
                        .get(self.module_id)
                        .imported_module_index(target_module)
                        .ok_or_else(|| ErrorKind::NotImplemented {
                            what: "call into a module that is not imported".to_owned(),
                        })?;
                    self.code(fn_idx, |code| {
                        if import_idx == 0 {
                            code.add_opcode1(Opcode::Call1, arg8(target_idx as usize)?);
                        } else {
                            code.add_opcode2(Opcode::Call, arg8(import_idx as usize)?, arg8(target_idx as usize)?);
                        }
                        Ok(())
                    })
                }
            }
            SymbolKind::Instruction => {
                let opcode = Opcode::from_repr(sym.index() as u8).ok_or_else(|| ErrorKind::IntrinsicsFunction {
                    message: format!("invalid intrinsic opcode {}", sym.index()),
                })?;
                self.code(fn_idx, |code| {
                    code.add_opcode(opcode);
                    Ok(())
                })
            }
            other => Err(ErrorKind::NotImplemented {
                what: format!("emission for {other:?} symbol"),
            }
            .into()),
        }
    }

    /// Follows recursion sentinels to a concrete function index.
    fn resolve_function_symbol(&self, sym_ref: SymbolRef) -> ScriptResult<(ModuleId, Index)> {
        let mut current = sym_ref;
        loop {
            let sym = self
                .manager
                .get(current.module)
                .symtabs()
                .table(current.table)
                .get(current.index);
            match sym.kind() {
                SymbolKind::Function if sym.index() != NO_INDEX => return Ok((current.module, sym.index())),
                SymbolKind::Function => match sym.reference() {
                    Some(next) => current = next,
                    None => {
                        return Err(ErrorKind::NotImplemented {
                            what: "unresolved function reference".to_owned(),
                        }
                        .into());
                    }
                },
                _ => {
                    return Err(ErrorKind::NotImplemented {
                        what: "recursive reference to a capturing function".to_owned(),
                    }
                    .into());
                }
            }
        }
    }

    /// `Execute` after a call through a symbol that holds a function value
    /// rather than a function.
    fn emit_call_execute(&mut self, fn_idx: Index, sym_ref: SymbolRef) -> ScriptResult<()> {
        let sym = self.symbol_clone(sym_ref);
        if sym.kind() != SymbolKind::Function && sym.kind() != SymbolKind::Instruction && sym.is_callable() {
            self.code(fn_idx, |code| {
                code.add_opcode(Opcode::Execute);
                Ok(())
            })?;
        }
        Ok(())
    }

    /// The type behind a value-like symbol, for bare-reference unwrapping.
    fn value_symbol_type(&self, fn_idx: Index, sym_ref: SymbolRef) -> Option<TypeInfo> {
        let sym = self
            .manager
            .get(sym_ref.module)
            .symtabs()
            .table(sym_ref.table)
            .get(sym_ref.index);
        let function = self.manager.get(self.module_id).function(fn_idx);
        match sym.kind() {
            SymbolKind::Parameter => Some(function.parameter(sym.index()).clone()),
            SymbolKind::Value if !self.is_module_level(sym_ref) => Some(function.value(sym.index()).clone()),
            SymbolKind::Nonlocal => {
                let (_, ti) = function.nonlocal_offset_and_type(sym.index());
                Some(ti.clone())
            }
            _ => None,
        }
    }

    /// One `Execute` per parameterless-function layer of `ty`.
    fn emit_nullary_unwrap(&mut self, fn_idx: Index, ty: &TypeInfo) -> ScriptResult<()> {
        let mut current = ty.clone();
        loop {
            match current {
                TypeInfo::Function(sig) if sig.params.is_empty() => {
                    self.code(fn_idx, |code| {
                        code.add_opcode(Opcode::Execute);
                        Ok(())
                    })?;
                    current = sig.return_type;
                }
                _ => return Ok(()),
            }
        }
    }

    fn emit_execs(&mut self, fn_idx: Index, count: usize) -> ScriptResult<()> {
        for _ in 0..count {
            self.code(fn_idx, |code| {
                code.add_opcode(Opcode::Execute);
                Ok(())
            })?;
        }
        Ok(())
    }

    /// Copy + one IncRef per heap slot the copied value owns.
    fn emit_copy_with_increfs(
        &mut self,
        fn_idx: Index,
        opcode: Opcode,
        offset: usize,
        ti: &TypeInfo,
    ) -> ScriptResult<()> {
        let size = ti.size();
        let mut slots = Vec::new();
        ti.for_each_heap_slot(&mut |ofs| slots.push(ofs));
        self.code(fn_idx, |code| {
            code.add_opcode2(opcode, local8(offset)?, local8(size)?);
            for slot in slots {
                code.add_opcode1(Opcode::IncRef, local8(slot)?);
            }
            Ok(())
        })
    }

    /// Adds an interned static and loads it.
    fn emit_static(&mut self, fn_idx: Index, value: Value) -> ScriptResult<()> {
        let idx = self.manager.get_mut(self.module_id).add_value(value, self.heap);
        self.code(fn_idx, |code| {
            code.add_opcode1(Opcode::LoadStatic, arg8(idx as usize)?);
            Ok(())
        })
    }

    /// The return epilogue: unwrap Executes, per-slot DecRefs for locals
    /// (top-down), non-locals and parameters (layout order), then Drop.
    fn emit_return(&mut self, fn_idx: Index, unwrap_execs: usize) -> ScriptResult<()> {
        self.emit_execs(fn_idx, unwrap_execs)?;
        let (skip, values, nonlocals, params) = {
            let function = self.manager.get(self.module_id).function(fn_idx);
            (
                function.signature().return_type.size(),
                function.values().to_vec(),
                function.nonlocals().to_vec(),
                function.signature().params.to_vec(),
            )
        };
        let drop: usize = values.iter().chain(&nonlocals).chain(&params).map(TypeInfo::size).sum();
        if drop == 0 {
            return Ok(());
        }
        self.code(fn_idx, |code| {
            let mut pos = skip;
            for ti in values.iter().rev() {
                let mut slots = Vec::new();
                ti.for_each_heap_slot(&mut |ofs| slots.push(ofs));
                for ofs in slots {
                    code.add_opcode1(Opcode::DecRef, local8(pos + ofs)?);
                }
                pos += ti.size();
            }
            for ti in nonlocals.iter().chain(&params) {
                let mut slots = Vec::new();
                ti.for_each_heap_slot(&mut |ofs| slots.push(ofs));
                for ofs in slots {
                    code.add_opcode1(Opcode::DecRef, local8(pos + ofs)?);
                }
                pos += ti.size();
            }
            code.add_opcode2(Opcode::Drop, local8(skip)?, local8(drop)?);
            Ok(())
        })
    }

    // --- plumbing ---

    fn code<T>(&mut self, fn_idx: Index, emit: impl FnOnce(&mut Code) -> ScriptResult<T>) -> ScriptResult<T> {
        emit(self.manager.get_mut(self.module_id).function_mut(fn_idx).code_mut())
    }

    fn symbol_kind(&self, sym_ref: SymbolRef) -> SymbolKind {
        self.manager
            .get(sym_ref.module)
            .symtabs()
            .table(sym_ref.table)
            .get(sym_ref.index)
            .kind()
    }

    fn symbol_clone(&self, sym_ref: SymbolRef) -> crate::symtab::Symbol {
        self.manager
            .get(sym_ref.module)
            .symtabs()
            .table(sym_ref.table)
            .get(sym_ref.index)
            .clone()
    }

    fn is_module_level(&self, sym_ref: SymbolRef) -> bool {
        sym_ref.table == TableId::ROOT
            || self
                .manager
                .get(sym_ref.module)
                .symtabs()
                .table(sym_ref.table)
                .function()
                .is_none()
    }
}

/// Patches a forward jump argument at `arg_pos` to land just past the last
/// emitted byte.
fn patch_jump(code: &mut Code, arg_pos: usize) -> ScriptResult<()> {
    let distance = code.this_instruction_address() - arg_pos;
    if distance > usize::from(u8::MAX) {
        return Err(ErrorKind::NotImplemented {
            what: "conditional branch exceeds the one-byte jump range".to_owned(),
        }
        .into());
    }
    code.set_arg(arg_pos, distance as u8);
    Ok(())
}

/// One-byte operand for indices and counts.
fn arg8(value: usize) -> ScriptResult<u8> {
    u8::try_from(value).map_err(|_| {
        ErrorKind::NotImplemented {
            what: "operand exceeds the one-byte argument range".to_owned(),
        }
        .into()
    })
}

/// One-byte operand for frame offsets; overflow means the function has too
/// many (or too large) locals.
fn local8(value: usize) -> ScriptResult<u8> {
    u8::try_from(value).map_err(|_| ErrorKind::TooManyLocals.into())
}

fn const_value(value: &ConstValue, heap: &mut Heap) -> Value {
    match value {
        ConstValue::Bool(v) => Value::Bool(*v),
        ConstValue::Byte(v) => Value::Byte(*v),
        ConstValue::Char(v) => Value::Char(*v),
        ConstValue::Int32(v) => Value::Int32(*v),
        ConstValue::Int64(v) => Value::Int64(*v),
        ConstValue::Float32(v) => Value::Float32(*v),
        ConstValue::Float64(v) => Value::Float64(*v),
        ConstValue::Str(v) => Value::string(v, heap),
    }
}
