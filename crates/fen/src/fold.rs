//! Optional constant folder.
//!
//! Runs after type resolution, gated by the interpreter's const-fold flag.
//! Operator calls whose operands are constants are evaluated with the same
//! opcode dispatch the machine uses (`builtin::fold_binary`/`fold_unary` on
//! the opcode of the resolved overload) and replaced with `Literal` nodes.
//! Constant conditions collapse to the taken branch. A `Return` of a
//! capture-free nullary block with a single constant-foldable statement
//! collapses to the bare expression, unwrapping the function's return type
//! the way the emitted `Execute` would have.
//!
//! A fold that does not apply is abandoned silently; semantic errors are
//! never consumed here.

use crate::{
    ast::{Block, ConstValue, Expression, LiteralExpr, Statement},
    bytecode::Opcode,
    error::ScriptResult,
    module::{ModuleId, ModuleManager},
    symtab::{Index, SymbolKind, SymbolRef, TableId},
    value::Value,
};

/// Runs the folder over a function body.
pub fn fold_block(
    manager: &mut ModuleManager,
    module_id: ModuleId,
    fn_idx: Index,
    block: &mut Block,
) -> ScriptResult<()> {
    let mut folder = Folder { manager, module_id };
    folder.process_block(fn_idx, block)
}

struct Folder<'a> {
    manager: &'a mut ModuleManager,
    module_id: ModuleId,
}

impl Folder<'_> {
    fn process_block(&mut self, fn_idx: Index, block: &mut Block) -> ScriptResult<()> {
        for stmt in &mut block.statements {
            match stmt {
                Statement::Definition(def) => {
                    self.fold_expr(fn_idx, &mut def.expression)?;
                }
                Statement::Invocation(inv) => {
                    self.fold_expr(fn_idx, &mut inv.expression)?;
                }
                Statement::Return(ret) => {
                    self.fold_expr(fn_idx, &mut ret.expression)?;
                    if self.collapse_trivial_block(&mut ret.expression) {
                        // one nullary layer (and its Execute) disappeared
                        ret.unwrap_execs = ret.unwrap_execs.saturating_sub(1);
                    }
                }
            }
        }
        Ok(())
    }

    /// Folds an expression in place, returning its constant value if it
    /// became (or already was) one.
    fn fold_expr(&mut self, fn_idx: Index, expr: &mut Expression) -> ScriptResult<Option<ConstValue>> {
        match expr {
            Expression::Integer(lit) => Ok(Some(ConstValue::Int32(lit.value))),
            Expression::Float(lit) => Ok(Some(ConstValue::Float32(lit.value))),
            Expression::Char(lit) => Ok(Some(ConstValue::Char(lit.value))),
            Expression::StringLit(lit) => Ok(Some(ConstValue::Str(lit.value.clone()))),
            Expression::Literal(lit) => Ok(Some(lit.value.clone())),
            Expression::Tuple(tuple) => {
                for item in &mut tuple.items {
                    self.fold_expr(fn_idx, item)?;
                }
                Ok(None)
            }
            Expression::List(list) => {
                for item in &mut list.items {
                    self.fold_expr(fn_idx, item)?;
                }
                Ok(None)
            }
            Expression::Reference(reference) => {
                let Some(sym_ref) = reference.identifier.symbol else {
                    return Ok(None);
                };
                Ok(self.static_const(sym_ref))
            }
            Expression::Call(call) => {
                self.fold_expr(fn_idx, &mut call.callable)?;
                for arg in &mut call.args {
                    self.fold_expr(fn_idx, arg)?;
                }
                Ok(None)
            }
            Expression::OpCall(opcall) => {
                let mut consts = Vec::with_capacity(opcall.args.len());
                let mut all_const = true;
                for arg in &mut opcall.args {
                    match self.fold_expr(fn_idx, arg)? {
                        Some(value) => consts.push(value),
                        None => all_const = false,
                    }
                }
                if !all_const {
                    return Ok(None);
                }
                let Some(opcode) = self.resolved_opcode(opcall.identifier.as_ref().and_then(|id| id.symbol)) else {
                    return Ok(None);
                };
                let folded = match consts.as_slice() {
                    [operand] => crate::builtin::fold_unary(opcode, operand),
                    [lhs, rhs] => crate::builtin::fold_binary(opcode, lhs, rhs),
                    _ => None,
                };
                if let Some(value) = folded {
                    *expr = Expression::Literal(LiteralExpr {
                        value: value.clone(),
                        source_info: expr.source_info(),
                    });
                    return Ok(Some(value));
                }
                Ok(None)
            }
            Expression::Condition(cond) => {
                let folded_cond = self.fold_expr(fn_idx, &mut cond.cond)?;
                match folded_cond {
                    Some(ConstValue::Bool(flag)) => {
                        let mut taken = if flag {
                            std::mem::replace(&mut cond.then_expr, Expression::void_reference())
                        } else {
                            std::mem::replace(&mut cond.else_expr, Expression::void_reference())
                        };
                        let value = self.fold_expr(fn_idx, &mut taken)?;
                        *expr = taken;
                        Ok(value)
                    }
                    _ => {
                        self.fold_expr(fn_idx, &mut cond.then_expr)?;
                        self.fold_expr(fn_idx, &mut cond.else_expr)?;
                        Ok(None)
                    }
                }
            }
            Expression::Function(func) => {
                let child_idx = func.index.expect("registered function literal");
                if !self.manager.get(self.module_id).function(child_idx).is_generic() {
                    self.process_block(child_idx, &mut func.body)?;
                }
                Ok(None)
            }
        }
    }

    /// A returned capture-free nullary block whose single statement is a
    /// constant return collapses to the bare constant; the caller drops one
    /// of the `Execute`s that would have evaluated the block.
    fn collapse_trivial_block(&mut self, expr: &mut Expression) -> bool {
        let Expression::Function(func) = expr else { return false };
        let Some(child_idx) = func.index else { return false };
        let child = self.manager.get(self.module_id).function(child_idx);
        if !child.signature().params.is_empty() || !child.nonlocals().is_empty() {
            return false;
        }
        if func.body.statements.len() != 1 {
            return false;
        }
        let Statement::Return(ret) = &func.body.statements[0] else {
            return false;
        };
        if !matches!(
            ret.expression,
            Expression::Literal(_)
                | Expression::Integer(_)
                | Expression::Float(_)
                | Expression::Char(_)
                | Expression::StringLit(_)
        ) {
            return false;
        }
        let Statement::Return(ret) = func.body.statements.remove(0) else {
            unreachable!();
        };
        *expr = ret.expression;
        true
    }

    /// Constant value of a module-level static (builtin `true`/`false` and
    /// interned literals); `None` for anything else.
    fn static_const(&self, sym_ref: SymbolRef) -> Option<ConstValue> {
        let module = self.manager.get(sym_ref.module);
        if sym_ref.table != TableId::ROOT {
            return None;
        }
        let sym = module.symtabs().table(sym_ref.table).get(sym_ref.index);
        if sym.kind() != SymbolKind::Value {
            return None;
        }
        match module.value(sym.index()) {
            Value::Bool(v) => Some(ConstValue::Bool(*v)),
            Value::Byte(v) => Some(ConstValue::Byte(*v)),
            Value::Char(v) => Some(ConstValue::Char(*v)),
            Value::Int32(v) => Some(ConstValue::Int32(*v)),
            Value::Int64(v) => Some(ConstValue::Int64(*v)),
            Value::Float32(v) => Some(ConstValue::Float32(*v)),
            Value::Float64(v) => Some(ConstValue::Float64(*v)),
            _ => None,
        }
    }

    /// The opcode implementing a resolved builtin operator function: the
    /// single instruction of its body.
    fn resolved_opcode(&self, sym_ref: Option<SymbolRef>) -> Option<Opcode> {
        let sym_ref = sym_ref?;
        let module = self.manager.get(sym_ref.module);
        let sym = module.symtabs().table(sym_ref.table).get(sym_ref.index);
        if sym.kind() != SymbolKind::Function {
            return None;
        }
        let function = module.function(sym.index());
        let code = function.code().bytes();
        if code.len() != 1 {
            return None;
        }
        Opcode::from_repr(code[0])
    }
}
