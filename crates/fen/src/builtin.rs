//! The builtin module: primitive constants, size-polymorphic operator
//! functions and instruction intrinsics.
//!
//! Operator functions are real `Function`s whose code is the single opcode
//! implementing them; calling `add` on Int32s resolves (via the symbol
//! `next` chain) to `add_32`, whose body is just `Add32`. The binary
//! opcodes consume their own arguments, so these bodies need no epilogue.
//!
//! Intrinsics (`__add_32`, …) are `Instruction` symbols whose index is the
//! opcode byte; the emitter writes them directly, bypassing type checking.

use crate::{
    ast::ConstValue,
    bytecode::{Code, Opcode},
    error::{ErrorKind, ScriptError, ScriptResult},
    heap::Heap,
    module::{Function, ModuleId, ModuleManager},
    symtab::{Symbol, SymbolKind, SymbolRef, TableId},
    typeinfo::TypeInfo,
    value::Value,
};

/// Builds the builtin module. Must be the first module registered — the
/// `Call1` opcode and the `__`-prefix lookup both assume import index 0.
pub fn build(manager: &mut ModuleManager, heap: &mut Heap) -> ModuleId {
    let id = manager.add_module("builtin");
    add_constant(manager, id, "void", Value::Void, heap);
    add_constant(manager, id, "false", Value::Bool(false), heap);
    add_constant(manager, id, "true", Value::Bool(true), heap);

    add_logical_op_function(manager, id, "or", Opcode::LogicalOr);
    add_logical_op_function(manager, id, "and", Opcode::LogicalAnd);

    add_comparison_op_function(manager, id, "eq", Opcode::Equal8, Opcode::EqualString);
    add_comparison_op_function(manager, id, "ne", Opcode::NotEqual8, Opcode::NotEqualString);
    add_comparison_op_function(manager, id, "le", Opcode::LessEqual8, Opcode::LessEqualString);
    add_comparison_op_function(manager, id, "ge", Opcode::GreaterEqual8, Opcode::GreaterEqualString);
    add_comparison_op_function(manager, id, "lt", Opcode::LessThan8, Opcode::LessThanString);
    add_comparison_op_function(manager, id, "gt", Opcode::GreaterThan8, Opcode::GreaterThanString);

    add_binary_op_function(manager, id, "bit_or", Opcode::BitwiseOr8);
    add_binary_op_function(manager, id, "bit_and", Opcode::BitwiseAnd8);
    add_binary_op_function(manager, id, "bit_xor", Opcode::BitwiseXor8);
    add_binary_op_function(manager, id, "shift_left", Opcode::ShiftLeft8);
    add_binary_op_function(manager, id, "shift_right", Opcode::ShiftRight8);
    add_binary_op_function(manager, id, "add", Opcode::Add8);
    add_binary_op_function(manager, id, "sub", Opcode::Sub8);
    add_binary_op_function(manager, id, "mul", Opcode::Mul8);
    add_binary_op_function(manager, id, "div", Opcode::Div8);
    add_binary_op_function(manager, id, "mod", Opcode::Mod8);
    add_binary_op_function(manager, id, "exp", Opcode::Exp8);

    add_logical_not_function(manager, id);
    add_unary_op_function(manager, id, "bit_not", Opcode::BitwiseNot8);
    add_unary_op_function(manager, id, "neg", Opcode::Neg8);
    add_subscript_function(manager, id);
    add_intrinsics(manager, id);
    id
}

/// Resolves a type name to a TypeInfo, or fails with *UnknownTypeName*.
pub fn type_by_name(name: &str) -> ScriptResult<TypeInfo> {
    Ok(match name {
        "Void" => TypeInfo::Void,
        "Bool" => TypeInfo::Bool,
        "Byte" => TypeInfo::Byte,
        "Char" => TypeInfo::Char,
        "Int" | "Int32" => TypeInfo::Int32,
        "Int64" => TypeInfo::Int64,
        "Float" | "Float32" => TypeInfo::Float32,
        "Float64" => TypeInfo::Float64,
        "String" => TypeInfo::String,
        _ => {
            return Err(ScriptError::new(ErrorKind::UnknownTypeName { name: name.to_owned() }));
        }
    })
}

fn add_constant(manager: &mut ModuleManager, id: ModuleId, name: &str, value: Value, heap: &mut Heap) {
    let module = manager.get_mut(id);
    let idx = module.add_value(value, heap);
    module
        .symtabs_mut()
        .add_symbol(TableId::ROOT, Symbol::new(name, SymbolKind::Value, idx));
}

/// Registers one operator function and returns its root-table symbol ref.
fn add_op_function(
    manager: &mut ModuleManager,
    id: ModuleId,
    name: &str,
    params: &[TypeInfo],
    return_type: TypeInfo,
    opcode: Opcode,
) -> SymbolRef {
    let module = manager.get_mut(id);
    let symtab = module.symtabs_mut().add_child(TableId::ROOT, name);
    let mut function = Function::new(id, symtab);
    let param_names = ["lhs", "rhs"];
    for (i, param) in params.iter().enumerate() {
        module
            .symtabs_mut()
            .add_symbol(symtab, Symbol::new(param_names[i], SymbolKind::Parameter, i as u32));
        function.signature_mut().add_parameter(param.clone());
    }
    function.signature_mut().return_type = return_type;
    let mut code = Code::new();
    code.add_opcode(opcode);
    *function.code_mut() = code;
    let fn_idx = module.add_function(function);
    module.symtabs_mut().table_mut(symtab).set_function(fn_idx);
    let sym_idx = module
        .symtabs_mut()
        .add_symbol(TableId::ROOT, Symbol::new(name, SymbolKind::Function, fn_idx));
    SymbolRef {
        module: id,
        table: TableId::ROOT,
        index: sym_idx,
    }
}

fn chain(manager: &mut ModuleManager, refs: &[SymbolRef]) {
    for pair in refs.windows(2) {
        let module = manager.get_mut(pair[0].module);
        module
            .symtabs_mut()
            .table_mut(pair[0].table)
            .get_mut(pair[0].index)
            .set_next(pair[1]);
    }
}

fn add_logical_op_function(manager: &mut ModuleManager, id: ModuleId, name: &str, opcode: Opcode) {
    add_op_function(
        manager,
        id,
        name,
        &[TypeInfo::Bool, TypeInfo::Bool],
        TypeInfo::Bool,
        opcode,
    );
}

/// Comparison chain: Byte, Int32, Int64, then String.
fn add_comparison_op_function(
    manager: &mut ModuleManager,
    id: ModuleId,
    name: &str,
    opcode8: Opcode,
    opcode_str: Opcode,
) {
    let p8 = add_op_function(
        manager,
        id,
        name,
        &[TypeInfo::Byte, TypeInfo::Byte],
        TypeInfo::Bool,
        opcode8,
    );
    let p32 = add_op_function(
        manager,
        id,
        name,
        &[TypeInfo::Int32, TypeInfo::Int32],
        TypeInfo::Bool,
        opcode8.widened(1),
    );
    let p64 = add_op_function(
        manager,
        id,
        name,
        &[TypeInfo::Int64, TypeInfo::Int64],
        TypeInfo::Bool,
        opcode8.widened(2),
    );
    let pstr = add_op_function(
        manager,
        id,
        name,
        &[TypeInfo::String, TypeInfo::String],
        TypeInfo::Bool,
        opcode_str,
    );
    chain(manager, &[p8, p32, p64, pstr]);
}

/// Arithmetic/bitwise chain: Byte, Int32, Int64.
fn add_binary_op_function(manager: &mut ModuleManager, id: ModuleId, name: &str, opcode8: Opcode) {
    let p8 = add_op_function(
        manager,
        id,
        name,
        &[TypeInfo::Byte, TypeInfo::Byte],
        TypeInfo::Byte,
        opcode8,
    );
    let p32 = add_op_function(
        manager,
        id,
        name,
        &[TypeInfo::Int32, TypeInfo::Int32],
        TypeInfo::Int32,
        opcode8.widened(1),
    );
    let p64 = add_op_function(
        manager,
        id,
        name,
        &[TypeInfo::Int64, TypeInfo::Int64],
        TypeInfo::Int64,
        opcode8.widened(2),
    );
    chain(manager, &[p8, p32, p64]);
}

fn add_logical_not_function(manager: &mut ModuleManager, id: ModuleId) {
    add_op_function(
        manager,
        id,
        "not",
        &[TypeInfo::Bool],
        TypeInfo::Bool,
        Opcode::LogicalNot,
    );
}

fn add_unary_op_function(manager: &mut ModuleManager, id: ModuleId, name: &str, opcode8: Opcode) {
    let p8 = add_op_function(manager, id, name, &[TypeInfo::Byte], TypeInfo::Byte, opcode8);
    let p32 = add_op_function(
        manager,
        id,
        name,
        &[TypeInfo::Int32],
        TypeInfo::Int32,
        opcode8.widened(1),
    );
    let p64 = add_op_function(
        manager,
        id,
        name,
        &[TypeInfo::Int64],
        TypeInfo::Int64,
        opcode8.widened(2),
    );
    chain(manager, &[p8, p32, p64]);
}

fn add_subscript_function(manager: &mut ModuleManager, id: ModuleId) {
    add_op_function(
        manager,
        id,
        "subscript",
        &[TypeInfo::list_of(TypeInfo::Int32), TypeInfo::Int32],
        TypeInfo::Int32,
        Opcode::Subscript32,
    );
}

/// Adds `__<opcode>` Instruction symbols for every zero-arg opcode except
/// `Execute` (which needs stack setup no intrinsic call site can provide).
fn add_intrinsics(manager: &mut ModuleManager, id: ModuleId) {
    let module = manager.get_mut(id);
    for byte in 0..=Opcode::ZERO_ARG_LAST as u8 {
        let opcode = Opcode::from_repr(byte).expect("contiguous zero-arg band");
        if opcode == Opcode::Execute {
            continue;
        }
        let name = format!("__{}", opcode_snake_name(opcode));
        module
            .symtabs_mut()
            .add_symbol(TableId::ROOT, Symbol::new(name, SymbolKind::Instruction, u32::from(byte)));
    }
}

/// `Equal8` -> `equal_8`, `BitwiseNot32` -> `bitwise_not_32`,
/// `EqualString` -> `equal_string`.
fn opcode_snake_name(opcode: Opcode) -> String {
    let camel = opcode.to_string();
    let mut snake = String::with_capacity(camel.len() + 4);
    let mut prev_is_digit = false;
    for (i, ch) in camel.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                snake.push('_');
            }
            snake.push(ch.to_ascii_lowercase());
        } else if ch.is_ascii_digit() {
            if !prev_is_digit {
                snake.push('_');
            }
            snake.push(ch);
        } else {
            snake.push(ch);
        }
        prev_is_digit = ch.is_ascii_digit();
    }
    snake
}

// --- constant-folding dispatch ---
//
// The folder evaluates the same opcode the compiled code would execute,
// on `ConstValue`s instead of stack bytes.

/// Evaluates a binary opcode on two constants. `None` when the opcode does
/// not apply to the operand shapes (the fold is then abandoned).
#[must_use]
pub fn fold_binary(opcode: Opcode, lhs: &ConstValue, rhs: &ConstValue) -> Option<ConstValue> {
    use ConstValue as C;
    use Opcode as Op;
    Some(match (opcode, lhs, rhs) {
        (Op::LogicalOr, C::Bool(a), C::Bool(b)) => C::Bool(*a || *b),
        (Op::LogicalAnd, C::Bool(a), C::Bool(b)) => C::Bool(*a && *b),

        (Op::Equal8, C::Byte(a), C::Byte(b)) => C::Bool(a == b),
        (Op::NotEqual8, C::Byte(a), C::Byte(b)) => C::Bool(a != b),
        (Op::LessEqual8, C::Byte(a), C::Byte(b)) => C::Bool(a <= b),
        (Op::GreaterEqual8, C::Byte(a), C::Byte(b)) => C::Bool(a >= b),
        (Op::LessThan8, C::Byte(a), C::Byte(b)) => C::Bool(a < b),
        (Op::GreaterThan8, C::Byte(a), C::Byte(b)) => C::Bool(a > b),

        (Op::Equal32, C::Int32(a), C::Int32(b)) => C::Bool(a == b),
        (Op::NotEqual32, C::Int32(a), C::Int32(b)) => C::Bool(a != b),
        (Op::LessEqual32, C::Int32(a), C::Int32(b)) => C::Bool(a <= b),
        (Op::GreaterEqual32, C::Int32(a), C::Int32(b)) => C::Bool(a >= b),
        (Op::LessThan32, C::Int32(a), C::Int32(b)) => C::Bool(a < b),
        (Op::GreaterThan32, C::Int32(a), C::Int32(b)) => C::Bool(a > b),

        (Op::Equal64, C::Int64(a), C::Int64(b)) => C::Bool(a == b),
        (Op::NotEqual64, C::Int64(a), C::Int64(b)) => C::Bool(a != b),
        (Op::LessEqual64, C::Int64(a), C::Int64(b)) => C::Bool(a <= b),
        (Op::GreaterEqual64, C::Int64(a), C::Int64(b)) => C::Bool(a >= b),
        (Op::LessThan64, C::Int64(a), C::Int64(b)) => C::Bool(a < b),
        (Op::GreaterThan64, C::Int64(a), C::Int64(b)) => C::Bool(a > b),

        (Op::EqualString, C::Str(a), C::Str(b)) => C::Bool(a == b),
        (Op::NotEqualString, C::Str(a), C::Str(b)) => C::Bool(a != b),
        (Op::LessEqualString, C::Str(a), C::Str(b)) => C::Bool(a <= b),
        (Op::GreaterEqualString, C::Str(a), C::Str(b)) => C::Bool(a >= b),
        (Op::LessThanString, C::Str(a), C::Str(b)) => C::Bool(a < b),
        (Op::GreaterThanString, C::Str(a), C::Str(b)) => C::Bool(a > b),

        (Op::BitwiseOr8, C::Byte(a), C::Byte(b)) => C::Byte(a | b),
        (Op::BitwiseAnd8, C::Byte(a), C::Byte(b)) => C::Byte(a & b),
        (Op::BitwiseXor8, C::Byte(a), C::Byte(b)) => C::Byte(a ^ b),
        (Op::ShiftLeft8, C::Byte(a), C::Byte(b)) => C::Byte(a.wrapping_shl(u32::from(*b))),
        (Op::ShiftRight8, C::Byte(a), C::Byte(b)) => C::Byte(a.wrapping_shr(u32::from(*b))),
        (Op::Add8, C::Byte(a), C::Byte(b)) => C::Byte(a.wrapping_add(*b)),
        (Op::Sub8, C::Byte(a), C::Byte(b)) => C::Byte(a.wrapping_sub(*b)),
        (Op::Mul8, C::Byte(a), C::Byte(b)) => C::Byte(a.wrapping_mul(*b)),
        (Op::Div8, C::Byte(a), C::Byte(b)) => C::Byte(a.checked_div(*b)?),
        (Op::Mod8, C::Byte(a), C::Byte(b)) => C::Byte(a.checked_rem(*b)?),
        (Op::Exp8, C::Byte(a), C::Byte(b)) => C::Byte(f64::from(*a).powf(f64::from(*b)) as u8),

        (Op::BitwiseOr32, C::Int32(a), C::Int32(b)) => C::Int32(a | b),
        (Op::BitwiseAnd32, C::Int32(a), C::Int32(b)) => C::Int32(a & b),
        (Op::BitwiseXor32, C::Int32(a), C::Int32(b)) => C::Int32(a ^ b),
        (Op::ShiftLeft32, C::Int32(a), C::Int32(b)) => C::Int32(a.wrapping_shl(*b as u32)),
        (Op::ShiftRight32, C::Int32(a), C::Int32(b)) => C::Int32(a.wrapping_shr(*b as u32)),
        (Op::Add32, C::Int32(a), C::Int32(b)) => C::Int32(a.wrapping_add(*b)),
        (Op::Sub32, C::Int32(a), C::Int32(b)) => C::Int32(a.wrapping_sub(*b)),
        (Op::Mul32, C::Int32(a), C::Int32(b)) => C::Int32(a.wrapping_mul(*b)),
        (Op::Div32, C::Int32(a), C::Int32(b)) => C::Int32(a.checked_div(*b)?),
        (Op::Mod32, C::Int32(a), C::Int32(b)) => C::Int32(a.checked_rem(*b)?),
        (Op::Exp32, C::Int32(a), C::Int32(b)) => C::Int32(f64::from(*a).powf(f64::from(*b)) as i32),

        (Op::BitwiseOr64, C::Int64(a), C::Int64(b)) => C::Int64(a | b),
        (Op::BitwiseAnd64, C::Int64(a), C::Int64(b)) => C::Int64(a & b),
        (Op::BitwiseXor64, C::Int64(a), C::Int64(b)) => C::Int64(a ^ b),
        (Op::ShiftLeft64, C::Int64(a), C::Int64(b)) => C::Int64(a.wrapping_shl(*b as u32)),
        (Op::ShiftRight64, C::Int64(a), C::Int64(b)) => C::Int64(a.wrapping_shr(*b as u32)),
        (Op::Add64, C::Int64(a), C::Int64(b)) => C::Int64(a.wrapping_add(*b)),
        (Op::Sub64, C::Int64(a), C::Int64(b)) => C::Int64(a.wrapping_sub(*b)),
        (Op::Mul64, C::Int64(a), C::Int64(b)) => C::Int64(a.wrapping_mul(*b)),
        (Op::Div64, C::Int64(a), C::Int64(b)) => C::Int64(a.checked_div(*b)?),
        (Op::Mod64, C::Int64(a), C::Int64(b)) => C::Int64(a.checked_rem(*b)?),
        (Op::Exp64, C::Int64(a), C::Int64(b)) => C::Int64((*a as f64).powf(*b as f64) as i64),

        _ => return None,
    })
}

/// Evaluates a unary opcode on a constant.
#[must_use]
pub fn fold_unary(opcode: Opcode, operand: &ConstValue) -> Option<ConstValue> {
    use ConstValue as C;
    use Opcode as Op;
    Some(match (opcode, operand) {
        (Op::LogicalNot, C::Bool(v)) => C::Bool(!v),
        (Op::BitwiseNot8, C::Byte(v)) => C::Byte(!v),
        (Op::BitwiseNot32, C::Int32(v)) => C::Int32(!v),
        (Op::BitwiseNot64, C::Int64(v)) => C::Int64(!v),
        (Op::Neg8, C::Byte(v)) => C::Byte(v.wrapping_neg()),
        (Op::Neg32, C::Int32(v)) => C::Int32(v.wrapping_neg()),
        (Op::Neg64, C::Int64(v)) => C::Int64(v.wrapping_neg()),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_constants_and_chains() {
        let mut heap = Heap::new();
        let mut manager = ModuleManager::new();
        let id = build(&mut manager, &mut heap);
        let module = manager.get(id);
        let root = module.symtabs().table(TableId::ROOT);

        let void_idx = root.find_by_name("void").unwrap();
        assert_eq!(root.get(void_idx).kind(), SymbolKind::Value);

        // lookup("add") resolves the 8-bit entry; the chain walks 32 and 64
        let add_idx = root.find_by_name("add").unwrap();
        let add8 = root.get(add_idx);
        assert_eq!(add8.kind(), SymbolKind::Function);
        let fn8 = module.function(add8.index());
        assert_eq!(fn8.signature().params[0], TypeInfo::Byte);
        assert_eq!(fn8.code().bytes(), &[Opcode::Add8 as u8]);

        let add32_ref = add8.next().unwrap();
        let add32 = module.symtabs().table(add32_ref.table).get(add32_ref.index);
        let fn32 = module.function(add32.index());
        assert_eq!(fn32.signature().params[0], TypeInfo::Int32);
        assert_eq!(fn32.code().bytes(), &[Opcode::Add32 as u8]);

        let add64_ref = add32.next().unwrap();
        let add64 = module.symtabs().table(add64_ref.table).get(add64_ref.index);
        assert_eq!(
            module.function(add64.index()).code().bytes(),
            &[Opcode::Add64 as u8]
        );
        assert!(add64.next().is_none());

        // comparison chains end with a String link
        let eq_idx = root.find_by_name("eq").unwrap();
        let mut sym = root.get(eq_idx);
        let mut last_code = None;
        loop {
            last_code = Some(module.function(sym.index()).code().bytes().to_vec());
            match sym.next() {
                Some(next) => sym = module.symtabs().table(next.table).get(next.index),
                None => break,
            }
        }
        assert_eq!(last_code.unwrap(), vec![Opcode::EqualString as u8]);
    }

    #[test]
    fn intrinsic_names() {
        assert_eq!(opcode_snake_name(Opcode::Noop), "noop");
        assert_eq!(opcode_snake_name(Opcode::Equal8), "equal_8");
        assert_eq!(opcode_snake_name(Opcode::BitwiseNot32), "bitwise_not_32");
        assert_eq!(opcode_snake_name(Opcode::EqualString), "equal_string");
        assert_eq!(opcode_snake_name(Opcode::Subscript32), "subscript_32");
    }

    #[test]
    fn intrinsics_are_registered() {
        let mut heap = Heap::new();
        let mut manager = ModuleManager::new();
        let id = build(&mut manager, &mut heap);
        let root_module = manager.get(id);
        let root = root_module.symtabs().table(TableId::ROOT);
        let idx = root.find_by_name("__add_32").unwrap();
        let sym = root.get(idx);
        assert_eq!(sym.kind(), SymbolKind::Instruction);
        assert_eq!(sym.index(), u32::from(Opcode::Add32 as u8));
        assert!(root.find_by_name("__execute").is_none());
    }

    #[test]
    fn fold_matches_vm_semantics() {
        use ConstValue as C;
        assert_eq!(
            fold_binary(Opcode::Add32, &C::Int32(1), &C::Int32(2)),
            Some(C::Int32(3))
        );
        assert_eq!(
            fold_binary(Opcode::Exp32, &C::Int32(3), &C::Int32(2)),
            Some(C::Int32(9))
        );
        assert_eq!(
            fold_binary(Opcode::EqualString, &C::Str("ab".into()), &C::Str("ab".into())),
            Some(C::Bool(true))
        );
        assert_eq!(fold_binary(Opcode::Div32, &C::Int32(1), &C::Int32(0)), None);
        assert_eq!(fold_unary(Opcode::Neg32, &C::Int32(5)), Some(C::Int32(-5)));
        assert_eq!(fold_binary(Opcode::Add32, &C::Int32(1), &C::Bool(true)), None);
    }
}
