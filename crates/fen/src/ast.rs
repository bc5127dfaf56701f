//! Abstract syntax tree.
//!
//! Nodes are plain tagged unions with a `match`-based traversal in each
//! pass (the visitor double-dispatch of a class-hierarchy design collapses
//! away). Fields filled in by the semantic passes (`symbol`, `index`,
//! `symtab`, `type_index`) are skipped by serde so a freshly parsed
//! [`Ast`] can be dumped and reloaded byte-for-byte.
//!
//! `Display` reprints parseable source with explicit parentheses, so
//! reprint followed by reparse yields an α-equivalent tree.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    parse::SourceInfo,
    symtab::{Index, SymbolRef, TableId},
};

/// A parsed module body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ast {
    pub body: Block,
}

/// A sequence of statements with a single `Return` sink (after `finish`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Block {
    pub statements: Vec<Statement>,
    /// Scope of this block, set by the symbol resolver.
    #[serde(skip)]
    pub symtab: Option<TableId>,
}

impl Block {
    /// Normalises the block tail: a trailing `Return` is kept, the last
    /// `Invocation` (skipping definitions) becomes a `Return`, otherwise
    /// `Return void` is appended.
    pub fn finish(&mut self) {
        for stmt in self.statements.iter_mut().rev() {
            match stmt {
                Statement::Definition(_) => {}
                Statement::Return(_) => return,
                Statement::Invocation(inv) => {
                    let expression = std::mem::replace(&mut inv.expression, Expression::void_reference());
                    *stmt = Statement::Return(Return {
                        expression,
                        unwrap_execs: 0,
                    });
                    return;
                }
            }
        }
        self.statements.push(Statement::Return(Return {
            expression: Expression::void_reference(),
            unwrap_execs: 0,
        }));
    }
}

/// A name, annotated with its resolved symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identifier {
    pub name: String,
    #[serde(skip)]
    pub symbol: Option<SymbolRef>,
}

impl Identifier {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbol: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Statement {
    Definition(Definition),
    Invocation(Invocation),
    Return(Return),
}

/// `name [: Type] = expr`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Definition {
    pub variable: Variable,
    pub expression: Expression,
}

/// A bare expression statement; its value is handed to the host callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    pub expression: Expression,
    /// Index of the invoked type in the module's type table, registered by
    /// the type resolver and encoded as `Invoke`'s argument.
    #[serde(skip)]
    pub type_index: Option<Index>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Return {
    pub expression: Expression,
    /// Number of parameterless-function layers the return value unwraps
    /// through (one `Execute` each), recorded by the type resolver.
    #[serde(skip)]
    pub unwrap_execs: usize,
}

/// Definition left-hand side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    pub identifier: Identifier,
    pub type_ann: Option<TypeAst>,
}

/// A constant produced by the constant folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstValue {
    Bool(bool),
    Byte(u8),
    Char(char),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Str(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expression {
    Integer(IntegerLit),
    Float(FloatLit),
    Char(CharLit),
    StringLit(StringLit),
    /// Constant-folder output; never produced by the parser.
    Literal(LiteralExpr),
    Tuple(TupleExpr),
    List(ListExpr),
    Reference(Reference),
    Call(Box<CallExpr>),
    OpCall(Box<OpCallExpr>),
    Condition(Box<ConditionExpr>),
    Function(Box<FunctionExpr>),
}

impl Expression {
    #[must_use]
    pub fn source_info(&self) -> SourceInfo {
        match self {
            Self::Integer(e) => e.source_info,
            Self::Float(e) => e.source_info,
            Self::Char(e) => e.source_info,
            Self::StringLit(e) => e.source_info,
            Self::Literal(e) => e.source_info,
            Self::Tuple(e) => e.source_info,
            Self::List(e) => e.source_info,
            Self::Reference(e) => e.source_info,
            Self::Call(e) => e.source_info,
            Self::OpCall(e) => e.source_info,
            Self::Condition(e) => e.source_info,
            Self::Function(e) => e.source_info,
        }
    }

    /// `Reference("void")` — the implicit return value of empty blocks.
    #[must_use]
    pub fn void_reference() -> Self {
        Self::Reference(Reference {
            identifier: Identifier::new("void"),
            source_info: SourceInfo::default(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegerLit {
    pub value: i32,
    pub source_info: SourceInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloatLit {
    pub value: f32,
    pub source_info: SourceInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharLit {
    pub value: char,
    pub source_info: SourceInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StringLit {
    pub value: String,
    pub source_info: SourceInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiteralExpr {
    pub value: ConstValue,
    pub source_info: SourceInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TupleExpr {
    pub items: Vec<Expression>,
    pub source_info: SourceInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListExpr {
    pub items: Vec<Expression>,
    /// Stack size of one element, recorded by the type resolver for
    /// `MakeList` emission.
    #[serde(skip)]
    pub elem_size: Option<usize>,
    pub source_info: SourceInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub identifier: Identifier,
    pub source_info: SourceInfo,
}

/// `callable arg1 arg2 …`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallExpr {
    pub callable: Expression,
    pub args: Vec<Expression>,
    /// Number of nullary-function layers the call result collapses
    /// through, recorded by the type resolver.
    #[serde(skip)]
    pub wrapped_execs: usize,
    pub source_info: SourceInfo,
}

/// An operator application; rewritten to a call of the builtin function
/// named by the operator before emission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpCallExpr {
    pub op: Operator,
    /// The builtin function name + resolved symbol, synthesised by the
    /// symbol resolver.
    #[serde(skip)]
    pub identifier: Option<Identifier>,
    pub args: Vec<Expression>,
    pub source_info: SourceInfo,
}

/// `if cond then a else b`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionExpr {
    pub cond: Expression,
    pub then_expr: Expression,
    pub else_expr: Expression,
    pub source_info: SourceInfo,
}

/// `fun |params| -> T { body }`, or a bare block (nullary literal).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionExpr {
    pub type_ast: FunctionTypeAst,
    pub body: Block,
    /// Index of the registered function in the module, set by the symbol
    /// resolver.
    #[serde(skip)]
    pub index: Option<Index>,
    /// True for a bare `{ … }` literal (reprinted without `fun ||`).
    pub is_block: bool,
    pub source_info: SourceInfo,
}

// --- type syntax ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TypeAst {
    Name(TypeNameAst),
    Function(Box<FunctionTypeAst>),
    List(Box<ListTypeAst>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeNameAst {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionTypeAst {
    pub params: Vec<ParameterAst>,
    pub result: Option<TypeAst>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListTypeAst {
    pub elem: TypeAst,
}

/// One entry of a parameter list: `name`, `name:Type` or a bare `Type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterAst {
    pub identifier: Option<Identifier>,
    pub type_ast: Option<TypeAst>,
}

// --- operators ---

/// The operator set, with its precedence and associativity table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    // binary
    LogicalOr,
    LogicalAnd,
    Equal,
    NotEqual,
    LessEqual,
    GreaterEqual,
    LessThan,
    GreaterThan,
    BitwiseOr,
    BitwiseAnd,
    BitwiseXor,
    ShiftLeft,
    ShiftRight,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Exp,
    Subscript,
    // unary
    LogicalNot,
    BitwiseNot,
    UnaryPlus,
    UnaryMinus,
}

impl Operator {
    /// Binds an infix token to an operator.
    #[must_use]
    pub fn binary_from_symbol(sym: &str) -> Option<Self> {
        Some(match sym {
            "||" => Self::LogicalOr,
            "&&" => Self::LogicalAnd,
            "==" => Self::Equal,
            "!=" => Self::NotEqual,
            "<=" => Self::LessEqual,
            ">=" => Self::GreaterEqual,
            "<" => Self::LessThan,
            ">" => Self::GreaterThan,
            "|" => Self::BitwiseOr,
            "&" => Self::BitwiseAnd,
            "^" => Self::BitwiseXor,
            "<<" => Self::ShiftLeft,
            ">>" => Self::ShiftRight,
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            "%" => Self::Mod,
            "**" => Self::Exp,
            "!" => Self::Subscript,
            _ => return None,
        })
    }

    /// Binds a prefix token to an operator.
    #[must_use]
    pub fn prefix_from_symbol(sym: &str) -> Option<Self> {
        Some(match sym {
            "!" => Self::LogicalNot,
            "~" => Self::BitwiseNot,
            "+" => Self::UnaryPlus,
            "-" => Self::UnaryMinus,
            _ => return None,
        })
    }

    /// Binary binding strength; higher binds tighter. Unary operators all
    /// sit above the binary levels.
    #[must_use]
    pub fn precedence(self) -> u8 {
        match self {
            Self::LogicalOr => 1,
            Self::LogicalAnd => 2,
            Self::Equal
            | Self::NotEqual
            | Self::LessEqual
            | Self::GreaterEqual
            | Self::LessThan
            | Self::GreaterThan => 3,
            Self::BitwiseOr | Self::BitwiseXor => 4,
            Self::BitwiseAnd => 5,
            Self::ShiftLeft | Self::ShiftRight => 6,
            Self::Add | Self::Sub => 7,
            Self::Mul | Self::Div | Self::Mod => 8,
            Self::Exp => 9,
            Self::Subscript => 10,
            Self::LogicalNot | Self::BitwiseNot | Self::UnaryPlus | Self::UnaryMinus => 11,
        }
    }

    #[must_use]
    pub fn is_right_associative(self) -> bool {
        self == Self::Exp
    }

    #[must_use]
    pub fn is_unary(self) -> bool {
        matches!(
            self,
            Self::LogicalNot | Self::BitwiseNot | Self::UnaryPlus | Self::UnaryMinus
        )
    }

    /// The operator's source spelling.
    #[must_use]
    pub fn to_cstr(self) -> &'static str {
        match self {
            Self::LogicalOr => "||",
            Self::LogicalAnd => "&&",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::LessEqual => "<=",
            Self::GreaterEqual => ">=",
            Self::LessThan => "<",
            Self::GreaterThan => ">",
            Self::BitwiseOr => "|",
            Self::BitwiseAnd => "&",
            Self::BitwiseXor => "^",
            Self::ShiftLeft => "<<",
            Self::ShiftRight => ">>",
            Self::Add | Self::UnaryPlus => "+",
            Self::Sub | Self::UnaryMinus => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Exp => "**",
            Self::Subscript => "!",
            Self::LogicalNot => "!",
            Self::BitwiseNot => "~",
        }
    }

    /// Name of the builtin function implementing the operator.
    /// Unary plus is a no-op and has no function.
    #[must_use]
    pub fn builtin_fn_name(self) -> Option<&'static str> {
        Some(match self {
            Self::LogicalOr => "or",
            Self::LogicalAnd => "and",
            Self::Equal => "eq",
            Self::NotEqual => "ne",
            Self::LessEqual => "le",
            Self::GreaterEqual => "ge",
            Self::LessThan => "lt",
            Self::GreaterThan => "gt",
            Self::BitwiseOr => "bit_or",
            Self::BitwiseAnd => "bit_and",
            Self::BitwiseXor => "bit_xor",
            Self::ShiftLeft => "shift_left",
            Self::ShiftRight => "shift_right",
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Mod => "mod",
            Self::Exp => "exp",
            Self::Subscript => "subscript",
            Self::LogicalNot => "not",
            Self::BitwiseNot => "bit_not",
            Self::UnaryMinus => "neg",
            Self::UnaryPlus => return None,
        })
    }
}

// --- source reprinting ---

impl fmt::Display for Ast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_statements(f, &self.body.statements)
    }
}

fn write_statements(f: &mut fmt::Formatter<'_>, statements: &[Statement]) -> fmt::Result {
    for (i, stmt) in statements.iter().enumerate() {
        if i > 0 {
            write!(f, "; ")?;
        }
        write!(f, "{stmt}")?;
    }
    Ok(())
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Definition(def) => write!(f, "{def}"),
            Self::Invocation(inv) => write!(f, "{}", inv.expression),
            // returns have no surface syntax; a trailing expression
            // reparses into the same Return after Block::finish
            Self::Return(ret) => write!(f, "{}", ret.expression),
        }
    }
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.variable.identifier.name)?;
        if let Some(ty) = &self.variable.type_ann {
            write!(f, ":{ty}")?;
        }
        write!(f, " = {}", self.expression)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(e) => write!(f, "{}", e.value),
            Self::Float(e) => write!(f, "{}", FloatRepr(e.value)),
            Self::Char(e) => write_char_literal(f, e.value),
            Self::StringLit(e) => write_string_literal(f, &e.value),
            Self::Literal(e) => write!(f, "{}", e.value),
            Self::Tuple(e) => {
                write!(f, "(")?;
                for (i, item) in e.items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Self::List(e) => {
                write!(f, "[")?;
                for (i, item) in e.items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Reference(e) => write!(f, "{}", e.identifier.name),
            Self::Call(e) => {
                write!(f, "({}", e.callable)?;
                for arg in &e.args {
                    write!(f, " {arg}")?;
                }
                write!(f, ")")
            }
            Self::OpCall(e) => match e.args.as_slice() {
                [operand] => write!(f, "({}{operand})", e.op.to_cstr()),
                [lhs, rhs] => write!(f, "({lhs} {} {rhs})", e.op.to_cstr()),
                _ => write!(f, "(<opcall {}>)", e.op.to_cstr()),
            },
            Self::Condition(e) => {
                write!(f, "(if {} then {} else {})", e.cond, e.then_expr, e.else_expr)
            }
            Self::Function(e) => write!(f, "{e}"),
        }
    }
}

impl fmt::Display for FunctionExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_block {
            write!(f, "fun |")?;
            for (i, param) in self.type_ast.params.iter().enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{param}")?;
            }
            write!(f, "| ")?;
            if let Some(result) = &self.type_ast.result {
                write!(f, "-> {result} ")?;
            }
        }
        write!(f, "{{ ")?;
        write_statements(f, &self.body.statements)?;
        write!(f, " }}")
    }
}

impl fmt::Display for ParameterAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.identifier, &self.type_ast) {
            (Some(ident), Some(ty)) => write!(f, "{}:{ty}", ident.name),
            (Some(ident), None) => write!(f, "{}", ident.name),
            (None, Some(ty)) => write!(f, "{ty}"),
            (None, None) => Ok(()),
        }
    }
}

impl fmt::Display for TypeAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{}", name.name),
            Self::List(list) => write!(f, "[{}]", list.elem),
            Self::Function(func) => {
                write!(f, "(|")?;
                for (i, param) in func.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, "|")?;
                if let Some(result) = &func.result {
                    write!(f, " -> {result}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Byte(v) => write!(f, "{v}"),
            Self::Char(v) => write_char_literal(f, *v),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float32(v) => write!(f, "{}", FloatRepr(*v)),
            Self::Float64(v) => {
                let mut buffer = ryu::Buffer::new();
                write!(f, "{}", buffer.format(*v))
            }
            Self::Str(v) => write_string_literal(f, v),
        }
    }
}

struct FloatRepr(f32);

impl fmt::Display for FloatRepr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buffer = ryu::Buffer::new();
        write!(f, "{}", buffer.format(self.0))
    }
}

fn write_char_literal(f: &mut fmt::Formatter<'_>, value: char) -> fmt::Result {
    match value {
        '\\' => write!(f, "'\\\\'"),
        '\'' => write!(f, "'\\''"),
        '\n' => write!(f, "'\\n'"),
        '\t' => write!(f, "'\\t'"),
        '\r' => write!(f, "'\\r'"),
        '\0' => write!(f, "'\\0'"),
        other => write!(f, "'{other}'"),
    }
}

fn write_string_literal(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    write!(f, "\"")?;
    for ch in value.chars() {
        match ch {
            '\\' => write!(f, "\\\\")?,
            '"' => write!(f, "\\\"")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '\r' => write!(f, "\\r")?,
            '\0' => write!(f, "\\0")?,
            other => write!(f, "{other}")?,
        }
    }
    write!(f, "\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(expression: Expression) -> Statement {
        Statement::Invocation(Invocation {
            expression,
            type_index: None,
        })
    }

    #[test]
    fn finish_converts_trailing_invocation() {
        let mut block = Block {
            statements: vec![invocation(Expression::Integer(IntegerLit {
                value: 1,
                source_info: SourceInfo::default(),
            }))],
            symtab: None,
        };
        block.finish();
        assert!(matches!(block.statements.last(), Some(Statement::Return(_))));
    }

    #[test]
    fn finish_appends_void_return() {
        let mut block = Block::default();
        block.finish();
        assert_eq!(block.statements.len(), 1);
        let Some(Statement::Return(ret)) = block.statements.last() else {
            panic!("expected return");
        };
        let Expression::Reference(reference) = &ret.expression else {
            panic!("expected reference");
        };
        assert_eq!(reference.identifier.name, "void");
    }

    #[test]
    fn finish_keeps_existing_return() {
        let mut block = Block {
            statements: vec![Statement::Return(Return {
                expression: Expression::void_reference(),
                unwrap_execs: 0,
            })],
            symtab: None,
        };
        block.finish();
        assert_eq!(block.statements.len(), 1);
    }

    #[test]
    fn operator_table() {
        assert_eq!(Operator::binary_from_symbol("**"), Some(Operator::Exp));
        assert!(Operator::Exp.is_right_associative());
        assert!(!Operator::Add.is_right_associative());
        assert!(Operator::Mul.precedence() > Operator::Add.precedence());
        assert!(Operator::Subscript.precedence() > Operator::Exp.precedence());
        assert_eq!(Operator::LogicalNot.to_cstr(), "!");
        assert_eq!(Operator::UnaryPlus.builtin_fn_name(), None);
        assert_eq!(Operator::ShiftRight.builtin_fn_name(), Some("shift_right"));
    }
}
