//! Error type shared by the parser, the semantic pipeline and the machine.
//!
//! Every failure is fatal to the current `eval`/`build_module`/`call`; the
//! error carries the source location and the offending line where one is
//! available, rendered as a caret-underlined snippet.

use std::fmt;

use crate::typeinfo::TypeInfo;

/// Result alias used throughout the crate.
pub type ScriptResult<T> = Result<T, ScriptError>;

/// Source position attached to an error: file, 1-based line and column,
/// plus the text of the line for the caret display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub source_line: String,
}

impl ErrorLocation {
    #[must_use]
    pub fn new(file: impl Into<String>, line: u32, column: u32, source_line: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            column,
            source_line: source_line.into(),
        }
    }
}

/// The error taxonomy of the compile-and-execute pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    // lexical / syntactic
    Parse { message: String },

    // semantic
    UndefinedName { name: String },
    UndefinedTypeName { name: String },
    MultipleDeclaration { name: String },
    UnknownTypeName { name: String },
    MissingExplicitType,
    UnexpectedArgument { index: usize },
    UnexpectedArgumentCount { expected: usize, got: usize },
    UnexpectedArgumentType { index: usize, expected: TypeInfo, got: TypeInfo },
    UnexpectedReturnType { expected: TypeInfo, got: TypeInfo },
    ConditionNotBool,
    DefinitionTypeMismatch { expected: TypeInfo, got: TypeInfo },
    DefinitionParamTypeMismatch { index: usize, expected: TypeInfo, got: TypeInfo },
    BranchTypeMismatch { then_type: TypeInfo, else_type: TypeInfo },
    ListElemTypeMismatch { expected: TypeInfo, got: TypeInfo },
    FunctionNotFound { name: String, args: String, candidates: String },
    TooManyLocals,
    UnsupportedOperands { op: String },
    IntrinsicsFunction { message: String },

    // runtime
    BadInstruction { code: u8 },
    StackUnderflow,
    StackOverflow,
    IndexOutOfBounds { index: i32, len: usize },

    // structural
    NotImplemented { what: String },
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse { message } => write!(f, "parse error: {message}"),
            Self::UndefinedName { name } => write!(f, "undefined name: {name}"),
            Self::UndefinedTypeName { name } => write!(f, "undefined type name: {name}"),
            Self::MultipleDeclaration { name } => write!(f, "multiple declaration of name: {name}"),
            Self::UnknownTypeName { name } => write!(f, "unknown type name: {name}"),
            Self::MissingExplicitType => write!(f, "type cannot be inferred and wasn't specified"),
            Self::UnexpectedArgument { index } => write!(f, "unexpected argument #{index}"),
            Self::UnexpectedArgumentCount { expected, got } => {
                write!(f, "function expects {expected} args, called with {got} args")
            }
            Self::UnexpectedArgumentType { index, expected, got } => {
                write!(f, "function expects {expected} for arg #{index}, called with {got}")
            }
            Self::UnexpectedReturnType { expected, got } => {
                write!(f, "function returns {expected}, body evaluates to {got}")
            }
            Self::ConditionNotBool => write!(f, "condition doesn't evaluate to Bool"),
            Self::DefinitionTypeMismatch { expected, got } => {
                write!(f, "definition type mismatch: specified {expected}, inferred {got}")
            }
            Self::DefinitionParamTypeMismatch { index, expected, got } => {
                write!(
                    f,
                    "definition type mismatch: specified {expected} for param #{index}, inferred {got}"
                )
            }
            Self::BranchTypeMismatch { then_type, else_type } => {
                write!(f, "branch type mismatch: then branch {then_type} else branch {else_type}")
            }
            Self::ListElemTypeMismatch { expected, got } => {
                write!(f, "list element type mismatch: got {got} in list of {expected}")
            }
            Self::FunctionNotFound { name, args, candidates } => {
                write!(f, "function not found: {name} {args}\n   Candidates:\n{candidates}")
            }
            Self::TooManyLocals => write!(f, "too many local values in function"),
            Self::UnsupportedOperands { op } => write!(f, "unsupported operands to '{op}'"),
            Self::IntrinsicsFunction { message } => write!(f, "intrinsics function: {message}"),
            Self::BadInstruction { code } => write!(f, "bad instruction: {code}"),
            Self::StackUnderflow => write!(f, "stack underflow"),
            Self::StackOverflow => write!(f, "stack overflow"),
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "list index out of bounds: {index} not in [0..{}]", len.saturating_sub(1))
            }
            Self::NotImplemented { what } => write!(f, "not implemented: {what}"),
        }
    }
}

/// An error with optional source attribution.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptError {
    pub kind: ErrorKind,
    pub location: Option<ErrorLocation>,
}

impl ScriptError {
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, location: None }
    }

    /// Attaches a location, keeping an already-present one.
    #[must_use]
    pub fn at(mut self, location: ErrorLocation) -> Self {
        if self.location.is_none() {
            self.location = Some(location);
        }
        self
    }

    #[must_use]
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl From<ErrorKind> for ScriptError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for ScriptError {
    /// `file:line:col: error: <what>` followed by the underlined source line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(loc) = &self.location {
            write!(f, "{}:{}:{}: ", loc.file, loc.line, loc.column)?;
        }
        write!(f, "error: {}", self.kind)?;
        if let Some(loc) = &self.location {
            if !loc.source_line.is_empty() {
                let pad = " ".repeat(loc.column.saturating_sub(1) as usize);
                write!(f, "\n{}\n{pad}^", loc.source_line)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ScriptError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_with_location() {
        let err = ScriptError::new(ErrorKind::UndefinedName { name: "foo".into() })
            .at(ErrorLocation::new("<input>", 1, 1, "foo 1"));
        let text = err.to_string();
        assert!(text.starts_with("<input>:1:1: error: undefined name: foo"));
        assert!(text.ends_with("foo 1\n^"));
    }

    #[test]
    fn at_keeps_first_location() {
        let err = ScriptError::new(ErrorKind::StackUnderflow)
            .at(ErrorLocation::new("a", 1, 1, ""))
            .at(ErrorLocation::new("b", 2, 2, ""));
        assert_eq!(err.location.unwrap().file, "a");
    }
}
