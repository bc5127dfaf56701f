//! Lexer and parser: source text to [`Ast`].
//!
//! Hand-written recursive descent with precedence climbing for infix
//! operators. One module per input; statements are `;`-separated. The
//! parser calls [`Block::finish`] on every block so each ends in exactly
//! one `Return`.

use serde::{Deserialize, Serialize};

use crate::{
    ast::{
        Ast, Block, CallExpr, CharLit, ConditionExpr, Definition, Expression, FloatLit, FunctionExpr,
        FunctionTypeAst, Identifier, IntegerLit, Invocation, ListExpr, ListTypeAst, Operator, OpCallExpr,
        ParameterAst, Reference, Statement, StringLit, TupleExpr, TypeAst, TypeNameAst, Variable,
    },
    error::{ErrorKind, ErrorLocation, ScriptError, ScriptResult},
};

/// Source position of a token or AST node (1-based line and column).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub line: u32,
    pub column: u32,
}

/// A named source buffer; resolves [`SourceInfo`] to displayable locations.
#[derive(Debug, Clone)]
pub struct SourceText {
    name: String,
    text: String,
}

impl SourceText {
    #[must_use]
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Builds the caret-display location for an error at `si`.
    #[must_use]
    pub fn location(&self, si: SourceInfo) -> ErrorLocation {
        let line = self
            .text
            .lines()
            .nth(si.line.saturating_sub(1) as usize)
            .unwrap_or_default();
        ErrorLocation::new(&self.name, si.line, si.column, line)
    }
}

// --- lexer ---

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Int(i32),
    Float(f32),
    CharLit(char),
    Str(String),
    Ident(String),
    TypeName(String),
    /// Operator or punctuation spelling (maximal munch).
    Op(&'static str),
    Keyword(Keyword),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    Colon,
    Assign,
    Arrow,
    Pipe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    Fun,
    If,
    Then,
    Else,
    Class,
    Instance,
    With,
    Match,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    si: SourceInfo,
}

const TWO_CHAR_OPS: &[&str] = &["||", "&&", "==", "!=", "<=", ">=", "<<", ">>", "**"];

struct Lexer<'src> {
    source: &'src SourceText,
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
}

impl<'src> Lexer<'src> {
    fn new(source: &'src SourceText) -> Self {
        Self {
            source,
            chars: source.text().chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn error(&self, message: impl Into<String>, si: SourceInfo) -> ScriptError {
        ScriptError::new(ErrorKind::Parse {
            message: message.into(),
        })
        .at(self.source.location(si))
    }

    fn here(&self) -> SourceInfo {
        SourceInfo {
            line: self.line,
            column: self.column,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn skip_trivia(&mut self) -> ScriptResult<()> {
        loop {
            match self.peek() {
                Some(ch) if ch.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(ch) = self.peek() {
                        if ch == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    let si = self.here();
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek() {
                            Some('*') if self.peek_at(1) == Some('/') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            Some(_) => {
                                self.bump();
                            }
                            None => return Err(self.error("unterminated block comment", si)),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn tokenize(mut self) -> ScriptResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let si = self.here();
            let Some(ch) = self.peek() else { break };
            let kind = match ch {
                '0'..='9' => self.lex_number(si)?,
                'a'..='z' | '_' => self.lex_identifier(),
                'A'..='Z' => self.lex_type_name(),
                '\'' => self.lex_char(si)?,
                '"' => self.lex_string(si)?,
                '$' if self.peek_at(1) == Some('-') && self.peek_at(2) == Some('$') => self.lex_raw_string(si)?,
                _ => self.lex_punct(si)?,
            };
            tokens.push(Token { kind, si });
        }
        Ok(tokens)
    }

    fn lex_number(&mut self, si: SourceInfo) -> ScriptResult<TokenKind> {
        let mut digits = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        // float: integer part, '.', fractional part
        if self.peek() == Some('.') {
            digits.push('.');
            self.bump();
            while let Some(ch) = self.peek() {
                if ch.is_ascii_digit() {
                    digits.push(ch);
                    self.bump();
                } else {
                    break;
                }
            }
            let value: f32 = digits
                .parse()
                .map_err(|_| self.error(format!("invalid float literal: {digits}"), si))?;
            return Ok(TokenKind::Float(value));
        }
        let value: i32 = digits
            .parse()
            .map_err(|_| self.error(format!("integer literal out of range: {digits}"), si))?;
        Ok(TokenKind::Int(value))
    }

    fn lex_identifier(&mut self) -> TokenKind {
        let mut name = String::new();
        while let Some(ch) = self.peek() {
            if is_ident_char(ch) {
                name.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        match name.as_str() {
            "fun" => TokenKind::Keyword(Keyword::Fun),
            "if" => TokenKind::Keyword(Keyword::If),
            "then" => TokenKind::Keyword(Keyword::Then),
            "else" => TokenKind::Keyword(Keyword::Else),
            "class" => TokenKind::Keyword(Keyword::Class),
            "instance" => TokenKind::Keyword(Keyword::Instance),
            "with" => TokenKind::Keyword(Keyword::With),
            "match" => TokenKind::Keyword(Keyword::Match),
            _ => TokenKind::Ident(name),
        }
    }

    fn lex_type_name(&mut self) -> TokenKind {
        let mut name = String::new();
        while let Some(ch) = self.peek() {
            if is_ident_char(ch) {
                name.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        TokenKind::TypeName(name)
    }

    fn lex_char(&mut self, si: SourceInfo) -> ScriptResult<TokenKind> {
        self.bump(); // opening quote
        let ch = match self.bump() {
            Some('\\') => self.lex_escape(si)?,
            Some('\'') => return Err(self.error("empty character literal", si)),
            Some(ch) => ch,
            None => return Err(self.error("unterminated character literal", si)),
        };
        if self.bump() != Some('\'') {
            return Err(self.error("unterminated character literal", si));
        }
        Ok(TokenKind::CharLit(ch))
    }

    fn lex_string(&mut self, si: SourceInfo) -> ScriptResult<TokenKind> {
        self.bump(); // opening quote
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('"') => break,
                Some('\\') => value.push(self.lex_escape(si)?),
                Some(ch) => value.push(ch),
                None => return Err(self.error("unterminated string literal", si)),
            }
        }
        Ok(TokenKind::Str(value))
    }

    fn lex_raw_string(&mut self, si: SourceInfo) -> ScriptResult<TokenKind> {
        // opening $-$
        self.bump();
        self.bump();
        self.bump();
        let mut value = String::new();
        loop {
            if self.peek() == Some('$') && self.peek_at(1) == Some('-') && self.peek_at(2) == Some('$') {
                self.bump();
                self.bump();
                self.bump();
                return Ok(TokenKind::Str(value));
            }
            match self.bump() {
                Some(ch) => value.push(ch),
                None => return Err(self.error("unterminated raw string literal", si)),
            }
        }
    }

    fn lex_escape(&mut self, si: SourceInfo) -> ScriptResult<char> {
        match self.bump() {
            Some('n') => Ok('\n'),
            Some('t') => Ok('\t'),
            Some('r') => Ok('\r'),
            Some('0') => Ok('\0'),
            Some('\\') => Ok('\\'),
            Some('\'') => Ok('\''),
            Some('"') => Ok('"'),
            Some(other) => Err(self.error(format!("unknown escape sequence: \\{other}"), si)),
            None => Err(self.error("unterminated escape sequence", si)),
        }
    }

    fn lex_punct(&mut self, si: SourceInfo) -> ScriptResult<TokenKind> {
        let ch = self.peek().unwrap();
        let next = self.peek_at(1);
        if ch == '-' && next == Some('>') {
            self.bump();
            self.bump();
            return Ok(TokenKind::Arrow);
        }
        for &op in TWO_CHAR_OPS {
            let mut candidates = op.chars();
            if candidates.next() == Some(ch) && candidates.next() == next {
                self.bump();
                self.bump();
                return Ok(TokenKind::Op(op));
            }
        }
        self.bump();
        Ok(match ch {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            ':' => TokenKind::Colon,
            '=' => TokenKind::Assign,
            '|' => TokenKind::Pipe,
            '+' => TokenKind::Op("+"),
            '-' => TokenKind::Op("-"),
            '*' => TokenKind::Op("*"),
            '/' => TokenKind::Op("/"),
            '%' => TokenKind::Op("%"),
            '<' => TokenKind::Op("<"),
            '>' => TokenKind::Op(">"),
            '&' => TokenKind::Op("&"),
            '^' => TokenKind::Op("^"),
            '!' => TokenKind::Op("!"),
            '~' => TokenKind::Op("~"),
            other => return Err(self.error(format!("unexpected character: {other:?}"), si)),
        })
    }
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

// --- parser ---

/// Parses one module. Every block (including the module body) is
/// `finish`ed.
pub fn parse(source: &SourceText) -> ScriptResult<Ast> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
    };
    let mut body = parser.parse_statements(None)?;
    if let Some(token) = parser.peek_token() {
        let si = token.si;
        return Err(parser.error("unexpected trailing input", si));
    }
    body.finish();
    Ok(Ast { body })
}

struct Parser<'src> {
    source: &'src SourceText,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, message: impl Into<String>, si: SourceInfo) -> ScriptError {
        ScriptError::new(ErrorKind::Parse {
            message: message.into(),
        })
        .at(self.source.location(si))
    }

    fn eof_error(&self, expected: &str) -> ScriptError {
        let si = self
            .tokens
            .last()
            .map(|token| token.si)
            .unwrap_or_default();
        self.error(format!("unexpected end of input, expected {expected}"), si)
    }

    fn peek_token(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek(&self) -> Option<&TokenKind> {
        self.peek_token().map(|token| &token.kind)
    }

    fn peek_at(&self, ahead: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + ahead).map(|token| &token.kind)
    }

    fn here(&self) -> SourceInfo {
        self.peek_token()
            .map(|token| token.si)
            .or_else(|| self.tokens.last().map(|token| token.si))
            .unwrap_or_default()
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> ScriptResult<SourceInfo> {
        let si = self.here();
        if self.eat(kind) {
            Ok(si)
        } else if self.peek().is_some() {
            Err(self.error(format!("expected {what}"), si))
        } else {
            Err(self.eof_error(what))
        }
    }

    /// Parses `;`-separated statements until `end` (or EOF when `None`).
    /// The terminator is not consumed.
    fn parse_statements(&mut self, end: Option<&TokenKind>) -> ScriptResult<Block> {
        let mut statements = Vec::new();
        loop {
            while self.eat(&TokenKind::Semicolon) {}
            match (self.peek(), end) {
                (None, _) => break,
                (Some(kind), Some(end_kind)) if kind == end_kind => break,
                _ => {}
            }
            statements.push(self.parse_statement()?);
            if !self.eat(&TokenKind::Semicolon) {
                break;
            }
        }
        Ok(Block {
            statements,
            symtab: None,
        })
    }

    fn parse_statement(&mut self) -> ScriptResult<Statement> {
        if let Some(TokenKind::Keyword(kw @ (Keyword::Class | Keyword::Instance))) = self.peek() {
            let si = self.here();
            let what = if *kw == Keyword::Class { "class declarations" } else { "instance declarations" };
            return Err(self.error(format!("{what} are not supported"), si));
        }
        // definition: Ident [: Type] = Expression (but not `ident == ...`)
        if let Some(TokenKind::Ident(_)) = self.peek() {
            let start = self.pos;
            if let Some(stmt) = self.try_parse_definition()? {
                return Ok(stmt);
            }
            self.pos = start;
        }
        let expression = self.parse_expression()?;
        Ok(Statement::Invocation(Invocation {
            expression,
            type_index: None,
        }))
    }

    fn try_parse_definition(&mut self) -> ScriptResult<Option<Statement>> {
        let Some(Token {
            kind: TokenKind::Ident(name),
            ..
        }) = self.bump()
        else {
            return Ok(None);
        };
        let mut type_ann = None;
        if self.eat(&TokenKind::Colon) {
            let Some(ty) = self.try_parse_type()? else {
                return Ok(None);
            };
            type_ann = Some(ty);
        }
        if !self.eat(&TokenKind::Assign) {
            return Ok(None);
        }
        let expression = self.parse_expression()?;
        Ok(Some(Statement::Definition(Definition {
            variable: Variable {
                identifier: Identifier::new(name),
                type_ann,
            },
            expression,
        })))
    }

    fn parse_expression(&mut self) -> ScriptResult<Expression> {
        if let Some(TokenKind::Keyword(Keyword::If)) = self.peek() {
            return self.parse_condition();
        }
        let si = self.here();
        let first = self.parse_infix(0)?;
        if self.peek() != Some(&TokenKind::Comma) {
            return Ok(first);
        }
        // tuple literal
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            items.push(self.parse_infix(0)?);
        }
        Ok(Expression::Tuple(TupleExpr {
            items,
            source_info: si,
        }))
    }

    fn parse_condition(&mut self) -> ScriptResult<Expression> {
        let si = self.expect(&TokenKind::Keyword(Keyword::If), "'if'")?;
        let cond = self.parse_infix(0)?;
        self.expect(&TokenKind::Keyword(Keyword::Then), "'then'")?;
        let then_expr = self.parse_expression()?;
        self.expect(&TokenKind::Keyword(Keyword::Else), "'else'")?;
        let else_expr = self.parse_expression()?;
        Ok(Expression::Condition(Box::new(ConditionExpr {
            cond,
            then_expr,
            else_expr,
            source_info: si,
        })))
    }

    /// Precedence-climbing infix parser.
    fn parse_infix(&mut self, min_prec: u8) -> ScriptResult<Expression> {
        let mut left = self.parse_operand()?;
        loop {
            let Some(op) = self.peek_binary_op() else { break };
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            let si = self.here();
            self.bump();
            let next_min = if op.is_right_associative() { prec } else { prec + 1 };
            let right = self.parse_infix(next_min)?;
            left = Expression::OpCall(Box::new(OpCallExpr {
                op,
                identifier: None,
                args: vec![left, right],
                source_info: si,
            }));
        }
        Ok(left)
    }

    fn peek_binary_op(&self) -> Option<Operator> {
        match self.peek()? {
            TokenKind::Op(sym) => Operator::binary_from_symbol(sym),
            TokenKind::Pipe => Some(Operator::BitwiseOr),
            _ => None,
        }
    }

    fn parse_operand(&mut self) -> ScriptResult<Expression> {
        // prefix operators bind tighter than any binary operator
        if let Some(TokenKind::Op(sym)) = self.peek() {
            if let Some(op) = Operator::prefix_from_symbol(sym) {
                let si = self.here();
                self.bump();
                // a sign directly before a numeric literal folds into it
                if matches!(op, Operator::UnaryMinus | Operator::UnaryPlus) {
                    match self.peek() {
                        Some(TokenKind::Int(value)) => {
                            let value = if op == Operator::UnaryMinus { -*value } else { *value };
                            self.bump();
                            return Ok(Expression::Integer(IntegerLit {
                                value,
                                source_info: si,
                            }));
                        }
                        Some(TokenKind::Float(value)) => {
                            let value = if op == Operator::UnaryMinus { -*value } else { *value };
                            self.bump();
                            return Ok(Expression::Float(FloatLit {
                                value,
                                source_info: si,
                            }));
                        }
                        _ => {}
                    }
                }
                let operand = self.parse_operand()?;
                if op == Operator::UnaryPlus {
                    // unary plus is a no-op
                    return Ok(operand);
                }
                return Ok(Expression::OpCall(Box::new(OpCallExpr {
                    op,
                    identifier: None,
                    args: vec![operand],
                    source_info: si,
                })));
            }
        }

        let si = self.here();
        let callable = matches!(
            self.peek(),
            Some(TokenKind::Ident(_) | TokenKind::LParen | TokenKind::LBrace | TokenKind::Keyword(Keyword::Fun))
        );
        let primary = self.parse_arg_safe()?;
        if !callable || !self.at_arg_start() {
            return Ok(primary);
        }
        // call by juxtaposition: callable arg1 arg2 ...
        let mut args = Vec::new();
        while self.at_arg_start() {
            args.push(self.parse_arg_safe()?);
        }
        Ok(Expression::Call(Box::new(CallExpr {
            callable: primary,
            args,
            wrapped_execs: 0,
            source_info: si,
        })))
    }

    /// True when the next token can start a call argument.
    fn at_arg_start(&self) -> bool {
        matches!(
            self.peek(),
            Some(
                TokenKind::Int(_)
                    | TokenKind::Float(_)
                    | TokenKind::CharLit(_)
                    | TokenKind::Str(_)
                    | TokenKind::Ident(_)
                    | TokenKind::LParen
                    | TokenKind::LBracket
                    | TokenKind::LBrace
                    | TokenKind::Keyword(Keyword::Fun)
            )
        )
    }

    /// Expressions usable as call arguments: literals, lists, function
    /// literals, parenthesised expressions, references.
    fn parse_arg_safe(&mut self) -> ScriptResult<Expression> {
        let si = self.here();
        let Some(kind) = self.peek().cloned() else {
            return Err(self.eof_error("an expression"));
        };
        match kind {
            TokenKind::Int(value) => {
                self.bump();
                Ok(Expression::Integer(IntegerLit {
                    value,
                    source_info: si,
                }))
            }
            TokenKind::Float(value) => {
                self.bump();
                Ok(Expression::Float(FloatLit {
                    value,
                    source_info: si,
                }))
            }
            TokenKind::CharLit(value) => {
                self.bump();
                Ok(Expression::Char(CharLit {
                    value,
                    source_info: si,
                }))
            }
            TokenKind::Str(value) => {
                self.bump();
                Ok(Expression::StringLit(StringLit {
                    value,
                    source_info: si,
                }))
            }
            TokenKind::Ident(name) => {
                self.bump();
                Ok(Expression::Reference(Reference {
                    identifier: Identifier::new(name),
                    source_info: si,
                }))
            }
            TokenKind::LParen => {
                self.bump();
                let inner = self.parse_expression()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::LBracket => self.parse_list(si),
            TokenKind::LBrace => self.parse_block_literal(si),
            TokenKind::Keyword(Keyword::Fun) => self.parse_function_literal(si),
            other => Err(self.error(format!("unexpected token: {other:?}"), si)),
        }
    }

    fn parse_list(&mut self, si: SourceInfo) -> ScriptResult<Expression> {
        self.expect(&TokenKind::LBracket, "'['")?;
        let mut items = Vec::new();
        if !self.eat(&TokenKind::RBracket) {
            loop {
                items.push(self.parse_infix(0)?);
                if self.eat(&TokenKind::RBracket) {
                    break;
                }
                self.expect(&TokenKind::Comma, "',' or ']'")?;
            }
        }
        Ok(Expression::List(ListExpr {
            items,
            elem_size: None,
            source_info: si,
        }))
    }

    /// A bare `{ … }` is an anonymous nullary function.
    fn parse_block_literal(&mut self, si: SourceInfo) -> ScriptResult<Expression> {
        let body = self.parse_block()?;
        Ok(Expression::Function(Box::new(FunctionExpr {
            type_ast: FunctionTypeAst::default(),
            body,
            index: None,
            is_block: true,
            source_info: si,
        })))
    }

    fn parse_block(&mut self) -> ScriptResult<Block> {
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut block = self.parse_statements(Some(&TokenKind::RBrace))?;
        self.expect(&TokenKind::RBrace, "'}'")?;
        block.finish();
        Ok(block)
    }

    fn parse_function_literal(&mut self, si: SourceInfo) -> ScriptResult<Expression> {
        self.expect(&TokenKind::Keyword(Keyword::Fun), "'fun'")?;
        let params = self.parse_param_pipes()?;
        let result = if self.eat(&TokenKind::Arrow) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(Expression::Function(Box::new(FunctionExpr {
            type_ast: FunctionTypeAst { params, result },
            body,
            index: None,
            is_block: false,
            source_info: si,
        })))
    }

    /// `|p1 p2 …|`, possibly empty (`||` lexes as one token).
    fn parse_param_pipes(&mut self) -> ScriptResult<Vec<ParameterAst>> {
        if self.eat(&TokenKind::Op("||")) {
            return Ok(Vec::new());
        }
        self.expect(&TokenKind::Pipe, "'|'")?;
        let mut params = Vec::new();
        while !self.eat(&TokenKind::Pipe) {
            params.push(self.parse_parameter()?);
        }
        Ok(params)
    }

    /// One parameter: `name`, `name:Type` or a bare `Type`.
    fn parse_parameter(&mut self) -> ScriptResult<ParameterAst> {
        match self.peek() {
            Some(TokenKind::Ident(_)) => {
                let Some(Token {
                    kind: TokenKind::Ident(name),
                    ..
                }) = self.bump()
                else {
                    unreachable!()
                };
                let type_ast = if self.eat(&TokenKind::Colon) {
                    Some(self.parse_type()?)
                } else {
                    None
                };
                Ok(ParameterAst {
                    identifier: Some(Identifier::new(name)),
                    type_ast,
                })
            }
            _ => Ok(ParameterAst {
                identifier: None,
                type_ast: Some(self.parse_type()?),
            }),
        }
    }

    fn parse_type(&mut self) -> ScriptResult<TypeAst> {
        let si = self.here();
        match self.try_parse_type()? {
            Some(ty) => Ok(ty),
            None => Err(self.error("expected a type", si)),
        }
    }

    /// `Name`, `[Elem]` or `(|T1 T2| -> T)` / parenthesised type.
    fn try_parse_type(&mut self) -> ScriptResult<Option<TypeAst>> {
        match self.peek() {
            Some(TokenKind::TypeName(_)) => {
                let Some(Token {
                    kind: TokenKind::TypeName(name),
                    ..
                }) = self.bump()
                else {
                    unreachable!()
                };
                Ok(Some(TypeAst::Name(TypeNameAst { name })))
            }
            Some(TokenKind::LBracket) => {
                self.bump();
                let elem = self.parse_type()?;
                self.expect(&TokenKind::RBracket, "']'")?;
                Ok(Some(TypeAst::List(Box::new(ListTypeAst { elem }))))
            }
            Some(TokenKind::LParen) => {
                self.bump();
                let ty = if matches!(self.peek(), Some(TokenKind::Pipe | TokenKind::Op("||"))) {
                    let params = self.parse_param_pipes()?;
                    self.expect(&TokenKind::Arrow, "'->'")?;
                    let result = self.parse_type()?;
                    TypeAst::Function(Box::new(FunctionTypeAst {
                        params,
                        result: Some(result),
                    }))
                } else {
                    self.parse_type()?
                };
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(Some(ty))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(text: &str) -> ScriptResult<Ast> {
        parse(&SourceText::new("<test>", text))
    }

    fn reprint(text: &str) -> String {
        parse_str(text).unwrap().to_string()
    }

    #[test]
    fn precedence_mul_over_add() {
        assert_eq!(reprint("1+2*3"), "(1 + (2 * 3))");
        assert_eq!(reprint("1*2+3"), "((1 * 2) + 3)");
    }

    #[test]
    fn exp_is_right_associative() {
        assert_eq!(reprint("2**3**2"), "(2 ** (3 ** 2))");
    }

    #[test]
    fn comparison_and_logical() {
        assert_eq!(reprint("1 == 1 && true"), "((1 == 1) && true)");
    }

    #[test]
    fn subscript_binds_tightest() {
        assert_eq!(reprint("l ! 1 + 2"), "((l ! 1) + 2)");
    }

    #[test]
    fn unary_operators() {
        assert_eq!(reprint("!true"), "(!true)");
        assert_eq!(reprint("~5"), "(~5)");
        assert_eq!(reprint("-x"), "(-x)");
        // sign folds into the literal
        assert_eq!(reprint("-5"), "-5");
        assert_eq!(reprint("+5"), "5");
    }

    #[test]
    fn call_by_juxtaposition() {
        assert_eq!(reprint("f 1 2"), "(f 1 2)");
        assert_eq!(reprint("(make 41)"), "(make 41)");
        assert_eq!(reprint("f 1 + 2"), "((f 1) + 2)");
    }

    #[test]
    fn tuple_at_statement_level() {
        assert_eq!(reprint("1, 2, 3"), "(1, 2, 3)");
    }

    #[test]
    fn condition() {
        assert_eq!(reprint("if 1 == 1 then 10 else 20"), "(if (1 == 1) then 10 else 20)");
    }

    #[test]
    fn block_and_definitions() {
        assert_eq!(reprint("{ x = 5; y = 7; x * y + 1 }"), "{ x = 5; y = 7; ((x * y) + 1) }");
    }

    #[test]
    fn function_literal_with_types() {
        assert_eq!(
            reprint("fun |x:Int32 y:Int32| -> Int32 { x }"),
            "fun |x:Int32 y:Int32| -> Int32 { x }"
        );
        assert_eq!(reprint("fun || -> Int32 { 1 }"), "fun || -> Int32 { 1 }");
    }

    #[test]
    fn function_type_in_result_position() {
        assert_eq!(
            reprint("fun |n:Int32| -> (|| -> Int32) { fun || -> Int32 { n + 1 } }"),
            "fun |n:Int32| -> (|| -> Int32) { fun || -> Int32 { (n + 1) } }"
        );
    }

    #[test]
    fn list_literal_and_type() {
        assert_eq!(reprint("[1, 2, 3]"), "[1, 2, 3]");
        assert_eq!(reprint("xs:[Int32] = [1]"), "xs:[Int32] = [1]");
    }

    #[test]
    fn string_escapes_roundtrip() {
        assert_eq!(reprint("\"a\\nb\""), "\"a\\nb\"");
        assert_eq!(reprint("$-$raw \"text\"$-$"), "\"raw \\\"text\\\"\"");
    }

    #[test]
    fn char_literals() {
        assert_eq!(reprint("'a'"), "'a'");
        assert_eq!(reprint("'\\n'"), "'\\n'");
        assert_eq!(reprint("'\\''"), "'\\''");
    }

    #[test]
    fn comments_are_trivia() {
        assert_eq!(reprint("1 + /* two */ 2 // trailing"), "(1 + 2)");
    }

    #[test]
    fn parse_error_is_located() {
        let err = parse_str("1 +").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Parse { .. }));
        assert!(err.location.is_some());
    }

    #[test]
    fn class_declarations_are_rejected() {
        let err = parse_str("class Eq T { }").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Parse { .. }));
    }

    #[test]
    fn definition_vs_equality() {
        assert_eq!(reprint("x == 1"), "(x == 1)");
        assert_eq!(reprint("x = 1"), "x = 1");
    }

    #[test]
    fn bitwise_pipe_is_an_operator() {
        assert_eq!(reprint("1 | 2 ^ 3"), "((1 | 2) ^ 3)");
    }
}
