//! Parse and evaluation error types.

use crate::ast::Pos;
use std::fmt;

/// A parse or evaluation error with source location.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub pos: Pos,
    pub message: String,
}

/// Category of parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A specific token was expected but something else was found.
    UnexpectedToken,
    /// Input ended while a construct was still open.
    UnexpectedEof,
    /// Tokens are present but violate the grammar.
    InvalidSyntax,
    /// The token stream itself was malformed (unterminated string or
    /// comment, stray character).
    Lex,
    /// Undefined identifier, ill-typed `+=`, redefinition, or another
    /// failure while evaluating an expression against the scope.
    Evaluation,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, pos: Pos, message: impl Into<String>) -> Self {
        Self {
            kind,
            pos,
            message: message.into(),
        }
    }

    /// Create an "expected X, found Y" error.
    pub fn expected(what: &str, found: Option<&gantry_lexer::Token>, pos: Pos) -> Self {
        let (kind, message) = match found {
            Some(token) => (
                ParseErrorKind::UnexpectedToken,
                format!("expected {}, found '{}'", what, token),
            ),
            None => (
                ParseErrorKind::UnexpectedEof,
                format!("expected {}, found end of input", what),
            ),
        };
        Self { kind, pos, message }
    }

    pub fn eval(pos: Pos, message: impl Into<String>) -> Self {
        Self::new(ParseErrorKind::Evaluation, pos, message)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.pos, self.message)
    }
}

impl std::error::Error for ParseError {}
