// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Parser and evaluator for gantry build files.
//!
//! [`parse_and_eval`] takes one file's source text and a variable scope,
//! and produces the evaluated AST plus every error found along the way.
//! Errors are accumulated, not short-circuited: the parser recovers at the
//! next top-level definition so a single run reports all defects.

pub mod ast;
mod error;
mod parser;
mod scope;
mod stream;

pub use ast::{Assignment, BuildFile, Def, ModuleDef, Pos, Property, Value, ValueKind};
pub use error::{ParseError, ParseErrorKind};
pub use gantry_lexer::Comment;
pub use scope::Scope;

use gantry_lexer::LineIndex;
use std::sync::Arc;

/// Knobs for parsing.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Maximum nesting depth of property maps inside a module body.
    pub max_nesting_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_nesting_depth: 32,
        }
    }
}

/// Parse one build file and evaluate its assignments against `scope`.
///
/// Returns the parsed file and all lex, parse, and evaluation errors.
/// The AST is usable even when errors are present, but callers that honor
/// the no-partial-output policy must not act on it.
pub fn parse_and_eval(
    path: &str,
    source: &str,
    scope: &mut Scope,
    options: &ParseOptions,
) -> (BuildFile, Vec<ParseError>) {
    let file: Arc<str> = Arc::from(path);
    let index = LineIndex::new(source);
    let lexed = gantry_lexer::lex(source);

    let mut errors: Vec<ParseError> = lexed
        .errors
        .iter()
        .map(|e| {
            let (line, col) = index.line_col(e.span.start);
            ParseError::new(
                ParseErrorKind::Lex,
                Pos::new(file.clone(), line, col),
                e.message.clone(),
            )
        })
        .collect();

    let stream = stream::TokenStream::new(&lexed.tokens, file.clone(), &index, source.len());
    let p = parser::Parser::new(stream, scope, options.max_nesting_depth);
    let (defs, parse_errors) = p.parse_file();
    errors.extend(parse_errors);

    (
        BuildFile {
            path: file,
            defs,
            comments: lexed.comments,
        },
        errors,
    )
}
