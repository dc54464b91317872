// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Lexical analysis for gantry build files.
//!
//! Tokenization is driven by logos. Two things distinguish this lexer from
//! a throwaway one:
//!
//! - Newlines are tokens. The grammar treats a newline as a property and
//!   assignment terminator, so the parser needs to see them.
//! - Comments are tokens too, not skip patterns. Their text and position
//!   must survive the parse so external formatting tools can round-trip a
//!   build file. [`lex`] diverts them out of the token stream into a side
//!   list before the parser ever sees them.
//!
//! Strings keep embedded `$name` references verbatim; those are resolved
//! much later, against manifest-level scopes, never by the evaluator.

use logos::{Lexer, Logos};
use std::fmt;
use std::ops::Range;

/// A build-file token.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r]+")]
pub enum Token {
    /// Boolean literal `true`
    #[token("true")]
    True,
    /// Boolean literal `false`
    #[token("false")]
    False,

    /// Delimiter `{`
    #[token("{")]
    LBrace,
    /// Delimiter `}`
    #[token("}")]
    RBrace,
    /// Delimiter `[`
    #[token("[")]
    LBracket,
    /// Delimiter `]`
    #[token("]")]
    RBracket,
    /// Delimiter `(`
    #[token("(")]
    LParen,
    /// Delimiter `)`
    #[token(")")]
    RParen,
    /// Separator `,`
    #[token(",")]
    Comma,
    /// Property separator `:`
    #[token(":")]
    Colon,
    /// Assignment `=`
    #[token("=")]
    Eq,
    /// Append assignment `+=`
    #[token("+=")]
    PlusEq,

    /// Statement terminator
    #[token("\n")]
    Newline,

    /// Identifier (module type, property name, variable reference)
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    /// String literal. Escapes are processed here; `$` passes through
    /// untouched so manifest references survive into rule values.
    #[token("\"", lex_string)]
    Str(String),

    /// Line comment `// ...` (text excludes the `//` prefix)
    #[regex(r"//[^\n]*", |lex| lex.slice()[2..].to_string())]
    CommentLine(String),

    /// Block comment `/* ... */` (text excludes the delimiters)
    #[token("/*", lex_block_comment)]
    CommentBlock(String),
}

/// Scan a string literal body after the opening quote.
///
/// Stops at the closing quote. An unescaped newline or end of input before
/// the close is an unterminated string; the callback consumes to the end of
/// the line so the caller can recover at the next newline.
fn lex_string(lex: &mut Lexer<Token>) -> Option<String> {
    let rem = lex.remainder();
    let mut out = String::new();
    let mut chars = rem.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => {
                lex.bump(i + 1);
                return Some(out);
            }
            '\n' => {
                // Unterminated: leave the newline for recovery.
                lex.bump(i);
                return None;
            }
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, 'r')) => out.push('\r'),
                Some((_, '\\')) => out.push('\\'),
                Some((_, '"')) => out.push('"'),
                Some((_, '\'')) => out.push('\''),
                Some((j, c)) => {
                    lex.bump(j + c.len_utf8());
                    return None;
                }
                None => {
                    lex.bump(rem.len());
                    return None;
                }
            },
            _ => out.push(c),
        }
    }
    lex.bump(rem.len());
    None
}

/// Scan a block comment body after the opening `/*`.
fn lex_block_comment(lex: &mut Lexer<Token>) -> Option<String> {
    let rem = lex.remainder();
    match rem.find("*/") {
        Some(i) => {
            lex.bump(i + 2);
            Some(rem[..i].to_string())
        }
        None => {
            lex.bump(rem.len());
            None
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::Colon => write!(f, ":"),
            Token::Eq => write!(f, "="),
            Token::PlusEq => write!(f, "+="),
            Token::Newline => write!(f, "newline"),
            Token::Ident(s) => write!(f, "{}", s),
            Token::Str(s) => write!(f, "\"{}\"", s),
            Token::CommentLine(_) | Token::CommentBlock(_) => write!(f, "comment"),
        }
    }
}

/// A comment captured during lexing, adjacent-token position preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    /// Comment text without delimiters.
    pub text: String,
    /// True for `/* */`, false for `//`.
    pub block: bool,
    /// Byte span in the source.
    pub span: Range<usize>,
}

/// A tokenization error with its byte span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub span: Range<usize>,
    pub message: String,
}

/// The result of tokenizing one build file.
#[derive(Debug, Default)]
pub struct Lexed {
    /// Parser-visible tokens with byte spans. Comments are diverted to
    /// `comments`; newlines are kept.
    pub tokens: Vec<(Token, Range<usize>)>,
    /// Comments in source order.
    pub comments: Vec<Comment>,
    /// Tokenization errors. The lexer recovers at the next newline.
    pub errors: Vec<LexError>,
}

/// Tokenize a build file.
pub fn lex(source: &str) -> Lexed {
    let mut out = Lexed::default();
    let mut lexer = Token::lexer(source);
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(Token::CommentLine(text)) => out.comments.push(Comment {
                text,
                block: false,
                span,
            }),
            Ok(Token::CommentBlock(text)) => out.comments.push(Comment {
                text,
                block: true,
                span,
            }),
            Ok(token) => out.tokens.push((token, span)),
            Err(()) => {
                let message = match source[span.start..].chars().next() {
                    Some('"') => "unterminated string".to_string(),
                    Some('/') if source[span.start..].starts_with("/*") => {
                        "unterminated comment".to_string()
                    }
                    Some(c) => format!("unexpected character {:?}", c),
                    None => "unexpected end of input".to_string(),
                };
                out.errors.push(LexError { span, message });
            }
        }
    }
    out
}

/// Byte-offset to line/column conversion for one source file.
///
/// Lines and columns are 1-based; columns count bytes, which matches what
/// editors and the downstream `path:line:col` error format expect for the
/// ASCII-dominated inputs build files are.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<u32>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0u32];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i as u32 + 1);
            }
        }
        Self { line_starts }
    }

    /// Map a byte offset to (line, column), both 1-based.
    pub fn line_col(&self, offset: usize) -> (u32, u32) {
        let offset = offset as u32;
        let line = self.line_starts.partition_point(|&s| s <= offset);
        let col = offset - self.line_starts[line - 1] + 1;
        (line as u32, col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test helper: lex and assert no errors, returning bare tokens.
    fn toks(source: &str) -> Vec<Token> {
        let lexed = lex(source);
        assert!(lexed.errors.is_empty(), "lex errors: {:?}", lexed.errors);
        lexed.tokens.into_iter().map(|(t, _)| t).collect()
    }

    fn ident(s: &str) -> Token {
        Token::Ident(s.to_string())
    }

    fn string(s: &str) -> Token {
        Token::Str(s.to_string())
    }

    #[test]
    fn test_punctuation() {
        assert_eq!(
            toks("{ } [ ] ( ) , : = +="),
            vec![
                Token::LBrace,
                Token::RBrace,
                Token::LBracket,
                Token::RBracket,
                Token::LParen,
                Token::RParen,
                Token::Comma,
                Token::Colon,
                Token::Eq,
                Token::PlusEq,
            ]
        );
    }

    #[test]
    fn test_booleans_and_idents() {
        assert_eq!(
            toks("true false truer my_module _x"),
            vec![
                Token::True,
                Token::False,
                ident("truer"),
                ident("my_module"),
                ident("_x"),
            ]
        );
    }

    #[test]
    fn test_strings_with_escapes() {
        assert_eq!(
            toks(r#""abc" "a\"b" "tab\there""#),
            vec![string("abc"), string("a\"b"), string("tab\there")]
        );
    }

    #[test]
    fn test_dollar_preserved_verbatim() {
        assert_eq!(toks(r#""$out and ${in}""#), vec![string("$out and ${in}")]);
    }

    #[test]
    fn test_newlines_are_tokens() {
        assert_eq!(
            toks("a\nb"),
            vec![ident("a"), Token::Newline, ident("b")]
        );
    }

    #[test]
    fn test_line_comment_captured() {
        let lexed = lex("a // trailing\nb");
        assert_eq!(lexed.comments.len(), 1);
        assert_eq!(lexed.comments[0].text, " trailing");
        assert!(!lexed.comments[0].block);
        // Comment is not in the parser stream; the newline is.
        let tokens: Vec<_> = lexed.tokens.into_iter().map(|(t, _)| t).collect();
        assert_eq!(tokens, vec![ident("a"), Token::Newline, ident("b")]);
    }

    #[test]
    fn test_block_comment_captured() {
        let lexed = lex("a /* multi\nline */ b");
        assert_eq!(lexed.comments.len(), 1);
        assert_eq!(lexed.comments[0].text, " multi\nline ");
        assert!(lexed.comments[0].block);
    }

    #[test]
    fn test_unterminated_string() {
        let lexed = lex("s = \"abc\nnext = true");
        assert_eq!(lexed.errors.len(), 1);
        assert_eq!(lexed.errors[0].message, "unterminated string");
        // Recovery: tokens after the newline still lex.
        assert!(lexed
            .tokens
            .iter()
            .any(|(t, _)| matches!(t, Token::Ident(s) if s == "next")));
    }

    #[test]
    fn test_unterminated_comment() {
        let lexed = lex("a /* never closed");
        assert_eq!(lexed.errors.len(), 1);
        assert_eq!(lexed.errors[0].message, "unterminated comment");
    }

    #[test]
    fn test_unexpected_character() {
        let lexed = lex("a @ b");
        assert_eq!(lexed.errors.len(), 1);
        assert!(lexed.errors[0].message.contains("unexpected character"));
    }

    #[test]
    fn test_line_index() {
        let idx = LineIndex::new("ab\ncd\n\nef");
        assert_eq!(idx.line_col(0), (1, 1));
        assert_eq!(idx.line_col(1), (1, 2));
        assert_eq!(idx.line_col(3), (2, 1));
        assert_eq!(idx.line_col(6), (3, 1));
        assert_eq!(idx.line_col(7), (4, 1));
    }

    #[test]
    fn test_module_shape() {
        assert_eq!(
            toks(r#"cc_library { name: "a", srcs: ["x.c"] }"#),
            vec![
                ident("cc_library"),
                Token::LBrace,
                ident("name"),
                Token::Colon,
                string("a"),
                Token::Comma,
                ident("srcs"),
                Token::Colon,
                Token::LBracket,
                string("x.c"),
                Token::RBracket,
                Token::RBrace,
            ]
        );
    }
}
