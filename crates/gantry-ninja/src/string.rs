//! Ninja string parsing: `$name`, `${name}`, and `$$`.
//!
//! Host-supplied values (rule commands, edge arguments, paths) may carry
//! references to manifest variables. They are parsed into literal chunks
//! and named references once, then rendered at emit time against a
//! resolver that maps each name to its mangled manifest form. Unknown
//! names are emit-time errors, reported with the full original string.

use thiserror::Error;

/// One piece of a parsed ninja string.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Chunk {
    Literal(String),
    Var(String),
}

/// A parsed ninja string: literal chunks interleaved with variable
/// references. The raw input is retained for error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NinjaString {
    raw: String,
    chunks: Vec<Chunk>,
}

/// Ninja string errors, at parse or render time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NinjaStringError {
    #[error("invalid character after '$' at byte {0} in '{1}'")]
    InvalidEscape(usize, String),
    #[error("unterminated variable reference in '{0}'")]
    Unterminated(String),
    #[error("empty variable reference in '{0}'")]
    EmptyReference(String),
    #[error("undefined variable '${0}' in '{1}'")]
    UndefinedVariable(String, String),
}

fn simple_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn braced_name_char(c: char) -> bool {
    simple_name_char(c) || c == '.'
}

impl NinjaString {
    /// Parse a value that may contain `$name`, `${name}` and `$$`.
    pub fn parse(s: &str) -> Result<Self, NinjaStringError> {
        let mut chunks = Vec::new();
        let mut literal = String::new();
        let mut chars = s.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c != '$' {
                literal.push(c);
                continue;
            }
            match chars.peek().copied() {
                Some((_, '$')) => {
                    chars.next();
                    literal.push('$');
                }
                Some((_, '{')) => {
                    chars.next();
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some((_, '}')) => break,
                            Some((_, c)) if braced_name_char(c) => name.push(c),
                            Some((j, _)) => {
                                return Err(NinjaStringError::InvalidEscape(j, s.to_string()))
                            }
                            None => return Err(NinjaStringError::Unterminated(s.to_string())),
                        }
                    }
                    if name.is_empty() {
                        return Err(NinjaStringError::EmptyReference(s.to_string()));
                    }
                    flush(&mut chunks, &mut literal);
                    chunks.push(Chunk::Var(name));
                }
                Some((_, c)) if simple_name_char(c) => {
                    let mut name = String::new();
                    while let Some((_, c)) = chars.peek().copied() {
                        if simple_name_char(c) {
                            name.push(c);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    flush(&mut chunks, &mut literal);
                    chunks.push(Chunk::Var(name));
                }
                _ => return Err(NinjaStringError::InvalidEscape(i, s.to_string())),
            }
        }
        flush(&mut chunks, &mut literal);
        Ok(Self {
            raw: s.to_string(),
            chunks,
        })
    }

    /// A string with no references; `$` is taken literally.
    pub fn literal(s: &str) -> Self {
        Self {
            raw: s.to_string(),
            chunks: vec![Chunk::Literal(s.to_string())],
        }
    }

    /// The referenced variable names, in order of appearance.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.chunks.iter().filter_map(|c| match c {
            Chunk::Var(name) => Some(name.as_str()),
            Chunk::Literal(_) => None,
        })
    }

    /// The original unparsed text.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Render for the manifest. `resolve` maps a referenced name to its
    /// emitted replacement (e.g. `${g.pkg.cc}` or `$in`); returning `None`
    /// is the undefined-variable error. Literal chunks are escaped for
    /// the given context.
    pub fn render(
        &self,
        ctx: EscapeContext,
        resolve: &dyn Fn(&str) -> Option<String>,
    ) -> Result<String, NinjaStringError> {
        let mut out = String::with_capacity(self.raw.len());
        for chunk in &self.chunks {
            match chunk {
                Chunk::Literal(text) => out.push_str(&escape(text, ctx)),
                Chunk::Var(name) => match resolve(name) {
                    Some(replacement) => out.push_str(&replacement),
                    None => {
                        return Err(NinjaStringError::UndefinedVariable(
                            name.clone(),
                            self.raw.clone(),
                        ))
                    }
                },
            }
        }
        Ok(out)
    }
}

fn flush(chunks: &mut Vec<Chunk>, literal: &mut String) {
    if !literal.is_empty() {
        chunks.push(Chunk::Literal(std::mem::take(literal)));
    }
}

/// Where a value is being emitted, which decides what must be escaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeContext {
    /// A variable value: `$` and newline.
    Value,
    /// A path on a build line: additionally spaces and colons.
    Path,
}

/// Escape literal text for the manifest.
pub fn escape(s: &str, ctx: EscapeContext) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '$' => out.push_str("$$"),
            '\n' => out.push_str("$\n"),
            ' ' if ctx == EscapeContext::Path => out.push_str("$ "),
            ':' if ctx == EscapeContext::Path => out.push_str("$:"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn none(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn plain_text_round_trips() {
        let s = NinjaString::parse("gcc -c -o out").unwrap();
        assert_eq!(s.variables().count(), 0);
        assert_eq!(s.render(EscapeContext::Value, &none).unwrap(), "gcc -c -o out");
    }

    #[test]
    fn simple_and_braced_references() {
        let s = NinjaString::parse("$cc -c ${src_file} -o $out").unwrap();
        assert_eq!(s.variables().collect::<Vec<_>>(), ["cc", "src_file", "out"]);
    }

    #[test]
    fn double_dollar_is_literal() {
        let s = NinjaString::parse("cost: $$5").unwrap();
        assert_eq!(s.variables().count(), 0);
        // The literal dollar re-escapes on output.
        assert_eq!(s.render(EscapeContext::Value, &none).unwrap(), "cost: $$5");
    }

    #[test]
    fn invalid_character_after_dollar() {
        let err = NinjaString::parse("bad $ reference").unwrap_err();
        assert!(matches!(err, NinjaStringError::InvalidEscape(..)));
    }

    #[test]
    fn unterminated_braced_reference() {
        let err = NinjaString::parse("${never").unwrap_err();
        assert_eq!(err, NinjaStringError::Unterminated("${never".to_string()));
    }

    #[test]
    fn empty_braced_reference() {
        let err = NinjaString::parse("${}").unwrap_err();
        assert_eq!(err, NinjaStringError::EmptyReference("${}".to_string()));
    }

    #[test]
    fn undefined_variable_error_quotes_the_original() {
        let s = NinjaString::parse("$cc -c $in").unwrap();
        let err = s
            .render(EscapeContext::Value, &|name| {
                (name == "in").then(|| "$in".to_string())
            })
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "undefined variable '$cc' in '$cc -c $in'"
        );
    }

    #[test]
    fn render_substitutes_mangled_names() {
        let s = NinjaString::parse("$cc -o $out").unwrap();
        let rendered = s
            .render(EscapeContext::Value, &|name| match name {
                "cc" => Some("${g.tools.cc}".to_string()),
                "out" => Some("$out".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(rendered, "${g.tools.cc} -o $out");
    }

    #[test]
    fn path_escaping() {
        assert_eq!(escape("a b:c", EscapeContext::Path), "a$ b$:c");
        assert_eq!(escape("a b:c", EscapeContext::Value), "a b:c");
    }
}
