//! Recursive descent parser for build files.
//!
//! Grammar:
//!
//! ```text
//! file       := (assignment | module)*
//! assignment := ident ('=' | '+=') value
//! module     := ident '{' property-list '}'
//! property-list := (property (','|newline))* trailing-comma?
//! property   := ident (':' | '+=') value
//! value      := string | bool | list | map | ident
//! list       := '[' (value (','|newline))* ']'
//! map        := '{' property-list '}'
//! ```
//!
//! Values are evaluated as they are parsed: an identifier in value
//! position reads the current scope, and assignments bind into it. On a
//! syntax error the parser records the error and resynchronizes at the
//! next top-level definition.

use crate::ast::{Assignment, Def, ModuleDef, Pos, Property, Value, ValueKind};
use crate::error::{ParseError, ParseErrorKind};
use crate::scope::Scope;
use crate::stream::TokenStream;
use gantry_lexer::Token;

pub(crate) struct Parser<'src> {
    stream: TokenStream<'src>,
    scope: &'src mut Scope,
    errors: Vec<ParseError>,
    max_depth: usize,
}

impl<'src> Parser<'src> {
    pub fn new(stream: TokenStream<'src>, scope: &'src mut Scope, max_depth: usize) -> Self {
        Self {
            stream,
            scope,
            errors: Vec::new(),
            max_depth,
        }
    }

    pub fn parse_file(mut self) -> (Vec<Def>, Vec<ParseError>) {
        let mut defs = Vec::new();
        loop {
            self.stream.skip_newlines();
            if self.stream.at_end() {
                break;
            }
            match self.parse_def() {
                Ok(def) => defs.push(def),
                Err(e) => {
                    self.errors.push(e);
                    self.stream.synchronize();
                }
            }
        }
        (defs, self.errors)
    }

    fn parse_def(&mut self) -> Result<Def, ParseError> {
        let pos = self.stream.current_pos();
        let name = match self.stream.advance() {
            Some(Token::Ident(name)) => name.clone(),
            other => return Err(ParseError::expected("a definition", other, pos)),
        };
        match self.stream.peek() {
            Some(Token::Eq) => {
                self.stream.advance();
                let value = self.parse_value(0)?;
                if let Err(errs) = self.scope.define(&name, pos.clone(), value.clone()) {
                    self.errors.extend(errs);
                }
                Ok(Def::Assignment(Assignment {
                    name,
                    pos,
                    value,
                    append: false,
                    referenced: false,
                }))
            }
            Some(Token::PlusEq) => {
                let op_pos = self.stream.current_pos();
                self.stream.advance();
                let value = self.parse_value(0)?;
                if let Err(errs) = self.scope.append(&name, op_pos, value.clone()) {
                    self.errors.extend(errs);
                }
                Ok(Def::Assignment(Assignment {
                    name,
                    pos,
                    value,
                    append: true,
                    referenced: false,
                }))
            }
            Some(Token::LBrace) => {
                let properties = self.parse_map_body(0)?;
                Ok(Def::Module(ModuleDef {
                    type_name: name,
                    pos,
                    properties,
                }))
            }
            other => Err(ParseError::expected(
                "'=', '+=' or '{' after identifier",
                other,
                self.stream.current_pos(),
            )),
        }
    }

    /// Parse `{ property-list }`, the body of a module or a map value.
    fn parse_map_body(&mut self, depth: usize) -> Result<Vec<Property>, ParseError> {
        self.stream.expect(Token::LBrace, "'{'")?;
        let mut properties = Vec::new();
        loop {
            self.stream.skip_newlines();
            if self.stream.check(&Token::RBrace) {
                self.stream.advance();
                return Ok(properties);
            }
            let pos = self.stream.current_pos();
            let name = match self.stream.advance() {
                Some(Token::Ident(name)) => name.clone(),
                other => return Err(ParseError::expected("a property name or '}'", other, pos)),
            };
            let append = match self.stream.peek() {
                Some(Token::Colon) => {
                    self.stream.advance();
                    false
                }
                Some(Token::PlusEq) => {
                    self.stream.advance();
                    true
                }
                other => {
                    return Err(ParseError::expected(
                        "':' or '+=' after property name",
                        other,
                        self.stream.current_pos(),
                    ))
                }
            };
            let value = self.parse_value(depth)?;
            properties.push(Property {
                name,
                pos,
                value,
                append,
            });
            match self.stream.peek() {
                Some(Token::Comma) => {
                    self.stream.advance();
                }
                Some(Token::Newline) | Some(Token::RBrace) => {}
                other => {
                    return Err(ParseError::expected(
                        "',', newline or '}' after property",
                        other,
                        self.stream.current_pos(),
                    ))
                }
            }
        }
    }

    fn parse_value(&mut self, depth: usize) -> Result<Value, ParseError> {
        let pos = self.stream.current_pos();
        match self.stream.peek() {
            Some(Token::Str(_)) => {
                let Some(Token::Str(s)) = self.stream.advance() else {
                    unreachable!()
                };
                let s = s.clone();
                Ok(Value::string(pos, s))
            }
            Some(Token::True) => {
                self.stream.advance();
                Ok(Value::bool(pos, true))
            }
            Some(Token::False) => {
                self.stream.advance();
                Ok(Value::bool(pos, false))
            }
            Some(Token::LBracket) => self.parse_list(depth),
            Some(Token::LBrace) => {
                if depth + 1 > self.max_depth {
                    self.errors.push(ParseError::new(
                        ParseErrorKind::InvalidSyntax,
                        pos.clone(),
                        format!(
                            "maximum property nesting depth ({}) exceeded",
                            self.max_depth
                        ),
                    ));
                    self.skip_balanced();
                    return Ok(Value {
                        pos,
                        kind: ValueKind::Map(Vec::new()),
                    });
                }
                let properties = self.parse_map_body(depth + 1)?;
                Ok(Value {
                    pos,
                    kind: ValueKind::Map(properties),
                })
            }
            Some(Token::Ident(_)) => {
                let Some(Token::Ident(name)) = self.stream.advance() else {
                    unreachable!()
                };
                let name = name.clone();
                match self.scope.reference(&name) {
                    Some(mut value) => {
                        value.pos = pos;
                        Ok(value)
                    }
                    None => {
                        self.errors.push(ParseError::eval(
                            pos.clone(),
                            format!("variable {} is not set", name),
                        ));
                        // Recover with an empty string so parsing continues.
                        Ok(Value::string(pos, ""))
                    }
                }
            }
            other => Err(ParseError::expected("a value", other, pos)),
        }
    }

    fn parse_list(&mut self, depth: usize) -> Result<Value, ParseError> {
        let pos = self.stream.expect(Token::LBracket, "'['")?;
        let mut items: Vec<Value> = Vec::new();
        loop {
            self.stream.skip_newlines();
            if self.stream.check(&Token::RBracket) {
                self.stream.advance();
                break;
            }
            let item = self.parse_value(depth)?;
            if let Some(prev) = items.last() {
                if std::mem::discriminant(&prev.kind) != std::mem::discriminant(&item.kind) {
                    self.errors.push(ParseError::new(
                        ParseErrorKind::InvalidSyntax,
                        item.pos.clone(),
                        format!(
                            "list elements must be of a single type, found {} and {}",
                            prev.kind.kind_name(),
                            item.kind.kind_name()
                        ),
                    ));
                }
            }
            items.push(item);
            match self.stream.peek() {
                Some(Token::Comma) => {
                    self.stream.advance();
                }
                Some(Token::Newline) | Some(Token::RBracket) => {}
                other => {
                    return Err(ParseError::expected(
                        "',', newline or ']' in list",
                        other,
                        self.stream.current_pos(),
                    ))
                }
            }
        }
        Ok(Value {
            pos,
            kind: ValueKind::List(items),
        })
    }

    /// Consume one balanced value (used when recovering from a value that
    /// exceeded the nesting bound).
    fn skip_balanced(&mut self) {
        let mut depth: i32 = 0;
        while let Some(token) = self.stream.advance() {
            match token {
                Token::LBrace | Token::LBracket => depth += 1,
                Token::RBrace | Token::RBracket => {
                    depth -= 1;
                    if depth <= 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }
}
