//! AST for build files.
//!
//! Values here are already evaluated: variable references have been
//! resolved against the file scope and `+=` concatenations applied. What
//! remains is plain data plus source positions, which is all the property
//! unpacker and the orchestrator ever look at.

use gantry_lexer::Comment;
use std::fmt;
use std::sync::Arc;

/// A source position: file, 1-based line, 1-based column.
///
/// Every token and AST node carries one. The file name is shared via `Arc`
/// so cloning positions around error paths stays cheap.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pos {
    pub file: Arc<str>,
    pub line: u32,
    pub col: u32,
}

impl Pos {
    pub fn new(file: Arc<str>, line: u32, col: u32) -> Self {
        Self { file, line, col }
    }

    /// Placeholder position for values synthesized by the host.
    pub fn none() -> Self {
        Self {
            file: Arc::from(""),
            line: 0,
            col: 0,
        }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

/// An evaluated value with the position it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub pos: Pos,
    pub kind: ValueKind,
}

/// The value variants of the DSL.
///
/// Lists are homogeneous by element kind; the evaluator enforces this.
/// Strings may contain `$name` / `${name}` references, which are opaque
/// here and resolved by the manifest layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    String(String),
    Bool(bool),
    List(Vec<Value>),
    Map(Vec<Property>),
}

impl ValueKind {
    /// Human-readable kind name for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ValueKind::String(_) => "string",
            ValueKind::Bool(_) => "bool",
            ValueKind::List(_) => "list",
            ValueKind::Map(_) => "map",
        }
    }
}

impl Value {
    pub fn string(pos: Pos, s: impl Into<String>) -> Self {
        Value {
            pos,
            kind: ValueKind::String(s.into()),
        }
    }

    pub fn bool(pos: Pos, b: bool) -> Self {
        Value {
            pos,
            kind: ValueKind::Bool(b),
        }
    }

    /// The string content, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            ValueKind::String(s) => Some(s),
            _ => None,
        }
    }

    /// The elements, if this is a list value.
    pub fn as_list(&self) -> Option<&[Value]> {
        match &self.kind {
            ValueKind::List(items) => Some(items),
            _ => None,
        }
    }
}

/// A top-level variable assignment, after evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub name: String,
    pub pos: Pos,
    pub value: Value,
    pub append: bool,
    /// Set once an evaluated expression has read this variable. Appending
    /// afterward would silently change history, so it is an error.
    pub referenced: bool,
}

/// A `name: value` (or `name += value`) pair inside a module or map body.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub pos: Pos,
    pub value: Value,
    pub append: bool,
}

/// A module definition: `type_name { properties }`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleDef {
    pub type_name: String,
    pub pos: Pos,
    pub properties: Vec<Property>,
}

impl ModuleDef {
    /// Look up a direct property by name.
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// One top-level definition in a build file.
#[derive(Debug, Clone, PartialEq)]
pub enum Def {
    Assignment(Assignment),
    Module(ModuleDef),
}

/// A parsed build file: definitions in source order plus the captured
/// comments, kept so external tools can round-trip the file.
#[derive(Debug, Clone)]
pub struct BuildFile {
    pub path: Arc<str>,
    pub defs: Vec<Def>,
    pub comments: Vec<Comment>,
}

impl BuildFile {
    /// Iterate over the module definitions in this file.
    pub fn modules(&self) -> impl Iterator<Item = &ModuleDef> {
        self.defs.iter().filter_map(|d| match d {
            Def::Module(m) => Some(m),
            Def::Assignment(_) => None,
        })
    }
}
