//! Variable scopes and assignment semantics.
//!
//! A scope is an ordered name → assignment map with an optional parent;
//! lookup walks the chain. Bindings are immutable once made: a second
//! plain assignment at the same scope is an error, and `+=` is the only
//! sanctioned mutation. Appending is typed (string+string, list+list) and
//! refused once the variable has been read, since earlier uses captured
//! the old value.

use crate::ast::{Assignment, Pos, Value, ValueKind};
use crate::error::ParseError;
use indexmap::IndexMap;

/// An ordered variable scope with an optional parent.
#[derive(Debug, Default)]
pub struct Scope {
    vars: IndexMap<String, Assignment>,
    parent: Option<Box<Scope>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parent(parent: Scope) -> Self {
        Self {
            vars: IndexMap::new(),
            parent: Some(Box::new(parent)),
        }
    }

    /// Read a variable for evaluation, marking it referenced.
    pub fn reference(&mut self, name: &str) -> Option<Value> {
        if let Some(a) = self.vars.get_mut(name) {
            a.referenced = true;
            return Some(a.value.clone());
        }
        self.parent.as_mut()?.reference(name)
    }

    /// Look up a variable without marking it referenced.
    pub fn get(&self, name: &str) -> Option<&Assignment> {
        self.vars
            .get(name)
            .or_else(|| self.parent.as_ref()?.get(name))
    }

    /// Bind a new variable in this scope.
    pub fn define(&mut self, name: &str, pos: Pos, value: Value) -> Result<(), Vec<ParseError>> {
        if let Some(prev) = self.vars.get(name) {
            return Err(vec![
                ParseError::eval(pos, format!("variable {} already defined", name)),
                ParseError::eval(prev.pos.clone(), "<-- previous definition here"),
            ]);
        }
        self.vars.insert(
            name.to_string(),
            Assignment {
                name: name.to_string(),
                pos,
                value,
                append: false,
                referenced: false,
            },
        );
        Ok(())
    }

    /// Append to an existing variable (`+=`).
    pub fn append(&mut self, name: &str, pos: Pos, value: Value) -> Result<(), Vec<ParseError>> {
        if let Some(a) = self.vars.get_mut(name) {
            if a.referenced {
                return Err(vec![ParseError::eval(
                    pos,
                    format!("variable {} modified after being referenced", name),
                )]);
            }
            return concat_value(&mut a.value, value, name, &pos).map_err(|e| vec![e]);
        }
        if self.parent.as_ref().is_some_and(|p| p.get(name).is_some()) {
            return Err(vec![ParseError::eval(
                pos,
                format!("cannot append to variable {} defined in an enclosing scope", name),
            )]);
        }
        Err(vec![ParseError::eval(
            pos,
            format!("variable {} is not set", name),
        )])
    }

    /// The assignments made directly in this scope, in source order.
    pub fn assignments(&self) -> impl Iterator<Item = &Assignment> {
        self.vars.values()
    }
}

/// Typed concatenation for `+=`: string+string or list+list only.
fn concat_value(lhs: &mut Value, rhs: Value, name: &str, pos: &Pos) -> Result<(), ParseError> {
    match (&mut lhs.kind, rhs.kind) {
        (ValueKind::String(a), ValueKind::String(b)) => {
            a.push_str(&b);
            Ok(())
        }
        (ValueKind::List(a), ValueKind::List(b)) => {
            a.extend(b);
            Ok(())
        }
        (lk, rk) => Err(ParseError::eval(
            pos.clone(),
            format!(
                "cannot append to variable {}: {} += {}",
                name,
                lk.kind_name(),
                rk.kind_name()
            ),
        )),
    }
}
