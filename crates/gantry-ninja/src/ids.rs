//! Owned declaration identities and stable name mangling.
//!
//! There is no global namespace: every variable, rule, and pool is
//! identified by its declared name plus the scope that owns it. The
//! manifest-level name is a deterministic mangle of the two, so identical
//! inputs always produce identical output bytes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The scope that owns a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Owner {
    /// Ninja built-ins (`phony`, `console`, `in`, `out`). Never mangled.
    Builtin,
    /// A package context, by short name.
    Package(String),
    /// A module-local declaration, by module name.
    Module(String),
    /// A singleton-local declaration, by singleton name.
    Singleton(String),
}

impl Owner {
    /// The mangled manifest name for a declaration of `name` in this scope.
    pub fn mangle(&self, name: &str) -> String {
        match self {
            Owner::Builtin => name.to_string(),
            Owner::Package(p) => format!("g.{}.{}", p, name),
            Owner::Module(m) => format!("m.{}.{}", m, name),
            Owner::Singleton(s) => format!("s.{}.{}", s, name),
        }
    }
}

/// A reference to a declared variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarRef {
    pub owner: Owner,
    pub name: String,
}

/// A reference to a declared rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleRef {
    pub owner: Owner,
    pub name: String,
}

impl RuleRef {
    /// The built-in `phony` rule.
    pub fn phony() -> Self {
        Self {
            owner: Owner::Builtin,
            name: "phony".to_string(),
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.owner == Owner::Builtin
    }

    pub fn mangled(&self) -> String {
        self.owner.mangle(&self.name)
    }
}

impl VarRef {
    pub fn mangled(&self) -> String {
        self.owner.mangle(&self.name)
    }
}

/// A reference to a declared pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolRef {
    pub owner: Owner,
    pub name: String,
}

impl PoolRef {
    /// The built-in `console` pool.
    pub fn console() -> Self {
        Self {
            owner: Owner::Builtin,
            name: "console".to_string(),
        }
    }

    pub fn mangled(&self) -> String {
        self.owner.mangle(&self.name)
    }
}

impl fmt::Display for RuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mangled())
    }
}
