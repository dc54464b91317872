//! Host-facing parameter structs for rules, pools, and build edges.

use crate::ids::{PoolRef, RuleRef};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// How the downstream executor should interpret a depfile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Deps {
    Gcc,
    Msvc,
}

impl Deps {
    pub fn as_str(self) -> &'static str {
        match self {
            Deps::Gcc => "gcc",
            Deps::Msvc => "msvc",
        }
    }
}

/// Parameters for a rule declaration.
///
/// `command` and the other string values may reference `$variables`;
/// references are checked at emit time against the rule's declared
/// arguments and the owning scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleParams {
    pub command: String,
    pub description: Option<String>,
    pub depfile: Option<String>,
    pub deps: Option<Deps>,
    pub generator: bool,
    pub restat: bool,
    pub rspfile: Option<String>,
    pub rspfile_content: Option<String>,
    pub pool: Option<PoolRef>,
}

/// Parameters for a pool declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolParams {
    pub comment: Option<String>,
    pub depth: i32,
}

/// Parameters for one build edge.
#[derive(Debug, Clone)]
pub struct BuildParams {
    pub rule: RuleRef,
    pub outputs: Vec<String>,
    pub implicit_outputs: Vec<String>,
    pub inputs: Vec<String>,
    pub implicits: Vec<String>,
    pub order_only: Vec<String>,
    pub validations: Vec<String>,
    /// Values for the rule's declared arguments.
    pub args: IndexMap<String, String>,
    /// Extra edge-local variables, emitted verbatim under the build line.
    pub variables: IndexMap<String, String>,
}

impl BuildParams {
    pub fn new(rule: RuleRef) -> Self {
        Self {
            rule,
            outputs: Vec::new(),
            implicit_outputs: Vec::new(),
            inputs: Vec::new(),
            implicits: Vec::new(),
            order_only: Vec::new(),
            validations: Vec::new(),
            args: IndexMap::new(),
            variables: IndexMap::new(),
        }
    }
}
