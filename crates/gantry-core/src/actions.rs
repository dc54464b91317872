//! Per-module and per-singleton staged build actions.
//!
//! During generation each module writes only to its own `LocalActions`
//! buffer; the orchestrator merges the buffers afterward, so the hot path
//! needs no locking and the merge order fixes the manifest order.

use gantry_ninja::{BuildParams, Owner, RuleParams};
use gantry_parser::Pos;
use std::path::PathBuf;

/// A module- or singleton-local variable declaration.
pub(crate) struct LocalVariable {
    pub owner: Owner,
    pub name: String,
    pub value: String,
    /// Package whose variables the value may reference.
    pub pctx: String,
}

/// A module- or singleton-local rule declaration.
pub(crate) struct LocalRule {
    pub owner: Owner,
    pub name: String,
    pub params: RuleParams,
    pub arg_names: Vec<String>,
    /// Package whose variables the rule body may reference.
    pub pctx: String,
}

/// One emitted build edge with its provenance.
pub(crate) struct EdgeDef {
    pub params: BuildParams,
    /// Package whose variables edge values may reference.
    pub pctx: String,
    /// Emitting module or singleton name, for duplicate-output reports.
    pub by: String,
    /// Position of the emitting module, if any.
    pub pos: Option<Pos>,
}

/// Everything one module or singleton emitted.
#[derive(Default)]
pub(crate) struct LocalActions {
    pub variables: Vec<LocalVariable>,
    pub rules: Vec<LocalRule>,
    pub edges: Vec<EdgeDef>,
    pub ninja_file_deps: Vec<PathBuf>,
    pub defaults: Vec<String>,
    pub subninjas: Vec<String>,
    pub required_version: Option<(u32, u32, u32)>,
    /// `set_build_dir` requests; conflicts are detected at merge time.
    pub build_dir: Option<(String, String)>,
}
