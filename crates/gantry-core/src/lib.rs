// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Build graph orchestration and manifest generation.
//!
//! A host registers module types, singletons, mutators, and package
//! contexts on a [`Context`], then drives the generation pass:
//!
//! 1. [`Context::parse_build_files`]: parse the build-file closure,
//!    register modules, unpack properties, resolve dependencies, and
//!    reject cycles.
//! 2. [`Context::prepare_build_actions`]: run mutators, generate module
//!    actions concurrently in dependency order, run singletons
//!    sequentially, then assemble and verify the full action set.
//! 3. [`Context::write_build_file`]: serialize the manifest, or
//!    [`Context::write_build_file_to_path`] for atomic and check-file
//!    writes.
//!
//! Each step accumulates errors; when any are recorded the pass halts
//! before emission and no partial manifest reaches disk.

mod actions;
mod assemble;
mod config;
mod context;
mod docs;
mod error;
mod module;
mod module_ctx;
mod package;
mod singleton_ctx;
mod write;

pub use config::ConfigRef;
pub use context::{synthetic_pos, Context, MutatorContext};
pub use error::{render_errors, Error, FileDeps, Phase};
pub use module::{Module, ModuleFactory, ModuleHandle};
pub use module_ctx::ModuleContext;
pub use package::{DeclError, PackageContext, VariableFunc};
pub use singleton_ctx::{Singleton, SingletonContext, SingletonFactory};
pub use write::write_file_checked;

// The manifest-level types hosts use to declare rules and edges.
pub use gantry_ninja::{
    BuildParams, Deps, Owner, PoolParams, PoolRef, RuleParams, RuleRef, VarRef,
};
pub use gantry_parser::{ParseOptions, Pos};
pub use gantry_props::{FieldSlot, FieldSpec, LazyStruct, PropertyStruct};
