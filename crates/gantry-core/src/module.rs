//! Host-facing module surface and the orchestrator's per-module state.

use crate::actions::LocalActions;
use gantry_parser::{ModuleDef, Pos};
use gantry_props::{FieldSlot, FieldSpec, PropertyStruct};
use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A module implementation, produced by a registered factory.
///
/// The orchestrator fills the containers returned by `props` from the
/// module's build-file definition, then calls `generate_build_actions` in
/// dependency order. Generation takes `&self`: by that point a module's
/// state is its unpacked properties.
pub trait Module: Any + Send + Sync {
    /// The property containers this module exposes, in unpack order.
    fn props(&mut self) -> Vec<&mut dyn PropertyStruct>;

    /// Emit rules and build edges for this module.
    fn generate_build_actions(&self, ctx: &mut crate::ModuleContext<'_>);

    /// Typed view for host downcasts in visitors.
    fn as_any(&self) -> &dyn Any;

    /// Typed mutable view for host mutators.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Factory for a registered module type.
pub type ModuleFactory = Box<dyn Fn() -> Box<dyn Module> + Send + Sync>;

/// The properties the orchestrator itself recognizes on every module.
#[derive(Debug, Default)]
pub(crate) struct BaseProperties {
    pub name: String,
    pub deps: Vec<String>,
}

impl PropertyStruct for BaseProperties {
    fn fields(&self) -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[FieldSpec::new("name"), FieldSpec::new("deps")];
        FIELDS
    }

    fn field_slot(&mut self, index: usize) -> FieldSlot<'_> {
        match index {
            0 => FieldSlot::String(&mut self.name),
            1 => FieldSlot::StringList(&mut self.deps),
            _ => panic!("field index out of range"),
        }
    }
}

/// The orchestrator's record of one registered module.
pub(crate) struct ModuleInfo {
    pub id: usize,
    pub logic: Box<dyn Module>,
    pub base: BaseProperties,
    pub type_name: String,
    /// Retained for `property_errorf` positions.
    pub def: ModuleDef,
    pub pos: Pos,
    pub dir: PathBuf,
    pub file: Arc<str>,
    pub deps: Vec<usize>,
    pub rdeps: Vec<usize>,
    pub skipped: bool,
    pub errored: bool,
    pub actions: LocalActions,
}

impl ModuleInfo {
    pub fn name(&self) -> &str {
        &self.base.name
    }
}

/// An opaque handle to a module, passed to visitors.
///
/// Identity is a stable integer id; the host's own state is reachable
/// through [`ModuleHandle::module`] plus a downcast.
#[derive(Clone, Copy)]
pub struct ModuleHandle<'a> {
    pub(crate) info: &'a ModuleInfo,
}

impl<'a> ModuleHandle<'a> {
    pub fn id(&self) -> usize {
        self.info.id
    }

    pub fn name(&self) -> &str {
        self.info.name()
    }

    pub fn type_name(&self) -> &str {
        &self.info.type_name
    }

    pub fn dir(&self) -> &Path {
        &self.info.dir
    }

    pub fn build_file(&self) -> &str {
        &self.info.file
    }

    /// The host module, for downcasting via [`Module::as_any`].
    pub fn module(&self) -> &'a dyn Module {
        self.info.logic.as_ref()
    }

    /// The declared dependency names, as resolved by the orchestrator.
    pub fn dep_names<'b>(&'b self) -> impl Iterator<Item = &'b str> {
        self.info.base.deps.iter().map(|s| s.as_str())
    }
}

/// Deterministic depth-first visit of a module's transitive dependencies.
///
/// Dependencies are visited in declared order, each subtree before the
/// dependency itself (post-order); the starting module is not visited.
/// Cycles have been rejected before this runs, so recursion terminates.
pub(crate) fn visit_deps_depth_first(
    modules: &[ModuleInfo],
    start: usize,
    pred: &mut dyn FnMut(ModuleHandle<'_>) -> bool,
    visit: &mut dyn FnMut(ModuleHandle<'_>),
) {
    let mut visited = vec![false; modules.len()];
    visited[start] = true;
    fn walk(
        modules: &[ModuleInfo],
        id: usize,
        visited: &mut [bool],
        pred: &mut dyn FnMut(ModuleHandle<'_>) -> bool,
        visit: &mut dyn FnMut(ModuleHandle<'_>),
    ) {
        for &dep in &modules[id].deps {
            if visited[dep] {
                continue;
            }
            visited[dep] = true;
            walk(modules, dep, visited, pred, visit);
            let handle = ModuleHandle {
                info: &modules[dep],
            };
            if pred(handle) {
                visit(handle);
            }
        }
    }
    walk(modules, start, &mut visited, pred, visit);
}
