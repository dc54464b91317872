//! The per-module callback surface.
//!
//! A `ModuleContext` lives only for the duration of one module's
//! `generate_build_actions` call. It stages declarations and edges into
//! the module's own action buffer; nothing is shared with other modules,
//! which is what lets generation fan out across the worker pool.

use crate::actions::{EdgeDef, LocalActions, LocalRule, LocalVariable};
use crate::config::ConfigRef;
use crate::error::{Error, Phase};
use crate::module::{visit_deps_depth_first, ModuleHandle, ModuleInfo};
use crate::package::PackageContext;
use crate::Context;
use gantry_ninja::{BuildParams, Owner, RuleParams, RuleRef};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Read-only state shared by every context during one generation pass.
pub(crate) struct GenShared<'a> {
    pub modules: &'a [ModuleInfo],
    pub packages: &'a IndexMap<String, Arc<PackageContext>>,
    pub config: ConfigRef<'a>,
}

/// The API a module sees while generating its build actions.
pub struct ModuleContext<'a> {
    shared: &'a GenShared<'a>,
    info: &'a ModuleInfo,
    pub(crate) actions: LocalActions,
    pub(crate) errs: Vec<Error>,
}

impl<'a> ModuleContext<'a> {
    pub(crate) fn new(shared: &'a GenShared<'a>, info: &'a ModuleInfo) -> Self {
        Self {
            shared,
            info,
            actions: LocalActions::default(),
            errs: Vec::new(),
        }
    }

    pub fn module_name(&self) -> &str {
        self.info.name()
    }

    pub fn module_type(&self) -> &str {
        &self.info.type_name
    }

    pub fn module_dir(&self) -> &Path {
        &self.info.dir
    }

    /// The build file this module was defined in.
    pub fn build_file(&self) -> &str {
        &self.info.file
    }

    pub fn config(&self) -> ConfigRef<'a> {
        self.shared.config
    }

    /// Declare a module-local variable. Its scope extends to every build
    /// edge emitted by this module; the value may reference variables of
    /// `pctx`.
    pub fn variable(&mut self, pctx: &PackageContext, name: &str, value: &str) {
        if !self.check_pctx(pctx) {
            return;
        }
        if self.actions.variables.iter().any(|v| v.name == name)
            || self.actions.rules.iter().any(|r| r.name == name)
        {
            self.errs.push(Error::new(
                Phase::Generation,
                self.info.pos.clone(),
                format!(
                    "module \"{}\" declared \"{}\" more than once",
                    self.module_name(),
                    name
                ),
            ));
            return;
        }
        self.actions.variables.push(LocalVariable {
            owner: Owner::Module(self.module_name().to_string()),
            name: name.to_string(),
            value: value.to_string(),
            pctx: pctx.name().to_string(),
        });
    }

    /// Declare a module-local rule.
    pub fn rule(
        &mut self,
        pctx: &PackageContext,
        name: &str,
        params: RuleParams,
        arg_names: &[&str],
    ) -> RuleRef {
        let owner = Owner::Module(self.module_name().to_string());
        let rule_ref = RuleRef {
            owner: owner.clone(),
            name: name.to_string(),
        };
        if !self.check_pctx(pctx) {
            return rule_ref;
        }
        if self.actions.rules.iter().any(|r| r.name == name)
            || self.actions.variables.iter().any(|v| v.name == name)
        {
            self.errs.push(Error::new(
                Phase::Generation,
                self.info.pos.clone(),
                format!(
                    "module \"{}\" declared \"{}\" more than once",
                    self.module_name(),
                    name
                ),
            ));
            return rule_ref;
        }
        self.actions.rules.push(LocalRule {
            owner,
            name: name.to_string(),
            params,
            arg_names: arg_names.iter().map(|s| s.to_string()).collect(),
            pctx: pctx.name().to_string(),
        });
        rule_ref
    }

    /// Emit a build edge. Values may reference variables of `pctx`, this
    /// module's local variables, and the rule's declared arguments.
    pub fn build(&mut self, pctx: &PackageContext, params: BuildParams) {
        if !self.check_pctx(pctx) {
            return;
        }
        self.actions.edges.push(EdgeDef {
            params,
            pctx: pctx.name().to_string(),
            by: self.module_name().to_string(),
            pos: Some(self.info.pos.clone()),
        });
    }

    /// Visit direct dependencies in declared order.
    pub fn visit_direct_deps(&self, mut visit: impl FnMut(ModuleHandle<'_>)) {
        for &dep in &self.info.deps {
            visit(ModuleHandle {
                info: &self.shared.modules[dep],
            });
        }
    }

    /// Visit transitive dependencies depth-first, in declared order, each
    /// dependency after its own dependencies.
    pub fn visit_deps_depth_first(&self, mut visit: impl FnMut(ModuleHandle<'_>)) {
        visit_deps_depth_first(
            self.shared.modules,
            self.info.id,
            &mut |_| true,
            &mut visit,
        );
    }

    /// Like `visit_deps_depth_first`, visiting only modules that satisfy
    /// `pred`. The walk still descends through non-matching modules.
    pub fn visit_deps_depth_first_if(
        &self,
        mut pred: impl FnMut(ModuleHandle<'_>) -> bool,
        mut visit: impl FnMut(ModuleHandle<'_>),
    ) {
        visit_deps_depth_first(self.shared.modules, self.info.id, &mut pred, &mut visit);
    }

    /// Paths that, when changed, should cause the manifest to be
    /// regenerated.
    pub fn add_ninja_file_deps<I, P>(&mut self, deps: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.actions
            .ninja_file_deps
            .extend(deps.into_iter().map(Into::into));
    }

    /// Raise the minimum ninja version recorded in the manifest header.
    pub fn require_ninja_version(&mut self, major: u32, minor: u32, micro: u32) {
        let v = (major, minor, micro);
        self.actions.required_version = Some(match self.actions.required_version {
            Some(cur) if cur >= v => cur,
            _ => v,
        });
    }

    /// Report an error against this module.
    pub fn module_errorf(&mut self, message: impl Into<String>) {
        self.errs.push(Error::new(
            Phase::Generation,
            self.info.pos.clone(),
            format!("module \"{}\": {}", self.module_name(), message.into()),
        ));
    }

    /// Report an error against one of this module's properties, using the
    /// property's own source position when it was set.
    pub fn property_errorf(&mut self, property: &str, message: impl Into<String>) {
        let pos = self
            .info
            .def
            .property(property)
            .map(|p| p.pos.clone())
            .unwrap_or_else(|| self.info.pos.clone());
        self.errs.push(Error::new(
            Phase::Generation,
            pos,
            format!("property \"{}\": {}", property, message.into()),
        ));
    }

    fn check_pctx(&mut self, pctx: &PackageContext) -> bool {
        if self.shared.packages.contains_key(pctx.name()) {
            return true;
        }
        self.errs.push(Error::internal(format!(
            "package context \"{}\" was never registered",
            pctx.name()
        )));
        false
    }
}

/// Accessor used by [`Context`] after a wave completes.
impl Context {
    pub(crate) fn handle(&self, id: usize) -> ModuleHandle<'_> {
        ModuleHandle {
            info: &self.modules[id],
        }
    }
}
