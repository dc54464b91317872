//! The per-singleton callback surface.
//!
//! Singletons run strictly after every module has generated, in
//! registration order, one at a time. Their context is a superset of the
//! module surface minus the per-module accessors, plus whole-graph visits
//! and the manifest-wide declarations (`builddir`, defaults, subninja).

use crate::actions::{EdgeDef, LocalActions, LocalRule, LocalVariable};
use crate::config::ConfigRef;
use crate::error::{Error, Phase};
use crate::module::{visit_deps_depth_first, ModuleHandle};
use crate::module_ctx::GenShared;
use crate::package::PackageContext;
use gantry_ninja::{BuildParams, Owner, RuleParams, RuleRef};
use std::path::PathBuf;

/// A registered singleton: emits build actions once per manifest.
pub trait Singleton: Send + Sync {
    fn generate_build_actions(&self, ctx: &mut SingletonContext<'_>);
}

/// Factory for a registered singleton, invoked at registration time.
pub type SingletonFactory = Box<dyn FnOnce() -> Box<dyn Singleton>>;

/// The API a singleton sees while generating its build actions.
pub struct SingletonContext<'a> {
    shared: &'a GenShared<'a>,
    name: &'a str,
    pub(crate) actions: LocalActions,
    pub(crate) errs: Vec<Error>,
}

impl<'a> SingletonContext<'a> {
    pub(crate) fn new(shared: &'a GenShared<'a>, name: &'a str) -> Self {
        Self {
            shared,
            name,
            actions: LocalActions::default(),
            errs: Vec::new(),
        }
    }

    pub fn config(&self) -> ConfigRef<'a> {
        self.shared.config
    }

    /// Visit every live module, in registration order (source order).
    pub fn visit_all_modules(&self, mut visit: impl FnMut(ModuleHandle<'_>)) {
        for info in self.shared.modules.iter().filter(|m| !m.skipped) {
            visit(ModuleHandle { info });
        }
    }

    /// Visit every live module that satisfies `pred`.
    pub fn visit_all_modules_if(
        &self,
        mut pred: impl FnMut(ModuleHandle<'_>) -> bool,
        mut visit: impl FnMut(ModuleHandle<'_>),
    ) {
        for info in self.shared.modules.iter().filter(|m| !m.skipped) {
            let handle = ModuleHandle { info };
            if pred(handle) {
                visit(handle);
            }
        }
    }

    /// Depth-first visit of one module's transitive dependencies.
    pub fn visit_deps_depth_first(
        &self,
        module: ModuleHandle<'_>,
        mut visit: impl FnMut(ModuleHandle<'_>),
    ) {
        visit_deps_depth_first(self.shared.modules, module.id(), &mut |_| true, &mut visit);
    }

    /// Like `visit_deps_depth_first` with a predicate.
    pub fn visit_deps_depth_first_if(
        &self,
        module: ModuleHandle<'_>,
        mut pred: impl FnMut(ModuleHandle<'_>) -> bool,
        mut visit: impl FnMut(ModuleHandle<'_>),
    ) {
        visit_deps_depth_first(self.shared.modules, module.id(), &mut pred, &mut visit);
    }

    /// Declare a singleton-local variable.
    pub fn variable(&mut self, pctx: &PackageContext, name: &str, value: &str) {
        if !self.check_pctx(pctx) {
            return;
        }
        if self.actions.variables.iter().any(|v| v.name == name)
            || self.actions.rules.iter().any(|r| r.name == name)
        {
            self.errs.push(Error::unpositioned(
                Phase::Generation,
                format!("singleton \"{}\" declared \"{}\" more than once", self.name, name),
            ));
            return;
        }
        self.actions.variables.push(LocalVariable {
            owner: Owner::Singleton(self.name.to_string()),
            name: name.to_string(),
            value: value.to_string(),
            pctx: pctx.name().to_string(),
        });
    }

    /// Declare a singleton-local rule.
    pub fn rule(
        &mut self,
        pctx: &PackageContext,
        name: &str,
        params: RuleParams,
        arg_names: &[&str],
    ) -> RuleRef {
        let owner = Owner::Singleton(self.name.to_string());
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
            self.errs.push(Error::unpositioned(
                Phase::Generation,
                format!("singleton \"{}\" declared \"{}\" more than once", self.name, name),
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

    /// Emit a build edge.
    pub fn build(&mut self, pctx: &PackageContext, params: BuildParams) {
        if !self.check_pctx(pctx) {
            return;
        }
        self.actions.edges.push(EdgeDef {
            params,
            pctx: pctx.name().to_string(),
            by: self.name.to_string(),
            pos: None,
        });
    }

    /// Set the manifest's `builddir`. Allowed at most once per manifest,
    /// across all singletons.
    pub fn set_build_dir(&mut self, pctx: &PackageContext, value: &str) {
        if !self.check_pctx(pctx) {
            return;
        }
        if self.actions.build_dir.is_some() {
            self.errs.push(Error::unpositioned(
                Phase::Generation,
                "builddir set more than once",
            ));
            return;
        }
        self.actions.build_dir = Some((pctx.name().to_string(), value.to_string()));
    }

    /// Declare default targets, emitted after all build edges.
    pub fn add_default(&mut self, targets: &[&str]) {
        self.actions
            .defaults
            .extend(targets.iter().map(|s| s.to_string()));
    }

    /// Include another manifest via `subninja`.
    pub fn add_subninja(&mut self, path: &str) {
        self.actions.subninjas.push(path.to_string());
    }

    /// Paths that should cause the manifest to be regenerated.
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

    /// Report an error not tied to any module.
    pub fn errorf(&mut self, message: impl Into<String>) {
        self.errs.push(Error::unpositioned(
            Phase::Generation,
            format!("singleton \"{}\": {}", self.name, message.into()),
        ));
    }

    /// Report an error against a specific module.
    pub fn module_errorf(&mut self, module: ModuleHandle<'_>, message: impl Into<String>) {
        self.errs.push(Error::new(
            Phase::Generation,
            module.info.pos.clone(),
            format!("module \"{}\": {}", module.name(), message.into()),
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
