//! The built-in `phony` module type.
//!
//! A phony module is a named alias: it emits a single edge on the ninja
//! built-in `phony` rule whose output is the module name and whose inputs
//! are its direct dependencies' names. It carries no properties beyond
//! the reserved `name` and `deps`.

use gantry_core::{BuildParams, Module, ModuleContext, PropertyStruct, RuleRef};
use std::any::Any;

#[derive(Debug, Default)]
pub struct PhonyModule;

impl Module for PhonyModule {
    fn props(&mut self) -> Vec<&mut dyn PropertyStruct> {
        Vec::new()
    }

    fn generate_build_actions(&self, ctx: &mut ModuleContext<'_>) {
        let mut params = BuildParams::new(RuleRef::phony());
        params.outputs.push(ctx.module_name().to_string());
        ctx.visit_direct_deps(|dep| params.inputs.push(dep.name().to_string()));
        ctx.build(&crate::driver_pctx(), params);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
