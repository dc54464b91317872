//! Package contexts: named, stable declaration namespaces.
//!
//! A `PackageContext` is constructed once at host start-up, populated with
//! static variables, lazy variable functions, rules, and pools, and then
//! registered with the [`Context`](crate::Context). Variables and rules
//! are identified only through their owning package; there is no global
//! namespace, and manifest names are qualified by package short name.

use crate::config::ConfigRef;
use gantry_ninja::{Owner, PoolParams, PoolRef, RuleParams, RuleRef, VarRef};
use indexmap::IndexMap;
use std::sync::Mutex;
use thiserror::Error;

/// A lazily evaluated variable: a closure over the host config, run once
/// per manifest.
pub type VariableFunc = Box<dyn Fn(ConfigRef<'_>) -> Result<String, String> + Send + Sync>;

pub(crate) enum PackageVar {
    /// Literal text, interpolated into rule commands verbatim.
    Static(String),
    Func(VariableFunc),
}

pub(crate) struct PackageRule {
    pub params: RuleParams,
    pub arg_names: Vec<String>,
}

#[derive(Default)]
pub(crate) struct PackageInner {
    pub variables: IndexMap<String, PackageVar>,
    pub rules: IndexMap<String, PackageRule>,
    pub pools: IndexMap<String, PoolParams>,
}

/// Errors from declaring into a package context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeclError {
    #[error("\"{name}\" already declared in package \"{package}\"")]
    Duplicate { package: String, name: String },
}

/// A named declaration namespace that survives across runs.
pub struct PackageContext {
    name: String,
    pub(crate) inner: Mutex<PackageInner>,
}

impl PackageContext {
    /// Create a package context with the given short name. The name
    /// becomes part of every mangled manifest identifier this package
    /// owns, so it must be stable across runs.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(PackageInner::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn owner(&self) -> Owner {
        Owner::Package(self.name.clone())
    }

    /// Declare a variable. The value may reference other variables of
    /// this package (`$name` / `${name}`); references resolve at emit
    /// time, and `$$` stands for a literal `$`.
    pub fn static_variable(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<VarRef, DeclError> {
        let name = name.into();
        let mut inner = self.lock();
        self.check_unique(&inner, &name)?;
        inner.variables.insert(name.clone(), PackageVar::Static(value.into()));
        Ok(VarRef {
            owner: self.owner(),
            name,
        })
    }

    /// Declare a variable whose value is computed from the host config,
    /// exactly once per manifest.
    pub fn variable_func(
        &self,
        name: impl Into<String>,
        f: VariableFunc,
    ) -> Result<VarRef, DeclError> {
        let name = name.into();
        let mut inner = self.lock();
        self.check_unique(&inner, &name)?;
        inner.variables.insert(name.clone(), PackageVar::Func(f));
        Ok(VarRef {
            owner: self.owner(),
            name,
        })
    }

    /// Declare a rule. `arg_names` lists the arguments build edges may
    /// (and, unless package variables cover them, must) supply.
    pub fn static_rule(
        &self,
        name: impl Into<String>,
        params: RuleParams,
        arg_names: &[&str],
    ) -> Result<RuleRef, DeclError> {
        let name = name.into();
        let mut inner = self.lock();
        self.check_unique(&inner, &name)?;
        inner.rules.insert(
            name.clone(),
            PackageRule {
                params,
                arg_names: arg_names.iter().map(|s| s.to_string()).collect(),
            },
        );
        Ok(RuleRef {
            owner: self.owner(),
            name,
        })
    }

    /// Declare a pool.
    pub fn static_pool(
        &self,
        name: impl Into<String>,
        params: PoolParams,
    ) -> Result<PoolRef, DeclError> {
        let name = name.into();
        let mut inner = self.lock();
        self.check_unique(&inner, &name)?;
        inner.pools.insert(name.clone(), params);
        Ok(PoolRef {
            owner: self.owner(),
            name,
        })
    }

    /// Whether this package declares a variable with the given name.
    pub(crate) fn has_variable(&self, name: &str) -> bool {
        self.lock().variables.contains_key(name)
    }

    fn check_unique(&self, inner: &PackageInner, name: &str) -> Result<(), DeclError> {
        if inner.variables.contains_key(name)
            || inner.rules.contains_key(name)
            || inner.pools.contains_key(name)
        {
            return Err(DeclError::Duplicate {
                package: self.name.clone(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PackageInner> {
        self.inner
            .lock()
            .expect("BUG: package context mutex poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declarations_and_uniqueness() {
        let pctx = PackageContext::new("tools");
        let cc = pctx.static_variable("cc", "gcc").unwrap();
        assert_eq!(cc.mangled(), "g.tools.cc");

        let rule = pctx
            .static_rule(
                "compile",
                RuleParams {
                    command: "$cc -c $in -o $out".into(),
                    ..Default::default()
                },
                &["cflags"],
            )
            .unwrap();
        assert_eq!(rule.mangled(), "g.tools.compile");

        // Names are unique across kinds within one package.
        assert!(pctx.static_variable("cc", "clang").is_err());
        assert!(pctx.static_rule("cc", RuleParams::default(), &[]).is_err());
        assert!(pctx
            .static_pool(
                "compile",
                PoolParams {
                    comment: None,
                    depth: 1
                }
            )
            .is_err());
    }

    #[test]
    fn same_name_in_different_packages_is_fine() {
        let a = PackageContext::new("a");
        let b = PackageContext::new("b");
        let va = a.static_variable("cc", "gcc").unwrap();
        let vb = b.static_variable("cc", "clang").unwrap();
        assert_ne!(va.mangled(), vb.mangled());
    }
}
