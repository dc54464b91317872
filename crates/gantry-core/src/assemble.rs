//! Phase 8: merge per-module and per-singleton actions into one verified,
//! fully rendered action set.
//!
//! Everything observable about the output is fixed here: declaration
//! grouping and sorting, reference resolution to mangled names, escaping,
//! and the global invariants (unique outputs, declared rules, resolvable
//! references, single builddir).
//!
//! Package declarations are emitted only when something live references
//! them: a rule reached by an edge, a variable reached by a rendered
//! value. An empty module graph therefore produces a header-only
//! manifest, and a variable function whose variable is never referenced
//! is never evaluated.

use crate::actions::EdgeDef;
use crate::config::ConfigRef;
use crate::error::{Error, Phase};
use crate::package::PackageVar;
use crate::Context;
use gantry_ninja::{Deps, EscapeContext, NinjaString, Owner, PoolParams, RuleParams};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};

/// A pool declaration ready for emission.
pub(crate) struct PoolDecl {
    pub name: String,
    pub depth: i32,
    pub comment: Option<String>,
}

/// One module's or singleton's emitted block.
pub(crate) struct Section {
    pub title: String,
    pub variables: Vec<(String, String)>,
    pub rules: Vec<(String, Vec<(String, String)>)>,
    pub edges: Vec<RenderedEdge>,
}

impl Section {
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty() && self.rules.is_empty() && self.edges.is_empty()
    }
}

/// A fully rendered build edge.
pub(crate) struct RenderedEdge {
    pub outputs: Vec<String>,
    pub implicit_outputs: Vec<String>,
    pub rule: String,
    pub inputs: Vec<String>,
    pub implicits: Vec<String>,
    pub order_only: Vec<String>,
    pub validations: Vec<String>,
    pub vars: Vec<(String, String)>,
}

/// The verified, render-complete action set.
pub(crate) struct Assembled {
    pub required_version: (u32, u32, u32),
    pub build_dir: Option<String>,
    pub pools: Vec<PoolDecl>,
    pub pkg_variables: Vec<(String, String)>,
    pub pkg_rules: Vec<(String, Vec<(String, String)>)>,
    pub sections: Vec<Section>,
    pub defaults: Vec<String>,
    pub subninjas: Vec<String>,
}

struct RuleInfo {
    arg_names: Vec<String>,
    /// Package whose variables may satisfy unsupplied arguments.
    pctx: String,
}

/// Declaration names per package, plus cloned rule and pool parameters.
/// Values stay behind in the package contexts until liveness is known.
struct PkgSnap {
    var_names: HashSet<String>,
    rules: IndexMap<String, (RuleParams, Vec<String>)>,
    pools: IndexMap<String, PoolParams>,
}

/// Everything referenced by an emitted action.
#[derive(Default)]
struct LiveSet {
    vars: HashSet<(String, String)>,
    rules: HashSet<(String, String)>,
    pools: HashSet<String>,
}

/// Name-resolution layers for one rendered string: rule arguments, the
/// emitter's local variables, one package's variables, then builtins.
/// Package hits are recorded as live.
struct ResolveCtx<'a> {
    args: Option<&'a [String]>,
    locals: Option<&'a IndexMap<String, String>>,
    pkg: Option<(&'a str, &'a HashSet<String>)>,
    live: &'a RefCell<LiveSet>,
}

impl ResolveCtx<'_> {
    fn resolve(&self, name: &str) -> Option<String> {
        if let Some(args) = self.args {
            if args.iter().any(|a| a == name) {
                return Some(format!("${{{}}}", name));
            }
        }
        if let Some(locals) = self.locals {
            if let Some(mangled) = locals.get(name) {
                return Some(format!("${{{}}}", mangled));
            }
        }
        if let Some((pkg, vars)) = self.pkg {
            if vars.contains(name) {
                self.live
                    .borrow_mut()
                    .vars
                    .insert((pkg.to_string(), name.to_string()));
                return Some(format!("${{g.{}.{}}}", pkg, name));
            }
        }
        if matches!(name, "in" | "out" | "in_newline") {
            return Some(format!("${{{}}}", name));
        }
        None
    }
}

fn render(
    raw: &str,
    escape: EscapeContext,
    rctx: &ResolveCtx<'_>,
    location: &str,
    errors: &mut Vec<Error>,
) -> Option<String> {
    let parsed = match NinjaString::parse(raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            errors.push(Error::unpositioned(
                Phase::Generation,
                format!("in {}: {}", location, e),
            ));
            return None;
        }
    };
    match parsed.render(escape, &|name| rctx.resolve(name)) {
        Ok(rendered) => Some(rendered),
        Err(e) => {
            errors.push(Error::unpositioned(
                Phase::Generation,
                format!("in {}: {}", location, e),
            ));
            None
        }
    }
}

/// Render rule parameters in canonical key order.
#[allow(clippy::too_many_arguments)]
fn render_rule_params(
    params: &RuleParams,
    arg_names: &[String],
    locals: Option<&IndexMap<String, String>>,
    pkg: Option<(&str, &HashSet<String>)>,
    pool_names: &HashSet<String>,
    live: &RefCell<LiveSet>,
    location: &str,
    errors: &mut Vec<Error>,
) -> Vec<(String, String)> {
    let rctx = ResolveCtx {
        args: Some(arg_names),
        locals,
        pkg,
        live,
    };
    let mut vars: Vec<(String, String)> = Vec::new();
    let mut push =
        |key: &str, raw: &str, errors: &mut Vec<Error>, vars: &mut Vec<(String, String)>| {
            if let Some(rendered) = render(raw, EscapeContext::Value, &rctx, location, errors) {
                vars.push((key.to_string(), rendered));
            }
        };
    if params.command.is_empty() {
        errors.push(Error::unpositioned(
            Phase::Generation,
            format!("in {}: rule has no command", location),
        ));
    } else {
        push("command", &params.command, errors, &mut vars);
    }
    if let Some(depfile) = &params.depfile {
        push("depfile", depfile, errors, &mut vars);
    }
    if let Some(deps) = params.deps {
        vars.push((
            "deps".to_string(),
            match deps {
                Deps::Gcc => "gcc".to_string(),
                Deps::Msvc => "msvc".to_string(),
            },
        ));
    }
    if let Some(description) = &params.description {
        push("description", description, errors, &mut vars);
    }
    if params.generator {
        vars.push(("generator".to_string(), "1".to_string()));
    }
    if let Some(pool) = &params.pool {
        let mangled = pool.mangled();
        if !pool_names.contains(&mangled) {
            errors.push(Error::unpositioned(
                Phase::Generation,
                format!("in {}: references undefined pool \"{}\"", location, mangled),
            ));
        } else {
            live.borrow_mut().pools.insert(mangled.clone());
            vars.push(("pool".to_string(), mangled));
        }
    }
    if params.restat {
        vars.push(("restat".to_string(), "1".to_string()));
    }
    if let Some(rspfile) = &params.rspfile {
        push("rspfile", rspfile, errors, &mut vars);
    }
    if let Some(content) = &params.rspfile_content {
        push("rspfile_content", content, errors, &mut vars);
    }
    vars
}

pub(crate) fn assemble(ctx: &Context, config: ConfigRef<'_>, errors: &mut Vec<Error>) -> Assembled {
    // ------------------------------------------------------------------
    // Package snapshot: declaration names, rules, and pools. Values are
    // not evaluated yet; that waits for liveness.
    // ------------------------------------------------------------------
    let mut pkg_names: Vec<String> = ctx.packages().keys().cloned().collect();
    pkg_names.sort_unstable();

    let mut snaps: HashMap<String, PkgSnap> = HashMap::new();
    let mut pkg_var_sets: HashMap<String, HashSet<String>> = HashMap::new();
    let mut pool_names: HashSet<String> = HashSet::new();
    pool_names.insert("console".to_string());
    let mut rule_infos: HashMap<String, RuleInfo> = HashMap::new();

    for pkg_name in &pkg_names {
        let pctx = &ctx.packages()[pkg_name.as_str()];
        let inner = pctx
            .inner
            .lock()
            .expect("BUG: package context mutex poisoned");
        let snap = PkgSnap {
            var_names: inner.variables.keys().cloned().collect(),
            rules: inner
                .rules
                .iter()
                .map(|(name, rule)| (name.clone(), (rule.params.clone(), rule.arg_names.clone())))
                .collect(),
            pools: inner.pools.clone(),
        };
        for pool_name in snap.pools.keys() {
            pool_names.insert(format!("g.{}.{}", pkg_name, pool_name));
        }
        for (rule_name, (_, arg_names)) in &snap.rules {
            rule_infos.insert(
                format!("g.{}.{}", pkg_name, rule_name),
                RuleInfo {
                    arg_names: arg_names.clone(),
                    pctx: pkg_name.clone(),
                },
            );
        }
        pkg_var_sets.insert(pkg_name.clone(), snap.var_names.clone());
        snaps.insert(pkg_name.clone(), snap);
    }

    // ------------------------------------------------------------------
    // Module and singleton sections, in visit order.
    // ------------------------------------------------------------------
    let live = RefCell::new(LiveSet::default());
    let mut sections: Vec<Section> = Vec::new();
    let mut outputs_seen: IndexMap<String, String> = IndexMap::new();
    let mut required_version: (u32, u32, u32) = (1, 7, 0);
    let mut build_dir: Option<(String, String)> = None;
    let mut defaults: Vec<String> = Vec::new();
    let mut subninjas: Vec<String> = Vec::new();

    let mut blocks: Vec<(String, &crate::actions::LocalActions)> = Vec::new();
    for &id in &ctx.visit_order {
        let info = &ctx.modules[id];
        // A module that reported errors contributes nothing; its errors
        // already block emission.
        if info.errored {
            continue;
        }
        blocks.push((format!("Module: {}", info.name()), &info.actions));
    }
    for (name, actions) in &ctx.singleton_actions {
        blocks.push((format!("Singleton: {}", name), actions));
    }

    for (title, actions) in blocks {
        if let Some(v) = actions.required_version {
            required_version = required_version.max(v);
        }
        if let Some(request) = &actions.build_dir {
            if build_dir.is_some() {
                errors.push(Error::unpositioned(
                    Phase::Generation,
                    "builddir set more than once",
                ));
            } else {
                build_dir = Some(request.clone());
            }
        }
        defaults.extend(actions.defaults.iter().cloned());
        subninjas.extend(actions.subninjas.iter().cloned());

        let mut section = Section {
            title,
            variables: Vec::new(),
            rules: Vec::new(),
            edges: Vec::new(),
        };
        // Local variables: earlier declarations are visible to later
        // ones and to every edge in this block.
        let mut locals: IndexMap<String, String> = IndexMap::new();
        for var in &actions.variables {
            let mangled = var.owner.mangle(&var.name);
            let rctx = ResolveCtx {
                args: None,
                locals: Some(&locals),
                pkg: pkg_set(&pkg_var_sets, &var.pctx),
                live: &live,
            };
            if let Some(rendered) = render(
                &var.value,
                EscapeContext::Value,
                &rctx,
                &format!("variable \"{}\"", mangled),
                errors,
            ) {
                section.variables.push((mangled.clone(), rendered));
            }
            locals.insert(var.name.clone(), mangled);
        }
        for rule in &actions.rules {
            let mangled = rule.owner.mangle(&rule.name);
            let vars = render_rule_params(
                &rule.params,
                &rule.arg_names,
                Some(&locals),
                pkg_set(&pkg_var_sets, &rule.pctx),
                &pool_names,
                &live,
                &format!("rule \"{}\"", mangled),
                errors,
            );
            rule_infos.insert(
                mangled.clone(),
                RuleInfo {
                    arg_names: rule.arg_names.clone(),
                    pctx: rule.pctx.clone(),
                },
            );
            section.rules.push((mangled, vars));
        }
        for edge in &actions.edges {
            if let Some(rendered) = render_edge(
                edge,
                &locals,
                &rule_infos,
                &pkg_var_sets,
                &live,
                &mut outputs_seen,
                errors,
            ) {
                section.edges.push(rendered);
            }
        }
        if !section.is_empty() {
            sections.push(section);
        }
    }

    // Defaults and subninja paths render with no scope beyond builtins;
    // builddir resolves against the package it was declared through.
    let empty = ResolveCtx {
        args: None,
        locals: None,
        pkg: None,
        live: &live,
    };
    let defaults = defaults
        .iter()
        .filter_map(|d| render(d, EscapeContext::Path, &empty, "default", errors))
        .collect();
    let subninjas = subninjas
        .iter()
        .filter_map(|s| render(s, EscapeContext::Path, &empty, "subninja", errors))
        .collect();
    let build_dir = build_dir.and_then(|(pctx, value)| {
        let rctx = ResolveCtx {
            args: None,
            locals: None,
            pkg: pkg_set(&pkg_var_sets, &pctx),
            live: &live,
        };
        render(&value, EscapeContext::Path, &rctx, "builddir", errors)
    });

    // ------------------------------------------------------------------
    // Live package rules. Rendering may mark further variables live.
    // ------------------------------------------------------------------
    let mut pkg_rules: Vec<(String, Vec<(String, String)>)> = Vec::new();
    for pkg_name in &pkg_names {
        let snap = &snaps[pkg_name];
        let mut rule_names: Vec<&String> = snap.rules.keys().collect();
        rule_names.sort_unstable();
        for rule_name in rule_names {
            if !live
                .borrow()
                .rules
                .contains(&(pkg_name.clone(), rule_name.clone()))
            {
                continue;
            }
            let (params, arg_names) = &snap.rules[rule_name];
            let mangled = format!("g.{}.{}", pkg_name, rule_name);
            let vars = render_rule_params(
                params,
                arg_names,
                None,
                pkg_set(&pkg_var_sets, pkg_name),
                &pool_names,
                &live,
                &format!("rule \"{}\"", mangled),
                errors,
            );
            pkg_rules.push((mangled, vars));
        }
    }

    // ------------------------------------------------------------------
    // Live package variables: evaluated now, lazily and exactly once.
    // A value may reference other variables of its own package
    // (`$go_tool_dir/compile` style chaining), which marks those live in
    // turn, so rendering iterates to a fixpoint. `None` records a value
    // that failed to evaluate or render; it stays out of the manifest.
    // ------------------------------------------------------------------
    let mut rendered_vars: BTreeMap<(String, String), Option<String>> = BTreeMap::new();
    loop {
        let mut pending: Vec<(String, String)> = live
            .borrow()
            .vars
            .iter()
            .filter(|key| !rendered_vars.contains_key(*key))
            .cloned()
            .collect();
        if pending.is_empty() {
            break;
        }
        pending.sort_unstable();
        for (pkg_name, var_name) in pending {
            let mangled = format!("g.{}.{}", pkg_name, var_name);
            let value = {
                let pctx = &ctx.packages()[pkg_name.as_str()];
                let inner = pctx
                    .inner
                    .lock()
                    .expect("BUG: package context mutex poisoned");
                match &inner.variables[&var_name] {
                    PackageVar::Static(value) => Some(value.clone()),
                    PackageVar::Func(f) => match f(config) {
                        Ok(value) => Some(value),
                        Err(message) => {
                            errors.push(Error::unpositioned(
                                Phase::Generation,
                                format!(
                                    "variable function \"{}\" failed: {}",
                                    mangled, message
                                ),
                            ));
                            None
                        }
                    },
                }
            };
            let rendered = value.and_then(|value| {
                // Values resolve against the owning package's own scope,
                // the same way rule bodies do.
                let rctx = ResolveCtx {
                    args: None,
                    locals: None,
                    pkg: pkg_set(&pkg_var_sets, &pkg_name),
                    live: &live,
                };
                render(
                    &value,
                    EscapeContext::Value,
                    &rctx,
                    &format!("variable \"{}\"", mangled),
                    errors,
                )
            });
            rendered_vars.insert((pkg_name, var_name), rendered);
        }
    }
    let pkg_variables: Vec<(String, String)> = rendered_vars
        .into_iter()
        .filter_map(|((pkg_name, var_name), rendered)| {
            rendered.map(|value| (format!("g.{}.{}", pkg_name, var_name), value))
        })
        .collect();

    // Live pools, in (package, name) order.
    let mut pools: Vec<PoolDecl> = Vec::new();
    for pkg_name in &pkg_names {
        let snap = &snaps[pkg_name];
        let mut pool_decls: Vec<&String> = snap.pools.keys().collect();
        pool_decls.sort_unstable();
        for name in pool_decls {
            let mangled = format!("g.{}.{}", pkg_name, name);
            if !live.borrow().pools.contains(&mangled) {
                continue;
            }
            let params = &snap.pools[name];
            pools.push(PoolDecl {
                name: mangled,
                depth: params.depth,
                comment: params.comment.clone(),
            });
        }
    }

    Assembled {
        required_version,
        build_dir,
        pools,
        pkg_variables,
        pkg_rules,
        sections,
        defaults,
        subninjas,
    }
}

fn pkg_set<'a>(
    sets: &'a HashMap<String, HashSet<String>>,
    pkg: &'a str,
) -> Option<(&'a str, &'a HashSet<String>)> {
    sets.get(pkg).map(|vars| (pkg, vars))
}

#[allow(clippy::too_many_arguments)]
fn render_edge(
    edge: &EdgeDef,
    locals: &IndexMap<String, String>,
    rule_infos: &HashMap<String, RuleInfo>,
    pkg_var_sets: &HashMap<String, HashSet<String>>,
    live: &RefCell<LiveSet>,
    outputs_seen: &mut IndexMap<String, String>,
    errors: &mut Vec<Error>,
) -> Option<RenderedEdge> {
    let params = &edge.params;
    let rule_mangled = params.rule.mangled();

    // Outputs must be globally unique, checked on the raw strings.
    for output in params.outputs.iter().chain(&params.implicit_outputs) {
        if let Some(prev) = outputs_seen.get(output) {
            let message = format!(
                "duplicate output \"{}\" produced by \"{}\" and \"{}\"",
                output, prev, edge.by
            );
            errors.push(match &edge.pos {
                Some(pos) => Error::new(Phase::Generation, pos.clone(), message),
                None => Error::unpositioned(Phase::Generation, message),
            });
        } else {
            outputs_seen.insert(output.clone(), edge.by.clone());
        }
    }

    // Every edge references a declared rule.
    let builtin = params.rule.is_builtin();
    let rule_info = if builtin {
        None
    } else {
        match rule_infos.get(&rule_mangled) {
            Some(info) => {
                if let Owner::Package(pkg) = &params.rule.owner {
                    live.borrow_mut()
                        .rules
                        .insert((pkg.clone(), params.rule.name.clone()));
                }
                Some(info)
            }
            None => {
                errors.push(Error::unpositioned(
                    Phase::Generation,
                    format!(
                        "build edge in \"{}\" references undefined rule \"{}\"",
                        edge.by, rule_mangled
                    ),
                ));
                return None;
            }
        }
    };

    let location = format!("build edge in \"{}\"", edge.by);
    let rctx = ResolveCtx {
        args: None,
        locals: Some(locals),
        pkg: pkg_set(pkg_var_sets, &edge.pctx),
        live,
    };

    let mut vars: Vec<(String, String)> = Vec::new();
    if let Some(info) = rule_info {
        // Declared arguments: supplied on the edge, or defaulted from a
        // package variable of the rule's owning package.
        for key in params.args.keys() {
            if !info.arg_names.contains(key) {
                errors.push(Error::unpositioned(
                    Phase::Generation,
                    format!(
                        "in {}: unknown argument \"{}\" for rule \"{}\"",
                        location, key, rule_mangled
                    ),
                ));
            }
        }
        for arg in &info.arg_names {
            if params.args.contains_key(arg) {
                continue;
            }
            let covered = pkg_var_sets
                .get(&info.pctx)
                .is_some_and(|vars| vars.contains(arg));
            if covered {
                live.borrow_mut()
                    .vars
                    .insert((info.pctx.clone(), arg.clone()));
                vars.push((arg.clone(), format!("${{g.{}.{}}}", info.pctx, arg)));
            } else {
                errors.push(Error::unpositioned(
                    Phase::Generation,
                    format!(
                        "in {}: no value for argument \"{}\" of rule \"{}\"",
                        location, arg, rule_mangled
                    ),
                ));
            }
        }
    } else {
        for key in params.args.keys() {
            errors.push(Error::unpositioned(
                Phase::Generation,
                format!(
                    "in {}: unknown argument \"{}\" for rule \"{}\"",
                    location, key, rule_mangled
                ),
            ));
        }
    }

    let mut render_paths = |paths: &[String], errors: &mut Vec<Error>| -> Vec<String> {
        paths
            .iter()
            .filter_map(|p| render(p, EscapeContext::Path, &rctx, &location, errors))
            .collect()
    };
    let outputs = render_paths(&params.outputs, errors);
    let implicit_outputs = render_paths(&params.implicit_outputs, errors);
    let inputs = render_paths(&params.inputs, errors);
    let implicits = render_paths(&params.implicits, errors);
    let order_only = render_paths(&params.order_only, errors);
    let validations = render_paths(&params.validations, errors);

    for (key, value) in &params.args {
        if let Some(rendered) = render(value, EscapeContext::Value, &rctx, &location, errors) {
            vars.push((key.clone(), rendered));
        }
    }
    for (key, value) in &params.variables {
        if let Some(rendered) = render(value, EscapeContext::Value, &rctx, &location, errors) {
            vars.push((key.clone(), rendered));
        }
    }

    Some(RenderedEdge {
        outputs,
        implicit_outputs,
        rule: rule_mangled,
        inputs,
        implicits,
        order_only,
        validations,
        vars,
    })
}
