//! The orchestrator: registry, parsing closure, dependency graph, and the
//! two-phase generation pass.

use crate::actions::LocalActions;
use crate::assemble::{self, Assembled};
use crate::config::ConfigRef;
use crate::error::{Error, FileDeps, Phase};
use crate::module::{BaseProperties, Module, ModuleFactory, ModuleInfo};
use crate::module_ctx::{GenShared, ModuleContext};
use crate::package::PackageContext;
use crate::singleton_ctx::{Singleton, SingletonContext, SingletonFactory};
use gantry_parser::{parse_and_eval, ModuleDef, ParseOptions, Pos, Scope, Value, ValueKind};
use gantry_props::{unpack_properties, PropertyStruct};
use indexmap::IndexMap;
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// A host-registered graph rewrite pass.
type MutatorFn = Arc<dyn Fn(&mut MutatorContext<'_>) + Send + Sync>;

struct MutatorDef {
    name: String,
    top_down: bool,
    f: MutatorFn,
}

/// The build-graph orchestrator.
///
/// The generation pass is a state machine: parse the build-file closure,
/// register modules, resolve dependencies, check for cycles, run
/// mutators, generate module actions in dependency order, run singletons,
/// assemble, and emit. Each phase accumulates errors and the pass halts
/// between phases when any were recorded; no partial manifest is ever
/// written.
pub struct Context {
    factories: IndexMap<String, ModuleFactory>,
    singletons: Vec<(String, Box<dyn Singleton>)>,
    mutators: Vec<MutatorDef>,
    packages: IndexMap<String, Arc<PackageContext>>,
    pub(crate) modules: Vec<ModuleInfo>,
    pub(crate) names: IndexMap<String, usize>,
    build_file_name: String,
    parse_options: ParseOptions,
    pool: Option<rayon::ThreadPool>,
    cancelled: Arc<AtomicBool>,
    /// Every build file read during the parse closure.
    build_files_read: Vec<PathBuf>,
    pub(crate) singleton_actions: Vec<(String, LocalActions)>,
    /// Topological module emit order, fixed after generation.
    pub(crate) visit_order: Vec<usize>,
    pub(crate) assembled: Option<Assembled>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Self {
            factories: IndexMap::new(),
            singletons: Vec::new(),
            mutators: Vec::new(),
            packages: IndexMap::new(),
            modules: Vec::new(),
            names: IndexMap::new(),
            build_file_name: "Gantryfile".to_string(),
            parse_options: ParseOptions::default(),
            pool: None,
            cancelled: Arc::new(AtomicBool::new(false)),
            build_files_read: Vec::new(),
            singleton_actions: Vec::new(),
            visit_order: Vec::new(),
            assembled: None,
        }
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Register a module type by name.
    pub fn register_module_type(&mut self, name: impl Into<String>, factory: ModuleFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Register a singleton; singletons generate in registration order.
    pub fn register_singleton_type(&mut self, name: impl Into<String>, factory: SingletonFactory) {
        self.singletons.push((name.into(), factory()));
    }

    /// Register a bottom-up mutator (runs over modules in dependency
    /// order, dependencies first).
    pub fn register_bottom_up_mutator(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&mut MutatorContext<'_>) + Send + Sync + 'static,
    ) {
        self.mutators.push(MutatorDef {
            name: name.into(),
            top_down: false,
            f: Arc::new(f),
        });
    }

    /// Register a top-down mutator (dependents first).
    pub fn register_top_down_mutator(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&mut MutatorContext<'_>) + Send + Sync + 'static,
    ) {
        self.mutators.push(MutatorDef {
            name: name.into(),
            top_down: true,
            f: Arc::new(f),
        });
    }

    /// Register a package context so its declarations reach the manifest.
    pub fn register_package_context(&mut self, pctx: Arc<PackageContext>) {
        self.packages.insert(pctx.name().to_string(), pctx);
    }

    pub(crate) fn packages(&self) -> &IndexMap<String, Arc<PackageContext>> {
        &self.packages
    }

    pub(crate) fn factory_names(&self) -> impl Iterator<Item = &String> {
        self.factories.keys()
    }

    /// Look up a registered module by its declared name.
    pub fn module_by_name(&self, name: &str) -> Option<crate::module::ModuleHandle<'_>> {
        self.names.get(name).map(|&id| self.handle(id))
    }

    /// Number of registered modules.
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub(crate) fn instantiate(&self, type_name: &str) -> Box<dyn Module> {
        (self.factories[type_name])()
    }

    /// The file name looked up inside each `subdirs` entry.
    pub fn set_build_file_name(&mut self, name: impl Into<String>) {
        self.build_file_name = name.into();
    }

    pub fn set_parse_options(&mut self, options: ParseOptions) {
        self.parse_options = options;
    }

    /// Bound the worker pool used for parsing and generation. Manifest
    /// bytes do not depend on this.
    pub fn set_parallelism(&mut self, threads: usize) {
        self.pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .ok();
    }

    /// A handle that aborts scheduling of further parse batches and
    /// generation waves. In-flight work finishes; no manifest is emitted.
    pub fn cancellation_handle(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    fn run_pooled<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(f),
            None => f(),
        }
    }

    // ------------------------------------------------------------------
    // Phase 1-4: parse, register, resolve, cycle-check
    // ------------------------------------------------------------------

    /// Parse the build-file closure rooted at `root_file` and register
    /// every module found.
    ///
    /// Files are discovered iteratively through `subdirs` and `build`
    /// assignments, parsed concurrently, and the resulting module list is
    /// sorted by (file, position) so registration is deterministic.
    /// Returns the files read (for depfile emission) and all errors.
    pub fn parse_build_files(&mut self, root_file: &Path) -> (FileDeps, Vec<Error>) {
        let mut errors = Vec::new();
        let mut visited: IndexMap<PathBuf, ()> = IndexMap::new();
        let mut pending = vec![root_file.to_path_buf()];
        let mut parsed: Vec<(gantry_parser::BuildFile, PathBuf)> = Vec::new();

        while !pending.is_empty() {
            if self.cancelled.load(Ordering::Relaxed) {
                break;
            }
            let batch: Vec<PathBuf> = pending
                .drain(..)
                .filter(|p| visited.insert(p.clone(), ()).is_none())
                .collect();
            let opts = self.parse_options.clone();
            let build_file_name = self.build_file_name.clone();
            let results: Vec<_> = self.run_pooled(|| {
                batch
                    .par_iter()
                    .map(|path| parse_one_file(path, &opts, &build_file_name))
                    .collect()
            });
            for result in results {
                match result {
                    Ok((file, dir, file_errors, discovered)) => {
                        errors.extend(file_errors);
                        pending.extend(discovered);
                        parsed.push((file, dir));
                    }
                    Err(e) => errors.push(e),
                }
            }
        }
        self.build_files_read = visited.keys().cloned().collect();
        info!(files = self.build_files_read.len(), "parsed build files");

        // Phase 2: register, deterministically.
        let mut defs: Vec<(ModuleDef, Arc<str>, PathBuf)> = Vec::new();
        for (file, dir) in &parsed {
            for module in file.modules() {
                defs.push((module.clone(), file.path.clone(), dir.clone()));
            }
        }
        defs.sort_by(|a, b| a.0.pos.cmp(&b.0.pos));
        self.register_modules(defs, &mut errors);

        // Phases 3 and 4.
        self.resolve_dependencies(&mut errors);
        self.rebuild_rdeps();
        self.check_cycles(&mut errors);

        (self.build_files_read.clone(), errors)
    }

    fn register_modules(
        &mut self,
        defs: Vec<(ModuleDef, Arc<str>, PathBuf)>,
        errors: &mut Vec<Error>,
    ) {
        // Instantiate and unpack concurrently; each module touches only
        // its own containers.
        struct Candidate {
            logic: Box<dyn Module>,
            base: BaseProperties,
            def: ModuleDef,
            file: Arc<str>,
            dir: PathBuf,
            errs: Vec<Error>,
        }
        let factories = &self.factories;
        let candidates: Vec<Result<Candidate, Error>> = self.run_pooled(|| {
            defs.into_par_iter()
                .map(|(def, file, dir)| {
                    let Some(factory) = factories.get(&def.type_name) else {
                        return Err(Error::new(
                            Phase::Registration,
                            def.pos.clone(),
                            format!("unrecognized module type \"{}\"", def.type_name),
                        ));
                    };
                    let mut logic = factory();
                    let mut base = BaseProperties::default();
                    let mut containers: Vec<&mut dyn PropertyStruct> = vec![&mut base];
                    containers.extend(logic.props());
                    let unpack_errs = unpack_properties(&def.properties, &mut containers);
                    let mut errs: Vec<Error> = unpack_errs
                        .into_iter()
                        .map(|e| Error::new(Phase::Property, e.pos, e.message))
                        .collect();
                    if base.name.is_empty() {
                        errs.push(Error::new(
                            Phase::Registration,
                            def.pos.clone(),
                            "module is missing a \"name\" property",
                        ));
                    }
                    Ok(Candidate {
                        logic,
                        base,
                        def,
                        file,
                        dir,
                        errs,
                    })
                })
                .collect()
        });
        for candidate in candidates {
            let c = match candidate {
                Ok(c) => c,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };
            errors.extend(c.errs);
            let name = c.base.name.clone();
            if name.is_empty() {
                continue;
            }
            if let Some(&prev) = self.names.get(&name) {
                errors.push(Error::new(
                    Phase::Registration,
                    c.def.pos.clone(),
                    format!("module \"{}\" already defined", name),
                ));
                errors.push(Error::new(
                    Phase::Registration,
                    self.modules[prev].pos.clone(),
                    "<-- previous definition here",
                ));
                continue;
            }
            let id = self.modules.len();
            self.names.insert(name, id);
            self.modules.push(ModuleInfo {
                id,
                logic: c.logic,
                base: c.base,
                type_name: c.def.type_name.clone(),
                pos: c.def.pos.clone(),
                def: c.def,
                dir: c.dir,
                file: c.file,
                deps: Vec::new(),
                rdeps: Vec::new(),
                skipped: false,
                errored: false,
                actions: LocalActions::default(),
            });
        }
    }

    fn resolve_dependencies(&mut self, errors: &mut Vec<Error>) {
        for id in 0..self.modules.len() {
            let mut deps: Vec<usize> = Vec::new();
            let dep_names = self.modules[id].base.deps.clone();
            for dep_name in dep_names {
                match self.names.get(&dep_name) {
                    Some(&dep) => {
                        if !deps.contains(&dep) {
                            deps.push(dep);
                        }
                    }
                    None => errors.push(Error::new(
                        Phase::Dependency,
                        self.modules[id].pos.clone(),
                        format!(
                            "\"{}\" depends on undefined module \"{}\"",
                            self.modules[id].name(),
                            dep_name
                        ),
                    )),
                }
            }
            self.modules[id].deps = deps;
        }
    }

    /// Reverse edges are an index rebuilt from the forward edges.
    pub(crate) fn rebuild_rdeps(&mut self) {
        for m in &mut self.modules {
            m.rdeps.clear();
        }
        for id in 0..self.modules.len() {
            for dep in self.modules[id].deps.clone() {
                self.modules[dep].rdeps.push(id);
            }
        }
    }

    /// Tarjan SCC over the module graph; any component of size > 1, or a
    /// self-loop, is fatal.
    fn check_cycles(&self, errors: &mut Vec<Error>) {
        let mut graph = DiGraph::<usize, ()>::new();
        let nodes: Vec<_> = (0..self.modules.len()).map(|i| graph.add_node(i)).collect();
        for (id, m) in self.modules.iter().enumerate() {
            for &dep in &m.deps {
                graph.add_edge(nodes[dep], nodes[id], ());
            }
        }
        for scc in tarjan_scc(&graph) {
            let mut ids: Vec<usize> = scc.iter().map(|n| graph[*n]).collect();
            let cyclic = ids.len() > 1 || ids.iter().any(|&id| self.modules[id].deps.contains(&id));
            if !cyclic {
                continue;
            }
            // Name the participants in source order.
            ids.sort_by(|&a, &b| self.modules[a].pos.cmp(&self.modules[b].pos));
            let mut message = String::from("dependency cycle found:");
            for &id in &ids {
                let m = &self.modules[id];
                let dep_in_cycle = m
                    .deps
                    .iter()
                    .find(|d| ids.contains(d))
                    .map(|&d| self.modules[d].name().to_string())
                    .unwrap_or_default();
                message.push_str(&format!(
                    "\n    \"{}\" depends on \"{}\"",
                    m.name(),
                    dep_in_cycle
                ));
            }
            errors.push(Error::new(
                Phase::Dependency,
                self.modules[ids[0]].pos.clone(),
                message,
            ));
        }
    }

    // ------------------------------------------------------------------
    // Phase 5-8: mutators, generation, singletons, assembly
    // ------------------------------------------------------------------

    /// Run mutators and the two-phase generation pass, then assemble and
    /// verify the action set. Returns every path that should trigger
    /// manifest regeneration, plus all errors.
    pub fn prepare_build_actions(&mut self, config: ConfigRef<'_>) -> (FileDeps, Vec<Error>) {
        let mut errors = Vec::new();

        // Phase 5: mutators, re-checking graph invariants after each.
        for i in 0..self.mutators.len() {
            let (name, top_down, f) = {
                let m = &self.mutators[i];
                (m.name.clone(), m.top_down, m.f.clone())
            };
            debug!(mutator = %name, "running mutator");
            let mut order = match self.topo_order() {
                Some(order) => order,
                None => break, // cycle introduced; reported below
            };
            if top_down {
                order.reverse();
            }
            for id in order {
                let mut mctx = MutatorContext {
                    module: &mut self.modules[id],
                    config,
                    new_deps: Vec::new(),
                    skip: None,
                    errs: Vec::new(),
                };
                f(&mut mctx);
                let MutatorContext {
                    new_deps,
                    skip,
                    errs,
                    ..
                } = mctx;
                errors.extend(errs);
                if let Some(skip) = skip {
                    self.modules[id].skipped = skip;
                }
                for dep_name in new_deps {
                    match self.names.get(&dep_name) {
                        Some(&dep) => {
                            if !self.modules[id].deps.contains(&dep) {
                                self.modules[id].deps.push(dep);
                            }
                        }
                        None => errors.push(Error::new(
                            Phase::Dependency,
                            self.modules[id].pos.clone(),
                            format!(
                                "\"{}\" depends on undefined module \"{}\"",
                                self.modules[id].name(),
                                dep_name
                            ),
                        )),
                    }
                }
            }
            self.rebuild_rdeps();
            self.check_cycles(&mut errors);
            if !errors.is_empty() {
                return (self.ninja_file_deps(), errors);
            }
        }

        // Dependency-ordered ready waves; within a wave modules are
        // independent and run concurrently.
        let Some(waves) = self.ready_waves() else {
            self.check_cycles(&mut errors);
            return (self.ninja_file_deps(), errors);
        };
        self.visit_order = waves.iter().flatten().copied().collect();

        // Phase 6: module actions.
        let mut results: Vec<(usize, LocalActions, Vec<Error>)> = Vec::new();
        let mut singleton_results: Vec<(String, LocalActions)> = Vec::new();
        {
            let shared = GenShared {
                modules: &self.modules,
                packages: &self.packages,
                config,
            };
            for wave in &waves {
                if self.cancelled.load(Ordering::Relaxed) {
                    errors.push(Error::unpositioned(
                        Phase::Generation,
                        "generation cancelled",
                    ));
                    break;
                }
                let shared_ref = &shared;
                let wave_results: Vec<(usize, LocalActions, Vec<Error>)> =
                    self.run_pooled(|| {
                        wave.par_iter()
                            .map(|&id| {
                                let info = &shared_ref.modules[id];
                                let mut mctx = ModuleContext::new(shared_ref, info);
                                info.logic.generate_build_actions(&mut mctx);
                                (id, mctx.actions, mctx.errs)
                            })
                            .collect()
                    });
                results.extend(wave_results);
            }

            // Phase 7: singletons, strictly sequential in registration
            // order.
            if !self.cancelled.load(Ordering::Relaxed) {
                for (name, singleton) in &self.singletons {
                    let mut sctx = SingletonContext::new(&shared, name);
                    singleton.generate_build_actions(&mut sctx);
                    errors.extend(sctx.errs);
                    singleton_results.push((name.clone(), sctx.actions));
                }
            }
        }
        for (id, actions, errs) in results {
            self.modules[id].errored = !errs.is_empty();
            errors.extend(errs);
            self.modules[id].actions = actions;
        }
        self.singleton_actions = singleton_results;

        // Phase 8: assemble and verify. Errors recorded so far still
        // allow assembly checks to run, so the user sees everything, but
        // nothing is emitted.
        let assembled = assemble::assemble(self, config, &mut errors);
        if errors.is_empty() {
            self.assembled = Some(assembled);
        }

        (self.ninja_file_deps(), errors)
    }

    /// Every build file read plus every path added through
    /// `add_ninja_file_deps`.
    pub fn ninja_file_deps(&self) -> FileDeps {
        let mut deps = self.build_files_read.clone();
        for m in &self.modules {
            deps.extend(m.actions.ninja_file_deps.iter().cloned());
        }
        for (_, actions) in &self.singleton_actions {
            deps.extend(actions.ninja_file_deps.iter().cloned());
        }
        deps
    }

    /// Topological order over live modules, dependencies first. `None`
    /// if the graph has a cycle.
    fn topo_order(&self) -> Option<Vec<usize>> {
        self.ready_waves()
            .map(|waves| waves.into_iter().flatten().collect())
    }

    /// Kahn-style levels: each wave's modules depend only on earlier
    /// waves. Wave membership is sorted by id, which follows source
    /// order, so the flattened order is deterministic.
    fn ready_waves(&self) -> Option<Vec<Vec<usize>>> {
        let live: Vec<usize> = (0..self.modules.len())
            .filter(|&id| !self.modules[id].skipped)
            .collect();
        let mut outstanding: IndexMap<usize, usize> = live
            .iter()
            .map(|&id| {
                let count = self.modules[id]
                    .deps
                    .iter()
                    .filter(|&&d| !self.modules[d].skipped)
                    .count();
                (id, count)
            })
            .collect();
        let mut waves = Vec::new();
        let mut remaining = live.len();
        while remaining > 0 {
            let mut wave: Vec<usize> = outstanding
                .iter()
                .filter(|(_, &count)| count == 0)
                .map(|(&id, _)| id)
                .collect();
            if wave.is_empty() {
                return None;
            }
            wave.sort_unstable();
            for &id in &wave {
                outstanding.swap_remove(&id);
                for &rdep in &self.modules[id].rdeps {
                    if let Some(count) = outstanding.get_mut(&rdep) {
                        *count = count.saturating_sub(1);
                    }
                }
            }
            remaining -= wave.len();
            waves.push(wave);
        }
        Some(waves)
    }
}

/// Parse one build file and extract the paths it pulls in via `subdirs`
/// and `build`.
#[allow(clippy::type_complexity)]
fn parse_one_file(
    path: &Path,
    opts: &ParseOptions,
    build_file_name: &str,
) -> Result<(gantry_parser::BuildFile, PathBuf, Vec<Error>, Vec<PathBuf>), Error> {
    let source = std::fs::read_to_string(path).map_err(|e| Error::io(path, &e))?;
    let dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
    let mut scope = Scope::new();
    let (file, parse_errors) = parse_and_eval(
        &path.to_string_lossy(),
        &source,
        &mut scope,
        opts,
    );
    let errors: Vec<Error> = parse_errors
        .into_iter()
        .map(|e| {
            let phase = match e.kind {
                gantry_parser::ParseErrorKind::Evaluation => Phase::Evaluation,
                _ => Phase::Syntax,
            };
            Error::new(phase, e.pos, e.message)
        })
        .collect();

    let mut discovered = Vec::new();
    for subdir in assignment_strings(&scope, "subdirs") {
        let candidate = dir.join(subdir).join(build_file_name);
        if candidate.is_file() {
            discovered.push(candidate);
        }
    }
    for build in assignment_strings(&scope, "build") {
        discovered.push(dir.join(build));
    }
    Ok((file, dir, errors, discovered))
}

/// Read a `subdirs`/`build`-style assignment as a list of strings.
fn assignment_strings(scope: &Scope, name: &str) -> Vec<String> {
    let Some(assignment) = scope.get(name) else {
        return Vec::new();
    };
    match &assignment.value.kind {
        ValueKind::String(s) => vec![s.clone()],
        ValueKind::List(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// The API a mutator sees for one module.
///
/// Mutators run between registration and generation; they may add
/// dependencies, mutate host module state, or mark modules skipped.
/// Graph invariants are re-checked after each mutator pass.
pub struct MutatorContext<'a> {
    pub(crate) module: &'a mut ModuleInfo,
    pub(crate) config: ConfigRef<'a>,
    pub(crate) new_deps: Vec<String>,
    pub(crate) skip: Option<bool>,
    pub(crate) errs: Vec<Error>,
}

impl MutatorContext<'_> {
    pub fn module_name(&self) -> &str {
        self.module.name()
    }

    pub fn module_type(&self) -> &str {
        &self.module.type_name
    }

    pub fn config(&self) -> ConfigRef<'_> {
        self.config
    }

    /// The host module, for downcasting.
    pub fn module(&self) -> &dyn Module {
        self.module.logic.as_ref()
    }

    /// Mutable host module, typically to set `mutated`-tagged fields.
    pub fn module_mut(&mut self) -> &mut dyn Module {
        self.module.logic.as_mut()
    }

    /// The declared dependency names of this module.
    pub fn dep_names(&self) -> impl Iterator<Item = &str> {
        self.module.base.deps.iter().map(String::as_str)
    }

    /// Add a dependency by module name; resolved when the mutator pass
    /// finishes, with unknown names reported as dependency errors.
    pub fn add_dependency(&mut self, name: impl Into<String>) {
        self.new_deps.push(name.into());
    }

    /// Exclude (or re-include) this module from generation and emission.
    pub fn set_skipped(&mut self, skipped: bool) {
        self.skip = Some(skipped);
    }

    /// Report an error against this module.
    pub fn errorf(&mut self, message: impl Into<String>) {
        self.errs.push(Error::new(
            Phase::Generation,
            self.module.pos.clone(),
            format!("module \"{}\": {}", self.module.name(), message.into()),
        ));
    }
}

/// A stable, host-visible position for synthesized modules (tests and
/// hosts that build definitions programmatically).
pub fn synthetic_pos(label: &str) -> Pos {
    Pos::new(Arc::from(label), 0, 0)
}
