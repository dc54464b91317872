//! gantry - generates a ninja manifest from declarative build files.
//!
//! The reference driver: registers the built-in `phony` module type (and,
//! when the executor supports multi-pass regeneration, the regeneration
//! singleton), runs the generation pass, and writes the manifest, the
//! optional depfile, and the optional check-file.

mod phony;
mod regen;

use clap::Parser;
use gantry_core::{
    render_errors, write_file_checked, Context, Error, Module, PackageContext, Singleton,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "gantry")]
#[command(about = "Generate a ninja manifest from declarative build files")]
struct Args {
    /// Path to the top-level build file
    build_file: PathBuf,

    /// Output manifest path
    #[arg(short = 'o', default_value = "build.ninja")]
    output: PathBuf,

    /// Manifest template; the literal token @@GANTRY_RULES@@ in it is
    /// replaced with the generated manifest
    #[arg(short = 'm')]
    template: Option<PathBuf>,

    /// Write a depfile listing every build file read
    #[arg(short = 'd')]
    depfile: Option<PathBuf>,

    /// Include test rules
    #[arg(short = 't')]
    include_tests: bool,

    /// Primary-builder mode
    #[arg(short = 'p')]
    primary_builder: bool,

    /// Also write the manifest to PATH in check mode: when the content is
    /// unchanged the existing file keeps its mtime
    #[arg(short = 'c')]
    check_file: Option<PathBuf>,

    /// Emit module type documentation instead of a manifest
    #[arg(long = "docs")]
    docs: Option<PathBuf>,
}

/// The driver's config, reachable from module and singleton callbacks.
#[derive(Debug)]
pub struct DriverConfig {
    pub include_tests: bool,
    pub primary_builder: bool,
}

/// The driver's package context. Identity is the short name, so a fresh
/// handle is equivalent to the registered one.
pub(crate) fn driver_pctx() -> Arc<PackageContext> {
    Arc::new(PackageContext::new("gantry"))
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gantry=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // clap exits with status 2 on usage errors.
    let args = Args::parse();
    std::process::exit(run(&args));
}

fn run(args: &Args) -> i32 {
    let mut ctx = Context::new();
    ctx.register_package_context(driver_pctx());
    ctx.register_module_type(
        "phony",
        Box::new(|| Box::new(phony::PhonyModule) as Box<dyn Module>),
    );
    if regen::ninja_has_multipass() {
        let singleton = regen::RegenSingleton {
            output: args.output.clone(),
            root_file: args.build_file.clone(),
            depfile: args.depfile.clone(),
        };
        ctx.register_singleton_type(
            "regenerate",
            Box::new(move || Box::new(singleton) as Box<dyn Singleton>),
        );
    }

    let (_, errs) = ctx.parse_build_files(&args.build_file);
    if !errs.is_empty() {
        return report(&errs);
    }

    if let Some(docs_path) = &args.docs {
        info!(path = %docs_path.display(), "writing module documentation");
        let mut buf = Vec::new();
        if let Err(e) = ctx.write_docs(&mut buf) {
            return report(&[Error::internal(format!("docs write failed: {}", e))]);
        }
        if let Err(e) = write_file_checked(docs_path, &buf, false) {
            return report(&[e]);
        }
        return 0;
    }

    let config = DriverConfig {
        include_tests: args.include_tests,
        primary_builder: args.primary_builder,
    };
    debug!(?config, "preparing build actions");
    let (deps, errs) = ctx.prepare_build_actions(&config);
    if !errs.is_empty() {
        return report(&errs);
    }

    let mut bytes = Vec::new();
    if let Err(errs) = ctx.write_build_file(&mut bytes) {
        return report(&errs);
    }
    if let Some(template_path) = &args.template {
        let template = match std::fs::read_to_string(template_path) {
            Ok(t) => t,
            Err(e) => return report(&[Error::io(template_path, &e)]),
        };
        let manifest = String::from_utf8_lossy(&bytes).into_owned();
        bytes = template.replace("@@GANTRY_RULES@@", &manifest).into_bytes();
    }

    if let Err(e) = write_file_checked(&args.output, &bytes, false) {
        return report(&[e]);
    }
    if let Some(check_path) = &args.check_file {
        match write_file_checked(check_path, &bytes, true) {
            Ok(updated) => debug!(path = %check_path.display(), updated, "check file"),
            Err(e) => return report(&[e]),
        }
    }

    if let Some(depfile_path) = &args.depfile {
        if let Err(e) = write_depfile(depfile_path, &args.output, &deps) {
            return report(&[e]);
        }
    }

    info!(output = %args.output.display(), "manifest written");
    0
}

fn report(errs: &[Error]) -> i32 {
    eprint!("{}", render_errors(errs));
    1
}

/// Write a gcc-style depfile: `output: dep...`, one line.
fn write_depfile(path: &Path, target: &Path, deps: &[PathBuf]) -> Result<(), Error> {
    let mut line = format!("{}:", escape_depfile_path(&target.to_string_lossy()));
    for dep in deps {
        line.push(' ');
        line.push_str(&escape_depfile_path(&dep.to_string_lossy()));
    }
    line.push('\n');
    write_file_checked(path, line.as_bytes(), false).map(|_| ())
}

fn escape_depfile_path(path: &str) -> String {
    path.replace(' ', "\\ ")
}
