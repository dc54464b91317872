//! The manifest regeneration singleton.
//!
//! When the downstream executor supports multi-pass manifest
//! regeneration (signalled by `GANTRY_NINJA_HAS_MULTIPASS`), the driver
//! registers this singleton. It emits a generator rule that re-invokes
//! gantry with the original arguments whenever any build file (or any
//! path added through `add_ninja_file_deps`) changes.

use gantry_core::{BuildParams, RuleParams, Singleton, SingletonContext};
use std::path::PathBuf;

/// Whether the executor supports multi-pass regeneration.
pub fn ninja_has_multipass() -> bool {
    matches!(
        std::env::var("GANTRY_NINJA_HAS_MULTIPASS").as_deref(),
        Ok("1") | Ok("true")
    )
}

pub struct RegenSingleton {
    pub output: PathBuf,
    pub root_file: PathBuf,
    pub depfile: Option<PathBuf>,
}

impl Singleton for RegenSingleton {
    fn generate_build_actions(&self, ctx: &mut SingletonContext<'_>) {
        let exe = match std::env::current_exe() {
            Ok(exe) => exe,
            Err(e) => {
                ctx.errorf(format!("cannot locate generator executable: {}", e));
                return;
            }
        };
        let args: Vec<String> = std::env::args().skip(1).collect();
        let command = format!(
            "{} {}",
            escape_arg(&exe.to_string_lossy()),
            args.iter()
                .map(|a| escape_arg(a))
                .collect::<Vec<_>>()
                .join(" ")
        );

        let pctx = crate::driver_pctx();
        let rule = ctx.rule(
            &pctx,
            "regenerate",
            RuleParams {
                command,
                description: Some("regenerating $out".to_string()),
                generator: true,
                depfile: self
                    .depfile
                    .as_ref()
                    .map(|p| escape_arg(&p.to_string_lossy())),
                ..Default::default()
            },
            &[],
        );

        let mut params = BuildParams::new(rule);
        params.outputs.push(self.output.to_string_lossy().into_owned());
        params
            .inputs
            .push(self.root_file.to_string_lossy().into_owned());
        ctx.build(&pctx, params);
    }
}

/// Escape `$` so argument text survives ninja value parsing literally.
fn escape_arg(s: &str) -> String {
    s.replace('$', "$$")
}
