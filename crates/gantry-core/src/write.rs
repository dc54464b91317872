//! Phase 9-10: manifest emission and the check-file side output.

use crate::assemble::Assembled;
use crate::error::Error;
use crate::Context;
use gantry_ninja::Writer;
use std::io::{self, Write};
use std::path::Path;

impl Context {
    /// Serialize the assembled action set.
    ///
    /// Canonical order: header, `builddir`, pools, package variables and
    /// rules grouped by package then name, module blocks in visit order,
    /// singleton blocks in registration order, defaults, subninja
    /// includes. Byte-stable for a given input set regardless of worker
    /// count.
    pub fn write_build_file<W: Write>(&self, out: W) -> Result<(), Vec<Error>> {
        let Some(a) = &self.assembled else {
            return Err(vec![Error::internal(
                "write_build_file called before prepare_build_actions succeeded",
            )]);
        };
        let mut w = Writer::new(out);
        write_manifest(a, &mut w)
            .map_err(|e| vec![Error::internal(format!("manifest write failed: {}", e))])
    }

    /// Write the manifest to `path` atomically (temp file plus rename).
    ///
    /// With `check` set, the freshly written bytes are compared against
    /// the existing file first; when identical the existing file is left
    /// untouched, preserving its mtime, and `Ok(false)` is returned.
    /// This is how callers guard against spurious downstream rebuilds.
    pub fn write_build_file_to_path(&self, path: &Path, check: bool) -> Result<bool, Vec<Error>> {
        let mut bytes = Vec::new();
        self.write_build_file(&mut bytes)?;
        write_file_checked(path, &bytes, check).map_err(|e| vec![e])
    }
}

fn write_manifest<W: Write>(a: &Assembled, w: &mut Writer<W>) -> io::Result<()> {
    w.comment("This file is generated by gantry. Do not edit.")?;
    w.blank_line()?;
    let (major, minor, micro) = a.required_version;
    w.variable(
        "ninja_required_version",
        &format!("{}.{}.{}", major, minor, micro),
    )?;
    w.blank_line()?;

    if let Some(build_dir) = &a.build_dir {
        w.variable("builddir", build_dir)?;
        w.blank_line()?;
    }

    for pool in &a.pools {
        if let Some(comment) = &pool.comment {
            w.comment(comment)?;
        }
        w.pool(&pool.name, pool.depth)?;
        w.blank_line()?;
    }

    if !a.pkg_variables.is_empty() {
        for (name, value) in &a.pkg_variables {
            w.variable(name, value)?;
        }
        w.blank_line()?;
    }

    for (name, vars) in &a.pkg_rules {
        w.rule(name)?;
        for (key, value) in vars {
            w.scoped_variable(key, value)?;
        }
        w.blank_line()?;
    }

    for section in &a.sections {
        w.comment(&section.title)?;
        for (name, value) in &section.variables {
            w.variable(name, value)?;
        }
        for (name, vars) in &section.rules {
            w.rule(name)?;
            for (key, value) in vars {
                w.scoped_variable(key, value)?;
            }
        }
        for edge in &section.edges {
            w.build(
                &edge.outputs,
                &edge.implicit_outputs,
                &edge.rule,
                &edge.inputs,
                &edge.implicits,
                &edge.order_only,
                &edge.validations,
            )?;
            for (key, value) in &edge.vars {
                w.scoped_variable(key, value)?;
            }
        }
        w.blank_line()?;
    }

    if !a.defaults.is_empty() {
        w.default(&a.defaults)?;
    }
    for subninja in &a.subninjas {
        w.subninja(subninja)?;
    }
    Ok(())
}

/// Write `bytes` to `path` through a temp file and rename.
///
/// With `check` set, an existing byte-identical file is left untouched
/// (preserving its mtime) and `Ok(false)` is returned.
pub fn write_file_checked(path: &Path, bytes: &[u8], check: bool) -> Result<bool, Error> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut temp = match dir {
        Some(dir) => tempfile::NamedTempFile::new_in(dir),
        None => tempfile::NamedTempFile::new(),
    }
    .map_err(|e| Error::internal(format!("temp file: {}", e)))?;
    temp.write_all(bytes)
        .map_err(|e| Error::internal(format!("temp file: {}", e)))?;

    if check {
        if let Ok(existing) = std::fs::read(path) {
            if existing == bytes {
                // Identical: drop the temp file, keep the original and
                // its mtime.
                return Ok(false);
            }
        }
    }
    temp.persist(path)
        .map_err(|e| Error::internal(format!("rename: {}", e)))?;
    Ok(true)
}
