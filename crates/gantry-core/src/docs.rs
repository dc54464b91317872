//! Documentation extraction from property descriptors.
//!
//! Every registered module type's containers are introspectable through
//! their field specs; this walks them and produces a Markdown reference
//! instead of a manifest.

use crate::Context;
use gantry_props::{FieldSlot, PropertyStruct};
use std::io::{self, Write};

const MAX_DOC_DEPTH: usize = 8;

impl Context {
    /// Write a Markdown reference of every registered module type and its
    /// properties.
    pub fn write_docs<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "# Module type reference")?;
        let mut type_names: Vec<&String> = self.factory_names().collect();
        type_names.sort_unstable();
        for type_name in type_names {
            writeln!(w)?;
            writeln!(w, "## {}", type_name)?;
            writeln!(w)?;
            writeln!(w, "- `name`: string (required, globally unique)")?;
            writeln!(w, "- `deps`: list of strings (module names)")?;
            let mut module = self.instantiate(type_name);
            for container in module.props() {
                write_container(w, container, 0)?;
            }
        }
        Ok(())
    }
}

fn write_container(
    w: &mut dyn Write,
    container: &mut dyn PropertyStruct,
    depth: usize,
) -> io::Result<()> {
    if depth >= MAX_DOC_DEPTH {
        return Ok(());
    }
    let indent = "    ".repeat(depth);
    for index in 0..container.fields().len() {
        let spec = container.fields()[index];
        let mut notes: Vec<&str> = Vec::new();
        if spec.has_tag_key("mutated") {
            notes.push("host-set only");
        }
        if spec.has_tag_key("filter") {
            notes.push("filtered");
        }
        let note = if notes.is_empty() {
            String::new()
        } else {
            format!(" ({})", notes.join(", "))
        };
        match container.field_slot(index) {
            FieldSlot::Embedded(inner) => {
                write_container(w, inner, depth)?;
            }
            FieldSlot::Struct(inner) => {
                writeln!(w, "{}- `{}`: map{}", indent, spec.name, note)?;
                write_container(w, inner, depth + 1)?;
            }
            FieldSlot::OptStruct(lazy) => {
                writeln!(w, "{}- `{}`: map (optional){}", indent, spec.name, note)?;
                write_container(w, lazy.ensure(), depth + 1)?;
            }
            FieldSlot::Interface(inner) => {
                writeln!(
                    w,
                    "{}- `{}`: map (host-provided shape){}",
                    indent, spec.name, note
                )?;
                if let Some(inner) = inner {
                    write_container(w, inner, depth + 1)?;
                }
            }
            slot => {
                let kind = match slot {
                    FieldSlot::OptBool(_) => "bool (optional)",
                    FieldSlot::OptString(_) => "string (optional)",
                    FieldSlot::OptInt(_) => "int (optional)",
                    FieldSlot::OptUint(_) => "uint (optional)",
                    other => other.kind_name(),
                };
                writeln!(w, "{}- `{}`: {}{}", indent, spec.name, kind, note)?;
            }
        }
    }
    Ok(())
}
