//! The property unpacker: maps an evaluated property tree onto typed
//! containers.
//!
//! Unpacking is accumulating: it proceeds past every recoverable error so
//! the host sees all defects in one pass. Non-optional scalar fields
//! accumulate onto whatever the factory preset (strings concatenate, lists
//! extend, bools OR); `Option` fields replace. Embedded containers are
//! flattened into their parent, and a name shared between an outer field
//! and an embedded one populates both, outer first.

use crate::slot::{filter_tag, normalize_name, FieldSlot, LazyStruct, PropertyStruct};
use gantry_parser::{Pos, Property, Value, ValueKind};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;

/// An unpack error with the position of the offending property.
#[derive(Debug, Clone, PartialEq)]
pub struct UnpackError {
    pub pos: Pos,
    pub message: String,
}

impl UnpackError {
    fn new(pos: &Pos, message: impl Into<String>) -> Self {
        Self {
            pos: pos.clone(),
            message: message.into(),
        }
    }
}

impl fmt::Display for UnpackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.pos, self.message)
    }
}

impl std::error::Error for UnpackError {}

/// Unpack one module's property list into the given containers.
///
/// Every property is offered to every container; it is unrecognized only
/// if no container has a matching field. Nested maps bind to the single
/// container field they matched.
pub fn unpack_properties(
    properties: &[Property],
    containers: &mut [&mut dyn PropertyStruct],
) -> Vec<UnpackError> {
    let mut errs = Vec::new();
    check_duplicates(properties, "", &mut errs);

    let mut seen = HashSet::new();
    for prop in properties {
        if !seen.insert(normalize_name(&prop.name)) {
            continue; // duplicate, already reported
        }
        let mut matched = false;
        for container in containers.iter_mut() {
            matched |= assign_in_container(&mut **container, prop, "", None, &mut errs);
        }
        if !matched {
            errs.push(UnpackError::new(
                &prop.pos,
                format!("unrecognized property \"{}\"", prop.name),
            ));
        }
    }

    dedup_errors(errs)
}

/// Report duplicate property names, recursively, citing both positions.
fn check_duplicates(properties: &[Property], prefix: &str, errs: &mut Vec<UnpackError>) {
    let mut first: IndexMap<String, &Property> = IndexMap::new();
    for prop in properties {
        let norm = normalize_name(&prop.name);
        if let Some(orig) = first.get(&norm) {
            errs.push(UnpackError::new(
                &prop.pos,
                format!("property \"{}{}\" already defined", prefix, prop.name),
            ));
            errs.push(UnpackError::new(&orig.pos, "<-- previous definition here"));
            continue;
        }
        first.insert(norm, prop);
        if let ValueKind::Map(inner) = &prop.value.kind {
            check_duplicates(inner, &format!("{}{}.", prefix, prop.name), errs);
        }
    }
}

/// Offer a property to one container, flattening embedded sub-containers.
///
/// Returns true if any field (here or in an embedded container) matched,
/// whether or not the assignment itself succeeded.
fn assign_in_container(
    container: &mut dyn PropertyStruct,
    prop: &Property,
    prefix: &str,
    filter: Option<&(String, String)>,
    errs: &mut Vec<UnpackError>,
) -> bool {
    let norm = normalize_name(&prop.name);
    let path = format!("{}{}", prefix, prop.name);
    let field_count = container.fields().len();
    let mut matched = false;
    let mut direct_matches = 0usize;

    for index in 0..field_count {
        let spec = container.fields()[index];
        if matches!(container.field_slot(index), FieldSlot::Embedded(_)) {
            let FieldSlot::Embedded(inner) = container.field_slot(index) else {
                unreachable!()
            };
            // Filters apply to the outer container's immediate children
            // only; they do not recurse into embedded containers.
            matched |= assign_in_container(inner, prop, prefix, None, errs);
            continue;
        }
        if normalize_name(spec.name) != norm {
            continue;
        }
        if let Some((key, value)) = filter {
            if !spec.has_tag(key, value) {
                continue;
            }
        }
        direct_matches += 1;
        if direct_matches > 1 {
            errs.push(UnpackError::new(
                &prop.pos,
                format!(
                    "property \"{}\" is defined by multiple fields of the same container",
                    path
                ),
            ));
            continue;
        }
        if spec.has_tag_key("mutated") {
            errs.push(UnpackError::new(
                &prop.pos,
                format!("mutated field {} cannot be set", path),
            ));
            matched = true;
            continue;
        }
        matched = true;
        let child_filter = filter_tag(&spec);
        let slot = container.field_slot(index);
        assign_slot(slot, prop, &path, child_filter.as_ref(), errs);
    }

    matched
}

/// Assign one property value into one typed slot.
fn assign_slot(
    slot: FieldSlot<'_>,
    prop: &Property,
    path: &str,
    child_filter: Option<&(String, String)>,
    errs: &mut Vec<UnpackError>,
) {
    if prop.append
        && !matches!(
            slot,
            FieldSlot::String(_) | FieldSlot::OptString(_) | FieldSlot::StringList(_)
        )
    {
        errs.push(UnpackError::new(
            &prop.pos,
            format!("can't append to {} property \"{}\"", slot.kind_name(), path),
        ));
        return;
    }

    let value = &prop.value;
    match (slot, &value.kind) {
        (FieldSlot::Bool(b), ValueKind::Bool(v)) => *b = *b || *v,
        (FieldSlot::OptBool(b), ValueKind::Bool(v)) => *b = Some(*v),
        (FieldSlot::String(s), ValueKind::String(v)) => s.push_str(v),
        (FieldSlot::OptString(s), ValueKind::String(v)) => match (prop.append, s.as_mut()) {
            (true, Some(cur)) => cur.push_str(v),
            _ => *s = Some(v.clone()),
        },
        (FieldSlot::StringList(list), ValueKind::List(items)) => {
            extend_string_list(list, items, path, errs);
        }
        (FieldSlot::Struct(inner), ValueKind::Map(props)) => {
            unpack_nested(inner, props, path, child_filter, errs);
        }
        (FieldSlot::OptStruct(lazy), ValueKind::Map(props)) => {
            // Allocated on first property assignment within it: an empty
            // map leaves the field unset.
            if !props.is_empty() {
                unpack_nested(LazyStruct::ensure(lazy), props, path, child_filter, errs);
            }
        }
        (FieldSlot::Interface(inner), ValueKind::Map(props)) => {
            // A polymorphic field holding nothing ignores the property.
            if let Some(inner) = inner {
                unpack_nested(inner, props, path, child_filter, errs);
            }
        }
        (slot, kind) => {
            errs.push(UnpackError::new(
                &value.pos,
                format!(
                    "can't assign {} value to {} property \"{}\"",
                    kind.kind_name(),
                    slot.kind_name(),
                    path
                ),
            ));
        }
    }
}

fn extend_string_list(
    list: &mut Vec<String>,
    items: &[Value],
    path: &str,
    errs: &mut Vec<UnpackError>,
) {
    for item in items {
        match &item.kind {
            ValueKind::String(s) => list.push(s.clone()),
            other => {
                errs.push(UnpackError::new(
                    &item.pos,
                    format!(
                        "can't assign {} value to list of strings property \"{}\"",
                        other.kind_name(),
                        path
                    ),
                ));
            }
        }
    }
}

/// Unpack a nested map into a single container.
///
/// Unlike the top level, a nested map has exactly one target: anything the
/// container (and its embedded children) does not define is unrecognized.
fn unpack_nested(
    container: &mut dyn PropertyStruct,
    properties: &[Property],
    path: &str,
    filter: Option<&(String, String)>,
    errs: &mut Vec<UnpackError>,
) {
    let prefix = format!("{}.", path);
    let mut seen = HashSet::new();
    for prop in properties {
        if !seen.insert(normalize_name(&prop.name)) {
            continue;
        }
        let matched = assign_in_container(container, prop, &prefix, filter, errs);
        if !matched {
            errs.push(UnpackError::new(
                &prop.pos,
                format!("unrecognized property \"{}{}\"", prefix, prop.name),
            ));
        }
    }
}

/// Drop exact repeats (same position and message) while preserving order.
///
/// Two top-level containers with structurally identical nested fields
/// would otherwise report nested defects once per container.
fn dedup_errors(errs: Vec<UnpackError>) -> Vec<UnpackError> {
    let mut seen = HashSet::new();
    errs.into_iter()
        .filter(|e| seen.insert((e.pos.clone(), e.message.clone())))
        .collect()
}
