//! Unpacker behavior tests.
//!
//! Each case parses a small build file, unpacks the single module into
//! hand-described containers, and checks the populated values or the
//! accumulated errors.

use gantry_parser::{parse_and_eval, ModuleDef, ParseOptions, Scope};
use gantry_props::{
    unpack_properties, FieldSlot, FieldSpec, PropertyStruct, UnpackError,
};
use pretty_assertions::assert_eq;

fn parse_module(source: &str) -> ModuleDef {
    let mut scope = Scope::new();
    let (file, errors) = parse_and_eval("<input>", source, &mut scope, &ParseOptions::default());
    assert!(errors.is_empty(), "unexpected parse errors: {:#?}", errors);
    let module = file.modules().next().expect("expected one module").clone();
    module
}

fn unpack(source: &str, containers: &mut [&mut dyn PropertyStruct]) -> Vec<UnpackError> {
    let module = parse_module(source);
    unpack_properties(&module.properties, containers)
}

fn unpack_ok(source: &str, containers: &mut [&mut dyn PropertyStruct]) {
    let errs = unpack(source, containers);
    assert!(errs.is_empty(), "unexpected unpack errors: {:#?}", errs);
}

fn strs(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// Containers used by the fixtures
// ============================================================================

#[derive(Debug, Default, PartialEq)]
struct Scalars {
    s: String,
    opt_s: Option<String>,
    b: bool,
    opt_b: Option<bool>,
    list: Vec<String>,
}

impl PropertyStruct for Scalars {
    fn fields(&self) -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::new("s"),
            FieldSpec::new("opt_s"),
            FieldSpec::new("b"),
            FieldSpec::new("opt_b"),
            FieldSpec::new("list"),
        ];
        FIELDS
    }

    fn field_slot(&mut self, index: usize) -> FieldSlot<'_> {
        match index {
            0 => FieldSlot::String(&mut self.s),
            1 => FieldSlot::OptString(&mut self.opt_s),
            2 => FieldSlot::Bool(&mut self.b),
            3 => FieldSlot::OptBool(&mut self.opt_b),
            4 => FieldSlot::StringList(&mut self.list),
            _ => panic!("field index out of range"),
        }
    }
}

#[derive(Debug, Default, PartialEq)]
struct Inner {
    s: String,
}

impl PropertyStruct for Inner {
    fn fields(&self) -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[FieldSpec::new("s")];
        FIELDS
    }

    fn field_slot(&mut self, index: usize) -> FieldSlot<'_> {
        match index {
            0 => FieldSlot::String(&mut self.s),
            _ => panic!("field index out of range"),
        }
    }
}

#[derive(Debug, Default, PartialEq)]
struct Nested {
    nested: Inner,
}

impl PropertyStruct for Nested {
    fn fields(&self) -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[FieldSpec::new("nested")];
        FIELDS
    }

    fn field_slot(&mut self, index: usize) -> FieldSlot<'_> {
        match index {
            0 => FieldSlot::Struct(&mut self.nested),
            _ => panic!("field index out of range"),
        }
    }
}

#[derive(Debug, Default, PartialEq)]
struct DoubleNested {
    nested: Nested,
}

impl PropertyStruct for DoubleNested {
    fn fields(&self) -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[FieldSpec::new("nested")];
        FIELDS
    }

    fn field_slot(&mut self, index: usize) -> FieldSlot<'_> {
        match index {
            0 => FieldSlot::Struct(&mut self.nested),
            _ => panic!("field index out of range"),
        }
    }
}

#[derive(Debug, Default, PartialEq)]
struct OptNested {
    nested: Option<Inner>,
}

impl PropertyStruct for OptNested {
    fn fields(&self) -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[FieldSpec::new("nested")];
        FIELDS
    }

    fn field_slot(&mut self, index: usize) -> FieldSlot<'_> {
        match index {
            0 => FieldSlot::OptStruct(&mut self.nested),
            _ => panic!("field index out of range"),
        }
    }
}

/// Polymorphic nested field: the host may or may not supply a container.
#[derive(Default)]
struct Polymorphic {
    nested: Option<Box<dyn PropertyStruct>>,
}

impl PropertyStruct for Polymorphic {
    fn fields(&self) -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[FieldSpec::new("nested")];
        FIELDS
    }

    fn field_slot(&mut self, index: usize) -> FieldSlot<'_> {
        match index {
            0 => FieldSlot::Interface(
                self.nested.as_mut().map(|b| -> &mut dyn PropertyStruct { b.as_mut() }),
            ),
            _ => panic!("field index out of range"),
        }
    }
}

/// Outer `s` collides with the embedded container's `s`.
#[derive(Debug, Default, PartialEq)]
struct Collision {
    s: String,
    base: Inner,
}

impl PropertyStruct for Collision {
    fn fields(&self) -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[FieldSpec::new("s"), FieldSpec::new("base")];
        FIELDS
    }

    fn field_slot(&mut self, index: usize) -> FieldSlot<'_> {
        match index {
            0 => FieldSlot::String(&mut self.s),
            1 => FieldSlot::Embedded(&mut self.base),
            _ => panic!("field index out of range"),
        }
    }
}

/// Embedded container only; its fields surface at this level.
#[derive(Debug, Default, PartialEq)]
struct Flattened {
    base: Inner,
    extra: Vec<String>,
}

impl PropertyStruct for Flattened {
    fn fields(&self) -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[FieldSpec::new("base"), FieldSpec::new("extra")];
        FIELDS
    }

    fn field_slot(&mut self, index: usize) -> FieldSlot<'_> {
        match index {
            0 => FieldSlot::Embedded(&mut self.base),
            1 => FieldSlot::StringList(&mut self.extra),
            _ => panic!("field index out of range"),
        }
    }
}

#[derive(Debug, Default, PartialEq)]
struct FilteredInner {
    foo: String,
    bar: String,
}

impl PropertyStruct for FilteredInner {
    fn fields(&self) -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::with_tags("foo", &[("allow_nested", "true")]),
            FieldSpec::new("bar"),
        ];
        FIELDS
    }

    fn field_slot(&mut self, index: usize) -> FieldSlot<'_> {
        match index {
            0 => FieldSlot::String(&mut self.foo),
            1 => FieldSlot::String(&mut self.bar),
            _ => panic!("field index out of range"),
        }
    }
}

#[derive(Debug, Default, PartialEq)]
struct Filtered {
    nested: FilteredInner,
}

impl PropertyStruct for Filtered {
    fn fields(&self) -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] =
            &[FieldSpec::with_tags("nested", &[("filter", "allow_nested:\"true\"")])];
        FIELDS
    }

    fn field_slot(&mut self, index: usize) -> FieldSlot<'_> {
        match index {
            0 => FieldSlot::Struct(&mut self.nested),
            _ => panic!("field index out of range"),
        }
    }
}

#[derive(Debug, Default, PartialEq)]
struct WithMutated {
    mutated: bool,
    nested: MutatedInner,
}

#[derive(Debug, Default, PartialEq)]
struct MutatedInner {
    mutated: bool,
}

impl PropertyStruct for MutatedInner {
    fn fields(&self) -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[FieldSpec::with_tags("mutated", &[("mutated", "")])];
        FIELDS
    }

    fn field_slot(&mut self, index: usize) -> FieldSlot<'_> {
        match index {
            0 => FieldSlot::Bool(&mut self.mutated),
            _ => panic!("field index out of range"),
        }
    }
}

impl PropertyStruct for WithMutated {
    fn fields(&self) -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::with_tags("mutated", &[("mutated", "")]),
            FieldSpec::new("nested"),
        ];
        FIELDS
    }

    fn field_slot(&mut self, index: usize) -> FieldSlot<'_> {
        match index {
            0 => FieldSlot::Bool(&mut self.mutated),
            1 => FieldSlot::Struct(&mut self.nested),
            _ => panic!("field index out of range"),
        }
    }
}

#[derive(Debug, Default, PartialEq)]
struct WithInts {
    count: i64,
    limit: Option<u64>,
}

impl PropertyStruct for WithInts {
    fn fields(&self) -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[FieldSpec::new("count"), FieldSpec::new("limit")];
        FIELDS
    }

    fn field_slot(&mut self, index: usize) -> FieldSlot<'_> {
        match index {
            0 => FieldSlot::Int(&mut self.count),
            1 => FieldSlot::OptUint(&mut self.limit),
            _ => panic!("field index out of range"),
        }
    }
}

// ============================================================================
// Valid unpacking
// ============================================================================

#[test]
fn string_passthrough() {
    let mut props = Scalars::default();
    unpack_ok("m {\n    s: \"abc\",\n}\n", &mut [&mut props]);
    assert_eq!(props.s, "abc");
}

#[test]
fn blank_and_unset_are_distinct() {
    let mut props = Scalars::default();
    unpack_ok("m {\n    s: \"abc\",\n    opt_s: \"\",\n}\n", &mut [&mut props]);
    assert_eq!(props.opt_s, Some(String::new()));

    let mut unset = Scalars::default();
    unpack_ok("m {\n    s: \"abc\",\n}\n", &mut [&mut unset]);
    assert_eq!(unset.opt_s, None);
}

#[test]
fn bools() {
    let mut props = Scalars::default();
    unpack_ok("m {\n    b: true,\n    opt_b: false,\n}\n", &mut [&mut props]);
    assert!(props.b);
    assert_eq!(props.opt_b, Some(false));
}

#[test]
fn string_lists() {
    let mut props = Scalars::default();
    unpack_ok(
        "m {\n    list: [\"asdf\", \"jkl;\", \"qwert\",\n        \"uiop\"],\n}\n",
        &mut [&mut props],
    );
    assert_eq!(props.list, strs(&["asdf", "jkl;", "qwert", "uiop"]));
}

#[test]
fn empty_list_is_set_but_empty() {
    let mut props = Scalars::default();
    unpack_ok("m {\n    list: [],\n}\n", &mut [&mut props]);
    assert!(props.list.is_empty());
}

#[test]
fn nested_struct() {
    let mut props = Nested::default();
    unpack_ok("m {\n    nested: {\n        s: \"abc\",\n    },\n}\n", &mut [&mut props]);
    assert_eq!(props.nested.s, "abc");
}

#[test]
fn double_nested_struct() {
    let mut props = DoubleNested::default();
    unpack_ok(
        "m {\n    nested: {\n        nested: {\n            s: \"abc\",\n        },\n    },\n}\n",
        &mut [&mut props],
    );
    assert_eq!(props.nested.nested.s, "abc");
}

#[test]
fn optional_struct_allocated_on_first_assignment() {
    let mut props = OptNested::default();
    unpack_ok("m {\n    nested: {\n        s: \"abc\",\n    },\n}\n", &mut [&mut props]);
    assert_eq!(props.nested, Some(Inner { s: "abc".into() }));
}

#[test]
fn optional_struct_stays_unset_without_assignment() {
    let mut props = OptNested::default();
    unpack_ok("m {\n    nested: {},\n}\n", &mut [&mut props]);
    assert_eq!(props.nested, None);

    let mut untouched = OptNested::default();
    unpack_ok("m {\n}\n", &mut [&mut untouched]);
    assert_eq!(untouched.nested, None);
}

#[test]
fn polymorphic_field_with_container() {
    let mut props = Polymorphic {
        nested: Some(Box::new(Inner::default())),
    };
    unpack_ok("m {\n    nested: {\n        s: \"def\",\n    },\n}\n", &mut [&mut props]);
    // Downcast-free check: re-borrow the slot and read through Inner's field.
    let boxed = props.nested.as_mut().unwrap();
    let FieldSlot::String(s) = boxed.field_slot(0) else {
        panic!("expected string slot");
    };
    assert_eq!(*s, "def");
}

#[test]
fn polymorphic_field_without_container_is_ignored() {
    let mut props = Polymorphic::default();
    unpack_ok("m {\n    nested: {\n        s: \"def\",\n    },\n}\n", &mut [&mut props]);
}

#[test]
fn embedded_fields_surface_at_parent_level() {
    let mut props = Flattened::default();
    unpack_ok("m {\n    s: \"abc\",\n    extra: [\"x\"],\n}\n", &mut [&mut props]);
    assert_eq!(props.base.s, "abc");
    assert_eq!(props.extra, strs(&["x"]));
}

#[test]
fn embedded_name_collision_populates_both_outer_first() {
    let mut props = Collision::default();
    unpack_ok("m {\n    s: \"abc\",\n}\n", &mut [&mut props]);
    assert_eq!(props.s, "abc");
    assert_eq!(props.base.s, "abc");
}

#[test]
fn filter_admits_tagged_fields() {
    let mut props = Filtered::default();
    unpack_ok("m {\n    nested: {\n        foo: \"abc\",\n    },\n}\n", &mut [&mut props]);
    assert_eq!(props.nested.foo, "abc");
}

#[test]
fn filter_rejects_untagged_fields() {
    let mut props = Filtered::default();
    let errs = unpack(
        "m {\n    nested: {\n        bar: \"abc\",\n    },\n}\n",
        &mut [&mut props],
    );
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].message, "unrecognized property \"nested.bar\"");
}

#[test]
fn variables_resolve_before_unpack() {
    let source = "list = [\"abc\"]\nstring = \"def\"\nlist_with_variable = [string]\nm {\n    s: string,\n    list: list_with_variable,\n}\n";
    let mut props = Scalars::default();
    unpack_ok(source, &mut [&mut props]);
    assert_eq!(props.s, "def");
    assert_eq!(props.list, strs(&["def"]));
}

#[test]
fn multiple_containers_all_populated() {
    let mut a = Nested::default();
    let mut b = Nested::default();
    unpack_ok(
        "m {\n    nested: {\n        s: \"abc\",\n    },\n}\n",
        &mut [&mut a, &mut b],
    );
    assert_eq!(a.nested.s, "abc");
    assert_eq!(b.nested.s, "abc");
}

#[test]
fn factory_presets_accumulate() {
    let mut props = Scalars {
        s: "012".into(),
        opt_s: Some("012".into()),
        b: true,
        opt_b: Some(true),
        list: strs(&["0", "1", "2"]),
    };
    unpack_ok(
        "m {\n    s: \"abc\",\n    opt_s: \"abc\",\n    b: false,\n    opt_b: false,\n    list: [\"a\", \"b\"],\n}\n",
        &mut [&mut props],
    );
    assert_eq!(props.s, "012abc");
    assert_eq!(props.opt_s, Some("abc".into()));
    assert!(props.b);
    assert_eq!(props.opt_b, Some(false));
    assert_eq!(props.list, strs(&["0", "1", "2", "a", "b"]));
}

#[test]
fn capitalized_property_matches_case_insensitively() {
    let mut props = Scalars::default();
    unpack_ok("m {\n    S: \"foo\",\n}\n", &mut [&mut props]);
    assert_eq!(props.s, "foo");
}

#[test]
fn append_in_module_body() {
    let mut props = Scalars {
        list: strs(&["pre"]),
        s: "a".into(),
        ..Default::default()
    };
    unpack_ok("m {\n    list += [\"x\"],\n    s += \"b\",\n}\n", &mut [&mut props]);
    assert_eq!(props.list, strs(&["pre", "x"]));
    assert_eq!(props.s, "ab");
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn unrecognized_property() {
    let errs = unpack("m {\n    missing: true,\n}\n", &mut []);
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].message, "unrecognized property \"missing\"");
    assert_eq!(errs[0].pos.line, 2);
    assert_eq!(errs[0].pos.col, 5);
}

#[test]
fn unrecognized_nested_property_uses_dotted_path() {
    let mut props = OptNested::default();
    let errs = unpack(
        "m {\n    nested: {\n        missing: true,\n    },\n}\n",
        &mut [&mut props],
    );
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].message, "unrecognized property \"nested.missing\"");
    assert_eq!(errs[0].pos.line, 3);
}

#[test]
fn mutated_field_rejected() {
    let mut props = WithMutated::default();
    let errs = unpack("m {\n    mutated: true,\n}\n", &mut [&mut props]);
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].message, "mutated field mutated cannot be set");
    assert!(!props.mutated);
}

#[test]
fn nested_mutated_field_rejected_with_path() {
    let mut props = WithMutated::default();
    let errs = unpack(
        "m {\n    nested: {\n        mutated: true,\n    },\n}\n",
        &mut [&mut props],
    );
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].message, "mutated field nested.mutated cannot be set");
}

#[test]
fn duplicate_property_cites_both_positions() {
    let mut props = Scalars::default();
    let errs = unpack("m {\n    b: true,\n    b: true,\n}\n", &mut [&mut props]);
    assert_eq!(errs.len(), 2);
    assert_eq!(errs[0].message, "property \"b\" already defined");
    assert_eq!(errs[0].pos.line, 3);
    assert_eq!(errs[1].message, "<-- previous definition here");
    assert_eq!(errs[1].pos.line, 2);
}

#[test]
fn nested_duplicate_property_uses_dotted_path() {
    let mut props = Nested::default();
    let errs = unpack(
        "m {\n    nested: {\n        s: \"a\",\n        s: \"b\",\n    },\n}\n",
        &mut [&mut props],
    );
    assert_eq!(errs.len(), 2);
    assert_eq!(errs[0].message, "property \"nested.s\" already defined");
    assert_eq!(errs[1].message, "<-- previous definition here");
    // First definition wins.
    assert_eq!(props.nested.s, "a");
}

#[test]
fn kind_mismatch_names_both_kinds() {
    let mut props = Scalars::default();
    let errs = unpack("m {\n    b: [\"not\", \"a\", \"bool\"],\n}\n", &mut [&mut props]);
    assert_eq!(errs.len(), 1);
    assert_eq!(
        errs[0].message,
        "can't assign list value to bool property \"b\""
    );
}

#[test]
fn int_properties_cannot_be_set_from_build_files() {
    let mut props = WithInts::default();
    let errs = unpack("m {\n    count: \"3\",\n}\n", &mut [&mut props]);
    assert_eq!(errs.len(), 1);
    assert_eq!(
        errs[0].message,
        "can't assign string value to int property \"count\""
    );
}

#[test]
fn append_to_bool_is_an_error() {
    let mut props = Scalars::default();
    let errs = unpack("m {\n    b += true,\n}\n", &mut [&mut props]);
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].message, "can't append to bool property \"b\"");
}

#[test]
fn errors_accumulate_across_properties() {
    let mut props = Scalars::default();
    let errs = unpack(
        "m {\n    missing: true,\n    b: \"nope\",\n    also_missing: \"x\",\n}\n",
        &mut [&mut props],
    );
    assert_eq!(errs.len(), 3);
}
