//! Parser and evaluator tests.
//!
//! Covers the full grammar (assignments, modules, nested maps, lists),
//! the append semantics, and error recovery behavior.

use gantry_parser::{
    parse_and_eval, Def, ParseOptions, Pos, Scope, Value, ValueKind,
};
use pretty_assertions::assert_eq;

fn parse(source: &str) -> (gantry_parser::BuildFile, Vec<gantry_parser::ParseError>) {
    let mut scope = Scope::new();
    parse_and_eval("Gantryfile", source, &mut scope, &ParseOptions::default())
}

fn parse_ok(source: &str) -> gantry_parser::BuildFile {
    let (file, errors) = parse(source);
    assert!(errors.is_empty(), "unexpected errors: {:#?}", errors);
    file
}

fn string_list(value: &Value) -> Vec<&str> {
    value
        .as_list()
        .expect("expected a list")
        .iter()
        .map(|v| v.as_str().expect("expected string elements"))
        .collect()
}

// ============================================================================
// Grammar
// ============================================================================

#[test]
fn empty_file() {
    let file = parse_ok("");
    assert!(file.defs.is_empty());
}

#[test]
fn module_with_scalar_properties() {
    let file = parse_ok(
        r#"
cc_library {
    name: "util",
    shared: true,
    static: false,
}
"#,
    );
    let module = file.modules().next().expect("one module");
    assert_eq!(module.type_name, "cc_library");
    assert_eq!(module.properties.len(), 3);
    assert_eq!(
        module.property("name").unwrap().value.as_str(),
        Some("util")
    );
    assert_eq!(
        module.property("shared").unwrap().value.kind,
        ValueKind::Bool(true)
    );
}

#[test]
fn module_with_zero_properties() {
    let file = parse_ok("defaults {\n}\n");
    let module = file.modules().next().unwrap();
    assert!(module.properties.is_empty());
}

#[test]
fn newline_separated_properties() {
    let file = parse_ok("m {\n    a: \"1\"\n    b: \"2\"\n}\n");
    let module = file.modules().next().unwrap();
    assert_eq!(module.properties.len(), 2);
}

#[test]
fn trailing_comma_in_list_and_map() {
    let file = parse_ok("m {\n    xs: [\"a\", \"b\",],\n}\n");
    let module = file.modules().next().unwrap();
    assert_eq!(string_list(&module.property("xs").unwrap().value), ["a", "b"]);
}

#[test]
fn multiline_list_with_newline_separators() {
    let file = parse_ok("m {\n    xs: [\n        \"a\"\n        \"b\",\n    ],\n}\n");
    let module = file.modules().next().unwrap();
    assert_eq!(string_list(&module.property("xs").unwrap().value), ["a", "b"]);
}

#[test]
fn nested_maps() {
    let file = parse_ok("m {\n    nested: { inner: { s: \"abc\" } },\n}\n");
    let module = file.modules().next().unwrap();
    let ValueKind::Map(props) = &module.property("nested").unwrap().value.kind else {
        panic!("expected map");
    };
    let ValueKind::Map(inner) = &props[0].value.kind else {
        panic!("expected inner map");
    };
    assert_eq!(inner[0].value.as_str(), Some("abc"));
}

#[test]
fn property_append_flag() {
    let file = parse_ok("m {\n    xs += [\"a\"],\n}\n");
    let module = file.modules().next().unwrap();
    assert!(module.property("xs").unwrap().append);
}

#[test]
fn positions_are_one_based() {
    let file = parse_ok("m {\n    name: \"a\",\n}\n");
    let module = file.modules().next().unwrap();
    assert_eq!(module.pos, Pos::new("Gantryfile".into(), 1, 1));
    assert_eq!(
        module.property("name").unwrap().pos,
        Pos::new("Gantryfile".into(), 2, 5)
    );
}

#[test]
fn comments_preserved_with_positions() {
    let file = parse_ok("// header\nm {\n    /* why */ name: \"a\",\n}\n");
    assert_eq!(file.comments.len(), 2);
    assert_eq!(file.comments[0].text, " header");
    assert!(file.comments[1].block);
    assert!(file.comments[0].span.start < file.comments[1].span.start);
}

// ============================================================================
// Evaluation
// ============================================================================

#[test]
fn variable_interpolation() {
    let file = parse_ok("srcs = [\"a.c\"]\nm {\n    srcs: srcs,\n}\n");
    let module = file.modules().next().unwrap();
    assert_eq!(string_list(&module.property("srcs").unwrap().value), ["a.c"]);
}

#[test]
fn list_append_in_scope() {
    let file = parse_ok("list = [\"x\"]\nlist += [\"y\"]\nm {\n    xs: list,\n}\n");
    let module = file.modules().next().unwrap();
    assert_eq!(string_list(&module.property("xs").unwrap().value), ["x", "y"]);
}

#[test]
fn string_append_in_scope() {
    let file = parse_ok("s = \"ab\"\ns += \"cd\"\nm {\n    s: s,\n}\n");
    let module = file.modules().next().unwrap();
    assert_eq!(module.property("s").unwrap().value.as_str(), Some("abcd"));
}

#[test]
fn list_referencing_variable() {
    let file = parse_ok("s = \"def\"\nm {\n    xs: [s],\n}\n");
    let module = file.modules().next().unwrap();
    assert_eq!(string_list(&module.property("xs").unwrap().value), ["def"]);
}

#[test]
fn undefined_variable_reported_with_position() {
    let (_, errors) = parse("m {\n    s: missing,\n}\n");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("variable missing is not set"));
    assert_eq!(errors[0].pos.line, 2);
    assert_eq!(errors[0].pos.col, 8);
}

#[test]
fn append_type_mismatch_reported_at_operator() {
    let (_, errors) = parse("x = \"s\"\nx += [\"l\"]\n");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("string += list"));
    assert_eq!(errors[0].pos.line, 2);
}

#[test]
fn redefinition_reports_both_positions() {
    let (_, errors) = parse("x = \"a\"\nx = \"b\"\n");
    assert_eq!(errors.len(), 2);
    assert!(errors[0].message.contains("variable x already defined"));
    assert_eq!(errors[0].pos.line, 2);
    assert_eq!(errors[1].pos.line, 1);
}

#[test]
fn append_after_reference_is_an_error() {
    let (_, errors) = parse("x = [\"a\"]\ny = x\nx += [\"b\"]\n");
    assert_eq!(errors.len(), 1);
    assert!(errors[0]
        .message
        .contains("variable x modified after being referenced"));
}

#[test]
fn mixed_list_elements_rejected() {
    let (_, errors) = parse("m {\n    xs: [\"a\", true],\n}\n");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("single type"));
}

#[test]
fn assignments_visible_in_defs() {
    let file = parse_ok("subdirs = [\"src\"]\n");
    match &file.defs[0] {
        Def::Assignment(a) => {
            assert_eq!(a.name, "subdirs");
            assert!(!a.append);
        }
        other => panic!("expected assignment, got {:?}", other),
    }
}

// ============================================================================
// Error recovery
// ============================================================================

#[test]
fn recovers_at_next_top_level_definition() {
    let (file, errors) = parse("m {\n    name: ,\n}\n\nok {\n    name: \"a\",\n}\n");
    assert!(!errors.is_empty());
    // The second module still parses.
    assert!(file.modules().any(|m| m.type_name == "ok"));
}

#[test]
fn unterminated_string_recovers_on_next_line() {
    let (file, errors) = parse("s = \"abc\nm {\n    name: \"a\",\n}\n");
    assert!(errors.iter().any(|e| e.message == "unterminated string"));
    assert!(file.modules().any(|m| m.type_name == "m"));
}

#[test]
fn missing_close_brace_is_unexpected_eof() {
    let (_, errors) = parse("m {\n    name: \"a\",\n");
    assert!(!errors.is_empty());
    assert!(errors
        .iter()
        .any(|e| e.message.contains("end of input")));
}

#[test]
fn nesting_depth_bound_is_an_error_not_a_crash() {
    let mut source = String::from("m {\n    p: ");
    for _ in 0..40 {
        source.push_str("{ n: ");
    }
    source.push_str("\"deep\"");
    for _ in 0..40 {
        source.push_str(" }");
    }
    source.push_str(",\n}\n");
    let mut scope = Scope::new();
    let opts = ParseOptions {
        max_nesting_depth: 8,
    };
    let (_, errors) = parse_and_eval("Gantryfile", &source, &mut scope, &opts);
    assert!(errors
        .iter()
        .any(|e| e.message.contains("maximum property nesting depth (8) exceeded")));
}
