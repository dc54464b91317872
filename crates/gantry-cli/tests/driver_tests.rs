//! Driver smoke tests: exercise the binary end to end over real trees.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn gantry() -> Command {
    Command::cargo_bin("gantry").expect("binary builds")
}

fn write_tree(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (rel, content) in files {
        let path = dir.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
    dir
}

#[test]
fn generates_phony_edges() {
    let dir = write_tree(&[(
        "Gantryfile",
        concat!(
            "phony {\n    name: \"all\",\n    deps: [\"lib\"],\n}\n",
            "phony {\n    name: \"lib\",\n}\n",
        ),
    )]);
    let out = dir.path().join("build.ninja");

    gantry()
        .arg(dir.path().join("Gantryfile"))
        .arg("-o")
        .arg(&out)
        .assert()
        .success();

    let manifest = std::fs::read_to_string(&out).unwrap();
    assert!(manifest.contains("build lib: phony\n"));
    assert!(manifest.contains("build all: phony lib\n"));
}

#[test]
fn errors_exit_with_status_one() {
    let dir = write_tree(&[("Gantryfile", "phony {\n    name: \"a\",\n    deps: [\"missing\"],\n}\n")]);
    gantry()
        .arg(dir.path().join("Gantryfile"))
        .arg("-o")
        .arg(dir.path().join("build.ninja"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "\"a\" depends on undefined module \"missing\"",
        ));
}

#[test]
fn parse_errors_are_positioned() {
    let dir = write_tree(&[("Gantryfile", "phony {\n    name: ,\n}\n")]);
    gantry()
        .arg(dir.path().join("Gantryfile"))
        .arg("-o")
        .arg(dir.path().join("build.ninja"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Gantryfile:2:11:"));
}

#[test]
fn usage_errors_exit_with_status_two() {
    gantry().assert().code(2);
}

#[test]
fn depfile_lists_every_build_file() {
    let dir = write_tree(&[
        ("Gantryfile", "subdirs = [\"sub\"]\n"),
        ("sub/Gantryfile", "phony {\n    name: \"inner\",\n}\n"),
    ]);
    let out = dir.path().join("build.ninja");
    let depfile = dir.path().join("build.ninja.d");

    gantry()
        .arg(dir.path().join("Gantryfile"))
        .arg("-o")
        .arg(&out)
        .arg("-d")
        .arg(&depfile)
        .assert()
        .success();

    let deps = std::fs::read_to_string(&depfile).unwrap();
    assert!(deps.starts_with(&format!("{}:", out.display())));
    assert!(deps.contains("sub/Gantryfile") || deps.contains("sub\\Gantryfile"));
}

#[test]
fn template_wraps_generated_manifest() {
    let dir = write_tree(&[
        ("Gantryfile", "phony {\n    name: \"a\",\n}\n"),
        (
            "build.ninja.in",
            "# prologue\n@@GANTRY_RULES@@# epilogue\n",
        ),
    ]);
    let out = dir.path().join("build.ninja");

    gantry()
        .arg(dir.path().join("Gantryfile"))
        .arg("-o")
        .arg(&out)
        .arg("-m")
        .arg(dir.path().join("build.ninja.in"))
        .assert()
        .success();

    let manifest = std::fs::read_to_string(&out).unwrap();
    assert!(manifest.starts_with("# prologue\n"));
    assert!(manifest.ends_with("# epilogue\n"));
    assert!(manifest.contains("build a: phony"));
}

#[test]
fn docs_mode_writes_markdown() {
    let dir = write_tree(&[("Gantryfile", "")]);
    let docs = dir.path().join("docs.md");

    gantry()
        .arg(dir.path().join("Gantryfile"))
        .arg("--docs")
        .arg(&docs)
        .assert()
        .success();

    let text = std::fs::read_to_string(&docs).unwrap();
    assert!(text.contains("# Module type reference"));
    assert!(text.contains("## phony"));
}

#[test]
fn multipass_env_emits_regeneration_rule() {
    let dir = write_tree(&[("Gantryfile", "phony {\n    name: \"a\",\n}\n")]);
    let out = dir.path().join("build.ninja");

    gantry()
        .arg(dir.path().join("Gantryfile"))
        .arg("-o")
        .arg(&out)
        .env("GANTRY_NINJA_HAS_MULTIPASS", "1")
        .assert()
        .success();

    let manifest = std::fs::read_to_string(&out).unwrap();
    assert!(manifest.contains("rule s.regenerate.regenerate"));
    assert!(manifest.contains("generator = 1"));
}

#[test]
fn check_file_mode_round_trips() {
    let dir = write_tree(&[("Gantryfile", "phony {\n    name: \"a\",\n}\n")]);
    let out = dir.path().join("build.ninja");
    let check = dir.path().join("build.ninja.check");

    gantry()
        .arg(dir.path().join("Gantryfile"))
        .arg("-o")
        .arg(&out)
        .arg("-c")
        .arg(&check)
        .assert()
        .success();
    let first_mtime = std::fs::metadata(&check).unwrap().modified().unwrap();

    std::thread::sleep(std::time::Duration::from_millis(30));
    gantry()
        .arg(dir.path().join("Gantryfile"))
        .arg("-o")
        .arg(&out)
        .arg("-c")
        .arg(&check)
        .assert()
        .success();
    let second_mtime = std::fs::metadata(&check).unwrap().modified().unwrap();
    assert_eq!(first_mtime, second_mtime);
}
