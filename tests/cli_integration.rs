//! CLI integration tests for kiln.
//!
//! These tests drive the binary through configure, check and refresh on
//! real source trees in temporary directories.

use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get the kiln binary command.
fn kiln() -> Command {
    let mut cmd = Command::cargo_bin("kiln").unwrap();
    cmd.env_remove("KILN_BACKEND");
    cmd
}

/// Create a temporary directory for test projects.
fn temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

const HELLO: &str = r#"[project]
name = "hello"

[[target]]
name = "hello"
kind = "executable"
sources = [{ glob = "*.cpp", dirs = ["src/hello"], extra = "*.hpp" }]
"#;

/// Write the hello project under `root/src`, returning the source dir.
fn write_hello(root: &Path) -> std::path::PathBuf {
    let src = root.join("src");
    fs::create_dir_all(src.join("src/hello")).unwrap();
    fs::write(src.join("kiln.toml"), HELLO).unwrap();
    fs::write(src.join("src/hello/a.cpp"), "int a() { return 1; }\n").unwrap();
    fs::write(
        src.join("src/hello/b.cpp"),
        "#include \"util.hpp\"\nint main() { return util(); }\n",
    )
    .unwrap();
    fs::write(src.join("src/hello/util.hpp"), "inline int util() { return 0; }\n").unwrap();
    src
}

fn configure(src: &Path, build: &Path, backend: &str) {
    kiln()
        .arg("configure")
        .arg(src)
        .arg(build)
        .args(["--backend", backend])
        .assert()
        .success()
        .stdout(predicate::str::contains("Generated"));
}

// ============================================================================
// kiln configure
// ============================================================================

#[test]
fn test_configure_make() {
    let tmp = temp_dir();
    let src = write_hello(tmp.path());
    let build = tmp.path().join("build");
    configure(&src, &build, "make");

    let makefile = fs::read_to_string(build.join("Makefile")).unwrap();
    assert_eq!(makefile.lines().filter(|l| l.starts_with("\tc++ -c ")).count(), 2);
    assert!(!makefile.contains("util.hpp"));
    assert!(makefile.contains("Makefile: "));
    assert!(makefile.contains("\nclean:\n\trm -f "));
    assert!(build.join(".kiln/environment.toml").is_file());
    assert!(build.join(".kiln/discovery.json").is_file());
}

#[test]
fn test_configure_ninja() {
    let tmp = temp_dir();
    let src = write_hello(tmp.path());
    let build = tmp.path().join("build");
    configure(&src, &build, "ninja");

    let ninja = fs::read_to_string(build.join("build.ninja")).unwrap();
    assert_eq!(ninja.lines().filter(|l| l.contains(": cxx ")).count(), 2);
    assert_eq!(ninja.lines().filter(|l| l.starts_with("build hello: link ")).count(), 1);
    assert!(!ninja.contains("util.hpp"));
    assert!(ninja.contains("generator = 1"));
    assert!(ninja.contains("build clean: clean\n"));
}

#[test]
fn test_configure_msbuild() {
    let tmp = temp_dir();
    let src = write_hello(tmp.path());
    let build = tmp.path().join("build");
    configure(&src, &build, "msbuild");

    let proj = fs::read_to_string(build.join("kiln.proj")).unwrap();
    assert_eq!(proj.matches("<Exec Command=\"c++ -c ").count(), 2);
    assert!(!proj.contains("util.hpp"));
    assert!(proj.contains("InitialTargets=\"_KilnRegenerate\""));
}

#[test]
fn test_configure_backend_from_env() {
    let tmp = temp_dir();
    let src = write_hello(tmp.path());
    let build = tmp.path().join("build");

    kiln()
        .arg("configure")
        .arg(&src)
        .arg(&build)
        .env("KILN_BACKEND", "ninja")
        .assert()
        .success();
    assert!(build.join("build.ninja").is_file());
}

#[test]
fn test_configure_rejects_same_directory() {
    let tmp = temp_dir();
    let src = write_hello(tmp.path());

    kiln()
        .arg("configure")
        .arg(&src)
        .arg(&src)
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be different"));
}

#[test]
fn test_configure_requires_description() {
    let tmp = temp_dir();
    let src = tmp.path().join("empty");
    fs::create_dir_all(&src).unwrap();

    kiln()
        .arg("configure")
        .arg(&src)
        .arg(tmp.path().join("build"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("has no kiln.toml"));
}

#[test]
fn test_configure_rejects_build_dir_with_description() {
    let tmp = temp_dir();
    let src = write_hello(tmp.path());
    let build = tmp.path().join("build");
    fs::create_dir_all(&build).unwrap();
    fs::write(build.join("kiln.toml"), HELLO).unwrap();

    kiln()
        .arg("configure")
        .arg(&src)
        .arg(&build)
        .assert()
        .failure()
        .stderr(predicate::str::contains("contains a kiln.toml"));
}

#[test]
fn test_configure_unknown_backend() {
    let tmp = temp_dir();
    let src = write_hello(tmp.path());

    kiln()
        .arg("configure")
        .arg(&src)
        .arg(tmp.path().join("build"))
        .args(["--backend", "scons"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("make, ninja, msbuild"));
}

#[test]
fn test_configure_reports_cycle() {
    let tmp = temp_dir();
    let src = tmp.path().join("src");
    fs::create_dir_all(&src).unwrap();
    fs::write(
        src.join("kiln.toml"),
        r#"[project]
name = "loop"

[[target]]
name = "a"
kind = "file_group"
sources = [{ group = "b" }]

[[target]]
name = "b"
kind = "file_group"
sources = [{ group = "a" }]
"#,
    )
    .unwrap();

    kiln()
        .arg("configure")
        .arg(&src)
        .arg(tmp.path().join("build"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("dependency cycle detected"))
        .stderr(predicate::str::contains(" -> "));
}

// ============================================================================
// kiln check / kiln refresh
// ============================================================================

#[test]
fn test_check_and_refresh_after_new_source() {
    let tmp = temp_dir();
    let src = write_hello(tmp.path());
    let build = tmp.path().join("build");
    configure(&src, &build, "ninja");

    kiln()
        .arg("check")
        .arg(&build)
        .assert()
        .success()
        .stdout(predicate::str::contains("up to date"));

    fs::write(src.join("src/hello/c.cpp"), "int c() { return 3; }\n").unwrap();

    kiln()
        .arg("check")
        .arg(&build)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("out of date"))
        .stdout(predicate::str::contains("c.cpp"));

    kiln()
        .arg("refresh")
        .arg(&build)
        .assert()
        .success();

    let ninja = fs::read_to_string(build.join("build.ninja")).unwrap();
    assert_eq!(ninja.lines().filter(|l| l.contains(": cxx ")).count(), 3);

    kiln().arg("check").arg(&build).assert().success();
}

#[test]
fn test_check_description_change() {
    let tmp = temp_dir();
    let src = write_hello(tmp.path());
    let build = tmp.path().join("build");
    configure(&src, &build, "make");

    fs::write(src.join("kiln.toml"), format!("{}\n# comment\n", HELLO)).unwrap();
    kiln()
        .arg("check")
        .arg(&build)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("kiln.toml changed"));
}

#[test]
fn test_refresh_defaults_to_current_directory() {
    let tmp = temp_dir();
    let src = write_hello(tmp.path());
    let build = tmp.path().join("build");
    configure(&src, &build, "make");

    kiln()
        .arg("refresh")
        .current_dir(&build)
        .assert()
        .success()
        .stdout(predicate::str::contains("Makefile"));
}

#[test]
fn test_refresh_unconfigured_directory() {
    let tmp = temp_dir();

    kiln()
        .arg("refresh")
        .arg(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a configured build directory"));
}

// ============================================================================
// kiln backends
// ============================================================================

#[test]
fn test_backends_lists_all() {
    kiln()
        .arg("backends")
        .assert()
        .success()
        .stdout(predicate::str::contains("make"))
        .stdout(predicate::str::contains("build.ninja"))
        .stdout(predicate::str::contains("kiln.proj"));
}

#[test]
fn test_backends_show_one() {
    kiln()
        .args(["backends", "msbuild"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Order-only edges:     no"));
}
