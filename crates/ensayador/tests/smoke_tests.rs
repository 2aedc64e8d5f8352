//! Smoke tests for the ensayador CLI and the ensayo-demo test program
//!
//! The demo runs every test in a fresh worker process, so crashing tests
//! exercise real signal and exit-status handling.

#![allow(deprecated)] // Allow deprecated Command::cargo_bin until assert_cmd is updated
#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Get a command for the ensayador binary
fn ensayador() -> Command {
    let mut cmd = Command::cargo_bin("ensayador").expect("ensayador binary should exist");
    clean_env(&mut cmd);
    cmd
}

/// Get a command for the demo test program
fn demo() -> Command {
    let mut cmd = Command::cargo_bin("ensayo-demo").expect("ensayo-demo binary should exist");
    clean_env(&mut cmd);
    cmd
}

fn demo_path() -> PathBuf {
    assert_cmd::cargo::cargo_bin("ensayo-demo")
}

fn clean_env(cmd: &mut Command) {
    cmd.env_remove("ENSAYO_WORKER")
        .env_remove("ENSAYO_CONFIG")
        .env_remove("ENSAYO_COLLAPSE")
        .env_remove("ENSAYO_UNDER_TOOL")
        .env_remove("RUST_LOG");
}

/// Manifest describing the same functions the demo registers
fn write_manifest(dir: &TempDir) -> PathBuf {
    let manifest = r#"[
  {"name": "setup", "compile_unit": "src/demo/arith.c"},
  {"name": "test_add", "compile_unit": "src/demo/arith.c"},
  {"name": "test_overflow", "compile_unit": "src/demo/arith.c"},
  {"name": "cleanup", "compile_unit": "src/demo/arith.c"},
  {"name": "test_abort", "compile_unit": "src/demo/proc.c"},
  {"name": "test_exit", "compile_unit": "src/demo/proc.c"},
  {"name": "test_skip", "compile_unit": "src/demo/proc.c"},
  {"name": "test_logged", "compile_unit": "src/demo/proc.c"},
  {"name": "test_explicit", "compile_unit": "src/demo/proc.c"}
]"#;
    let path = dir.path().join("demo.json");
    fs::write(&path, manifest).unwrap();
    path
}

// ============================================================================
// Basic CLI Tests
// ============================================================================

#[test]
fn test_version_flag() {
    ensayador()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.4.0"));
}

#[test]
fn test_help_flag() {
    ensayador()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("tree"))
        .stdout(predicate::str::contains("run"));
}

#[test]
fn test_no_args_shows_help() {
    ensayador().assert().failure();
}

// ============================================================================
// Embedded Test Program
// ============================================================================

#[test]
fn test_demo_list() {
    demo().arg("--list").assert().success().stdout(
        "demo.arith.test_add\ndemo.arith.test_overflow\ndemo.proc.test_abort\ndemo.proc.test_exit\n\
         demo.proc.test_skip\ndemo.proc.test_logged\ndemo.proc.test_explicit\n",
    );
}

#[test]
fn test_demo_list_with_spec() {
    demo()
        .args(["--list", "demo.arith"])
        .assert()
        .success()
        .stdout("demo.arith.test_add\ndemo.arith.test_overflow\n");
}

#[test]
fn test_demo_unknown_spec() {
    demo()
        .arg("nothing.here")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No such test: nothing.here"));
}

#[test]
fn test_demo_tree() {
    demo()
        .arg("--tree")
        .assert()
        .success()
        .stdout(predicate::str::contains("before=src/demo/arith.c:setup"))
        .stdout(predicate::str::contains("after=src/demo/arith.c:cleanup"));
}

#[test]
fn test_demo_single_pass() {
    demo()
        .arg("demo.arith.test_add")
        .assert()
        .success()
        .stderr(predicate::str::contains("ensayo: running: \"demo.arith.test_add\""))
        .stderr(predicate::str::contains("EVENT LOG arith fixtures ready"))
        .stderr(predicate::str::contains("PASS demo.arith.test_add"))
        .stderr(predicate::str::contains("ensayo: 1 run 0 failed"));
}

#[test]
fn test_demo_assertion_failure() {
    demo()
        .arg("demo/arith/test_overflow")
        .assert()
        .failure()
        .stderr(predicate::str::contains("EVENT ASSERT"))
        .stderr(predicate::str::contains("200 + 100 overflows u8"))
        .stderr(predicate::str::contains("FAIL demo.arith.test_overflow"));
}

#[cfg(unix)]
#[test]
fn test_demo_crash_is_contained() {
    demo()
        .args(["demo.proc.test_abort", "demo.arith.test_add"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("EVENT SIGNAL killed by signal 6"))
        .stderr(predicate::str::contains("FAIL demo.proc.test_abort"))
        .stderr(predicate::str::contains("PASS demo.arith.test_add"))
        .stderr(predicate::str::contains("ensayo: 2 run 1 failed"));
}

#[test]
fn test_demo_exit_status() {
    demo()
        .arg("demo.proc.test_exit")
        .assert()
        .failure()
        .stderr(predicate::str::contains("EVENT EXIT exited with status 3"));
}

#[test]
fn test_demo_not_applicable_and_expectations() {
    demo()
        .args(["demo.proc.test_skip", "demo.proc.test_logged"])
        .assert()
        .success()
        .stderr(predicate::str::contains("N/A demo.proc.test_skip"))
        .stderr(predicate::str::contains("PASS demo.proc.test_logged"))
        .stderr(predicate::str::contains("hello from the test").not());
}

#[test]
fn test_demo_full_run_parallel() {
    demo()
        .args(["-j", "4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ensayo: 7 run 4 failed"));
}

#[test]
fn test_demo_thread_isolation() {
    demo()
        .args(["--isolation", "thread", "demo.arith"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ensayo: 2 run 1 failed"));
}

#[test]
fn test_demo_json_format() {
    let output = demo()
        .args(["--format", "json", "demo.arith.test_add"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let records: Vec<serde_json::Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(records.first().unwrap()["type"], "begin");
    assert_eq!(records.last().unwrap()["type"], "end");
    assert!(records
        .iter()
        .any(|r| r["type"] == "finished" && r["verdict"] == "Pass"));
}

#[test]
fn test_demo_junit_report() {
    let dir = TempDir::new().unwrap();
    let junit = dir.path().join("junit.xml");
    demo()
        .args(["demo.arith", "demo.proc.test_skip", "--junit"])
        .arg(&junit)
        .assert()
        .failure();
    let xml = fs::read_to_string(&junit).unwrap();
    assert!(xml.contains(r#"tests="3""#));
    assert!(xml.contains(r#"failures="1""#));
    assert!(xml.contains("<skipped/>"));
}

#[test]
fn test_demo_unwritable_junit_fails() {
    let dir = TempDir::new().unwrap();
    demo()
        .args(["demo.arith.test_add", "--junit"])
        .arg(dir.path().join("missing").join("junit.xml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("PASS demo.arith.test_add"))
        .stderr(predicate::str::contains("Cannot write report"));
}

#[test]
fn test_demo_warns_degraded_capture_once() {
    let output = demo()
        .args(["-j", "4"])
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8_lossy(&output);
    assert_eq!(stderr.matches("event capture degraded").count(), 1, "{stderr}");
}

#[test]
fn test_demo_config_file() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("ensayo.yaml"), "collapse_prefix: false\n").unwrap();
    demo()
        .current_dir(dir.path())
        .args(["--list", "src.demo.proc.test_exit"])
        .assert()
        .success()
        .stdout("src.demo.proc.test_exit\n");
}

// ============================================================================
// External Runner
// ============================================================================

#[test]
fn test_list_from_manifest() {
    let dir = TempDir::new().unwrap();
    let manifest = write_manifest(&dir);
    ensayador()
        .arg("list")
        .arg(demo_path())
        .arg("--manifest")
        .arg(&manifest)
        .arg("demo.proc")
        .assert()
        .success()
        .stdout("demo.proc.test_abort\ndemo.proc.test_exit\ndemo.proc.test_skip\ndemo.proc.test_logged\ndemo.proc.test_explicit\n");
}

#[test]
fn test_tree_without_collapse() {
    let dir = TempDir::new().unwrap();
    let manifest = write_manifest(&dir);
    ensayador()
        .arg("tree")
        .arg(demo_path())
        .arg("--manifest")
        .arg(&manifest)
        .arg("--no-collapse")
        .assert()
        .success()
        .stdout(predicate::str::contains("demo"))
        .stdout(predicate::str::contains("test_explicit"));
}

#[test]
fn test_run_through_external_workers() {
    let dir = TempDir::new().unwrap();
    let manifest = write_manifest(&dir);
    ensayador()
        .arg("run")
        .arg(demo_path())
        .arg("--manifest")
        .arg(&manifest)
        .args(["demo.arith.test_add", "demo.proc.test_explicit"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("PASS demo.arith.test_add"))
        .stderr(predicate::str::contains("explicitly failed"))
        .stderr(predicate::str::contains("FAIL demo.proc.test_explicit"))
        .stderr(predicate::str::contains("ensayo: 2 run 1 failed"));
}

#[test]
fn test_run_external_without_collapse() {
    let dir = TempDir::new().unwrap();
    let manifest = write_manifest(&dir);
    ensayador()
        .arg("run")
        .arg(demo_path())
        .arg("--manifest")
        .arg(&manifest)
        .arg("--no-collapse")
        .arg("src.demo.arith.test_add")
        .assert()
        .success()
        .stderr(predicate::str::contains("PASS src.demo.arith.test_add"));
}

#[test]
fn test_run_unknown_spec_fails() {
    let dir = TempDir::new().unwrap();
    let manifest = write_manifest(&dir);
    ensayador()
        .arg("run")
        .arg(demo_path())
        .arg("--manifest")
        .arg(&manifest)
        .arg("demo.arith.test_nothing")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("demo.arith.test_nothing"));
}

#[test]
fn test_missing_manifest_fails() {
    ensayador()
        .args(["list", "./whatever", "--manifest", "/nonexistent/manifest.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("/nonexistent/manifest.json"));
}
