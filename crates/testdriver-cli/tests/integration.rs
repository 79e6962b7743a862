#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

fn testdriver(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("testdriver").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("TESTDRIVER_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, body).unwrap();
    path
}

const PASSING: &str = r#"<Test name="passing">
  <Action name="create" type="CreateConnection" threadId="t1">
    <ActionParameter name="conn_id">conn1</ActionParameter>
  </Action>
  <Action name="close" type="CloseConnection" threadId="t1">
    <ActionParameter name="conn_id">conn1</ActionParameter>
  </Action>
  <Action name="idle" type="Sleep" threadId="t2">
    <ActionParameter name="duration_ms">1</ActionParameter>
  </Action>
</Test>"#;

const FAILING: &str = r#"<Test name="failing">
  <Action name="set" type="SetVariable" threadId="t1">
    <ActionParameter name="name">a</ActionParameter>
    <ActionParameter name="value">apple</ActionParameter>
  </Action>
  <Action name="compare" type="CompareStrings" threadId="t1">
    <ActionParameter name="first">a</ActionParameter>
    <ActionParameter name="value">banana</ActionParameter>
  </Action>
  <Action name="skipped" type="Sleep" threadId="t1">
    <ActionParameter name="duration_ms">1</ActionParameter>
  </Action>
</Test>"#;

// ---------------------------------------------------------------------------
// results and exit codes
// ---------------------------------------------------------------------------

#[test]
fn passing_script_exits_zero_with_success_line() {
    let dir = TempDir::new().unwrap();
    write(&dir, "pass.xml", PASSING);
    testdriver(&dir)
        .arg("pass.xml")
        .assert()
        .success()
        .stdout(predicate::str::contains("Test 'passing' result: Success"))
        .stdout(predicate::str::contains("thread 't1'"))
        .stdout(predicate::str::contains("thread 't2'"));
}

#[test]
fn summary_line_is_printed_once() {
    let dir = TempDir::new().unwrap();
    write(&dir, "pass.xml", PASSING);
    let output = testdriver(&dir).arg("pass.xml").output().unwrap();
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stdout.matches("result: Success").count(), 1, "{stdout}");
    assert!(!stderr.contains("result: Success"), "{stderr}");
}

#[test]
fn failing_script_exits_one_and_names_first_failure() {
    let dir = TempDir::new().unwrap();
    write(&dir, "fail.xml", FAILING);
    testdriver(&dir)
        .arg("fail.xml")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Test 'failing' result: Failure"))
        .stdout(predicate::str::contains("action 'compare' on thread 't1'"))
        .stdout(predicate::str::contains("cancelled"));
}

#[test]
fn unsupported_type_exits_three() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "bad.xml",
        r#"<Test><Action name="x1" type="Unsupported"/></Test>"#,
    );
    testdriver(&dir)
        .arg("bad.xml")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("unsupported action type 'Unsupported'"));
}

#[test]
fn missing_script_exits_three() {
    let dir = TempDir::new().unwrap();
    testdriver(&dir)
        .arg("nope.xml")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("nope.xml"));
}

#[test]
fn missing_argument_prints_usage() {
    let dir = TempDir::new().unwrap();
    testdriver(&dir)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Usage"));
}

// ---------------------------------------------------------------------------
// options
// ---------------------------------------------------------------------------

#[test]
fn name_filter_skips_other_actions() {
    let dir = TempDir::new().unwrap();
    write(&dir, "fail.xml", FAILING);
    testdriver(&dir)
        .args(["fail.xml", "-n", "set,skipped"])
        .assert()
        .success()
        .stdout(predicate::str::contains("compare").not());
}

#[test]
fn unknown_filter_name_exits_three() {
    let dir = TempDir::new().unwrap();
    write(&dir, "pass.xml", PASSING);
    testdriver(&dir)
        .args(["pass.xml", "-n", "ghost"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("ghost"));
}

#[test]
fn json_output_is_parseable() {
    let dir = TempDir::new().unwrap();
    write(&dir, "fail.xml", FAILING);
    let output = testdriver(&dir)
        .args(["fail.xml", "-j"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["name"], "failing");
    assert_eq!(report["passed"], false);
    assert_eq!(report["first_failure"]["action"], "compare");
    assert_eq!(report["groups"][0]["actions"][2]["status"], "cancelled");
}

#[test]
fn log_file_receives_trace_lines() {
    let dir = TempDir::new().unwrap();
    write(&dir, "pass.xml", PASSING);
    testdriver(&dir)
        .args(["pass.xml", "-l", "5", "-f", "run.log"])
        .assert()
        .success();
    let log = std::fs::read_to_string(dir.path().join("run.log")).unwrap();
    assert!(log.contains("TDRV3001"), "{log}");
    assert!(!log.contains("\u{1b}["), "log file contains ANSI escapes");
}

#[test]
fn bad_log_level_is_a_usage_error() {
    let dir = TempDir::new().unwrap();
    write(&dir, "pass.xml", PASSING);
    testdriver(&dir)
        .args(["pass.xml", "-l", "loud"])
        .assert()
        .code(2);
}

#[test]
fn config_file_is_applied() {
    let dir = TempDir::new().unwrap();
    write(&dir, "driver.yaml", "action_delim: \"+\"\n");
    write(&dir, "fail.xml", FAILING);
    testdriver(&dir)
        .args(["fail.xml", "-n", "set+skipped"])
        .env("TESTDRIVER_CONFIG", dir.path().join("driver.yaml"))
        .assert()
        .success();
}

#[test]
fn invalid_config_exits_three() {
    let dir = TempDir::new().unwrap();
    write(&dir, "driver.yaml", "no_such_field: 1\n");
    write(&dir, "pass.xml", PASSING);
    testdriver(&dir)
        .args(["pass.xml", "--config", "driver.yaml"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("driver.yaml"));
}
