//! CLI argument parsing tests: flags, usage errors and their exit codes.

use predicates::prelude::*;

fn ccp() -> assert_cmd::Command {
    assert_cmd::Command::cargo_bin("ccp").unwrap()
}

#[test]
fn help_runs() {
    ccp()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("SOURCE"));
}

#[test]
fn version_runs() {
    ccp().arg("--version").assert().success();
}

#[test]
fn no_paths_is_a_usage_error() {
    ccp().assert().code(2);
}

#[test]
fn a_single_path_is_a_usage_error() {
    ccp()
        .arg("only-one")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn unknown_flag_is_a_usage_error() {
    ccp().args(["--frobnicate", "a", "b"]).assert().code(2);
}

#[test]
fn force_flag_is_accepted() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("a"), "x").unwrap();
    ccp()
        .args([
            "-f",
            tmp.path().join("a").to_str().unwrap(),
            tmp.path().join("b").to_str().unwrap(),
        ])
        .assert()
        .success();
}

#[test]
fn verbose_flag_stacks() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("a"), "x").unwrap();
    ccp()
        .args([
            "-vv",
            tmp.path().join("a").to_str().unwrap(),
            tmp.path().join("b").to_str().unwrap(),
        ])
        .assert()
        .success();
}
