//! Binary tests for the commands that never reach a container engine.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

fn pipeline() -> Command {
    cargo_bin_cmd!("clausewitz_pipeline")
}

#[test]
fn test_matrix_json_lists_every_target() {
    let output = pipeline().args(["matrix", "--json"]).output().unwrap();
    assert!(output.status.success());

    let entries: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let targets: Vec<&str> = entries
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["target"].as_str().unwrap())
        .collect();
    assert_eq!(targets, ["linux-x64", "linux-arm64", "osx-x64", "osx-arm64"]);
    assert_eq!(entries[2]["os"], "darwin");
    assert_eq!(entries[2]["image"], "sickcodes/docker-osx:auto");
}

#[test]
fn test_matrix_filters_by_os() {
    pipeline()
        .args(["matrix", "--os", "linux"])
        .assert()
        .success()
        .stdout(predicate::str::contains("linux-arm64"))
        .stdout(predicate::str::contains("osx-x64").not());
}

#[test]
fn test_unknown_target_fails_without_docker() {
    pipeline()
        .args(["publish-aot", "--target", "win-x64"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unknown target 'win-x64'"))
        .stderr(predicate::str::contains("linux-x64"));
}

#[test]
fn test_unknown_os_is_a_usage_error() {
    pipeline()
        .args(["native", "--os", "windows"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown operating system"));
}

#[test]
fn test_missing_fixture_is_rejected() {
    pipeline()
        .args(["smoke-test", "--fixture", "/definitely/not/a/save.sav"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("is not a file"));
}
