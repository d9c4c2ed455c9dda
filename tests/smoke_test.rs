//! Smoke tests for the Beans CLI.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn beans() -> Command {
    Command::new(env!("CARGO_BIN_EXE_beans"))
}

#[test]
fn test_version_flag() {
    beans()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("beans"))
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_help_flag() {
    beans()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("Commands:"))
        .stdout(predicate::str::contains("launch"));
}

#[test]
fn test_uninitialized_directory_errors_as_json() {
    let temp = TempDir::new().unwrap();
    beans()
        .current_dir(temp.path())
        .env_remove("BEANS_PATH")
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("\"error\""))
        .stderr(predicate::str::contains("beans init"));
}

#[test]
fn test_explicit_beans_path() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("elsewhere");

    beans()
        .arg("-C")
        .arg(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"config_written\":true"));
    assert!(dir.join("config.kdl").is_file());

    beans()
        .env("BEANS_PATH", &dir)
        .args(["-H", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No beans found."));
}
