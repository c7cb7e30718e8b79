//! Integration tests for the `tandem` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn tandem(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tandem").unwrap();
    cmd.current_dir(dir.path())
        .env("HOME", dir.path())
        .env_remove("OPENAI_API_KEY")
        .env_remove("OPENAI_BASE_URL");
    cmd
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    tandem(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run").and(predicate::str::contains("index")));
}

#[test]
fn test_run_requires_prompt() {
    let dir = TempDir::new().unwrap();
    tandem(&dir).arg("run").assert().failure().stderr(predicate::str::contains("<PROMPT>"));
}

#[test]
fn test_run_without_api_key_fails() {
    let dir = TempDir::new().unwrap();
    tandem(&dir)
        .args(["run", "Plot the luminosity distance"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("OPENAI_API_KEY"));
}

#[test]
fn test_index_list_without_api_key_fails() {
    let dir = TempDir::new().unwrap();
    tandem(&dir)
        .args(["index", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("OPENAI_API_KEY"));
}

#[test]
fn test_malformed_config_is_reported() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("tandem.toml"), "model = [").unwrap();

    tandem(&dir)
        .args(["index", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse configuration file"));
}

#[test]
fn test_missing_explicit_config_is_reported() {
    let dir = TempDir::new().unwrap();
    tandem(&dir)
        .args(["--config", "absent.toml", "index", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration file not found"));
}
