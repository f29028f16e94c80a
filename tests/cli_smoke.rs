//! CLI smoke tests - commands that work without an API key.
//!
//! These tests run the compiled binary and verify exit codes and output.

use std::process::Command;

/// Helper: run murmur with given args and return (exit_code, stdout, stderr).
fn run_cli(args: &[&str]) -> (i32, String, String) {
    let bin = env!("CARGO_BIN_EXE_murmur");
    let output = Command::new(bin)
        .args(args)
        .env("RUST_LOG", "")
        .output()
        .expect("failed to execute murmur binary");
    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (code, stdout, stderr)
}

#[test]
fn cli_no_args_shows_help() {
    let (code, stdout, _stderr) = run_cli(&[]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("murmur"));
}

#[test]
fn cli_help_lists_commands() {
    let (code, stdout, _stderr) = run_cli(&["--help"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("run"));
    assert!(stdout.contains("config"));
}

#[test]
fn cli_config_check_reports_unknown_field() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"queue": {"count_limt": 3}}"#).unwrap();

    let (code, stdout, _stderr) = run_cli(&["config", "check", "--config", path.to_str().unwrap()]);
    assert_eq!(code, 0);
    assert!(stdout.contains("count_limt"));
    assert!(stdout.contains("did you mean 'count_limit'?"));
}

#[test]
fn cli_config_check_without_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.json");

    let (code, stdout, _stderr) = run_cli(&["config", "check", "--config", path.to_str().unwrap()]);
    assert_eq!(code, 0);
    assert!(stdout.contains("No config file found"));
}

#[test]
fn cli_run_without_api_key_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{}").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_murmur"))
        .args(["run", "--config", path.to_str().unwrap()])
        .env("RUST_LOG", "")
        .env_remove("MURMUR_PROVIDER_API_KEY")
        .env("HOME", dir.path())
        .output()
        .expect("failed to execute murmur binary");
    assert!(!output.status.success());
}
