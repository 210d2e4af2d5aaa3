//! Runs the built binary with no credentials and checks that it stops
//! before any test with the configuration exit code.

use assert_cmd::Command;
use tempfile::TempDir;

const EXIT_CONFIG_ERROR: i32 = 2;

/// The binary in an empty directory with an empty environment, so neither
/// a `.env` file nor the caller's `FOUNDRY_*` variables leak in
fn bare_command(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("foundry-probe").unwrap();
    cmd.env_clear().current_dir(dir.path()).arg("--no-color");
    cmd
}

#[test]
fn missing_endpoint_exits_with_config_error() {
    let dir = TempDir::new().unwrap();
    let output = bare_command(&dir).output().unwrap();

    assert_eq!(output.status.code(), Some(EXIT_CONFIG_ERROR));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Configuration error"), "stderr: {}", stderr);
    assert!(stderr.contains("FOUNDRY_ENDPOINT"), "stderr: {}", stderr);
    assert!(!stdout.contains("tests passed"), "stdout: {}", stdout);
}

#[test]
fn lenient_does_not_hide_config_errors() {
    let dir = TempDir::new().unwrap();
    let output = bare_command(&dir).arg("--lenient").output().unwrap();

    assert_eq!(output.status.code(), Some(EXIT_CONFIG_ERROR));
    assert!(!String::from_utf8_lossy(&output.stdout).contains("tests passed"));
}

#[test]
fn unknown_check_name_is_rejected_before_running() {
    let dir = TempDir::new().unwrap();
    let output = bare_command(&dir)
        .env("FOUNDRY_ENDPOINT", "http://127.0.0.1:9")
        .env("FOUNDRY_API_KEY", "test-key")
        .args(["--only", "sora"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(EXIT_CONFIG_ERROR));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown check name(s): sora"), "stderr: {}", stderr);
}
