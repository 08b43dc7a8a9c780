use assert_cmd::prelude::*;
use std::process::Command;

#[test]
fn test_help_lists_start() {
    let output = Command::cargo_bin("berthd")
        .unwrap()
        .arg("--help")
        .output()
        .expect("Failed to execute berthd");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage: berthd"), "Missing usage text: {}", stdout);
    assert!(stdout.contains("start"), "Missing start command: {}", stdout);
}

#[test]
fn test_version() {
    let output = Command::cargo_bin("berthd")
        .unwrap()
        .arg("--version")
        .output()
        .expect("Failed to execute berthd");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("berthd {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_start_with_missing_config_fails() {
    let output = Command::cargo_bin("berthd")
        .unwrap()
        .args(["start", "--config", "/nonexistent/berth.yml"])
        .env_remove("BERTH_CONFIG")
        .output()
        .expect("Failed to execute berthd");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("/nonexistent/berth.yml"), "stderr: {}", stderr);
}

#[test]
fn test_start_with_invalid_config_fails() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("berth.yml");
    std::fs::write(&path, "agent:\n  max_concurrent_deploys: 0\n").unwrap();

    let output = Command::cargo_bin("berthd")
        .unwrap()
        .arg("start")
        .arg("--config")
        .arg(&path)
        .output()
        .expect("Failed to execute berthd");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("max_concurrent_deploys"), "stderr: {}", stderr);
}

#[test]
fn test_start_without_subcommand_shows_usage() {
    let output = Command::cargo_bin("berthd")
        .unwrap()
        .output()
        .expect("Failed to execute berthd");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage: berthd"));
}
