//! Integration tests for the mikrohosts binary.
//!
//! Only commands that work offline are exercised here; the fetch pipeline is
//! covered by `tests/pipeline.rs` against a local mock server.

use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

/// Helper to get the path to the compiled binary
fn get_binary_path() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // Remove test binary name
    path.pop(); // Remove deps directory
    path.push("mikrohosts");
    path
}

/// Run mikrohosts with a config file that does not exist, so built-in defaults apply
fn run_mikrohosts(args: &[&str]) -> std::process::Output {
    let binary = get_binary_path();
    Command::new(&binary)
        .args(args)
        .args(["--config", "/nonexistent/mikrohosts/config.yaml"])
        .env_remove("MIKROHOSTS_REDIRECT_IP")
        .env_remove("MIKROHOSTS_EXCLUDED_HOSTS")
        .env_remove("MIKROHOSTS_COMMENT")
        .env_remove("MIKROHOSTS_CACHE_DIR")
        .output()
        .expect("Failed to execute mikrohosts")
}

#[test]
fn test_version_command() {
    let output = run_mikrohosts(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("mikrohosts"));
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help_command() {
    let output = run_mikrohosts(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("generate"));
    assert!(stdout.contains("sources"));
    assert!(stdout.contains("cache"));
}

#[test]
fn test_generate_help() {
    let output = run_mikrohosts(&["generate", "--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--sources"));
    assert!(stdout.contains("--exclude"));
    assert!(stdout.contains("--redirect-to"));
    assert!(stdout.contains("--no-cache"));
}

#[test]
fn test_config_command_prints_template() {
    let output = run_mikrohosts(&["config"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("defaults:"));
    assert!(stdout.contains("limits:"));
    assert!(stdout.contains("redirect_ip"));
}

#[test]
fn test_sources_command_defaults() {
    let output = run_mikrohosts(&["sources"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Hosts sources"));
    assert!(stdout.contains("adaway"));
}

#[test]
fn test_sources_command_custom_config() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.yaml");
    std::fs::write(
        &config,
        "sources:\n  - name: lan\n    uri: http://192.168.88.1/hosts.txt\n    enabled: true\n",
    )
    .unwrap();

    let output = Command::new(get_binary_path())
        .args(["sources", "--config"])
        .arg(&config)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[x] lan"));
    assert!(!stdout.contains("adaway"));
}

#[test]
fn test_invalid_config_fails() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.yaml");
    std::fs::write(&config, "defaults:\n  redirect_ip: not-an-ip\n").unwrap();

    let output = Command::new(get_binary_path())
        .args(["sources", "--config"])
        .arg(&config)
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("redirect_ip"));
}

#[test]
fn test_generate_rejects_invalid_redirect() {
    let output = run_mikrohosts(&[
        "generate",
        "--sources",
        "https://adaway.org/hosts.txt",
        "--redirect-to",
        "999.1.1.1",
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("redirect_to"));
    assert!(output.stdout.is_empty());
}

#[test]
fn test_generate_rejects_unknown_format() {
    let output = run_mikrohosts(&[
        "generate",
        "--sources",
        "https://adaway.org/hosts.txt",
        "--format",
        "iptables",
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("format"));
}

#[test]
fn test_generate_rejects_short_sources() {
    let output = run_mikrohosts(&["generate", "--sources", "http://a/"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("sources"));
}

#[test]
fn test_unknown_command() {
    let output = run_mikrohosts(&["frobnicate"]);
    assert!(!output.status.success());
}
