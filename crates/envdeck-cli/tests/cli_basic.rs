//! Basic CLI E2E tests.
//!
//! Tests invoke the built binary and verify outputs. Every test points
//! `--config` at a temp directory so the user's configuration is untouched.

use std::path::Path;
use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_envdeck"))
        .args(args)
        .env_remove("ENVDECK_LOG")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_with_config(config: &Path, args: &[&str]) -> (String, String, i32) {
    let mut full = vec!["--config", config.to_str().unwrap()];
    full.extend_from_slice(args);
    run_cli(&full)
}

#[test]
fn test_classify_known_codes() {
    let (stdout, _, code) = run_cli(&["classify", "owm", "800"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "clear");

    let (stdout, _, code) = run_cli(&["classify", "wettercom", "75"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "heavy_snow");
}

#[test]
fn test_classify_unmapped_code() {
    let (stdout, _, code) = run_cli(&["classify", "owm", "450"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "unknown");
}

#[test]
fn test_classify_unknown_provider_fails() {
    let (_, stderr, code) = run_cli(&["classify", "metoffice", "1"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("unknown provider"));
}

#[test]
fn test_config_init_set_get() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = dir.path().join("config.toml");

    let (_, _, code) = run_with_config(&config, &["config", "init"]);
    assert_eq!(code, 0);
    assert!(config.exists());

    let (_, stderr, code) = run_with_config(&config, &["config", "init"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("already exists"));

    let (_, _, code) = run_with_config(&config, &["config", "set", "brightness.weight", "0.2"]);
    assert_eq!(code, 0);
    let (stdout, _, code) = run_with_config(&config, &["config", "get", "brightness.weight"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "0.2");

    let (_, _, code) = run_with_config(&config, &["config", "set", "brightness.enabled", "maybe"]);
    assert_eq!(code, 1);
}

#[test]
fn test_config_show_is_toml() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = dir.path().join("config.toml");

    let (stdout, _, code) = run_with_config(&config, &["config", "show"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("[netatmo]"));
    assert!(stdout.contains("timeout_secs = 20"));
}

#[test]
fn test_checksum_requires_account() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = dir.path().join("config.toml");

    let (_, stderr, code) = run_with_config(&config, &["checksum"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("wettercom"));

    for (key, value) in [
        ("wettercom.city_code", "DE0001020"),
        ("wettercom.project_name", "deck"),
        ("wettercom.api_key", "secret"),
    ] {
        let (_, _, code) = run_with_config(&config, &["config", "set", key, value]);
        assert_eq!(code, 0);
    }
    let (stdout, _, code) = run_with_config(&config, &["checksum"]);
    assert_eq!(code, 0);
    let checksum = stdout.trim();
    assert_eq!(checksum.len(), 32);
    assert!(checksum.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn test_fetch_unconfigured_source_fails() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = dir.path().join("config.toml");

    let (_, stderr, code) = run_with_config(&config, &["fetch", "forecast"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("not configured"));
}

#[test]
fn test_run_writes_snapshot() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = dir.path().join("config.toml");
    let snapshot = dir.path().join("state.json");

    let (_, _, code) = run_with_config(
        &config,
        &["run", "--ticks", "1", "--snapshot", snapshot.to_str().unwrap()],
    );
    assert_eq!(code, 0);

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&snapshot).unwrap()).unwrap();
    assert!(json["station"].is_null());
    assert_eq!(json["forecast"], serde_json::json!([]));
}
