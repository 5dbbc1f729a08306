//! Tests for TOML config loading, creation, and path resolution.

use super::template::default_config_toml;
use super::*;
use crate::schema::{DuetConfig, Severity};
use duet_common::ConfigError;
use std::path::Path;

#[test]
fn load_from_nonexistent_returns_file_not_found() {
    let result = load_from_path(Path::new("/tmp/nonexistent_duet_config.toml"));
    assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
}

#[test]
fn load_valid_partial_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[server]
port = 4100

[coordination]
dispatch_timeout_ms = 8000

[auth.licenses]
alice = "2030-01-31"

[policy.reasons]
not_betting_time = "soft"
"#,
    )
    .unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.server.port, 4100);
    assert_eq!(config.coordination.dispatch_timeout_ms, 8000);
    assert_eq!(
        config.auth.licenses.get("alice").map(|d| d.to_string()),
        Some("2030-01-31".to_string())
    );
    assert_eq!(
        config.policy.severity(Some("not_betting_time")),
        Severity::Soft
    );
    // Defaults preserved
    assert_eq!(config.coordination.readiness_timeout_ms, 5000);
    assert_eq!(config.heartbeat.interval_secs, 30);
    assert_eq!(config.heartbeat.max_missed, 2);
}

#[test]
fn load_invalid_toml_returns_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "this is not valid toml {{{").unwrap();

    let result = load_from_path(&path);
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn bad_license_date_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[auth.licenses]\nalice = \"next tuesday\"\n").unwrap();

    let result = load_from_path(&path);
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn load_config_with_invalid_values_falls_back_to_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[heartbeat]\nmax_missed = 0\n").unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.heartbeat.max_missed, 2);
}

#[test]
fn create_and_load_default_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("duet").join("config.toml");

    create_default_config(&path).unwrap();
    assert!(path.exists());

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.server.port, 3000);
    assert!(config.auth.licenses.is_empty());
}

#[test]
fn default_config_toml_is_valid() {
    let content = default_config_toml();
    let config: DuetConfig = toml::from_str(&content).unwrap();
    assert_eq!(config.coordination.dispatch_timeout_ms, 10_000);
}

#[test]
fn default_config_path_is_reasonable() {
    if let Ok(path) = default_config_path() {
        let path_str = path.to_string_lossy();
        assert!(path_str.contains("duet"));
        assert!(path_str.ends_with("config.toml"));
    }
}

#[test]
fn missing_default_file_is_created_from_template() {
    let dir = tempfile::tempdir().unwrap();
    let source = ConfigSource {
        path: dir.path().join("duet").join("config.toml"),
        explicit: false,
    };

    let config = load_from_source(&source).unwrap();
    assert_eq!(config.server.ws_port, 3001);
    assert!(source.path.exists());
}

#[test]
fn missing_named_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let source = ConfigSource {
        path: dir.path().join("relay.toml"),
        explicit: true,
    };

    let result = load_from_source(&source);
    assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    assert!(!source.path.exists());
}
